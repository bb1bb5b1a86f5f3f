//! Approval request state machine
//!
//! `Pending → Approved | Rejected`. Both outcomes are terminal.

use chrono::NaiveDateTime;

use crate::types::*;

/// Stateless transition logic for approval requests
pub struct ApprovalStateMachine;

impl ApprovalStateMachine {
    /// Check whether a decision may move from `from` to `to`
    pub fn is_valid_transition(from: Decision, to: Decision) -> bool {
        matches!(
            (from, to),
            (Decision::Pending, Decision::Approved | Decision::Rejected)
        )
    }

    /// Produce the decided copy of `request`.
    ///
    /// Self-approval is checked before the state so that a requester is
    /// always refused with a permission error, whatever the request's state.
    pub fn decide(
        request: &ApprovalRequest,
        approver: &str,
        decision: Decision,
        decided_at: NaiveDateTime,
    ) -> TrustResult<ApprovalRequest> {
        let action = match decision {
            Decision::Approved => "approve",
            Decision::Rejected => "reject",
            Decision::Pending => {
                return Err(TrustError::Validation(
                    "A request can only be decided as approved or rejected".to_string(),
                ))
            }
        };

        if approver == request.requested_by {
            return Err(TrustError::Permission(format!(
                "User '{}' cannot {} their own request",
                approver, action
            )));
        }

        if !Self::is_valid_transition(request.decision, decision) {
            return Err(TrustError::State {
                from: request.decision,
                action: action.to_string(),
            });
        }

        let mut decided = request.clone();
        decided.decision = decision;
        decided.approver = Some(approver.to_string());
        decided.decided_at = Some(decided_at);
        Ok(decided)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn request(requester: &str) -> ApprovalRequest {
        ApprovalRequest::new(
            "txn1".to_string(),
            requester.to_string(),
            TransactionStatus::Unmatched,
            None,
        )
    }

    fn now() -> NaiveDateTime {
        chrono::Utc::now().naive_utc()
    }

    fn arb_decision() -> impl Strategy<Value = Decision> {
        prop_oneof![
            Just(Decision::Pending),
            Just(Decision::Approved),
            Just(Decision::Rejected),
        ]
    }

    fn arb_outcome() -> impl Strategy<Value = Decision> {
        prop_oneof![Just(Decision::Approved), Just(Decision::Rejected)]
    }

    #[test]
    fn test_approve_sets_all_decision_fields() {
        let at = now();
        let decided = ApprovalStateMachine::decide(&request("a"), "b", Decision::Approved, at).unwrap();
        assert_eq!(decided.decision, Decision::Approved);
        assert_eq!(decided.approver.as_deref(), Some("b"));
        assert_eq!(decided.decided_at, Some(at));
    }

    #[test]
    fn test_deciding_as_pending_is_invalid() {
        let result = ApprovalStateMachine::decide(&request("a"), "b", Decision::Pending, now());
        assert!(matches!(result, Err(TrustError::Validation(_))));
    }

    #[test]
    fn test_transition_table() {
        assert!(ApprovalStateMachine::is_valid_transition(Decision::Pending, Decision::Approved));
        assert!(ApprovalStateMachine::is_valid_transition(Decision::Pending, Decision::Rejected));
        assert!(!ApprovalStateMachine::is_valid_transition(Decision::Pending, Decision::Pending));
        assert!(!ApprovalStateMachine::is_valid_transition(Decision::Approved, Decision::Rejected));
        assert!(!ApprovalStateMachine::is_valid_transition(Decision::Rejected, Decision::Approved));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Terminal requests never change again
        #[test]
        fn prop_terminal_requests_are_final(
            first in arb_outcome(),
            second in arb_decision(),
        ) {
            let decided = ApprovalStateMachine::decide(&request("a"), "b", first, now()).unwrap();
            let again = ApprovalStateMachine::decide(&decided, "c", second, now());
            prop_assert!(again.is_err());
        }

        /// The requester is always refused with a permission error
        #[test]
        fn prop_self_approval_is_a_permission_error(
            user in "[a-z]{1,12}",
            current in arb_decision(),
            outcome in arb_outcome(),
        ) {
            let mut req = request(&user);
            req.decision = current;
            let result = ApprovalStateMachine::decide(&req, &user, outcome, now());
            prop_assert!(matches!(result, Err(TrustError::Permission(_))));
        }
    }
}
