//! Case-number allocation, one counter per state code
//!
//! Counters live in the shared store and are advanced with an atomic
//! increment-and-read, so concurrent allocations never hand out the same
//! number.

use tracing::debug;

use crate::config::SequenceConfig;
use crate::traits::TrustStorage;
use crate::types::TrustResult;
use crate::utils::validation::normalize_state_code;

const PARTITION_PREFIX: &str = "case:";

/// Allocates case numbers such as `CA-00042`
pub struct CaseNumberAllocator<S: TrustStorage> {
    storage: S,
    config: SequenceConfig,
}

impl<S: TrustStorage> CaseNumberAllocator<S> {
    pub fn new(storage: S, config: SequenceConfig) -> Self {
        Self { storage, config }
    }

    /// Allocate the next case number for a two-letter state code
    pub async fn next_case_number(&mut self, state_code: &str) -> TrustResult<String> {
        let state = normalize_state_code(state_code)?;
        let value = self
            .storage
            .next_sequence(&format!("{PARTITION_PREFIX}{state}"))
            .await?;
        let number = format_case_number(&state, value, &self.config);
        debug!(state = %state, case_number = %number, "Allocated case number");
        Ok(number)
    }
}

/// Render a case number from its parts
pub fn format_case_number(state: &str, value: u64, config: &SequenceConfig) -> String {
    format!(
        "{}{}{:0width$}",
        state,
        config.separator,
        value,
        width = config.width
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrustError;
    use crate::utils::memory_storage::MemoryStorage;

    #[test]
    fn test_format_case_number() {
        let config = SequenceConfig::default();
        assert_eq!(format_case_number("CA", 42, &config), "CA-00042");

        let wide = SequenceConfig {
            width: 3,
            separator: "/".to_string(),
        };
        assert_eq!(format_case_number("NY", 7, &wide), "NY/007");
        assert_eq!(format_case_number("NY", 12345, &wide), "NY/12345");
    }

    #[tokio::test]
    async fn test_counters_are_per_state() {
        let storage = MemoryStorage::new();
        let mut allocator = CaseNumberAllocator::new(storage, SequenceConfig::default());

        assert_eq!(allocator.next_case_number("ca").await.unwrap(), "CA-00001");
        assert_eq!(allocator.next_case_number("CA").await.unwrap(), "CA-00002");
        assert_eq!(allocator.next_case_number("tx").await.unwrap(), "TX-00001");
    }

    #[tokio::test]
    async fn test_invalid_state_code() {
        let mut allocator =
            CaseNumberAllocator::new(MemoryStorage::new(), SequenceConfig::default());
        assert!(matches!(
            allocator.next_case_number("California").await,
            Err(TrustError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_allocation_is_unique() {
        let storage = MemoryStorage::new();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let mut allocator =
                CaseNumberAllocator::new(storage.clone(), SequenceConfig::default());
            handles.push(tokio::spawn(async move {
                allocator.next_case_number("WA").await.unwrap()
            }));
        }

        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.unwrap());
        }
        numbers.sort();
        numbers.dedup();
        assert_eq!(numbers.len(), 16);
        assert_eq!(numbers.last().map(String::as_str), Some("WA-00016"));
    }
}
