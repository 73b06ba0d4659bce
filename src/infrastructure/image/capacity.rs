//! Cache sizing from the platform memory budget.

use tracing::info;

use crate::domain::ports::MemoryBudget;

const MIB: usize = 1024 * 1024;

/// Cache size in bytes for a memory class in MiB.
///
/// Small budgets give the cache a smaller share: up to 16 MiB an eighth,
/// up to 24 MiB a sixth, up to 32 MiB a quarter, beyond that half.
#[must_use]
pub const fn cache_size_for_memory_class(memory_class_mb: u32) -> usize {
    let divisor = match memory_class_mb {
        0..=16 => 8,
        17..=24 => 6,
        25..=32 => 4,
        _ => 2,
    };
    (memory_class_mb / divisor) as usize * MIB
}

/// Reads the budget once and sizes the cache from it.
#[must_use]
pub fn cache_size_from(budget: &dyn MemoryBudget) -> usize {
    let memory_class = budget.memory_class_mb();
    let size = cache_size_for_memory_class(memory_class);
    info!(
        memory_class_mb = memory_class,
        cache_mb = size / MIB,
        "Sized image cache"
    );
    size
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::MockMemoryBudget;
    use test_case::test_case;

    #[test_case(16, 2 ; "tier_16")]
    #[test_case(24, 4 ; "tier_24")]
    #[test_case(32, 8 ; "tier_32")]
    #[test_case(48, 24 ; "tier_48")]
    #[test_case(64, 32 ; "tier_64")]
    #[test_case(256, 128 ; "tier_256")]
    #[test_case(0, 0 ; "no_budget")]
    fn test_cache_size_bands(memory_class: u32, expected_mb: usize) {
        assert_eq!(cache_size_for_memory_class(memory_class), expected_mb * MIB);
    }

    #[test]
    fn test_budget_is_read_once() {
        let mut budget = MockMemoryBudget::new();
        budget.expect_memory_class_mb().times(1).return_const(96u32);

        assert_eq!(cache_size_from(&budget), 48 * MIB);
    }
}
