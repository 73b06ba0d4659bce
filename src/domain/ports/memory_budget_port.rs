//! Port definition for the platform memory budget.

/// Reports how much memory the process may use, once at startup.
#[cfg_attr(test, mockall::automock)]
pub trait MemoryBudget: Send + Sync {
    /// Per-process memory class in MiB.
    fn memory_class_mb(&self) -> u32;
}

/// Fixed memory class, usually read from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticMemoryBudget(pub u32);

impl MemoryBudget for StaticMemoryBudget {
    fn memory_class_mb(&self) -> u32 {
        self.0
    }
}
