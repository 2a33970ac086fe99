//! Resource accounting: the sandbox's cancellation and memory-ceiling
//! machinery (§5).
//!
//! Two user-visible cancellation channels exist: a wall-clock deadline and a
//! coarse memory ceiling. Both are polled cooperatively by the VM and regex
//! VM and, on breach, unwind the whole VM with an error guest `try/catch`
//! cannot intercept — this is the sandbox's cornerstone property.

use std::time::{Duration, Instant};

/// Default per-context recursion depth ceiling.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 1000;

/// Estimated-byte threshold above which a single produced value (e.g. a
/// `JSON.stringify` result) is rejected outright rather than accounted for
/// incrementally.
pub const LARGE_RESULT_THRESHOLD: usize = 100_000;

/// Error raised when a configured resource ceiling is exceeded.
#[derive(Debug, Clone)]
pub enum ResourceError {
    Allocation { limit: usize, count: usize },
    Operation { limit: usize, count: usize },
    Time { limit: Duration, elapsed: Duration },
    Memory { limit: usize, used: usize },
    Recursion { limit: usize, depth: usize },
}

impl std::fmt::Display for ResourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceError::Allocation { limit, count } => write!(f, "allocation limit exceeded: {count} > {limit}"),
            ResourceError::Operation { limit, count } => write!(f, "operation limit exceeded: {count} > {limit}"),
            ResourceError::Time { limit, elapsed } => write!(f, "time limit exceeded: {elapsed:?} > {limit:?}"),
            ResourceError::Memory { limit, used } => write!(f, "memory limit exceeded: {used} > {limit}"),
            ResourceError::Recursion { limit, depth } => write!(f, "recursion limit exceeded: {depth} > {limit}"),
        }
    }
}

impl std::error::Error for ResourceError {}

/// Configured ceilings for one context. Any field left `None` is unbounded.
#[derive(Debug, Clone, Default)]
pub struct ResourceLimits {
    pub max_operations: Option<usize>,
    pub max_allocations: Option<usize>,
    pub max_duration: Option<Duration>,
    pub max_memory: Option<usize>,
    pub max_recursion_depth: Option<usize>,
}

impl ResourceLimits {
    #[must_use]
    pub fn new() -> Self {
        Self { max_recursion_depth: Some(DEFAULT_MAX_RECURSION_DEPTH), ..Self::default() }
    }

    #[must_use]
    pub fn max_operations(mut self, n: usize) -> Self {
        self.max_operations = Some(n);
        self
    }

    #[must_use]
    pub fn max_allocations(mut self, n: usize) -> Self {
        self.max_allocations = Some(n);
        self
    }

    #[must_use]
    pub fn max_duration(mut self, d: Duration) -> Self {
        self.max_duration = Some(d);
        self
    }

    #[must_use]
    pub fn max_memory(mut self, n: usize) -> Self {
        self.max_memory = Some(n);
        self
    }

    #[must_use]
    pub fn max_recursion_depth(mut self, n: Option<usize>) -> Self {
        self.max_recursion_depth = n;
        self
    }
}

/// Polled by the VM (every `N` opcodes) and the regex VM (every
/// `poll_interval` steps) to enforce `ResourceLimits`.
pub trait ResourceTracker {
    fn on_allocate(&mut self, get_size: impl FnOnce() -> usize) -> Result<(), ResourceError>;
    fn check_time(&mut self) -> Result<(), ResourceError>;
    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError>;
    fn check_large_result(&self, estimated_bytes: usize) -> Result<(), ResourceError> {
        let _ = estimated_bytes;
        Ok(())
    }
    fn tick_operation(&mut self) -> Result<(), ResourceError>;
    fn allocation_count(&self) -> usize {
        0
    }
    fn current_memory_bytes(&self) -> usize {
        0
    }
}

/// Near-zero-overhead tracker used when no limits are configured. Still
/// enforces an optional `ResourceLimits` if one was attached, so a `Context`
/// built with `with_limits` can use it uniformly.
#[derive(Debug, Default)]
pub struct NoLimitTracker {
    limits: Option<ResourceLimits>,
    start: Option<Instant>,
    allocations: usize,
    operations: usize,
    memory: usize,
}

impl NoLimitTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_limits(limits: ResourceLimits) -> Self {
        Self { limits: Some(limits), ..Self::default() }
    }

    pub fn begin_execution(&mut self) {
        self.start = Some(Instant::now());
        self.allocations = 0;
        self.operations = 0;
        self.memory = 0;
    }
}

impl ResourceTracker for NoLimitTracker {
    fn on_allocate(&mut self, get_size: impl FnOnce() -> usize) -> Result<(), ResourceError> {
        let Some(limits) = &self.limits else { return Ok(()) };
        self.allocations += 1;
        if let Some(max) = limits.max_allocations {
            if self.allocations > max {
                return Err(ResourceError::Allocation { limit: max, count: self.allocations });
            }
        }
        if let Some(max) = limits.max_memory {
            self.memory += get_size();
            if self.memory > max {
                return Err(ResourceError::Memory { limit: max, used: self.memory });
            }
        }
        Ok(())
    }

    fn check_time(&mut self) -> Result<(), ResourceError> {
        let Some(limits) = &self.limits else { return Ok(()) };
        let Some(max) = limits.max_duration else { return Ok(()) };
        let elapsed = self.start.map_or(Duration::ZERO, |s| s.elapsed());
        if elapsed > max {
            return Err(ResourceError::Time { limit: max, elapsed });
        }
        Ok(())
    }

    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        let Some(limits) = &self.limits else { return Ok(()) };
        let Some(max) = limits.max_recursion_depth else { return Ok(()) };
        if current_depth > max {
            return Err(ResourceError::Recursion { limit: max, depth: current_depth });
        }
        Ok(())
    }

    fn tick_operation(&mut self) -> Result<(), ResourceError> {
        let Some(limits) = &self.limits else { return Ok(()) };
        self.operations += 1;
        if let Some(max) = limits.max_operations {
            if self.operations > max {
                return Err(ResourceError::Operation { limit: max, count: self.operations });
            }
        }
        Ok(())
    }

    fn allocation_count(&self) -> usize {
        self.allocations
    }

    fn current_memory_bytes(&self) -> usize {
        self.memory
    }
}

/// A tracker that always enforces a `ResourceLimits`, for embeddings that
/// want sandboxing on by default rather than opt-in.
#[derive(Debug)]
pub struct LimitedTracker {
    limits: ResourceLimits,
    start: Instant,
    allocations: usize,
    operations: usize,
    memory: usize,
}

impl LimitedTracker {
    #[must_use]
    pub fn new(limits: ResourceLimits) -> Self {
        Self { limits, start: Instant::now(), allocations: 0, operations: 0, memory: 0 }
    }
}

impl ResourceTracker for LimitedTracker {
    fn on_allocate(&mut self, get_size: impl FnOnce() -> usize) -> Result<(), ResourceError> {
        self.allocations += 1;
        if let Some(max) = self.limits.max_allocations {
            if self.allocations > max {
                return Err(ResourceError::Allocation { limit: max, count: self.allocations });
            }
        }
        if let Some(max) = self.limits.max_memory {
            self.memory += get_size();
            if self.memory > max {
                return Err(ResourceError::Memory { limit: max, used: self.memory });
            }
        }
        Ok(())
    }

    fn check_time(&mut self) -> Result<(), ResourceError> {
        let Some(max) = self.limits.max_duration else { return Ok(()) };
        let elapsed = self.start.elapsed();
        if elapsed > max {
            return Err(ResourceError::Time { limit: max, elapsed });
        }
        Ok(())
    }

    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        let Some(max) = self.limits.max_recursion_depth else { return Ok(()) };
        if current_depth > max {
            return Err(ResourceError::Recursion { limit: max, depth: current_depth });
        }
        Ok(())
    }

    fn tick_operation(&mut self) -> Result<(), ResourceError> {
        self.operations += 1;
        if let Some(max) = self.limits.max_operations {
            if self.operations > max {
                return Err(ResourceError::Operation { limit: max, count: self.operations });
            }
        }
        Ok(())
    }

    fn allocation_count(&self) -> usize {
        self.allocations
    }

    fn current_memory_bytes(&self) -> usize {
        self.memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_limit_tracker_without_limits_never_errors() {
        let mut t = NoLimitTracker::new();
        for _ in 0..10_000 {
            t.tick_operation().unwrap();
        }
        assert!(t.on_allocate(|| 1_000_000).is_ok());
        assert!(t.check_recursion_depth(usize::MAX).is_ok());
    }

    #[test]
    fn limited_tracker_enforces_operation_ceiling() {
        let mut t = LimitedTracker::new(ResourceLimits::new().max_operations(3));
        t.tick_operation().unwrap();
        t.tick_operation().unwrap();
        t.tick_operation().unwrap();
        assert!(matches!(t.tick_operation(), Err(ResourceError::Operation { limit: 3, count: 4 })));
    }

    #[test]
    fn limited_tracker_enforces_recursion_ceiling() {
        let t = LimitedTracker::new(ResourceLimits::new().max_recursion_depth(Some(5)));
        assert!(t.check_recursion_depth(5).is_ok());
        assert!(matches!(t.check_recursion_depth(6), Err(ResourceError::Recursion { limit: 5, depth: 6 })));
    }

    #[test]
    fn limited_tracker_enforces_allocation_and_memory_ceilings() {
        let mut t = LimitedTracker::new(ResourceLimits::new().max_allocations(1).max_memory(10));
        t.on_allocate(|| 5).unwrap();
        assert!(matches!(t.on_allocate(|| 5), Err(ResourceError::Allocation { .. })));
    }

    #[test]
    fn resource_limits_new_sets_default_recursion_depth() {
        let limits = ResourceLimits::new();
        assert_eq!(limits.max_recursion_depth, Some(DEFAULT_MAX_RECURSION_DEPTH));
        assert!(limits.max_duration.is_none());
    }
}
