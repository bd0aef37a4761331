//! Static engine policy.

use tessera_index_core::policy::EnginePolicy;

/// Fixed finalization policy configured at startup.
#[derive(Debug, Clone)]
pub struct FixedPolicy {
    concurrent_commits: bool,
    max_concurrency: usize,
}

impl FixedPolicy {
    /// Strictly sequential finalization.
    pub fn sequential() -> FixedPolicy {
        FixedPolicy {
            concurrent_commits: false,
            max_concurrency: 1,
        }
    }

    /// Bounded-parallel finalization with the given concurrency cap.
    pub fn concurrent(max_concurrency: usize) -> FixedPolicy {
        FixedPolicy {
            concurrent_commits: true,
            max_concurrency: max_concurrency.max(1),
        }
    }
}

impl EnginePolicy for FixedPolicy {
    fn supports_concurrent_commits(&self) -> bool {
        self.concurrent_commits
    }

    fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }
}
