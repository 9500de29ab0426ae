use std::time::Duration;

/// Engine configuration surface.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bound on concurrently running executions.
    pub max_concurrency: usize,
    /// Sweeper period for the execution store.
    pub cleanup_interval: Duration,
    /// How long terminal executions are retained.
    pub cleanup_ttl: Duration,
    /// Store size bound; excess terminal executions are evicted oldest
    /// first.
    pub cleanup_max_executions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            cleanup_interval: Duration::from_secs(60),
            cleanup_ttl: Duration::from_secs(30 * 60),
            cleanup_max_executions: 50,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn with_cleanup_ttl(mut self, ttl: Duration) -> Self {
        self.cleanup_ttl = ttl;
        self
    }

    pub fn with_cleanup_max_executions(mut self, limit: usize) -> Self {
        self.cleanup_max_executions = limit;
        self
    }
}
