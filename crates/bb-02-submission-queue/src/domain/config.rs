//! Submission queue configuration.

/// Queue configuration.
#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// Largest accepted `totalEmissions`.
    pub max_emission: u64,
    /// Accepted emission units. Empty accepts any unit.
    pub allowed_units: Vec<String>,
    /// Longest accepted unit string.
    pub max_unit_len: usize,
    /// Ready-queue capacity; new writes are refused beyond it.
    pub max_queue_depth: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_emission: 1_000_000_000_000_000,
            allowed_units: vec!["kgCO2e".into(), "tCO2e".into(), "gCO2e".into()],
            max_unit_len: 32,
            max_queue_depth: 10_000,
        }
    }
}

impl QueueConfig {
    /// Creates a minimal config for testing.
    pub fn for_testing() -> Self {
        Self {
            max_queue_depth: 8,
            ..Default::default()
        }
    }
}
