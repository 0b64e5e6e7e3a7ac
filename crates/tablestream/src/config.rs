use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::trigger::TriggerSpec;

/// Execution-wide settings shared by every dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecuteOptions {
    /// What happens to a partition's rows once they have been flushed downstream.
    pub accumulation_mode: AccumulationMode,
    /// Trigger installed on every partition a dataset creates.
    pub trigger: TriggerSpec,
    /// Capacity of the channel feeding a fan-in transformation. Senders block when it is full.
    pub fan_in_queue_depth: usize,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            accumulation_mode: AccumulationMode::Discarding,
            trigger: TriggerSpec::default(),
            fan_in_queue_depth: 64,
        }
    }
}

impl ExecuteOptions {
    /// Parse options from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    #[must_use]
    pub fn with_trigger(mut self, trigger: TriggerSpec) -> Self {
        self.trigger = trigger;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccumulationMode {
    /// Flushed rows are cleared from the partition.
    #[default]
    Discarding,
    /// Flushed rows stay in the partition and are sent again on the next flush.
    Accumulating,
}
