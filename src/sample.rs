//! Benchmark samples -- one measured datum returned to the caller.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Free-form key/value metadata attached to a sample.
pub type Metadata = BTreeMap<String, String>;

/// A single measured result: metric name, value, unit and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub metric: String,
    pub value: f64,
    pub unit: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Sample {
    pub fn new(
        metric: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
        metadata: Metadata,
    ) -> Self {
        Self {
            metric: metric.into(),
            value,
            unit: unit.into(),
            metadata,
        }
    }

    /// Look up a metadata value by key.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}
