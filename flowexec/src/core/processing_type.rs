//! Processing type of a pipeline step.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::FlowError;

/// The resource profile a step declares.
///
/// The type is a static property of the step chosen by its author; the
/// runtime never infers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingType {
    /// Cheap and non-blocking.
    Light,
    /// May block on I/O.
    Blocking,
    /// CPU bound.
    Intensive,
}

impl ProcessingType {
    /// All processing types.
    pub const ALL: [Self; 3] = [Self::Light, Self::Blocking, Self::Intensive];

    /// Returns true if the step must leave a light/event-loop thread.
    #[must_use]
    pub fn needs_offload(self) -> bool {
        !matches!(self, Self::Light)
    }
}

impl fmt::Display for ProcessingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Light => write!(f, "LIGHT"),
            Self::Blocking => write!(f, "BLOCKING"),
            Self::Intensive => write!(f, "INTENSIVE"),
        }
    }
}

impl FromStr for ProcessingType {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LIGHT" | "CPU_LITE" | "CPU_LIGHT" => Ok(Self::Light),
            "BLOCKING" | "IO_RW" | "IO" => Ok(Self::Blocking),
            "INTENSIVE" | "CPU_INTENSIVE" => Ok(Self::Intensive),
            other => Err(FlowError::configuration(format!(
                "unknown processing type '{other}'"
            ))),
        }
    }
}
