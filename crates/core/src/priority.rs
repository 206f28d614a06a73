//! Job priority levels.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::JobError;

/// Priority of a job.
///
/// `Low`, `Medium` and `High` are the canonical levels. Labels outside that
/// set are carried verbatim as `Other` unless the caller parses with
/// [`PriorityPolicy::Strict`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Priority {
    Low,
    Medium,
    High,
    Other(String),
}

/// How unknown priority labels are treated at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriorityPolicy {
    /// Any non-blank label is accepted.
    #[default]
    Loose,
    /// Only `Low`, `Medium` and `High` are accepted.
    Strict,
}

impl Priority {
    /// Parse a priority label.
    ///
    /// Canonical labels match exactly; anything else (including `"high"`) is
    /// kept verbatim as `Other`, so the stored label is always the caller's.
    pub fn parse(raw: &str, policy: PriorityPolicy) -> Result<Self, JobError> {
        if raw.trim().is_empty() {
            return Err(JobError::invalid_argument("priority must not be empty"));
        }

        let priority = match raw {
            "Low" => Priority::Low,
            "Medium" => Priority::Medium,
            "High" => Priority::High,
            _ => Priority::Other(raw.to_string()),
        };

        if policy == PriorityPolicy::Strict && !priority.is_canonical() {
            return Err(JobError::invalid_argument(format!(
                "priority must be one of: Low, Medium, High (got {raw:?})"
            )));
        }

        Ok(priority)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Other(label) => label,
        }
    }

    pub fn is_canonical(&self) -> bool {
        !matches!(self, Priority::Other(_))
    }
}

impl core::fmt::Display for Priority {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Priority {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Priority::parse(&raw, PriorityPolicy::Loose).map_err(serde::de::Error::custom)
    }
}
