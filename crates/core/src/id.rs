//! Job identifier.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// Identifier of a job.
///
/// Assigned by the store when the job is inserted and never changed after.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(i64);

impl JobId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl core::fmt::Display for JobId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<i64> for JobId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<JobId> for i64 {
    fn from(value: JobId) -> Self {
        value.0
    }
}

impl FromStr for JobId {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<i64>()
            .map_err(|e| JobError::invalid_argument(format!("JobId: {e}")))?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_integer_ids() {
        assert_eq!("42".parse::<JobId>().unwrap(), JobId::new(42));
        assert_eq!(" 7 ".parse::<JobId>().unwrap().get(), 7);
    }

    #[test]
    fn rejects_non_numeric_ids() {
        let err = "abc".parse::<JobId>().unwrap_err();
        assert!(matches!(err, JobError::InvalidArgument(_)));
    }
}
