use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HustleError;

/// Contract-assigned task identifier. Always positive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl TaskId {
    pub fn new(id: u64) -> Result<Self, HustleError> {
        if id == 0 {
            return Err(HustleError::InvalidInput("task id must be positive".into()));
        }
        Ok(Self(id))
    }
}

impl FromStr for TaskId {
    type Err = HustleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s
            .trim()
            .parse::<u64>()
            .map_err(|_| HustleError::InvalidInput(format!("invalid task id: {s:?}")))?;
        Self::new(id)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content identifier returned by the pinning service.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cid(pub String);

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
