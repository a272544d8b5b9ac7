use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::BatcherError;

/// Sequential batch number, rendered on disk as `batch<N>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BatchId(u64);

impl BatchId {
    pub const EMPTY: BatchId = BatchId(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    /// The following id, or `None` once the id space is exhausted.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }

    pub fn dir_name(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch{}", self.0)
    }
}

fn batch_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^batch(\d+)$").expect("static regex"))
}

impl FromStr for BatchId {
    type Err = BatcherError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let captures = batch_name_re()
            .captures(value)
            .ok_or_else(|| BatcherError::InvalidBatchName(value.to_string()))?;
        let number = captures[1]
            .parse::<u64>()
            .map_err(|_| BatcherError::InvalidBatchName(value.to_string()))?;
        Ok(Self(number))
    }
}

impl TryFrom<String> for BatchId {
    type Error = BatcherError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BatchId> for String {
    fn from(value: BatchId) -> Self {
        value.to_string()
    }
}

/// One ingested image. Field names match the ledger file format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub filename: String,
    #[serde(rename = "url")]
    pub source_url: String,
    pub batch: BatchId,
}

impl ImageRecord {
    pub fn new(filename: impl Into<String>, source_url: impl Into<String>, batch: BatchId) -> Self {
        Self {
            filename: filename.into(),
            source_url: source_url.into(),
            batch,
        }
    }
}
