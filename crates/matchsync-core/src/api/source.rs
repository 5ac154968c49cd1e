//! The Remote Data Source seam.
//!
//! Every network operation is named. Reads carry an ordered parameter set, so
//! two reads with the same name and parameters always produce the same
//! deduplication key regardless of the order the parameters were added in.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use super::ApiError;

/// An idempotent, deduplicable read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReadOp {
    name: String,
    params: BTreeMap<String, String>,
}

impl ReadOp {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Normalized identity of this read: the operation name followed by the
    /// parameters in key order, form-encoded.
    pub fn dedup_key(&self) -> String {
        if self.params.is_empty() {
            return self.name.clone();
        }
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.params.iter())
            .finish();
        format!("{}?{}", self.name, query)
    }
}

impl fmt::Display for ReadOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dedup_key())
    }
}

/// A mutation. Never deduplicated; every call reaches the network.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOp {
    name: String,
    fields: BTreeMap<String, Value>,
}

impl WriteOp {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }
}

/// Issues named operations against the remote API.
///
/// Implementations return the success payload, or an [`ApiError`] for
/// transport failures and remote rejections alike.
#[async_trait]
pub trait RemoteDataSource: Send + Sync {
    async fn read(&self, op: &ReadOp) -> Result<Value, ApiError>;

    async fn write(&self, op: &WriteOp) -> Result<Value, ApiError>;
}
