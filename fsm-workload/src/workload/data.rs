//! Private per-worker data.
//!
//! A workload declares a data template as a JSON object. Each worker gets a
//! deep copy tagged with its `tid`, so behaviors can keep scratch state
//! without sharing anything with other workers.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{StateError, StateResult};

/// Key under which the worker id is stored.
pub const TID_KEY: &str = "tid";

/// Named fields owned by one worker (or the template they are cloned from).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerData {
    fields: Map<String, Value>,
}

impl WorkerData {
    /// Empty data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of a raw JSON value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Build from a JSON value; anything but an object is rejected.
    pub fn from_value(value: Value) -> StateResult<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(StateError::fatal(format!(
                "workload data must be a JSON object, got {other}"
            ))),
        }
    }

    /// Deep copy for worker `tid`, with `tid` set.
    pub fn for_worker(&self, tid: usize) -> Self {
        let mut data = self.clone();
        data.fields.insert(TID_KEY.to_string(), Value::from(tid));
        data
    }

    /// The worker id, if this data belongs to a worker.
    pub fn tid(&self) -> Option<usize> {
        self.fields
            .get(TID_KEY)
            .and_then(Value::as_u64)
            .map(|tid| tid as usize)
    }

    /// Deserialize the field `key`.
    ///
    /// `Ok(None)` if absent; an error if present with the wrong shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> StateResult<Option<T>> {
        self.fields
            .get(key)
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(StateError::from)
    }

    /// Deserialize the field `key`, failing fatally if it is missing.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> StateResult<T> {
        self.get(key)?
            .ok_or_else(|| StateError::fatal(format!("missing workload data field '{key}'")))
    }

    /// Serialize `value` into the field `key`.
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> StateResult<()> {
        self.fields.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    /// Raw JSON value of `key`.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Remove `key`, returning its old value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// True if `key` is set.
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Field names in key order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Overlay `other` key-wise; keys from `other` win.
    pub fn merge(&mut self, other: WorkerData) {
        self.fields.extend(other.fields);
    }

    /// The data as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}
