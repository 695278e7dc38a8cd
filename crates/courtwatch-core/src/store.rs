//! Key-value variable store with JSON values.
//!
//! Holds the state that outlives a cycle (the dedup cache) and runtime
//! overrides that operators change without touching the config file.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{CourtwatchError, Result};

/// Egress proxy used to download the proxy list.
pub const VAR_PROXY_URL: &str = "PROXY_URL";
/// Overrides `proxy.list_url`.
pub const VAR_PROXY_LIST_URL: &str = "PROXY_LIST_URL";
/// Overrides `messaging.gateway_address`.
pub const VAR_GATEWAY_ADDRESS: &str = "WCF_IP";
/// Overrides `scan.business_window`, as `{"start_time": .., "end_time": ..}`.
pub const VAR_BUSINESS_WINDOW: &str = "BUSINESS_WINDOW";

pub trait VariableStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;

    fn set(&self, key: &str, value: &Value, description: Option<&str>) -> Result<()>;

    /// Returns whether the key existed.
    fn delete(&self, key: &str) -> Result<bool>;
}

impl dyn VariableStore {
    /// Read and deserialize a variable.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Serialize and write a variable.
    pub fn set_as<T: Serialize>(&self, key: &str, value: &T, description: Option<&str>) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set(key, &value, description)
    }

    /// Read a plain-text variable. Empty strings count as unset.
    pub fn get_string(&self, key: &str) -> Result<Option<String>> {
        let text = match self.get(key)? {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => return Ok(None),
            Some(other) => other.to_string(),
        };
        let text = text.trim().to_string();
        Ok((!text.is_empty()).then_some(text))
    }
}

/// In-process store; nothing survives the process.
#[derive(Default)]
pub struct MemoryVariableStore {
    vars: Mutex<HashMap<String, (Value, Option<String>)>>,
}

impl MemoryVariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Description last written with `key`.
    pub fn description(&self, key: &str) -> Option<String> {
        self.vars
            .lock()
            .ok()
            .and_then(|vars| vars.get(key).and_then(|(_, d)| d.clone()))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, (Value, Option<String>)>>> {
        self.vars
            .lock()
            .map_err(|_| CourtwatchError::Store("variable map poisoned".into()))
    }
}

impl VariableStore for MemoryVariableStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.lock()?.get(key).map(|(v, _)| v.clone()))
    }

    fn set(&self, key: &str, value: &Value, description: Option<&str>) -> Result<()> {
        self.lock()?
            .insert(key.to_string(), (value.clone(), description.map(String::from)));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.lock()?.remove(key).is_some())
    }
}
