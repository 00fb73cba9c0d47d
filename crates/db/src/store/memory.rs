use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{KvStore, StoreError};

/// In-process store. All state sits behind one mutex, so every operation,
/// `lpop` included, is atomic within the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn as_list<'a>(key: &str, value: &'a mut Value) -> Result<&'a mut Vec<Value>, StoreError> {
    value.as_array_mut().ok_or_else(|| StoreError::NotAList {
        key: key.to_string(),
    })
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn rpush(&self, key: &str, item: &str) -> Result<usize, StoreError> {
        let mut entries = self.entries.lock().await;
        let value = entries
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        let list = as_list(key, value)?;
        list.push(Value::String(item.to_string()));
        Ok(list.len())
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock().await;
        let Some(value) = entries.get_mut(key) else {
            return Ok(None);
        };
        let list = as_list(key, value)?;
        if list.is_empty() {
            return Ok(None);
        }
        Ok(match list.remove(0) {
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
    }

    async fn llen(&self, key: &str) -> Result<usize, StoreError> {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(key) {
            Some(value) => Ok(as_list(key, value)?.len()),
            None => Ok(0),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
