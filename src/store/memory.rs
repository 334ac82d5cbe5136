use super::{Store, StoreChange, StoreError, Transition, CHANGE_CAPACITY};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Process-local store.
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
    changes: broadcast::Sender<StoreChange>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            values: Mutex::new(HashMap::new()),
            changes,
        }
    }

    fn publish(&self, key: &str, value: Value) {
        // No subscribers is fine.
        let _ = self.changes.send(StoreChange {
            key: key.to_string(),
            value,
        });
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str, default: Value) -> Result<Value, StoreError> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned().unwrap_or(default))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.clone());
        self.publish(key, value);
        Ok(())
    }

    async fn update(
        &self,
        key: &str,
        default: Value,
        transition: Transition,
    ) -> Result<Value, StoreError> {
        let next = {
            let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
            let current = values.remove(key).unwrap_or(default);
            let next = transition(current);
            values.insert(key.to_string(), next.clone());
            next
        };
        self.publish(key, next.clone());
        Ok(next)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
