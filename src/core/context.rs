use std::collections::HashMap;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Key-value resume state attached to a step execution.
///
/// The context stores anything a step collaborator needs to survive a restart,
/// most importantly the reader's resume cursor. Values are kept as JSON so the
/// context can be persisted alongside the execution metadata without knowing
/// the concrete types involved.
///
/// The context is persisted in the same transaction as the chunk commit, so
/// after a failure it reflects exactly the state of the last committed chunk.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    entries: HashMap<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a serializable value under the given key, replacing any
    /// previous value.
    pub fn put<T: Serialize>(&mut self, key: &str, value: &T) {
        if let Ok(value) = serde_json::to_value(value) {
            self.entries.insert(key.to_owned(), value);
        }
    }

    /// Retrieves the value stored under the given key, deserialized to the
    /// requested type. Returns `None` when the key is absent or the stored
    /// value does not match the type.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.entries
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_and_get_typed_values() {
        let mut context = ExecutionContext::new();
        context.put("offset", &42u64);
        context.put("label", &"credit-import".to_string());

        assert_eq!(context.get::<u64>("offset"), Some(42));
        assert_eq!(
            context.get::<String>("label"),
            Some("credit-import".to_string())
        );
        assert_eq!(context.get::<u64>("missing"), None);
    }

    #[test]
    fn get_with_wrong_type_returns_none() {
        let mut context = ExecutionContext::new();
        context.put("label", &"not a number".to_string());

        assert_eq!(context.get::<u64>("label"), None);
    }

    #[test]
    fn survives_a_serde_round_trip() {
        let mut context = ExecutionContext::new();
        context.put("offset", &7u64);

        let serialized = serde_json::to_string(&context).unwrap();
        let restored: ExecutionContext = serde_json::from_str(&serialized).unwrap();

        assert_eq!(restored, context);
        assert_eq!(restored.get::<u64>("offset"), Some(7));
    }

    #[test]
    fn remove_clears_the_entry() {
        let mut context = ExecutionContext::new();
        context.put("offset", &1u64);

        assert!(context.remove("offset").is_some());
        assert!(context.is_empty());
    }
}
