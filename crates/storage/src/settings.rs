//! In-memory settings store.

use conflux_core::JsonMap;
use conflux_handler::Settings;
use parking_lot::RwLock;
use serde_json::Value;

/// Settings held in a process-local JSON map.
///
/// The typed getters with defaults come from the [`Settings`] port; this
/// type only stores raw values.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<JsonMap>,
}

impl MemorySettings {
    /// Create an empty settings store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded from a JSON map.
    #[must_use]
    pub fn from_map(values: JsonMap) -> Self {
        Self {
            values: RwLock::new(values),
        }
    }

    /// Set a value.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.values.write().insert(key.into(), value);
    }

    /// Remove a value. Returns `true` if one was removed.
    pub fn unset(&self, key: &str) -> bool {
        self.values.write().remove(key).is_some()
    }
}

impl Settings for MemorySettings {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conflux_handler::keys;
    use serde_json::json;

    #[test]
    fn set_and_get_with_defaults() {
        let settings = MemorySettings::new();
        settings.set(keys::EXECUTION_TIMEOUT_SECONDS, json!(120));
        settings.set(keys::ai_model("openai"), json!("gpt-4o-mini"));

        assert_eq!(settings.get_i64(keys::EXECUTION_TIMEOUT_SECONDS, 300), 120);
        assert_eq!(settings.get_i64(keys::RETRY_MAX_ATTEMPTS, 3), 3);
        assert_eq!(
            settings.get_str(&keys::ai_model("openai"), "?"),
            "gpt-4o-mini"
        );
        assert_eq!(settings.get_str(&keys::ai_model("ollama"), "llama3"), "llama3");
    }

    #[test]
    fn unset() {
        let settings = MemorySettings::new();
        settings.set("a", json!(1));
        assert!(settings.unset("a"));
        assert!(!settings.unset("a"));
        assert!(settings.get("a").is_none());
    }

    #[test]
    fn seeded_from_map() {
        let Value::Object(map) = json!({"execution.maxParallel": 8}) else {
            unreachable!()
        };
        let settings = MemorySettings::from_map(map);
        assert_eq!(settings.get_i64(keys::EXECUTION_MAX_PARALLEL, 4), 8);
    }
}
