//! Field-result cache scoped to one unit of work.
//!
//! Field-filler methods memoize their results here, keyed by the shape of the
//! result, the type of its values and the identifier they were queried with.
//! A method re-entered through a cyclic relation finds its own entry instead
//! of querying again.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::classify::ReturnKind;
use crate::config::CacheConfig;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub shape: ReturnKind,
    pub value_type: String,
    pub id: Value,
}

impl CacheKey {
    pub fn new(shape: ReturnKind, value_type: impl Into<String>, id: Value) -> Self {
        Self {
            shape,
            value_type: value_type.into(),
            id,
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    value: Value,
    created: Instant,
}

#[derive(Debug)]
pub struct FieldCache {
    entries: HashMap<CacheKey, CacheEntry>,
    enabled: bool,
    use_threshold: bool,
    threshold: Duration,
}

impl Default for FieldCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

impl FieldCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            enabled: config.enabled,
            use_threshold: config.use_threshold,
            threshold: config.threshold(),
        }
    }

    /// Cached value for the key, unless missing, expired or caching is off.
    pub fn get(&self, shape: ReturnKind, value_type: &str, id: &Value) -> Option<&Value> {
        if !self.enabled {
            return None;
        }
        let key = CacheKey::new(shape, value_type, id.clone());
        let hit = self
            .entries
            .get(&key)
            .filter(|entry| self.is_valid(entry))
            .map(|entry| &entry.value);
        trace!(?shape, value_type, %id, hit = hit.is_some(), "field cache lookup");
        hit
    }

    pub fn contains(&self, shape: ReturnKind, value_type: &str, id: &Value) -> bool {
        self.get(shape, value_type, id).is_some()
    }

    /// Stores `value`, overwriting any earlier entry for the key.
    pub fn put(&mut self, shape: ReturnKind, value_type: impl Into<String>, id: Value, value: Value) {
        if !self.enabled {
            return;
        }
        self.entries.insert(
            CacheKey::new(shape, value_type, id),
            CacheEntry {
                value,
                created: Instant::now(),
            },
        );
    }

    /// Drops the entry for the key, returning its value if there was one.
    pub fn remove(&mut self, shape: ReturnKind, value_type: &str, id: &Value) -> Option<Value> {
        let key = CacheKey::new(shape, value_type, id.clone());
        self.entries.remove(&key).map(|entry| entry.value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turning caching off drops every entry.
    pub fn set_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.entries.clear();
        }
        self.enabled = enabled;
    }

    pub fn set_use_threshold(&mut self, use_threshold: bool) {
        self.use_threshold = use_threshold;
    }

    pub fn set_threshold(&mut self, threshold: Duration) {
        self.threshold = threshold;
    }

    fn is_valid(&self, entry: &CacheEntry) -> bool {
        !self.use_threshold || entry.created.elapsed() < self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn check_shape(shape: ReturnKind, other_shape: ReturnKind, value: Value, key: Value, other_key: Value) {
        let mut cache = FieldCache::default();

        cache.put(shape, "String", key.clone(), value.clone());
        assert_eq!(cache.get(shape, "String", &key), Some(&value));
        assert!(cache.contains(shape, "String", &key));

        assert_eq!(cache.get(shape, "String", &other_key), None);
        assert_eq!(cache.get(other_shape, "String", &key), None);
        assert_eq!(cache.get(shape, "Integer", &key), None);

        cache.clear();
        assert!(!cache.contains(shape, "String", &key));
    }

    #[test]
    fn test_optional_shape() {
        check_shape(
            ReturnKind::Optional,
            ReturnKind::Set,
            Value::some(Value::from("hello")),
            Value::Int(10),
            Value::Int(1),
        );
    }

    #[test]
    fn test_set_shape() {
        check_shape(
            ReturnKind::Set,
            ReturnKind::List,
            Value::Set(vec![Value::Int(100)]),
            Value::from("key"),
            Value::from("other key"),
        );
    }

    #[test]
    fn test_absent_optional_is_a_hit() {
        let mut cache = FieldCache::default();
        cache.put(ReturnKind::Optional, "Person", Value::Int(3), Value::none());
        assert_eq!(cache.get(ReturnKind::Optional, "Person", &Value::Int(3)), Some(&Value::none()));
    }

    #[test]
    fn test_threshold_expires_entries() {
        let mut cache = FieldCache::default();
        cache.set_threshold(Duration::from_millis(20));
        cache.put(ReturnKind::Optional, "String", Value::Int(10), Value::none());
        thread::sleep(Duration::from_millis(40));
        assert!(!cache.contains(ReturnKind::Optional, "String", &Value::Int(10)));

        cache.set_use_threshold(false);
        assert!(cache.contains(ReturnKind::Optional, "String", &Value::Int(10)));

        cache.set_use_threshold(true);
        cache.put(ReturnKind::Optional, "String", Value::Int(10), Value::some(Value::from("fresh")));
        assert_eq!(
            cache.get(ReturnKind::Optional, "String", &Value::Int(10)),
            Some(&Value::some(Value::from("fresh")))
        );
    }

    #[test]
    fn test_disabled_cache_stores_nothing() {
        let mut cache = FieldCache::default();
        cache.put(ReturnKind::List, "Person", Value::Int(1), Value::List(Vec::new()));
        cache.set_enabled(false);
        assert!(cache.is_empty());

        cache.put(ReturnKind::List, "Person", Value::Int(1), Value::List(Vec::new()));
        assert!(cache.is_empty());
        assert!(!cache.contains(ReturnKind::List, "Person", &Value::Int(1)));
    }
}
