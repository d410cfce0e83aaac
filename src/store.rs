use std::collections::HashMap;

/// Per-course records, e.g. pending file selections or pending edits.
#[derive(Debug, Clone)]
pub struct KeyedStore<V> {
    records: HashMap<String, V>,
}

impl<V> Default for KeyedStore<V> {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
        }
    }
}

impl<V> KeyedStore<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.records.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: V) {
        self.records.insert(key.into(), value);
    }

    pub fn clear(&mut self, key: &str) -> Option<V> {
        self.records.remove(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<V: Clone + Default> KeyedStore<V> {
    pub fn get_or_default(&self, key: &str) -> V {
        self.records.get(key).cloned().unwrap_or_default()
    }

    /// Edits the record in place, creating a default one first if needed.
    pub fn update(&mut self, key: &str, edit: impl FnOnce(&mut V)) {
        let record = self.records.entry(key.to_string()).or_default();
        edit(record);
    }
}
