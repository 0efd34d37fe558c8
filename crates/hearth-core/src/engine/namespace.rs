//! The persistent name → value mapping shared by every execution.

use crate::config::EngineConfig;
use crate::interp::Value;
use std::collections::HashMap;

/// Insertion-ordered variable table.
///
/// Rebinding a name keeps its original position; removing and re-adding it
/// moves it to the end.
#[derive(Debug, Default)]
pub struct Namespace {
    order: Vec<String>,
    values: HashMap<String, Value>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if !self.values.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.values.insert(name, value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let removed = self.values.remove(name)?;
        self.order.retain(|n| n != name);
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.values.clear();
    }

    /// Consume the table, yielding every bound value.
    pub fn into_values(self) -> impl Iterator<Item = Value> {
        self.values.into_values()
    }

    /// Number of entries, hidden ones included.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.order
            .iter()
            .filter_map(|name| self.values.get(name).map(|v| (name.as_str(), v)))
    }

    /// Entries whose names do not start with the reserved prefix.
    pub fn visible(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.iter().filter(|(name, _)| is_visible(name))
    }

    pub fn visible_count(&self) -> usize {
        self.visible().count()
    }
}

pub fn is_visible(name: &str) -> bool {
    !name.starts_with(EngineConfig::RESERVED_PREFIX)
}
