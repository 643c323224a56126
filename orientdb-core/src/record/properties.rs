//! Global properties: schema-registered `(id, name, type)` triples that
//! record headers may reference by id instead of by name.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::record::DataType;

/// A schema-registered property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalProperty {
    /// Property id, as used in record headers.
    pub id: i32,
    /// Property name.
    pub name: String,
    /// Declared type.
    pub data_type: DataType,
}

impl GlobalProperty {
    /// Creates a property.
    pub fn new(id: i32, name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id,
            name: name.into(),
            data_type,
        }
    }
}

/// Looks up global properties by id while decoding records.
pub trait PropertyResolver: Send + Sync {
    /// Returns the property registered under `id`.
    fn property(&self, id: i32) -> Option<GlobalProperty>;
}

/// Reloads the global property list from the server.
///
/// Invoked when a record references a property id the local cache does not
/// know, which means the cached schema is stale.
#[async_trait]
pub trait SchemaRefresher: Send + Sync {
    /// Refreshes the property cache.
    async fn refresh_global_properties(&self) -> Result<()>;
}

/// A thread-safe cache of global properties.
#[derive(Debug, Default)]
pub struct GlobalProperties {
    properties: RwLock<HashMap<i32, GlobalProperty>>,
}

impl GlobalProperties {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces one property.
    pub fn insert(&self, property: GlobalProperty) {
        self.properties.write().insert(property.id, property);
    }

    /// Replaces the whole registry content.
    pub fn replace_all(&self, properties: impl IntoIterator<Item = GlobalProperty>) {
        let fresh: HashMap<_, _> = properties.into_iter().map(|p| (p.id, p)).collect();
        debug!(count = fresh.len(), "global properties replaced");
        *self.properties.write() = fresh;
    }

    /// Returns the number of registered properties.
    pub fn len(&self) -> usize {
        self.properties.read().len()
    }

    /// Returns true if no property is registered.
    pub fn is_empty(&self) -> bool {
        self.properties.read().is_empty()
    }

    /// Finds a property by name.
    pub fn by_name(&self, name: &str) -> Option<GlobalProperty> {
        self.properties
            .read()
            .values()
            .find(|p| p.name == name)
            .cloned()
    }
}

impl PropertyResolver for GlobalProperties {
    fn property(&self, id: i32) -> Option<GlobalProperty> {
        self.properties.read().get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let props = GlobalProperties::new();
        assert!(props.is_empty());
        props.insert(GlobalProperty::new(7, "name", DataType::String));
        assert_eq!(props.property(7).unwrap().name, "name");
        assert!(props.property(8).is_none());
        assert_eq!(props.by_name("name").unwrap().id, 7);
    }

    #[test]
    fn test_replace_all_drops_old_entries() {
        let props = GlobalProperties::new();
        props.insert(GlobalProperty::new(1, "old", DataType::Integer));
        props.replace_all(vec![
            GlobalProperty::new(2, "a", DataType::Long),
            GlobalProperty::new(3, "b", DataType::Date),
        ]);
        assert_eq!(props.len(), 2);
        assert!(props.property(1).is_none());
        assert_eq!(props.property(3).unwrap().data_type, DataType::Date);
    }
}
