use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Cardinality tag on an association field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationNature {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
    OneWay,
}

/// How the related entity points back at the owner: a single key, or a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackReference {
    Single,
    Many,
}

impl RelationNature {
    /// Shape of the `via` field on the related entity type. Determines how a
    /// deletion cascade scrubs the back-reference: single-valued fields are
    /// cleared to null, multi-valued fields have the key pulled from the set.
    pub fn back_reference(&self) -> BackReference {
        match self {
            RelationNature::OneToOne | RelationNature::ManyToOne | RelationNature::OneToMany => {
                BackReference::Single
            }
            RelationNature::ManyToMany | RelationNature::OneWay => BackReference::Many,
        }
    }
}

/// One association field on an entity type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationDescriptor {
    /// Field name on the owning entity.
    pub alias: String,
    pub nature: RelationNature,
    /// Field on the related entity type that points back at the owner.
    pub via: String,
    /// Collection the relation's target lives in.
    pub collection: String,
    /// Optional registry namespace for plugin-owned collections.
    #[serde(default)]
    pub plugin: Option<String>,
}

impl RelationDescriptor {
    pub fn new(
        alias: impl Into<String>,
        nature: RelationNature,
        via: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            alias: alias.into(),
            nature,
            via: via.into(),
            collection: collection.into(),
            plugin: None,
        }
    }

    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    /// Physical collection name in the document store, namespace included.
    pub fn target_collection(&self) -> String {
        match &self.plugin {
            Some(plugin) => format!("{}::{}", plugin, self.collection),
            None => self.collection.clone(),
        }
    }
}

/// A relation descriptor paired with the entity type it belongs to, as read
/// from startup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationEntry {
    pub entity: String,
    #[serde(flatten)]
    pub descriptor: RelationDescriptor,
}

/// Index of relation descriptors per entity type, built once at startup and
/// read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct RelationRegistry {
    relations: HashMap<String, Vec<RelationDescriptor>>,
}

impl RelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<RelationEntry>) -> Self {
        let mut registry = Self::new();
        for entry in entries {
            registry.register(entry.entity, entry.descriptor);
        }
        registry
    }

    pub fn register(&mut self, entity: impl Into<String>, descriptor: RelationDescriptor) {
        self.relations.entry(entity.into()).or_default().push(descriptor);
    }

    /// All relations declared on an entity type. Unknown types have none.
    pub fn relations_of(&self, entity: &str) -> &[RelationDescriptor] {
        self.relations.get(entity).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Look up one relation by its alias on the owning entity.
    pub fn relation(&self, entity: &str, alias: &str) -> Option<&RelationDescriptor> {
        self.relations_of(entity).iter().find(|d| d.alias == alias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_back_reference_shape_per_nature() {
        assert_eq!(RelationNature::OneToOne.back_reference(), BackReference::Single);
        assert_eq!(RelationNature::ManyToOne.back_reference(), BackReference::Single);
        assert_eq!(RelationNature::OneToMany.back_reference(), BackReference::Single);
        assert_eq!(RelationNature::ManyToMany.back_reference(), BackReference::Many);
        assert_eq!(RelationNature::OneWay.back_reference(), BackReference::Many);
    }

    #[test]
    fn test_nature_serializes_as_camel_case() {
        let tag = serde_json::to_value(RelationNature::ManyToMany).unwrap();
        assert_eq!(tag, serde_json::json!("manyToMany"));

        let parsed: RelationNature = serde_json::from_value(serde_json::json!("oneWay")).unwrap();
        assert_eq!(parsed, RelationNature::OneWay);
    }

    #[test]
    fn test_target_collection_respects_plugin_namespace() {
        let plain = RelationDescriptor::new("orders", RelationNature::OneToMany, "buyer", "order");
        assert_eq!(plain.target_collection(), "order");

        let namespaced = plain.clone().with_plugin("shop");
        assert_eq!(namespaced.target_collection(), "shop::order");
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = RelationRegistry::new();
        registry.register(
            "account",
            RelationDescriptor::new("widgets", RelationNature::OneToMany, "owner", "widget"),
        );
        registry.register(
            "account",
            RelationDescriptor::new("teams", RelationNature::ManyToMany, "members", "team"),
        );

        assert_eq!(registry.relations_of("account").len(), 2);
        assert!(registry.relations_of("widget").is_empty());
        assert_eq!(
            registry.relation("account", "teams").map(|d| d.via.as_str()),
            Some("members")
        );
        assert!(registry.relation("account", "missing").is_none());
    }

    #[test]
    fn test_from_entries() {
        let entries: Vec<RelationEntry> = serde_json::from_value(serde_json::json!([
            {
                "entity": "account",
                "alias": "widgets",
                "nature": "oneToMany",
                "via": "owner",
                "collection": "widget"
            }
        ]))
        .unwrap();

        let registry = RelationRegistry::from_entries(entries);
        assert_eq!(registry.relations_of("account").len(), 1);
    }
}
