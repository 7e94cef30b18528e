//! BigIP LTM resource kinds and the registry that serves them.

mod monitor;
mod node;
mod pool;
mod pool_member;
mod virtual_server;

pub use monitor::Monitor;
pub use node::Node;
pub use pool::Pool;
pub use pool_member::PoolMember;
pub use virtual_server::VirtualServer;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::provider_config_schema;
use crate::error::ProviderError;
use crate::resource::ResourceKind;
use crate::schema::{Attribute, ProviderSchema, Schema, Validator};

/// Resource kinds by type name.
#[derive(Clone, Default)]
pub struct ResourceRegistry {
    kinds: BTreeMap<&'static str, Arc<dyn ResourceKind>>,
}

impl ResourceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every LTM kind this provider supports.
    pub fn ltm() -> Self {
        Self::new()
            .register(Node)
            .register(Pool)
            .register(PoolMember)
            .register(Monitor)
            .register(VirtualServer)
    }

    /// Add a kind, replacing any kind with the same type name.
    pub fn register(mut self, kind: impl ResourceKind) -> Self {
        self.kinds.insert(kind.type_name(), Arc::new(kind));
        self
    }

    /// Look up a kind.
    pub fn get(&self, type_name: &str) -> Result<&dyn ResourceKind, ProviderError> {
        self.kinds
            .get(type_name)
            .map(|kind| kind.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(type_name.to_string()))
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.kinds.keys().copied()
    }

    /// Provider config schema plus every resource schema.
    pub fn provider_schema(&self) -> ProviderSchema {
        self.kinds.iter().fold(
            ProviderSchema::new().with_provider_config(provider_config_schema()),
            |schema, (name, kind)| schema.with_resource(*name, kind.schema()),
        )
    }
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.kinds.keys()).finish()
    }
}

/// `id` and `name` attributes shared by every kind.
fn base_schema(description: &str) -> Schema {
    Schema::v0()
        .with_description(description)
        .with_attribute(
            "id",
            Attribute::computed_string().with_description("Full path of the object"),
        )
        .with_attribute(
            "name",
            Attribute::required_string()
                .with_description("Full path, such as /Common/web")
                .with_force_new()
                .with_validator(Validator::FullPath),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ltm_registry() {
        let registry = ResourceRegistry::ltm();
        let names: Vec<_> = registry.type_names().collect();
        assert_eq!(
            names,
            vec![
                "bigip_ltm_monitor",
                "bigip_ltm_node",
                "bigip_ltm_pool",
                "bigip_ltm_pool_member",
                "bigip_ltm_virtual_server",
            ]
        );
        assert!(registry.get("bigip_ltm_pool").is_ok());
        assert!(matches!(
            registry.get("bigip_gtm_pool"),
            Err(ProviderError::UnknownResource(_))
        ));
    }

    #[test]
    fn test_every_field_is_in_the_schema() {
        let registry = ResourceRegistry::ltm();
        for name in registry.type_names() {
            let kind = registry.get(name).unwrap();
            let schema = kind.schema();
            assert!(schema.attribute("id").is_some(), "{} has no id", name);
            assert!(schema.attribute(kind.name_attribute()).is_some());
            for field in kind.fields() {
                assert!(
                    schema.attribute(field.attribute).is_some(),
                    "{}.{} missing from schema",
                    name,
                    field.attribute
                );
            }
        }
    }

    #[test]
    fn test_provider_schema_includes_config() {
        let schema = ResourceRegistry::ltm().provider_schema();
        assert!(schema.provider.attribute("address").is_some());
        assert_eq!(schema.resources.len(), 5);
    }
}
