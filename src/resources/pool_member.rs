use serde_json::{Map, Value};

use crate::error::ProviderError;
use crate::resource::{encode_full_path, required_str, Field, ResourceKind, LTM};
use crate::schema::{Attribute, Schema, Validator};

/// `bigip_ltm_pool_member`: a node and port inside a pool.
///
/// Members live under their pool, so every operation needs the `pool`
/// attribute and imports use `<pool>|<member>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolMember;

const FIELDS: &[Field] = &[
    Field::new("address", "address"),
    Field::new("connection_limit", "connectionLimit"),
    Field::new("dynamic_ratio", "dynamicRatio"),
    Field::new("priority_group", "priorityGroup"),
    Field::new("ratio", "ratio"),
    Field::new("description", "description"),
];

impl ResourceKind for PoolMember {
    fn type_name(&self) -> &'static str {
        "bigip_ltm_pool_member"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A member of an LTM pool")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "name",
                Attribute::required_string()
                    .with_description("Member reference, /Partition/node:port")
                    .with_force_new()
                    .with_validator(Validator::MemberReference),
            )
            .with_attribute(
                "pool",
                Attribute::required_string()
                    .with_description("Full path of the owning pool")
                    .with_force_new()
                    .with_validator(Validator::FullPath),
            )
            .with_attribute(
                "address",
                Attribute::optional_computed_string()
                    .with_description("Node address; required when the node does not exist yet")
                    .with_force_new(),
            )
            .with_attribute(
                "connection_limit",
                Attribute::optional_computed_int64()
                    .with_validator(Validator::Range { min: 0, max: i64::from(u32::MAX) }),
            )
            .with_attribute(
                "dynamic_ratio",
                Attribute::optional_computed_int64()
                    .with_validator(Validator::Range { min: 1, max: 65535 }),
            )
            .with_attribute(
                "priority_group",
                Attribute::optional_computed_int64()
                    .with_validator(Validator::Range { min: 0, max: 65535 }),
            )
            .with_attribute(
                "ratio",
                Attribute::optional_computed_int64()
                    .with_validator(Validator::Range { min: 1, max: 65535 }),
            )
            .with_attribute("description", Attribute::optional_string())
    }

    fn fields(&self) -> &'static [Field] {
        FIELDS
    }

    fn collection_path(&self, attributes: &Map<String, Value>) -> Result<String, ProviderError> {
        let pool = required_str(attributes, "pool")?;
        Ok(format!("{}/pool/{}/members", LTM, encode_full_path(pool)))
    }

    fn scope_attribute(&self) -> Option<&'static str> {
        Some("pool")
    }
}
