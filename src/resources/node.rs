use serde_json::{Map, Value};

use super::base_schema;
use crate::error::ProviderError;
use crate::resource::{Field, ResourceKind, LTM};
use crate::schema::{Attribute, Validator};

/// `bigip_ltm_node`: a backend host.
#[derive(Debug, Clone, Copy, Default)]
pub struct Node;

const FIELDS: &[Field] = &[
    Field::new("address", "address"),
    Field::new("connection_limit", "connectionLimit"),
    Field::new("dynamic_ratio", "dynamicRatio"),
    Field::new("monitor", "monitor"),
    Field::new("rate_limit", "rateLimit"),
    Field::new("ratio", "ratio"),
    Field::new("description", "description"),
];

impl ResourceKind for Node {
    fn type_name(&self) -> &'static str {
        "bigip_ltm_node"
    }

    fn schema(&self) -> crate::schema::Schema {
        base_schema("An LTM node")
            .with_attribute(
                "address",
                Attribute::required_string()
                    .with_description("IP address or FQDN of the node")
                    .with_force_new()
                    .with_validator(Validator::NonEmpty),
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
                "monitor",
                Attribute::optional_computed_string()
                    .with_description("Monitor rule, `default` or a full path"),
            )
            .with_attribute(
                "rate_limit",
                Attribute::optional_computed_string()
                    .with_description("`disabled` or a connections-per-second limit"),
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

    fn collection_path(&self, _attributes: &Map<String, Value>) -> Result<String, ProviderError> {
        Ok(format!("{}/node", LTM))
    }
}
