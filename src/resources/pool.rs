use serde_json::{Map, Value};

use super::base_schema;
use crate::error::ProviderError;
use crate::resource::{Conversion, Field, ResourceKind, LTM};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema, Validator};

/// `bigip_ltm_pool`: a group of pool members.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pool;

/// Load balancing modes accepted by TMOS.
pub const LOAD_BALANCING_MODES: &[&str] = &[
    "dynamic-ratio-member",
    "dynamic-ratio-node",
    "fastest-app-response",
    "fastest-node",
    "least-connections-member",
    "least-connections-node",
    "least-sessions",
    "observed-member",
    "observed-node",
    "predictive-member",
    "predictive-node",
    "ratio-least-connections-member",
    "ratio-least-connections-node",
    "ratio-member",
    "ratio-node",
    "ratio-session",
    "round-robin",
    "weighted-least-connections-member",
    "weighted-least-connections-node",
];

const FIELDS: &[Field] = &[
    Field::new("load_balancing_mode", "loadBalancingMode"),
    Field::with("monitors", "monitor", Conversion::MonitorRule),
    Field::with("allow_nat", "allowNat", Conversion::YesNo),
    Field::with("allow_snat", "allowSnat", Conversion::YesNo),
    Field::new("slow_ramp_time", "slowRampTime"),
    Field::new("reselect_tries", "reselectTries"),
    Field::new("service_down_action", "serviceDownAction"),
    Field::new("description", "description"),
];

impl ResourceKind for Pool {
    fn type_name(&self) -> &'static str {
        "bigip_ltm_pool"
    }

    fn schema(&self) -> Schema {
        base_schema("An LTM pool")
            .with_attribute(
                "load_balancing_mode",
                Attribute::optional_computed_string()
                    .with_validator(Validator::OneOf(LOAD_BALANCING_MODES)),
            )
            .with_attribute(
                "monitors",
                Attribute::new(
                    AttributeType::set(AttributeType::String),
                    AttributeFlags::optional_computed(),
                )
                .with_description("Monitors that must all succeed for a member to be up"),
            )
            .with_attribute("allow_nat", Attribute::optional_computed_bool())
            .with_attribute("allow_snat", Attribute::optional_computed_bool())
            .with_attribute(
                "slow_ramp_time",
                Attribute::optional_computed_int64()
                    .with_validator(Validator::Range { min: 0, max: 900 }),
            )
            .with_attribute(
                "reselect_tries",
                Attribute::optional_computed_int64()
                    .with_validator(Validator::Range { min: 0, max: 65535 }),
            )
            .with_attribute(
                "service_down_action",
                Attribute::optional_computed_string()
                    .with_validator(Validator::OneOf(&["none", "reset", "drop", "reselect"])),
            )
            .with_attribute("description", Attribute::optional_string())
    }

    fn fields(&self) -> &'static [Field] {
        FIELDS
    }

    fn collection_path(&self, _attributes: &Map<String, Value>) -> Result<String, ProviderError> {
        Ok(format!("{}/pool", LTM))
    }
}
