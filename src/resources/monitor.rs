use serde_json::{Map, Value};

use super::base_schema;
use crate::error::ProviderError;
use crate::resource::{required_str, Conversion, Field, ResourceKind, LTM};
use crate::schema::{Attribute, Schema, Validator};

/// `bigip_ltm_monitor`: a health monitor derived from a built-in parent.
///
/// The REST collection depends on the monitor type, taken from the last
/// segment of `parent`, so `parent` scopes the object like a pool scopes
/// its members.
#[derive(Debug, Clone, Copy, Default)]
pub struct Monitor;

/// Built-in monitors a custom monitor may derive from.
pub const PARENTS: &[&str] = &[
    "/Common/gateway_icmp",
    "/Common/http",
    "/Common/https",
    "/Common/icmp",
    "/Common/tcp",
    "/Common/tcp_half_open",
    "/Common/udp",
];

const FIELDS: &[Field] = &[
    Field::new("parent", "defaultsFrom"),
    Field::new("interval", "interval"),
    Field::new("timeout", "timeout"),
    Field::new("send", "send"),
    Field::new("receive", "recv"),
    Field::new("receive_disable", "recvDisable"),
    Field::new("destination", "destination"),
    Field::with("reverse", "reverse", Conversion::EnabledDisabled),
    Field::with("transparent", "transparent", Conversion::EnabledDisabled),
    Field::with("manual_resume", "manualResume", Conversion::EnabledDisabled),
    Field::new("description", "description"),
];

impl Monitor {
    fn monitor_type(parent: &str) -> Result<&str, ProviderError> {
        match parent.rsplit('/').next() {
            Some(kind) if !kind.is_empty() => Ok(kind),
            _ => Err(ProviderError::Validation(format!(
                "cannot derive monitor type from parent {:?}",
                parent
            ))),
        }
    }
}

impl ResourceKind for Monitor {
    fn type_name(&self) -> &'static str {
        "bigip_ltm_monitor"
    }

    fn schema(&self) -> Schema {
        base_schema("An LTM health monitor")
            .with_attribute(
                "parent",
                Attribute::required_string()
                    .with_description("Built-in monitor to derive from, such as /Common/http")
                    .with_force_new()
                    .with_validator(Validator::OneOf(PARENTS)),
            )
            .with_attribute(
                "interval",
                Attribute::optional_computed_int64()
                    .with_description("Seconds between probes")
                    .with_validator(Validator::Range { min: 1, max: 86400 }),
            )
            .with_attribute(
                "timeout",
                Attribute::optional_computed_int64()
                    .with_description("Seconds before a silent target is marked down")
                    .with_validator(Validator::Range { min: 1, max: 86400 }),
            )
            .with_attribute("send", Attribute::optional_computed_string())
            .with_attribute("receive", Attribute::optional_computed_string())
            .with_attribute("receive_disable", Attribute::optional_computed_string())
            .with_attribute(
                "destination",
                Attribute::optional_computed_string()
                    .with_description("Probe destination, `*:*` for the member itself"),
            )
            .with_attribute("reverse", Attribute::optional_computed_bool())
            .with_attribute("transparent", Attribute::optional_computed_bool())
            .with_attribute("manual_resume", Attribute::optional_computed_bool())
            .with_attribute("description", Attribute::optional_string())
    }

    fn fields(&self) -> &'static [Field] {
        FIELDS
    }

    fn collection_path(&self, attributes: &Map<String, Value>) -> Result<String, ProviderError> {
        let parent = required_str(attributes, "parent")?;
        Ok(format!("{}/monitor/{}", LTM, Self::monitor_type(parent)?))
    }

    fn scope_attribute(&self) -> Option<&'static str> {
        Some("parent")
    }
}
