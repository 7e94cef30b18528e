use serde_json::{Map, Value};

use super::base_schema;
use crate::error::ProviderError;
use crate::resource::{Conversion, Field, ResourceKind, LTM};
use crate::schema::{Attribute, Schema, Validator};

/// `bigip_ltm_virtual_server`: a listener that load balances to a pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtualServer;

const FIELDS: &[Field] = &[
    Field::new("destination", "destination"),
    Field::new("source", "source"),
    Field::new("mask", "mask"),
    Field::new("ip_protocol", "ipProtocol"),
    Field::new("pool", "pool"),
    Field::with(
        "source_address_translation",
        "sourceAddressTranslation",
        Conversion::TypeObject,
    ),
    Field::with("translate_address", "translateAddress", Conversion::EnabledDisabled),
    Field::with("translate_port", "translatePort", Conversion::EnabledDisabled),
    Field::new("connection_limit", "connectionLimit"),
    Field::new("description", "description"),
];

impl ResourceKind for VirtualServer {
    fn type_name(&self) -> &'static str {
        "bigip_ltm_virtual_server"
    }

    fn schema(&self) -> Schema {
        base_schema("An LTM virtual server")
            .with_attribute(
                "destination",
                Attribute::required_string()
                    .with_description("Listener as /Partition/address:port")
                    .with_validator(Validator::MemberReference),
            )
            .with_attribute(
                "source",
                Attribute::optional_computed_string()
                    .with_description("Accepted client CIDR, 0.0.0.0/0 by default"),
            )
            .with_attribute("mask", Attribute::optional_computed_string())
            .with_attribute(
                "ip_protocol",
                Attribute::optional_computed_string()
                    .with_validator(Validator::OneOf(&["any", "tcp", "udp", "sctp"])),
            )
            .with_attribute(
                "pool",
                Attribute::optional_string()
                    .with_description("Default pool")
                    .with_validator(Validator::FullPath),
            )
            .with_attribute(
                "source_address_translation",
                Attribute::optional_computed_string()
                    .with_validator(Validator::OneOf(&["none", "automap"])),
            )
            .with_attribute("translate_address", Attribute::optional_computed_bool())
            .with_attribute("translate_port", Attribute::optional_computed_bool())
            .with_attribute(
                "connection_limit",
                Attribute::optional_computed_int64()
                    .with_validator(Validator::Range { min: 0, max: i64::from(u32::MAX) }),
            )
            .with_attribute("description", Attribute::optional_string())
    }

    fn fields(&self) -> &'static [Field] {
        FIELDS
    }

    fn collection_path(&self, _attributes: &Map<String, Value>) -> Result<String, ProviderError> {
        Ok(format!("{}/virtual", LTM))
    }
}
