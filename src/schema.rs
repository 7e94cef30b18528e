//! Schema types for describing provider and resource structure.
//!
//! Schemas describe the shape of provider configuration and of every BigIP
//! resource type. They drive validation, planning and the protocol's
//! `GetSchema` response.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The type of an attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// A string value.
    String,
    /// A 64-bit integer.
    Int64,
    /// A boolean value.
    Bool,
    /// A list of values of a single type.
    List(Box<AttributeType>),
    /// A set of unique values of a single type.
    Set(Box<AttributeType>),
    /// A map from string keys to values of a single type.
    Map(Box<AttributeType>),
}

impl AttributeType {
    /// Create a list type.
    pub fn list(element_type: AttributeType) -> Self {
        Self::List(Box::new(element_type))
    }

    /// Create a set type.
    pub fn set(element_type: AttributeType) -> Self {
        Self::Set(Box::new(element_type))
    }

    /// Create a map type.
    pub fn map(element_type: AttributeType) -> Self {
        Self::Map(Box::new(element_type))
    }
}

/// Describes how an attribute can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttributeFlags {
    /// The attribute is required in configuration.
    pub required: bool,
    /// The attribute is optional in configuration.
    pub optional: bool,
    /// The attribute is computed by the provider (read-only).
    pub computed: bool,
    /// The attribute is sensitive and should be hidden in logs/UI.
    pub sensitive: bool,
}

impl AttributeFlags {
    /// Flags for a required attribute.
    pub fn required() -> Self {
        Self {
            required: true,
            ..Default::default()
        }
    }

    /// Flags for an optional attribute.
    pub fn optional() -> Self {
        Self {
            optional: true,
            ..Default::default()
        }
    }

    /// Flags for a computed attribute (read-only, set by the BigIP).
    pub fn computed() -> Self {
        Self {
            computed: true,
            ..Default::default()
        }
    }

    /// Flags for an attribute the user may set and the BigIP otherwise defaults.
    pub fn optional_computed() -> Self {
        Self {
            optional: true,
            computed: true,
            ..Default::default()
        }
    }

    /// Whether the user may write this attribute.
    pub fn is_configurable(&self) -> bool {
        self.required || self.optional
    }
}

/// Value constraints checked on top of the attribute type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validator {
    /// Strings must not be empty or whitespace.
    NonEmpty,
    /// Strings must be one of the listed values.
    OneOf(&'static [&'static str]),
    /// Integers must fall within `min..=max`.
    Range {
        /// Smallest accepted value.
        min: i64,
        /// Largest accepted value.
        max: i64,
    },
    /// BigIP full path: `/Partition/name`.
    FullPath,
    /// Pool member reference: `/Partition/node:port`.
    MemberReference,
}

impl Validator {
    /// Check `value`, returning a reason when it is rejected.
    ///
    /// Values of the wrong JSON type are left to type validation.
    pub fn check(&self, value: &serde_json::Value) -> Option<String> {
        match self {
            Self::NonEmpty => {
                let s = value.as_str()?;
                s.trim().is_empty().then(|| "must not be empty".to_string())
            }
            Self::OneOf(allowed) => {
                let s = value.as_str()?;
                (!allowed.contains(&s))
                    .then(|| format!("must be one of: {}", allowed.join(", ")))
            }
            Self::Range { min, max } => {
                let n = value.as_i64()?;
                (n < *min || n > *max)
                    .then(|| format!("must be between {} and {}", min, max))
            }
            Self::FullPath => {
                let s = value.as_str()?;
                (!is_full_path(s))
                    .then(|| "must be a full path like /Common/name".to_string())
            }
            Self::MemberReference => {
                let s = value.as_str()?;
                let valid = match s.rsplit_once(':') {
                    Some((node, port)) => is_full_path(node) && port.parse::<u16>().is_ok(),
                    None => false,
                };
                (!valid).then(|| "must look like /Common/node:port".to_string())
            }
        }
    }
}

/// Returns true for `/Partition/name` style paths.
pub fn is_full_path(s: &str) -> bool {
    match s.strip_prefix('/').and_then(|rest| rest.split_once('/')) {
        Some((partition, name)) => !partition.is_empty() && !name.is_empty(),
        None => false,
    }
}

/// Describes a single attribute in a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// The type of the attribute.
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    /// Flags describing how the attribute can be used.
    #[serde(flatten)]
    pub flags: AttributeFlags,
    /// Human-readable description of the attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// If set, changing this attribute forces resource replacement.
    #[serde(default)]
    pub force_new: bool,
    /// Default value for the attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Extra value constraints.
    #[serde(skip)]
    pub validators: Vec<Validator>,
}

impl Attribute {
    /// Create a new attribute with the given type and flags.
    pub fn new(attr_type: AttributeType, flags: AttributeFlags) -> Self {
        Self {
            attr_type,
            flags,
            description: None,
            force_new: false,
            default: None,
            validators: Vec::new(),
        }
    }

    /// A required string attribute.
    pub fn required_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::required())
    }

    /// An optional string attribute.
    pub fn optional_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional())
    }

    /// An optional string the BigIP defaults when unset.
    pub fn optional_computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional_computed())
    }

    /// A computed string attribute.
    pub fn computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::computed())
    }

    /// An optional int64 attribute.
    pub fn optional_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::optional())
    }

    /// An optional int64 the BigIP defaults when unset.
    pub fn optional_computed_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::optional_computed())
    }

    /// An optional bool attribute.
    pub fn optional_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::optional())
    }

    /// An optional bool the BigIP defaults when unset.
    pub fn optional_computed_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::optional_computed())
    }

    /// Set the description for this attribute.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark this attribute as forcing resource replacement when changed.
    pub fn with_force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Set a default value for this attribute.
    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Add a value constraint.
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Mark this attribute as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.flags.sensitive = true;
        self
    }
}

/// A set of attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Block {
    /// The attributes within this block, keyed by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Attribute>,
    /// Human-readable description of the block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Schema for a resource type or for the provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Schema version.
    #[serde(default)]
    pub version: u64,
    /// The root block containing all attributes.
    #[serde(flatten)]
    pub block: Block,
}

impl Schema {
    /// Create a new schema with the given version.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            block: Block::default(),
        }
    }

    /// Create a schema at version 0.
    pub fn v0() -> Self {
        Self::new(0)
    }

    /// Add an attribute to the schema.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.block.attributes.insert(name.into(), attr);
        self
    }

    /// Set the description for the schema.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.block.description = Some(description.into());
        self
    }

    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.block.attributes.get(name)
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::v0()
    }
}

/// The provider's full schema table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProviderSchema {
    /// Schema for provider configuration.
    #[serde(default)]
    pub provider: Schema,
    /// Schemas for each resource type.
    #[serde(default)]
    pub resources: BTreeMap<String, Schema>,
}

impl ProviderSchema {
    /// Create a new empty provider schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the provider configuration schema.
    pub fn with_provider_config(mut self, schema: Schema) -> Self {
        self.provider = schema;
        self
    }

    /// Add a resource schema.
    pub fn with_resource(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.resources.insert(name.into(), schema);
        self
    }
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// An error that prevents the operation from completing.
    Error,
    /// A warning that doesn't prevent the operation but should be addressed.
    Warning,
}

/// A diagnostic message returned to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity of the diagnostic.
    pub severity: DiagnosticSeverity,
    /// A short summary of the issue.
    pub summary: String,
    /// A detailed description of the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// The attribute path where the issue occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Add detail to this diagnostic.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set the attribute path for this diagnostic.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Returns true for error-severity diagnostics.
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_flags() {
        let required = AttributeFlags::required();
        assert!(required.required);
        assert!(required.is_configurable());

        let computed = AttributeFlags::computed();
        assert!(computed.computed);
        assert!(!computed.is_configurable());

        let optional_computed = AttributeFlags::optional_computed();
        assert!(optional_computed.optional);
        assert!(optional_computed.computed);
        assert!(optional_computed.is_configurable());
    }

    #[test]
    fn test_attribute_builders() {
        let attr = Attribute::required_string()
            .with_description("Node address")
            .with_force_new()
            .with_validator(Validator::NonEmpty);

        assert_eq!(attr.attr_type, AttributeType::String);
        assert!(attr.flags.required);
        assert!(attr.force_new);
        assert_eq!(attr.validators, vec![Validator::NonEmpty]);
    }

    #[test]
    fn test_full_path() {
        assert!(is_full_path("/Common/web"));
        assert!(is_full_path("/Tenant/app/web"));
        assert!(!is_full_path("web"));
        assert!(!is_full_path("/Common"));
        assert!(!is_full_path("/Common/"));
        assert!(!is_full_path("//web"));
    }

    #[test]
    fn test_validators() {
        assert!(Validator::NonEmpty.check(&json!("  ")).is_some());
        assert!(Validator::NonEmpty.check(&json!("x")).is_none());

        let one_of = Validator::OneOf(&["round-robin", "least-connections-member"]);
        assert!(one_of.check(&json!("round-robin")).is_none());
        assert!(one_of.check(&json!("random")).is_some());

        let range = Validator::Range { min: 1, max: 65535 };
        assert!(range.check(&json!(443)).is_none());
        assert!(range.check(&json!(0)).is_some());

        assert!(Validator::MemberReference
            .check(&json!("/Common/node1:80"))
            .is_none());
        assert!(Validator::MemberReference
            .check(&json!("/Common/10.0.0.1:80"))
            .is_none());
        assert!(Validator::MemberReference
            .check(&json!("/Common/node1"))
            .is_some());
        assert!(Validator::MemberReference
            .check(&json!("node1:http"))
            .is_some());

        // Type mismatches are reported by type validation, not validators.
        assert!(Validator::FullPath.check(&json!(42)).is_none());
    }

    #[test]
    fn test_provider_schema() {
        let provider_schema = ProviderSchema::new()
            .with_provider_config(
                Schema::v0().with_attribute("password", Attribute::optional_string().sensitive()),
            )
            .with_resource(
                "bigip_ltm_node",
                Schema::v0()
                    .with_attribute("name", Attribute::required_string())
                    .with_attribute("id", Attribute::computed_string()),
            );

        assert!(provider_schema.provider.attribute("password").unwrap().flags.sensitive);
        assert!(provider_schema.resources.contains_key("bigip_ltm_node"));
    }

    #[test]
    fn test_attribute_type_serializes_for_protocol() {
        let encoded = serde_json::to_value(AttributeType::set(AttributeType::String)).unwrap();
        assert_eq!(encoded, json!({"set": "string"}));
    }

    #[test]
    fn test_diagnostic() {
        let err = Diagnostic::error("Invalid configuration")
            .with_detail("must be between 1 and 65535")
            .with_attribute("port");

        assert!(err.is_error());
        assert_eq!(err.attribute, Some("port".to_string()));
        assert!(!Diagnostic::warning("heads up").is_error());
    }
}
