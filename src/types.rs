//! Convenience types shared between the provider and the protocol layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::generated;
use crate::schema::ProviderSchema;

/// A change to a single attribute during a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// The attribute that changed.
    pub path: String,
    /// The value before the change (None if being set for the first time).
    pub before: Option<Value>,
    /// The value after the change (None if being removed).
    pub after: Option<Value>,
}

impl AttributeChange {
    /// Create a change for a newly set attribute.
    pub fn added(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            before: None,
            after: Some(value),
        }
    }

    /// Create a change for a removed attribute.
    pub fn removed(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            before: Some(value),
            after: None,
        }
    }

    /// Create a change for a modified attribute.
    pub fn modified(path: impl Into<String>, before: Value, after: Value) -> Self {
        Self {
            path: path.into(),
            before: Some(before),
            after: Some(after),
        }
    }
}

impl From<AttributeChange> for generated::AttributeChange {
    fn from(change: AttributeChange) -> Self {
        Self {
            path: change.path,
            before: change.before.as_ref().map(encode_value).unwrap_or_default(),
            after: change.after.as_ref().map(encode_value).unwrap_or_default(),
        }
    }
}

/// The result of a plan operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// The planned state after the operation (null for a destroy).
    pub planned_state: Value,
    /// The list of attribute changes.
    pub changes: Vec<AttributeChange>,
    /// Whether the resource requires replacement.
    pub requires_replace: bool,
}

impl PlanResult {
    /// A plan with no changes.
    pub fn no_change(state: Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
            requires_replace: false,
        }
    }

    /// A plan with changes.
    pub fn with_changes(
        planned_state: Value,
        changes: Vec<AttributeChange>,
        requires_replace: bool,
    ) -> Self {
        Self {
            planned_state,
            changes,
            requires_replace,
        }
    }

    /// Returns true if applying the plan does nothing.
    pub fn is_no_op(&self) -> bool {
        self.changes.is_empty() && !self.requires_replace
    }
}

/// An imported resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    /// The resource type.
    pub resource_type: String,
    /// The imported state.
    pub state: Value,
}

impl ImportedResource {
    /// Create a new imported resource.
    pub fn new(resource_type: impl Into<String>, state: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

/// Provider metadata returned by GetMetadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// Resource type names, sorted.
    pub resources: Vec<String>,
    /// Server capabilities.
    pub capabilities: ServerCapabilities,
}

impl ProviderMetadata {
    /// Derive metadata from a schema table.
    pub fn from_schema(schema: &ProviderSchema, capabilities: ServerCapabilities) -> Self {
        Self {
            resources: schema.resources.keys().cloned().collect(),
            capabilities,
        }
    }
}

/// Server capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServerCapabilities {
    /// Whether the provider plans destroy operations.
    pub plan_destroy: bool,
}

/// The protocol version for the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// The handshake prefix the host looks for on stdout.
pub const HANDSHAKE_PREFIX: &str = "HEMMER_PROVIDER";

/// Encode a value for the wire. Null encodes as empty bytes.
pub(crate) fn encode_value(value: &Value) -> Vec<u8> {
    if value.is_null() {
        return Vec::new();
    }
    serde_json::to_vec(value).unwrap_or_default()
}

/// Decode wire bytes. Empty or malformed bytes decode as null.
pub(crate) fn decode_value(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use serde_json::json;

    #[test]
    fn test_attribute_change_constructors() {
        let added = AttributeChange::added("ratio", json!(2));
        assert!(added.before.is_none());

        let removed = AttributeChange::removed("description", json!("old"));
        assert!(removed.after.is_none());

        let modified = AttributeChange::modified("ratio", json!(1), json!(2));
        assert_eq!(modified.before, Some(json!(1)));
        assert_eq!(modified.after, Some(json!(2)));
    }

    #[test]
    fn test_attribute_change_to_proto() {
        let proto: generated::AttributeChange =
            AttributeChange::added("description", json!("web tier")).into();
        assert_eq!(proto.path, "description");
        assert!(proto.before.is_empty());
        assert_eq!(decode_value(&proto.after), json!("web tier"));
    }

    #[test]
    fn test_plan_result() {
        assert!(PlanResult::no_change(json!({"id": "/Common/p1"})).is_no_op());

        let replace = PlanResult::with_changes(Value::Null, vec![], true);
        assert!(!replace.is_no_op());
    }

    #[test]
    fn test_metadata_from_schema() {
        let schema = ProviderSchema::new()
            .with_resource("bigip_ltm_pool", Schema::v0())
            .with_resource("bigip_ltm_node", Schema::v0());
        let metadata = ProviderMetadata::from_schema(
            &schema,
            ServerCapabilities { plan_destroy: true },
        );
        assert_eq!(metadata.resources, vec!["bigip_ltm_node", "bigip_ltm_pool"]);
        assert!(metadata.capabilities.plan_destroy);
    }

    #[test]
    fn test_value_encoding() {
        assert!(encode_value(&Value::Null).is_empty());
        assert_eq!(decode_value(&[]), Value::Null);
        assert_eq!(decode_value(b"not json"), Value::Null);
        assert_eq!(decode_value(&encode_value(&json!({"a": 1}))), json!({"a": 1}));
    }

    #[test]
    fn test_protocol_constants() {
        assert_eq!(PROTOCOL_VERSION, 1);
        assert_eq!(HANDSHAKE_PREFIX, "HEMMER_PROVIDER");
    }
}
