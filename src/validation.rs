//! Schema validation helpers.
//!
//! Validates a JSON object against a [`Schema`], collecting every problem
//! rather than stopping at the first one, so the host can show the user all
//! of them at once.
//!
//! # Example
//!
//! ```
//! use hemmer_provider_bigip::schema::{Attribute, Schema, Validator};
//! use hemmer_provider_bigip::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string().with_validator(Validator::FullPath))
//!     .with_attribute("ratio", Attribute::optional_int64());
//!
//! assert!(validate(&schema, &json!({"name": "/Common/web", "ratio": 2})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"name": "web", "ratio": "two"}));
//! assert_eq!(diagnostics.len(), 2);
//! ```

use serde_json::Value;

use crate::schema::{Attribute, AttributeType, Diagnostic, Schema};

/// Validate a JSON value against a schema.
///
/// Returns one diagnostic per problem; an empty list means the value is valid.
///
/// - the value must be an object (or null, treated as empty)
/// - required attributes must be present and non-null
/// - computed-only attributes are not checked (the BigIP sets them)
/// - attribute types and validators must match
/// - attributes not in the schema are rejected
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let empty = serde_json::Map::new();

    let obj = match value {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(other))),
            );
            return diagnostics;
        }
    };

    for (name, attr) in &schema.block.attributes {
        validate_attribute(attr, obj.get(name), name, &mut diagnostics);
    }

    for name in obj.keys() {
        if schema.attribute(name).is_none() {
            diagnostics.push(
                Diagnostic::error(format!("Unsupported attribute '{}'", name))
                    .with_detail("This attribute is not part of the schema")
                    .with_attribute(name.as_str()),
            );
        }
    }

    diagnostics
}

/// Like [`validate`], but returns `Err` with the diagnostics when invalid.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Returns `true` if `value` satisfies `schema`.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if !attr.flags.is_configurable() {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        }
        Some(v) => {
            let before = diagnostics.len();
            validate_type(&attr.attr_type, v, path, diagnostics);
            if diagnostics.len() > before {
                return;
            }
            for validator in &attr.validators {
                if let Some(reason) = validator.check(v) {
                    diagnostics.push(
                        Diagnostic::error(format!("Invalid value for attribute '{}'", path))
                            .with_detail(reason)
                            .with_attribute(path),
                    );
                }
            }
        }
    }
}

fn validate_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        }
        AttributeType::Int64 => {
            if !is_int64(value) {
                diagnostics.push(type_error(path, "int64", value));
            }
        }
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        }
        AttributeType::List(element) | AttributeType::Set(element) => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    validate_type(element, item, &format!("{}.{}", path, i), diagnostics);
                }
            }
            None => diagnostics.push(type_error(path, "list", value)),
        },
        AttributeType::Map(element) => match value.as_object() {
            Some(entries) => {
                for (key, item) in entries {
                    validate_type(element, item, &format!("{}.{}", path, key), diagnostics);
                }
            }
            None => diagnostics.push(type_error(path, "map", value)),
        },
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            n.is_i64()
                || n.as_f64()
                    .map(|f| f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64)
                    .unwrap_or(false)
        }
        _ => false,
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeFlags, Validator};
    use serde_json::json;

    fn node_schema() -> Schema {
        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "name",
                Attribute::required_string().with_validator(Validator::FullPath),
            )
            .with_attribute("address", Attribute::required_string())
            .with_attribute(
                "ratio",
                Attribute::optional_computed_int64()
                    .with_validator(Validator::Range { min: 1, max: 100 }),
            )
    }

    #[test]
    fn test_valid_object() {
        let diagnostics = validate(
            &node_schema(),
            &json!({"name": "/Common/n1", "address": "10.0.0.1", "ratio": 3}),
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_all_missing_required_attributes_reported() {
        let diagnostics = validate(&node_schema(), &json!({}));
        assert_eq!(diagnostics.len(), 2);
        let attrs: Vec<_> = diagnostics.iter().filter_map(|d| d.attribute.clone()).collect();
        assert_eq!(attrs, vec!["address".to_string(), "name".to_string()]);
    }

    #[test]
    fn test_null_root_is_empty_object() {
        assert_eq!(validate(&node_schema(), &Value::Null).len(), 2);
    }

    #[test]
    fn test_computed_attribute_skipped() {
        let diagnostics = validate(
            &node_schema(),
            &json!({"id": 12, "name": "/Common/n1", "address": "10.0.0.1"}),
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_validator_runs_only_after_type_check() {
        let diagnostics = validate(
            &node_schema(),
            &json!({"name": "/Common/n1", "address": "10.0.0.1", "ratio": "x"}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));

        let diagnostics = validate(
            &node_schema(),
            &json!({"name": "n1", "address": "10.0.0.1", "ratio": 500}),
        );
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.iter().all(|d| d.summary.contains("Invalid value")));
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        let diagnostics = validate(
            &node_schema(),
            &json!({"name": "/Common/n1", "address": "10.0.0.1", "colour": "blue"}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("colour".to_string()));
    }

    #[test]
    fn test_int64_accepts_integral_floats() {
        let schema = Schema::v0().with_attribute("ratio", Attribute::optional_int64());
        assert!(is_valid(&schema, &json!({"ratio": 4.0})));
        assert!(!is_valid(&schema, &json!({"ratio": 4.5})));
    }

    #[test]
    fn test_set_elements_checked() {
        let schema = Schema::v0().with_attribute(
            "monitors",
            Attribute::new(
                AttributeType::set(AttributeType::String),
                AttributeFlags::optional(),
            ),
        );

        assert!(is_valid(&schema, &json!({"monitors": ["/Common/http"]})));

        let diagnostics = validate(&schema, &json!({"monitors": ["/Common/http", 5]}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("monitors.1".to_string()));
    }

    #[test]
    fn test_map_values_checked() {
        let schema = Schema::v0().with_attribute(
            "metadata",
            Attribute::new(
                AttributeType::map(AttributeType::String),
                AttributeFlags::optional(),
            ),
        );
        let diagnostics = validate(&schema, &json!({"metadata": {"owner": 1}}));
        assert_eq!(diagnostics[0].attribute, Some("metadata.owner".to_string()));
    }

    #[test]
    fn test_root_not_object() {
        let diagnostics = validate(&node_schema(), &json!("not an object"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Expected object"));
    }

    #[test]
    fn test_validate_result_helper() {
        assert!(validate_result(
            &node_schema(),
            &json!({"name": "/Common/n1", "address": "10.0.0.1"})
        )
        .is_ok());
        assert_eq!(validate_result(&node_schema(), &json!({})).unwrap_err().len(), 2);
    }
}
