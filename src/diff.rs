//! Plan computation and API payload deltas.

use serde_json::{Map, Value};

use crate::schema::{AttributeType, Schema};
use crate::types::{AttributeChange, PlanResult};

/// Compute the plan for moving from `prior` to `proposed`.
///
/// - no prior state plans a create;
/// - a null proposed state plans a destroy;
/// - optional+computed and computed-only attributes left unset keep their
///   prior value;
/// - a change to a force-new attribute requires replacement;
/// - set-typed attributes compare as sets: order and duplicates are ignored,
///   and the planned value is sorted.
pub fn plan(schema: &Schema, prior: Option<&Value>, proposed: &Value) -> PlanResult {
    let prior = prior.and_then(Value::as_object).map(|p| {
        let mut p = p.clone();
        normalize_sets(schema, &mut p);
        p
    });
    let prior = prior.as_ref();

    if proposed.is_null() {
        let changes = prior
            .map(|p| {
                p.iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| AttributeChange::removed(k.as_str(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        return PlanResult::with_changes(Value::Null, changes, false);
    }

    let empty = Map::new();
    let proposed = proposed.as_object().unwrap_or(&empty);

    let Some(prior) = prior else {
        let mut planned: Map<String, Value> = proposed
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        normalize_sets(schema, &mut planned);
        let changes = planned
            .iter()
            .map(|(k, v)| AttributeChange::added(k.as_str(), v.clone()))
            .collect();
        return PlanResult::with_changes(Value::Object(planned), changes, false);
    };

    let mut planned: Map<String, Value> = proposed
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    normalize_sets(schema, &mut planned);
    for (name, attr) in &schema.block.attributes {
        if attr.flags.computed && !planned.contains_key(name) {
            if let Some(value) = prior.get(name).filter(|v| !v.is_null()) {
                planned.insert(name.clone(), value.clone());
            }
        }
    }

    let mut changes = Vec::new();
    let mut requires_replace = false;
    let keys: std::collections::BTreeSet<&String> = prior.keys().chain(planned.keys()).collect();
    for key in keys {
        let before = prior.get(key).filter(|v| !v.is_null());
        let after = planned.get(key);
        let change = match (before, after) {
            (Some(b), Some(a)) if b != a => AttributeChange::modified(key.as_str(), b.clone(), a.clone()),
            (None, Some(a)) => AttributeChange::added(key.as_str(), a.clone()),
            (Some(b), None) => AttributeChange::removed(key.as_str(), b.clone()),
            _ => continue,
        };
        if schema.attribute(key).is_some_and(|a| a.force_new) {
            requires_replace = true;
        }
        changes.push(change);
    }

    PlanResult::with_changes(Value::Object(planned), changes, requires_replace)
}

/// Sort and dedup every set-typed attribute in place.
fn normalize_sets(schema: &Schema, attributes: &mut Map<String, Value>) {
    for (name, attr) in &schema.block.attributes {
        if !matches!(attr.attr_type, AttributeType::Set(_)) {
            continue;
        }
        if let Some(Value::Array(items)) = attributes.get_mut(name) {
            items.sort_by_cached_key(|v| v.to_string());
            items.dedup();
        }
    }
}

/// Fields set in `desired` whose value differs from `prior`.
///
/// Both sides are API payloads. Fields only present in `prior` are not
/// included: leaving an attribute unset never clears it remotely.
pub fn payload_delta(prior: &Map<String, Value>, desired: &Map<String, Value>) -> Map<String, Value> {
    desired
        .iter()
        .filter(|(key, value)| !value.is_null() && prior.get(key.as_str()) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
