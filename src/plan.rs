//! Drift detection.
//!
//! [`plan`] compares the state last read from the remote against the desired
//! state and reports which attributes would change. The planned state is the
//! desired state with schema defaults filled in and server-computed values
//! carried over from the prior state, so computed fields never show up as
//! drift.

use serde_json::{Map, Value};

use crate::schema::{Block, Schema};
use crate::state::ResourceState;
use crate::types::{AttributeChange, PlanResult};

/// Compute the plan for moving from `prior` to `desired`.
///
/// `prior` is `None` when the resource does not exist yet; every configured
/// attribute is then reported as added and replacement is never required.
pub fn plan(schema: &Schema, prior: Option<&ResourceState>, desired: &ResourceState) -> PlanResult {
    let prior = prior.filter(|p| p.exists());
    let planned = planned_state(schema, prior, desired);

    let mut changes = Vec::new();
    let block = &schema.block;
    let names = block
        .attributes
        .iter()
        .filter(|(_, attr)| !attr.flags.is_computed_only())
        .map(|(name, _)| name)
        .chain(block.blocks.keys());

    for name in names {
        let before = prior.and_then(|p| normalize(block, name, p.get(name)));
        let after = normalize(block, name, planned.get(name));
        match (before, after) {
            (None, None) => {},
            (Some(b), Some(a)) if b == a => {},
            (None, Some(a)) => changes.push(AttributeChange::added(name.as_str(), a)),
            (Some(b), None) => changes.push(AttributeChange::removed(name.as_str(), b)),
            (Some(b), Some(a)) => changes.push(AttributeChange::modified(name.as_str(), b, a)),
        }
    }
    changes.sort_by(|a, b| a.path.cmp(&b.path));

    let requires_replace = prior.is_some() && changes.iter().any(|c| block.is_force_new(&c.path));
    PlanResult::with_changes(planned, changes, requires_replace)
}

/// The desired state with defaults applied and computed values carried over.
pub fn planned_state(
    schema: &Schema,
    prior: Option<&ResourceState>,
    desired: &ResourceState,
) -> ResourceState {
    let mut planned = desired.clone();
    schema.block.apply_defaults(planned.attributes_mut());

    if let Some(prior) = prior {
        if !planned.exists() {
            if let Some(id) = prior.id() {
                planned.set_id(id);
            }
        }
        carry_computed(&schema.block, prior.attributes(), planned.attributes_mut());
    }
    planned
}

fn carry_computed(block: &Block, prior: &Map<String, Value>, planned: &mut Map<String, Value>) {
    for (name, attr) in &block.attributes {
        if !attr.flags.computed {
            continue;
        }
        let unset = planned.get(name).map_or(true, |v| attr.is_unset(v));
        if attr.flags.is_computed_only() || unset {
            match prior.get(name) {
                Some(value) => {
                    planned.insert(name.clone(), value.clone());
                },
                None => {
                    planned.remove(name);
                },
            }
        }
    }

    for (name, nested) in &block.blocks {
        let prior_item = first_object(prior.get(name));
        let Some(Value::Array(items)) = planned.get_mut(name) else {
            continue;
        };
        if let (Some(prior_item), Some(Value::Object(item))) = (prior_item, items.first_mut()) {
            carry_computed(&nested.block, prior_item, item);
        }
    }
}

fn first_object(value: Option<&Value>) -> Option<&Map<String, Value>> {
    match value {
        Some(Value::Array(items)) => items.first().and_then(Value::as_object),
        _ => None,
    }
}

/// Canonical form of one attribute for comparison.
///
/// `null` is the same as absent, and so is `""` where the attribute says so. Blocks lose their computed-only fields and
/// unset keys; a block left empty counts as not configured.
fn normalize(block: &Block, name: &str, value: Option<&Value>) -> Option<Value> {
    let value = value.filter(|v| !is_unset(block, name, v))?;
    let Some(nested) = block.blocks.get(name) else {
        return Some(value.clone());
    };
    let Value::Array(items) = value else {
        return Some(value.clone());
    };

    let items: Vec<Value> = items
        .iter()
        .filter_map(|item| match item {
            Value::Object(obj) => normalize_object(&nested.block, obj),
            other => Some(other.clone()),
        })
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(Value::Array(items))
    }
}

fn is_unset(block: &Block, name: &str, value: &Value) -> bool {
    match block.attributes.get(name) {
        Some(attr) => attr.is_unset(value),
        None => value.is_null(),
    }
}

fn normalize_object(block: &Block, obj: &Map<String, Value>) -> Option<Value> {
    let mut out = Map::new();
    for (key, value) in obj {
        let computed_only = block
            .attributes
            .get(key)
            .is_some_and(|a| a.flags.is_computed_only());
        if computed_only {
            continue;
        }
        if let Some(v) = normalize(block, key, Some(value)) {
            out.insert(key.clone(), v);
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(Value::Object(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, NestedBlock};
    use serde_json::json;

    fn schema() -> Schema {
        Schema::v0()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("description", Attribute::optional_string())
            .with_attribute("region_slug", Attribute::optional_string().with_force_new())
            .with_attribute("url", Attribute::optional_computed_string())
            .with_attribute("status", Attribute::computed_string())
            .with_attribute(
                "wait_for_readiness",
                Attribute::optional_bool().with_default(json!(true)),
            )
            .with_block(
                "default_route",
                NestedBlock::single(
                    Block::new()
                        .with_attribute("id", Attribute::computed_string())
                        .with_attribute("escalation_chain_id", Attribute::optional_string()),
                ),
            )
    }

    fn state(value: Value) -> ResourceState {
        ResourceState::from_value(value).unwrap()
    }

    fn prior() -> ResourceState {
        state(json!({
            "id": "42",
            "name": "prod",
            "region_slug": "us",
            "url": "https://prod.grafana.net",
            "status": "active",
            "wait_for_readiness": true,
            "default_route": [{"id": "R1", "escalation_chain_id": null}]
        }))
    }

    #[test]
    fn test_create_plan_adds_configured_attributes() {
        let result = plan(&schema(), None, &state(json!({"name": "prod"})));

        assert!(!result.requires_replace);
        assert_eq!(
            result.changed_paths().collect::<Vec<_>>(),
            vec!["name", "wait_for_readiness"]
        );
        assert_eq!(
            result.planned_state.get("wait_for_readiness"),
            Some(&json!(true))
        );
    }

    #[test]
    fn test_computed_values_never_drift() {
        let desired = state(json!({"name": "prod", "region_slug": "us"}));
        let result = plan(&schema(), Some(&prior()), &desired);

        assert!(!result.has_changes(), "unexpected changes: {:?}", result.changes);
        assert_eq!(result.planned_state.id(), Some("42"));
        assert_eq!(result.planned_state.get_str("status"), Some("active"));
        assert_eq!(
            result.planned_state.get_str("url"),
            Some("https://prod.grafana.net")
        );
    }

    #[test]
    fn test_nested_computed_ids_are_carried() {
        let desired = state(json!({
            "name": "prod",
            "region_slug": "us",
            "default_route": [{"escalation_chain_id": "E1"}]
        }));
        let result = plan(&schema(), Some(&prior()), &desired);

        assert_eq!(result.changed_paths().collect::<Vec<_>>(), vec!["default_route"]);
        assert_eq!(
            result.planned_state.get("default_route"),
            Some(&json!([{"escalation_chain_id": "E1", "id": "R1"}]))
        );
        assert!(!result.requires_replace);
    }

    #[test]
    fn test_force_new_change_requires_replace() {
        let desired = state(json!({"name": "prod", "region_slug": "eu"}));
        let result = plan(&schema(), Some(&prior()), &desired);

        assert!(result.requires_replace);
        assert_eq!(
            result.changes,
            vec![AttributeChange::modified("region_slug", json!("us"), json!("eu"))]
        );
    }

    #[test]
    fn test_empty_string_differs_from_absent() {
        let desired = state(json!({"name": "prod", "region_slug": "us", "description": ""}));
        let result = plan(&schema(), Some(&prior()), &desired);

        assert_eq!(
            result.changes,
            vec![AttributeChange::added("description", json!(""))]
        );
    }

    #[test]
    fn test_empty_string_can_mean_unset() {
        let schema = schema()
            .with_attribute("description", Attribute::optional_string().with_empty_as_unset())
            .with_attribute("url", Attribute::optional_computed_string().with_empty_as_unset());
        let desired = state(json!({
            "name": "prod",
            "region_slug": "us",
            "description": "",
            "url": ""
        }));
        let result = plan(&schema, Some(&prior()), &desired);

        assert!(!result.has_changes(), "unexpected changes: {:?}", result.changes);
        assert_eq!(
            result.planned_state.get_str("url"),
            Some("https://prod.grafana.net")
        );
    }

    #[test]
    fn test_removed_attribute() {
        let mut prior = prior();
        prior.set("description", json!("old"));
        let desired = state(json!({"name": "prod", "region_slug": "us"}));
        let result = plan(&schema(), Some(&prior), &desired);

        assert_eq!(
            result.changes,
            vec![AttributeChange::removed("description", json!("old"))]
        );
    }

    #[test]
    fn test_untracked_prior_is_a_create() {
        let mut gone = prior();
        gone.clear_id();
        let desired = state(json!({"name": "prod", "region_slug": "eu"}));
        let result = plan(&schema(), Some(&gone), &desired);

        assert!(!result.requires_replace);
        assert!(result.planned_state.get("status").is_none());
    }
}
