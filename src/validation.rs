//! Schema validation helpers.
//!
//! Validates a `serde_json::Value` against a [`Schema`] before any remote call
//! is made, producing one [`Diagnostic`] per problem.
//!
//! # Example
//!
//! ```
//! use grafana_provider::schema::{Attribute, Schema, Validator};
//! use grafana_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute(
//!         "region_slug",
//!         Attribute::optional_string().with_validator(Validator::one_of(["au", "eu", "us"])),
//!     );
//!
//! assert!(validate(&schema, &json!({"name": "prod", "region_slug": "eu"})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"name": "prod", "region_slug": "mars"}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("region_slug".to_string()));
//! ```

use regex::Regex;
use serde_json::Value;

use crate::schema::{Attribute, AttributeType, Block, Diagnostic, NestedBlock, Schema, Validator};

/// Validate a JSON value against a schema.
///
/// Returns one diagnostic per problem found. Only error diagnostics make the
/// value invalid; warnings point at values that will be ignored.
///
/// # Validation Rules
///
/// - Required attributes must be present and non-null
/// - Values given for computed-only attributes are ignored with a warning
/// - Attribute types must match the schema
/// - Value constraints ([`Validator`]) must hold for strings
/// - Nested blocks are lists checked against their item limits
/// - Keys the schema does not declare are rejected, except `id`
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(&schema.block, value, "", &mut diagnostics);
    diagnostics
}

/// Validate a JSON value against a schema, returning Ok if valid or Err with diagnostics.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.iter().any(Diagnostic::is_error) {
        Err(diagnostics)
    } else {
        Ok(())
    }
}

/// Check if a JSON value is valid against a schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate_result(schema, value).is_ok()
}

/// Join the error diagnostics into one message suitable for an error value.
pub fn summarize(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .filter(|d| d.is_error())
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn validate_block(block: &Block, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return,
        _ => {
            let mut diag = Diagnostic::error("Expected object")
                .with_detail(format!("Got {}", value_type_name(value)));
            if !path.is_empty() {
                diag = diag.with_attribute(path);
            }
            diagnostics.push(diag);
            return;
        },
    };

    for (name, attr) in &block.attributes {
        let attr_path = join_path(path, name);
        validate_attribute(attr, obj.get(name), &attr_path, diagnostics);
    }

    for (name, nested) in &block.blocks {
        let block_path = join_path(path, name);
        validate_nested_block(nested, obj.get(name), &block_path, diagnostics);
    }

    for name in obj.keys() {
        if (path.is_empty() && name == "id") || block.contains(name) {
            continue;
        }
        let attr_path = join_path(path, name);
        diagnostics.push(
            Diagnostic::error(format!("Unsupported attribute '{}'", attr_path))
                .with_detail("An argument with this name is not expected here")
                .with_attribute(attr_path),
        );
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.is_computed_only() {
        if value.is_some_and(|v| !v.is_null()) {
            diagnostics.push(
                Diagnostic::warning(format!("Value for computed attribute '{}' is ignored", path))
                    .with_detail("This attribute is set by the remote API")
                    .with_attribute(path),
            );
        }
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
        },
        Some(v) => {
            if check_type(attr.attr_type, v, path, diagnostics) {
                for validator in &attr.validators {
                    check_validator(validator, v, path, diagnostics);
                }
            }
        },
    }
}

fn check_type(
    attr_type: AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let (ok, expected) = match attr_type {
        AttributeType::String => (value.is_string(), "string"),
        AttributeType::Int64 => (is_int64(value), "int64"),
        AttributeType::Bool => (value.is_boolean(), "bool"),
    };
    if !ok {
        diagnostics.push(
            Diagnostic::error(format!("Invalid type for attribute '{}'", path))
                .with_detail(format!(
                    "Expected {}, got {}",
                    expected,
                    value_type_name(value)
                ))
                .with_attribute(path),
        );
    }
    ok
}

fn check_validator(
    validator: &Validator,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let Some(s) = value.as_str() else {
        return;
    };

    match validator {
        Validator::NotEmpty => {
            if s.is_empty() {
                diagnostics.push(
                    Diagnostic::error(format!("Invalid value for attribute '{}'", path))
                        .with_detail("Must not be empty")
                        .with_attribute(path),
                );
            }
        },
        Validator::OneOf { values } => {
            if !values.iter().any(|v| v == s) {
                diagnostics.push(
                    Diagnostic::error(format!("Invalid value for attribute '{}'", path))
                        .with_detail(format!(
                            "Expected one of [{}], got '{}'",
                            values.join(", "),
                            s
                        ))
                        .with_attribute(path),
                );
            }
        },
        Validator::Pattern { regex, message } => match Regex::new(regex) {
            Ok(re) if re.is_match(s) => {},
            Ok(_) => diagnostics.push(
                Diagnostic::error(format!("Invalid value for attribute '{}'", path))
                    .with_detail(message.clone())
                    .with_attribute(path),
            ),
            Err(e) => diagnostics.push(
                Diagnostic::error(format!("Invalid pattern for attribute '{}'", path))
                    .with_detail(e.to_string())
                    .with_attribute(path),
            ),
        },
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match value {
        None | Some(Value::Null) => {
            if nested.min_items > 0 {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' requires at least {} item(s)",
                        path, nested.min_items
                    ))
                    .with_attribute(path),
                );
            }
        },
        Some(Value::Array(arr)) => {
            let len = arr.len();

            if len < nested.min_items as usize {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' requires at least {} item(s), got {}",
                        path, nested.min_items, len
                    ))
                    .with_attribute(path),
                );
            }

            // 0 means unlimited
            if nested.max_items > 0 && len > nested.max_items as usize {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' allows at most {} item(s), got {}",
                        path, nested.max_items, len
                    ))
                    .with_attribute(path),
                );
            }

            for (i, item) in arr.iter().enumerate() {
                let item_path = format!("{}.{}", path, i);
                validate_block(&nested.block, item, &item_path, diagnostics);
            }
        },
        Some(v) => {
            diagnostics.push(
                Diagnostic::error(format!("Expected list for block '{}'", path))
                    .with_detail(format!("Got {}", value_type_name(v)))
                    .with_attribute(path),
            );
        },
    }
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
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
                    .is_some_and(|f| f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64)
        },
        _ => false,
    }
}
