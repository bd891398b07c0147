//! Resource state as tracked between operations.
//!
//! A [`ResourceState`] is an optional identifier plus a flat map of attribute
//! values. An absent id means "not tracked": creation has not happened yet, or
//! the remote object has disappeared and the caller should drop the entry.
//!
//! Nested blocks are stored as JSON lists holding zero or one object; the
//! [`single_block`] serde helper converts them to and from `Option<T>`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProviderError;

/// Attribute values of one resource plus its identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(flatten)]
    attributes: Map<String, Value>,
}

impl ResourceState {
    /// An empty, untracked state.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty state tracking `id`.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            attributes: Map::new(),
        }
    }

    /// Build state from a JSON object.
    ///
    /// A string or integer `id` key becomes the identifier; `null` and the
    /// empty string mean "no id".
    pub fn from_value(value: Value) -> Result<Self, ProviderError> {
        let mut attributes = match value {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(ProviderError::Validation(format!(
                    "expected an object of attributes, got {}",
                    other
                )))
            },
        };
        let id = match attributes.remove("id") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(other) => {
                return Err(ProviderError::Validation(format!(
                    "invalid id {}: expected a string",
                    other
                )))
            },
        };
        Ok(Self { id, attributes })
    }

    /// Render the state as one JSON object, `id` included when set.
    pub fn to_value(&self) -> Value {
        let mut map = self.attributes.clone();
        if let Some(id) = &self.id {
            map.insert("id".to_string(), Value::String(id.clone()));
        }
        Value::Object(map)
    }

    /// The tracked identifier.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Start tracking `id`.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    /// Stop tracking the resource.
    pub fn clear_id(&mut self) {
        self.id = None;
    }

    /// Whether the state refers to an existing remote object.
    pub fn exists(&self) -> bool {
        self.id.is_some()
    }

    /// Look up one attribute.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Look up a string attribute.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    /// Set one attribute.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.attributes.insert(name.into(), value);
    }

    /// Remove one attribute, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }

    /// All attributes, excluding the id.
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Mutable access to the attributes.
    pub fn attributes_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.attributes
    }

    /// Decode the attributes into a typed model.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ProviderError> {
        Ok(serde_json::from_value(Value::Object(
            self.attributes.clone(),
        ))?)
    }

    /// Overwrite attributes with the fields of a typed model.
    ///
    /// Fields the model serializes as absent are removed, so a refresh never
    /// leaves stale values behind. Attributes unknown to the model are kept.
    pub fn merge<T: Serialize>(&mut self, model: &T, known: &[&str]) -> Result<(), ProviderError> {
        let fields = match serde_json::to_value(model)? {
            Value::Object(map) => map,
            other => {
                return Err(ProviderError::Validation(format!(
                    "model did not serialize to an object: {}",
                    other
                )))
            },
        };
        for name in known {
            if !fields.contains_key(*name) {
                self.attributes.remove(*name);
            }
        }
        for (name, value) in fields {
            if name != "id" {
                self.attributes.insert(name, value);
            }
        }
        Ok(())
    }
}

/// Serde helper storing `Option<T>` as a list of at most one element.
///
/// `null`, a missing key and `[]` all decode to `None`; more than one element
/// is rejected.
///
/// ```
/// use grafana_provider::state::single_block;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Model {
///     #[serde(default, with = "single_block")]
///     templates: Option<Templates>,
/// }
///
/// #[derive(Serialize, Deserialize)]
/// struct Templates {
///     grouping_key: Option<String>,
/// }
///
/// let model: Model = serde_json::from_str(r#"{"templates": []}"#).unwrap();
/// assert!(model.templates.is_none());
/// ```
pub mod single_block {
    use serde::de::{Deserialize, Deserializer, Error};
    use serde::ser::{Serialize, Serializer};

    /// Serialize `Some(v)` as `[v]` and `None` as `[]`.
    pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => [inner].serialize(serializer),
            None => serializer.collect_seq(std::iter::empty::<&T>()),
        }
    }

    /// Deserialize `[v]` as `Some(v)` and `null` or `[]` as `None`.
    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        let items: Option<Vec<T>> = Option::deserialize(deserializer)?;
        let mut items = items.unwrap_or_default();
        match items.len() {
            0 => Ok(None),
            1 => Ok(items.pop()),
            n => Err(D::Error::custom(format!(
                "expected at most 1 block, got {}",
                n
            ))),
        }
    }
}
