use serde_json::{Map, Value};

use crate::{CoreError, Result};

/// A candidate resource as submitted by a client write request.
///
/// The identifier is kept apart from the body so that it can be amended
/// (assigned from a matched record) without touching the rest of the content.
/// An empty-string `id` is treated the same as a missing one.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    resource_type: String,
    id: Option<String>,
    body: Map<String, Value>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: None,
            body: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.set_id(id);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.body.insert(key.into(), value);
        self
    }

    /// Builds a resource from its JSON representation.
    ///
    /// Requires an object with a non-empty string `resourceType`. A present
    /// `id` must be a string.
    pub fn from_json(value: Value) -> Result<Self> {
        let Value::Object(mut body) = value else {
            return Err(CoreError::invalid_resource("Resource must be a JSON object"));
        };

        let resource_type = match body.remove("resourceType") {
            Some(Value::String(rt)) if !rt.is_empty() => rt,
            Some(Value::String(_)) | None => {
                return Err(CoreError::invalid_resource("Missing resourceType field"));
            }
            Some(_) => {
                return Err(CoreError::invalid_resource("resourceType must be a string"));
            }
        };

        let id = match body.remove("id") {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) if id.is_empty() => None,
            Some(Value::String(id)) => Some(id),
            Some(_) => return Err(CoreError::invalid_resource("Resource id must be a string")),
        };

        Ok(Self {
            resource_type,
            id,
            body,
        })
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        self.id = if id.is_empty() { None } else { Some(id) };
    }

    /// Renders the resource back to JSON with `resourceType` and `id` restored.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::with_capacity(self.body.len() + 2);
        obj.insert(
            "resourceType".to_string(),
            Value::String(self.resource_type.clone()),
        );
        if let Some(id) = &self.id {
            obj.insert("id".to_string(), Value::String(id.clone()));
        }
        for (k, v) in &self.body {
            obj.insert(k.clone(), v.clone());
        }
        Value::Object(obj)
    }
}
