//! Translation of externally-described tools into internal tools
//!
//! Tool sources advertise JSON-Schema-like descriptors. Each descriptor is
//! compiled into an [`ArgSchema`] decoder that validates arguments before they
//! cross the wire, and wrapped in an executor that routes the call back to the
//! owning source.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::agents::domain::{Tool, ToolDefinition, ToolExecutor};
use crate::agents::error::{AgentError, AgentResult};
use crate::agents::mcp::{McpToolDescriptor, ToolSourceClient};

/// Compiled argument decoder derived from a tool's input schema
#[derive(Debug, Clone, PartialEq)]
pub enum ArgSchema {
    /// Record with typed fields. `open` objects (no `properties`) accept any map.
    Object {
        fields: BTreeMap<String, ArgSchema>,
        required: Vec<String>,
        open: bool,
    },
    /// String, optionally restricted to an enum
    Str { allowed: Option<Vec<String>> },
    Number,
    Integer,
    Boolean,
    Null,
    /// Homogeneous list; `None` items accept opaque values
    Array { items: Option<Box<ArgSchema>> },
    /// Unknown type: accept anything
    Any,
}

impl ArgSchema {
    /// Compile a JSON-Schema-like value into a decoder.
    pub fn from_schema(schema: &Value) -> Self {
        let Some(obj) = schema.as_object() else {
            return ArgSchema::Any;
        };

        match obj.get("type").and_then(Value::as_str) {
            Some("object") => {
                let Some(properties) = obj.get("properties").and_then(Value::as_object) else {
                    return ArgSchema::Object {
                        fields: BTreeMap::new(),
                        required: Vec::new(),
                        open: true,
                    };
                };
                let fields = properties
                    .iter()
                    .map(|(k, v)| (k.clone(), ArgSchema::from_schema(v)))
                    .collect();
                let required = obj
                    .get("required")
                    .and_then(Value::as_array)
                    .map(|r| {
                        r.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                ArgSchema::Object {
                    fields,
                    required,
                    open: false,
                }
            }
            Some("string") => {
                let allowed = obj.get("enum").and_then(Value::as_array).map(|values| {
                    values
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                });
                ArgSchema::Str { allowed }
            }
            Some("number") => ArgSchema::Number,
            Some("integer") => ArgSchema::Integer,
            Some("boolean") => ArgSchema::Boolean,
            Some("null") => ArgSchema::Null,
            Some("array") => {
                let items = obj
                    .get("items")
                    .map(|i| Box::new(ArgSchema::from_schema(i)));
                ArgSchema::Array { items }
            }
            _ => ArgSchema::Any,
        }
    }

    /// Required keys of an object schema; empty for everything else.
    pub fn required_keys(&self) -> &[String] {
        match self {
            ArgSchema::Object { required, .. } => required,
            _ => &[],
        }
    }

    /// Validate a value against the schema.
    pub fn decode(&self, value: &Value) -> Result<(), String> {
        match self {
            ArgSchema::Any => Ok(()),
            ArgSchema::Null => match value {
                Value::Null => Ok(()),
                _ => Err("expected null".to_string()),
            },
            ArgSchema::Boolean => match value {
                Value::Bool(_) => Ok(()),
                _ => Err("expected a boolean".to_string()),
            },
            ArgSchema::Number => match value {
                Value::Number(_) => Ok(()),
                _ => Err("expected a number".to_string()),
            },
            ArgSchema::Integer => match value {
                Value::Number(n) if n.is_i64() || n.is_u64() => Ok(()),
                _ => Err("expected an integer".to_string()),
            },
            ArgSchema::Str { allowed } => {
                let Value::String(s) = value else {
                    return Err("expected a string".to_string());
                };
                if let Some(allowed) = allowed {
                    if !allowed.iter().any(|a| a == s) {
                        return Err(format!(
                            "'{}' is not one of [{}]",
                            s,
                            allowed.join(", ")
                        ));
                    }
                }
                Ok(())
            }
            ArgSchema::Array { items } => {
                let Value::Array(values) = value else {
                    return Err("expected an array".to_string());
                };
                if let Some(items) = items {
                    for (i, v) in values.iter().enumerate() {
                        items
                            .decode(v)
                            .map_err(|e| format!("item {}: {}", i, e))?;
                    }
                }
                Ok(())
            }
            ArgSchema::Object {
                fields,
                required,
                open,
            } => {
                let Value::Object(map) = value else {
                    return Err("expected an object".to_string());
                };
                if *open {
                    return Ok(());
                }
                for key in required {
                    if !map.contains_key(key) {
                        return Err(format!("missing required argument '{}'", key));
                    }
                }
                for (key, v) in map {
                    if let Some(field) = fields.get(key) {
                        field.decode(v).map_err(|e| format!("{}: {}", key, e))?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// Build the internal tool for an externally-described one. The emitted name
/// is `<sourceId>_<toolName>` to disambiguate across sources.
pub fn translate_tool(
    source_id: &str,
    descriptor: &McpToolDescriptor,
    client: Arc<ToolSourceClient>,
) -> Tool {
    let schema_value = descriptor
        .input_schema
        .clone()
        .unwrap_or_else(|| serde_json::json!({ "type": "object", "properties": {} }));

    let definition = ToolDefinition::new(
        format!("{}_{}", source_id, descriptor.name),
        descriptor
            .description
            .clone()
            .unwrap_or_else(|| format!("Tool: {}", descriptor.name)),
        schema_value.clone(),
    );

    let executor = Arc::new(SourceToolExecutor {
        client,
        remote_name: descriptor.name.clone(),
        schema: ArgSchema::from_schema(&schema_value),
    });

    Tool::new(definition, executor)
}

struct SourceToolExecutor {
    client: Arc<ToolSourceClient>,
    remote_name: String,
    schema: ArgSchema,
}

#[async_trait]
impl ToolExecutor for SourceToolExecutor {
    async fn execute(&self, args: Value) -> AgentResult<Value> {
        self.schema
            .decode(&args)
            .map_err(|e| AgentError::Validation(format!("{}: {}", self.remote_name, e)))?;

        self.client
            .call_tool(&self.remote_name, args)
            .await
            .map_err(|e| AgentError::ToolExecution(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_schema_keeps_required_set() {
        let schema = json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "limit": { "type": "integer" }
            },
            "required": ["query"]
        });
        let compiled = ArgSchema::from_schema(&schema);
        assert_eq!(compiled.required_keys(), ["query".to_string()]);

        assert!(compiled.decode(&json!({ "query": "hi" })).is_ok());
        assert!(compiled.decode(&json!({ "query": "hi", "limit": 3 })).is_ok());
        assert!(compiled.decode(&json!({ "limit": 3 })).is_err());
        assert!(compiled.decode(&json!({ "query": 7 })).is_err());
        assert!(compiled.decode(&json!({ "query": "hi", "limit": 1.5 })).is_err());
    }

    #[test]
    fn object_without_properties_is_free_form() {
        let compiled = ArgSchema::from_schema(&json!({ "type": "object" }));
        assert!(compiled.decode(&json!({ "anything": [1, 2, 3] })).is_ok());
        assert!(compiled.decode(&json!("not an object")).is_err());
    }

    #[test]
    fn string_enum_restricts_values() {
        let compiled = ArgSchema::from_schema(&json!({
            "type": "string",
            "enum": ["all", "tables", "forms", "headings"]
        }));
        assert!(compiled.decode(&json!("tables")).is_ok());
        assert!(compiled.decode(&json!("everything")).is_err());
    }

    #[test]
    fn arrays_validate_items_when_typed() {
        let typed = ArgSchema::from_schema(&json!({
            "type": "array",
            "items": { "type": "number" }
        }));
        assert!(typed.decode(&json!([1, 2.5])).is_ok());
        assert!(typed.decode(&json!([1, "x"])).is_err());

        let opaque = ArgSchema::from_schema(&json!({ "type": "array" }));
        assert!(opaque.decode(&json!([1, "x", null])).is_ok());
    }

    #[test]
    fn unknown_types_accept_anything() {
        let compiled = ArgSchema::from_schema(&json!({ "type": "tuple" }));
        assert_eq!(compiled, ArgSchema::Any);
        assert!(compiled.decode(&json!({ "weird": true })).is_ok());
    }
}
