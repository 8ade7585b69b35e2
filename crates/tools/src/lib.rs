//! Tool definitions exposed to the LLM tool-calling loop (§4.8, §6).
//!
//! Each tool's [`ToolEnvelope`] return value is how a tool tells the
//! orchestrator it needs more from the user before it can finish: a plain
//! `Ok` means the call is done, anything else names a pending-flow the
//! caller must persist and a prompt to relay verbatim.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod builtins;

/// Describes a single parameter a tool accepts. `required` feeds the
/// confidence scorer's completeness rule and the OpenAI-style JSON schema
/// advertised to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParam {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl ToolParam {
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: false,
        }
    }
}

/// Static metadata about a tool: name, description, and the parameters the
/// confidence scorer and the LLM's tool schema both read from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ToolParam>,
}

impl ToolSpec {
    pub fn required_fields(&self) -> Vec<String> {
        self.params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.clone())
            .collect()
    }
}

/// A tool's structured result. Variants beyond `Ok` are dispatch envelopes:
/// the orchestrator must persist pending state and relay the embedded
/// prompt instead of feeding the result back into the LLM conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolEnvelope {
    Ok {
        data: serde_json::Value,
    },
    ConfirmationRequired {
        data: serde_json::Value,
    },
    DispatchRequired {
        awaiting: String,
        data: serde_json::Value,
    },
    CommentRequired {
        data: serde_json::Value,
    },
}

impl ToolEnvelope {
    pub fn ok(data: serde_json::Value) -> Self {
        ToolEnvelope::Ok { data }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ToolEnvelope::Ok { .. })
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;
    async fn run(&self, args: serde_json::Value) -> Result<ToolEnvelope>;
}

/// Central registry of every tool offered to the LLM this turn.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn list_specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.spec().name == name)
            .map(|t| t.as_ref())
    }

    pub fn spec_for(&self, name: &str) -> Option<ToolSpec> {
        self.get(name).map(|t| t.spec())
    }
}

/// Renders the registry's specs as the OpenAI-compatible `tools` array
/// passed alongside chat messages.
pub fn specs_to_openai_tools(specs: &[ToolSpec]) -> serde_json::Value {
    let tools: Vec<serde_json::Value> = specs
        .iter()
        .map(|spec| {
            let mut properties = serde_json::Map::new();
            let mut required = Vec::new();
            for param in &spec.params {
                properties.insert(
                    param.name.clone(),
                    serde_json::json!({ "type": "string", "description": param.description }),
                );
                if param.required {
                    required.push(param.name.clone());
                }
            }
            serde_json::json!({
                "type": "function",
                "function": {
                    "name": spec.name,
                    "description": spec.description,
                    "parameters": {
                        "type": "object",
                        "properties": properties,
                        "required": required,
                    }
                }
            })
        })
        .collect();
    serde_json::Value::Array(tools)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyTool {
        name: String,
    }

    #[async_trait]
    impl Tool for DummyTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: self.name.clone(),
                description: format!("Dummy tool: {}", self.name),
                params: vec![ToolParam::required("input", "test param")],
            }
        }
        async fn run(&self, _args: serde_json::Value) -> Result<ToolEnvelope> {
            Ok(ToolEnvelope::ok(serde_json::json!({ "ran": self.name })))
        }
    }

    #[test]
    fn empty_registry() {
        let reg = ToolRegistry::default();
        assert!(reg.list_specs().is_empty());
        assert!(reg.get("anything").is_none());
    }

    #[test]
    fn register_and_get() {
        let mut reg = ToolRegistry::default();
        reg.register(Box::new(DummyTool { name: "alpha".into() }));
        reg.register(Box::new(DummyTool { name: "beta".into() }));

        assert!(reg.get("alpha").is_some());
        assert!(reg.get("beta").is_some());
        assert!(reg.get("gamma").is_none());
    }

    #[tokio::test]
    async fn run_registered_tool() {
        let mut reg = ToolRegistry::default();
        reg.register(Box::new(DummyTool { name: "runner".into() }));

        let tool = reg.get("runner").unwrap();
        let result = tool.run(serde_json::json!({})).await.unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn required_fields_filters_optional_params() {
        let spec = ToolSpec {
            name: "x".into(),
            description: "x".into(),
            params: vec![
                ToolParam::required("a", "a"),
                ToolParam::optional("b", "b"),
                ToolParam::required("c", "c"),
            ],
        };
        assert_eq!(spec.required_fields(), vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn specs_to_openai_tools_marks_required_fields() {
        let specs = vec![ToolSpec {
            name: "mail_send".into(),
            description: "Send an email".into(),
            params: vec![
                ToolParam::required("to", "recipient"),
                ToolParam::optional("cc", "cc list"),
            ],
        }];
        let rendered = specs_to_openai_tools(&specs);
        let arr = rendered.as_array().unwrap();
        assert_eq!(arr.len(), 1);
        let required = arr[0]["function"]["parameters"]["required"].as_array().unwrap();
        assert_eq!(required.len(), 1);
        assert_eq!(required[0], "to");
    }
}
