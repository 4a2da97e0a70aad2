//! Tool catalog: the capability interface, the registry, and the adapters
//! that put local functions and remote proxies behind one `invoke` seam.

pub mod catalog;
pub mod remote;
pub mod weather;

pub use catalog::ToolCatalog;
pub use weather::WeatherTool;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A named capability the agent can invoke.
///
/// Every catalog entry is reached through this one interface, whether the
/// implementation is a local function or a proxy into a remote tool-server
/// process. The gate never looks behind the trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name as the model addresses it.
    fn name(&self) -> &str;

    /// Human-readable description passed to the model.
    fn description(&self) -> &str;

    /// JSON schema of the accepted arguments.
    fn parameters_schema(&self) -> Value;

    /// Invoke with parsed arguments, yielding a string-serializable result.
    async fn invoke(&self, args: Value) -> anyhow::Result<String>;
}

/// Descriptor of a capability: what the model sees.
///
/// Also the shape host-provided actions arrive in, so catalog tools and host
/// actions can be merged into one schema list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "empty_object")]
    pub parameters: Value,
}

fn empty_object() -> Value {
    json!({"type": "object", "properties": {}})
}

impl ToolSpec {
    pub fn of(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters_schema(),
        }
    }

    /// Chat-completions function schema for this capability.
    pub fn to_schema(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Registry of invocable tools, keyed by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. A tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Descriptors of all registered tools, sorted by name for stable output.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|t| ToolSpec::of(t.as_ref())).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }
}

/// Invoke a tool, converting a panic inside the implementation into a normal
/// error so one misbehaving tool cannot take down the conversation pass.
pub async fn invoke_guarded(tool: Arc<dyn Tool>, args: Value) -> anyhow::Result<String> {
    let name = tool.name().to_string();
    match std::panic::AssertUnwindSafe(tool.invoke(args))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("Tool '{}' panicked during execution", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the input back"
        }

        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string", "description": "Text to echo"}
                },
                "required": ["text"]
            })
        }

        async fn invoke(&self, args: Value) -> anyhow::Result<String> {
            let text = args["text"]
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("Missing 'text' argument"))?;
            Ok(text.to_string())
        }
    }

    struct PanickyTool;

    #[async_trait]
    impl Tool for PanickyTool {
        fn name(&self) -> &str {
            "panicky"
        }

        fn description(&self) -> &str {
            "Always panics"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }

        async fn invoke(&self, _args: Value) -> anyhow::Result<String> {
            panic!("boom");
        }
    }

    #[tokio::test]
    async fn registry_resolves_registered_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        assert!(registry.has("echo"));
        assert!(!registry.has("missing"));

        let tool = registry.get("echo").expect("echo registered");
        let result = tool
            .invoke(json!({"text": "hello"}))
            .await
            .expect("invoke echo");
        assert_eq!(result, "hello");
    }

    #[test]
    fn specs_are_sorted_and_schema_shaped() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(PanickyTool));
        registry.register(Arc::new(EchoTool));

        let specs = registry.specs();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "echo");
        assert_eq!(specs[1].name, "panicky");

        let schema = specs[0].to_schema();
        assert_eq!(schema["type"], "function");
        assert_eq!(schema["function"]["name"], "echo");
        assert_eq!(schema["function"]["parameters"]["type"], "object");
    }

    #[tokio::test]
    async fn guarded_invoke_converts_panics_to_errors() {
        let tool: Arc<dyn Tool> = Arc::new(PanickyTool);
        let err = invoke_guarded(tool, json!({}))
            .await
            .expect_err("panic should surface as error");
        assert!(err.to_string().contains("panicked"));
    }

    #[tokio::test]
    async fn guarded_invoke_passes_results_through() {
        let tool: Arc<dyn Tool> = Arc::new(EchoTool);
        let out = invoke_guarded(tool, json!({"text": "ok"}))
            .await
            .expect("invoke");
        assert_eq!(out, "ok");
    }
}
