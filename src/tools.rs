//! Tool definition and execution for the Claude Agent SDK.
//!
//! A [`Tool`] bundles a name, a description, a JSON Schema for the input,
//! and an async handler. Three ways to make one:
//!
//! 1. [`Tool::new`] with a hand-written schema,
//! 2. the [`tool()`] builder, which assembles the schema parameter by
//!    parameter,
//! 3. [`Tool::typed`], which derives the schema from a Rust input struct and
//!    deserializes raw input before the handler sees it.
//!
//! Tools live in a [`ToolRegistry`], which presents them to the model in
//! registration order and dispatches execution. Execution distinguishes two
//! failure modes: a tool that *ran and reported failure* returns a
//! [`ToolOutput`] with `is_error = true`, while a tool that *could not run*
//! (unknown name) is a registry-level `Err`. Malformed input to a typed tool
//! is the former — the model can read the message and correct itself.
//!
//! Every handler receives a [`ToolContext`] alongside its input. The context
//! carries the run's cancellation signal; long-running tools (shell
//! commands, network fetches) should poll or race on it so an interrupted
//! run does not wait out their I/O.
//!
//! # Examples
//!
//! ```rust
//! use claude_agent::{tool, ToolOutput};
//!
//! let weather = tool("get_weather", "Get current weather for a city")
//!     .param("city", "string", "City name")
//!     .build(|input, _context| async move {
//!         let city = input["city"].as_str().unwrap_or("somewhere");
//!         Ok(ToolOutput::text(format!("72F and sunny in {city}")))
//!     });
//! # let _ = weather;
//! ```
//!
//! A handler that honors cancellation races its work against the context:
//!
//! ```rust
//! use claude_agent::{tool, ToolOutput};
//! use std::time::Duration;
//!
//! let slow = tool("slow_scan", "Scan a large directory tree")
//!     .build(|_input, context| async move {
//!         tokio::select! {
//!             _ = context.cancelled() => Ok(ToolOutput::error("scan cancelled")),
//!             _ = tokio::time::sleep(Duration::from_secs(300)) => {
//!                 Ok(ToolOutput::text("scan complete"))
//!             }
//!         }
//!     });
//! # let _ = slow;
//! ```

use crate::stream::ToolDefinition;
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;

/// What a tool hands back to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Text result (or failure message).
    pub content: String,
    /// Whether the tool reports failure.
    pub is_error: bool,
    /// Optional structured metadata, e.g. a shell exit code under
    /// `exit_code`.
    pub metadata: Option<serde_json::Map<String, Value>>,
}

impl ToolOutput {
    /// A successful text result.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
            metadata: None,
        }
    }

    /// An error-flagged result. The run continues; the model observes the
    /// message and can adapt.
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
            metadata: None,
        }
    }

    /// Attaches a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata
            .get_or_insert_with(serde_json::Map::new)
            .insert(key.into(), value);
        self
    }
}

/// Execution context handed to every tool handler.
///
/// Carries the run's cancellation signal. The run loop additionally races
/// each execution against the same signal, so a tool that ignores its
/// context is still abandoned on interrupt — but a cooperative tool can
/// shut down its own I/O cleanly instead of being dropped mid-flight.
#[derive(Clone, Debug, Default)]
pub struct ToolContext {
    cancel: CancellationToken,
}

impl ToolContext {
    /// Creates a context bound to a cancellation token.
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Whether the run has been cancelled. Cheap; suitable for polling
    /// inside a work loop.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes when the run is cancelled. Race long-running work against
    /// this with `tokio::select!`.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// The underlying token, for handing to spawned sub-work.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Type alias for tool handler functions.
///
/// Handlers take the raw JSON input plus a [`ToolContext`] and return a
/// [`ToolOutput`]. They are `Arc`-wrapped pinned-boxed futures so tools of
/// different concrete types can live in one registry and be invoked across
/// threads.
pub type ToolHandler = Arc<
    dyn Fn(Value, ToolContext) -> Pin<Box<dyn Future<Output = Result<ToolOutput>> + Send>>
        + Send
        + Sync,
>;

/// A tool the model can call.
///
/// Immutable once constructed; cloning shares the handler through its `Arc`.
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: String,
    input_schema: Value,
    handler: ToolHandler,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

impl Tool {
    /// Creates a tool from a raw JSON Schema and handler.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            handler: Arc::new(move |input, context| Box::pin(handler(input, context))),
        }
    }

    /// Creates a tool with a typed input struct.
    ///
    /// The JSON Schema is generated from `T`; raw input is deserialized
    /// before the handler runs. Deserialization failure produces an
    /// error-flagged [`ToolOutput`] rather than a registry error, so the
    /// model sees what was wrong with its arguments.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use claude_agent::{Tool, ToolOutput};
    /// use schemars::JsonSchema;
    /// use serde::Deserialize;
    ///
    /// #[derive(Deserialize, JsonSchema)]
    /// struct WeatherInput {
    ///     /// City name.
    ///     city: String,
    /// }
    ///
    /// let weather = Tool::typed(
    ///     "get_weather",
    ///     "Get current weather for a city",
    ///     |input: WeatherInput, _context| async move {
    ///         Ok(ToolOutput::text(format!("72F in {}", input.city)))
    ///     },
    /// );
    /// # let _ = weather;
    /// ```
    pub fn typed<T, F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F,
    ) -> Self
    where
        T: DeserializeOwned + schemars::JsonSchema + Send + 'static,
        F: Fn(T, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput>> + Send + 'static,
    {
        let schema = schemars::SchemaGenerator::default().into_root_schema_for::<T>();
        let input_schema = serde_json::to_value(schema).unwrap_or_else(|_| {
            serde_json::json!({"type": "object"})
        });
        let handler = Arc::new(handler);
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            handler: Arc::new(move |input, context| {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    match serde_json::from_value::<T>(input) {
                        Ok(typed) => handler(typed, context).await,
                        Err(e) => Ok(ToolOutput::error(format!("invalid tool input: {e}"))),
                    }
                })
            }),
        }
    }

    /// Returns the tool name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the tool description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the input schema.
    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    /// Invokes the handler with raw JSON input and an execution context.
    pub async fn execute(&self, input: Value, context: ToolContext) -> Result<ToolOutput> {
        (self.handler)(input, context).await
    }

    /// Wire-format definition for the API tool list.
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }
}

/// Starts a [`ToolBuilder`].
pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder {
        name: name.into(),
        description: description.into(),
        properties: serde_json::Map::new(),
        required: Vec::new(),
    }
}

/// Builder assembling a tool schema parameter by parameter.
///
/// Parameters added with [`param`](ToolBuilder::param) are required;
/// [`optional`](ToolBuilder::optional) ones are not. The resulting schema is
/// always `{"type": "object", "properties": ..., "required": ...}`.
#[derive(Debug)]
pub struct ToolBuilder {
    name: String,
    description: String,
    properties: serde_json::Map<String, Value>,
    required: Vec<String>,
}

impl ToolBuilder {
    /// Adds a required parameter.
    pub fn param(
        mut self,
        name: impl Into<String>,
        json_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.properties.insert(
            name.clone(),
            serde_json::json!({
                "type": json_type.into(),
                "description": description.into(),
            }),
        );
        self.required.push(name);
        self
    }

    /// Adds an optional parameter.
    pub fn optional(
        mut self,
        name: impl Into<String>,
        json_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.properties.insert(
            name.into(),
            serde_json::json!({
                "type": json_type.into(),
                "description": description.into(),
            }),
        );
        self
    }

    /// Finishes the tool with the given handler.
    pub fn build<F, Fut>(self, handler: F) -> Tool
    where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput>> + Send + 'static,
    {
        let schema = serde_json::json!({
            "type": "object",
            "properties": self.properties,
            "required": self.required,
        });
        Tool::new(self.name, self.description, schema, handler)
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

#[derive(Default)]
struct RegistryInner {
    entries: HashMap<String, Arc<Tool>>,
    order: Vec<String>,
}

/// Registry of tools keyed by name.
///
/// Registration order is preserved so the model always sees a stable tool
/// list. Re-registering a name replaces the entry without duplicating its
/// position. All operations are safe for concurrent readers and one writer.
#[derive(Default)]
pub struct ToolRegistry {
    inner: RwLock<RegistryInner>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool. Idempotent per name: the entry is replaced but its
    /// position in the presentation order is kept.
    pub fn register(&self, tool: Arc<Tool>) {
        let mut inner = self.inner.write().expect("tool registry lock poisoned");
        let name = tool.name().to_string();
        if inner.entries.insert(name.clone(), tool).is_none() {
            inner.order.push(name);
        }
    }

    /// Looks up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<Tool>> {
        let inner = self.inner.read().expect("tool registry lock poisoned");
        inner.entries.get(name).cloned()
    }

    /// Executes a tool by name with raw JSON input and an execution
    /// context.
    ///
    /// # Errors
    ///
    /// Returns a registry-level error when the tool is unknown — the
    /// could-not-run case. A tool that ran and failed returns `Ok` with an
    /// error-flagged [`ToolOutput`], propagated unchanged.
    pub async fn execute(
        &self,
        name: &str,
        input: Value,
        context: ToolContext,
    ) -> Result<ToolOutput> {
        let tool = self
            .get(name)
            .ok_or_else(|| Error::tool(format!("tool not found: {name}")))?;
        tool.execute(input, context).await
    }

    /// Tool definitions in registration order, for the API request.
    pub fn list_for_api(&self) -> Vec<ToolDefinition> {
        let inner = self.inner.read().expect("tool registry lock poisoned");
        inner
            .order
            .iter()
            .filter_map(|name| inner.entries.get(name))
            .map(|tool| tool.definition())
            .collect()
    }

    /// Registered tool names in registration order.
    pub fn names(&self) -> Vec<String> {
        let inner = self.inner.read().expect("tool registry lock poisoned");
        inner.order.clone()
    }

    /// Tools whose name or description contains the lowercased query.
    pub fn search(&self, query: &str) -> Vec<Arc<Tool>> {
        let query = query.to_lowercase();
        let inner = self.inner.read().expect("tool registry lock poisoned");
        inner
            .order
            .iter()
            .filter_map(|name| inner.entries.get(name))
            .filter(|tool| {
                tool.name().to_lowercase().contains(&query)
                    || tool.description().to_lowercase().contains(&query)
            })
            .cloned()
            .collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .expect("tool registry lock poisoned")
            .order
            .len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
