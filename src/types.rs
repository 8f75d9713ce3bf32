//! Core type definitions for the Claude Agent SDK.
//!
//! This module contains the data structures shared across the engine:
//!
//! # Message System
//!
//! - [`Message`]: container for conversation messages with role and content
//! - [`MessageRole`]: who sent the message (User, Assistant)
//! - [`ContentBlock`]: tagged union of block types (text, thinking, tool use,
//!   tool results)
//! - [`TextBlock`], [`ThinkingBlock`], [`ToolUseBlock`], [`ToolResultBlock`]
//!
//! # Usage Accounting
//!
//! - [`TokenUsage`]: cumulative token counters, including the prompt-cache
//!   read/write tiers
//!
//! # Agent Configuration
//!
//! - [`AgentOptions`]: main configuration struct for a run
//! - [`AgentOptionsBuilder`]: builder with validation
//!
//! The message types serialize in the wire format of the messages API
//! (tagged with a `"type"` field), so a persisted session can be replayed
//! verbatim into a request.
//!
//! # Example
//!
//! ```no_run
//! use claude_agent::{AgentOptions, Message};
//!
//! let options = AgentOptions::builder()
//!     .model("claude-opus-4-6")
//!     .system_prompt("You are a weather assistant")
//!     .max_turns(8)
//!     .build()
//!     .expect("valid configuration");
//!
//! let msg = Message::user("What's the weather in SF?");
//! # let _ = (options, msg);
//! ```

use crate::budget::BudgetTracker;
use crate::hooks::Hooks;
use crate::permissions::Permissions;
use crate::stream::Streamer;
use crate::tools::Tool;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// MESSAGE SYSTEM
// ============================================================================

/// Identifies the sender of a message in the conversation.
///
/// Serializes to lowercase strings (`"user"`, `"assistant"`) to match the
/// messages API format. Tool results travel in user messages, so there is no
/// separate tool role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Input from the human or calling application, including tool results.
    User,
    /// Response from the model.
    Assistant,
}

/// Multi-modal content blocks that can appear in messages.
///
/// Uses serde's tagged format with a `"type"` field:
/// ```json
/// {"type": "text", "text": "Hello"}
/// {"type": "tool_use", "id": "toolu_123", "name": "get_weather", "input": {...}}
/// {"type": "tool_result", "tool_use_id": "toolu_123", "content": "72F"}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text content.
    Text(TextBlock),

    /// Model reasoning emitted when a thinking budget is configured.
    Thinking(ThinkingBlock),

    /// Tool invocation request from the model.
    ToolUse(ToolUseBlock),

    /// Tool execution result sent back to the model.
    ToolResult(ToolResultBlock),
}

impl ContentBlock {
    /// Convenience constructor for a text block.
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text(TextBlock::new(text))
    }
}

/// Simple text content in a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextBlock {
    /// The text content.
    pub text: String,
}

impl TextBlock {
    /// Creates a new text block from any string-like type.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Model reasoning content.
///
/// Present when the request carried a thinking configuration. The signature
/// is an opaque server token and must be passed back unchanged on replay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThinkingBlock {
    /// The reasoning text.
    pub thinking: String,

    /// Opaque integrity token attached by the API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Tool use request from the model.
///
/// The engine executes the named tool and answers with a
/// [`ToolResultBlock`] carrying the same `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolUseBlock {
    /// Unique identifier for this tool call, generated by the model.
    pub id: String,

    /// Name of the tool to execute.
    pub name: String,

    /// JSON parameters matching the tool's input schema.
    pub input: serde_json::Value,
}

impl ToolUseBlock {
    /// Creates a new tool use block.
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// Tool execution result sent back to the model.
///
/// Distinguishes a tool that *ran and reported failure* (`is_error = true`)
/// from one that could not run at all — the latter is synthesized by the run
/// loop with an explanatory message, also error-flagged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResultBlock {
    /// ID of the tool use request this result corresponds to.
    pub tool_use_id: String,

    /// Text produced by the tool (or the failure message).
    pub content: String,

    /// Whether the tool reported failure.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,

    /// Optional tool-specific metadata (e.g. a shell exit code under
    /// `exit_code`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ToolResultBlock {
    /// Creates a successful tool result.
    pub fn new(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: false,
            metadata: None,
        }
    }

    /// Creates an error-flagged tool result.
    pub fn error(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: true,
            metadata: None,
        }
    }
}

/// A complete message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// The role/sender of this message.
    pub role: MessageRole,

    /// The content blocks that make up this message.
    pub content: Vec<ContentBlock>,
}

impl Message {
    /// Creates a new message with the specified role and content.
    pub fn new(role: MessageRole, content: Vec<ContentBlock>) -> Self {
        Self { role, content }
    }

    /// Creates a user message with a single text block.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, vec![ContentBlock::text(text)])
    }

    /// Creates a user message carrying arbitrary blocks (tool results).
    pub fn user_with_blocks(content: Vec<ContentBlock>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Creates an assistant message.
    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Concatenated text of all text blocks in this message.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Tool use blocks contained in this message, in order.
    pub fn tool_uses(&self) -> Vec<&ToolUseBlock> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse(t) => Some(t),
                _ => None,
            })
            .collect()
    }
}

// ============================================================================
// USAGE ACCOUNTING
// ============================================================================

/// Cumulative token counters for one run or one API call.
///
/// Serialized field names match the session file format, which predates this
/// crate and is kept stable for interoperability.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    /// Non-cached input tokens.
    #[serde(rename = "InputTokens", default)]
    pub input_tokens: u64,

    /// Output tokens.
    #[serde(rename = "OutputTokens", default)]
    pub output_tokens: u64,

    /// Input tokens served from the prompt cache.
    #[serde(rename = "CacheReadInputTokens", default)]
    pub cache_read_input_tokens: u64,

    /// Input tokens written to the prompt cache.
    #[serde(rename = "CacheCreationInputTokens", default)]
    pub cache_creation_input_tokens: u64,
}

impl TokenUsage {
    /// Adds another usage sample into this one. Saturating, so cumulative
    /// counters are monotonically non-decreasing.
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.cache_read_input_tokens = self
            .cache_read_input_tokens
            .saturating_add(other.cache_read_input_tokens);
        self.cache_creation_input_tokens = self
            .cache_creation_input_tokens
            .saturating_add(other.cache_creation_input_tokens);
    }

    /// Total input tokens across the non-cache and cache tiers.
    pub fn total_input(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.cache_read_input_tokens)
            .saturating_add(self.cache_creation_input_tokens)
    }
}

// ============================================================================
// AGENT CONFIGURATION
// ============================================================================

/// Structured-output configuration.
///
/// When set, the run loop injects a hidden tool with this name and schema
/// into every request and forces tool choice to it. The model "calls" the
/// tool to deliver its final structured answer; the loop treats that call as
/// the end of the run.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    /// Name of the hidden output tool.
    pub name: String,
    /// JSON Schema the structured result must satisfy.
    pub schema: serde_json::Value,
}

impl OutputSchema {
    /// Creates a new output schema.
    pub fn new(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

/// Server-side compaction configuration.
///
/// The API rewrites the conversation on its side when the context crosses
/// the trigger; the loop observes the `compaction` stop reason, emits a
/// `Compact` event and continues without counting a turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompactionConfig {
    /// Input-token count at which the server starts compacting. `None` uses
    /// the server default.
    pub trigger_tokens: Option<u64>,
    /// Whether the server pauses the turn after compacting.
    pub pause_after: bool,
    /// Instructions the server must preserve verbatim through compaction.
    pub preserve_instructions: Option<String>,
}

/// Configuration options for an agent.
///
/// `AgentOptions` controls model selection, run limits, tool availability,
/// lifecycle hooks and the permission policy. Construct it through
/// [`AgentOptions::builder()`] so required fields are validated.
///
/// # Thread Safety
///
/// Tools are `Arc`-wrapped and the whole struct is cheap to clone; an
/// [`Agent`](crate::Agent) holds one immutable copy for its lifetime.
#[derive(Clone)]
pub struct AgentOptions {
    /// System prompt sent with every request. Empty means none.
    pub(crate) system_prompt: String,

    /// Model identifier (e.g. "claude-opus-4-6").
    pub(crate) model: String,

    /// Secondary model used for a single retry when the primary returns an
    /// overloaded/unavailable error.
    pub(crate) fallback_model: Option<String>,

    /// API credential. Falls back to `ANTHROPIC_API_KEY` when unset.
    pub(crate) api_key: Option<String>,

    /// API base URL. Falls back to `ANTHROPIC_BASE_URL`, then the default
    /// endpoint.
    pub(crate) base_url: Option<String>,

    /// Maximum turns per run. 0 means unlimited.
    pub(crate) max_turns: u32,

    /// Maximum output tokens per model response.
    pub(crate) max_tokens: u32,

    /// Budget ceiling in USD. Zero means unlimited.
    pub(crate) max_budget_usd: Decimal,

    /// HTTP request timeout in seconds, applied per streaming call.
    pub(crate) timeout: u64,

    /// Thinking budget in tokens. When set, requests carry a thinking
    /// config and the max-tokens floor rises to `budget + 16384`.
    pub(crate) thinking_budget: Option<u32>,

    /// Structured-output exit tool, if configured.
    pub(crate) output_schema: Option<OutputSchema>,

    /// Server-side compaction directive, if configured.
    pub(crate) compaction: Option<CompactionConfig>,

    /// Extra beta flags attached to requests.
    pub(crate) betas: Vec<String>,

    /// Tools available to the model.
    pub(crate) tools: Vec<Arc<Tool>>,

    /// Lifecycle hooks.
    pub(crate) hooks: Hooks,

    /// Permission policy for tool execution. `None` means no policy is
    /// configured and every tool may run.
    pub(crate) permissions: Option<Permissions>,

    /// Custom transport. Used by tests and alternate backends; `None`
    /// builds the default HTTP streamer.
    pub(crate) streamer: Option<Arc<dyn Streamer>>,

    /// Shared budget tracker, for sub-agents drawing on one budget. `None`
    /// creates a private tracker.
    pub(crate) budget: Option<Arc<BudgetTracker>>,
}

/// Custom Debug implementation to prevent credential leakage: the API key is
/// masked and tools/hooks are shown as counts.
impl std::fmt::Debug for AgentOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentOptions")
            .field("model", &self.model)
            .field("fallback_model", &self.fallback_model)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("max_turns", &self.max_turns)
            .field("max_tokens", &self.max_tokens)
            .field("max_budget_usd", &self.max_budget_usd)
            .field("timeout", &self.timeout)
            .field("thinking_budget", &self.thinking_budget)
            .field("tools", &format!("{} tools", self.tools.len()))
            .field("hooks", &self.hooks)
            .field("permissions", &self.permissions)
            .finish()
    }
}

impl AgentOptions {
    /// Creates a new builder for constructing [`AgentOptions`].
    pub fn builder() -> AgentOptionsBuilder {
        AgentOptionsBuilder::default()
    }

    /// Returns the system prompt.
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Returns the model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the fallback model, if configured.
    pub fn fallback_model(&self) -> Option<&str> {
        self.fallback_model.as_deref()
    }

    /// Returns the maximum number of turns (0 = unlimited).
    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    /// Returns the maximum output tokens per response.
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    /// Returns the budget ceiling in USD (zero = unlimited).
    pub fn max_budget_usd(&self) -> Decimal {
        self.max_budget_usd
    }

    /// Returns the HTTP timeout in seconds.
    pub fn timeout(&self) -> u64 {
        self.timeout
    }

    /// Returns the configured tools.
    pub fn tools(&self) -> &[Arc<Tool>] {
        &self.tools
    }

    /// Returns the hooks configuration.
    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Returns the permission policy, if one is configured.
    pub fn permissions(&self) -> Option<&Permissions> {
        self.permissions.as_ref()
    }
}

/// Builder for [`AgentOptions`] with validation.
///
/// # Required Fields
///
/// - `model`: the model identifier
///
/// Everything else has a default. [`build()`](AgentOptionsBuilder::build)
/// validates and assembles the final options.
///
/// # Examples
///
/// ```no_run
/// use claude_agent::AgentOptions;
///
/// let options = AgentOptions::builder()
///     .model("claude-opus-4-6")
///     .fallback_model("claude-sonnet-4-6")
///     .system_prompt("You are a helpful assistant")
///     .max_turns(10)
///     .build()
///     .expect("valid configuration");
/// ```
#[derive(Default)]
pub struct AgentOptionsBuilder {
    system_prompt: Option<String>,
    model: Option<String>,
    fallback_model: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    max_turns: Option<u32>,
    max_tokens: Option<u32>,
    max_budget_usd: Option<Decimal>,
    timeout: Option<u64>,
    thinking_budget: Option<u32>,
    output_schema: Option<OutputSchema>,
    compaction: Option<CompactionConfig>,
    betas: Vec<String>,
    tools: Vec<Arc<Tool>>,
    hooks: Hooks,
    permissions: Option<Permissions>,
    streamer: Option<Arc<dyn Streamer>>,
    budget: Option<Arc<BudgetTracker>>,
}

impl std::fmt::Debug for AgentOptionsBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentOptionsBuilder")
            .field("model", &self.model)
            .field("fallback_model", &self.fallback_model)
            .field("tools", &format!("{} tools", self.tools.len()))
            .finish()
    }
}

impl AgentOptionsBuilder {
    /// Sets the system prompt.
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Sets the model identifier (required).
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the fallback model used for one retry on overloaded/unavailable
    /// stream errors.
    pub fn fallback_model(mut self, model: impl Into<String>) -> Self {
        self.fallback_model = Some(model.into());
        self
    }

    /// Sets the API key. When unset, `ANTHROPIC_API_KEY` is used.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the API base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the maximum number of turns per run. 0 means unlimited.
    pub fn max_turns(mut self, turns: u32) -> Self {
        self.max_turns = Some(turns);
        self
    }

    /// Sets the maximum output tokens per model response.
    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    /// Sets the budget ceiling in USD. Zero means unlimited.
    pub fn max_budget_usd(mut self, budget: Decimal) -> Self {
        self.max_budget_usd = Some(budget);
        self
    }

    /// Sets the HTTP timeout in seconds.
    pub fn timeout(mut self, timeout: u64) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Enables extended thinking with the given token budget.
    pub fn thinking_budget(mut self, tokens: u32) -> Self {
        self.thinking_budget = Some(tokens);
        self
    }

    /// Configures the structured-output exit tool.
    pub fn output_schema(mut self, schema: OutputSchema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Enables server-side compaction.
    pub fn compaction(mut self, config: CompactionConfig) -> Self {
        self.compaction = Some(config);
        self
    }

    /// Attaches an extra beta flag to every request.
    pub fn beta(mut self, flag: impl Into<String>) -> Self {
        self.betas.push(flag.into());
        self
    }

    /// Adds a single tool.
    pub fn tool(mut self, tool: Tool) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    /// Adds multiple tools at once.
    pub fn tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools.extend(tools.into_iter().map(Arc::new));
        self
    }

    /// Sets lifecycle hooks.
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Sets the permission policy. Without one, every tool may run.
    pub fn permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// Sets a custom transport in place of the HTTP streamer. Intended for
    /// tests and alternate backends.
    pub fn streamer(mut self, streamer: Arc<dyn Streamer>) -> Self {
        self.streamer = Some(streamer);
        self
    }

    /// Shares an existing budget tracker (e.g. across sub-agents).
    pub fn budget_tracker(mut self, tracker: Arc<BudgetTracker>) -> Self {
        self.budget = Some(tracker);
        self
    }

    /// Validates configuration and builds the final [`AgentOptions`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `model` is missing or blank, when
    /// `max_tokens` is zero, or when an explicit base URL lacks an
    /// http/https scheme.
    pub fn build(self) -> crate::Result<AgentOptions> {
        let model = self
            .model
            .ok_or_else(|| crate::Error::config("model is required"))?;

        if model.trim().is_empty() {
            return Err(crate::Error::invalid_input(
                "model cannot be empty or whitespace",
            ));
        }

        if let Some(url) = &self.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(crate::Error::invalid_input(
                    "base_url must start with http:// or https://",
                ));
            }
        }

        let max_tokens = self.max_tokens.unwrap_or(4096);
        if max_tokens == 0 {
            return Err(crate::Error::invalid_input(
                "max_tokens must be greater than 0",
            ));
        }

        if let Some(budget) = self.thinking_budget {
            if budget == 0 {
                return Err(crate::Error::invalid_input(
                    "thinking_budget must be greater than 0",
                ));
            }
        }

        Ok(AgentOptions {
            system_prompt: self.system_prompt.unwrap_or_default(),
            model,
            fallback_model: self.fallback_model,
            api_key: self.api_key,
            base_url: self.base_url,
            // Unlimited turns by default; callers opt into a ceiling.
            max_turns: self.max_turns.unwrap_or(0),
            max_tokens,
            max_budget_usd: self.max_budget_usd.unwrap_or(Decimal::ZERO),
            // Streaming responses can take a while; 600s covers long turns.
            timeout: self.timeout.unwrap_or(600),
            thinking_budget: self.thinking_budget,
            output_schema: self.output_schema,
            compaction: self.compaction,
            betas: self.betas,
            tools: self.tools,
            hooks: self.hooks,
            permissions: self.permissions,
            streamer: self.streamer,
            budget: self.budget,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::dec;

    #[test]
    fn test_message_constructors() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.text(), "Hello");

        let msg = Message::assistant(vec![
            ContentBlock::text("Let me check."),
            ContentBlock::ToolUse(ToolUseBlock::new(
                "toolu_1",
                "get_weather",
                serde_json::json!({"city": "SF"}),
            )),
        ]);
        assert_eq!(msg.role, MessageRole::Assistant);
        assert_eq!(msg.tool_uses().len(), 1);
        assert_eq!(msg.tool_uses()[0].name, "get_weather");
    }

    #[test]
    fn test_content_block_serialization() {
        let block = ContentBlock::text("hi");
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["text"], "hi");

        let block = ContentBlock::ToolResult(ToolResultBlock::error("toolu_9", "boom"));
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["is_error"], true);

        // is_error is omitted on success results
        let block = ContentBlock::ToolResult(ToolResultBlock::new("toolu_9", "ok"));
        let json = serde_json::to_value(&block).unwrap();
        assert!(json.get("is_error").is_none());
    }

    #[test]
    fn test_content_block_roundtrip() {
        let original = ContentBlock::ToolUse(ToolUseBlock::new(
            "toolu_abc",
            "search",
            serde_json::json!({"query": "rust"}),
        ));
        let json = serde_json::to_string(&original).unwrap();
        let decoded: ContentBlock = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_token_usage_add_is_monotonic() {
        let mut total = TokenUsage::default();
        total.add(&TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
            ..Default::default()
        });
        total.add(&TokenUsage {
            input_tokens: 3,
            output_tokens: 2,
            cache_read_input_tokens: 7,
            cache_creation_input_tokens: 1,
        });
        assert_eq!(total.input_tokens, 13);
        assert_eq!(total.output_tokens, 7);
        assert_eq!(total.cache_read_input_tokens, 7);
        assert_eq!(total.total_input(), 21);
    }

    #[test]
    fn test_token_usage_session_field_names() {
        let usage = TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
            ..Default::default()
        };
        let json = serde_json::to_value(usage).unwrap();
        assert_eq!(json["InputTokens"], 10);
        assert_eq!(json["OutputTokens"], 5);
        assert_eq!(json["CacheReadInputTokens"], 0);
        assert_eq!(json["CacheCreationInputTokens"], 0);
    }

    #[test]
    fn test_builder_requires_model() {
        let result = AgentOptions::builder().build();
        assert!(result.is_err());

        let result = AgentOptions::builder().model("   ").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_defaults() {
        let options = AgentOptions::builder()
            .model("claude-opus-4-6")
            .build()
            .unwrap();
        assert_eq!(options.max_turns(), 0);
        assert_eq!(options.max_tokens(), 4096);
        assert_eq!(options.max_budget_usd(), Decimal::ZERO);
        assert!(options.fallback_model().is_none());
    }

    #[test]
    fn test_builder_validates_base_url() {
        let result = AgentOptions::builder()
            .model("claude-opus-4-6")
            .base_url("localhost:8080")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_validates_max_tokens() {
        let result = AgentOptions::builder()
            .model("claude-opus-4-6")
            .max_tokens(0)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_full_configuration() {
        let options = AgentOptions::builder()
            .model("claude-opus-4-6")
            .fallback_model("claude-sonnet-4-6")
            .system_prompt("Be terse")
            .max_turns(4)
            .max_tokens(2048)
            .max_budget_usd(dec!(1.50))
            .thinking_budget(8192)
            .beta("interleaved-thinking-test")
            .build()
            .unwrap();
        assert_eq!(options.model(), "claude-opus-4-6");
        assert_eq!(options.fallback_model(), Some("claude-sonnet-4-6"));
        assert_eq!(options.max_budget_usd(), dec!(1.50));
        assert_eq!(options.betas, vec!["interleaved-thinking-test"]);
    }

    #[test]
    fn test_debug_masks_api_key() {
        let options = AgentOptions::builder()
            .model("claude-opus-4-6")
            .api_key("sk-super-secret")
            .build()
            .unwrap();
        let debug = format!("{:?}", options);
        assert!(!debug.contains("sk-super-secret"));
        assert!(debug.contains("***"));
    }
}
