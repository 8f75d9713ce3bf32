//! Lifecycle hooks for observing and steering agent execution.
//!
//! Hooks are registered as [`HookMatcher`]s: an event, an optional regex
//! over the tool name, an ordered list of callbacks, and a per-matcher
//! timeout. The run loop dispatches at fixed lifecycle points and composes
//! the results:
//!
//! - `block` is set by the **first** callback that blocks; once blocked, no
//!   further matchers run.
//! - `updated_input`: the **last** non-nil value wins, so later matchers can
//!   rewrite earlier rewrites.
//! - `decision`: the **last** non-empty value wins.
//! - A callback error aborts dispatch immediately and surfaces to the loop.
//!
//! # Examples
//!
//! ```rust
//! use claude_agent::{HookEvent, HookOutput, Hooks};
//!
//! let hooks = Hooks::new().on(HookEvent::PreToolUse, |input| async move {
//!     if input.tool_name.as_deref() == Some("Write") {
//!         return Ok(Some(HookOutput::block("writes are disabled here")));
//!     }
//!     Ok(None)
//! });
//! # let _ = hooks;
//! ```

use crate::{Error, Result};
use regex::Regex;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Default per-matcher deadline.
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifecycle points at which hooks fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    /// Before a tool executes; may block or rewrite the input.
    PreToolUse,
    /// After a tool executed successfully.
    PostToolUse,
    /// After a tool failed (error-flagged result or registry error).
    PostToolUseFailure,
    /// After a tool result block is appended, success or failure.
    ToolResult,
    /// When a permission check resolved to Ask.
    PermissionRequest,
    /// When the run reaches a terminal stop reason.
    Stop,
    /// At run start.
    SessionStart,
    /// At run end, whatever the exit path.
    SessionEnd,
    /// Before a compaction cycle continues the loop.
    PreCompact,
    /// After a compaction cycle.
    PostCompact,
    /// Before each model request.
    PreApiRequest,
    /// After each model response is accumulated.
    PostApiRequest,
    /// Out-of-band notification payloads.
    Notification,
    /// When a user prompt enters the conversation.
    UserPromptSubmit,
    /// When a sub-agent starts.
    SubagentStart,
    /// When a sub-agent stops.
    SubagentStop,
}

/// Input handed to hook callbacks.
///
/// Only the fields relevant to the firing event are populated.
#[derive(Debug, Clone, Default)]
pub struct HookInput {
    /// Session the run operates on.
    pub session_id: String,
    /// The firing event.
    pub event: Option<HookEvent>,
    /// Tool name, for tool-scoped events.
    pub tool_name: Option<String>,
    /// Tool input, for tool-scoped events.
    pub tool_input: Option<Value>,
    /// Tool output text, for post-tool events.
    pub tool_output: Option<String>,
    /// Tool error text, for failure events.
    pub tool_error: Option<String>,
    /// Model in use, for API-request events.
    pub model: Option<String>,
    /// Input tokens of the call, for API-request events.
    pub input_tokens: Option<u64>,
    /// Output tokens of the call, for API-request events.
    pub output_tokens: Option<u64>,
    /// Compaction strategy, for compaction events.
    pub compaction_strategy: Option<String>,
    /// Prompt text, for UserPromptSubmit.
    pub prompt: Option<String>,
    /// Sub-agent name, for subagent events.
    pub subagent: Option<String>,
    /// Notification payload, for Notification.
    pub notification: Option<Value>,
}

impl HookInput {
    /// Creates an input for the given session and event.
    pub fn new(session_id: impl Into<String>, event: HookEvent) -> Self {
        Self {
            session_id: session_id.into(),
            event: Some(event),
            ..Default::default()
        }
    }

    /// Sets the tool name and input.
    pub fn with_tool(mut self, name: impl Into<String>, input: Value) -> Self {
        self.tool_name = Some(name.into());
        self.tool_input = Some(input);
        self
    }

    /// Sets the tool output text.
    pub fn with_tool_output(mut self, output: impl Into<String>) -> Self {
        self.tool_output = Some(output.into());
        self
    }

    /// Sets the tool error text.
    pub fn with_tool_error(mut self, error: impl Into<String>) -> Self {
        self.tool_error = Some(error.into());
        self
    }

    /// Sets the model and token counts for API-request events.
    pub fn with_api_call(
        mut self,
        model: impl Into<String>,
        input_tokens: Option<u64>,
        output_tokens: Option<u64>,
    ) -> Self {
        self.model = Some(model.into());
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        self
    }

    /// Sets the prompt text.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }
}

/// Result returned by a hook callback. `None` means "no contribution".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookOutput {
    /// Block the operation this event guards.
    pub block: bool,
    /// Explanation for a block, surfaced in synthetic tool results.
    pub reason: Option<String>,
    /// Replacement tool input (PreToolUse).
    pub updated_input: Option<Value>,
    /// Free-form decision token; the last non-empty one wins.
    pub decision: Option<String>,
}

impl HookOutput {
    /// Blocks the guarded operation with a reason.
    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            block: true,
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    /// Rewrites the tool input.
    pub fn updated_input(input: Value) -> Self {
        Self {
            updated_input: Some(input),
            ..Default::default()
        }
    }

    /// Records a decision token.
    pub fn decision(decision: impl Into<String>) -> Self {
        Self {
            decision: Some(decision.into()),
            ..Default::default()
        }
    }
}

/// Type alias for hook callbacks.
///
/// Callbacks are async, may contribute a [`HookOutput`], and may fail —
/// a failure aborts the dispatch.
pub type HookCallback = Arc<
    dyn Fn(HookInput) -> Pin<Box<dyn Future<Output = Result<Option<HookOutput>>> + Send>>
        + Send
        + Sync,
>;

/// Binds a lifecycle event to callbacks, with an optional tool-name filter.
#[derive(Clone)]
pub struct HookMatcher {
    event: HookEvent,
    pattern: Option<Regex>,
    callbacks: Vec<HookCallback>,
    timeout: Duration,
}

impl std::fmt::Debug for HookMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookMatcher")
            .field("event", &self.event)
            .field("pattern", &self.pattern.as_ref().map(|r| r.as_str()))
            .field("callbacks", &format!("{} callbacks", self.callbacks.len()))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HookMatcher {
    /// Creates a matcher for an event, matching every tool name.
    pub fn new(event: HookEvent) -> Self {
        Self {
            event,
            pattern: None,
            callbacks: Vec::new(),
            timeout: DEFAULT_HOOK_TIMEOUT,
        }
    }

    /// Restricts the matcher to tool names matching a regex.
    ///
    /// # Errors
    ///
    /// Returns an invalid-input error for an unparseable pattern.
    pub fn pattern(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::invalid_input(format!("invalid hook pattern {pattern:?}: {e}")))?;
        self.pattern = Some(regex);
        Ok(self)
    }

    /// Overrides the per-matcher deadline (default 30 s).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Appends a callback.
    pub fn callback<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(HookInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<HookOutput>>> + Send + 'static,
    {
        self.callbacks
            .push(Arc::new(move |input| Box::pin(handler(input))));
        self
    }

    fn matches(&self, event: HookEvent, tool_name: Option<&str>) -> bool {
        if self.event != event {
            return false;
        }
        match &self.pattern {
            None => true,
            Some(regex) => regex.is_match(tool_name.unwrap_or("")),
        }
    }
}

/// Ordered collection of hook matchers.
#[derive(Clone, Default)]
pub struct Hooks {
    matchers: Vec<HookMatcher>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("matchers", &format!("{} matchers", self.matchers.len()))
            .finish()
    }
}

impl Hooks {
    /// Creates an empty hook set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a matcher.
    pub fn add_matcher(mut self, matcher: HookMatcher) -> Self {
        self.matchers.push(matcher);
        self
    }

    /// Shorthand: one unfiltered callback for an event.
    pub fn on<F, Fut>(self, event: HookEvent, handler: F) -> Self
    where
        F: Fn(HookInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<HookOutput>>> + Send + 'static,
    {
        self.add_matcher(HookMatcher::new(event).callback(handler))
    }

    /// Whether any matcher is registered for the event.
    pub fn has_matchers(&self, event: HookEvent) -> bool {
        self.matchers.iter().any(|m| m.event == event)
    }

    /// Dispatches an event.
    ///
    /// Matchers are evaluated in registration order; composition rules are
    /// documented at module level. The overall result is `None` iff every
    /// callback returned `None`.
    ///
    /// # Errors
    ///
    /// Propagates the first callback error; a matcher that exceeds its
    /// deadline surfaces as a hook error.
    pub async fn dispatch(
        &self,
        event: HookEvent,
        tool_name: Option<&str>,
        input: &HookInput,
    ) -> Result<Option<HookOutput>> {
        let mut composed: Option<HookOutput> = None;

        for matcher in &self.matchers {
            if !matcher.matches(event, tool_name) {
                continue;
            }

            let run = async {
                for callback in &matcher.callbacks {
                    if let Some(output) = callback(input.clone()).await? {
                        let blocked = output.block;
                        merge(&mut composed, output);
                        if blocked {
                            return Ok::<bool, Error>(true);
                        }
                    }
                }
                Ok(false)
            };

            let blocked = match tokio::time::timeout(matcher.timeout, run).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(Error::hook(format!(
                        "hook matcher for {event:?} timed out after {:?}",
                        matcher.timeout
                    )));
                }
            };

            // Once blocked, no further matchers run.
            if blocked {
                break;
            }
        }

        Ok(composed)
    }
}

/// Composition across callbacks and matchers: first block wins, last
/// updated_input wins, last non-empty decision wins.
fn merge(composed: &mut Option<HookOutput>, output: HookOutput) {
    let acc = composed.get_or_insert_with(HookOutput::default);
    if output.block && !acc.block {
        acc.block = true;
        if output.reason.is_some() {
            acc.reason = output.reason;
        }
    } else if !acc.block && output.reason.is_some() {
        acc.reason = output.reason;
    }
    if output.updated_input.is_some() {
        acc.updated_input = output.updated_input;
    }
    if output.decision.as_deref().is_some_and(|d| !d.is_empty()) {
        acc.decision = output.decision;
    }
}
