//! The agent and its run loop.
//!
//! An [`Agent`] holds immutable configuration, the tool registry, the
//! transport and the budget tracker. Each [`run`](Agent::run) spawns one
//! loop task that owns the session for the duration of the run and talks to
//! the caller through a bounded event channel:
//!
//! ```text
//! Run Loop ──► Streamer (request) ──► accumulate response
//!    │              on tool_use: PreToolUse → Permission → Execute
//!    │                           → PostToolUse/Failure → ToolResult
//!    │              append tool results, next turn
//!    └──► EventSink: System, Stream*, Assistant, Compact, Result
//! ```
//!
//! The loop is strictly sequential — one model call at a time, one tool at
//! a time — and terminates on `end_turn`, a limit (turns, budget, output
//! tokens), a fatal error, or cancellation. Every run emits exactly one
//! `System` event first and one `Result` event last.

use crate::budget::BudgetTracker;
use crate::events::{
    ChannelSink, EVENT_CHANNEL_CAPACITY, Event, EventSink, EventStream, RESULT_ERROR_DURING_EXECUTION,
    RESULT_ERROR_MAX_BUDGET_USD, RESULT_ERROR_MAX_TURNS, RESULT_SUCCESS, RunResult, event_channel,
};
use crate::hooks::{HookEvent, HookInput, Hooks};
use crate::http::AnthropicStreamer;
use crate::permissions::PermissionDecision;
use crate::retry::is_retryable_stream_error;
use crate::session::{AGENT_PREFIX, Session, generate_id};
use crate::stream::{
    ContextEdit, ContextManagement, RequestParams, StreamedResponse, Streamer, SystemBlock,
    ThinkingConfig, ToolChoice, ToolDefinition,
};
use crate::tools::{ToolContext, ToolRegistry};
use crate::types::{AgentOptions, ContentBlock, Message, TokenUsage, ToolResultBlock, ToolUseBlock};
use crate::{Error, Result};
use futures::StreamExt;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Extra output-token headroom granted on top of the thinking budget.
const THINKING_MAX_TOKENS_MARGIN: u32 = 16_384;

/// A configured agent.
///
/// Cheap to share; holds only immutable options, the concurrency-safe tool
/// registry, the transport and the budget tracker. Independent sessions may
/// run concurrently against one agent.
pub struct Agent {
    id: String,
    options: AgentOptions,
    registry: Arc<ToolRegistry>,
    streamer: Arc<dyn Streamer>,
    tracker: Arc<BudgetTracker>,
}

impl Agent {
    /// Builds an agent from options.
    ///
    /// Tools from the options are registered up front; more can be added
    /// later through [`registry`](Agent::registry) (this is where an MCP
    /// bridge plugs in). Without a custom streamer, the default HTTP
    /// transport is constructed, which requires a credential.
    pub fn new(options: AgentOptions) -> Result<Self> {
        let registry = Arc::new(ToolRegistry::new());
        for tool in options.tools() {
            registry.register(Arc::clone(tool));
        }

        let streamer: Arc<dyn Streamer> = match &options.streamer {
            Some(custom) => Arc::clone(custom),
            None => Arc::new(AnthropicStreamer::new(
                options.base_url.as_deref(),
                options.api_key.as_deref(),
                options.timeout,
            )?),
        };

        let tracker = match &options.budget {
            Some(shared) => Arc::clone(shared),
            None => Arc::new(BudgetTracker::new(options.max_budget_usd)),
        };

        Ok(Self {
            id: generate_id(AGENT_PREFIX),
            options,
            registry,
            streamer,
            tracker,
        })
    }

    /// The agent identifier (`agt_`-prefixed).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The agent options.
    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    /// The tool registry. Registration after construction is safe; the
    /// model sees the updated list on the next request.
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// The budget tracker backing this agent's runs.
    pub fn budget(&self) -> &Arc<BudgetTracker> {
        &self.tracker
    }

    /// Starts a run: appends the user prompt to the session and spawns the
    /// loop task. The session is owned by the run until it finishes.
    pub fn run(&self, mut session: Session, prompt: impl Into<String>) -> Run {
        session.push(Message::user(prompt.into()));
        self.run_session(session)
    }

    /// Starts a run over a session as-is (the caller has already appended
    /// the user message).
    pub fn run_session(&self, session: Session) -> Run {
        let (sink, events) = event_channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let ctx = RunContext {
            options: self.options.clone(),
            registry: Arc::clone(&self.registry),
            streamer: Arc::clone(&self.streamer),
            tracker: Arc::clone(&self.tracker),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(run_loop(ctx, session, sink));
        Run {
            events,
            cancel,
            handle,
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("model", &self.options.model())
            .field("tools", &self.registry.len())
            .finish()
    }
}

/// Handle to one in-flight run.
///
/// Consume events with [`next`](Run::next) (or through the `Stream` impl on
/// [`events`](Run::events)), cancel with [`interrupt`](Run::interrupt), and
/// reclaim the updated session with [`into_session`](Run::into_session).
pub struct Run {
    events: EventStream,
    cancel: CancellationToken,
    handle: JoinHandle<Session>,
}

impl Run {
    /// Receives the next event, or `None` once the run has terminated.
    pub async fn next(&mut self) -> Option<Event> {
        self.events.next().await
    }

    /// The event stream, for `futures::Stream` combinators.
    pub fn events(&mut self) -> &mut EventStream {
        &mut self.events
    }

    /// Requests cancellation. Idempotent and safe from any task; in-flight
    /// streaming and tool execution abort as promptly as their I/O allows,
    /// and the loop emits its Result at the next checkpoint. Tool handlers
    /// see the same signal through their
    /// [`ToolContext`](crate::tools::ToolContext), and even a handler that
    /// ignores it is abandoned — the loop races every tool await against
    /// this token.
    pub fn interrupt(&self) {
        self.cancel.cancel();
    }

    /// A clonable handle that can interrupt this run from another task.
    pub fn interrupt_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Detaches the event stream, letting the run finish in the
    /// background.
    pub fn into_events(self) -> EventStream {
        self.events
    }

    /// Waits for the run to finish and returns the updated session.
    ///
    /// Undrained events are dropped.
    pub async fn into_session(self) -> Result<Session> {
        // Dropping the receiver first unblocks a producer waiting on the
        // bounded channel.
        drop(self.events);
        self.handle
            .await
            .map_err(|e| Error::other(format!("run task failed: {e}")))
    }
}

/// One-shot query against a throwaway session.
///
/// # Examples
///
/// ```rust,no_run
/// use claude_agent::{AgentOptions, Event, query};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let options = AgentOptions::builder()
///         .model("claude-opus-4-6")
///         .build()?;
///
///     let mut events = query("What's the capital of France?", &options).await?;
///     while let Some(event) = events.next().await {
///         if let Event::Stream { text } = event {
///             print!("{text}");
///         }
///     }
///     Ok(())
/// }
/// ```
pub async fn query(prompt: &str, options: &AgentOptions) -> Result<EventStream> {
    let agent = Agent::new(options.clone())?;
    let session = Session::new(options.model());
    Ok(agent.run(session, prompt).into_events())
}

// ============================================================================
// RUN LOOP
// ============================================================================

/// Everything the loop task needs, detached from the Agent's lifetime.
struct RunContext {
    options: AgentOptions,
    registry: Arc<ToolRegistry>,
    streamer: Arc<dyn Streamer>,
    tracker: Arc<BudgetTracker>,
    cancel: CancellationToken,
}

/// Terminal disposition of the turn loop.
struct Outcome {
    subtype: &'static str,
    errors: Vec<String>,
}

impl Outcome {
    fn success() -> Self {
        Self {
            subtype: RESULT_SUCCESS,
            errors: Vec::new(),
        }
    }

    fn error(subtype: &'static str, message: impl Into<String>) -> Self {
        Self {
            subtype,
            errors: vec![message.into()],
        }
    }
}

/// Fires a hook best-effort: errors are logged and do not alter flow.
async fn fire_logged(hooks: &Hooks, event: HookEvent, tool: Option<&str>, input: &HookInput) {
    if let Err(e) = hooks.dispatch(event, tool, input).await {
        log::warn!("{event:?} hook failed: {e}");
    }
}

async fn run_loop(ctx: RunContext, mut session: Session, mut sink: ChannelSink) -> Session {
    let started = Instant::now();
    let run_id = generate_id(crate::session::RUN_PREFIX);
    log::debug!("run {run_id} starting on session {}", session.id);

    sink.on_system(&session.id, ctx.options.model()).await;

    let hooks = ctx.options.hooks.clone();
    fire_logged(
        &hooks,
        HookEvent::SessionStart,
        None,
        &HookInput::new(&session.id, HookEvent::SessionStart),
    )
    .await;

    let mut turns: u32 = 0;
    let mut usage = TokenUsage::default();
    let mut cost = Decimal::ZERO;

    let outcome = drive(&ctx, &mut session, &mut sink, &mut turns, &mut usage, &mut cost).await;

    // SessionEnd fires before the Result event, whatever the exit path.
    fire_logged(
        &hooks,
        HookEvent::SessionEnd,
        None,
        &HookInput::new(&session.id, HookEvent::SessionEnd),
    )
    .await;

    let is_error = outcome.subtype != RESULT_SUCCESS;
    sink.on_result(RunResult {
        subtype: outcome.subtype.to_string(),
        duration_ms: started.elapsed().as_millis() as u64,
        num_turns: turns,
        total_cost_usd: cost,
        usage,
        is_error,
        errors: outcome.errors,
    })
    .await;

    log::debug!("run {run_id} finished after {turns} turns");
    session
}

/// The turn loop proper. Returns the terminal outcome; counters are shared
/// with the caller so the Result event reflects partial progress on any
/// exit path.
async fn drive(
    ctx: &RunContext,
    session: &mut Session,
    sink: &mut ChannelSink,
    turns: &mut u32,
    usage: &mut TokenUsage,
    cost: &mut Decimal,
) -> Outcome {
    let hooks = &ctx.options.hooks;

    // A freshly submitted prompt passes through the UserPromptSubmit hook;
    // a block here ends the run before any model call.
    if let Some(prompt) = latest_user_prompt(session) {
        let input = HookInput::new(&session.id, HookEvent::UserPromptSubmit).with_prompt(prompt);
        match hooks
            .dispatch(HookEvent::UserPromptSubmit, None, &input)
            .await
        {
            Ok(Some(output)) if output.block => {
                let reason = output.reason.unwrap_or_else(|| "blocked by hook".to_string());
                return Outcome::error(
                    RESULT_ERROR_DURING_EXECUTION,
                    format!("prompt blocked: {reason}"),
                );
            }
            Err(e) => log::warn!("UserPromptSubmit hook failed: {e}"),
            _ => {}
        }
    }

    loop {
        // Cancellation checkpoint.
        if ctx.cancel.is_cancelled() {
            return Outcome::error(RESULT_ERROR_DURING_EXECUTION, Error::Cancelled.to_string());
        }

        // Request assembly.
        let params = build_params(ctx, session);

        fire_logged(
            hooks,
            HookEvent::PreApiRequest,
            None,
            &HookInput::new(&session.id, HookEvent::PreApiRequest).with_api_call(
                params.model.clone(),
                None,
                None,
            ),
        )
        .await;

        // Stream drain, with the single fallback-model retry.
        let (response, model_used) = match drain_with_fallback(ctx, sink, &params).await {
            Ok(pair) => pair,
            Err(message) => return Outcome::error(RESULT_ERROR_DURING_EXECUTION, message),
        };

        // Usage update.
        usage.add(&response.usage);
        session.metadata.total_tokens.add(&response.usage);

        fire_logged(
            hooks,
            HookEvent::PostApiRequest,
            None,
            &HookInput::new(&session.id, HookEvent::PostApiRequest).with_api_call(
                model_used.clone(),
                Some(response.usage.total_input()),
                Some(response.usage.output_tokens),
            ),
        )
        .await;

        // Budget update.
        let call_cost = ctx.tracker.record(&model_used, &response.usage);
        *cost += call_cost;
        session.metadata.total_cost += call_cost;

        // Append the response. On budget exhaustion the assistant message
        // the caller just paid for is still delivered before termination.
        let message = response.to_message();
        sink.on_assistant(&message).await;
        session.push(message.clone());

        let stop_reason = response.stop_reason.clone().unwrap_or_default();

        // Compaction cycles do not count against the turn limit.
        if stop_reason != "compaction" {
            *turns += 1;
            session.metadata.num_turns += 1;
        }

        if ctx.tracker.exhausted() {
            return Outcome::error(
                RESULT_ERROR_MAX_BUDGET_USD,
                format!(
                    "budget exhausted: cost {} >= max {}",
                    ctx.tracker.total_cost(),
                    ctx.tracker.max_budget()
                ),
            );
        }

        match stop_reason.as_str() {
            "max_tokens" => {
                fire_stop(ctx, session).await;
                return Outcome::error(RESULT_ERROR_MAX_TURNS, "max_tokens reached");
            }
            "compaction" => {
                // The API already rewrote history server-side; emit the
                // marker and keep looping.
                fire_logged(
                    hooks,
                    HookEvent::PreCompact,
                    None,
                    &HookInput::new(&session.id, HookEvent::PreCompact),
                )
                .await;
                sink.on_compact().await;
                fire_logged(
                    hooks,
                    HookEvent::PostCompact,
                    None,
                    &HookInput::new(&session.id, HookEvent::PostCompact),
                )
                .await;
                continue;
            }
            "tool_use" => {
                // The hidden structured-output tool is the exit signal.
                if let Some(schema) = &ctx.options.output_schema {
                    if message.tool_uses().iter().any(|t| t.name == schema.name) {
                        fire_stop(ctx, session).await;
                        return Outcome::success();
                    }
                }
                run_tool_pipeline(ctx, session, &message).await;
            }
            // end_turn, and defensively anything unrecognized, terminate
            // the run as a success.
            _ => {
                fire_stop(ctx, session).await;
                return Outcome::success();
            }
        }

        // Turn limit.
        if ctx.options.max_turns() > 0 && *turns >= ctx.options.max_turns() {
            fire_stop(ctx, session).await;
            return Outcome::error(RESULT_ERROR_MAX_TURNS, "max turns reached");
        }
    }
}

async fn fire_stop(ctx: &RunContext, session: &Session) {
    fire_logged(
        &ctx.options.hooks,
        HookEvent::Stop,
        None,
        &HookInput::new(&session.id, HookEvent::Stop),
    )
    .await;
}

/// Text of the trailing user message, if the session ends on one.
fn latest_user_prompt(session: &Session) -> Option<String> {
    let message = session.messages.last()?;
    match message.role {
        crate::types::MessageRole::User => {
            let text = message.text();
            (!text.is_empty()).then_some(text)
        }
        _ => None,
    }
}

/// Builds request parameters for the current turn.
fn build_params(ctx: &RunContext, session: &Session) -> RequestParams {
    let options = &ctx.options;

    let mut max_tokens = options.max_tokens();
    let thinking = options.thinking_budget.map(|budget| {
        // Thinking consumes output tokens; keep a floor above the budget.
        max_tokens = max_tokens.max(budget.saturating_add(THINKING_MAX_TOKENS_MARGIN));
        ThinkingConfig::Enabled {
            budget_tokens: budget,
        }
    });

    let mut tools = ctx.registry.list_for_api();
    let mut tool_choice = None;
    if let Some(schema) = &options.output_schema {
        tools.push(ToolDefinition {
            name: schema.name.clone(),
            description: "Return the final result in the required structure.".to_string(),
            input_schema: schema.schema.clone(),
        });
        tool_choice = Some(ToolChoice::Tool {
            name: schema.name.clone(),
        });
    }
    // An empty tool list is omitted, never sent as [].
    let tools = (!tools.is_empty()).then_some(tools);

    let system = (!options.system_prompt.is_empty()).then(|| {
        vec![SystemBlock::Text {
            text: options.system_prompt.clone(),
        }]
    });

    let mut betas = options.betas.clone();
    let context_management = options.compaction.as_ref().map(|config| {
        betas.push(crate::config::COMPACTION_BETA.to_string());
        ContextManagement {
            edits: vec![ContextEdit::Compact {
                trigger_input_tokens: config.trigger_tokens,
                pause_after: config.pause_after,
                preserve_instructions: config.preserve_instructions.clone(),
            }],
        }
    });

    RequestParams {
        model: options.model().to_string(),
        max_tokens,
        messages: session.messages.clone(),
        system,
        tools,
        tool_choice,
        thinking,
        context_management,
        stream: true,
        betas,
    }
}

/// Drains one streaming request; on a retryable terminal error, retries
/// once with the fallback model substituted and a fresh accumulator.
///
/// Returns the accumulated response and the model that served it, or the
/// fatal error message for the Result event.
async fn drain_with_fallback(
    ctx: &RunContext,
    sink: &mut ChannelSink,
    params: &RequestParams,
) -> std::result::Result<(StreamedResponse, String), String> {
    match drain_once(ctx, sink, params).await {
        Ok(response) => Ok((response, params.model.clone())),
        Err(Error::Cancelled) => Err(Error::Cancelled.to_string()),
        Err(primary_err) => {
            let message = primary_err.to_string();
            let fallback = ctx.options.fallback_model();
            let retryable = is_retryable_stream_error(&message)
                && fallback.is_some_and(|f| f != params.model);
            if !retryable {
                return Err(message);
            }

            let fallback = fallback.expect("checked above").to_string();
            log::warn!(
                "stream error on {}; retrying once with fallback {fallback}: {message}",
                params.model
            );
            let mut retry_params = params.clone();
            retry_params.model = fallback.clone();

            match drain_once(ctx, sink, &retry_params).await {
                Ok(response) => Ok((response, fallback)),
                Err(fallback_err) => Err(format!("fallback stream error: {fallback_err}")),
            }
        }
    }
}

/// One streaming attempt: accumulate events, surface text deltas, observe
/// cancellation between frames.
async fn drain_once(
    ctx: &RunContext,
    sink: &mut ChannelSink,
    params: &RequestParams,
) -> Result<StreamedResponse> {
    let mut accumulator = crate::stream::ResponseAccumulator::new();
    let mut stream = ctx.streamer.stream(params).await?;

    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(Error::Cancelled),
            item = stream.next() => match item {
                Some(Ok(event)) => {
                    if let Some(delta) = accumulator.push(event)? {
                        sink.on_stream(&delta).await;
                    }
                }
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }
    }

    accumulator.finish()
}

// ============================================================================
// TOOL PIPELINE
// ============================================================================

/// Runs the tool pipeline over every tool_use block of a response, in
/// order, then appends one user message carrying all results.
async fn run_tool_pipeline(ctx: &RunContext, session: &mut Session, message: &Message) {
    let hooks = &ctx.options.hooks;
    let mut results: Vec<ContentBlock> = Vec::new();

    for block in message.tool_uses() {
        // Cancellation cuts the pipeline short; the loop's next checkpoint
        // produces the terminal Result.
        if ctx.cancel.is_cancelled() {
            break;
        }

        let result = process_tool_block(ctx, session, block).await;

        // ToolResult fires for every appended result block, synthetic ones
        // included.
        let mut input = HookInput::new(&session.id, HookEvent::ToolResult)
            .with_tool(&block.name, block.input.clone())
            .with_tool_output(result.content.clone());
        if result.is_error {
            input = input.with_tool_error(result.content.clone());
        }
        fire_logged(hooks, HookEvent::ToolResult, Some(&block.name), &input).await;

        results.push(ContentBlock::ToolResult(result));
    }

    if !results.is_empty() {
        session.push(Message::user_with_blocks(results));
    }
}

/// PreToolUse → Permission → [PermissionRequest] → Execute →
/// PostToolUse/PostToolUseFailure for one tool_use block. Tool-scoped
/// failures never abort the run; they come back as error-flagged results.
async fn process_tool_block(
    ctx: &RunContext,
    session: &Session,
    block: &ToolUseBlock,
) -> ToolResultBlock {
    let hooks = &ctx.options.hooks;
    let mut input = block.input.clone();

    // PreToolUse: may block or rewrite the input.
    let pre = HookInput::new(&session.id, HookEvent::PreToolUse)
        .with_tool(&block.name, input.clone());
    match hooks
        .dispatch(HookEvent::PreToolUse, Some(&block.name), &pre)
        .await
    {
        Err(e) => return ToolResultBlock::error(&block.id, format!("hook error: {e}")),
        Ok(Some(output)) => {
            if output.block {
                let reason = output
                    .reason
                    .unwrap_or_else(|| "blocked by hook".to_string());
                return ToolResultBlock::error(&block.id, format!("tool blocked: {reason}"));
            }
            if let Some(updated) = output.updated_input {
                input = updated;
            }
        }
        Ok(None) => {}
    }

    // Permission check. An unconfigured policy allows everything.
    let decision = match &ctx.options.permissions {
        None => Ok(PermissionDecision::Allow),
        Some(policy) => policy.check(&block.name, &input).await,
    };
    match decision {
        Err(e) => {
            return ToolResultBlock::error(&block.id, format!("permission check failed: {e}"));
        }
        Ok(PermissionDecision::Deny) => {
            return ToolResultBlock::error(&block.id, "tool execution denied by permission policy");
        }
        Ok(PermissionDecision::Ask) => {
            // Ask resolves through the PermissionRequest hook; with no
            // matcher configured, or a blocking one, the tool is denied.
            if hooks.has_matchers(HookEvent::PermissionRequest) {
                let request = HookInput::new(&session.id, HookEvent::PermissionRequest)
                    .with_tool(&block.name, input.clone());
                match hooks
                    .dispatch(HookEvent::PermissionRequest, Some(&block.name), &request)
                    .await
                {
                    Err(e) => {
                        return ToolResultBlock::error(&block.id, format!("hook error: {e}"));
                    }
                    Ok(Some(output)) if output.block => {
                        return ToolResultBlock::error(
                            &block.id,
                            "tool execution denied by permission policy",
                        );
                    }
                    _ => {}
                }
            } else {
                return ToolResultBlock::error(
                    &block.id,
                    "tool execution denied by permission policy",
                );
            }
        }
        Ok(PermissionDecision::Allow) => {}
    }

    // Execute. The handler receives the run's cancellation signal through
    // its context, and the await itself is raced against the same signal so
    // even a tool that ignores its context is abandoned promptly on
    // interrupt.
    let tool_context = ToolContext::new(ctx.cancel.clone());
    let execution = ctx.registry.execute(&block.name, input.clone(), tool_context);
    let outcome = tokio::select! {
        _ = ctx.cancel.cancelled() => {
            return ToolResultBlock::error(&block.id, Error::Cancelled.to_string());
        }
        outcome = execution => outcome,
    };
    match outcome {
        Err(e) => {
            // Could not run: registry-level failure becomes a synthetic
            // error result after the failure hook observes it.
            let failure = HookInput::new(&session.id, HookEvent::PostToolUseFailure)
                .with_tool(&block.name, input)
                .with_tool_error(e.to_string());
            fire_logged(
                hooks,
                HookEvent::PostToolUseFailure,
                Some(&block.name),
                &failure,
            )
            .await;
            ToolResultBlock::error(&block.id, e.to_string())
        }
        Ok(output) => {
            let (event, hook_input) = if output.is_error {
                (
                    HookEvent::PostToolUseFailure,
                    HookInput::new(&session.id, HookEvent::PostToolUseFailure)
                        .with_tool(&block.name, input)
                        .with_tool_error(output.content.clone()),
                )
            } else {
                (
                    HookEvent::PostToolUse,
                    HookInput::new(&session.id, HookEvent::PostToolUse)
                        .with_tool(&block.name, input)
                        .with_tool_output(output.content.clone()),
                )
            };
            fire_logged(hooks, event, Some(&block.name), &hook_input).await;

            ToolResultBlock {
                tool_use_id: block.id.clone(),
                content: output.content,
                is_error: output.is_error,
                metadata: output.metadata,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{StreamEvent, StreamEventStream};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted streamer: each call pops the next response script.
    struct ScriptedStreamer {
        scripts: Mutex<Vec<Vec<Result<StreamEvent>>>>,
        requests: Mutex<Vec<RequestParams>>,
    }

    impl ScriptedStreamer {
        fn new(scripts: Vec<Vec<Result<StreamEvent>>>) -> Self {
            Self {
                scripts: Mutex::new(scripts),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Streamer for ScriptedStreamer {
        async fn stream(&self, params: &RequestParams) -> Result<StreamEventStream> {
            self.requests.lock().unwrap().push(params.clone());
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                return Err(Error::stream("script exhausted"));
            }
            let script = scripts.remove(0);
            Ok(Box::pin(futures::stream::iter(script)))
        }
    }

    fn text_script(text: &str, stop_reason: &str) -> Vec<Result<StreamEvent>> {
        use crate::stream::*;
        vec![
            Ok(StreamEvent::MessageStart {
                message: StartedMessage {
                    usage: WireUsage {
                        input_tokens: 10,
                        ..Default::default()
                    },
                },
            }),
            Ok(StreamEvent::ContentBlockStart {
                index: 0,
                content_block: StartedBlock::Text {
                    text: String::new(),
                },
            }),
            Ok(StreamEvent::ContentBlockDelta {
                index: 0,
                delta: BlockDelta::TextDelta {
                    text: text.to_string(),
                },
            }),
            Ok(StreamEvent::ContentBlockStop { index: 0 }),
            Ok(StreamEvent::MessageDelta {
                delta: MessageDeltaBody {
                    stop_reason: Some(stop_reason.to_string()),
                },
                usage: WireUsage {
                    output_tokens: 5,
                    ..Default::default()
                },
            }),
            Ok(StreamEvent::MessageStop),
        ]
    }

    fn options_with(streamer: Arc<dyn Streamer>) -> AgentOptions {
        AgentOptions::builder()
            .model("claude-opus-4-6")
            .streamer(streamer)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_run_emits_system_first_result_last() {
        let streamer = Arc::new(ScriptedStreamer::new(vec![text_script(
            "Hello", "end_turn",
        )]));
        let agent = Agent::new(options_with(streamer)).unwrap();
        let run = agent.run(Session::new("claude-opus-4-6"), "Hi");
        let events = run.into_events().collect_all().await;

        assert!(matches!(events.first(), Some(Event::System { .. })));
        assert!(matches!(events.last(), Some(Event::Result(_))));
        let systems = events
            .iter()
            .filter(|e| matches!(e, Event::System { .. }))
            .count();
        let results = events.iter().filter_map(|e| e.as_result()).count();
        assert_eq!(systems, 1);
        assert_eq!(results, 1);
    }

    #[tokio::test]
    async fn test_empty_tool_list_is_omitted_and_choice_unforced() {
        let streamer = Arc::new(ScriptedStreamer::new(vec![text_script(
            "ok", "end_turn",
        )]));
        let agent = Agent::new(options_with(Arc::clone(&streamer) as Arc<dyn Streamer>)).unwrap();
        let run = agent.run(Session::new("claude-opus-4-6"), "Hi");
        let _ = run.into_session().await.unwrap();

        let requests = streamer.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].tools.is_none());
        assert!(requests[0].tool_choice.is_none());
    }

    #[tokio::test]
    async fn test_thinking_budget_raises_max_tokens_floor() {
        let streamer = Arc::new(ScriptedStreamer::new(vec![text_script(
            "ok", "end_turn",
        )]));
        let options = AgentOptions::builder()
            .model("claude-opus-4-6")
            .max_tokens(1024)
            .thinking_budget(8192)
            .streamer(Arc::clone(&streamer) as Arc<dyn Streamer>)
            .build()
            .unwrap();
        let agent = Agent::new(options).unwrap();
        let _ = agent
            .run(Session::new("claude-opus-4-6"), "Hi")
            .into_session()
            .await
            .unwrap();

        let requests = streamer.requests.lock().unwrap();
        assert_eq!(requests[0].max_tokens, 8192 + THINKING_MAX_TOKENS_MARGIN);
        assert!(requests[0].thinking.is_some());
    }

    #[tokio::test]
    async fn test_unknown_stop_reason_is_success() {
        let streamer = Arc::new(ScriptedStreamer::new(vec![text_script(
            "ok",
            "pause_turn",
        )]));
        let agent = Agent::new(options_with(streamer)).unwrap();
        let events = agent
            .run(Session::new("claude-opus-4-6"), "Hi")
            .into_events()
            .collect_all()
            .await;
        let result = events.last().unwrap().as_result().unwrap();
        assert_eq!(result.subtype, RESULT_SUCCESS);
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn test_interrupt_is_idempotent() {
        let streamer = Arc::new(ScriptedStreamer::new(vec![text_script(
            "ok", "end_turn",
        )]));
        let agent = Agent::new(options_with(streamer)).unwrap();
        let run = agent.run(Session::new("claude-opus-4-6"), "Hi");
        run.interrupt();
        run.interrupt();
        let events = run.into_events().collect_all().await;
        let result = events.last().unwrap().as_result().unwrap();
        assert_eq!(result.subtype, RESULT_ERROR_DURING_EXECUTION);
        assert!(result.errors[0].contains("cancelled"));
    }
}
