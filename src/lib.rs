//! # Claude Agent SDK - Rust Implementation
//!
//! A streaming-first Rust SDK for building Claude agents: a bounded,
//! observable run loop that drives the model through tool use, lifecycle
//! hooks, permission policy, budget tracking and session history.
//!
//! ## Overview
//!
//! One call to [`Agent::run`] produces a run: a sequence of model requests
//! interleaved with tool execution that continues until the model signals
//! completion, a limit is hit (turns, budget, output tokens), or the caller
//! cancels. The run emits a typed [`Event`] stream — exactly one `System`
//! event first and one `Result` event last, with incremental `Stream` text,
//! complete `Assistant` messages and `Compact` markers in between.
//!
//! ## Key Features
//!
//! - **Streaming responses**: token-by-token text deltas from the messages API
//! - **Tool calling**: typed tools with schema generation, a concurrent
//!   registry, and a strict pre/permission/execute/post pipeline
//! - **Lifecycle hooks**: regex-matched callbacks at sixteen lifecycle points
//! - **Permission policy**: glob rules, user callbacks and mode defaults
//! - **Budgets**: decimal-exact cost tracking with cache and long-context
//!   pricing tiers
//! - **Sessions**: deep-copying persistence, in memory or one JSON file per
//!   session
//! - **Fallback model**: one retry per turn when the primary model is
//!   overloaded
//! - **Interrupts**: prompt cancellation from any task
//!
//! ## Two Interaction Modes
//!
//! ### 1. Simple Query Function (`query()`)
//!
//! For single-turn interactions without conversation state:
//!
//! ```rust,no_run
//! use claude_agent::{AgentOptions, Event, query};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = AgentOptions::builder()
//!         .model("claude-opus-4-6")
//!         .system_prompt("You are a helpful assistant")
//!         .build()?;
//!
//!     let mut events = query("What's the capital of France?", &options).await?;
//!     while let Some(event) = events.next().await {
//!         match event {
//!             Event::Stream { text } => print!("{text}"),
//!             Event::Result(result) => eprintln!("\n[{}]", result.subtype),
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### 2. Client Object (`Client`)
//!
//! For multi-turn conversations with persistent state:
//!
//! ```rust,no_run
//! use claude_agent::{AgentOptions, Client, Event};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = AgentOptions::builder()
//!         .model("claude-opus-4-6")
//!         .build()?;
//!     let mut client = Client::new(options)?;
//!
//!     client.send("What's 2+2?").await?;
//!     while let Some(event) = client.receive().await {
//!         if let Event::Stream { text } = event {
//!             print!("{text}");
//!         }
//!     }
//!
//!     client.send("And squared?").await?;
//!     while let Some(event) = client.receive().await {
//!         if let Event::Stream { text } = event {
//!             print!("{text}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **agent**: the run loop, tool pipeline, and `query()`
//! - **client**: stateful multi-turn client with interrupt support
//! - **types**: messages, content blocks, usage counters, agent options
//! - **stream**: request parameters, streaming events, response accumulation
//! - **http**: the default SSE transport
//! - **tools**: tool definitions and the registry
//! - **hooks**: lifecycle matchers and composed dispatch
//! - **permissions**: glob rules, callbacks, mode defaults
//! - **budget**: decimal pricing tiers and the shared tracker
//! - **session**: histories, identifiers, persistence stores
//! - **events**: the typed event union and stream

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

/// The agent, the run loop and the tool pipeline.
mod agent;

/// Stateful multi-turn client with interrupt support.
mod client;

/// Error types and conversions used across all public APIs.
mod error;

/// Core type definitions: messages, content blocks, usage, options.
mod types;

// ============================================================================
// PUBLIC MODULES
// ============================================================================

/// Cost accounting: pricing tables and the budget tracker.
pub mod budget;

/// Credential and endpoint resolution.
pub mod config;

/// The typed event union and consumer stream.
pub mod events;

/// Lifecycle hooks: events, matchers, composed dispatch.
pub mod hooks;

/// The default HTTP/SSE transport.
pub mod http;

/// Permission policy: modes, rules, callbacks.
pub mod permissions;

/// Retryable stream-error classification.
pub mod retry;

/// Sessions, identifiers, persistence stores.
pub mod session;

/// Streaming contract: request params, events, the `Streamer` trait.
pub mod stream;

/// Tool definitions and the registry.
pub mod tools;

// ============================================================================
// PUBLIC EXPORTS
// ============================================================================

// --- Core API ---

pub use agent::{Agent, Run, query};
pub use client::{Client, InterruptHandle};

// --- Error Handling ---

pub use error::{Error, Result};

// --- Events ---

pub use events::{Event, EventSink, EventStream, RunResult};

// --- Hooks ---

pub use hooks::{HookEvent, HookInput, HookMatcher, HookOutput, Hooks};

// --- Permissions ---

pub use permissions::{PermissionDecision, PermissionMode, PermissionRule, Permissions};

// --- Budget ---

pub use budget::{BudgetTracker, ModelPricing, PricingTable};

// --- Sessions ---

pub use session::{FileStore, MemoryStore, Session, SessionMetadata, SessionStore};

// --- Streaming ---

pub use stream::{RequestParams, StreamEvent, StreamedResponse, Streamer};

// --- Tool System ---

pub use tools::{Tool, ToolBuilder, ToolContext, ToolOutput, ToolRegistry, tool};

// --- Core Types ---

pub use types::{
    AgentOptions, AgentOptionsBuilder, CompactionConfig, ContentBlock, Message, MessageRole,
    OutputSchema, TextBlock, ThinkingBlock, TokenUsage, ToolResultBlock, ToolUseBlock,
};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// The most commonly used types and functions.
/// Import with `use claude_agent::prelude::*;`.
pub mod prelude {
    pub use crate::{
        Agent, AgentOptions, AgentOptionsBuilder, Client, ContentBlock, Error, Event, EventStream,
        HookEvent, HookInput, HookOutput, Hooks, Message, PermissionDecision, PermissionMode,
        Permissions, Result, RunResult, Session, Tool, ToolContext, ToolOutput, query, tool,
    };
}
