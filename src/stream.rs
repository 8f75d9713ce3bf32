//! Streaming contract: request parameters, server-sent events, and the
//! accumulator that folds a stream into a complete response.
//!
//! The run loop never talks HTTP directly. It builds a [`RequestParams`],
//! hands it to a [`Streamer`], and drains the returned event sequence
//! through a [`ResponseAccumulator`]. The default streamer lives in
//! [`http`](crate::http); tests substitute scripted ones.
//!
//! # Event flow
//!
//! ```text
//! Streamer::stream(params)
//!     │
//!     ▼
//! Stream<Result<StreamEvent>>        message_start, content_block_*,
//!     │                              message_delta, message_stop
//!     │ ResponseAccumulator::push()
//!     ▼
//! StreamedResponse                   ordered blocks + usage + stop_reason
//! ```
//!
//! Tool-use input arrives as partial JSON fragments split at arbitrary byte
//! positions; the accumulator buffers the raw string per block index and
//! parses it only when the block closes.

use crate::types::{ContentBlock, Message, TextBlock, ThinkingBlock, TokenUsage, ToolUseBlock};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::pin::Pin;

// ============================================================================
// REQUEST PARAMETERS
// ============================================================================

/// System prompt block. The API accepts the system prompt as an array of
/// typed text blocks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemBlock {
    /// A text segment of the system prompt.
    Text {
        /// The prompt text.
        text: String,
    },
}

/// Wire-format tool definition presented to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human description the model uses to decide when to call the tool.
    pub description: String,
    /// JSON Schema for the tool input.
    pub input_schema: serde_json::Value,
}

/// Tool-choice directive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    /// The model decides whether to call tools.
    Auto,
    /// The model must call at least one tool.
    Any,
    /// The model must call the named tool.
    Tool {
        /// Name of the forced tool.
        name: String,
    },
}

/// Extended-thinking configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThinkingConfig {
    /// Thinking enabled with a token budget.
    Enabled {
        /// Tokens the model may spend reasoning before answering.
        budget_tokens: u32,
    },
}

/// Context-management edit directives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ContextEdit {
    /// Server-side compaction of earlier conversation history.
    #[serde(rename = "compact_20260112")]
    Compact {
        /// Input-token count that triggers compaction; server default when
        /// omitted.
        #[serde(skip_serializing_if = "Option::is_none")]
        trigger_input_tokens: Option<u64>,
        /// Whether the server pauses the turn after compacting.
        #[serde(skip_serializing_if = "std::ops::Not::not", default)]
        pause_after: bool,
        /// Instructions preserved verbatim through compaction.
        #[serde(skip_serializing_if = "Option::is_none")]
        preserve_instructions: Option<String>,
    },
}

/// Context-management envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextManagement {
    /// Edits the server applies to the conversation.
    pub edits: Vec<ContextEdit>,
}

/// Parameters for one streaming model request.
///
/// Optional fields serialize only when present — in particular an empty tool
/// list is omitted entirely rather than sent as `[]`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RequestParams {
    /// Model identifier.
    pub model: String,
    /// Maximum output tokens for this response.
    pub max_tokens: u32,
    /// Full conversation history.
    pub messages: Vec<Message>,
    /// Optional system prompt blocks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<Vec<SystemBlock>>,
    /// Tools offered to the model, in registration order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    /// Tool-choice directive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Extended-thinking configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
    /// Context-management directives.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_management: Option<ContextManagement>,
    /// Always true; the engine only consumes streaming responses.
    pub stream: bool,
    /// Beta flags for the `anthropic-beta` header. Not part of the JSON
    /// body.
    #[serde(skip)]
    pub betas: Vec<String>,
}

// ============================================================================
// STREAM EVENTS
// ============================================================================

/// Token usage as it appears on the wire (snake_case, all fields optional).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireUsage {
    /// Non-cached input tokens.
    #[serde(default)]
    pub input_tokens: u64,
    /// Output tokens.
    #[serde(default)]
    pub output_tokens: u64,
    /// Input tokens served from the prompt cache.
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    /// Input tokens written to the prompt cache.
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
}

impl WireUsage {
    /// Converts to the domain [`TokenUsage`] counters.
    pub fn to_usage(self) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            cache_read_input_tokens: self.cache_read_input_tokens,
            cache_creation_input_tokens: self.cache_creation_input_tokens,
        }
    }
}

/// Opening payload of a `message_start` event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StartedMessage {
    /// Initial usage; carries the input-token count.
    #[serde(default)]
    pub usage: WireUsage,
}

/// Newly opened content block in a `content_block_start` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StartedBlock {
    /// A text block, possibly with an initial fragment.
    Text {
        /// Initial text, usually empty.
        #[serde(default)]
        text: String,
    },
    /// A tool-use block; input JSON arrives in later deltas.
    ToolUse {
        /// Tool call id.
        id: String,
        /// Tool name.
        name: String,
    },
    /// A thinking block.
    Thinking {
        /// Initial reasoning text, usually empty.
        #[serde(default)]
        thinking: String,
    },
}

/// Incremental update in a `content_block_delta` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    /// Text appended to a text block.
    TextDelta {
        /// The delta substring.
        text: String,
    },
    /// Partial JSON appended to a tool-use block's input.
    InputJsonDelta {
        /// Raw JSON fragment, split at arbitrary byte positions.
        partial_json: String,
    },
    /// Reasoning appended to a thinking block.
    ThinkingDelta {
        /// The delta substring.
        thinking: String,
    },
    /// Integrity token for a thinking block.
    SignatureDelta {
        /// The signature fragment.
        signature: String,
    },
}

/// Terminal metadata in a `message_delta` event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageDeltaBody {
    /// Why the model stopped. Case-sensitive token such as `end_turn`,
    /// `tool_use`, `max_tokens` or `compaction`.
    #[serde(default)]
    pub stop_reason: Option<String>,
}

/// Error payload of an `error` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiErrorBody {
    /// Error type token (e.g. `overloaded_error`).
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

/// One server-sent event of a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Opens a response; carries initial usage.
    MessageStart {
        /// Opening message payload.
        message: StartedMessage,
    },
    /// Opens a content block at `index`.
    ContentBlockStart {
        /// Block position in the response.
        index: usize,
        /// The opened block.
        content_block: StartedBlock,
    },
    /// Appends to the block at `index`.
    ContentBlockDelta {
        /// Block position in the response.
        index: usize,
        /// The increment.
        delta: BlockDelta,
    },
    /// Closes the block at `index`.
    ContentBlockStop {
        /// Block position in the response.
        index: usize,
    },
    /// Carries the terminal stop reason and final output-token count.
    MessageDelta {
        /// Terminal metadata.
        delta: MessageDeltaBody,
        /// Final usage; carries the output-token count.
        #[serde(default)]
        usage: WireUsage,
    },
    /// Closes the response.
    MessageStop,
    /// Keep-alive; ignored.
    Ping,
    /// Terminal error; the sequence ends after this event.
    Error {
        /// The error payload.
        error: ApiErrorBody,
    },
}

/// Lazy sequence of streaming events with a terminal error channel.
pub type StreamEventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Abstract model-call transport.
///
/// Implementations yield the event sequence of one streaming request. The
/// default HTTP implementation is [`AnthropicStreamer`](crate::http::AnthropicStreamer);
/// tests provide scripted streamers through
/// [`AgentOptionsBuilder::streamer`](crate::AgentOptionsBuilder::streamer).
#[async_trait]
pub trait Streamer: Send + Sync {
    /// Starts one streaming request.
    async fn stream(&self, params: &RequestParams) -> Result<StreamEventStream>;
}

// ============================================================================
// RESPONSE ACCUMULATION
// ============================================================================

/// A fully accumulated model response.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamedResponse {
    /// Ordered content blocks.
    pub content: Vec<ContentBlock>,
    /// Usage totals for this call.
    pub usage: TokenUsage,
    /// Terminal stop reason, when the stream carried one.
    pub stop_reason: Option<String>,
}

impl StreamedResponse {
    /// The response as an assistant [`Message`].
    pub fn to_message(&self) -> Message {
        Message::assistant(self.content.clone())
    }
}

/// In-progress content block, keyed by stream index.
#[derive(Debug)]
enum PartialBlock {
    Text(String),
    Thinking {
        thinking: String,
        signature: Option<String>,
    },
    /// Tool input accumulates as a raw JSON string and is parsed when the
    /// response completes; fragments may split mid-token.
    ToolUse {
        id: String,
        name: String,
        input_json: String,
    },
}

/// Stateful accumulator folding [`StreamEvent`]s into a
/// [`StreamedResponse`].
///
/// [`push`](ResponseAccumulator::push) returns the text delta (if the event
/// carried one) so the run loop can surface incremental text without
/// exposing tool-call streaming internals.
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    blocks: BTreeMap<usize, PartialBlock>,
    usage: TokenUsage,
    stop_reason: Option<String>,
}

impl ResponseAccumulator {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Processes one event.
    ///
    /// Returns `Ok(Some(text))` for text deltas, `Ok(None)` otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error for deltas addressing a block that was never opened,
    /// for mismatched delta kinds, and for terminal `error` events.
    pub fn push(&mut self, event: StreamEvent) -> Result<Option<String>> {
        match event {
            StreamEvent::MessageStart { message } => {
                self.usage.add(&message.usage.to_usage());
                Ok(None)
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                let partial = match content_block {
                    StartedBlock::Text { text } => PartialBlock::Text(text),
                    StartedBlock::Thinking { thinking } => PartialBlock::Thinking {
                        thinking,
                        signature: None,
                    },
                    StartedBlock::ToolUse { id, name } => PartialBlock::ToolUse {
                        id,
                        name,
                        input_json: String::new(),
                    },
                };
                self.blocks.insert(index, partial);
                Ok(None)
            }
            StreamEvent::ContentBlockDelta { index, delta } => {
                let partial = self.blocks.get_mut(&index).ok_or_else(|| {
                    Error::stream(format!("delta for unopened content block {index}"))
                })?;
                match (partial, delta) {
                    (PartialBlock::Text(buffer), BlockDelta::TextDelta { text }) => {
                        buffer.push_str(&text);
                        Ok(Some(text))
                    }
                    (
                        PartialBlock::ToolUse { input_json, .. },
                        BlockDelta::InputJsonDelta { partial_json },
                    ) => {
                        input_json.push_str(&partial_json);
                        Ok(None)
                    }
                    (
                        PartialBlock::Thinking { thinking, .. },
                        BlockDelta::ThinkingDelta { thinking: delta },
                    ) => {
                        thinking.push_str(&delta);
                        Ok(None)
                    }
                    (
                        PartialBlock::Thinking { signature, .. },
                        BlockDelta::SignatureDelta { signature: sig },
                    ) => {
                        *signature = Some(signature.take().unwrap_or_default() + &sig);
                        Ok(None)
                    }
                    _ => Err(Error::stream(format!(
                        "delta kind does not match content block {index}"
                    ))),
                }
            }
            StreamEvent::ContentBlockStop { .. } => Ok(None),
            StreamEvent::MessageDelta { delta, usage } => {
                if delta.stop_reason.is_some() {
                    self.stop_reason = delta.stop_reason;
                }
                self.usage.add(&usage.to_usage());
                Ok(None)
            }
            StreamEvent::MessageStop | StreamEvent::Ping => Ok(None),
            StreamEvent::Error { error } => Err(Error::api(format!(
                "{}: {}",
                error.kind, error.message
            ))),
        }
    }

    /// Finishes accumulation, parsing buffered tool inputs.
    ///
    /// # Errors
    ///
    /// Returns an error when a tool block's accumulated input is not valid
    /// JSON — corrupted streaming, fatal to the run.
    pub fn finish(self) -> Result<StreamedResponse> {
        let mut content = Vec::with_capacity(self.blocks.len());
        for (index, partial) in self.blocks {
            let block = match partial {
                PartialBlock::Text(text) => ContentBlock::Text(TextBlock::new(text)),
                PartialBlock::Thinking {
                    thinking,
                    signature,
                } => ContentBlock::Thinking(ThinkingBlock {
                    thinking,
                    signature,
                }),
                PartialBlock::ToolUse {
                    id,
                    name,
                    input_json,
                } => {
                    let input = if input_json.is_empty() {
                        serde_json::json!({})
                    } else {
                        serde_json::from_str(&input_json).map_err(|e| {
                            Error::stream(format!(
                                "failed to parse tool input for block {index}: {e}"
                            ))
                        })?
                    };
                    ContentBlock::ToolUse(ToolUseBlock::new(id, name, input))
                }
            };
            content.push(block);
        }
        Ok(StreamedResponse {
            content,
            usage: self.usage,
            stop_reason: self.stop_reason,
        })
    }
}
