//! Shared test fixtures: a scripted streamer and response builders.

#![allow(dead_code)]

use async_trait::async_trait;
use claude_agent::stream::{
    BlockDelta, MessageDeltaBody, RequestParams, StartedBlock, StartedMessage, StreamEvent,
    StreamEventStream, Streamer, WireUsage,
};
use claude_agent::{Error, Result};
use std::sync::{Arc, Mutex};

/// One scripted model response: the event items of a single stream.
pub type Script = Vec<Result<StreamEvent>>;

/// A [`Streamer`] that replays scripts in order, one per request, and
/// records every request it served.
pub struct ScriptedStreamer {
    scripts: Mutex<Vec<Script>>,
    requests: Mutex<Vec<RequestParams>>,
}

impl ScriptedStreamer {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Requests observed so far.
    pub fn requests(&self) -> Vec<RequestParams> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Streamer for ScriptedStreamer {
    async fn stream(&self, params: &RequestParams) -> Result<StreamEventStream> {
        self.requests.lock().unwrap().push(params.clone());
        let mut scripts = self.scripts.lock().unwrap();
        if scripts.is_empty() {
            return Err(Error::stream("scripted streamer exhausted"));
        }
        Ok(Box::pin(futures::stream::iter(scripts.remove(0))))
    }
}

fn message_start(input_tokens: u64) -> StreamEvent {
    StreamEvent::MessageStart {
        message: StartedMessage {
            usage: WireUsage {
                input_tokens,
                ..Default::default()
            },
        },
    }
}

fn message_end(stop_reason: &str, output_tokens: u64) -> Vec<StreamEvent> {
    vec![
        StreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: Some(stop_reason.to_string()),
            },
            usage: WireUsage {
                output_tokens,
                ..Default::default()
            },
        },
        StreamEvent::MessageStop,
    ]
}

/// A plain text response streamed as the given deltas.
pub fn text_response(
    deltas: &[&str],
    stop_reason: &str,
    input_tokens: u64,
    output_tokens: u64,
) -> Script {
    let mut events = vec![
        message_start(input_tokens),
        StreamEvent::ContentBlockStart {
            index: 0,
            content_block: StartedBlock::Text {
                text: String::new(),
            },
        },
    ];
    for delta in deltas {
        events.push(StreamEvent::ContentBlockDelta {
            index: 0,
            delta: BlockDelta::TextDelta {
                text: delta.to_string(),
            },
        });
    }
    events.push(StreamEvent::ContentBlockStop { index: 0 });
    events.extend(message_end(stop_reason, output_tokens));
    events.into_iter().map(Ok).collect()
}

/// A response requesting one tool call, input streamed as partial JSON.
pub fn tool_use_response(id: &str, name: &str, input_json: &str) -> Script {
    let split = input_json.len() / 2;
    let events = vec![
        message_start(10),
        StreamEvent::ContentBlockStart {
            index: 0,
            content_block: StartedBlock::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
            },
        },
        StreamEvent::ContentBlockDelta {
            index: 0,
            delta: BlockDelta::InputJsonDelta {
                partial_json: input_json[..split].to_string(),
            },
        },
        StreamEvent::ContentBlockDelta {
            index: 0,
            delta: BlockDelta::InputJsonDelta {
                partial_json: input_json[split..].to_string(),
            },
        },
        StreamEvent::ContentBlockStop { index: 0 },
    ]
    .into_iter()
    .chain(message_end("tool_use", 8))
    .collect::<Vec<_>>();
    events.into_iter().map(Ok).collect()
}

/// A stream that fails terminally with the given error text.
pub fn failing_stream(message: &str) -> Script {
    vec![Err(Error::api(message.to_string()))]
}
