//! The typed event stream a run emits to its consumer.
//!
//! Every run emits exactly one [`Event::System`] first and exactly one
//! [`Event::Result`] last; between them come incremental [`Event::Stream`]
//! text deltas, complete [`Event::Assistant`] messages, and
//! [`Event::Compact`] markers for server-side compaction cycles.
//!
//! The run loop does not hold the consumer end directly — it writes through
//! the [`EventSink`] trait, and the bounded-channel sink adapts that to the
//! public [`EventStream`]. The channel is small (capacity
//! [`EVENT_CHANNEL_CAPACITY`]); a producer blocks on a full sink, so
//! consumers must drain.

use crate::types::{Message, TokenUsage};
use async_trait::async_trait;
use futures::Stream;
use rust_decimal::Decimal;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Result subtype: the run completed normally.
pub const RESULT_SUCCESS: &str = "success";
/// Result subtype: the turn limit was reached, or the model hit its output
/// token cap.
pub const RESULT_ERROR_MAX_TURNS: &str = "error_max_turns";
/// Result subtype: the budget ceiling was reached.
pub const RESULT_ERROR_MAX_BUDGET_USD: &str = "error_max_budget_usd";
/// Result subtype: a fatal error (cancellation, stream failure) ended the
/// run.
pub const RESULT_ERROR_DURING_EXECUTION: &str = "error_during_execution";

/// Default bound of the event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 8;

/// Terminal summary of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    /// One of the `RESULT_*` subtype tokens.
    pub subtype: String,
    /// Wall-clock duration of the run in milliseconds.
    pub duration_ms: u64,
    /// Turns consumed.
    pub num_turns: u32,
    /// Cumulative cost in USD.
    pub total_cost_usd: Decimal,
    /// Cumulative token usage.
    pub usage: TokenUsage,
    /// Whether the run ended on an error subtype.
    pub is_error: bool,
    /// Error messages, most significant first.
    pub errors: Vec<String>,
}

/// Events emitted by a run, in causal order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Run start. Always first.
    System {
        /// Session the run operates on.
        session_id: String,
        /// Model in use.
        model: String,
    },
    /// Incremental text delta from the current model response.
    Stream {
        /// The delta substring.
        text: String,
    },
    /// A complete model message, emitted before its tool results enter the
    /// history.
    Assistant {
        /// The accumulated assistant message.
        message: Message,
    },
    /// A server-side compaction cycle occurred; the loop continues.
    Compact,
    /// Run end. Always last.
    Result(RunResult),
}

impl Event {
    /// The terminal result, if this is the Result event.
    pub fn as_result(&self) -> Option<&RunResult> {
        match self {
            Event::Result(result) => Some(result),
            _ => None,
        }
    }
}

/// Where the run loop writes its events.
///
/// The loop depends on this trait rather than the public event union so the
/// emission points read by role; the channel sink is the production
/// adapter, and tests can record calls directly.
#[async_trait]
pub trait EventSink: Send {
    /// Run start.
    async fn on_system(&mut self, session_id: &str, model: &str);
    /// Incremental text delta.
    async fn on_stream(&mut self, text: &str);
    /// Complete assistant message.
    async fn on_assistant(&mut self, message: &Message);
    /// Compaction cycle marker.
    async fn on_compact(&mut self);
    /// Run end.
    async fn on_result(&mut self, result: RunResult);
}

/// Bounded-channel sink; the write side of an [`EventStream`].
pub(crate) struct ChannelSink {
    tx: mpsc::Sender<Event>,
}

impl ChannelSink {
    async fn emit(&mut self, event: Event) {
        // A dropped receiver just means nobody is listening anymore; the
        // run still finishes and the session is still returned.
        let _ = self.tx.send(event).await;
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn on_system(&mut self, session_id: &str, model: &str) {
        self.emit(Event::System {
            session_id: session_id.to_string(),
            model: model.to_string(),
        })
        .await;
    }

    async fn on_stream(&mut self, text: &str) {
        self.emit(Event::Stream {
            text: text.to_string(),
        })
        .await;
    }

    async fn on_assistant(&mut self, message: &Message) {
        self.emit(Event::Assistant {
            message: message.clone(),
        })
        .await;
    }

    async fn on_compact(&mut self) {
        self.emit(Event::Compact).await;
    }

    async fn on_result(&mut self, result: RunResult) {
        self.emit(Event::Result(result)).await;
    }
}

/// Consumer side of a run's event sequence.
///
/// Yields events in emission order and ends (returns `None`) when the run
/// terminates and the sink closes.
pub struct EventStream {
    inner: ReceiverStream<Event>,
}

impl EventStream {
    /// Receives the next event, or `None` once the run has terminated.
    pub async fn next(&mut self) -> Option<Event> {
        futures::StreamExt::next(&mut self.inner).await
    }

    /// Drains every remaining event into a vector.
    pub async fn collect_all(mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Creates a bounded sink/stream pair.
pub(crate) fn event_channel(capacity: usize) -> (ChannelSink, EventStream) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        ChannelSink { tx },
        EventStream {
            inner: ReceiverStream::new(rx),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_preserves_order() {
        let (mut sink, mut stream) = event_channel(EVENT_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            sink.on_system("sess_1", "claude-opus-4-6").await;
            sink.on_stream("Hel").await;
            sink.on_stream("lo").await;
            sink.on_result(RunResult {
                subtype: RESULT_SUCCESS.to_string(),
                duration_ms: 1,
                num_turns: 1,
                total_cost_usd: Decimal::ZERO,
                usage: TokenUsage::default(),
                is_error: false,
                errors: vec![],
            })
            .await;
        });

        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event);
        }

        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], Event::System { .. }));
        assert!(matches!(events[1], Event::Stream { ref text } if text == "Hel"));
        assert!(matches!(events[2], Event::Stream { ref text } if text == "lo"));
        assert_eq!(
            events[3].as_result().unwrap().subtype,
            RESULT_SUCCESS
        );
    }

    #[tokio::test]
    async fn test_dropped_receiver_does_not_panic() {
        let (mut sink, stream) = event_channel(1);
        drop(stream);
        sink.on_system("sess_1", "claude-opus-4-6").await;
        sink.on_compact().await;
    }

    #[tokio::test]
    async fn test_stream_trait_impl() {
        use futures::StreamExt;

        let (mut sink, stream) = event_channel(4);
        tokio::spawn(async move {
            sink.on_compact().await;
        });

        let events: Vec<Event> = stream.collect().await;
        assert_eq!(events, vec![Event::Compact]);
    }
}
