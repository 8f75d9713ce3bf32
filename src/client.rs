//! Stateful client for multi-turn conversations.
//!
//! [`Client`] owns a session between runs and hands it to the run loop for
//! the duration of each [`send`](Client::send). Events come back through
//! [`receive`](Client::receive); once the stream ends, the updated session
//! is reclaimed automatically, so a follow-up `send` continues the same
//! conversation.
//!
//! # Examples
//!
//! ```rust,no_run
//! use claude_agent::{AgentOptions, Client, Event};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = AgentOptions::builder()
//!         .model("claude-opus-4-6")
//!         .system_prompt("You are a helpful assistant")
//!         .build()?;
//!
//!     let mut client = Client::new(options)?;
//!
//!     client.send("What's 2+2?").await?;
//!     while let Some(event) = client.receive().await {
//!         if let Event::Stream { text } = event {
//!             print!("{text}");
//!         }
//!     }
//!
//!     // The client remembers the previous turns.
//!     client.send("Multiply that by 3.").await?;
//!     while let Some(event) = client.receive().await {
//!         if let Event::Stream { text } = event {
//!             print!("{text}");
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

use crate::agent::{Agent, Run};
use crate::events::Event;
use crate::session::Session;
use crate::types::{AgentOptions, Message};
use crate::{Error, Result};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Shared cancel handle for the active run.
///
/// [`InterruptHandle::interrupt`] is idempotent and safe from any task; it
/// is a no-op while no run is active.
#[derive(Clone, Default)]
pub struct InterruptHandle {
    cancel: Arc<Mutex<Option<CancellationToken>>>,
}

impl InterruptHandle {
    /// Cancels the active run, if any.
    pub fn interrupt(&self) {
        if let Some(token) = self
            .cancel
            .lock()
            .expect("interrupt handle lock poisoned")
            .as_ref()
        {
            token.cancel();
        }
    }

    fn arm(&self, token: CancellationToken) {
        *self.cancel.lock().expect("interrupt handle lock poisoned") = Some(token);
    }

    fn disarm(&self) {
        *self.cancel.lock().expect("interrupt handle lock poisoned") = None;
    }
}

/// Multi-turn conversation client.
pub struct Client {
    agent: Agent,
    session: Option<Session>,
    active: Option<Run>,
    interrupt: InterruptHandle,
}

impl Client {
    /// Creates a client with a fresh session.
    pub fn new(options: AgentOptions) -> Result<Self> {
        let model = options.model().to_string();
        Ok(Self {
            agent: Agent::new(options)?,
            session: Some(Session::new(model)),
            active: None,
            interrupt: InterruptHandle::default(),
        })
    }

    /// Creates a client resuming an existing session.
    pub fn with_session(options: AgentOptions, session: Session) -> Result<Self> {
        Ok(Self {
            agent: Agent::new(options)?,
            session: Some(session),
            active: None,
            interrupt: InterruptHandle::default(),
        })
    }

    /// Starts a run for a prompt.
    ///
    /// If a previous run is still active its remaining events are drained
    /// and the session reclaimed first.
    pub async fn send(&mut self, prompt: &str) -> Result<()> {
        if self.active.is_some() {
            self.finish_active().await?;
        }
        let session = self
            .session
            .take()
            .ok_or_else(|| Error::other("session lost by a previous failed run"))?;
        let run = self.agent.run(session, prompt);
        self.interrupt.arm(run.interrupt_token());
        self.active = Some(run);
        Ok(())
    }

    /// Receives the next event of the active run.
    ///
    /// Returns `None` when no run is active or the active run just
    /// finished; in the latter case the updated session has been reclaimed
    /// and the client is ready for the next [`send`](Client::send).
    pub async fn receive(&mut self) -> Option<Event> {
        let run = self.active.as_mut()?;
        match run.next().await {
            Some(event) => Some(event),
            None => {
                // Run finished: take the session back.
                if let Err(e) = self.finish_active().await {
                    log::warn!("failed to reclaim session: {e}");
                }
                None
            }
        }
    }

    /// Cancels the active run. Idempotent; a no-op when idle.
    pub fn interrupt(&self) {
        self.interrupt.interrupt();
    }

    /// A clonable handle that can interrupt the active run from another
    /// task.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// The session, when no run is active.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// The conversation history, empty while a run is active.
    pub fn history(&self) -> &[Message] {
        self.session
            .as_ref()
            .map(|s| s.messages.as_slice())
            .unwrap_or(&[])
    }

    /// Clears the conversation history, keeping the session identity.
    pub fn clear_history(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.messages.clear();
        }
    }

    /// The underlying agent.
    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    async fn finish_active(&mut self) -> Result<()> {
        if let Some(mut run) = self.active.take() {
            while run.next().await.is_some() {}
            self.interrupt.disarm();
            self.session = Some(run.into_session().await?);
        }
        Ok(())
    }
}
