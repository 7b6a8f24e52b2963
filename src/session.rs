//! Conversation session controller.
//!
//! Owns the append-only message log and the single in-flight completion
//! request. Every accepted [`SessionController::submit`] appends exactly two
//! messages (the user's text, then either the reply or a fallback error entry)
//! and returns the request state to [`RequestState::Idle`] exactly once.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ContextPolicy;
use crate::error::{CompletionError, ErrorKind, SubmitError};
use crate::llm::{CompletionClient, LlmMessage};

/// Shown in place of any provider or transport failure.
pub const FALLBACK_REPLY: &str = "Sorry, there was an error processing your message.";

/// Shown when an in-flight request is cancelled.
pub const CANCELLED_REPLY: &str = "Request cancelled.";

/// Author of a logged message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
    SystemError,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "You",
            Role::Assistant => "Assistant",
            Role::SystemError => "Error",
        }
    }
}

/// A logged message. Fields are read-only once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    role: Role,
    content: String,
    sequence: u64,
    created_at: DateTime<Utc>,
}

impl Message {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Display only; ordering is by `sequence`.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Append-only message log
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    messages: Vec<Message>,
    next_sequence: u64,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn append(&mut self, role: Role, content: impl Into<String>) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.messages.push(Message {
            role,
            content: content.into(),
            sequence,
            created_at: Utc::now(),
        });
        sequence
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Provider context for the newest user message, per `policy`.
    /// Error entries are never part of the context.
    fn context(&self, policy: ContextPolicy) -> Vec<LlmMessage> {
        match policy {
            ContextPolicy::LatestOnly => self
                .messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| vec![LlmMessage::user(m.content.clone())])
                .unwrap_or_default(),
            ContextPolicy::FullHistory => self
                .messages
                .iter()
                .filter_map(|m| match m.role {
                    Role::User => Some(LlmMessage::user(m.content.clone())),
                    Role::Assistant => Some(LlmMessage::assistant(m.content.clone())),
                    Role::SystemError => None,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestState {
    #[default]
    Idle,
    Pending,
}

/// Read-only view handed to renderers
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub session_id: Uuid,
    pub messages: Vec<Message>,
    pub request_state: RequestState,
}

impl Snapshot {
    pub fn is_pending(&self) -> bool {
        self.request_state == RequestState::Pending
    }
}

/// Result of a `submit` call that was not rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Input was blank; nothing happened.
    Ignored,
    /// The assistant replied; carries the reply's sequence number.
    Answered { sequence: u64 },
    /// The request failed; a fallback entry was logged.
    Failed { kind: ErrorKind, sequence: u64 },
}

#[derive(Debug)]
struct SessionState {
    session_id: Uuid,
    log: ConversationLog,
    request: RequestState,
    in_flight: Option<CancellationToken>,
}

impl SessionState {
    fn fresh() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            log: ConversationLog::new(),
            request: RequestState::Idle,
            in_flight: None,
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            session_id: self.session_id,
            messages: self.log.messages().to_vec(),
            request_state: self.request,
        }
    }
}

/// Serializes submissions against a single outstanding completion request
pub struct SessionController {
    client: Arc<dyn CompletionClient>,
    policy: ContextPolicy,
    timeout: Option<Duration>,
    state: Mutex<SessionState>,
    snapshots: watch::Sender<Snapshot>,
}

impl SessionController {
    pub fn new(client: Arc<dyn CompletionClient>, policy: ContextPolicy) -> Self {
        let state = SessionState::fresh();
        let (snapshots, _) = watch::channel(state.snapshot());
        info!(session = %state.session_id, ?policy, "session started");

        Self {
            client,
            policy,
            timeout: None,
            state: Mutex::new(state),
            snapshots,
        }
    }

    /// Deadline applied to every completion request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().snapshot()
    }

    /// Receiver that observes a new snapshot after every mutation
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.subscribe()
    }

    /// Submit user text and wait for the request to settle.
    pub async fn submit(&self, text: &str) -> Result<SubmitOutcome, SubmitError> {
        if text.trim().is_empty() {
            return Ok(SubmitOutcome::Ignored);
        }

        let (context, token) = {
            let mut state = self.lock();
            if state.request == RequestState::Pending {
                debug!(session = %state.session_id, "submit rejected: request already pending");
                return Err(SubmitError::Busy);
            }

            let sequence = state.log.append(Role::User, text);
            state.request = RequestState::Pending;
            let token = CancellationToken::new();
            state.in_flight = Some(token.clone());
            let context = state.log.context(self.policy);
            debug!(
                session = %state.session_id,
                sequence,
                context = context.len(),
                "request pending"
            );
            self.publish(&state);
            (context, token)
        };

        let mut pending = PendingTurn {
            controller: self,
            settled: false,
        };
        let result = self.await_completion(&context, &token).await;
        Ok(pending.settle(result))
    }

    /// Cancel the in-flight request, if any. Returns whether one was pending.
    pub fn cancel(&self) -> bool {
        let state = self.lock();
        match &state.in_flight {
            Some(token) => {
                info!(session = %state.session_id, "cancelling in-flight request");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Discard the log and start a new session
    pub fn reset(&self) -> Result<(), SubmitError> {
        let mut state = self.lock();
        if state.request == RequestState::Pending {
            return Err(SubmitError::Busy);
        }
        let previous = state.session_id;
        *state = SessionState::fresh();
        info!(previous = %previous, session = %state.session_id, "session reset");
        self.publish(&state);
        Ok(())
    }

    async fn await_completion(
        &self,
        context: &[LlmMessage],
        token: &CancellationToken,
    ) -> Result<String, CompletionError> {
        let request = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, self.client.complete(context))
                    .await
                    .unwrap_or_else(|_| Err(CompletionError::Timeout(limit))),
                None => self.client.complete(context).await,
            }
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(CompletionError::Cancelled),
            result = request => result,
        }
    }

    fn finish(&self, result: Result<String, CompletionError>) -> SubmitOutcome {
        let mut state = self.lock();
        let outcome = match result {
            Ok(reply) => {
                let sequence = state.log.append(Role::Assistant, reply);
                debug!(session = %state.session_id, sequence, "assistant replied");
                SubmitOutcome::Answered { sequence }
            }
            Err(err) => {
                let kind = err.kind();
                let fallback = match kind {
                    ErrorKind::Cancelled => {
                        warn!(session = %state.session_id, "request cancelled");
                        CANCELLED_REPLY
                    }
                    _ => {
                        error!(
                            session = %state.session_id,
                            kind = %kind,
                            status = err.status(),
                            detail = %err,
                            body = err.body().unwrap_or_default(),
                            "completion request failed"
                        );
                        FALLBACK_REPLY
                    }
                };
                let sequence = state.log.append(Role::SystemError, fallback);
                SubmitOutcome::Failed { kind, sequence }
            }
        };
        state.request = RequestState::Idle;
        state.in_flight = None;
        self.publish(&state);
        outcome
    }

    fn publish(&self, state: &SessionState) {
        self.snapshots.send_replace(state.snapshot());
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Settles an accepted submit exactly once, even if the submit future is
/// dropped while the request is still in flight.
struct PendingTurn<'a> {
    controller: &'a SessionController,
    settled: bool,
}

impl PendingTurn<'_> {
    fn settle(&mut self, result: Result<String, CompletionError>) -> SubmitOutcome {
        self.settled = true;
        self.controller.finish(result)
    }
}

impl Drop for PendingTurn<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.controller.finish(Err(CompletionError::Cancelled));
        }
    }
}
