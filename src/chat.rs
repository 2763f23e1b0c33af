//! The requirements chat session.
//!
//! A single task owns the transcript, the requirements snapshot and the
//! loading/confirmation flags. [`ChatHandle`] talks to it over a channel, so
//! every mutation is applied in order and overlapping sends follow an explicit
//! [`SendPolicy`] instead of racing.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::client::{ExtractionBackend, ExtractionRequest, TransportError};
use crate::extract::ExtractionResponse;
use crate::llm::{PromptMessage, Role};
use crate::requirements::{IndexOutOfRange, Requirements, RequirementsUpdate, Section};

pub const RATE_LIMIT_MESSAGE: &str = "Rate limit reached. Please wait a moment and try again.";
pub const USAGE_LIMIT_MESSAGE: &str = "Usage limit reached. Please add credits to continue.";
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to process your message. Please try again.";

const COMMAND_BUFFER: usize = 32;
const NOTIFICATION_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl From<ChatRole> for Role {
    fn from(role: ChatRole) -> Self {
        match role {
            ChatRole::User => Role::User,
            ChatRole::Assistant => Role::Assistant,
        }
    }
}

/// One turn of the transcript. Never changed after it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<RequirementsUpdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarifications: Option<Vec<String>>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }

    fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            requirements: None,
            changes: None,
            clarifications: None,
        }
    }

    /// Role and content only, as sent to the extraction endpoint.
    pub fn to_prompt(&self) -> PromptMessage {
        PromptMessage {
            role: self.role.into(),
            content: self.content.clone(),
        }
    }
}

/// A consistent copy of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatState {
    pub messages: Vec<ChatMessage>,
    pub requirements: Option<Requirements>,
    pub is_loading: bool,
    pub is_confirmed: bool,
    /// Sends waiting for the current one to finish.
    pub queued_sends: usize,
}

/// What to do with a send that arrives while another one is in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SendPolicy {
    /// Fail with [`ChatError::Busy`]; the transcript is left untouched.
    RejectIfBusy,
    /// Start it once the current send completes, with the updated transcript.
    #[default]
    QueueSerially,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Error,
}

/// A transient notice for the user interface (the "toast").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("a message is already being processed")]
    Busy,

    #[error("the chat was reset before the reply arrived")]
    Reset,

    #[error("there are no requirements to edit yet")]
    NoRequirements,

    #[error(transparent)]
    IndexOutOfRange(#[from] IndexOutOfRange),

    #[error("the chat session has shut down")]
    Closed,
}

/// User-facing text for a failed extraction call.
pub fn failure_message(err: &TransportError) -> &'static str {
    match err.status() {
        Some(429) => RATE_LIMIT_MESSAGE,
        Some(402) => USAGE_LIMIT_MESSAGE,
        _ => GENERIC_FAILURE_MESSAGE,
    }
}

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Send {
        text: String,
        reply: Reply<Result<ChatMessage, ChatError>>,
    },
    Update {
        requirements: Requirements,
        reply: Reply<()>,
    },
    RemoveItem {
        section: Section,
        index: usize,
        reply: Reply<Result<Requirements, ChatError>>,
    },
    Confirm {
        reply: Reply<()>,
    },
    Reset {
        reply: Reply<()>,
    },
    State {
        reply: Reply<ChatState>,
    },
}

/// Cloneable handle to a running chat session.
#[derive(Clone)]
pub struct ChatHandle {
    commands: mpsc::Sender<Command>,
    notifications: broadcast::Sender<Notification>,
}

impl ChatHandle {
    /// Start a session on the current tokio runtime.
    pub fn spawn(backend: Arc<dyn ExtractionBackend>, policy: SendPolicy) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (notifications, _) = broadcast::channel(NOTIFICATION_BUFFER);

        let actor = ChatActor {
            backend,
            policy,
            state: ChatState::default(),
            epoch: 0,
            in_flight: None,
            queue: VecDeque::new(),
            completions: completions_tx,
            notifications: notifications.clone(),
        };
        tokio::spawn(actor.run(commands_rx, completions_rx));

        Self {
            commands: commands_tx,
            notifications,
        }
    }

    /// Send a user turn and wait for the assistant turn it produced.
    ///
    /// Endpoint failures are not errors here: they come back as an assistant
    /// message carrying a user-facing explanation.
    pub async fn send_message(&self, text: impl Into<String>) -> Result<ChatMessage, ChatError> {
        let text = text.into();
        self.request(|reply| Command::Send { text, reply }).await?
    }

    /// Replace the snapshot, e.g. after a manual edit. Clears confirmation.
    pub async fn update_requirements(&self, requirements: Requirements) -> Result<(), ChatError> {
        self.request(|reply| Command::Update {
            requirements,
            reply,
        })
        .await
    }

    /// Delete one item of one section and return the edited snapshot.
    pub async fn remove_item(&self, section: Section, index: usize) -> Result<Requirements, ChatError> {
        self.request(|reply| Command::RemoveItem {
            section,
            index,
            reply,
        })
        .await?
    }

    /// Mark the requirements as confirmed. No completeness check is made.
    pub async fn confirm_requirements(&self) -> Result<(), ChatError> {
        self.request(|reply| Command::Confirm { reply }).await
    }

    pub async fn reset_chat(&self) -> Result<(), ChatError> {
        self.request(|reply| Command::Reset { reply }).await
    }

    pub async fn state(&self) -> Result<ChatState, ChatError> {
        self.request(|reply| Command::State { reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, ChatError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| ChatError::Closed)?;
        rx.await.map_err(|_| ChatError::Closed)
    }
}

struct Completion {
    epoch: u64,
    result: Result<ExtractionResponse, TransportError>,
}

struct PendingSend {
    text: String,
    reply: Reply<Result<ChatMessage, ChatError>>,
}

struct ChatActor {
    backend: Arc<dyn ExtractionBackend>,
    policy: SendPolicy,
    state: ChatState,
    // Bumped on reset; completions from an older epoch are dropped.
    epoch: u64,
    in_flight: Option<Reply<Result<ChatMessage, ChatError>>>,
    queue: VecDeque<PendingSend>,
    completions: mpsc::UnboundedSender<Completion>,
    notifications: broadcast::Sender<Notification>,
}

impl ChatActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        loop {
            tokio::select! {
                biased;
                Some(completion) = completions.recv() => self.complete(completion),
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }
        tracing::debug!("chat session closed");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Send { text, reply } => self.send(text, reply),
            Command::Update {
                requirements,
                reply,
            } => {
                self.replace_requirements(requirements);
                let _ = reply.send(());
            }
            Command::RemoveItem {
                section,
                index,
                reply,
            } => {
                let result = self.remove_item(section, index);
                let _ = reply.send(result);
            }
            Command::Confirm { reply } => {
                self.state.is_confirmed = true;
                self.notify(
                    NotificationKind::Info,
                    "Requirements Confirmed",
                    "You can now proceed to build your application.",
                );
                let _ = reply.send(());
            }
            Command::Reset { reply } => {
                self.reset();
                let _ = reply.send(());
            }
            Command::State { reply } => {
                let state = ChatState {
                    queued_sends: self.queue.len(),
                    ..self.state.clone()
                };
                let _ = reply.send(state);
            }
        }
    }

    fn send(&mut self, text: String, reply: Reply<Result<ChatMessage, ChatError>>) {
        if self.in_flight.is_none() {
            self.start(text, reply);
            return;
        }

        match self.policy {
            SendPolicy::RejectIfBusy => {
                tracing::debug!("rejecting send while another is in flight");
                let _ = reply.send(Err(ChatError::Busy));
            }
            SendPolicy::QueueSerially => {
                tracing::debug!(queued = self.queue.len() + 1, "queueing send");
                self.queue.push_back(PendingSend { text, reply });
            }
        }
    }

    fn start(&mut self, text: String, reply: Reply<Result<ChatMessage, ChatError>>) {
        self.state.messages.push(ChatMessage::user(text));
        self.state.is_loading = true;
        self.in_flight = Some(reply);

        let request = ExtractionRequest {
            messages: self.state.messages.iter().map(ChatMessage::to_prompt).collect(),
            current_requirements: self.state.requirements.clone(),
        };
        let backend = Arc::clone(&self.backend);
        let completions = self.completions.clone();
        let epoch = self.epoch;

        // A panicking backend must still produce a completion, or the session stays loading.
        let call = tokio::spawn(async move { backend.parse_requirements(request).await });
        tokio::spawn(async move {
            let result = call.await.unwrap_or_else(|e| {
                tracing::error!(error = %e, "extraction task aborted");
                Err(TransportError::Aborted(e.to_string()))
            });
            let _ = completions.send(Completion { epoch, result });
        });
    }

    fn complete(&mut self, completion: Completion) {
        if completion.epoch != self.epoch {
            tracing::debug!("dropping reply that arrived after a reset");
            return;
        }
        let Some(reply) = self.in_flight.take() else {
            return;
        };

        let message = match completion.result {
            Ok(response) => self.apply_response(response),
            Err(err) => self.apply_failure(&err),
        };
        self.state.messages.push(message.clone());
        let _ = reply.send(Ok(message));

        match self.queue.pop_front() {
            Some(next) => self.start(next.text, next.reply),
            None => self.state.is_loading = false,
        }
    }

    fn apply_response(&mut self, response: ExtractionResponse) -> ChatMessage {
        tracing::debug!(action = ?response.action, "extraction response");

        if let Some(update) = &response.requirements {
            self.state.requirements = Some(Requirements::merged(
                self.state.requirements.as_ref(),
                update,
            ));
        }
        if response.changes.as_ref().is_some_and(|c| !c.is_empty()) {
            self.state.is_confirmed = false;
        }

        ChatMessage {
            requirements: response.requirements,
            changes: response.changes,
            clarifications: response.clarifications,
            ..ChatMessage::assistant(response.message)
        }
    }

    fn apply_failure(&mut self, err: &TransportError) -> ChatMessage {
        tracing::warn!(error = %err, "error parsing requirements");
        let text = failure_message(err);
        self.notify(NotificationKind::Error, "Error", text);
        ChatMessage::assistant(text)
    }

    fn replace_requirements(&mut self, requirements: Requirements) {
        self.state.requirements = Some(requirements);
        self.state.is_confirmed = false;
    }

    fn remove_item(&mut self, section: Section, index: usize) -> Result<Requirements, ChatError> {
        let current = self
            .state
            .requirements
            .as_ref()
            .ok_or(ChatError::NoRequirements)?;
        let next = current.without_item(section, index)?;
        self.replace_requirements(next.clone());
        Ok(next)
    }

    fn reset(&mut self) {
        self.epoch += 1;
        if let Some(reply) = self.in_flight.take() {
            let _ = reply.send(Err(ChatError::Reset));
        }
        for pending in self.queue.drain(..) {
            let _ = pending.reply.send(Err(ChatError::Reset));
        }
        self.state = ChatState::default();
    }

    fn notify(&self, kind: NotificationKind, title: &str, description: &str) {
        // No subscribers is fine.
        let _ = self.notifications.send(Notification {
            kind,
            title: title.to_string(),
            description: description.to_string(),
        });
    }
}
