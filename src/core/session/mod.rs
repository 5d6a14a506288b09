//! Per-panel streaming session.
//!
//! The controller is synchronous: it validates input, mutates the panel's
//! conversations and returns a [`StreamRequest`] describing the HTTP stream to
//! start. The orchestrator performs the I/O and feeds the resulting
//! [`StreamEvent`]s back through [`SessionController::handle_stream_event`].
//!
//! Phases move `Idle -> Thinking -> Streaming -> Idle`. A stop or a failure
//! returns to `Idle` from either busy phase. While busy, `streaming_buffer`
//! holds the last published snapshot of the reply; it is empty in every other
//! phase.

mod publish;


pub use publish::PublishSchedule;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::models::preferred_model;
use crate::api::{ChatRequest, ModelEntry};
use crate::core::chat_stream::StreamEvent;
use crate::core::conversation::ConversationStore;
use crate::core::error::StreamFailure;
use crate::core::ids::{ConversationId, PanelId};
use crate::core::message::{Message, MessageMetadata};
use crate::core::relay::Delivery;

/// What happens to already received text when a stream is stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopPolicy {
    /// Commit the partial reply as an assistant message. It is never relayed.
    #[default]
    KeepPartial,
    /// Discard the partial reply.
    #[serde(alias = "discard")]
    DropPartial,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionPhase {
    #[default]
    Idle,
    Thinking,
    Streaming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitRejection {
    #[error("input is empty")]
    EmptyInput,
    #[error("no model selected")]
    NoModelSelected,
    #[error("a response is already being generated")]
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Nucleus sampling cutoff. Left to the server when `None`.
    pub top_p: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2000,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
        }
    }
}

/// Named sampling setups a panel can be switched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationPreset {
    Creative,
    Balanced,
    Precise,
}

impl GenerationPreset {
    pub fn params(self) -> GenerationParams {
        let (temperature, top_p, penalty) = match self {
            GenerationPreset::Creative => (0.9, 0.95, 0.5),
            GenerationPreset::Balanced => (0.7, 0.9, 0.2),
            GenerationPreset::Precise => (0.3, 0.8, 0.0),
        };
        GenerationParams {
            temperature,
            max_tokens: 2000,
            top_p: Some(top_p),
            frequency_penalty: Some(penalty),
            presence_penalty: Some(penalty),
        }
    }
}

impl std::str::FromStr for GenerationPreset {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "creative" => Ok(GenerationPreset::Creative),
            "balanced" => Ok(GenerationPreset::Balanced),
            "precise" => Ok(GenerationPreset::Precise),
            other => Err(format!(
                "unknown preset '{other}' (expected creative, balanced or precise)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub generation: GenerationParams,
    pub publish_interval: Duration,
    pub publish_batch_bytes: usize,
    pub stop_policy: StopPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            generation: GenerationParams::default(),
            publish_interval: Duration::from_millis(1000),
            publish_batch_bytes: 512,
            stop_policy: StopPolicy::default(),
        }
    }
}

/// A stream the orchestrator should start on behalf of a panel.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub panel: PanelId,
    pub stream_id: u64,
    pub request: ChatRequest,
    pub cancel_token: CancellationToken,
}

/// Notifications for whatever renders the panels.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelEvent {
    StreamingUpdate {
        panel: PanelId,
        text: String,
    },
    ThinkingChanged {
        panel: PanelId,
        thinking: bool,
    },
    MessageCommitted {
        panel: PanelId,
        conversation: ConversationId,
        message: Message,
    },
    Relayed {
        from: PanelId,
        to: PanelId,
        iteration_count: u32,
    },
}

struct InFlight {
    stream_id: u64,
    cancel_token: CancellationToken,
    conversation: ConversationId,
    model: ModelEntry,
    iteration_count: u32,
    accumulated: String,
}

pub struct SessionController {
    panel: PanelId,
    conversations: ConversationStore,
    selected_model: Option<ModelEntry>,
    phase: SessionPhase,
    streaming_buffer: String,
    in_flight: Option<InFlight>,
    schedule: PublishSchedule,
    settings: SessionSettings,
    next_stream_id: u64,
    events: mpsc::UnboundedSender<PanelEvent>,
}

impl SessionController {
    pub fn new(
        panel: PanelId,
        conversations: ConversationStore,
        settings: SessionSettings,
        events: mpsc::UnboundedSender<PanelEvent>,
    ) -> Self {
        let schedule = PublishSchedule::new(settings.publish_interval, settings.publish_batch_bytes);
        Self {
            panel,
            conversations,
            selected_model: None,
            phase: SessionPhase::Idle,
            streaming_buffer: String::new(),
            in_flight: None,
            schedule,
            settings,
            next_stream_id: 0,
            events,
        }
    }

    pub fn panel(&self) -> &PanelId {
        &self.panel
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_busy(&self) -> bool {
        self.phase != SessionPhase::Idle
    }

    pub fn is_thinking(&self) -> bool {
        self.phase == SessionPhase::Thinking
    }

    pub fn streaming_buffer(&self) -> &str {
        &self.streaming_buffer
    }

    pub fn selected_model(&self) -> Option<&ModelEntry> {
        self.selected_model.as_ref()
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn set_stop_policy(&mut self, policy: StopPolicy) {
        self.settings.stop_policy = policy;
    }

    /// Sampling used by the next request. A stream already running keeps its own.
    pub fn set_generation(&mut self, generation: GenerationParams) {
        self.settings.generation = generation;
    }

    /// Stream id of the in-flight request, if any.
    pub fn current_stream_id(&self) -> Option<u64> {
        self.in_flight.as_ref().map(|in_flight| in_flight.stream_id)
    }

    /// Start a new turn with text the user typed.
    pub fn submit(&mut self, text: &str) -> Result<StreamRequest, SubmitRejection> {
        self.begin_turn(text, None)
    }

    /// Start a new turn from a reply relayed by another panel.
    pub fn submit_relayed(&mut self, delivery: &Delivery) -> Result<StreamRequest, SubmitRejection> {
        self.begin_turn(
            &delivery.content,
            Some((delivery.from.clone(), delivery.iteration_count)),
        )
    }

    fn begin_turn(
        &mut self,
        text: &str,
        origin: Option<(PanelId, u32)>,
    ) -> Result<StreamRequest, SubmitRejection> {
        let content = text.trim();
        if content.is_empty() {
            return Err(SubmitRejection::EmptyInput);
        }
        if self.is_busy() {
            return Err(SubmitRejection::Busy);
        }
        let Some(model) = self.selected_model.clone() else {
            return Err(SubmitRejection::NoModelSelected);
        };

        let conversation = self.conversations.active_id().clone();
        let (from_panel, iteration_count) = match origin {
            Some((from, count)) => (Some(from), count),
            None => (None, 0),
        };
        let mut user_message = Message::user(content);
        if from_panel.is_some() {
            user_message = user_message.with_metadata(MessageMetadata {
                from_panel,
                iteration_count,
                ..MessageMetadata::default()
            });
        }
        self.commit(&conversation, user_message);

        let messages = self
            .conversations
            .active()
            .messages()
            .iter()
            .map(Message::to_api_message)
            .collect();
        let request = ChatRequest {
            model: model.id.clone(),
            messages,
            stream: true,
            temperature: self.settings.generation.temperature,
            max_tokens: self.settings.generation.max_tokens,
            top_p: self.settings.generation.top_p,
            frequency_penalty: self.settings.generation.frequency_penalty,
            presence_penalty: self.settings.generation.presence_penalty,
        };

        self.next_stream_id += 1;
        let stream_id = self.next_stream_id;
        let cancel_token = CancellationToken::new();
        self.in_flight = Some(InFlight {
            stream_id,
            cancel_token: cancel_token.clone(),
            conversation,
            model,
            iteration_count,
            accumulated: String::new(),
        });
        self.phase = SessionPhase::Thinking;
        self.emit(PanelEvent::ThinkingChanged {
            panel: self.panel.clone(),
            thinking: true,
        });
        debug!(panel = %self.panel, stream_id, iteration_count, "turn started");

        Ok(StreamRequest {
            panel: self.panel.clone(),
            stream_id,
            request,
            cancel_token,
        })
    }

    /// Apply one event from the stream task. Events from any stream other
    /// than the in-flight one are ignored.
    ///
    /// Returns the assistant message committed by a clean completion, which is
    /// the only kind of message eligible for relay.
    pub fn handle_stream_event(
        &mut self,
        stream_id: u64,
        event: StreamEvent,
        now: Instant,
    ) -> Option<Message> {
        if self.current_stream_id() != Some(stream_id) {
            debug!(panel = %self.panel, stream_id, "ignoring event from stale stream");
            return None;
        }

        match event {
            StreamEvent::Delta(text) => {
                self.append_delta(&text, now);
                None
            }
            StreamEvent::Completed => self.complete(),
            StreamEvent::Failed(failure) => {
                self.fail(failure);
                None
            }
        }
    }

    fn append_delta(&mut self, text: &str, now: Instant) {
        if text.is_empty() {
            return;
        }
        let Some(in_flight) = self.in_flight.as_mut() else {
            return;
        };
        in_flight.accumulated.push_str(text);

        if self.phase == SessionPhase::Thinking {
            self.phase = SessionPhase::Streaming;
            self.emit(PanelEvent::ThinkingChanged {
                panel: self.panel.clone(),
                thinking: false,
            });
        }
        if self.schedule.record(text.len(), now) {
            self.publish();
        }
    }

    fn publish(&mut self) {
        let Some(in_flight) = self.in_flight.as_ref() else {
            return;
        };
        self.streaming_buffer.clone_from(&in_flight.accumulated);
        self.schedule.mark_published();
        self.emit(PanelEvent::StreamingUpdate {
            panel: self.panel.clone(),
            text: self.streaming_buffer.clone(),
        });
    }

    /// Publish the live text if its deadline has passed.
    pub fn poll_publish(&mut self, now: Instant) -> bool {
        if self.in_flight.is_some() && self.schedule.is_due(now) {
            self.publish();
            true
        } else {
            false
        }
    }

    pub fn publish_deadline(&self) -> Option<Instant> {
        self.in_flight.as_ref().and(self.schedule.deadline())
    }

    fn complete(&mut self) -> Option<Message> {
        let in_flight = self.end_turn()?;
        if in_flight.accumulated.trim().is_empty() {
            info!(panel = %self.panel, "stream completed without text");
            return None;
        }
        let message = assistant_reply(&in_flight);
        self.commit(&in_flight.conversation, message.clone());
        Some(message)
    }

    fn fail(&mut self, failure: StreamFailure) {
        let Some(in_flight) = self.end_turn() else {
            return;
        };
        warn!(panel = %self.panel, kind = failure.kind(), error = %failure, "stream failed");
        if !in_flight.accumulated.is_empty() {
            self.commit(&in_flight.conversation, assistant_reply(&in_flight));
        }
        self.commit(&in_flight.conversation, Message::error(failure.user_message()));
    }

    /// Abort the in-flight request. Returns false when nothing was running.
    pub fn stop(&mut self) -> bool {
        let Some(in_flight) = self.end_turn() else {
            return false;
        };
        in_flight.cancel_token.cancel();
        debug!(
            panel = %self.panel,
            stream_id = in_flight.stream_id,
            policy = ?self.settings.stop_policy,
            "stream stopped"
        );
        if self.settings.stop_policy == StopPolicy::KeepPartial
            && !in_flight.accumulated.is_empty()
        {
            self.commit(&in_flight.conversation, assistant_reply(&in_flight));
        }
        true
    }

    /// Leave the busy phase: forget the stream, clear the live text and drop
    /// any pending publish.
    fn end_turn(&mut self) -> Option<InFlight> {
        let in_flight = self.in_flight.take()?;
        self.schedule.cancel();
        let had_live_text = !self.streaming_buffer.is_empty();
        self.streaming_buffer.clear();
        let was_thinking = self.phase == SessionPhase::Thinking;
        self.phase = SessionPhase::Idle;
        if was_thinking {
            self.emit(PanelEvent::ThinkingChanged {
                panel: self.panel.clone(),
                thinking: false,
            });
        }
        if had_live_text {
            self.emit(PanelEvent::StreamingUpdate {
                panel: self.panel.clone(),
                text: String::new(),
            });
        }
        Some(in_flight)
    }

    fn commit(&mut self, conversation: &ConversationId, message: Message) {
        if !self
            .conversations
            .append_message(conversation, message.clone())
        {
            warn!(panel = %self.panel, %conversation, "conversation vanished before commit");
            return;
        }
        self.emit(PanelEvent::MessageCommitted {
            panel: self.panel.clone(),
            conversation: conversation.clone(),
            message,
        });
    }

    fn emit(&self, event: PanelEvent) {
        let _ = self.events.send(event);
    }

    pub fn switch_conversation(&mut self, id: &ConversationId) -> bool {
        if id != self.conversations.active_id() {
            self.stop();
        }
        self.conversations.switch(id)
    }

    pub fn new_conversation(&mut self) -> ConversationId {
        self.stop();
        self.conversations.create()
    }

    pub fn delete_conversation(&mut self, id: &ConversationId) -> bool {
        if id == self.conversations.active_id() {
            self.stop();
        }
        self.conversations.delete(id)
    }

    pub fn clear_conversation(&mut self, id: &ConversationId) -> bool {
        if id == self.conversations.active_id() {
            self.stop();
        }
        self.conversations.clear(id)
    }

    pub fn rename_conversation(&mut self, id: &ConversationId, name: &str) -> bool {
        if id == self.conversations.active_id() {
            self.stop();
        }
        self.conversations.rename(id, name)
    }

    /// Reconcile the selection with a freshly fetched list: pick the preferred
    /// model when none is selected or the selected one is no longer listed.
    /// An empty list leaves the selection alone.
    pub fn sync_models(&mut self, models: &[ModelEntry]) {
        match &self.selected_model {
            Some(_) if models.is_empty() => return,
            Some(selected) if models.iter().any(|model| model.id == selected.id) => return,
            Some(selected) => {
                warn!(panel = %self.panel, model = %selected.id, "selected model is no longer loaded");
            }
            None => {}
        }
        self.selected_model = preferred_model(models).cloned();
        if let Some(model) = &self.selected_model {
            info!(panel = %self.panel, model = %model.id, "model auto-selected");
        }
    }

    pub fn select_model(&mut self, model: ModelEntry) {
        self.selected_model = Some(model);
    }

    /// Stop everything before the panel goes away.
    pub fn teardown(&mut self) {
        self.stop();
    }
}

fn assistant_reply(in_flight: &InFlight) -> Message {
    let mut metadata = MessageMetadata::for_model(&in_flight.model);
    metadata.iteration_count = in_flight.iteration_count;
    Message::assistant(in_flight.accumulated.clone()).with_metadata(metadata)
}
