//! Owns every panel and moves data between them.
//!
//! Streams run as spawned tasks that only send [`StreamEnvelope`]s; all panel
//! state is mutated here, on the task that calls [`PanelOrchestrator::pump`].
//! A reply committed by one panel reaches its siblings through explicit calls:
//! [`RelayCoordinator::relay`] produces deliveries, each receiver's
//! [`RelayCoordinator::accept`] decides, and accepted deliveries are submitted
//! on the receiving panel's controller.


use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::models::{fetch_models_with_retry, sort_models, RetryPolicy};
use crate::api::ModelEntry;
use crate::core::chat_stream::{ChatStreamService, StreamEnvelope, StreamEvent, StreamParams};
use crate::core::conversation::ConversationStore;
use crate::core::error::OrchestratorError;
use crate::core::ids::{ConversationId, PanelId};
use crate::core::message::Message;
use crate::core::persistence::{PanelSnapshot, PanelStore};
use crate::core::relay::{RelayCoordinator, RelayDecision, RelaySettings};
use crate::core::session::{
    GenerationPreset, PanelEvent, SessionController, SessionSettings, StreamRequest,
};

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub server_url: String,
    /// Panels created at startup. At least one is always created.
    pub panels: usize,
    pub session: SessionSettings,
    pub request_timeout: Duration,
    /// Relay settings for panels with no saved state.
    pub default_relay: RelaySettings,
    pub retry: RetryPolicy,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:1234".to_string(),
            panels: 2,
            session: SessionSettings::default(),
            request_timeout: Duration::from_secs(30),
            default_relay: RelaySettings::default(),
            retry: RetryPolicy::default(),
        }
    }
}

enum Wake {
    Stream(Option<StreamEnvelope>),
    Deadline,
}

pub struct PanelOrchestrator {
    settings: OrchestratorSettings,
    client: reqwest::Client,
    panels: Vec<SessionController>,
    models: Vec<ModelEntry>,
    relay: RelayCoordinator,
    stream_service: ChatStreamService,
    stream_rx: mpsc::UnboundedReceiver<StreamEnvelope>,
    store: Box<dyn PanelStore>,
    events: mpsc::UnboundedSender<PanelEvent>,
}

impl PanelOrchestrator {
    pub fn new(
        settings: OrchestratorSettings,
        client: reqwest::Client,
        store: Box<dyn PanelStore>,
        events: mpsc::UnboundedSender<PanelEvent>,
    ) -> Self {
        let (stream_service, stream_rx) = ChatStreamService::new();
        let initial_panels = settings.panels.max(1);
        let mut orchestrator = Self {
            settings,
            client,
            panels: Vec::new(),
            models: Vec::new(),
            relay: RelayCoordinator::new(),
            stream_service,
            stream_rx,
            store,
            events,
        };
        for _ in 0..initial_panels {
            orchestrator.add_panel();
        }
        orchestrator
    }

    /// Create a panel with the lowest free number, restoring any saved state.
    pub fn add_panel(&mut self) -> PanelId {
        let number = (1..)
            .find(|n| self.index_of(&PanelId::numbered(*n)).is_none())
            .unwrap_or(self.panels.len() + 1);
        let panel = PanelId::numbered(number);

        let snapshot = match self.store.load(&panel) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(%panel, error = %err, "ignoring unreadable panel state");
                None
            }
        };

        let (conversations, relay_settings, saved_model) = match snapshot {
            Some(snapshot) => (
                snapshot.conversation_store(),
                snapshot.relay,
                snapshot.selected_model,
            ),
            None => (ConversationStore::new(), self.settings.default_relay, None),
        };

        let mut controller = SessionController::new(
            panel.clone(),
            conversations,
            self.settings.session.clone(),
            self.events.clone(),
        );
        if let Some(model_id) = saved_model {
            controller.select_model(ModelEntry::from_id(model_id));
        }
        controller.sync_models(&self.models);

        self.relay.register(panel.clone(), relay_settings);
        self.panels.push(controller);
        info!(%panel, "panel added");
        panel
    }

    pub fn remove_panel(&mut self, panel: &PanelId) -> Result<(), OrchestratorError> {
        let index = self.require(panel)?;
        if self.panels.len() == 1 {
            return Err(OrchestratorError::LastPanel);
        }
        self.panels[index].teardown();
        self.persist(index);
        self.panels.remove(index);
        self.relay.unregister(panel);
        info!(%panel, "panel removed");
        Ok(())
    }

    pub fn panel(&self, panel: &PanelId) -> Option<&SessionController> {
        self.panels.iter().find(|p| p.panel() == panel)
    }

    pub fn panels(&self) -> impl Iterator<Item = &SessionController> {
        self.panels.iter()
    }

    pub fn panel_ids(&self) -> Vec<PanelId> {
        self.panels.iter().map(|p| p.panel().clone()).collect()
    }

    pub fn models(&self) -> &[ModelEntry] {
        &self.models
    }

    pub fn store(&self) -> &dyn PanelStore {
        self.store.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.panels.iter().any(SessionController::is_busy)
    }

    fn index_of(&self, panel: &PanelId) -> Option<usize> {
        self.panels.iter().position(|p| p.panel() == panel)
    }

    fn require(&self, panel: &PanelId) -> Result<usize, OrchestratorError> {
        self.index_of(panel)
            .ok_or_else(|| OrchestratorError::UnknownPanel(panel.clone()))
    }

    /// Fetch the model list from the server and share it with every panel.
    pub async fn refresh_models(&mut self) -> Result<&[ModelEntry], OrchestratorError> {
        let models =
            fetch_models_with_retry(&self.client, &self.settings.server_url, self.settings.retry)
                .await?;
        self.set_models(models);
        Ok(&self.models)
    }

    pub fn set_models(&mut self, mut models: Vec<ModelEntry>) {
        sort_models(&mut models);
        self.models = models;
        for index in 0..self.panels.len() {
            let before = self.panels[index].selected_model().map(|m| m.id.clone());
            self.panels[index].sync_models(&self.models);
            let after = self.panels[index].selected_model().map(|m| m.id.as_str());
            if before.as_deref() != after {
                self.persist(index);
            }
        }
    }

    pub fn select_model(&mut self, panel: &PanelId, model_id: &str) -> Result<(), OrchestratorError> {
        let index = self.require(panel)?;
        let model = self
            .models
            .iter()
            .find(|model| model.id == model_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::UnknownModel(model_id.to_string()))?;
        self.panels[index].select_model(model);
        self.persist(index);
        Ok(())
    }

    pub fn relay_settings(&self, panel: &PanelId) -> Option<RelaySettings> {
        self.relay.settings(panel)
    }

    pub fn set_relay_settings(
        &mut self,
        panel: &PanelId,
        settings: RelaySettings,
    ) -> Result<(), OrchestratorError> {
        let index = self.require(panel)?;
        self.relay.set_settings(panel, settings);
        self.persist(index);
        Ok(())
    }

    pub fn set_generation_preset(
        &mut self,
        panel: &PanelId,
        preset: GenerationPreset,
    ) -> Result<(), OrchestratorError> {
        let index = self.require(panel)?;
        self.panels[index].set_generation(preset.params());
        Ok(())
    }

    /// Send user input on `panel` and start streaming the reply.
    pub fn submit(&mut self, panel: &PanelId, text: &str) -> Result<(), OrchestratorError> {
        let index = self.require(panel)?;
        let request = self.panels[index]
            .submit(text)
            .map_err(OrchestratorError::Rejected)?;
        self.spawn(request);
        self.persist(index);
        Ok(())
    }

    pub fn stop(&mut self, panel: &PanelId) -> Result<bool, OrchestratorError> {
        let index = self.require(panel)?;
        let stopped = self.panels[index].stop();
        if stopped {
            self.persist(index);
        }
        Ok(stopped)
    }

    pub fn new_conversation(&mut self, panel: &PanelId) -> Result<ConversationId, OrchestratorError> {
        let index = self.require(panel)?;
        let id = self.panels[index].new_conversation();
        self.persist(index);
        Ok(id)
    }

    pub fn switch_conversation(
        &mut self,
        panel: &PanelId,
        conversation: &ConversationId,
    ) -> Result<bool, OrchestratorError> {
        let index = self.require(panel)?;
        let switched = self.panels[index].switch_conversation(conversation);
        self.persist(index);
        Ok(switched)
    }

    pub fn delete_conversation(
        &mut self,
        panel: &PanelId,
        conversation: &ConversationId,
    ) -> Result<bool, OrchestratorError> {
        let index = self.require(panel)?;
        let deleted = self.panels[index].delete_conversation(conversation);
        self.persist(index);
        Ok(deleted)
    }

    pub fn clear_conversation(
        &mut self,
        panel: &PanelId,
        conversation: &ConversationId,
    ) -> Result<bool, OrchestratorError> {
        let index = self.require(panel)?;
        let cleared = self.panels[index].clear_conversation(conversation);
        self.persist(index);
        Ok(cleared)
    }

    pub fn rename_conversation(
        &mut self,
        panel: &PanelId,
        conversation: &ConversationId,
        name: &str,
    ) -> Result<bool, OrchestratorError> {
        let index = self.require(panel)?;
        let renamed = self.panels[index].rename_conversation(conversation, name);
        self.persist(index);
        Ok(renamed)
    }

    /// Wait for the next stream event or publish deadline and apply it.
    /// Returns false only if the stream channel has closed.
    pub async fn pump(&mut self) -> bool {
        let deadline = self
            .panels
            .iter()
            .filter_map(SessionController::publish_deadline)
            .min();

        let wake = match deadline {
            Some(deadline) => tokio::select! {
                envelope = self.stream_rx.recv() => Wake::Stream(envelope),
                _ = tokio::time::sleep_until(deadline) => Wake::Deadline,
            },
            None => Wake::Stream(self.stream_rx.recv().await),
        };

        match wake {
            Wake::Stream(Some(envelope)) => {
                self.dispatch(envelope);
                true
            }
            Wake::Stream(None) => false,
            Wake::Deadline => {
                let now = Instant::now();
                for panel in &mut self.panels {
                    panel.poll_publish(now);
                }
                true
            }
        }
    }

    /// Pump until no panel is waiting on a response, relay chains included.
    pub async fn run_until_idle(&mut self) {
        while self.is_busy() {
            if !self.pump().await {
                break;
            }
        }
    }

    fn dispatch(&mut self, envelope: StreamEnvelope) {
        let StreamEnvelope {
            panel,
            stream_id,
            event,
        } = envelope;
        let Some(index) = self.index_of(&panel) else {
            debug!(%panel, stream_id, "dropping event for removed panel");
            return;
        };

        let current = self.panels[index].current_stream_id() == Some(stream_id);
        let terminal = !matches!(event, StreamEvent::Delta(_));
        let committed = self.panels[index].handle_stream_event(stream_id, event, Instant::now());

        if current && terminal {
            self.persist(index);
        }
        if let Some(message) = committed {
            self.relay_from(&panel, &message);
        }
    }

    fn relay_from(&mut self, from: &PanelId, message: &Message) {
        for delivery in self.relay.relay(from, message) {
            let Some(index) = self.index_of(&delivery.to) else {
                continue;
            };
            let busy = self.panels[index].is_busy();
            if self.relay.accept(&delivery.to, &delivery, busy) != RelayDecision::Submit {
                continue;
            }
            match self.panels[index].submit_relayed(&delivery) {
                Ok(request) => {
                    info!(
                        from = %delivery.from,
                        to = %delivery.to,
                        iteration = delivery.iteration_count,
                        "relayed reply submitted"
                    );
                    let _ = self.events.send(PanelEvent::Relayed {
                        from: delivery.from.clone(),
                        to: delivery.to.clone(),
                        iteration_count: delivery.iteration_count,
                    });
                    self.spawn(request);
                    self.persist(index);
                }
                Err(rejection) => {
                    debug!(to = %delivery.to, %rejection, "relayed reply not submitted");
                }
            }
        }
    }

    fn spawn(&self, request: StreamRequest) {
        self.stream_service.spawn_stream(StreamParams {
            client: self.client.clone(),
            server_url: self.settings.server_url.clone(),
            request: request.request,
            cancel_token: request.cancel_token,
            stream_id: request.stream_id,
            panel: request.panel,
            timeout: self.settings.request_timeout,
        });
    }

    fn snapshot(&self, index: usize) -> PanelSnapshot {
        let panel = &self.panels[index];
        PanelSnapshot::capture(
            panel.conversations(),
            panel.selected_model().map(|model| model.id.as_str()),
            self.relay.settings(panel.panel()).unwrap_or_default(),
        )
    }

    fn persist(&mut self, index: usize) {
        let snapshot = self.snapshot(index);
        let panel = self.panels[index].panel();
        if let Err(err) = self.store.save(panel, &snapshot) {
            warn!(%panel, error = %err, "failed to save panel state");
        }
    }

    /// Save every panel, reporting the first failure.
    pub fn save_all(&mut self) -> Result<(), OrchestratorError> {
        for index in 0..self.panels.len() {
            let snapshot = self.snapshot(index);
            self.store.save(self.panels[index].panel(), &snapshot)?;
        }
        Ok(())
    }

    /// Stop every panel's stream.
    pub fn shutdown(&mut self) {
        for panel in &mut self.panels {
            panel.teardown();
        }
    }
}
