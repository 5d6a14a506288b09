//! Headless panel harness shared by the chat subcommands.

use std::error::Error;

use tokio::sync::mpsc;
use tracing::warn;

use crate::core::config::Config;
use crate::core::orchestrator::PanelOrchestrator;
use crate::core::persistence::JsonFileStore;
use crate::core::session::PanelEvent;
use crate::utils::logging::TranscriptLog;

pub struct CliSession {
    orchestrator: PanelOrchestrator,
    events: mpsc::UnboundedReceiver<PanelEvent>,
    transcript: TranscriptLog,
}

impl CliSession {
    /// Open `panels` panels with state kept in the configured data directory.
    pub fn open(
        config: &Config,
        panels: usize,
        transcript: TranscriptLog,
    ) -> Result<Self, Box<dyn Error>> {
        let mut settings = config.orchestrator_settings();
        settings.panels = panels.max(1);
        let store = JsonFileStore::new(config.resolved_data_dir()?);
        let (events_tx, events) = mpsc::unbounded_channel();
        let orchestrator =
            PanelOrchestrator::new(settings, reqwest::Client::new(), Box::new(store), events_tx);
        Ok(Self {
            orchestrator,
            events,
            transcript,
        })
    }

    pub fn orchestrator(&mut self) -> &mut PanelOrchestrator {
        &mut self.orchestrator
    }

    /// Drive the panels until none is busy, handing every event to `on_event`
    /// after it has been written to the transcript.
    pub async fn run<F>(&mut self, mut on_event: F)
    where
        F: FnMut(&PanelEvent),
    {
        loop {
            self.drain(&mut on_event);
            if !self.orchestrator.is_busy() || !self.orchestrator.pump().await {
                break;
            }
        }
        self.drain(&mut on_event);
    }

    fn drain<F>(&mut self, on_event: &mut F)
    where
        F: FnMut(&PanelEvent),
    {
        while let Ok(event) = self.events.try_recv() {
            if let PanelEvent::MessageCommitted { panel, message, .. } = &event {
                if let Err(err) = self.transcript.log_message(panel, message) {
                    warn!(error = %err, "failed to write transcript");
                }
            }
            on_event(&event);
        }
    }
}
