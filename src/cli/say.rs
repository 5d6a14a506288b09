//! TUI-less "say" command

use std::error::Error;
use std::io::{self, Write};

use crate::cli::session::CliSession;
use crate::core::config::Config;
use crate::core::ids::PanelId;
use crate::core::message::Role;
use crate::core::session::PanelEvent;
use crate::utils::logging::TranscriptLog;

pub async fn run_say(
    config: &Config,
    transcript: TranscriptLog,
    model: Option<String>,
    fresh: bool,
    prompt: Vec<String>,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        return Err("Usage: allm say <prompt>".into());
    }

    let mut session = CliSession::open(config, 1, transcript)?;
    let panel = PanelId::numbered(1);
    let orchestrator = session.orchestrator();

    orchestrator.refresh_models().await?;
    if orchestrator.models().is_empty() {
        return Err("No models are loaded on the server. Load one and try again.".into());
    }
    if let Some(model) = model {
        orchestrator.select_model(&panel, &model)?;
    }
    if fresh {
        orchestrator.new_conversation(&panel)?;
    }
    orchestrator.submit(&panel, &prompt)?;

    let mut echo = LiveEcho::default();
    let mut failed = false;
    session
        .run(|event| {
            if let Err(err) = echo.handle(event, &mut io::stdout()) {
                tracing::debug!(error = %err, "stdout write failed");
            }
            if let PanelEvent::MessageCommitted { message, .. } = event {
                if message.role() == Role::Error {
                    eprintln!("❌ Error: {}", message.content());
                    failed = true;
                }
            }
        })
        .await;

    if failed {
        return Err("the server did not produce a reply".into());
    }
    Ok(())
}

/// Prints live text as it grows, then whatever the committed reply adds.
#[derive(Default)]
struct LiveEcho {
    shown: String,
}

impl LiveEcho {
    fn handle(&mut self, event: &PanelEvent, out: &mut impl Write) -> io::Result<()> {
        match event {
            PanelEvent::StreamingUpdate { text, .. } if !text.is_empty() => {
                self.print_from(text, out)?;
                self.shown.clone_from(text);
                out.flush()
            }
            PanelEvent::MessageCommitted { message, .. } if message.role() == Role::Assistant => {
                self.print_from(message.content(), out)?;
                self.shown.clear();
                writeln!(out)?;
                out.flush()
            }
            _ => Ok(()),
        }
    }

    fn print_from(&self, text: &str, out: &mut impl Write) -> io::Result<()> {
        match text.strip_prefix(self.shown.as_str()) {
            Some(rest) => write!(out, "{rest}"),
            None => write!(out, "\n{text}"),
        }
    }
}
