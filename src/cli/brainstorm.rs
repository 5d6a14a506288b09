//! Brainstorm mode: panel-1 answers the prompt and every finished reply is
//! relayed to the other panels until the hop limit is reached.

use std::error::Error;

use crate::cli::session::CliSession;
use crate::core::config::Config;
use crate::core::message::Role;
use crate::core::relay::{IterationLimit, RelaySettings};
use crate::core::session::PanelEvent;
use crate::utils::logging::TranscriptLog;

pub async fn run_brainstorm(
    config: &Config,
    transcript: TranscriptLog,
    iterations: Option<IterationLimit>,
    panels: Option<usize>,
    prompt: Vec<String>,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        return Err("Usage: allm brainstorm <prompt>".into());
    }

    let panel_count = panels.unwrap_or(config.panels).max(2);
    let limit = iterations.unwrap_or(config.brainstorm.iteration_limit);

    let mut session = CliSession::open(config, panel_count, transcript)?;
    let orchestrator = session.orchestrator();
    orchestrator.refresh_models().await?;
    if orchestrator.models().is_empty() {
        return Err("No models are loaded on the server. Load one and try again.".into());
    }

    let panel_ids = orchestrator.panel_ids();
    for panel in &panel_ids {
        orchestrator.new_conversation(panel)?;
        orchestrator.set_relay_settings(panel, RelaySettings::enabled(limit))?;
    }
    let Some(first) = panel_ids.first() else {
        return Err("no panels available".into());
    };
    orchestrator.submit(first, &prompt)?;

    println!("🧠 Brainstorm across {panel_count} panels (iteration limit: {limit})");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    session
        .run(|event| {
            if let Some(line) = describe_event(event) {
                println!("{line}");
            }
        })
        .await;

    session.orchestrator().save_all()?;
    Ok(())
}

fn describe_event(event: &PanelEvent) -> Option<String> {
    match event {
        PanelEvent::MessageCommitted { panel, message, .. } => match message.role() {
            Role::Assistant => {
                let model = message
                    .metadata()
                    .and_then(|m| m.model_name.as_deref())
                    .unwrap_or("assistant");
                Some(format!(
                    "\n[{panel}] {model} (iteration {}):\n{}",
                    message.iteration_count(),
                    message.content()
                ))
            }
            Role::Error => Some(format!("\n[{panel}] ❌ {}", message.content())),
            Role::User => None,
        },
        PanelEvent::Relayed {
            from,
            to,
            iteration_count,
        } => Some(format!("  ↪ {from} → {to} (iteration {iteration_count})")),
        PanelEvent::StreamingUpdate { .. } | PanelEvent::ThinkingChanged { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ModelEntry;
    use crate::core::ids::{ConversationId, PanelId};
    use crate::core::message::{Message, MessageMetadata};

    fn committed(message: Message) -> PanelEvent {
        PanelEvent::MessageCommitted {
            panel: PanelId::numbered(2),
            conversation: ConversationId::new("c"),
            message,
        }
    }

    #[test]
    fn assistant_replies_show_model_and_iteration() {
        let mut metadata = MessageMetadata::for_model(&ModelEntry::from_id("org/Qwen2.5-7B-GGUF"));
        metadata.iteration_count = 2;
        let message = Message::assistant("An idea").with_metadata(metadata);

        assert_eq!(
            describe_event(&committed(message)).as_deref(),
            Some("\n[panel-2] Qwen2.5-7B (iteration 2):\nAn idea")
        );
    }

    #[test]
    fn relays_are_announced_and_prompts_skipped() {
        let relayed = PanelEvent::Relayed {
            from: PanelId::numbered(1),
            to: PanelId::numbered(2),
            iteration_count: 1,
        };
        assert_eq!(
            describe_event(&relayed).as_deref(),
            Some("  ↪ panel-1 → panel-2 (iteration 1)")
        );
        assert_eq!(describe_event(&committed(Message::user("relayed text"))), None);
    }
}
