//! Export a panel's saved conversations without contacting the server.

use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::core::config::data::path_display;
use crate::core::config::Config;
use crate::core::export::{export_conversation, export_conversations, write_export};
use crate::core::ids::PanelId;
use crate::core::persistence::{JsonFileStore, PanelStore};

pub fn run_export(
    config: &Config,
    panel: usize,
    all: bool,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let store = JsonFileStore::new(config.resolved_data_dir()?);
    let text = render_saved_panel(&store, &PanelId::numbered(panel), all)?;

    match output {
        Some(path) => {
            write_export(&path, &text)?;
            eprintln!("✅ Exported to {}", path_display(&path));
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn render_saved_panel(
    store: &JsonFileStore,
    panel: &PanelId,
    all: bool,
) -> Result<String, Box<dyn Error>> {
    render_panel(store, panel, all)
        .map_err(|err| format!("{err} in {}", path_display(store.dir())).into())
}

fn render_panel(
    store: &dyn PanelStore,
    panel: &PanelId,
    all: bool,
) -> Result<String, Box<dyn Error>> {
    let Some(snapshot) = store.load(panel)? else {
        return Err(format!("no saved state for {panel}").into());
    };
    let conversations = snapshot.conversation_store();
    Ok(if all {
        export_conversations(conversations.iter())
    } else {
        export_conversation(conversations.active())
    })
}
