use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing_subscriber::EnvFilter;

use crate::core::ids::PanelId;
use crate::core::message::{Message, Role};

/// Install the stderr diagnostics subscriber.
///
/// `RUST_LOG` wins over `default_level` when it is set and valid.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

/// Plain-text transcript of every committed message, appended as it happens.
pub struct TranscriptLog {
    file_path: Option<PathBuf>,
}

impl TranscriptLog {
    pub fn new(file_path: Option<PathBuf>) -> io::Result<Self> {
        if let Some(path) = &file_path {
            test_file_access(path)?;
        }
        Ok(Self { file_path })
    }

    pub fn disabled() -> Self {
        Self { file_path: None }
    }

    pub fn is_active(&self) -> bool {
        self.file_path.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn log_message(&self, panel: &PanelId, message: &Message) -> io::Result<()> {
        let Some(path) = &self.file_path else {
            return Ok(());
        };
        if message.content().is_empty() {
            return Ok(());
        }

        let text = match message.role() {
            Role::User => format!("[{panel}] You: {}", message.content()),
            Role::Assistant => format!("[{panel}] {}", message.content()),
            Role::Error => format!("[{panel}] ## {}", message.content()),
        };

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::with_capacity(64 * 1024, file);
        for line in text.lines() {
            writeln!(writer, "{line}")?;
        }
        // Blank line between messages.
        writeln!(writer)?;
        writer.flush()
    }
}

fn test_file_access(path: &Path) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.flush()
}
