use std::path::PathBuf;

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{error, warn};

use ai_client::truncate_to_char_boundary;

const SEPARATOR_WIDTH: usize = 80;

/// Error channel for model replies that could not be parsed.
///
/// Every record is emitted verbatim on the `pressroom::malformed_output`
/// target and, when a path is configured, also appended to that file followed
/// by a separator line.
#[derive(Default)]
pub struct MalformedOutputLog {
    path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl MalformedOutputLog {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub async fn record(&self, context: &str, reason: &str, raw: &str) {
        error!(
            target: "pressroom::malformed_output",
            context,
            reason,
            preview = truncate_to_char_boundary(raw, 200),
            raw = %raw,
            "Unparseable model output"
        );

        let Some(path) = &self.path else {
            return;
        };

        let entry = format!(
            "{} {context}: {reason}\n{raw}\n{}\n",
            Utc::now().to_rfc3339(),
            "=".repeat(SEPARATOR_WIDTH)
        );

        let _guard = self.write_lock.lock().await;
        let result = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            file.write_all(entry.as_bytes()).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Failed to write malformed output log");
        }
    }
}
