use thiserror::Error;

#[derive(Error, Debug)]
pub enum PressroomError {
    #[error("Source fetch error for {url}: {reason}")]
    SourceFetch { url: String, reason: String },

    #[error("Generation returned no headline for {url}")]
    MissingHeadline { url: String },

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Translation error: {0}")]
    Translation(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(uuid::Uuid),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
