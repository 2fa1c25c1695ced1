use thiserror::Error;

/// Failures surfaced by the application store and its persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Application #{0} not found")]
    NotFound(String),

    #[error("Import failed: {0}")]
    Import(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum CoverLetterError {
    #[error("Profile incomplete: set a name and API key with 'apptrack profile set'")]
    MissingProfile,

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("Password must be at least {0} characters")]
    TooShort(usize),

    #[error("Passwords do not match")]
    Mismatch,

    #[error("Incorrect password")]
    Incorrect,

    #[error("No password set. Run 'apptrack gate set' first.")]
    NotConfigured,

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}
