use thiserror::Error;

#[derive(Error, Debug)]
pub enum NestwatchError {
    /// Rejected synchronously, before any side effect (bad trigger
    /// input, SSRF-blocked URL, duplicate slug).
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0} not found: {1}")]
    NotFound(&'static str, String),

    #[error("Authorization error: {0}")]
    Authorization(String),

    /// Per-listing normalization or enrichment failure. Logged and
    /// skipped; never aborts the batch.
    #[error("Ingestion error: {0}")]
    Ingestion(String),

    /// Unhandled orchestration failure; the job is marked failed with
    /// this message captured.
    #[error("Job failure: {0}")]
    JobFailure(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, NestwatchError>;
