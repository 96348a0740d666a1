use thiserror::Error;

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Submission error: {0}")]
    Submission(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Failed to open event feed {url}: {source}")]
    FeedConnect {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Correlation key already present in ledger: {0}")]
    DuplicateKey(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Task error: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, BenchError>;
