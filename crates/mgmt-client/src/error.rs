use thiserror::Error;

#[derive(Debug, Error)]
pub enum MgmtError {
    #[error("mgmt api transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("mgmt api returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("mgmt api response decode error: {0}")]
    Decode(#[from] serde_json::Error),
}
