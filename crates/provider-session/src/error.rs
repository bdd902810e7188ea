use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider transport error: {0}")]
    Transport(String),
    #[error("provider session is not in a state that allows this operation")]
    InvalidState,
    #[error("provider protocol error: {0}")]
    Protocol(String),
    #[error("provider session already closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_name_the_offending_detail() {
        let err = ProviderError::Transport("connection reset".into());
        assert_eq!(err.to_string(), "provider transport error: connection reset");

        let err = ProviderError::Protocol("unsolicited call_id".into());
        assert_eq!(err.to_string(), "provider protocol error: unsolicited call_id");
    }
}
