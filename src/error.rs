use thiserror::Error;

/// Coarse classification of every failure the protocol core can surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed point or scalar bytes.
    BadEncoding,
    /// Zero or out-of-range secret exponent.
    InvalidSecret,
    /// Local store is missing an expected listing, bid or hop secret.
    SecretsUnavailable,
    /// Recomputed public inputs disagree with what a proof or status carries.
    ProofInputMismatch,
    /// On-chain record no longer matches the state a flow was started against.
    StaleState,
    /// Network or provider error. Retried by the caller, never inside the core.
    ExternalFailure,
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("bad encoding: {0}")]
    BadEncoding(String),

    #[error("invalid secret: {0}")]
    InvalidSecret(String),

    #[error("secrets unavailable for {role} token {token}")]
    SecretsUnavailable { role: &'static str, token: String },

    #[error("proof input mismatch: {0}")]
    ProofInputMismatch(String),

    #[error("stale state: {0}")]
    StaleState(String),

    #[error("external failure: {0}")]
    ExternalFailure(String),

    #[error("secret store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadEncoding(_) => ErrorKind::BadEncoding,
            Self::InvalidSecret(_) => ErrorKind::InvalidSecret,
            Self::SecretsUnavailable { .. } => ErrorKind::SecretsUnavailable,
            Self::ProofInputMismatch(_) => ErrorKind::ProofInputMismatch,
            Self::StaleState(_) => ErrorKind::StaleState,
            // A store that cannot be read is indistinguishable from a missing
            // secret for the caller, but retrying may succeed.
            Self::ExternalFailure(_) | Self::Io(_) => ErrorKind::ExternalFailure,
        }
    }

    /// Whether the caller may retry the same step without restarting the flow.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::ExternalFailure
    }

    pub fn bad_encoding(msg: impl Into<String>) -> Self {
        Self::BadEncoding(msg.into())
    }

    pub fn invalid_secret(msg: impl Into<String>) -> Self {
        Self::InvalidSecret(msg.into())
    }

    pub fn mismatch(msg: impl Into<String>) -> Self {
        Self::ProofInputMismatch(msg.into())
    }

    pub fn stale(msg: impl Into<String>) -> Self {
        Self::StaleState(msg.into())
    }

    pub fn external(msg: impl Into<String>) -> Self {
        Self::ExternalFailure(msg.into())
    }

    pub fn unavailable(role: &'static str, token: impl Into<String>) -> Self {
        Self::SecretsUnavailable {
            role,
            token: token.into(),
        }
    }
}

pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_retryable() {
        let err = ProtocolError::from(std::io::Error::new(
            std::io::ErrorKind::Interrupted,
            "disk busy",
        ));
        assert_eq!(err.kind(), ErrorKind::ExternalFailure);
        assert!(err.is_retryable());
    }

    #[test]
    fn missing_secrets_are_terminal() {
        let err = ProtocolError::unavailable("hop", "ab".repeat(32));
        assert_eq!(err.kind(), ErrorKind::SecretsUnavailable);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("hop token"));
    }
}
