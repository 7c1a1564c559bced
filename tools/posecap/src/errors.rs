use thiserror::Error;

#[derive(Debug, Error)]
pub enum PosecapError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("export error: {0}")]
    Export(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("driver error: {0}")]
    Driver(String),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

/// Failures of the capture lifecycle. A failed `start` always leaves the
/// controller in `Idle`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("capability unavailable: {0}")]
    Capability(String),
    #[error("session request failed: {0}")]
    SessionRequest(String),
    #[error("tracking source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("session already active (state={0})")]
    AlreadyActive(String),
    #[error("invalid capture config: {0}")]
    InvalidConfig(String),
    #[error("start cancelled before negotiation finished")]
    Cancelled,
}

impl SessionError {
    /// Stable reason category for the presentation layer.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Capability(_) => "capability",
            Self::SessionRequest(_) => "negotiation",
            Self::SourceUnavailable(_) => "source",
            Self::AlreadyActive(_) => "state",
            Self::InvalidConfig(_) => "config",
            Self::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PosecapError, SessionError};

    #[test]
    fn categories_distinguish_capability_from_negotiation() {
        assert_eq!(
            SessionError::Capability("immersive-ar".to_string()).category(),
            "capability"
        );
        assert_eq!(
            SessionError::SessionRequest("denied".to_string()).category(),
            "negotiation"
        );
        assert_eq!(
            SessionError::SourceUnavailable("ended".to_string()).category(),
            "source"
        );
    }

    #[test]
    fn session_errors_convert_into_posecap_errors() {
        let err: PosecapError = SessionError::Cancelled.into();
        assert!(matches!(err, PosecapError::Session(SessionError::Cancelled)));
        assert!(err.to_string().contains("cancelled"));
    }
}
