use thiserror::Error;

/// Errors raised by the recording engine.
///
/// `Configuration` and `InvalidState` are always returned synchronously to
/// the caller of the offending control call. The remaining kinds surface
/// through `RecorderEvent::RecordingFailed` once a session is running.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecorderError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("encoder error: {0}")]
    Encoder(String),

    #[error("sink write error: {0}")]
    SinkWrite(String),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl RecorderError {
    pub(crate) fn sink_io(context: &str, error: std::io::Error) -> Self {
        Self::SinkWrite(format!("{}: {}", context, error))
    }

    /// Whether this error is reported from the control call itself rather
    /// than through the event channel.
    pub fn is_synchronous(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::InvalidState(_))
    }
}

pub type RecorderResult<T> = Result<T, RecorderError>;
