use crate::config::ConfigError;
use crate::engine::EngineError;
use crate::registry::record::RecordError;
use verdin::DocumentError;

#[derive(Debug)]
pub enum Error {
    Engine(EngineError),
    Record(RecordError),
    Config(ConfigError),
    Document(DocumentError),
    /// The operation needs a connected session.
    NotConnected,
    /// All PIN attempts have been consumed; the record is locked out.
    NoAttemptsRemaining,
    /// The wallet has no stored PIN data.
    PinNotSet,
    Unexpected(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Engine(e) => write!(f, "Backend error: {}", e),
            Self::Record(e) => write!(f, "Wallet record error: {}", e),
            Self::Config(e) => write!(f, "Configuration error: {}", e),
            Self::Document(e) => write!(f, "Malformed backend data: {}", e),
            Self::NotConnected => write!(f, "Wallet is not connected"),
            Self::NoAttemptsRemaining => write!(f, "No PIN attempts remaining"),
            Self::PinNotSet => write!(f, "No PIN data stored for this wallet"),
            Self::Unexpected(msg) => write!(f, "Unexpected error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<EngineError> for Error {
    fn from(e: EngineError) -> Self {
        Self::Engine(e)
    }
}

impl From<RecordError> for Error {
    fn from(e: RecordError) -> Self {
        Self::Record(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<DocumentError> for Error {
    fn from(e: DocumentError) -> Self {
        Self::Document(e)
    }
}
