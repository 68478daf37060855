//! Contract with the backend wallet engine.
//!
//! The engine is an external collaborator with opaque internals: the wallet
//! layer only depends on its call/callback surface. Calls are synchronous
//! and potentially long-running (network, hardware device I/O); they are
//! only ever driven from a session's dedicated worker thread.

pub mod ops;

use verdin::{Document, Network};

/// Machine-readable classification of an engine failure. Call sites decide
/// what a given kind means for wallet state (e.g. whether a login failure
/// penalizes the attempt counter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connectivity to the backend was lost.
    Transport,
    /// The provided credentials (PIN, password) were rejected.
    AuthCredential,
    /// The session went stale and must be re-established before retrying.
    ReconnectRequired,
    /// The engine could not allocate session resources.
    EngineInit,
    /// The session was closed; no further calls are possible.
    SessionClosed,
    /// Anything the engine does not classify further.
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::AuthCredential => "auth_credential",
            Self::ReconnectRequired => "reconnect_required",
            Self::EngineInit => "engine_init",
            Self::SessionClosed => "session_closed",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub kind: ErrorKind,
    pub message: String,
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn auth_credential(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthCredential, message)
    }

    pub fn reconnect_required(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ReconnectRequired, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    pub fn engine_init(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EngineInit, message)
    }

    pub fn session_closed() -> Self {
        Self::new(ErrorKind::SessionClosed, "session is closed")
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Other, message)
    }

    /// The structured error document surfaced to callers.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert("status", "error");
        doc.insert("code", self.kind.as_str());
        doc.insert("error", self.message.clone());
        doc
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Engine error [{}]: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for EngineError {}

/// A call which stopped mid-flight because the engine needs external input
/// (a two-factor code, a device confirmation, ...) before it can proceed.
#[derive(Debug, Clone)]
pub struct PendingCall {
    /// Opaque token identifying this pending call to the engine.
    pub token: u64,
    /// What kind of input is requested, e.g. "code" or "confirmation".
    pub input_kind: String,
    /// Engine-suggested default input.
    pub default_input: Document,
}

/// Outcome of driving an engine call one step forward.
#[derive(Debug, Clone)]
pub enum CallProgress {
    Done(Document),
    NeedsInput(PendingCall),
}

/// An event pushed by the engine outside of any call.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Connectivity to the backend changed.
    Transport {
        connected: bool,
        login_required: bool,
    },
    /// A push-notification document, tagged by an "event" name.
    Notification(Document),
}

/// Factory for engine sessions.
pub trait Engine: Send + Sync {
    /// Allocate a fresh backend session. Fails with [`ErrorKind::EngineInit`]
    /// when the engine cannot allocate resources.
    fn open_session(&self) -> Result<Box<dyn EngineSession>, EngineError>;
}

/// One backend session. All methods may block; the session bridge guarantees
/// they are only invoked from the session's worker thread.
pub trait EngineSession: Send {
    /// Establish connectivity to the given network.
    fn connect(&mut self, network: &Network, proxy: &str, use_tor: bool)
        -> Result<(), EngineError>;

    /// Run the named operation to completion or to a pending-input stop.
    fn call(&mut self, op: &str, args: Document) -> Result<CallProgress, EngineError>;

    /// Feed input to a pending call, driving it one more step.
    fn resolve(&mut self, token: u64, input: Document) -> Result<CallProgress, EngineError>;

    /// Pending push events, in the order the engine produced them.
    fn drain_events(&mut self) -> Vec<EngineEvent>;

    /// Release the session. Idempotent.
    fn disconnect(&mut self);
}
