//! The asynchronous handler/resolver protocol.
//!
//! A handler represents one in-flight backend operation. The backend call
//! runs on the session's worker thread; the handler itself lives on the
//! owner thread and is only ever mutated there, by applying the updates the
//! worker posts back. A call may stop zero or more times to request
//! external input (a resolver); resolving it either completes the handler
//! or raises another resolver. This keeps the orchestration layer
//! non-blocking without re-entrant call stacks.

use crate::engine::{EngineError, PendingCall};
use verdin::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub(crate) u64);

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "handler#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Created,
    Running,
    AwaitingResolution,
    Done,
    Failed,
}

impl HandlerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// An update produced by the worker thread for a given handler.
#[derive(Debug, Clone)]
pub enum HandlerUpdate {
    Done(Document),
    Failed(EngineError),
    NeedsInput(PendingCall),
}

/// The terminal or blocking outcome of applying an update. Exactly one of
/// `Completed`/`Failed` is ever produced per handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed,
    NeedsResolution,
}

/// One pending external-input requirement raised mid-handler. Consumed by
/// exactly one resolve, then discarded.
#[derive(Debug, Clone)]
pub struct Resolver {
    pub handler: HandlerId,
    pub input_kind: String,
    pub default_input: Document,
    pub(crate) token: u64,
}

/// One in-flight backend operation, tagged with the named continuation the
/// owner runs when it settles.
#[derive(Debug)]
pub struct Handler<C> {
    id: HandlerId,
    op: String,
    state: HandlerState,
    continuation: C,
    /// Resolution requests are answered with the suggested default instead
    /// of being surfaced to the consumer.
    auto_resolve: bool,
    result: Option<Document>,
    error: Option<EngineError>,
    resolver: Option<Resolver>,
}

impl<C> Handler<C> {
    pub fn new(id: HandlerId, op: impl Into<String>, continuation: C) -> Self {
        Self {
            id,
            op: op.into(),
            state: HandlerState::Created,
            continuation,
            auto_resolve: false,
            result: None,
            error: None,
            resolver: None,
        }
    }

    pub fn auto_resolving(mut self) -> Self {
        self.auto_resolve = true;
        self
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn op(&self) -> &str {
        &self.op
    }

    pub fn state(&self) -> HandlerState {
        self.state
    }

    pub fn continuation(&self) -> &C {
        &self.continuation
    }

    pub fn auto_resolves(&self) -> bool {
        self.auto_resolve
    }

    /// The result document of a `Done` handler.
    pub fn result(&self) -> Option<&Document> {
        self.result.as_ref()
    }

    /// The error of a `Failed` handler.
    pub fn error(&self) -> Option<&EngineError> {
        self.error.as_ref()
    }

    pub fn into_parts(self) -> (C, Option<Document>, Option<EngineError>) {
        (self.continuation, self.result, self.error)
    }

    /// Mark the underlying backend call as started. Called exactly once,
    /// when the operation is posted to the worker.
    pub fn mark_running(&mut self) {
        debug_assert_eq!(self.state, HandlerState::Created);
        self.state = HandlerState::Running;
    }

    /// Apply an update posted by the worker. Returns what the owner must
    /// act on, or `None` for a stray update on a settled handler.
    pub fn apply(&mut self, update: HandlerUpdate) -> Option<Outcome> {
        if self.state.is_terminal() {
            log::error!("{} ({}): update after terminal state", self.id, self.op);
            return None;
        }
        match update {
            HandlerUpdate::Done(result) => {
                self.state = HandlerState::Done;
                self.result = Some(result);
                Some(Outcome::Completed)
            }
            HandlerUpdate::Failed(error) => {
                self.state = HandlerState::Failed;
                self.resolver = None;
                self.error = Some(error);
                Some(Outcome::Failed)
            }
            HandlerUpdate::NeedsInput(pending) => {
                debug_assert_eq!(self.state, HandlerState::Running);
                debug_assert!(self.resolver.is_none(), "at most one outstanding resolver");
                self.state = HandlerState::AwaitingResolution;
                self.resolver = Some(Resolver {
                    handler: self.id,
                    input_kind: pending.input_kind,
                    default_input: pending.default_input,
                    token: pending.token,
                });
                Some(Outcome::NeedsResolution)
            }
        }
    }

    /// The outstanding resolver, if the handler is awaiting resolution.
    pub fn resolver(&self) -> Option<&Resolver> {
        self.resolver.as_ref()
    }

    /// Consume the outstanding resolver, moving the handler back to
    /// `Running` while the worker drives the call further.
    pub fn take_resolver(&mut self) -> Option<Resolver> {
        let resolver = self.resolver.take()?;
        debug_assert_eq!(self.state, HandlerState::AwaitingResolution);
        self.state = HandlerState::Running;
        Some(resolver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ErrorKind;

    fn pending(token: u64) -> PendingCall {
        PendingCall {
            token,
            input_kind: "code".to_string(),
            default_input: Document::new(),
        }
    }

    #[test]
    fn runs_to_done_exactly_once() {
        let mut h: Handler<()> = Handler::new(HandlerId(1), "login", ());
        assert_eq!(h.state(), HandlerState::Created);
        h.mark_running();
        assert_eq!(h.state(), HandlerState::Running);
        assert_eq!(
            h.apply(HandlerUpdate::Done(Document::new())),
            Some(Outcome::Completed)
        );
        assert_eq!(h.state(), HandlerState::Done);
        // A stray late update must not produce a second terminal outcome.
        assert_eq!(h.apply(HandlerUpdate::Done(Document::new())), None);
        assert_eq!(
            h.apply(HandlerUpdate::Failed(EngineError::other("late"))),
            None
        );
    }

    #[test]
    fn resolution_rounds_then_done() {
        let mut h: Handler<()> = Handler::new(HandlerId(2), "login", ());
        h.mark_running();

        // First round: the engine asks for input.
        assert_eq!(
            h.apply(HandlerUpdate::NeedsInput(pending(7))),
            Some(Outcome::NeedsResolution)
        );
        assert_eq!(h.state(), HandlerState::AwaitingResolution);
        let resolver = h.take_resolver().unwrap();
        assert_eq!(resolver.token, 7);
        assert_eq!(h.state(), HandlerState::Running);
        // The resolver was consumed; there is no second one.
        assert!(h.take_resolver().is_none());

        // Second round: resolving raised another resolver.
        assert_eq!(
            h.apply(HandlerUpdate::NeedsInput(pending(8))),
            Some(Outcome::NeedsResolution)
        );
        h.take_resolver().unwrap();

        // Finally the call completes: exactly one terminal outcome.
        assert_eq!(
            h.apply(HandlerUpdate::Done(Document::new())),
            Some(Outcome::Completed)
        );
        assert!(h.result().is_some());
    }

    #[test]
    fn failure_while_awaiting_resolution() {
        let mut h: Handler<()> = Handler::new(HandlerId(3), "login", ());
        h.mark_running();
        h.apply(HandlerUpdate::NeedsInput(pending(1)));
        assert_eq!(
            h.apply(HandlerUpdate::Failed(EngineError::transport("lost"))),
            Some(Outcome::Failed)
        );
        assert_eq!(h.state(), HandlerState::Failed);
        assert_eq!(h.error().unwrap().kind, ErrorKind::Transport);
        // The pending resolver was discarded with the failure.
        assert!(h.take_resolver().is_none());
    }
}
