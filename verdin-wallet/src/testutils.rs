//! Test helpers: a scriptable in-memory engine and a deterministic
//! event pump for the session worker.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::engine::{
    CallProgress, Engine, EngineError, EngineEvent, EngineSession, PendingCall,
};
use crate::wallet::{Wallet, WalletEvent};
use verdin::{Document, Network};

/// One step of a scripted operation. An operation script is a sequence
/// of steps: each `NeedInput` stops the call on a resolver, the next
/// step is consumed by the matching resolve.
#[derive(Debug, Clone)]
pub enum ScriptedStep {
    Done(Document),
    Fail(EngineError),
    NeedInput { kind: String, default: Document },
    /// Block the worker thread for this long before the next step, to
    /// simulate a slow engine call.
    Stall(std::time::Duration),
}

#[derive(Default)]
struct State {
    /// Per op name, a queue of invocation scripts. Each call pops one.
    scripts: HashMap<String, VecDeque<VecDeque<ScriptedStep>>>,
    /// Remaining steps of calls stopped on a resolver, by token.
    pending: HashMap<u64, VecDeque<ScriptedStep>>,
    queued_events: Vec<EngineEvent>,
    calls: Vec<(String, Document)>,
    fail_open: Option<EngineError>,
    fail_connect: VecDeque<EngineError>,
    next_token: u64,
}

/// An in-memory engine whose operations are scripted per test. Any
/// unscripted operation completes with an empty document.
#[derive(Clone, Default)]
pub struct FakeEngine {
    inner: Arc<Mutex<State>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        match self.inner.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Script a full multi-step invocation of `op`.
    pub fn script(&self, op: &str, steps: Vec<ScriptedStep>) {
        self.lock()
            .scripts
            .entry(op.to_string())
            .or_default()
            .push_back(steps.into());
    }

    /// Script the next invocation of `op` to complete with `result`.
    pub fn respond(&self, op: &str, result: Document) {
        self.script(op, vec![ScriptedStep::Done(result)]);
    }

    /// Script the next invocation of `op` to fail.
    pub fn fail(&self, op: &str, error: EngineError) {
        self.script(op, vec![ScriptedStep::Fail(error)]);
    }

    /// Make the next session's network connect fail.
    pub fn fail_connect(&self, error: EngineError) {
        self.lock().fail_connect.push_back(error);
    }

    /// Make `open_session` fail.
    pub fn fail_open(&self, error: EngineError) {
        self.lock().fail_open = Some(error);
    }

    /// Queue a push event for the next worker drain.
    pub fn push_event(&self, event: EngineEvent) {
        self.lock().queued_events.push(event);
    }

    pub fn push_notification(&self, data: Document) {
        self.push_event(EngineEvent::Notification(data));
    }

    /// Names of every operation called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.iter().map(|(op, _)| op.clone()).collect()
    }

    /// The argument documents of every call to `op`, in order.
    pub fn call_args(&self, op: &str) -> Vec<Document> {
        self.lock()
            .calls
            .iter()
            .filter(|(name, _)| name == op)
            .map(|(_, args)| args.clone())
            .collect()
    }
}

impl Engine for FakeEngine {
    fn open_session(&self) -> Result<Box<dyn EngineSession>, EngineError> {
        if let Some(error) = self.lock().fail_open.take() {
            return Err(error);
        }
        Ok(Box::new(FakeSession {
            engine: self.clone(),
        }))
    }
}

struct FakeSession {
    engine: FakeEngine,
}

impl FakeSession {
    fn run_steps(
        &self,
        state: &mut State,
        mut steps: VecDeque<ScriptedStep>,
    ) -> Result<CallProgress, EngineError> {
        match steps.pop_front() {
            None => Ok(CallProgress::Done(Document::new())),
            Some(ScriptedStep::Done(result)) => Ok(CallProgress::Done(result)),
            Some(ScriptedStep::Fail(error)) => Err(error),
            Some(ScriptedStep::Stall(duration)) => {
                std::thread::sleep(duration);
                self.run_steps(state, steps)
            }
            Some(ScriptedStep::NeedInput { kind, default }) => {
                state.next_token += 1;
                let token = state.next_token;
                state.pending.insert(token, steps);
                Ok(CallProgress::NeedsInput(PendingCall {
                    token,
                    input_kind: kind,
                    default_input: default,
                }))
            }
        }
    }
}

impl EngineSession for FakeSession {
    fn connect(
        &mut self,
        _network: &Network,
        _proxy: &str,
        _use_tor: bool,
    ) -> Result<(), EngineError> {
        let mut state = self.engine.lock();
        state.calls.push(("connect".to_string(), Document::new()));
        match state.fail_connect.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn call(&mut self, op: &str, args: Document) -> Result<CallProgress, EngineError> {
        let mut state = self.engine.lock();
        state.calls.push((op.to_string(), args));
        let steps = state
            .scripts
            .get_mut(op)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_default();
        self.run_steps(&mut *state, steps)
    }

    fn resolve(&mut self, token: u64, input: Document) -> Result<CallProgress, EngineError> {
        let mut state = self.engine.lock();
        state.calls.push(("resolve".to_string(), input));
        let steps = state
            .pending
            .remove(&token)
            .ok_or_else(|| EngineError::other(format!("unknown resolution token {}", token)))?;
        self.run_steps(&mut *state, steps)
    }

    fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.engine.lock().queued_events)
    }

    fn disconnect(&mut self) {
        self.engine
            .lock()
            .calls
            .push(("disconnect".to_string(), Document::new()));
    }
}

/// Pump a wallet until it settles: flush the worker queue and fold its
/// events in, repeatedly, collecting every wallet event produced.
/// Bounded, so a wallet stuck in a posting loop fails the test instead
/// of hanging it.
pub fn settle(wallet: &mut Wallet) -> Vec<WalletEvent> {
    let mut collected = Vec::new();
    for _ in 0..32 {
        if wallet.flush_session().is_err() {
            // Session already closed; fold in whatever is left.
            collected.extend(wallet.process_pending());
            break;
        }
        let events = wallet.process_pending();
        if events.is_empty() {
            break;
        }
        collected.extend(events);
    }
    collected
}
