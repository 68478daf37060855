//! Bridge between a wallet and its backend session.
//!
//! Each connected wallet owns one dedicated worker thread which holds the
//! engine session. The owner thread never calls into the engine directly:
//! it posts messages through a channel, and the worker posts results and
//! engine events back through another. The worker wakes up at least every
//! 100ms to drain spontaneous engine events and stamp its heartbeat even
//! when no operation is in flight.

use std::sync::{
    atomic::{AtomicI64, Ordering},
    mpsc, Arc,
};
use std::thread;
use std::time::Duration;

use crate::engine::{CallProgress, Engine, EngineError, EngineEvent};
use crate::handler::{HandlerId, HandlerUpdate};
use verdin::{Document, Network};

/// How often the worker wakes up when idle.
const WORKER_IDLE_INTERVAL: Duration = Duration::from_millis(100);

/// Messages posted to the worker thread.
enum WorkerMessage {
    Connect {
        id: HandlerId,
        network: Network,
        proxy: String,
        use_tor: bool,
    },
    Invoke {
        id: HandlerId,
        op: String,
        args: Document,
    },
    Resolve {
        id: HandlerId,
        token: u64,
        input: Document,
    },
    BlockingCall {
        op: String,
        args: Document,
        reply: mpsc::SyncSender<Result<Document, EngineError>>,
    },
    Flush(mpsc::SyncSender<()>),
    Shutdown,
}

/// Events posted back to the owner thread, in the order the worker
/// produced them.
#[derive(Debug)]
pub enum SessionEvent {
    Handler {
        id: HandlerId,
        update: HandlerUpdate,
    },
    Notification(Document),
    Transport {
        connected: bool,
        login_required: bool,
    },
}

pub struct SessionBridge {
    sender: mpsc::Sender<WorkerMessage>,
    events: mpsc::Receiver<SessionEvent>,
    worker: Option<thread::JoinHandle<()>>,
    /// Last time the worker loop ran, as milliseconds since the Unix
    /// epoch. Stamped by the worker, read by the owner.
    heartbeat: Arc<AtomicI64>,
    next_handler: u64,
}

impl SessionBridge {
    /// Open a backend session and spawn the worker thread that owns it.
    pub fn open(engine: &dyn Engine) -> Result<Self, EngineError> {
        let session = engine.open_session()?;
        let (sender, worker_rx) = mpsc::channel();
        let (events_tx, events) = mpsc::channel();
        let heartbeat = Arc::new(AtomicI64::new(chrono::Utc::now().timestamp_millis()));

        let worker_heartbeat = heartbeat.clone();
        let worker = thread::Builder::new()
            .name("wallet session worker".to_string())
            .spawn(move || worker_loop(session, worker_rx, events_tx, worker_heartbeat))
            .map_err(|e| EngineError::engine_init(format!("spawning worker thread: {}", e)))?;

        Ok(Self {
            sender,
            events,
            worker: Some(worker),
            heartbeat,
            next_handler: 0,
        })
    }

    fn fresh_id(&mut self) -> HandlerId {
        self.next_handler += 1;
        HandlerId(self.next_handler)
    }

    fn post(&self, message: WorkerMessage) -> Result<(), EngineError> {
        self.sender
            .send(message)
            .map_err(|_| EngineError::session_closed())
    }

    /// Post the network connection to the worker. Completion is reported
    /// through a handler update like any other operation.
    pub fn connect(
        &mut self,
        network: Network,
        proxy: String,
        use_tor: bool,
    ) -> Result<HandlerId, EngineError> {
        let id = self.fresh_id();
        self.post(WorkerMessage::Connect {
            id,
            network,
            proxy,
            use_tor,
        })?;
        Ok(id)
    }

    /// Start a backend operation. The returned id tracks its updates.
    pub fn invoke(&mut self, op: &str, args: Document) -> Result<HandlerId, EngineError> {
        let id = self.fresh_id();
        self.post(WorkerMessage::Invoke {
            id,
            op: op.to_string(),
            args,
        })?;
        Ok(id)
    }

    /// Feed external input into a call stopped on a resolver.
    pub fn resolve(
        &mut self,
        id: HandlerId,
        token: u64,
        input: Document,
    ) -> Result<(), EngineError> {
        self.post(WorkerMessage::Resolve { id, token, input })
    }

    /// Run an operation on the worker and block until it completes. Only
    /// for operations that never raise resolvers.
    pub fn blocking_call(&self, op: &str, args: Document) -> Result<Document, EngineError> {
        let (reply, result) = mpsc::sync_channel(0);
        self.post(WorkerMessage::BlockingCall {
            op: op.to_string(),
            args,
            reply,
        })?;
        result.recv().map_err(|_| EngineError::session_closed())?
    }

    /// Block until the worker has processed every message posted before
    /// this one. Events for those messages are then available to
    /// [`try_recv_event`](Self::try_recv_event).
    pub fn flush(&self) -> Result<(), EngineError> {
        let (reply, done) = mpsc::sync_channel(0);
        self.post(WorkerMessage::Flush(reply))?;
        done.recv().map_err(|_| EngineError::session_closed())
    }

    /// Next pending event, if any. Never blocks.
    pub fn try_recv_event(&self) -> Option<SessionEvent> {
        self.events.try_recv().ok()
    }

    /// Last worker loop iteration, in milliseconds since the Unix epoch.
    pub fn heartbeat_ms(&self) -> i64 {
        self.heartbeat.load(Ordering::Relaxed)
    }

    /// Shut the session down and join the worker thread.
    pub fn close(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        // A send error means the worker already exited.
        let _ = self.sender.send(WorkerMessage::Shutdown);
        if worker.join().is_err() {
            log::error!("session worker thread panicked");
        }
    }
}

impl Drop for SessionBridge {
    fn drop(&mut self) {
        self.close();
    }
}

fn worker_loop(
    mut session: Box<dyn crate::engine::EngineSession>,
    rx: mpsc::Receiver<WorkerMessage>,
    events: mpsc::Sender<SessionEvent>,
    heartbeat: Arc<AtomicI64>,
) {
    loop {
        let message = rx.recv_timeout(WORKER_IDLE_INTERVAL);
        heartbeat.store(chrono::Utc::now().timestamp_millis(), Ordering::Relaxed);

        let mut owner_gone = false;
        for event in session.drain_events() {
            let forwarded = match event {
                EngineEvent::Notification(doc) => SessionEvent::Notification(doc),
                EngineEvent::Transport {
                    connected,
                    login_required,
                } => SessionEvent::Transport {
                    connected,
                    login_required,
                },
            };
            if events.send(forwarded).is_err() {
                owner_gone = true;
                break;
            }
        }
        if owner_gone {
            break;
        }

        let message = match message {
            Ok(message) => message,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        };

        match message {
            WorkerMessage::Connect {
                id,
                network,
                proxy,
                use_tor,
            } => {
                let update = match session.connect(&network, &proxy, use_tor) {
                    Ok(()) => HandlerUpdate::Done(Document::new()),
                    Err(e) => HandlerUpdate::Failed(e),
                };
                if events.send(SessionEvent::Handler { id, update }).is_err() {
                    break;
                }
            }
            WorkerMessage::Invoke { id, op, args } => {
                let update = progress_to_update(session.call(&op, args));
                if events.send(SessionEvent::Handler { id, update }).is_err() {
                    break;
                }
            }
            WorkerMessage::Resolve { id, token, input } => {
                let update = progress_to_update(session.resolve(token, input));
                if events.send(SessionEvent::Handler { id, update }).is_err() {
                    break;
                }
            }
            WorkerMessage::BlockingCall { op, args, reply } => {
                let result = match session.call(&op, args) {
                    Ok(CallProgress::Done(doc)) => Ok(doc),
                    Ok(CallProgress::NeedsInput(pending)) => Err(EngineError::other(format!(
                        "operation '{}' requested '{}' input in a blocking call",
                        op, pending.input_kind
                    ))),
                    Err(e) => Err(e),
                };
                // The caller may have given up waiting.
                let _ = reply.send(result);
            }
            WorkerMessage::Flush(reply) => {
                let _ = reply.send(());
            }
            WorkerMessage::Shutdown => break,
        }
    }
    session.disconnect();
}

fn progress_to_update(progress: Result<CallProgress, EngineError>) -> HandlerUpdate {
    match progress {
        Ok(CallProgress::Done(doc)) => HandlerUpdate::Done(doc),
        Ok(CallProgress::NeedsInput(pending)) => HandlerUpdate::NeedsInput(pending),
        Err(e) => HandlerUpdate::Failed(e),
    }
}
