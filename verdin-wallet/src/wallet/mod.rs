//! The wallet state machine.
//!
//! A wallet tracks two orthogonal machines, connection and
//! authentication, and owns the session bridge plus every in-flight
//! handler. All wallet methods run on the owner thread; backend work is
//! posted to the session worker and its results are folded back in by
//! [`process_pending`](Wallet::process_pending), which the owner calls
//! from its event loop.

pub mod account;
mod notifications;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::datadir::DataDirectory;
use crate::engine::{ops, Engine, EngineError, ErrorKind};
use crate::error::Error;
use crate::handler::{Handler, HandlerId, Outcome};
use crate::registry::record::WalletRecord;
use crate::session::{SessionBridge, SessionEvent};
use account::{Account, Asset};
use verdin::{Document, DocumentError, Network};

pub const MAX_LOGIN_ATTEMPTS: u8 = 3;

/// How stale the worker heartbeat may get before the wallet reports
/// itself busy.
const BUSY_THRESHOLD_MS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticationStatus {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

/// The named next step a handler runs when it settles. Chained flows are
/// sequences of these, each step posting the next operation.
#[derive(Debug, Clone)]
enum Continuation {
    Connected,
    LoggedInWithPin,
    LoggedIn,
    SignupRegistered {
        mnemonic: String,
        password: String,
        pin: String,
    },
    SignupLoggedIn {
        pin: String,
    },
    SignupPinSet,
    PinUpdated,
    SettingsLoaded,
    CurrenciesLoaded,
    ConfigLoaded,
    SubaccountsLoaded,
    AssetsRefreshed,
}

/// State changes surfaced to the wallet's consumer, in occurrence order.
#[derive(Debug, Clone, PartialEq)]
pub enum WalletEvent {
    ConnectionChanged(ConnectionStatus),
    AuthenticationChanged(AuthenticationStatus),
    LoginAttemptsChanged(u8),
    /// All PIN attempts consumed; the wallet was forced to disconnect.
    LockedOut,
    LoginError(EngineError),
    OperationFailed {
        op: String,
        error: EngineError,
    },
    PinSet,
    AccountsChanged,
    AssetsChanged,
    SettingsChanged,
    ConfigChanged,
    /// A notification payload was accumulated under this event name.
    EventsUpdated(String),
    LockedChanged(bool),
    BusyChanged(bool),
    /// A handler stopped on a resolver and needs external input fed to
    /// [`resolve`](Wallet::resolve).
    ResolutionRequested {
        handler: HandlerId,
        input_kind: String,
        default_input: Document,
    },
    Notification {
        event: String,
        data: Document,
    },
}

pub struct Wallet {
    id: String,
    name: String,
    network: Network,
    connection: ConnectionStatus,
    authentication: AuthenticationStatus,
    login_attempts_remaining: u8,
    /// Server-encrypted PIN data blob; empty until a PIN is set.
    pin_data: Vec<u8>,
    proxy: String,
    use_tor: bool,
    /// Set by a two-factor reset notification.
    locked: bool,
    busy: bool,
    /// Hardware-device-backed wallets are never idle-locked.
    hardware_backed: bool,
    settings: Document,
    config: Document,
    currencies: Document,
    /// Latest payload of every notification, keyed by event name.
    events: Document,
    accounts: BTreeMap<u32, Account>,
    assets: BTreeMap<String, Asset>,
    session: Option<SessionBridge>,
    handlers: HashMap<HandlerId, Handler<Continuation>>,
    engine: Arc<dyn Engine>,
    data_dir: DataDirectory,
    idle_deadline: Option<Instant>,
    /// Minutes of inactivity before auto-lock, from settings. Zero
    /// disables the timer.
    altimeout: u64,
    /// True once the first settings notification arrived; gates busy
    /// heartbeat tracking.
    seen_settings: bool,
    pending_events: Vec<WalletEvent>,
}

impl Wallet {
    pub fn new(engine: Arc<dyn Engine>, data_dir: DataDirectory, network: Network) -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            network,
            connection: ConnectionStatus::Disconnected,
            authentication: AuthenticationStatus::Unauthenticated,
            login_attempts_remaining: MAX_LOGIN_ATTEMPTS,
            pin_data: Vec::new(),
            proxy: String::new(),
            use_tor: false,
            locked: false,
            busy: false,
            hardware_backed: false,
            settings: Document::new(),
            config: Document::new(),
            currencies: Document::new(),
            events: Document::new(),
            accounts: BTreeMap::new(),
            assets: BTreeMap::new(),
            session: None,
            handlers: HashMap::new(),
            engine,
            data_dir,
            idle_deadline: None,
            altimeout: 0,
            seen_settings: false,
            pending_events: Vec::new(),
        }
    }

    /// Reconstruct an unconnected wallet from its persisted record.
    pub fn from_record(
        engine: Arc<dyn Engine>,
        data_dir: DataDirectory,
        network: Network,
        record: &WalletRecord,
    ) -> Result<Self, Error> {
        let pin_data = record.pin_data_bytes()?;
        let mut wallet = Self::new(engine, data_dir, network);
        wallet.id = record.id.clone();
        wallet.name = record.name.clone();
        wallet.login_attempts_remaining = record.login_attempts_remaining;
        wallet.pin_data = pin_data;
        wallet.proxy = record.proxy.clone();
        wallet.use_tor = record.use_tor;
        Ok(wallet)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_hardware_backed(mut self) -> Self {
        self.hardware_backed = true;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn assign_id(&mut self, id: String) {
        debug_assert!(self.id.is_empty());
        self.id = id;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.persist();
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn connection(&self) -> ConnectionStatus {
        self.connection
    }

    pub fn authentication(&self) -> AuthenticationStatus {
        self.authentication
    }

    pub fn login_attempts_remaining(&self) -> u8 {
        self.login_attempts_remaining
    }

    pub fn has_pin_data(&self) -> bool {
        !self.pin_data.is_empty()
    }

    pub fn proxy(&self) -> &str {
        &self.proxy
    }

    pub fn use_tor(&self) -> bool {
        self.use_tor
    }

    pub fn locked(&self) -> bool {
        self.locked
    }

    pub fn busy(&self) -> bool {
        self.busy
    }

    pub fn settings(&self) -> &Document {
        &self.settings
    }

    pub fn config(&self) -> &Document {
        &self.config
    }

    pub fn currencies(&self) -> &Document {
        &self.currencies
    }

    /// Latest payload of every notification received, keyed by event
    /// name.
    pub fn events(&self) -> &Document {
        &self.events
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn account(&self, pointer: u32) -> Option<&Account> {
        self.accounts.get(&pointer)
    }

    pub fn assets(&self) -> impl Iterator<Item = &Asset> {
        self.assets.values()
    }

    pub fn asset(&self, id: &str) -> Option<&Asset> {
        self.assets.get(self.network.canonical_asset_id(id))
    }

    pub fn record(&self) -> WalletRecord {
        WalletRecord {
            version: crate::registry::record::RECORD_VERSION,
            id: self.id.clone(),
            name: self.name.clone(),
            network: self.network.id.clone(),
            login_attempts_remaining: self.login_attempts_remaining,
            pin_data: WalletRecord::encode_pin_data(&self.pin_data),
            proxy: self.proxy.clone(),
            use_tor: self.use_tor,
        }
    }

    /// Write the wallet record out, if the wallet has been registered.
    /// Failures are logged; a missed write must never abort a login or
    /// signup mid-flow.
    fn persist(&self) {
        if self.id.is_empty() {
            return;
        }
        if let Err(e) = self.record().save(&self.data_dir) {
            log::error!("Writing record for wallet '{}': {}", self.id, e);
        }
    }

    fn emit(&mut self, event: WalletEvent) {
        self.pending_events.push(event);
    }

    fn set_connection(&mut self, status: ConnectionStatus) {
        if self.connection != status {
            log::debug!("Wallet '{}' connection: {:?}", self.name, status);
            self.connection = status;
            self.emit(WalletEvent::ConnectionChanged(status));
        }
    }

    fn set_authentication(&mut self, status: AuthenticationStatus) {
        if self.authentication != status {
            log::debug!("Wallet '{}' authentication: {:?}", self.name, status);
            self.authentication = status;
            self.emit(WalletEvent::AuthenticationChanged(status));
            if status == AuthenticationStatus::Authenticated {
                self.arm_idle_timer();
            }
        }
    }

    pub(crate) fn set_locked(&mut self, locked: bool) {
        if self.locked != locked {
            self.locked = locked;
            self.emit(WalletEvent::LockedChanged(locked));
        }
    }

    fn set_busy(&mut self, busy: bool) {
        if self.busy != busy {
            self.busy = busy;
            self.emit(WalletEvent::BusyChanged(busy));
        }
    }

    pub(crate) fn set_settings(&mut self, settings: Document) {
        self.altimeout = settings
            .maybe_int("altimeout")
            .ok()
            .flatten()
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(0);
        self.settings = settings;
        self.seen_settings = true;
        self.arm_idle_timer();
        self.emit(WalletEvent::SettingsChanged);
    }

    // Connection lifecycle.

    /// Establish the backend connection. Idempotent when already
    /// connected with identical parameters; changed parameters on a
    /// disconnected wallet are persisted before connecting.
    pub fn connect(&mut self, proxy: &str, use_tor: bool) -> Result<(), Error> {
        if self.connection == ConnectionStatus::Connected {
            debug_assert!(
                self.proxy == proxy && self.use_tor == use_tor,
                "connect() on a connected wallet with different parameters"
            );
            return Ok(());
        }
        if self.proxy != proxy || self.use_tor != use_tor {
            self.proxy = proxy.to_string();
            self.use_tor = use_tor;
            self.persist();
        }
        self.set_connection(ConnectionStatus::Connecting);
        if let Err(e) = self.connect_now() {
            self.set_connection(ConnectionStatus::Disconnected);
            return Err(e);
        }
        Ok(())
    }

    fn connect_now(&mut self) -> Result<(), Error> {
        // A connect already in flight will report back on its own.
        if self.session.is_some()
            && self
                .handlers
                .values()
                .any(|h| matches!(h.continuation(), Continuation::Connected))
        {
            return Ok(());
        }
        if self.session.is_none() {
            self.session = Some(SessionBridge::open(self.engine.as_ref())?);
        }
        let bridge = self.session.as_mut().ok_or(Error::NotConnected)?;
        let id = bridge.connect(self.network.clone(), self.proxy.clone(), self.use_tor)?;
        let mut handler = Handler::new(id, "connect", Continuation::Connected);
        handler.mark_running();
        self.handlers.insert(id, handler);
        Ok(())
    }

    /// Tear the session down. Session-scoped state is released; every
    /// outstanding handler is surfaced as failed with `SessionClosed`,
    /// without running its continuation.
    pub fn disconnect(&mut self) {
        self.idle_deadline = None;
        self.seen_settings = false;
        self.set_busy(false);
        self.accounts.clear();
        self.assets.clear();
        self.settings = Document::new();
        self.config = Document::new();
        self.currencies = Document::new();
        self.events = Document::new();
        self.set_authentication(AuthenticationStatus::Unauthenticated);
        self.set_connection(ConnectionStatus::Disconnected);
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        for (_, handler) in self.handlers.drain().collect::<Vec<_>>() {
            self.pending_events.push(WalletEvent::OperationFailed {
                op: handler.op().to_string(),
                error: EngineError::session_closed(),
            });
        }
    }

    // Authentication flows.

    /// Authenticate with the wallet PIN against the stored `pin_data`.
    pub fn login_with_pin(&mut self, pin: &str) -> Result<(), Error> {
        if self.login_attempts_remaining == 0 {
            return Err(Error::NoAttemptsRemaining);
        }
        if self.pin_data.is_empty() {
            return Err(Error::PinNotSet);
        }
        let mut args = Document::new();
        args.insert("pin", pin);
        args.insert("pin_data", WalletRecord::encode_pin_data(&self.pin_data));
        self.invoke(ops::LOGIN_WITH_PIN, args, Continuation::LoggedInWithPin, false)?;
        self.set_authentication(AuthenticationStatus::Authenticating);
        Ok(())
    }

    /// Authenticate with a mnemonic and optional passphrase.
    pub fn login(&mut self, mnemonic: &str, password: &str) -> Result<(), Error> {
        let mut args = Document::new();
        args.insert("mnemonic", mnemonic);
        args.insert("password", password);
        self.invoke(ops::LOGIN, args, Continuation::LoggedIn, false)?;
        self.set_authentication(AuthenticationStatus::Authenticating);
        Ok(())
    }

    /// Register a new user on the backend, then log in and set a PIN.
    /// The three steps run strictly in sequence; the first failure
    /// aborts the chain.
    pub fn signup(&mut self, mnemonic: &str, password: &str, pin: &str) -> Result<(), Error> {
        let words = mnemonic.split_whitespace().count();
        debug_assert!(words == 24 || words == 27);
        let mut args = Document::new();
        args.insert("mnemonic", mnemonic);
        self.invoke(
            ops::REGISTER_USER,
            args,
            Continuation::SignupRegistered {
                mnemonic: mnemonic.to_string(),
                password: password.to_string(),
                pin: pin.to_string(),
            },
            false,
        )?;
        self.set_authentication(AuthenticationStatus::Authenticating);
        Ok(())
    }

    /// Re-derive `pin_data` for a new PIN on an authenticated session.
    pub fn change_pin(&mut self, pin: &str) -> Result<(), Error> {
        debug_assert!(!self.pin_data.is_empty());
        self.post_set_pin(pin)
    }

    /// Set a first PIN on an authenticated wallet that has none, e.g.
    /// after a mnemonic login.
    pub fn set_pin(&mut self, pin: &str) -> Result<(), Error> {
        debug_assert_eq!(self.authentication, AuthenticationStatus::Authenticated);
        debug_assert!(self.pin_data.is_empty());
        self.post_set_pin(pin)
    }

    fn post_set_pin(&mut self, pin: &str) -> Result<(), Error> {
        let mut args = Document::new();
        args.insert("pin", pin);
        self.invoke(ops::SET_PIN, args, Continuation::PinUpdated, false)?;
        Ok(())
    }

    // Session data refresh.

    /// Refetch subaccounts, then the two-factor config, refreshing the
    /// asset cache before and after on liquid networks.
    pub fn reload(&mut self) -> Result<(), Error> {
        if self.network.is_liquid() {
            self.refresh_assets(false)?;
        }
        self.invoke(
            ops::GET_SUBACCOUNTS,
            Document::new(),
            Continuation::SubaccountsLoaded,
            true,
        )?;
        Ok(())
    }

    fn refresh_assets(&mut self, refresh: bool) -> Result<(), Error> {
        let mut args = Document::new();
        args.insert("assets", true);
        args.insert("icons", true);
        args.insert("refresh", refresh);
        self.invoke(ops::REFRESH_ASSETS, args, Continuation::AssetsRefreshed, false)?;
        Ok(())
    }

    fn update_config(&mut self) -> Result<(), Error> {
        self.invoke(
            ops::GET_TWOFACTOR_CONFIG,
            Document::new(),
            Continuation::ConfigLoaded,
            false,
        )?;
        Ok(())
    }

    fn after_login(&mut self) {
        self.set_authentication(AuthenticationStatus::Authenticated);
        if let Err(e) = self.invoke(
            ops::GET_AVAILABLE_CURRENCIES,
            Document::new(),
            Continuation::CurrenciesLoaded,
            false,
        ) {
            log::warn!("Fetching currencies: {}", e);
        }
        if let Err(e) = self.invoke(
            ops::GET_SETTINGS,
            Document::new(),
            Continuation::SettingsLoaded,
            false,
        ) {
            log::warn!("Fetching settings: {}", e);
        }
        if let Err(e) = self.reload() {
            log::warn!("Reloading accounts: {}", e);
        }
    }

    /// Feed external input into the handler's outstanding resolver.
    pub fn resolve(&mut self, id: HandlerId, input: Document) -> Result<(), Error> {
        let handler = self
            .handlers
            .get_mut(&id)
            .ok_or_else(|| Error::Unexpected(format!("no such handler: {}", id)))?;
        let resolver = handler
            .take_resolver()
            .ok_or_else(|| Error::Unexpected(format!("{} has no pending resolver", id)))?;
        let bridge = self.session.as_mut().ok_or(Error::NotConnected)?;
        bridge.resolve(id, resolver.token, input)?;
        Ok(())
    }

    // Blocking round trips. Never call these from inside an event loop
    // iteration that is itself completing a handler.

    /// The session's mnemonic word list.
    pub fn mnemonic(&self) -> Result<Vec<String>, Error> {
        let bridge = self.session.as_ref().ok_or(Error::NotConnected)?;
        let result = bridge.blocking_call(ops::GET_MNEMONIC, Document::new())?;
        Ok(result
            .str_at("mnemonic")?
            .split_whitespace()
            .map(str::to_string)
            .collect())
    }

    /// Raw amount conversion through the backend.
    pub fn convert(&self, args: Document) -> Result<Document, Error> {
        let bridge = self.session.as_ref().ok_or(Error::NotConnected)?;
        Ok(bridge.blocking_call(ops::CONVERT_AMOUNT, args)?)
    }

    /// Render an amount of satoshis in the given unit, trimming
    /// trailing zeros. An empty unit uses the settings unit.
    pub fn format_amount(
        &self,
        sats: i64,
        include_ticker: bool,
        unit: &str,
    ) -> Result<String, Error> {
        let unit = self.effective_unit(unit);
        let mut args = Document::new();
        args.insert("satoshi", sats);
        let result = self.convert(args)?;
        let value = result.str_at(&unit_key(&unit))?;
        let mut formatted = trim_trailing_zeros(value).to_string();
        if include_ticker {
            formatted.push(' ');
            if self.network.is_liquid() {
                formatted.push_str("L-");
            }
            formatted.push_str(&unit);
        }
        Ok(formatted)
    }

    /// Parse a user-entered decimal amount in the given unit into
    /// satoshis. An empty unit uses the settings unit.
    pub fn parse_amount(&self, amount: &str, unit: &str) -> Result<i64, Error> {
        let unit = self.effective_unit(unit);
        let sanitized: String = amount
            .trim()
            .chars()
            .map(|c| if c == ',' { '.' } else { c })
            .collect();
        let mut args = Document::new();
        args.insert(unit_key(&unit), sanitized);
        let result = self.convert(args)?;
        // Engines deliver "sats" either as an integer or as a decimal
        // string; fall through to the string parse on a mismatch.
        match result.maybe_int("sats") {
            Ok(Some(sats)) => return Ok(sats),
            Ok(None) | Err(DocumentError::WrongType { .. }) => {}
            Err(e) => return Err(e.into()),
        }
        result
            .str_at("sats")?
            .parse()
            .map_err(|e| Error::Unexpected(format!("parsing converted amount: {}", e)))
    }

    pub fn amount_to_sats(&self, amount: &str) -> Result<i64, Error> {
        self.parse_amount(amount, "")
    }

    fn effective_unit(&self, unit: &str) -> String {
        if !unit.is_empty() {
            return unit.to_string();
        }
        self.settings
            .maybe_str("unit")
            .ok()
            .flatten()
            .unwrap_or("BTC")
            .to_string()
    }

    /// Block until the session worker processed everything posted so
    /// far. No-op on a disconnected wallet.
    pub fn flush_session(&self) -> Result<(), Error> {
        if let Some(bridge) = &self.session {
            bridge.flush()?;
        }
        Ok(())
    }

    // Owner-thread pump.

    /// Drain everything the session worker posted since the last call,
    /// run the periodic checks, and return the wallet events produced.
    pub fn process_pending(&mut self) -> Vec<WalletEvent> {
        loop {
            let event = match &self.session {
                Some(bridge) => bridge.try_recv_event(),
                None => None,
            };
            let Some(event) = event else {
                break;
            };
            match event {
                SessionEvent::Transport {
                    connected,
                    login_required,
                } => self.on_transport(connected, login_required),
                SessionEvent::Notification(data) => self.dispatch_notification(data),
                SessionEvent::Handler { id, update } => self.on_handler_update(id, update),
            }
        }
        self.tick_at(Instant::now());
        std::mem::take(&mut self.pending_events)
    }

    /// Run the periodic busy and auto-lock checks against the given
    /// clock reading.
    pub fn tick_at(&mut self, now: Instant) {
        if self.seen_settings {
            if let Some(bridge) = &self.session {
                let age = chrono::Utc::now().timestamp_millis() - bridge.heartbeat_ms();
                let stale = age > BUSY_THRESHOLD_MS;
                self.set_busy(stale);
            }
        }
        // An in-flight handler defers idle lockout.
        if self.authentication == AuthenticationStatus::Authenticated
            && !self.hardware_backed
            && self.handlers.is_empty()
        {
            if let Some(deadline) = self.idle_deadline {
                if now >= deadline {
                    log::info!("Wallet '{}' idle timeout reached, locking", self.name);
                    self.disconnect();
                }
            }
        }
    }

    /// Re-arm the idle auto-lock timer. Call on user activity.
    pub fn record_activity(&mut self) {
        self.arm_idle_timer();
    }

    fn arm_idle_timer(&mut self) {
        if self.hardware_backed || self.altimeout == 0 {
            self.idle_deadline = None;
        } else {
            // The timeout comes from an opaque settings document and may
            // be arbitrarily large; a deadline out of Instant range means
            // the timer never fires.
            let secs = self.altimeout.saturating_mul(60);
            self.idle_deadline = Instant::now().checked_add(Duration::from_secs(secs));
        }
    }

    fn on_transport(&mut self, connected: bool, login_required: bool) {
        if self.connection == ConnectionStatus::Disconnected {
            return;
        }
        if !connected {
            self.set_connection(ConnectionStatus::Connecting);
            return;
        }
        self.set_connection(ConnectionStatus::Connected);
        if login_required {
            self.set_authentication(AuthenticationStatus::Unauthenticated);
        }
    }

    fn invoke(
        &mut self,
        op: &str,
        args: Document,
        continuation: Continuation,
        auto_resolve: bool,
    ) -> Result<HandlerId, Error> {
        let bridge = self.session.as_mut().ok_or(Error::NotConnected)?;
        let id = bridge.invoke(op, args)?;
        let mut handler = Handler::new(id, op, continuation);
        if auto_resolve {
            handler = handler.auto_resolving();
        }
        handler.mark_running();
        self.handlers.insert(id, handler);
        Ok(id)
    }

    fn on_handler_update(&mut self, id: HandlerId, update: crate::handler::HandlerUpdate) {
        let Some(handler) = self.handlers.get_mut(&id) else {
            log::warn!("Update for unknown handler {}", id);
            return;
        };
        let Some(outcome) = handler.apply(update) else {
            return;
        };
        match outcome {
            Outcome::NeedsResolution => {
                if handler.auto_resolves() {
                    let Some(resolver) = handler.take_resolver() else {
                        return;
                    };
                    let input = resolver.default_input.clone();
                    if let Err(e) = self.resolve_token(id, resolver.token, input) {
                        log::warn!("Auto-resolving {}: {}", id, e);
                    }
                } else if let Some(resolver) = handler.resolver() {
                    let event = WalletEvent::ResolutionRequested {
                        handler: id,
                        input_kind: resolver.input_kind.clone(),
                        default_input: resolver.default_input.clone(),
                    };
                    self.emit(event);
                }
            }
            Outcome::Completed => {
                if let Some(handler) = self.handlers.remove(&id) {
                    let (continuation, result, _) = handler.into_parts();
                    self.on_handler_done(continuation, result.unwrap_or_default());
                }
            }
            Outcome::Failed => {
                if let Some(handler) = self.handlers.remove(&id) {
                    let op = handler.op().to_string();
                    let (continuation, _, error) = handler.into_parts();
                    let error = error.unwrap_or_else(|| EngineError::other("missing error"));
                    self.on_handler_failed(op, continuation, error);
                }
            }
        }
    }

    fn resolve_token(&mut self, id: HandlerId, token: u64, input: Document) -> Result<(), Error> {
        let bridge = self.session.as_mut().ok_or(Error::NotConnected)?;
        bridge.resolve(id, token, input)?;
        Ok(())
    }

    fn on_handler_done(&mut self, continuation: Continuation, result: Document) {
        match continuation {
            Continuation::Connected => {
                self.set_connection(ConnectionStatus::Connected);
            }
            Continuation::LoggedInWithPin => {
                if self.login_attempts_remaining < MAX_LOGIN_ATTEMPTS {
                    self.login_attempts_remaining = MAX_LOGIN_ATTEMPTS;
                    self.persist();
                    self.emit(WalletEvent::LoginAttemptsChanged(MAX_LOGIN_ATTEMPTS));
                }
                self.after_login();
            }
            Continuation::LoggedIn => {
                self.after_login();
            }
            Continuation::SignupRegistered {
                mnemonic,
                password,
                pin,
            } => {
                let mut args = Document::new();
                args.insert("mnemonic", mnemonic);
                args.insert("password", password);
                if let Err(e) = self.invoke(
                    ops::LOGIN,
                    args,
                    Continuation::SignupLoggedIn { pin },
                    false,
                ) {
                    log::warn!("Signup login step: {}", e);
                    self.set_authentication(AuthenticationStatus::Unauthenticated);
                }
            }
            Continuation::SignupLoggedIn { pin } => {
                let mut args = Document::new();
                args.insert("pin", pin);
                if let Err(e) = self.invoke(ops::SET_PIN, args, Continuation::SignupPinSet, false)
                {
                    log::warn!("Signup set-pin step: {}", e);
                    self.set_authentication(AuthenticationStatus::Unauthenticated);
                }
            }
            Continuation::SignupPinSet => {
                self.store_pin_data(&result);
                self.after_login();
            }
            Continuation::PinUpdated => {
                self.store_pin_data(&result);
            }
            Continuation::SettingsLoaded => {
                self.set_settings(result);
            }
            Continuation::CurrenciesLoaded => {
                self.currencies = result;
            }
            Continuation::ConfigLoaded => {
                self.config = result;
                self.emit(WalletEvent::ConfigChanged);
            }
            Continuation::SubaccountsLoaded => {
                self.upsert_accounts(&result);
                if let Err(e) = self.update_config() {
                    log::warn!("Fetching two-factor config: {}", e);
                }
                if self.network.is_liquid() {
                    if let Err(e) = self.refresh_assets(true) {
                        log::warn!("Refreshing assets: {}", e);
                    }
                }
            }
            Continuation::AssetsRefreshed => {
                self.apply_assets(&result);
            }
        }
    }

    fn on_handler_failed(&mut self, op: String, continuation: Continuation, error: EngineError) {
        match continuation {
            Continuation::Connected => {
                if self.connection == ConnectionStatus::Connecting
                    && error.kind != ErrorKind::SessionClosed
                {
                    log::warn!("Connecting wallet '{}' failed, retrying: {}", self.name, error);
                    if let Err(e) = self.connect_now() {
                        log::warn!("Reconnect attempt: {}", e);
                        self.emit(WalletEvent::OperationFailed { op, error });
                    }
                } else {
                    self.emit(WalletEvent::OperationFailed { op, error });
                }
            }
            Continuation::LoggedInWithPin => match error.kind {
                ErrorKind::AuthCredential => {
                    self.set_authentication(AuthenticationStatus::Unauthenticated);
                    self.login_attempts_remaining = self.login_attempts_remaining.saturating_sub(1);
                    self.persist();
                    self.emit(WalletEvent::LoginAttemptsChanged(
                        self.login_attempts_remaining,
                    ));
                    self.emit(WalletEvent::LoginError(error));
                    if self.login_attempts_remaining == 0 {
                        self.disconnect();
                        self.emit(WalletEvent::LockedOut);
                    }
                }
                ErrorKind::ReconnectRequired => {
                    // Stale session, no attempt penalty.
                    self.set_authentication(AuthenticationStatus::Unauthenticated);
                    self.emit(WalletEvent::LoginError(error));
                }
                _ => {
                    log::warn!("PIN login failed: {}", error);
                    self.set_authentication(AuthenticationStatus::Unauthenticated);
                    self.emit(WalletEvent::LoginError(error));
                }
            },
            Continuation::LoggedIn => {
                self.set_authentication(AuthenticationStatus::Unauthenticated);
                self.emit(WalletEvent::LoginError(error));
            }
            Continuation::SignupRegistered { .. }
            | Continuation::SignupLoggedIn { .. }
            | Continuation::SignupPinSet => {
                log::warn!("Signup step '{}' failed: {}", op, error);
                self.set_authentication(AuthenticationStatus::Unauthenticated);
                self.emit(WalletEvent::OperationFailed { op, error });
            }
            _ => {
                log::warn!("Operation '{}' failed: {}", op, error);
                self.emit(WalletEvent::OperationFailed { op, error });
            }
        }
    }

    fn store_pin_data(&mut self, result: &Document) {
        match result.str_at("pin_data") {
            Ok(encoded) => match base64_decode(encoded) {
                Ok(bytes) => {
                    self.pin_data = bytes;
                    self.persist();
                    self.emit(WalletEvent::PinSet);
                }
                Err(e) => log::error!("Decoding new pin data: {}", e),
            },
            Err(e) => log::error!("Missing pin data in set-pin result: {}", e),
        }
    }

    fn upsert_accounts(&mut self, result: &Document) {
        let entries = match result.array_at("subaccounts") {
            Ok(entries) => entries,
            Err(e) => {
                log::error!("Malformed subaccounts result: {}", e);
                return;
            }
        };
        for entry in entries {
            let data = match Document::try_from(entry.clone()) {
                Ok(data) => data,
                Err(e) => {
                    log::warn!("Skipping malformed subaccount: {}", e);
                    continue;
                }
            };
            let pointer = match data.int_at("pointer").map(u32::try_from) {
                Ok(Ok(pointer)) => pointer,
                _ => {
                    log::warn!("Skipping subaccount without a valid pointer");
                    continue;
                }
            };
            match self.accounts.get_mut(&pointer) {
                Some(account) => account.update(data),
                None => {
                    self.accounts.insert(pointer, Account::new(pointer, data));
                }
            }
        }
        self.emit(WalletEvent::AccountsChanged);
    }

    fn apply_assets(&mut self, result: &Document) {
        let mut changed = false;
        if let Ok(Some(assets)) = result.maybe_doc("assets") {
            for (id, data) in assets.iter() {
                let Ok(data) = Document::try_from(data.clone()) else {
                    continue;
                };
                let id = self.network.canonical_asset_id(id).to_string();
                self.assets
                    .entry(id.clone())
                    .or_insert_with(|| Asset::new(id))
                    .set_data(data);
                changed = true;
            }
        }
        if let Ok(Some(icons)) = result.maybe_doc("icons") {
            for (id, icon) in icons.iter() {
                let Some(icon) = icon.as_str() else {
                    continue;
                };
                let id = self.network.canonical_asset_id(id).to_string();
                self.assets
                    .entry(id.clone())
                    .or_insert_with(|| Asset::new(id))
                    .set_icon(icon);
                changed = true;
            }
        }
        if changed {
            self.emit(WalletEvent::AssetsChanged);
        }
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("network", &self.network.id)
            .field("connection", &self.connection)
            .field("authentication", &self.authentication)
            .finish()
    }
}

fn base64_decode(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.decode(encoded)
}

fn unit_key(unit: &str) -> String {
    if unit == "µBTC" {
        "ubtc".to_string()
    } else {
        unit.to_lowercase()
    }
}

fn trim_trailing_zeros(value: &str) -> &str {
    if value.contains('.') {
        value.trim_end_matches('0').trim_end_matches('.')
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_string_trimming() {
        assert_eq!(trim_trailing_zeros("1.05000000"), "1.05");
        assert_eq!(trim_trailing_zeros("1.00000000"), "1");
        assert_eq!(trim_trailing_zeros("0.00000001"), "0.00000001");
        assert_eq!(trim_trailing_zeros("1000"), "1000");
    }

    #[test]
    fn unit_key_aliases() {
        assert_eq!(unit_key("BTC"), "btc");
        assert_eq!(unit_key("µBTC"), "ubtc");
        assert_eq!(unit_key("mBTC"), "mbtc");
        assert_eq!(unit_key("sats"), "sats");
    }
}
