//! Routing of backend push notifications.
//!
//! A notification document carries an `event` tag naming the payload
//! key, e.g. `{"event": "block", "block": {...}}`. Every payload is
//! accumulated in the wallet's events document; a subset additionally
//! mutates wallet state. Unknown events are logged and ignored.

use super::{AuthenticationStatus, Wallet, WalletEvent};
use verdin::Document;

impl Wallet {
    pub(super) fn dispatch_notification(&mut self, data: Document) {
        let event = match data.str_at("event") {
            Ok(event) => event.to_string(),
            Err(e) => {
                log::warn!("Notification without an event tag: {}", e);
                return;
            }
        };
        let payload = match data.get(&event) {
            Some(payload) => payload.clone(),
            None => {
                log::warn!("Notification '{}' without a payload", event);
                return;
            }
        };

        self.events_mut_insert(&event, payload.clone());

        let payload_doc = Document::try_from(payload).unwrap_or_default();
        match event.as_str() {
            "transaction" => self.on_transaction_notification(&payload_doc),
            "settings" => {
                // The backend pushes settings once the session is fully
                // authenticated; the first receipt flips the state.
                self.set_authentication(AuthenticationStatus::Authenticated);
                self.set_settings(payload_doc.clone());
            }
            "twofactor_reset" => {
                let active = payload_doc.maybe_bool("is_active").ok().flatten().unwrap_or(false);
                self.set_locked(active);
            }
            "block" => {
                for account in self.accounts.values_mut() {
                    account.on_block(&payload_doc);
                }
                if !self.accounts.is_empty() {
                    self.emit(WalletEvent::AccountsChanged);
                }
            }
            "fees" => {
                // Accumulated above, nothing else to do.
            }
            _ => {
                log::warn!("Unhandled notification: {}", event);
            }
        }
        self.emit(WalletEvent::Notification {
            event,
            data: payload_doc,
        });
    }

    fn events_mut_insert(&mut self, event: &str, payload: serde_json::Value) {
        self.events.insert(event, payload);
        self.emit(WalletEvent::EventsUpdated(event.to_string()));
    }

    fn on_transaction_notification(&mut self, payload: &Document) {
        let pointers = match payload.array_at("subaccounts") {
            Ok(pointers) => pointers.to_vec(),
            Err(e) => {
                log::warn!("Malformed transaction notification: {}", e);
                return;
            }
        };
        let mut touched = false;
        for pointer in pointers {
            let Some(pointer) = pointer.as_u64().and_then(|p| u32::try_from(p).ok()) else {
                log::warn!("Transaction notification with a non-integer subaccount");
                continue;
            };
            match self.accounts.get_mut(&pointer) {
                Some(account) => {
                    account.on_transaction(payload);
                    touched = true;
                }
                None => {
                    log::warn!("Transaction notification for unknown subaccount {}", pointer);
                }
            }
        }
        if touched {
            self.emit(WalletEvent::AccountsChanged);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datadir::DataDirectory;
    use crate::testutils::FakeEngine;
    use crate::wallet::account::Account;
    use serde_json::json;
    use std::sync::Arc;
    use verdin::Network;

    fn offline_wallet() -> Wallet {
        let tmp = std::env::temp_dir();
        Wallet::new(
            Arc::new(FakeEngine::new()),
            DataDirectory::new(tmp),
            Network::new("testnet", "Testnet").testnet(),
        )
    }

    fn notification(event: &str, payload: serde_json::Value) -> Document {
        Document::try_from(json!({ "event": event, event: payload })).unwrap()
    }

    fn drain(wallet: &mut Wallet) -> Vec<WalletEvent> {
        std::mem::take(&mut wallet.pending_events)
    }

    #[test]
    fn settings_flips_authentication_once() {
        let mut wallet = offline_wallet();
        wallet.authentication = AuthenticationStatus::Authenticating;

        wallet.dispatch_notification(notification("settings", json!({"altimeout": 5})));
        let events = drain(&mut wallet);
        assert_eq!(wallet.authentication(), AuthenticationStatus::Authenticated);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, WalletEvent::AuthenticationChanged(_)))
                .count(),
            1
        );
        assert_eq!(wallet.settings().int_at("altimeout").unwrap(), 5);

        // A second settings push must not flip again.
        wallet.dispatch_notification(notification("settings", json!({"altimeout": 10})));
        let events = drain(&mut wallet);
        assert!(!events
            .iter()
            .any(|e| matches!(e, WalletEvent::AuthenticationChanged(_))));
        assert_eq!(wallet.settings().int_at("altimeout").unwrap(), 10);
    }

    #[test]
    fn huge_altimeout_disables_the_idle_timer() {
        let mut wallet = offline_wallet();
        wallet.dispatch_notification(notification(
            "settings",
            json!({"altimeout": i64::MAX}),
        ));
        assert_eq!(wallet.authentication(), AuthenticationStatus::Authenticated);

        // The timer never fires, no matter how far the clock advances.
        let far = std::time::Instant::now() + std::time::Duration::from_secs(86_400);
        wallet.tick_at(far);
        assert_eq!(wallet.authentication(), AuthenticationStatus::Authenticated);
    }

    #[test]
    fn block_with_no_accounts_is_noop() {
        let mut wallet = offline_wallet();
        wallet.dispatch_notification(notification("block", json!({"block_height": 100})));
        let events = drain(&mut wallet);
        assert!(!events
            .iter()
            .any(|e| matches!(e, WalletEvent::AccountsChanged)));
        // The payload is still accumulated.
        assert!(events
            .iter()
            .any(|e| matches!(e, WalletEvent::EventsUpdated(name) if name == "block")));
        assert!(wallet.events().contains_key("block"));
    }

    #[test]
    fn transaction_routes_to_named_accounts() {
        let mut wallet = offline_wallet();
        wallet.accounts.insert(0, Account::new(0, Document::new()));
        wallet.accounts.insert(1, Account::new(1, Document::new()));

        wallet.dispatch_notification(notification(
            "transaction",
            json!({"subaccounts": [1], "txhash": "ab"}),
        ));
        let events = drain(&mut wallet);
        assert!(events
            .iter()
            .any(|e| matches!(e, WalletEvent::AccountsChanged)));
        assert_eq!(wallet.account(0).unwrap().generation(), 0);
        assert_eq!(wallet.account(1).unwrap().generation(), 1);

        // An unknown pointer is logged, never fatal.
        wallet.dispatch_notification(notification(
            "transaction",
            json!({"subaccounts": [9], "txhash": "cd"}),
        ));
        let events = drain(&mut wallet);
        assert!(!events
            .iter()
            .any(|e| matches!(e, WalletEvent::AccountsChanged)));
    }

    #[test]
    fn twofactor_reset_sets_locked() {
        let mut wallet = offline_wallet();
        wallet.dispatch_notification(notification("twofactor_reset", json!({"is_active": true})));
        assert!(wallet.locked());
        assert!(drain(&mut wallet)
            .iter()
            .any(|e| matches!(e, WalletEvent::LockedChanged(true))));

        wallet.dispatch_notification(notification("twofactor_reset", json!({"is_active": false})));
        assert!(!wallet.locked());
    }

    #[test]
    fn unknown_event_is_accumulated_and_ignored() {
        let mut wallet = offline_wallet();
        wallet.dispatch_notification(notification("something_new", json!({"a": 1})));
        let events = drain(&mut wallet);
        assert!(events
            .iter()
            .any(|e| matches!(e, WalletEvent::EventsUpdated(name) if name == "something_new")));
        assert!(wallet.events().contains_key("something_new"));
    }
}
