//! The wallet catalog.
//!
//! One registry per process, explicitly constructed and passed by
//! reference. It owns every wallet, the shared engine handle and the
//! data directory records are persisted under.

pub mod record;

use std::io;
use std::sync::Arc;

use crate::datadir::DataDirectory;
use crate::engine::Engine;
use crate::error::Error;
use crate::wallet::{ConnectionStatus, Wallet};
use record::{RecordError, WalletRecord};
use verdin::Network;

pub struct WalletRegistry {
    engine: Arc<dyn Engine>,
    data_dir: DataDirectory,
    /// Known network definitions, looked up by id when reconstructing
    /// persisted wallets.
    networks: Vec<Network>,
    wallets: Vec<Wallet>,
}

impl WalletRegistry {
    pub fn new(engine: Arc<dyn Engine>, data_dir: DataDirectory, networks: Vec<Network>) -> Self {
        Self {
            engine,
            data_dir,
            networks,
            wallets: Vec::new(),
        }
    }

    pub fn network(&self, id: &str) -> Option<&Network> {
        self.networks.iter().find(|n| n.id == id)
    }

    pub fn wallets(&self) -> &[Wallet] {
        &self.wallets
    }

    pub fn wallets_mut(&mut self) -> impl Iterator<Item = &mut Wallet> {
        self.wallets.iter_mut()
    }

    pub fn wallet(&self, id: &str) -> Option<&Wallet> {
        self.wallets.iter().find(|w| w.id() == id)
    }

    pub fn wallet_mut(&mut self, id: &str) -> Option<&mut Wallet> {
        self.wallets.iter_mut().find(|w| w.id() == id)
    }

    /// Reconstruct every persisted wallet, unconnected. Records on an
    /// unknown network or otherwise malformed are skipped with a
    /// warning.
    pub fn load_all(&mut self) -> Result<(), Error> {
        for record in WalletRecord::load_all(&self.data_dir)? {
            let Some(network) = self.network(&record.network).cloned() else {
                log::warn!(
                    "Skipping wallet '{}' on unknown network '{}'",
                    record.id,
                    record.network
                );
                continue;
            };
            match Wallet::from_record(
                self.engine.clone(),
                self.data_dir.clone(),
                network,
                &record,
            ) {
                Ok(wallet) => self.wallets.push(wallet),
                Err(e) => {
                    log::warn!("Skipping wallet '{}': {}", record.id, e);
                }
            }
        }
        Ok(())
    }

    /// A blank, unregistered wallet on the given network with a unique
    /// default name. Not persisted until [`insert`](Self::insert).
    pub fn create(&self, network: &Network) -> Wallet {
        Wallet::new(
            self.engine.clone(),
            self.data_dir.clone(),
            network.clone(),
        )
        .with_name(self.unique_default_name(network))
    }

    /// Register a wallet: assign it a fresh identifier and durably
    /// persist its record. The wallet must have `pin_data` already.
    pub fn insert(&mut self, mut wallet: Wallet) -> Result<&mut Wallet, Error> {
        debug_assert!(wallet.id().is_empty());
        debug_assert!(wallet.has_pin_data());
        let id = uuid::Uuid::new_v4().to_string();
        if self.data_dir.wallet_file_path(&id).exists() {
            return Err(RecordError::AlreadyExists(id).into());
        }
        wallet.assign_id(id);
        wallet.record().save(&self.data_dir)?;
        self.wallets.push(wallet);
        Ok(self.wallets.last_mut().ok_or_else(|| {
            Error::Unexpected("wallet vanished after insertion".to_string())
        })?)
    }

    /// Construct, connect and sign up a new wallet in one step. The
    /// identifier is assigned upfront so the record lands on disk as
    /// soon as the signup chain stores the PIN data.
    pub fn signup(
        &mut self,
        network: &Network,
        name: Option<String>,
        mnemonic: &str,
        password: &str,
        pin: &str,
        proxy: &str,
        use_tor: bool,
    ) -> Result<&mut Wallet, Error> {
        let words = mnemonic.split_whitespace().count();
        debug_assert!(words == 24 || words == 27);
        let mut wallet = self.create(network);
        if let Some(name) = name {
            wallet = wallet.with_name(name);
        }
        wallet.assign_id(uuid::Uuid::new_v4().to_string());
        wallet.connect(proxy, use_tor)?;
        wallet.signup(mnemonic, password, pin)?;
        self.wallets.push(wallet);
        Ok(self.wallets.last_mut().ok_or_else(|| {
            Error::Unexpected("wallet vanished after insertion".to_string())
        })?)
    }

    /// Unregister a wallet and delete its persisted record, draining
    /// its worker queue first when connected.
    pub fn remove(&mut self, id: &str) -> Result<(), Error> {
        let position = self
            .wallets
            .iter()
            .position(|w| w.id() == id)
            .ok_or_else(|| Error::Unexpected(format!("no such wallet: {}", id)))?;
        let mut wallet = self.wallets.remove(position);
        if wallet.connection() != ConnectionStatus::Disconnected {
            if let Err(e) = wallet.flush_session() {
                log::warn!("Flushing wallet '{}' before removal: {}", id, e);
            }
            wallet.disconnect();
        }
        match WalletRecord::delete(&self.data_dir, id) {
            Ok(()) => Ok(()),
            // A wallet whose record never hit the disk.
            Err(RecordError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// "My {network} Wallet", numbered when taken. Only wallets on the
    /// same network count as collisions.
    pub fn unique_default_name(&self, network: &Network) -> String {
        let taken = |name: &str| {
            self.wallets
                .iter()
                .any(|w| w.network().id == network.id && w.name() == name)
        };
        let base = format!("My {} Wallet", network.name);
        if !taken(&base) {
            return base;
        }
        for n in 1.. {
            let candidate = format!("{} {}", base, n);
            if !taken(&candidate) {
                return candidate;
            }
        }
        unreachable!()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::FakeEngine;

    fn testnet() -> Network {
        Network::new("testnet", "Testnet").testnet()
    }

    fn registry() -> (tempfile::TempDir, WalletRegistry) {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = DataDirectory::new(tmp.path().to_path_buf());
        data_dir.init().unwrap();
        let registry = WalletRegistry::new(Arc::new(FakeEngine::new()), data_dir, vec![testnet()]);
        (tmp, registry)
    }

    #[test]
    fn default_names_are_probed() {
        let (_tmp, mut registry) = registry();
        let network = testnet();
        assert_eq!(registry.unique_default_name(&network), "My Testnet Wallet");

        let wallet = registry.create(&network);
        registry.wallets.push(wallet);
        assert_eq!(registry.unique_default_name(&network), "My Testnet Wallet 1");

        let wallet = registry.create(&network);
        assert_eq!(wallet.name(), "My Testnet Wallet 1");
        registry.wallets.push(wallet);
        assert_eq!(registry.unique_default_name(&network), "My Testnet Wallet 2");
    }

    #[test]
    fn default_names_only_collide_within_a_network() {
        let (_tmp, mut registry) = registry();
        let other = Network::new("signet", "Signet").testnet();

        // A same-named wallet on another network is not a collision.
        let wallet = registry.create(&other).with_name("My Testnet Wallet");
        registry.wallets.push(wallet);
        assert_eq!(registry.unique_default_name(&testnet()), "My Testnet Wallet");
    }

    #[test]
    fn remove_unpersisted_wallet() {
        let (_tmp, mut registry) = registry();
        let network = testnet();
        let mut wallet = registry.create(&network);
        wallet.assign_id("ephemeral".to_string());
        registry.wallets.push(wallet);

        // No record file was ever written; removal still succeeds.
        registry.remove("ephemeral").unwrap();
        assert!(registry.wallets().is_empty());
    }
}
