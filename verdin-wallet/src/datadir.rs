use std::path::{Path, PathBuf};

/// The application data directory. Wallet records live in a `wallets`
/// subdirectory, one JSON file per wallet id.
#[derive(Debug, Clone)]
pub struct DataDirectory(PathBuf);

impl DataDirectory {
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn exists(&self) -> bool {
        self.0.exists()
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    pub fn wallets_dir_path(&self) -> PathBuf {
        self.0.join("wallets")
    }

    pub fn wallet_file_path(&self, id: &str) -> PathBuf {
        self.wallets_dir_path().join(format!("{}.json", id))
    }

    pub fn init(&self) -> Result<(), std::io::Error> {
        let wallets = self.wallets_dir_path();
        #[cfg(unix)]
        return {
            use std::fs::DirBuilder;
            use std::os::unix::fs::DirBuilderExt;

            let mut builder = DirBuilder::new();
            builder.mode(0o700).recursive(true).create(&wallets)
        };

        #[cfg(not(unix))]
        return std::fs::create_dir_all(&wallets);
    }
}
