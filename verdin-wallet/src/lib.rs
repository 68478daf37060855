pub mod config;
pub mod datadir;
pub mod engine;
mod error;
pub mod handler;
pub mod registry;
pub mod session;
pub mod testutils;
pub mod wallet;

pub use error::Error;

use std::fmt;

#[derive(Debug, Clone)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}-dev", self.major, self.minor)
    }
}

pub const VERSION: Version = Version { major: 0, minor: 1 };
