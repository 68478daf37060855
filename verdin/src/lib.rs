pub mod document;
pub mod network;

pub use document::{Document, DocumentError};
pub use network::Network;
