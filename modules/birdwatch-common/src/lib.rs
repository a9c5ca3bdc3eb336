pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, ForwardConfig};
pub use error::HarvestError;
pub use types::{ServiceRecord, Subject, TokenPair};
