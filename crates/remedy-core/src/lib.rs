pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::RemedyConfig;
pub use error::{RemedyError, Result};
pub use events::RemediationEvent;
pub use types::*;
