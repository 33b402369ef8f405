pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::RaonConfig;
pub use error::{RaonError, Result};
pub use events::{DomainEvent, EventBus};
pub use types::*;
