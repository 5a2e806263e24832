pub mod config;
pub mod error;
pub mod types;

pub use config::PathwayConfig;
pub use error::{PathwayError, Result};
pub use types::{AssetId, Technology, TechnologyClass, Year};
