use thiserror::Error;

use crate::core::types::{AssetId, Technology, Year};

#[derive(Error, Debug)]
pub enum PathwayError {
    #[error("Unknown asset: {0}")]
    UnknownAsset(AssetId),

    #[error("Duplicate asset: {0}")]
    DuplicateAsset(AssetId),

    #[error("Asset already decommissioned: {0}")]
    AssetDecommissioned(AssetId),

    #[error("Year {year} outside horizon [{start}, {end}]")]
    OutOfRange { year: Year, start: Year, end: Year },

    #[error("Simulation already completed its final year {0}")]
    AlreadyCompleted(Year),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Technology not registered: {0}")]
    UnregisteredTechnology(Technology),

    #[error("No technology data for {technology} in {region} ({year})")]
    MissingTechnologyData {
        technology: Technology,
        region: String,
        year: Year,
    },

    #[error("Registry integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, PathwayError>;
