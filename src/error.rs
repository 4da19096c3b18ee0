use std::path::Path;

use thiserror::Error;

/// Errors raised by the simulation core.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RiskError {
    /// A collateral class, price series, slippage curve or protection table is absent.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// The collateral class has no active debt. Informational, the class is skipped.
    #[error("Collateral class {0} has no active debt")]
    EmptyVaultSet(String),

    /// A division by a zero total would be required; the result is undefined.
    #[error("Degenerate scenario: {0}")]
    DegenerateScenario(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RiskError {
    /// Whether the error marks an intentional skip rather than a failure.
    pub fn is_informational(&self) -> bool {
        matches!(self, Self::EmptyVaultSet(_))
    }
}

pub type Result<T> = std::result::Result<T, RiskError>;

/// JSON serialization for snapshots, configs and results.
pub trait JsonSerialization {
    fn to_json(&self) -> Result<String>;

    fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()>;
}

/// JSON deserialization for snapshots, configs and results.
pub trait JsonDeserialization {
    fn from_json(json: &str) -> Result<Self>
    where
        Self: Sized;

    fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self>
    where
        Self: Sized;
}

/// Blanket JSON support for every serde type in the crate.
impl<T: serde::Serialize> JsonSerialization for T {
    fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| RiskError::Serialization(format!("Failed to serialize to JSON: {}", e)))
    }

    fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        use std::io::Write;

        let file = std::fs::File::create(path)
            .map_err(|e| RiskError::Serialization(format!("Failed to create file: {}", e)))?;
        let mut writer = std::io::BufWriter::new(file);

        serde_json::to_writer_pretty(&mut writer, self).map_err(|e| {
            RiskError::Serialization(format!("Failed to write JSON file: {}", e))
        })?;

        writer
            .flush()
            .map_err(|e| RiskError::Serialization(format!("Failed to flush writer: {}", e)))
    }
}

impl<T: serde::de::DeserializeOwned> JsonDeserialization for T {
    fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            RiskError::Serialization(format!("Failed to deserialize from JSON: {}", e))
        })
    }

    fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| RiskError::Serialization(format!("Failed to open file: {}", e)))?;
        let reader = std::io::BufReader::new(file);

        serde_json::from_reader(reader).map_err(|e| {
            RiskError::Serialization(format!("Failed to read JSON file: {}", e))
        })
    }
}
