//! Endorser configuration (`endorser.toml`).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::proposal::ChaincodeType;
use crate::core::registry::ENDORSEMENT_CONTRACT;
use crate::error::{EndorserError, Result};

fn default_platform_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_endorsement_authority() -> String {
    ENDORSEMENT_CONTRACT.to_string()
}

fn default_disabled_chaincode_types() -> Vec<ChaincodeType> {
    vec![ChaincodeType::Java]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndorserConfig {
    /// Version at which system contracts run and are reported.
    #[serde(default = "default_platform_version")]
    pub platform_version: String,

    /// Endorsement authority used for system contract proposals.
    #[serde(default = "default_endorsement_authority")]
    pub default_endorsement_authority: String,

    /// Chaincode types that may not be installed, deployed or upgraded.
    #[serde(default = "default_disabled_chaincode_types")]
    pub disabled_chaincode_types: Vec<ChaincodeType>,
}

impl Default for EndorserConfig {
    fn default() -> Self {
        Self {
            platform_version: default_platform_version(),
            default_endorsement_authority: default_endorsement_authority(),
            disabled_chaincode_types: default_disabled_chaincode_types(),
        }
    }
}

impl EndorserConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| EndorserError::Config(format!("parse toml: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .map_err(|e| EndorserError::Config(format!("read '{}': {}", path.display(), e)))?;
        Self::from_toml_str(&s)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| EndorserError::Config(format!("serialize toml: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.platform_version.trim().is_empty() {
            return Err(EndorserError::Config("platform_version must not be empty".to_string()));
        }
        if self.default_endorsement_authority.trim().is_empty() {
            return Err(EndorserError::Config(
                "default_endorsement_authority must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_disabled(&self, chaincode_type: ChaincodeType) -> bool {
        self.disabled_chaincode_types.contains(&chaincode_type)
    }
}
