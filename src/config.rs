// ⚙️ Pipeline Configuration
// One TOML file handed to the loaders and the binary. The reconciliation
// stages take plain parameters and never read it themselves.

use crate::corpus::JoinPolicy;
use crate::deduplication::RoundingPolicy;
use crate::error::{FmrError, Result};
use crate::records::AnalysisField;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub data: DataSettings,
    #[serde(default)]
    pub zip: ZipSettings,
    #[serde(default)]
    pub metro: MetroSettings,
    #[serde(default)]
    pub analysis: AnalysisSettings,
}

/// Where the input files live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSettings {
    /// Directory of yearly small-area FMR CSV files
    pub fmr_directory: PathBuf,
    pub cpi_file: PathBuf,
    #[serde(default)]
    pub metro_rent_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZipSettings {
    #[serde(default = "default_month")]
    pub anchor_month: u32,
    #[serde(default = "default_rounding")]
    pub rounding: RoundingPolicy,
}

impl Default for ZipSettings {
    fn default() -> Self {
        ZipSettings {
            anchor_month: default_month(),
            rounding: default_rounding(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetroSettings {
    #[serde(default = "default_join_policy")]
    pub join_policy: String,
    #[serde(default = "default_month")]
    pub implementation_month: u32,
}

impl Default for MetroSettings {
    fn default() -> Self {
        MetroSettings {
            join_policy: default_join_policy(),
            implementation_month: default_month(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    #[serde(default = "default_field")]
    pub field: String,
    #[serde(default = "default_std_multiplier")]
    pub std_multiplier: f64,
    #[serde(default = "default_significance_threshold")]
    pub significance_threshold: f64,
    #[serde(default = "default_candidate_lags")]
    pub candidate_lags: Vec<i32>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        AnalysisSettings {
            field: default_field(),
            std_multiplier: default_std_multiplier(),
            significance_threshold: default_significance_threshold(),
            candidate_lags: default_candidate_lags(),
        }
    }
}

fn default_month() -> u32 {
    10
}

fn default_rounding() -> RoundingPolicy {
    RoundingPolicy::Ceiling
}

fn default_join_policy() -> String {
    "inner".to_string()
}

fn default_field() -> String {
    "Two-Bedroom".to_string()
}

fn default_std_multiplier() -> f64 {
    1.5
}

fn default_significance_threshold() -> f64 {
    0.80
}

fn default_candidate_lags() -> Vec<i32> {
    vec![0, 1, 2, 3]
}

impl PipelineConfig {
    /// Read, parse and validate a TOML config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            FmrError::Configuration(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)
            .map_err(|e| FmrError::Configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would only fail deep inside a pipeline run
    pub fn validate(&self) -> Result<()> {
        for (name, month) in [
            ("zip.anchor_month", self.zip.anchor_month),
            ("metro.implementation_month", self.metro.implementation_month),
        ] {
            if !(1..=12).contains(&month) {
                return Err(FmrError::Configuration(format!(
                    "{} must be between 1 and 12, got {}",
                    name, month
                )));
            }
        }

        self.join_policy()?;
        self.field()
            .map_err(|e| FmrError::Configuration(e.to_string()))?;

        let k = self.analysis.std_multiplier;
        if k.is_nan() || k <= 0.0 {
            return Err(FmrError::Configuration(format!(
                "analysis.std_multiplier must be positive, got {}",
                k
            )));
        }
        if self.analysis.candidate_lags.is_empty() {
            return Err(FmrError::Configuration(
                "analysis.candidate_lags must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn join_policy(&self) -> Result<JoinPolicy> {
        JoinPolicy::from_str(&self.metro.join_policy)
    }

    pub fn field(&self) -> Result<AnalysisField> {
        AnalysisField::from_str(&self.analysis.field)
    }
}
