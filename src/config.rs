use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{FlowError, Result};

/// File layout and tunables for one pipeline run.
///
/// Every path is relative to `base_path`. Missing TOML keys fall back to the
/// defaults below, which mirror the reference data directory layout.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub base_path: PathBuf,

    pub master_table: String,
    pub alias_table: String,
    pub shortname_table: String,
    pub minority_list: String,
    pub excluded_table: String,

    pub symbol_table: String,
    pub tagged_dir: String,
    pub od_counts: String,
    pub city_geocodes: String,
    pub symbolic_flows: String,
    pub city_metrics: String,

    /// Files tagged or counted concurrently per batch.
    pub batch_size: usize,
    /// Row ceiling per tagged output chunk.
    pub max_rows_per_file: usize,
    /// Rose-diagram bin width in degrees.
    pub bin_width_deg: f64,

    pub geocode_overrides: Vec<GeocodeOverride>,
}

/// Manually corrected coordinates, applied by full name after geocoding.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeocodeOverride {
    pub fullname: String,
    pub gcj_x: f64,
    pub gcj_y: f64,
    pub wgs_x: f64,
    pub wgs_y: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("data"),
            master_table: "input/AMap_adcode.csv".into(),
            alias_table: "input/city_alias.csv".into(),
            shortname_table: "input/shortname_adcode.csv".into(),
            minority_list: "input/minority.csv".into(),
            excluded_table: "input/provincialcounties.csv".into(),
            symbol_table: "output/placesymbol_code.csv".into(),
            tagged_dir: "output/extractresult".into(),
            od_counts: "output/OD_code_counts.csv".into(),
            city_geocodes: "output/city_geocode.csv".into(),
            symbolic_flows: "output/Symbolicflows.csv".into(),
            city_metrics: "output/city_od_metrics.csv".into(),
            batch_size: 5,
            max_rows_per_file: 1_000_000,
            bin_width_deg: 20.0,
            // The geocoding service returns Jinan's location for Laiwu.
            geocode_overrides: vec![GeocodeOverride {
                fullname: "莱芜市".into(),
                gcj_x: 117.675828,
                gcj_y: 36.214895,
                wgs_x: 117.66994899263214,
                wgs_y: 36.21489948744972,
            }],
        }
    }
}

impl PipelineConfig {
    pub fn with_base_path(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Self::default()
        }
    }

    /// Load a TOML config file. A relative `base_path` inside the file is
    /// resolved against the file's own directory.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;
        if config.base_path.is_relative() {
            if let Some(dir) = path.parent() {
                config.base_path = dir.join(&config.base_path);
            }
        }
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject tunables no stage can run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.bin_width_deg > 0.0 && self.bin_width_deg <= 360.0) {
            return Err(FlowError::InvalidData(format!(
                "bin_width_deg must be in (0, 360], got {}",
                self.bin_width_deg
            )));
        }
        Ok(())
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.base_path.join(relative)
    }
}
