use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::DEFAULT_COUNTRY;

/// Central bank end-of-day feed with buying rates against TRY
pub const DEFAULT_RATES_URL: &str = "https://www.tcmb.gov.tr/kurlar/today.xml";

/// Runtime settings, passed to each component when it is built.
///
/// Every field may be omitted from the JSON file; missing ones keep their
/// default value.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Directory holding saved listing pages (`<id>.html`)
    pub html_dir: PathBuf,
    /// Tabular store the records are appended to
    pub output_csv: PathBuf,
    pub rates_url: String,
    pub request_timeout_secs: u64,
    /// Documents extracted in parallel
    pub max_concurrent: usize,
    pub country: String,
    /// Approximate rates used whenever the feed cannot be read
    pub fallback_rates: BTreeMap<String, f64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            html_dir: PathBuf::from("data/raw/listings"),
            output_csv: PathBuf::from("data/processed/property_details.csv"),
            rates_url: DEFAULT_RATES_URL.to_string(),
            request_timeout_secs: 30,
            max_concurrent: 3,
            country: DEFAULT_COUNTRY.to_string(),
            fallback_rates: BTreeMap::from([
                ("USD".to_string(), 37.8646),
                ("EUR".to_string(), 41.8133),
                ("GBP".to_string(), 48.7317),
            ]),
        }
    }
}

impl Settings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(settings)
    }

    /// Settings from `path` when given, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = std::env::temp_dir().join(format!("evler-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.json");
        fs::write(&path, r#"{ "html_dir": "pages", "max_concurrent": 8 }"#).unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.html_dir, PathBuf::from("pages"));
        assert_eq!(settings.max_concurrent, 8);
        assert_eq!(settings.rates_url, DEFAULT_RATES_URL);
        assert_eq!(settings.fallback_rates.get("GBP"), Some(&48.7317));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(Settings::from_file("/nonexistent/evler/settings.json").is_err());
    }

    #[test]
    fn test_load_without_path() {
        assert_eq!(Settings::load(None).unwrap(), Settings::default());
    }
}
