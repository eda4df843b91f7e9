use serde::{Deserialize, Serialize};
use crate::{Result, SentryError};

pub const DEFAULT_GEO_ENDPOINT: &str = "http://ip-api.com/json/{ip}?fields=countryCode";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub geo: GeoConfig,
    pub analysis: AnalysisConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    pub enabled: bool,
    /// Lookup URL; `{ip}` is replaced with the destination address.
    pub endpoint: String,
    pub timeout_ms: u64,
    pub concurrent_lookups: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Number of distinct external destinations needed before the
    /// aggregate network activity finding is raised.
    pub min_external_destinations: usize,
    pub https_reporting: HttpsReporting,
    pub external_sample_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpsReporting {
    PerDestination,
    FirstOnly,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            geo: GeoConfig::default(),
            analysis: AnalysisConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: DEFAULT_GEO_ENDPOINT.to_string(),
            timeout_ms: 200,
            concurrent_lookups: 8,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_external_destinations: 1,
            https_reporting: HttpsReporting::PerDestination,
            external_sample_size: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.geo.enabled && !self.geo.endpoint.contains("{ip}") {
            return Err(SentryError::Config(format!(
                "geo endpoint '{}' has no {{ip}} placeholder",
                self.geo.endpoint
            )));
        }
        if self.geo.concurrent_lookups == 0 {
            return Err(SentryError::Config("concurrent_lookups must be at least 1".to_string()));
        }
        if self.analysis.min_external_destinations == 0 {
            return Err(SentryError::Config(
                "min_external_destinations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.geo.timeout_ms, 200);
        assert_eq!(config.analysis.min_external_destinations, 1);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"analysis": {"https_reporting": "first_only", "min_external_destinations": 4}}"#,
        )
        .unwrap();

        assert_eq!(config.analysis.https_reporting, HttpsReporting::FirstOnly);
        assert_eq!(config.analysis.min_external_destinations, 4);
        assert_eq!(config.analysis.external_sample_size, 5);
        assert_eq!(config.geo.endpoint, DEFAULT_GEO_ENDPOINT);
    }

    #[test]
    fn test_endpoint_without_placeholder_rejected() {
        let mut config = Config::default();
        config.geo.endpoint = "http://example.invalid/json".to_string();
        assert!(matches!(config.validate(), Err(SentryError::Config(_))));

        config.geo.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_file_round_trip() {
        let path = std::env::temp_dir().join(format!("traffic-sentry-{}.json", std::process::id()));
        let path = path.to_string_lossy().to_string();

        let mut config = Config::default();
        config.geo.timeout_ms = 350;
        config.to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.geo.timeout_ms, 350);
        std::fs::remove_file(&path).ok();
    }
}
