use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Result, anyhow};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000";
pub const DEFAULT_WEB_BASE_URL: &str = "http://localhost:3000";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub web_base_url: String,
    pub access_token: Option<String>,
    pub payment_redirect_delay_ms: u64,
    pub appointments_redirect_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            web_base_url: DEFAULT_WEB_BASE_URL.to_string(),
            access_token: None,
            payment_redirect_delay_ms: 1500,
            appointments_redirect_delay_ms: 3000,
            request_timeout_secs: 60,
            log_file: None,
        }
    }
}

impl Config {
    /// Load from the user config directory, falling back to defaults when
    /// no file exists yet. Environment variables win over the file.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::get_config_path()?)?;
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("NHAKHOA_API_URL") {
            self.api_base_url = url;
        }
        if let Ok(url) = std::env::var("NHAKHOA_WEB_URL") {
            self.web_base_url = url;
        }
        if let Ok(token) = std::env::var("NHAKHOA_TOKEN") {
            self.access_token = Some(token);
        }
    }

    pub fn payment_redirect_delay(&self) -> Duration {
        Duration::from_millis(self.payment_redirect_delay_ms)
    }

    pub fn appointments_redirect_delay(&self) -> Duration {
        Duration::from_millis(self.appointments_redirect_delay_ms)
    }

    /// `payment_id` is percent-encoded as a single path segment
    pub fn payment_url(&self, payment_id: &str) -> String {
        let base = self.web_base_url.trim_end_matches('/');
        match reqwest::Url::parse(base) {
            Ok(mut url) => {
                if let Ok(mut segments) = url.path_segments_mut() {
                    segments.pop_if_empty().push("payment").push(payment_id);
                }
                url.to_string()
            }
            Err(e) => {
                tracing::warn!(base, error = %e, "web base url does not parse");
                format!("{}/payment/{}", base, payment_id)
            }
        }
    }

    pub fn appointments_url(&self) -> String {
        format!("{}/appointments", self.web_base_url.trim_end_matches('/'))
    }

    /// Log file path, `<data_dir>/nhakhoa/nhakhoa.log` unless configured
    pub fn log_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.log_file {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow!("Could not determine data directory"))?;

        Ok(data_dir.join("nhakhoa").join("nhakhoa.log"))
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("nhakhoa").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.payment_redirect_delay(), Duration::from_millis(1500));
        assert_eq!(config.appointments_redirect_delay(), Duration::from_millis(3000));
    }

    #[test]
    fn test_save_creates_directory_and_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config {
            api_base_url: "https://api.nhakhoa.test".to_string(),
            access_token: Some("token-123".to_string()),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_remaining_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"web_base_url":"https://nhakhoa.test/"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.payment_url("pay_9"), "https://nhakhoa.test/payment/pay_9");
        assert_eq!(config.appointments_url(), "https://nhakhoa.test/appointments");
    }

    #[test]
    fn test_payment_url_escapes_reserved_characters() {
        let config = Config {
            web_base_url: "https://nhakhoa.test/app/".to_string(),
            ..Config::default()
        };
        assert_eq!(
            config.payment_url("a/b?c#d"),
            "https://nhakhoa.test/app/payment/a%2Fb%3Fc%23d"
        );
        assert_eq!(
            Config::default().payment_url("665f1c2e"),
            "http://localhost:3000/payment/665f1c2e"
        );
    }
}
