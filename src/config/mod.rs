// Configuration manager module
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::LoadTestError;

/// Environment variable overriding `base_url`.
pub const ENV_BASE_URL: &str = "BASE_URL";
/// Environment variable overriding `vus` and `iterations` together.
pub const ENV_VUS: &str = "VUS";

/// 合否判定のしきい値
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// http_req_failed の許容上限 (rate < この値)
    pub http_req_failed_max_rate: f64,
    /// checks の合格率下限 (rate > この値)
    pub checks_min_rate: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            http_req_failed_max_rate: 0.01,
            checks_min_rate: 0.99,
        }
    }
}

/// メイン設定構造体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    /// 仮想クライアント数
    pub vus: u64,
    /// 総イテレーション数 (vus と一致している必要がある)
    pub iterations: u64,
    /// 短縮対象のURL
    pub long_url: String,
    pub ttl_seconds: Option<i64>,
    pub settle_interval_ms: u64,
    pub request_timeout_secs: u64,
    pub thresholds: ThresholdConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            vus: 10_000,
            iterations: 10_000,
            long_url: "https://accuracy-test.com/concurrent".to_string(),
            ttl_seconds: None,
            settle_interval_ms: 2_000,
            request_timeout_secs: 60,
            thresholds: ThresholdConfig::default(),
        }
    }
}

impl Config {
    /// 設定値のバリデーション
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            errors.push("base_url must start with http:// or https://".to_string());
        }
        if self.vus == 0 {
            errors.push("vus must be greater than 0".to_string());
        }
        // 1 VU = 1 iteration. ずれた場合は実行時に扱わず設定エラーとする
        if self.iterations != self.vus {
            errors.push(format!(
                "iterations ({}) must equal vus ({})",
                self.iterations, self.vus
            ));
        }
        if self.long_url.is_empty() {
            errors.push("long_url must not be empty".to_string());
        }
        if let Some(ttl) = self.ttl_seconds {
            if ttl <= 0 {
                errors.push("ttl_seconds must be greater than 0".to_string());
            }
        }
        if self.request_timeout_secs == 0 {
            errors.push("request_timeout_secs must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.thresholds.http_req_failed_max_rate) {
            errors.push("thresholds.http_req_failed_max_rate must be within [0, 1]".to_string());
        }
        if !(0.0..=1.0).contains(&self.thresholds.checks_min_rate) {
            errors.push("thresholds.checks_min_rate must be within [0, 1]".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Number of work units the run dispatches, and so the click count the
    /// target must report afterwards.
    pub fn expected_count(&self) -> u64 {
        self.iterations
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Set the population size, keeping vus and iterations bound 1:1.
    pub fn set_population(&mut self, n: u64) {
        self.vus = n;
        self.iterations = n;
    }

    /// 環境変数 (BASE_URL, VUS) による上書き。値は `lookup` 経由で読む
    pub fn apply_overrides_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), LoadTestError> {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.is_empty()) {
            self.base_url = url;
        }
        if let Some(raw) = lookup(ENV_VUS).filter(|v| !v.is_empty()) {
            let n: u64 = raw.trim().parse().map_err(|e| {
                LoadTestError::ConfigError(format!("Invalid {} value '{}': {}", ENV_VUS, raw, e))
            })?;
            self.set_population(n);
        }
        Ok(())
    }
}

/// JSON文字列から設定を読み込む (バリデーションなし)
///
/// 後から環境変数や引数で上書きする場合に使う。上書き後に `check` を呼ぶこと。
pub fn parse_str(json: &str) -> Result<Config, LoadTestError> {
    serde_json::from_str(json)
        .map_err(|e| LoadTestError::ConfigError(format!("JSON parse error: {}", e)))
}

/// JSONファイルから設定を読み込む (バリデーションなし)
pub fn parse_file(path: &Path) -> Result<Config, LoadTestError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        LoadTestError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    parse_str(&content)
}

/// JSON文字列から設定を読み込み、バリデーションを実行する
pub fn load_from_str(json: &str) -> Result<Config, LoadTestError> {
    let config = parse_str(json)?;
    check(&config)?;
    Ok(config)
}

/// JSONファイルから設定を読み込み、バリデーションを実行する
pub fn load_from_file(path: &Path) -> Result<Config, LoadTestError> {
    let config = parse_file(path)?;
    check(&config)?;
    Ok(config)
}

/// バリデーション結果を LoadTestError に変換する
pub fn check(config: &Config) -> Result<(), LoadTestError> {
    config.validate().map_err(|errors| {
        LoadTestError::ConfigError(format!("Validation errors: {}", errors.join("; ")))
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_default_values() {
        let config = Config::default();
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.vus, 10_000);
        assert_eq!(config.iterations, 10_000);
        assert_eq!(config.long_url, "https://accuracy-test.com/concurrent");
        assert_eq!(config.ttl_seconds, None);
        assert_eq!(config.settle_interval(), Duration::from_secs(2));
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.thresholds.http_req_failed_max_rate, 0.01);
        assert_eq!(config.thresholds.checks_min_rate, 0.99);
    }

    #[test]
    fn test_validate_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_vus_zero() {
        let mut config = Config::default();
        config.set_population(0);
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("vus")));
    }

    #[test]
    fn test_validate_iterations_diverging_from_vus() {
        let config = Config {
            vus: 100,
            iterations: 200,
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors, vec!["iterations (200) must equal vus (100)".to_string()]);
    }

    #[test]
    fn test_validate_base_url_scheme() {
        let config = Config {
            base_url: "localhost:8080".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_threshold_out_of_range() {
        let mut config = Config::default();
        config.thresholds.checks_min_rate = 1.5;
        config.thresholds.http_req_failed_max_rate = -0.1;
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_validate_non_positive_ttl() {
        let config = Config {
            ttl_seconds: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_settle_interval_is_allowed() {
        let config = Config {
            settle_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_expected_count_is_iterations() {
        let mut config = Config::default();
        config.set_population(500);
        assert_eq!(config.expected_count(), 500);
    }

    #[test]
    fn test_load_from_str_empty_object_uses_defaults() {
        let config = load_from_str("{}").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_str_partial_config_uses_defaults() {
        let config = load_from_str(
            r#"{"base_url": "http://shortener:9000", "vus": 100, "iterations": 100,
                "thresholds": {"checks_min_rate": 0.95}}"#,
        )
        .unwrap();
        assert_eq!(config.base_url, "http://shortener:9000");
        assert_eq!(config.vus, 100);
        assert_eq!(config.thresholds.checks_min_rate, 0.95);
        assert_eq!(config.thresholds.http_req_failed_max_rate, 0.01);
        assert_eq!(config.settle_interval_ms, 2_000);
    }

    #[test]
    fn test_load_from_str_invalid_json() {
        let err = load_from_str("{not json").unwrap_err();
        assert!(matches!(err, LoadTestError::ConfigError(ref m) if m.starts_with("JSON parse error")));
    }

    #[test]
    fn test_parse_str_defers_validation() {
        let config = parse_str(r#"{"vus": 10, "iterations": 11}"#).unwrap();
        assert_eq!(config.vus, 10);
        assert_eq!(config.iterations, 11);
        assert!(check(&config).is_err());
    }

    #[test]
    fn test_load_from_str_validation_error() {
        let err = load_from_str(r#"{"vus": 10, "iterations": 11}"#).unwrap_err();
        match err {
            LoadTestError::ConfigError(msg) => {
                assert!(msg.starts_with("Validation errors:"));
                assert!(msg.contains("iterations (11) must equal vus (10)"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_load_from_file_valid_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"vus": 250, "iterations": 250, "settle_interval_ms": 0}}"#).unwrap();
        let config = load_from_file(file.path()).unwrap();
        assert_eq!(config.vus, 250);
        assert_eq!(config.settle_interval_ms, 0);
    }

    #[test]
    fn test_load_from_file_nonexistent_file() {
        let err = load_from_file(Path::new("/nonexistent/load-test.json")).unwrap_err();
        assert!(matches!(err, LoadTestError::ConfigError(ref m) if m.contains("Failed to read config file")));
    }

    #[test]
    fn test_env_overrides_apply_base_url_and_population() {
        let env: HashMap<&str, &str> =
            [(ENV_BASE_URL, "http://target:1234"), (ENV_VUS, "42")].into_iter().collect();
        let mut config = Config::default();
        config
            .apply_overrides_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.base_url, "http://target:1234");
        assert_eq!(config.vus, 42);
        assert_eq!(config.iterations, 42);
    }

    #[test]
    fn test_env_overrides_ignore_empty_values() {
        let mut config = Config::default();
        config
            .apply_overrides_from(|_| Some(String::new()))
            .unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_env_overrides_reject_non_numeric_vus() {
        let mut config = Config::default();
        let err = config
            .apply_overrides_from(|k| (k == ENV_VUS).then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, LoadTestError::ConfigError(ref m) if m.contains("Invalid VUS value 'lots'")));
    }

    proptest! {
        #[test]
        fn prop_generated_configs_are_valid(config in generators::arb_config()) {
            prop_assert!(config.validate().is_ok());
            prop_assert_eq!(config.expected_count(), config.vus);
        }

        #[test]
        fn prop_diverging_population_fails_validation(
            config in generators::arb_config(),
            delta in 1u64..1_000,
        ) {
            let mut config = config;
            config.iterations = config.vus + delta;
            prop_assert!(config.validate().is_err());
        }
    }
}
