use chrono::NaiveTime;
use presence_core::CheckoutPolicy;
use serde::Deserialize;
use std::path::PathBuf;

/// Daemon configuration.
///
/// Resolution order: built-in defaults, then an optional TOML file
/// (`PRESENCE_CONFIG`), then `PRESENCE_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Minimum fused score for a verified match (inclusive).
    pub threshold: f64,
    /// Acceptance threshold for admin login. Defaults to `threshold`.
    pub admin_threshold: f64,
    /// Face weight when both modalities are present; voice gets the rest.
    pub face_weight: f64,
    pub voice_weight: f64,
    /// Latest local check-in time that still counts as on-time.
    pub late_cutoff: NaiveTime,
    /// Fixed UTC offset in minutes for day keys and cutoff comparison.
    pub utc_offset_minutes: i32,
    /// What a second verified event on an open day does.
    pub checkout_policy: CheckoutPolicy,
    /// Exclude Saturdays/Sundays from the attendance-percentage denominator.
    pub exclude_weekends: bool,
    /// Timeout for one modality's gallery scan, in milliseconds.
    pub matcher_timeout_ms: u64,
}

/// Optional keys accepted from the TOML config file.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub db_path: Option<PathBuf>,
    pub threshold: Option<f64>,
    pub admin_threshold: Option<f64>,
    pub face_weight: Option<f64>,
    pub voice_weight: Option<f64>,
    pub late_cutoff: Option<String>,
    pub utc_offset_minutes: Option<i32>,
    pub checkout_policy: Option<CheckoutPolicy>,
    pub exclude_weekends: Option<bool>,
    pub matcher_timeout_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("presence");

        Self {
            db_path: data_dir.join("presence.db"),
            threshold: 0.80,
            admin_threshold: 0.80,
            face_weight: 0.6,
            voice_weight: 0.4,
            late_cutoff: NaiveTime::from_hms_opt(9, 15, 0).expect("valid cutoff"),
            utc_offset_minutes: 0,
            checkout_policy: CheckoutPolicy::FillCheckout,
            exclude_weekends: true,
            matcher_timeout_ms: 2_000,
        }
    }
}

impl Config {
    /// Load configuration from the optional TOML file and `PRESENCE_*`
    /// environment variables.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Config::default();

        if let Ok(path) = std::env::var("PRESENCE_CONFIG") {
            let raw = std::fs::read_to_string(&path)?;
            let file: FileConfig = toml::from_str(&raw)?;
            config.apply_file(file)?;
            tracing::info!(path, "config file loaded");
        }

        if let Ok(p) = std::env::var("PRESENCE_DB_PATH") {
            config.db_path = PathBuf::from(p);
        }
        config.threshold = env_f64("PRESENCE_THRESHOLD", config.threshold);
        config.admin_threshold = env_f64("PRESENCE_ADMIN_THRESHOLD", config.admin_threshold);
        config.face_weight = env_f64("PRESENCE_FACE_WEIGHT", config.face_weight);
        config.voice_weight = env_f64("PRESENCE_VOICE_WEIGHT", config.voice_weight);
        if let Ok(raw) = std::env::var("PRESENCE_LATE_CUTOFF") {
            config.late_cutoff = parse_cutoff(&raw)?;
        }
        config.utc_offset_minutes = env_i32("PRESENCE_UTC_OFFSET_MINUTES", config.utc_offset_minutes);
        if let Ok(raw) = std::env::var("PRESENCE_CHECKOUT_POLICY") {
            config.checkout_policy = parse_policy(&raw)?;
        }
        config.exclude_weekends = std::env::var("PRESENCE_EXCLUDE_WEEKENDS")
            .map(|v| v != "0")
            .unwrap_or(config.exclude_weekends);
        config.matcher_timeout_ms = env_u64("PRESENCE_MATCHER_TIMEOUT_MS", config.matcher_timeout_ms);

        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) -> anyhow::Result<()> {
        if let Some(v) = file.db_path {
            self.db_path = v;
        }
        if let Some(v) = file.threshold {
            self.threshold = v;
            // Admin threshold follows the general one unless set explicitly.
            self.admin_threshold = file.admin_threshold.unwrap_or(v);
        } else if let Some(v) = file.admin_threshold {
            self.admin_threshold = v;
        }
        if let Some(v) = file.face_weight {
            self.face_weight = v;
        }
        if let Some(v) = file.voice_weight {
            self.voice_weight = v;
        }
        if let Some(raw) = file.late_cutoff {
            self.late_cutoff = parse_cutoff(&raw)?;
        }
        if let Some(v) = file.utc_offset_minutes {
            self.utc_offset_minutes = v;
        }
        if let Some(v) = file.checkout_policy {
            self.checkout_policy = v;
        }
        if let Some(v) = file.exclude_weekends {
            self.exclude_weekends = v;
        }
        if let Some(v) = file.matcher_timeout_ms {
            self.matcher_timeout_ms = v;
        }
        Ok(())
    }
}

fn parse_cutoff(raw: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|e| anyhow::anyhow!("invalid late cutoff {raw:?}: {e}"))
}

fn parse_policy(raw: &str) -> anyhow::Result<CheckoutPolicy> {
    match raw {
        "fill_checkout" => Ok(CheckoutPolicy::FillCheckout),
        "idempotent_ignore" => Ok(CheckoutPolicy::IdempotentIgnore),
        other => anyhow::bail!("invalid checkout policy {other:?}"),
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i32(key: &str, default: i32) -> i32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_config_overrides_defaults() {
        let file: FileConfig = toml::from_str(
            r#"
            threshold = 0.85
            late_cutoff = "09:00"
            checkout_policy = "idempotent_ignore"
            exclude_weekends = false
            "#,
        )
        .unwrap();
        let mut config = Config::default();
        config.apply_file(file).unwrap();
        assert_eq!(config.threshold, 0.85);
        assert_eq!(config.admin_threshold, 0.85);
        assert_eq!(config.late_cutoff, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(config.checkout_policy, CheckoutPolicy::IdempotentIgnore);
        assert!(!config.exclude_weekends);
    }

    #[test]
    fn cutoff_accepts_both_formats() {
        assert_eq!(parse_cutoff("09:15").unwrap(), NaiveTime::from_hms_opt(9, 15, 0).unwrap());
        assert_eq!(parse_cutoff("09:15:30").unwrap(), NaiveTime::from_hms_opt(9, 15, 30).unwrap());
        assert!(parse_cutoff("late").is_err());
    }
}
