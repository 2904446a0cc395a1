use crate::error::{PostlineError, Result};
use crate::paths;
use chrono::{FixedOffset, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ScheduleConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_allowed_weekdays")]
    pub allowed_weekdays: Vec<Weekday>,
    /// First hour of the publication window.
    #[serde(default = "default_window_start")]
    pub window_start_hour: u32,
    /// Last hour of the publication window (inclusive).
    #[serde(default = "default_window_end")]
    pub window_end_hour: u32,
    /// Local wall-clock time of the daily check, `HH:MM`.
    #[serde(default = "default_daily_check_time")]
    pub daily_check_time: String,
    /// Offset of the channel's local time from UTC, `+HH:MM`.
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
}

fn default_allowed_weekdays() -> Vec<Weekday> {
    vec![Weekday::Tue, Weekday::Thu]
}

fn default_window_start() -> u32 {
    9
}

fn default_window_end() -> u32 {
    11
}

fn default_daily_check_time() -> String {
    "00:05".to_string()
}

fn default_utc_offset() -> String {
    "+03:00".to_string()
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            allowed_weekdays: default_allowed_weekdays(),
            window_start_hour: default_window_start(),
            window_end_hour: default_window_end(),
            daily_check_time: default_daily_check_time(),
            utc_offset: default_utc_offset(),
        }
    }
}

impl ScheduleConfig {
    pub fn offset(&self) -> Result<FixedOffset> {
        parse_utc_offset(&self.utc_offset).ok_or_else(|| PostlineError::InvalidConfig {
            field: "schedule.utc_offset".to_string(),
            reason: format!("'{}' is not of the form +HH:MM", self.utc_offset),
        })
    }

    pub fn check_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.daily_check_time, "%H:%M").map_err(|e| {
            PostlineError::InvalidConfig {
                field: "schedule.daily_check_time".to_string(),
                reason: format!("'{}': {e}", self.daily_check_time),
            }
        })
    }

    pub fn is_allowed(&self, weekday: Weekday) -> bool {
        self.allowed_weekdays.contains(&weekday)
    }
}

/// Parse `+HH:MM` / `-HH:MM` (or `Z`) into a fixed offset.
pub fn parse_utc_offset(s: &str) -> Option<FixedOffset> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    let (h, m) = rest.split_once(':')?;
    let hours: i32 = h.parse().ok()?;
    let minutes: i32 = m.parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

// ---------------------------------------------------------------------------
// GuardConfig / PipelineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    #[serde(default = "default_min_interval_hours")]
    pub min_interval_hours: u32,
}

fn default_min_interval_hours() -> u32 {
    crate::guard::DEFAULT_MIN_INTERVAL_HOURS
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            min_interval_hours: default_min_interval_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on one pipeline run, collection through publish.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_immediate_delay_secs")]
    pub immediate_delay_secs: u64,
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_immediate_delay_secs() -> u64 {
    10
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            immediate_delay_secs: default_immediate_delay_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborator configs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// Chat that receives failure alerts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_chat_id: Option<String>,
    #[serde(default = "default_telegram_token_env")]
    pub bot_token_env: String,
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
}

fn default_telegram_token_env() -> String {
    "TELEGRAM_BOT_TOKEN".to_string()
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            channel_id: None,
            admin_chat_id: None,
            bot_token_env: default_telegram_token_env(),
            api_base: default_telegram_api_base(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExaConfig {
    #[serde(default = "default_exa_queries")]
    pub queries: Vec<String>,
    #[serde(default = "default_exa_num_results")]
    pub num_results: u32,
    #[serde(default = "default_exa_days_back")]
    pub days_back: u32,
    #[serde(default = "default_exa_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_exa_api_base")]
    pub api_base: String,
}

fn default_exa_queries() -> Vec<String> {
    vec![
        "Ozon seller news and updates".to_string(),
        "Wildberries sellers commission changes".to_string(),
        "Yandex Market API changes".to_string(),
        "Ozon Wildberries sales analytics case".to_string(),
    ]
}

fn default_exa_num_results() -> u32 {
    3
}

fn default_exa_days_back() -> u32 {
    14
}

fn default_exa_key_env() -> String {
    "EXA_API_KEY".to_string()
}

fn default_exa_api_base() -> String {
    "https://api.exa.ai".to_string()
}

impl Default for ExaConfig {
    fn default() -> Self {
        Self {
            queries: default_exa_queries(),
            num_results: default_exa_num_results(),
            days_back: default_exa_days_back(),
            api_key_env: default_exa_key_env(),
            api_base: default_exa_api_base(),
        }
    }
}

/// Habr search pages as a second, keyless source feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HabrConfig {
    #[serde(default = "default_habr_enabled")]
    pub enabled: bool,
    #[serde(default = "default_habr_tags")]
    pub tags: Vec<String>,
    #[serde(default = "default_habr_max_per_tag")]
    pub max_per_tag: usize,
    #[serde(default = "default_habr_days_back")]
    pub days_back: u32,
    #[serde(default = "default_habr_base")]
    pub base_url: String,
}

fn default_habr_enabled() -> bool {
    true
}

fn default_habr_tags() -> Vec<String> {
    ["etl", "ozon", "wildberries", "e-commerce", "маркетплейсы"]
        .iter()
        .map(|t| t.to_string())
        .collect()
}

fn default_habr_max_per_tag() -> usize {
    3
}

fn default_habr_days_back() -> u32 {
    7
}

fn default_habr_base() -> String {
    "https://habr.com".to_string()
}

impl Default for HabrConfig {
    fn default() -> Self {
        Self {
            enabled: default_habr_enabled(),
            tags: default_habr_tags(),
            max_per_tag: default_habr_max_per_tag(),
            days_back: default_habr_days_back(),
            base_url: default_habr_base(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    #[serde(default = "default_anthropic_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_anthropic_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_anthropic_api_base")]
    pub api_base: String,
}

fn default_anthropic_model() -> String {
    "claude-3-haiku-20240307".to_string()
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_anthropic_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_anthropic_api_base() -> String {
    "https://api.anthropic.com".to_string()
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            model: default_anthropic_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            api_key_env: default_anthropic_key_env(),
            api_base: default_anthropic_api_base(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub channel: String,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub guard: GuardConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub exa: ExaConfig,
    #[serde(default)]
    pub habr: HabrConfig,
    #[serde(default)]
    pub anthropic: AnthropicConfig,
}

fn default_version() -> u32 {
    1
}

impl Config {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            version: 1,
            channel: channel.into(),
            schedule: ScheduleConfig::default(),
            guard: GuardConfig::default(),
            pipeline: PipelineConfig::default(),
            telegram: TelegramConfig::default(),
            exa: ExaConfig::default(),
            habr: HabrConfig::default(),
            anthropic: AnthropicConfig::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(PostlineError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let schedule = &self.schedule;

        if schedule.allowed_weekdays.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "schedule.allowed_weekdays is empty: nothing will be published"
                    .to_string(),
            });
        }

        if schedule.window_end_hour > 23 || schedule.window_start_hour > schedule.window_end_hour
        {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "schedule window {}..={} is not a valid hour range",
                    schedule.window_start_hour, schedule.window_end_hour
                ),
            });
        }

        if let Err(e) = schedule.offset() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: e.to_string(),
            });
        }

        match schedule.check_time() {
            Ok(t) => {
                if let Some(start) = NaiveTime::from_hms_opt(schedule.window_start_hour, 0, 0) {
                    if t >= start {
                        warnings.push(ConfigWarning {
                            level: WarnLevel::Warning,
                            message: format!(
                                "daily check at {} runs after the window opens; early slots will be forfeited",
                                schedule.daily_check_time
                            ),
                        });
                    }
                }
            }
            Err(e) => warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: e.to_string(),
            }),
        }

        if self.guard.min_interval_hours == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "guard.min_interval_hours is 0: duplicate publications are not prevented"
                    .to_string(),
            });
        }

        if self.pipeline.timeout_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "pipeline.timeout_secs must be greater than 0".to_string(),
            });
        }

        if self.telegram.channel_id.is_none() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "telegram.channel_id is not set: publishing will fail".to_string(),
            });
        }

        if self.exa.queries.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "exa.queries is empty: only content-plan days can publish".to_string(),
            });
        }

        if self.habr.enabled && self.habr.tags.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "habr.enabled is set but habr.tags is empty".to_string(),
            });
        }

        warnings
    }
}

/// Read a secret from the environment variable named in config.
pub fn env_secret(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(PostlineError::MissingEnv(var.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_reference_schedule() {
        let cfg = Config::new("channel");
        assert_eq!(cfg.schedule.allowed_weekdays, [Weekday::Tue, Weekday::Thu]);
        assert_eq!(cfg.schedule.window_start_hour, 9);
        assert_eq!(cfg.schedule.window_end_hour, 11);
        assert_eq!(
            cfg.schedule.check_time().unwrap(),
            NaiveTime::from_hms_opt(0, 5, 0).unwrap()
        );
        assert_eq!(cfg.schedule.offset().unwrap().local_minus_utc(), 3 * 3600);
        assert_eq!(cfg.guard.min_interval_hours, 6);
    }

    #[test]
    fn minimal_yaml_fills_defaults() {
        let cfg: Config = serde_yaml::from_str(
            "channel: shop-news\nschedule:\n  allowed_weekdays: [Mon, friday]\n",
        )
        .unwrap();
        assert_eq!(cfg.schedule.allowed_weekdays, [Weekday::Mon, Weekday::Fri]);
        assert_eq!(cfg.schedule.window_end_hour, 11);
        assert_eq!(cfg.pipeline.timeout_secs, 600);
        assert_eq!(cfg.exa.queries.len(), 4);
        assert!(cfg.habr.enabled);
        assert_eq!(cfg.habr.max_per_tag, 3);
    }

    #[test]
    fn habr_without_tags_warns() {
        let mut cfg = Config::new("c");
        cfg.telegram.channel_id = Some("@c".to_string());
        cfg.habr.tags.clear();
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("habr.tags"));

        cfg.habr.enabled = false;
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn config_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::new("shop-news");
        cfg.telegram.channel_id = Some("@shop_news".to_string());
        cfg.save(dir.path()).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.channel, "shop-news");
        assert_eq!(loaded.telegram.channel_id.as_deref(), Some("@shop_news"));
    }

    #[test]
    fn missing_config_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(PostlineError::NotInitialized)
        ));
    }

    #[test]
    fn offset_parsing() {
        assert_eq!(parse_utc_offset("+03:00").unwrap().local_minus_utc(), 10800);
        assert_eq!(parse_utc_offset("-05:30").unwrap().local_minus_utc(), -19800);
        assert_eq!(parse_utc_offset("Z").unwrap().local_minus_utc(), 0);
        assert!(parse_utc_offset("03:00").is_none());
        assert!(parse_utc_offset("+25:00").is_none());
    }

    #[test]
    fn validate_default_only_warns_about_channel() {
        let warnings = Config::new("c").validate();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("telegram.channel_id"));
    }

    #[test]
    fn validate_catches_errors() {
        let mut cfg = Config::new("c");
        cfg.telegram.channel_id = Some("@c".to_string());
        cfg.schedule.window_start_hour = 12;
        cfg.schedule.window_end_hour = 10;
        cfg.schedule.utc_offset = "Moscow".to_string();
        cfg.schedule.daily_check_time = "25:99".to_string();
        cfg.pipeline.timeout_secs = 0;

        let warnings = cfg.validate();
        let errors = warnings
            .iter()
            .filter(|w| w.level == WarnLevel::Error)
            .count();
        assert_eq!(errors, 4);
    }

    #[test]
    fn env_secret_requires_value() {
        assert!(matches!(
            env_secret("POSTLINE_TEST_SURELY_UNSET_VAR"),
            Err(PostlineError::MissingEnv(_))
        ));
    }
}
