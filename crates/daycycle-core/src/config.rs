//! Daycycle configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DaycycleError, Result};
use crate::time::DayTime;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaycycleConfig {
    #[serde(default)]
    pub campaign: CampaignConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub telegram: TelegramChannelConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub content: ContentConfig,
}

impl DaycycleConfig {
    /// Load config from the default path (~/.daycycle/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DaycycleError::Config(format!("Failed to read config: {e}")))?;
        Self::parse(&content)
    }

    /// Parse config from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| DaycycleError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| DaycycleError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the scheduler cannot work with.
    pub fn validate(&self) -> Result<()> {
        self.campaign.timezone()?;
        self.campaign.sweep_time()?;
        if self.campaign.reminder_interval_secs == 0 {
            return Err(DaycycleError::Config(
                "campaign.reminder_interval_secs must be positive".into(),
            ));
        }
        if self.campaign.yes_words.is_empty() || self.campaign.no_words.is_empty() {
            return Err(DaycycleError::Config(
                "campaign.yes_words and campaign.no_words must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Apply the deployment environment: `TOKEN` and `ADMIN_ID`.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Same as [`apply_env`](Self::apply_env) with an injectable lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("TOKEN").filter(|t| !t.is_empty()) {
            self.telegram.bot_token = token;
        }
        if let Some(raw) = lookup("ADMIN_ID") {
            match raw.trim().parse::<i64>() {
                Ok(id) => {
                    tracing::info!("✅ Admin ID set to: {id}");
                    self.admin.admin_id = Some(id);
                }
                Err(_) => {
                    tracing::warn!("⚠️ ADMIN_ID must be a number, admin commands disabled");
                    self.admin.admin_id = None;
                }
            }
        }
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Daycycle home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".daycycle")
    }
}

/// Campaign timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignConfig {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_reminder_interval")]
    pub reminder_interval_secs: u64,
    #[serde(default = "default_catchup_delay")]
    pub catchup_delay_secs: u64,
    #[serde(default = "default_sweep_time")]
    pub sweep_time: String,
    #[serde(default = "default_yes_words")]
    pub yes_words: Vec<String>,
    #[serde(default = "default_no_words")]
    pub no_words: Vec<String>,
}

fn default_timezone() -> String { "Europe/Moscow".into() }
fn default_reminder_interval() -> u64 { 3600 }
fn default_catchup_delay() -> u64 { 10 }
fn default_sweep_time() -> String { "00:01".into() }
fn default_yes_words() -> Vec<String> {
    vec!["yes", "да"].into_iter().map(String::from).collect()
}
fn default_no_words() -> Vec<String> {
    vec!["no", "нет"].into_iter().map(String::from).collect()
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            reminder_interval_secs: default_reminder_interval(),
            catchup_delay_secs: default_catchup_delay(),
            sweep_time: default_sweep_time(),
            yes_words: default_yes_words(),
            no_words: default_no_words(),
        }
    }
}

impl CampaignConfig {
    /// Parsed campaign timezone.
    pub fn timezone(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| DaycycleError::Config(format!("Unknown timezone '{}': {e}", self.timezone)))
    }

    /// Parsed daily sweep time.
    pub fn sweep_time(&self) -> Result<DayTime> {
        self.sweep_time
            .parse()
            .map_err(|e| DaycycleError::Config(format!("campaign.sweep_time: {e}")))
    }
}

/// Record storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "json" (single user_data.json file) or "sqlite".
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_backend() -> String { "json".into() }
fn default_data_dir() -> String { "~/.daycycle".into() }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            data_dir: default_data_dir(),
        }
    }
}

impl StorageConfig {
    /// Data directory with `~` expanded.
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data_dir).to_string())
    }

    /// Directory holding participant media.
    pub fn media_dir(&self) -> PathBuf {
        self.data_dir().join("user_media")
    }
}

/// Telegram channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChannelConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

fn bool_true() -> bool { true }
fn default_poll_interval() -> u64 { 1 }

impl Default for TelegramChannelConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            enabled: true,
            poll_interval: default_poll_interval(),
        }
    }
}

/// Admin command access.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub admin_id: Option<i64>,
}

/// Participant-facing texts. HTML markup is allowed.
/// Placeholders: `{day}`, `{name}`, `{time}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    #[serde(default = "default_welcome")]
    pub welcome: String,
    #[serde(default = "default_day_greeting")]
    pub day_greeting: String,
    #[serde(default = "default_care_question")]
    pub care_question: String,
    #[serde(default = "default_care_tips")]
    pub care_tips: String,
    #[serde(default = "default_care_declined")]
    pub care_declined: String,
    #[serde(default = "default_care_followup_saved")]
    pub care_followup_saved: String,
    /// Task text per day, index 0 is day 1.
    #[serde(default = "default_day_tasks")]
    pub day_tasks: Vec<String>,
    #[serde(default = "default_missing_day_task")]
    pub missing_day_task: String,
    #[serde(default = "default_ask_next_day_time")]
    pub ask_next_day_time: String,
    #[serde(default = "default_already_answered")]
    pub already_answered: String,
    #[serde(default = "default_response_saved")]
    pub response_saved: String,
    #[serde(default = "default_campaign_complete")]
    pub campaign_complete: String,
    #[serde(default = "default_thank_you")]
    pub thank_you: String,
    #[serde(default = "default_time_confirmed")]
    pub time_confirmed: String,
    #[serde(default = "default_invalid_time")]
    pub invalid_time: String,
    #[serde(default = "default_reminder")]
    pub reminder: String,
    #[serde(default = "default_missed_day")]
    pub missed_day: String,
    #[serde(default = "default_media_placeholder")]
    pub media_placeholder: String,
}

fn default_welcome() -> String {
    "<b>Welcome to our seven-day diary study!</b>\n\nEvery day I will send you a short task. \
     Answer with a few words, a photo or a video — whatever feels natural."
        .into()
}
fn default_day_greeting() -> String { "<b>Day {day}</b> 🌿".into() }
fn default_care_question() -> String {
    "Before we start: did you do anything today to take care of your clothes?".into()
}
fn default_care_tips() -> String {
    "Great! Tell me briefly what you did — a sentence or a photo is enough.".into()
}
fn default_care_declined() -> String { "Okay!".into() }
fn default_care_followup_saved() -> String { "Thank you! Now on to today's question.".into() }
fn default_day_tasks() -> Vec<String> {
    vec![
        "Which item of clothing did you reach for first today, and why?",
        "Describe a moment today when your clothes made you feel comfortable — or not.",
        "Show or describe an item you have owned the longest.",
        "What did you wear today that you would not wear a year ago?",
        "Tell me about a piece of clothing you repaired, altered or wanted to.",
        "Which item would you never give away? Why?",
        "Looking back at the week: what did you notice about how you dress?",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_missing_day_task() -> String { "Thank you! The week is complete. 🎉".into() }
fn default_ask_next_day_time() -> String {
    "After answering, send me the time for the next day in HH:MM format (e.g. 09:30).".into()
}
fn default_already_answered() -> String {
    "You have already answered today's question! Today was day {day}. \
     See you tomorrow for the next task. 🙂"
        .into()
}
fn default_response_saved() -> String {
    "Thank you! ✅ Your note is saved. Now send me the time for the next day in HH:MM format, \
     for example 09:30."
        .into()
}
fn default_campaign_complete() -> String {
    "Thank you! ✅ Your note is saved. The research week is complete! 🎉".into()
}
fn default_thank_you() -> String {
    "Thank you so much for taking part in the study. Your notes help us a lot! 💚".into()
}
fn default_time_confirmed() -> String {
    "Great! ✅ I will send the next day at {time} your time.".into()
}
fn default_invalid_time() -> String {
    "Invalid format. Please send the time as HH:MM, for example 09:30.".into()
}
fn default_reminder() -> String {
    "<b>{name}, thinking about our study and your experience!</b> 😊 \
     Did you remember to make a small diary note today? One bright moment, \
     thought or small difficulty with clothes is enough."
        .into()
}
fn default_missed_day() -> String {
    "We are very sorry you missed yesterday's task. Let's continue — \
     the next day is waiting for you."
        .into()
}
fn default_media_placeholder() -> String { "<media message>".into() }

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            welcome: default_welcome(),
            day_greeting: default_day_greeting(),
            care_question: default_care_question(),
            care_tips: default_care_tips(),
            care_declined: default_care_declined(),
            care_followup_saved: default_care_followup_saved(),
            day_tasks: default_day_tasks(),
            missing_day_task: default_missing_day_task(),
            ask_next_day_time: default_ask_next_day_time(),
            already_answered: default_already_answered(),
            response_saved: default_response_saved(),
            campaign_complete: default_campaign_complete(),
            thank_you: default_thank_you(),
            time_confirmed: default_time_confirmed(),
            invalid_time: default_invalid_time(),
            reminder: default_reminder(),
            missed_day: default_missed_day(),
            media_placeholder: default_media_placeholder(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DaycycleConfig::default();
        config.validate().unwrap();
        assert_eq!(config.campaign.reminder_interval_secs, 3600);
        assert_eq!(config.campaign.sweep_time().unwrap().to_string(), "00:01");
        assert_eq!(config.content.day_tasks.len(), 7);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = DaycycleConfig::parse(
            r#"
            [campaign]
            timezone = "Asia/Tokyo"

            [storage]
            backend = "sqlite"
            "#,
        )
        .unwrap();
        assert_eq!(config.campaign.timezone().unwrap(), chrono_tz::Asia::Tokyo);
        assert_eq!(config.campaign.catchup_delay_secs, 10);
        assert_eq!(config.storage.backend, "sqlite");
        assert!(config.telegram.enabled);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(DaycycleConfig::parse("[campaign]\ntimezone = \"Mars/Olympus\"").is_err());
        assert!(DaycycleConfig::parse("[campaign]\nsweep_time = \"0:1\"").is_err());
        assert!(DaycycleConfig::parse("[campaign]\nreminder_interval_secs = 0").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = DaycycleConfig::default();
        config.apply_env_from(|key| match key {
            "TOKEN" => Some("123:abc".into()),
            "ADMIN_ID" => Some("42".into()),
            _ => None,
        });
        assert_eq!(config.telegram.bot_token, "123:abc");
        assert_eq!(config.admin.admin_id, Some(42));

        config.apply_env_from(|key| (key == "ADMIN_ID").then(|| "not-a-number".into()));
        assert_eq!(config.admin.admin_id, None);
        assert_eq!(config.telegram.bot_token, "123:abc");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = std::env::temp_dir().join("daycycle-test-config");
        let path = dir.join("config.toml");
        let mut config = DaycycleConfig::default();
        config.campaign.reminder_interval_secs = 120;
        config.save_to(&path).unwrap();
        let loaded = DaycycleConfig::load_from(&path).unwrap();
        assert_eq!(loaded.campaign.reminder_interval_secs, 120);
        std::fs::remove_dir_all(&dir).ok();
    }
}
