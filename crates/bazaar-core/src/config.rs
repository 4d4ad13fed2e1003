use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BACKUP_CRON: &str = "0 2 * * *"; // daily, 02:00 UTC
pub const DEFAULT_EXPIRY_CRON: &str = "0 8 * * *"; // daily, 08:00 UTC
pub const DEFAULT_EXPIRY_DAYS: u32 = 7;
pub const DEFAULT_NOTIFY_SUBJECT: &str = "Your listing is about to expire";

/// Top-level config (bazaar.toml + BAZAAR_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BazaarConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Recurring sweep settings. Offer triggers are not configured here; they are
/// armed per offer at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Cron expression for the database backup sweep (5 or 6 fields, UTC).
    #[serde(default = "default_backup_cron")]
    pub backup_cron: String,
    /// Cron expression for the listing-expiration sweep (5 or 6 fields, UTC).
    #[serde(default = "default_expiry_cron")]
    pub expiry_cron: String,
    /// Listings published this many days ago receive an expiration warning.
    #[serde(default = "default_expiry_days")]
    pub expiry_days: u32,
    #[serde(default)]
    pub expiry_window: ExpiryWindow,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            backup_cron: default_backup_cron(),
            expiry_cron: default_expiry_cron(),
            expiry_days: DEFAULT_EXPIRY_DAYS,
            expiry_window: ExpiryWindow::default(),
        }
    }
}

/// How the expiration sweep picks its publish-date window.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ExpiryWindow {
    /// The single UTC calendar day `expiry_days` before now.
    #[default]
    CalendarDay,
    /// Everything published since the previous successful sweep's upper bound,
    /// so downtime never skips a day.
    Watermark,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Directory receiving `bazaar-<timestamp>.db` snapshots.
    #[serde(default = "default_backup_dir")]
    pub dir: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: default_backup_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_notify_subject")]
    pub subject: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            subject: default_notify_subject(),
        }
    }
}

fn default_backup_cron() -> String {
    DEFAULT_BACKUP_CRON.to_string()
}
fn default_expiry_cron() -> String {
    DEFAULT_EXPIRY_CRON.to_string()
}
fn default_expiry_days() -> u32 {
    DEFAULT_EXPIRY_DAYS
}
fn default_notify_subject() -> String {
    DEFAULT_NOTIFY_SUBJECT.to_string()
}
fn default_db_path() -> String {
    format!("{}/bazaar.db", bazaar_home())
}
fn default_backup_dir() -> String {
    format!("{}/backups", bazaar_home())
}

fn bazaar_home() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.bazaar", home)
}

impl BazaarConfig {
    /// Load config from a TOML file with BAZAAR_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `BAZAAR_SCHEDULER__EXPIRY_DAYS=3`. A missing file is not an error;
    /// every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::BazaarError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("BAZAAR_").split("__"))
    }
}

fn default_config_path() -> String {
    format!("{}/bazaar.toml", bazaar_home())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = BazaarConfig::load(Some("/nonexistent/bazaar.toml")).unwrap();
        assert_eq!(config.scheduler.expiry_days, DEFAULT_EXPIRY_DAYS);
        assert_eq!(config.scheduler.backup_cron, DEFAULT_BACKUP_CRON);
        assert_eq!(config.scheduler.expiry_window, ExpiryWindow::CalendarDay);
        assert!(config.database.path.ends_with("bazaar.db"));
    }

    #[test]
    fn toml_overrides_nested_fields() {
        let toml = r#"
            [scheduler]
            expiry_days = 3
            expiry_window = "watermark"

            [backup]
            dir = "/var/backups/bazaar"
        "#;
        let config: BazaarConfig = Figment::new()
            .merge(Toml::string(toml))
            .extract()
            .unwrap();
        assert_eq!(config.scheduler.expiry_days, 3);
        assert_eq!(config.scheduler.expiry_window, ExpiryWindow::Watermark);
        assert_eq!(config.scheduler.expiry_cron, DEFAULT_EXPIRY_CRON);
        assert_eq!(config.backup.dir, "/var/backups/bazaar");
    }
}
