use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScheduleError};
use crate::localtime::DayWindow;
use crate::models::UserId;

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "WEEKWISE_DB";

/// Tunables of the auto-scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Days ahead of now the scheduler searches.
    pub horizon_days: u32,
    /// Granularity of candidate start times, in minutes.
    pub step_minutes: u32,
    /// First local hour a task may start.
    pub day_start_hour: u32,
    /// Local hour at which the sleep window begins.
    pub day_end_hour: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        SchedulerSettings {
            horizon_days: 5,
            step_minutes: 30,
            day_start_hour: 7,
            day_end_hour: 23,
        }
    }
}

impl SchedulerSettings {
    pub fn horizon(&self) -> Duration {
        Duration::days(i64::from(self.horizon_days))
    }

    pub fn day_window(&self) -> DayWindow {
        DayWindow {
            start_hour: self.day_start_hour,
            end_hour: self.day_end_hour,
        }
    }

    /// Upper bound on scanner moves for one task: every step of the horizon
    /// plus one jump over each night.
    pub fn max_steps(&self) -> u32 {
        let steps = self.horizon_days * 24 * 60 / self.step_minutes.max(1);
        steps + self.horizon_days + 2
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=31).contains(&self.horizon_days) {
            return Err(ScheduleError::Config(format!(
                "horizon_days must be between 1 and 31, got {}",
                self.horizon_days
            )));
        }
        let step = self.step_minutes;
        let step_ok = (step > 0 && 60 % step == 0) || (step > 60 && step <= 240 && step % 60 == 0);
        if !step_ok {
            return Err(ScheduleError::Config(format!(
                "step_minutes must divide an hour or be whole hours up to 4, got {}",
                step
            )));
        }
        if self.day_start_hour > 23 || self.day_end_hour > 23 || self.day_start_hour == self.day_end_hour {
            return Err(ScheduleError::Config(format!(
                "day hours must be distinct values in 0..=23, got {}..{}",
                self.day_start_hour, self.day_end_hour
            )));
        }
        Ok(())
    }
}

/// Settings read from `config.toml`. Every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: Option<PathBuf>,
    pub user: Option<String>,
    /// IANA zone name such as "Europe/Berlin". Absent means system local.
    pub timezone: Option<String>,
    pub scheduler: SchedulerSettings,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ScheduleError::Config(e.to_string()))?;
        config.scheduler.validate()?;
        config.zone()?;
        Ok(config)
    }

    /// Loads `path` if given, else the default location. A missing default
    /// file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        match path {
            Some(p) => Config::from_file(p),
            None => match Config::default_path() {
                Some(p) if p.exists() => Config::from_file(&p),
                _ => Ok(Config::default()),
            },
        }
    }

    /// `~/.config/weekwise/config.toml` on Linux.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("weekwise").join("config.toml"))
    }

    /// Data directory, resolved in this order:
    /// 1. `WEEKWISE_DB` environment variable.
    /// 2. `data_dir` from the config file.
    /// 3. `~/.local/share/weekwise` (on Linux).
    /// 4. `./weekwise` (fallback).
    pub fn data_dir(&self) -> PathBuf {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            return PathBuf::from(dir);
        }
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        let mut p = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        p.push("weekwise");
        p
    }

    /// Explicit user, then the configured one, then `$USER`.
    pub fn user(&self, explicit: Option<String>) -> UserId {
        explicit
            .or_else(|| self.user.clone())
            .or_else(|| std::env::var("USER").ok())
            .map(UserId::new)
            .unwrap_or_else(|| UserId::new("default"))
    }

    /// The configured zone, or `None` for the system's local time.
    pub fn zone(&self) -> Result<Option<chrono_tz::Tz>> {
        match &self.timezone {
            None => Ok(None),
            Some(name) => name
                .parse::<chrono_tz::Tz>()
                .map(Some)
                .map_err(|_| ScheduleError::Config(format!("unknown timezone '{}'", name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "timezone = \"Asia/Tokyo\"\n[scheduler]\nhorizon_days = 7\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.scheduler.horizon_days, 7);
        assert_eq!(config.scheduler.step_minutes, 30);
        assert_eq!(config.zone().unwrap(), Some(chrono_tz::Asia::Tokyo));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        std::fs::write(&path, "[scheduler]\nstep_minutes = 25\n").unwrap();
        assert!(matches!(Config::from_file(&path), Err(ScheduleError::Config(_))));

        std::fs::write(&path, "timezone = \"Mars/Olympus\"\n").unwrap();
        assert!(matches!(Config::from_file(&path), Err(ScheduleError::Config(_))));
    }

    #[test]
    fn explicit_user_wins() {
        let config = Config {
            user: Some("configured".into()),
            ..Default::default()
        };
        assert_eq!(config.user(Some("flag".into())).as_str(), "flag");
        assert_eq!(config.user(None).as_str(), "configured");
    }
}
