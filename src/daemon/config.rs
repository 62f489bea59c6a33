use std::{path::Path, time::Duration};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use super::focus::rules::MAX_DYNAMIC_RULES;

pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Settings of the daemon. Every field is optional in `config.toml`, missing ones take the
/// defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub server_url: String,
    /// Port of the localhost message channel.
    pub listen_port: u16,
    /// Page blocked navigations are redirected to.
    pub blocked_page_url: String,
    pub flush_interval_secs: u64,
    pub category_refresh_secs: u64,
    pub focus_poll_secs: u64,
    pub alert_check_secs: u64,
    /// Upper bound for a single flushed interval. Guards against sleep/hibernate gaps.
    pub max_delta_secs: u64,
    pub min_flush_spacing_secs: u64,
    pub max_rules: usize,
    pub request_timeout_secs: u64,
    pub user_id: Option<u64>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            server_url: "https://tiempo-check-production.up.railway.app".into(),
            listen_port: 47615,
            blocked_page_url: "chrome-extension://tiempocheck/blocked.html".into(),
            flush_interval_secs: 20,
            category_refresh_secs: 5 * 60,
            focus_poll_secs: 30,
            alert_check_secs: 2 * 60,
            max_delta_secs: 600,
            min_flush_spacing_secs: 10,
            max_rules: MAX_DYNAMIC_RULES,
            request_timeout_secs: 15,
            user_id: None,
        }
    }
}

impl TrackerConfig {
    /// Reads `config.toml` from the application directory. A missing file means defaults.
    pub fn load(app_dir: &Path) -> Result<Self> {
        let path = app_dir.join(CONFIG_FILE_NAME);
        let config = match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).with_context(|| format!("in {path:?}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: TrackerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        Url::parse(&self.server_url).context("server_url")?;
        self.blocked_page()?;
        for (name, value) in [
            ("flush_interval_secs", self.flush_interval_secs),
            ("category_refresh_secs", self.category_refresh_secs),
            ("focus_poll_secs", self.focus_poll_secs),
            ("alert_check_secs", self.alert_check_secs),
            ("max_delta_secs", self.max_delta_secs),
        ] {
            if value == 0 {
                bail!("{name} must be greater than zero");
            }
        }
        if self.max_rules > MAX_DYNAMIC_RULES {
            bail!("max_rules can't exceed {MAX_DYNAMIC_RULES}");
        }
        Ok(())
    }

    pub fn blocked_page(&self) -> Result<Url> {
        Url::parse(&self.blocked_page_url).context("blocked_page_url")
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn category_refresh(&self) -> Duration {
        Duration::from_secs(self.category_refresh_secs)
    }

    pub fn focus_poll(&self) -> Duration {
        Duration::from_secs(self.focus_poll_secs)
    }

    pub fn alert_check(&self) -> Duration {
        Duration::from_secs(self.alert_check_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
