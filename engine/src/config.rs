//! Engine configuration, read once from `RADIO24_*` environment variables.
//!
//! Every variable is optional. A value that is set but unparsable is a
//! startup error naming the variable, never a silent default.

use crate::playout::{PlayoutConfig, HISTORY_LEN};
use crate::rotation::RotationConfig;
use anyhow::{bail, Context};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

const PREFIX: &str = "RADIO24_";

/// Which playback element the controller drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Browsers play the audio and post `ended`/`error` back over HTTP.
    Remote,
    /// Items "play" server-side for their duration. Useful for demos and soak runs.
    Simulated,
}

impl FromStr for OutputKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote" => Ok(Self::Remote),
            "simulated" | "sim" => Ok(Self::Simulated),
            other => bail!("unknown output kind {other:?} (expected remote or simulated)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub bind: SocketAddr,
    pub db_path: String,
    pub ad_frequency: usize,
    pub announcement_frequency: usize,
    pub time_signal: bool,
    pub fallback_content: bool,
    pub default_volume: u8,
    pub fade: Duration,
    pub retry_delay: Duration,
    pub listener_window: Duration,
    pub output: OutputKind,
    pub autoplay: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            db_path: "radio24.db".into(),
            ad_frequency: 3,
            announcement_frequency: 5,
            time_signal: true,
            fallback_content: true,
            default_volume: 70,
            fade: Duration::from_millis(1000),
            retry_delay: Duration::from_millis(3000),
            listener_window: Duration::from_secs(300),
            output: OutputKind::Remote,
            autoplay: false,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup (full names, prefix included).
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let get = |key: &str| lookup(&format!("{PREFIX}{key}")).filter(|v| !v.trim().is_empty());

        let cfg = Self {
            bind: parse_or(&get, "BIND", d.bind)?,
            db_path: get("DB_PATH").unwrap_or(d.db_path),
            ad_frequency: parse_or(&get, "AD_FREQUENCY", d.ad_frequency)?,
            announcement_frequency: parse_or(&get, "ANNOUNCEMENT_FREQUENCY", d.announcement_frequency)?,
            time_signal: flag_or(&get, "TIME_SIGNAL", d.time_signal)?,
            fallback_content: flag_or(&get, "FALLBACK", d.fallback_content)?,
            default_volume: parse_or(&get, "DEFAULT_VOLUME", d.default_volume)?,
            fade: Duration::from_millis(parse_or(&get, "FADE_MS", d.fade.as_millis() as u64)?),
            retry_delay: Duration::from_millis(parse_or(
                &get,
                "RETRY_DELAY_MS",
                d.retry_delay.as_millis() as u64,
            )?),
            listener_window: Duration::from_secs(parse_or(
                &get,
                "LISTENER_WINDOW_SECS",
                d.listener_window.as_secs(),
            )?),
            output: parse_or(&get, "OUTPUT", d.output)?,
            autoplay: flag_or(&get, "AUTOPLAY", d.autoplay)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.ad_frequency == 0 {
            bail!("{PREFIX}AD_FREQUENCY must be at least 1");
        }
        if self.announcement_frequency == 0 {
            bail!("{PREFIX}ANNOUNCEMENT_FREQUENCY must be at least 1");
        }
        if self.default_volume > 100 {
            bail!("{PREFIX}DEFAULT_VOLUME must be 0..=100, got {}", self.default_volume);
        }
        Ok(())
    }

    pub fn playout(&self) -> PlayoutConfig {
        PlayoutConfig {
            rotation: RotationConfig {
                ad_frequency: self.ad_frequency,
                announcement_frequency: self.announcement_frequency,
            },
            time_signal: self.time_signal,
            fallback_content: self.fallback_content,
            retry_delay: self.retry_delay,
            history_len: HISTORY_LEN,
            fade: self.fade,
            volume: self.default_volume,
        }
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| anyhow::anyhow!("{e}"))
            .with_context(|| format!("invalid {PREFIX}{key}={raw:?}")),
    }
}

fn flag_or<G>(get: &G, key: &str, default: bool) -> anyhow::Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => parse_flag(&raw).with_context(|| format!("invalid {PREFIX}{key}={raw:?}")),
    }
}

fn parse_flag(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got {other:?}"),
    }
}
