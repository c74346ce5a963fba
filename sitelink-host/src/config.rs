//! Load host config from file and environment.

use serde::Deserialize;
use std::path::PathBuf;

/// Host configuration. File: ~/.config/sitelink/config.toml or
/// /etc/sitelink/config.toml.
/// Env overrides: SITELINK_MAX_MESSAGE_SIZE, SITELINK_MAX_BLOCK_SIZE,
/// SITELINK_SEND_INTERVAL_TICKS, SITELINK_RESEND_POLL_TICKS,
/// SITELINK_RETENTION_TICKS.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Transport per-message limit in bytes (default 65536).
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Largest block payload in bytes (default 50000).
    #[serde(default = "default_max_block_size")]
    pub max_block_size: usize,
    /// Ticks between consecutive block sends (default 1).
    #[serde(default = "default_send_interval_ticks")]
    pub send_interval_ticks: u64,
    /// Idle ticks before requesting resends (default 120).
    #[serde(default = "default_resend_poll_ticks")]
    pub resend_poll_ticks: u64,
    /// Ticks before unacknowledged/partial transfers are dropped (default 3000).
    #[serde(default = "default_retention_ticks")]
    pub retention_ticks: u64,
}

fn default_max_message_size() -> usize {
    65_536
}
fn default_max_block_size() -> usize {
    50_000
}
fn default_send_interval_ticks() -> u64 {
    1
}
fn default_resend_poll_ticks() -> u64 {
    120
}
fn default_retention_ticks() -> u64 {
    3000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            max_block_size: default_max_block_size(),
            send_interval_ticks: default_send_interval_ticks(),
            resend_poll_ticks: default_resend_poll_ticks(),
            retention_ticks: default_retention_ticks(),
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    if let Ok(s) = std::env::var("SITELINK_MAX_MESSAGE_SIZE") {
        if let Ok(v) = s.parse::<usize>() {
            c.max_message_size = v;
        }
    }
    if let Ok(s) = std::env::var("SITELINK_MAX_BLOCK_SIZE") {
        if let Ok(v) = s.parse::<usize>() {
            c.max_block_size = v;
        }
    }
    if let Ok(s) = std::env::var("SITELINK_SEND_INTERVAL_TICKS") {
        if let Ok(v) = s.parse::<u64>() {
            c.send_interval_ticks = v;
        }
    }
    if let Ok(s) = std::env::var("SITELINK_RESEND_POLL_TICKS") {
        if let Ok(v) = s.parse::<u64>() {
            c.resend_poll_ticks = v;
        }
    }
    if let Ok(s) = std::env::var("SITELINK_RETENTION_TICKS") {
        if let Ok(v) = s.parse::<u64>() {
            c.retention_ticks = v;
        }
    }
    c
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/sitelink/config.toml"));
    }
    out.push(PathBuf::from("/etc/sitelink/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            if let Ok(s) = std::fs::read_to_string(&p) {
                if let Ok(c) = toml::from_str::<Config>(&s) {
                    return Some(c);
                }
            }
            break;
        }
    }
    None
}
