//! 配置加载
//!
//! 读取优先级：
//! 1. 命令行 `--config` 指定的 JSON 文件
//! 2. `~/.config/heartbeat-monitor/config.json`
//! 3. 默认值
//!
//! 之后再用环境变量覆盖：`HEARTBEAT_DATA_DIR`、`HEARTBEAT_DEFAULT_TIMEOUT`、
//! `HEARTBEAT_PUSHOVER_URL`、`HEARTBEAT_DRY_RUN`。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Pushover API 地址
pub const PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";

/// 创建 monitor 时未指定 timeout 的默认值（秒）
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;

/// HTTP 请求超时（秒）
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// 数据目录（monitors.json 所在位置）
    pub data_dir: PathBuf,
    pub default_timeout_secs: u64,
    pub http_timeout_secs: u64,
    pub pushover_api_url: String,
    /// 只记录日志，不实际发送通知
    pub dry_run: bool,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            data_dir: Self::default_dir(),
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            pushover_api_url: PUSHOVER_API_URL.to_string(),
            dry_run: false,
        }
    }
}

impl HeartbeatConfig {
    /// `~/.config/heartbeat-monitor`
    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("heartbeat-monitor")
    }

    pub fn default_path() -> PathBuf {
        Self::default_dir().join("config.json")
    }

    /// 按优先级加载配置并应用环境变量覆盖
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        if config.default_timeout_secs == 0 {
            warn!(path = %path.display(), "Ignoring default_timeout_secs = 0, using default");
            config.default_timeout_secs = DEFAULT_TIMEOUT_SECS;
        }
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// 用环境变量覆盖；无法解析的值忽略并告警
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("HEARTBEAT_DATA_DIR").filter(|v| !v.is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }

        if let Some(raw) = lookup("HEARTBEAT_DEFAULT_TIMEOUT") {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.default_timeout_secs = secs,
                _ => warn!(value = %raw, "Ignoring invalid HEARTBEAT_DEFAULT_TIMEOUT"),
            }
        }

        if let Some(url) = lookup("HEARTBEAT_PUSHOVER_URL").filter(|v| !v.is_empty()) {
            self.pushover_api_url = url;
        }

        if let Some(raw) = lookup("HEARTBEAT_DRY_RUN") {
            self.dry_run = matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes");
        }
    }
}
