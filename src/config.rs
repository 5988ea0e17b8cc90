use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// 本地开发时的默认后端
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000";

/// 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API根地址 (如 https://api.csphere.io)
    pub api_base_url: String,

    /// 单个HTTP请求超时秒数
    pub request_timeout_secs: u64,

    /// 等待内容脚本回传HTML的秒数
    pub extraction_timeout_secs: u64,

    /// 距离底部多少像素时加载下一页
    pub scroll_threshold_px: u32,

    /// 普通状态消息自动消失的秒数
    pub status_ttl_secs: u64,

    /// token文件位置 (None = ~/.csphere/token.json)
    pub token_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: 10,
            extraction_timeout_secs: 10,
            scroll_threshold_px: 250,
            status_ttl_secs: 5,
            token_path: None,
        }
    }
}

impl ClientConfig {
    /// 加载配置：文件（不存在则默认值） + 环境变量覆盖
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// 从指定文件加载，文件不存在时返回默认值
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("配置文件不存在，使用默认配置: {:?}", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: ClientConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;

        info!("📄 Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write config file {:?}", path))?;
        Ok(())
    }

    /// `CSPHERE_API_BASE_URL` 覆盖文件中的地址
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("CSPHERE_API_BASE_URL") {
            if !url.trim().is_empty() {
                debug!("API base url overridden by env: {}", url);
                self.api_base_url = url;
            }
        }
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        let base = self.api_base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(anyhow!(
                "❌ Error: api_base_url must start with http:// or https:// (got '{}')",
                self.api_base_url
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("❌ Error: request_timeout_secs must be greater than 0"));
        }
        if self.extraction_timeout_secs == 0 {
            return Err(anyhow!("❌ Error: extraction_timeout_secs must be greater than 0"));
        }
        Ok(())
    }

    /// 去掉末尾斜杠的API根地址
    pub fn base_url(&self) -> &str {
        self.api_base_url.trim().trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }

    pub fn status_ttl(&self) -> Duration {
        Duration::from_secs(self.status_ttl_secs)
    }

    pub fn token_path(&self) -> Result<PathBuf> {
        match &self.token_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("token.json")),
        }
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    fn config_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        Ok(PathBuf::from(home).join(".csphere"))
    }
}
