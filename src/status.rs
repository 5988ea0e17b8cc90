//! 面向用户的状态消息
//!
//! 普通消息在 `ttl` 之后自动消失（弹窗里是5秒），
//! 粘性消息（如读取页面超时）一直显示直到用户确认或重试。

use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub level: StatusLevel,
    pub sticky: bool,
}

#[derive(Debug)]
pub struct StatusBoard {
    ttl: Duration,
    current: Option<(StatusMessage, Instant)>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl StatusBoard {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, current: None }
    }

    /// 显示一条消息，替换当前消息
    pub fn post(&mut self, level: StatusLevel, text: impl Into<String>) {
        self.set(level, text.into(), false);
    }

    /// 显示一条需要确认的消息
    pub fn post_sticky(&mut self, level: StatusLevel, text: impl Into<String>) {
        self.set(level, text.into(), true);
    }

    fn set(&mut self, level: StatusLevel, text: String, sticky: bool) {
        match level {
            StatusLevel::Error => error!("❌ {}", text),
            StatusLevel::Warning => warn!("⚠️  {}", text),
            StatusLevel::Success => info!("✅ {}", text),
            StatusLevel::Info => info!("{}", text),
        }
        self.current = Some((StatusMessage { text, level, sticky }, Instant::now()));
    }

    /// 当前仍在显示的消息
    pub fn current(&self) -> Option<&StatusMessage> {
        self.current_at(Instant::now())
    }

    pub fn current_at(&self, now: Instant) -> Option<&StatusMessage> {
        let (message, posted_at) = self.current.as_ref()?;
        if message.sticky || now.saturating_duration_since(*posted_at) < self.ttl {
            Some(message)
        } else {
            None
        }
    }

    /// 用户确认，清除消息（包括粘性消息）
    pub fn acknowledge(&mut self) {
        self.current = None;
    }
}
