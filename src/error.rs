//! 客户端错误类型
//!
//! 所有异步操作的失败都在发起它的事件处理边界被捕获，
//! 这里的分类决定了调用方如何向用户展示。

use thiserror::Error;

/// 客户端核心的错误
#[derive(Debug, Error)]
pub enum ClientError {
    /// 网络不可达、连接被拒绝等
    #[error("Transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// 服务端返回非2xx
    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    /// 响应体无法解析
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// 本地没有保存的token
    #[error("Not signed in: no token available")]
    Unauthenticated,

    /// 内容脚本在限定时间内没有回复
    #[error("Could not read page: no response from content script after {timeout_secs}s")]
    ExtractionTimeout { timeout_secs: u64 },

    /// 当前浏览器没有可用的脚本注入API
    #[error("No compatible browser extension API found")]
    HostUnavailable,

    /// 批量操作时没有选中任何条目
    #[error("No items selected")]
    EmptySelection,

    /// 请求被取消（视图卸载或查询变化）
    #[error("Request cancelled")]
    Cancelled,

    /// 本地校验失败（空标签名、重复标签等），不发请求
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 上一次保存尚未完成
    #[error("A save is already in progress")]
    Busy,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// 是否可以通过再次触发（滚动、重试按钮）恢复
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Transport(_)
                | ClientError::Status { .. }
                | ClientError::ExtractionTimeout { .. }
                | ClientError::Cancelled
        )
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
