//! 读取活动标签页的HTML
//!
//! 流程：查询活动标签页 → 注册监听器 → 注入内容脚本 → 请求提取 →
//! 等待 `htmlExtracted`。整个过程受同一个超时约束；无论如何结束，
//! 监听器都会被移除，迟到的消息不再生效。

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::host::Tab;
use super::messaging::{ExtensionMessage, ExtractionBroker};
use super::Bridge;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

pub const CONTENT_SCRIPT: &str = "content.js";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub tab: Tab,
    pub html: String,
}

#[derive(Clone)]
pub struct PageExtractor {
    bridge: Arc<Bridge>,
    broker: ExtractionBroker,
    timeout: Duration,
    script: String,
}

impl PageExtractor {
    pub fn new(bridge: Arc<Bridge>, broker: ExtractionBroker, timeout: Duration) -> Self {
        Self {
            bridge,
            broker,
            timeout,
            script: CONTENT_SCRIPT.to_string(),
        }
    }

    /// 使用配置中的提取超时
    pub fn from_config(bridge: Arc<Bridge>, broker: ExtractionBroker, config: &ClientConfig) -> Self {
        Self::new(bridge, broker, config.extraction_timeout())
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = script.into();
        self
    }

    pub fn broker(&self) -> &ExtractionBroker {
        &self.broker
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub async fn extract_active_page(&self) -> Result<ExtractedPage> {
        let tab = self
            .bridge
            .get_active_tab()
            .await?
            .ok_or(ClientError::HostUnavailable)?;
        self.extract_from_tab(tab).await
    }

    pub async fn extract_from_tab(&self, tab: Tab) -> Result<ExtractedPage> {
        // 先注册再注入，内容脚本可能在注入时立即回发
        let (request_id, rx) = self.broker.register();
        let _listener = ListenerGuard {
            broker: &self.broker,
            id: request_id,
        };
        let tab_id = tab.id;
        debug!("extracting tab {} as {}", tab_id, request_id);

        // 注入、请求和等待回复共用一个时限
        let exchange = async {
            self.bridge.execute_content_script(tab_id, &self.script).await?;

            let request = ExtensionMessage::ExtractHtml {
                request_id: Some(request_id),
            };
            if let Err(e) = self.bridge.send_to_tab(tab_id, request).await {
                warn!("⚠️  extractHTML not delivered to tab {}: {}", tab_id, e);
            }

            rx.await.map_err(|_| ClientError::Cancelled)
        };

        let outcome = tokio::time::timeout(self.timeout, exchange).await;
        match outcome {
            Ok(Ok(html)) => {
                info!("📄 Read {} bytes from tab {}", html.len(), tab_id);
                Ok(ExtractedPage { tab, html })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!("⏱️  No response from content script after {:?}", self.timeout);
                Err(ClientError::ExtractionTimeout {
                    timeout_secs: self.timeout.as_secs(),
                })
            }
        }
    }
}

/// 离开提取（完成、出错、超时或future被丢弃）时移除监听器
struct ListenerGuard<'a> {
    broker: &'a ExtractionBroker,
    id: Uuid,
}

impl Drop for ListenerGuard<'_> {
    fn drop(&mut self) {
        if self.broker.cancel(self.id) {
            debug!("dropped listener for {}", self.id);
        }
    }
}
