//! 浏览器扩展桥接层

pub mod extractor;
pub mod host;
pub mod messaging;

pub use extractor::{ExtractedPage, PageExtractor, CONTENT_SCRIPT};
pub use host::{
    detect_host, Callback, CallbackHost, ExtensionHost, HostKind, HostProbe, InjectionTarget,
    LegacyTabsApi, PromiseHost, ScriptDetails, ScriptingApi, Tab, TabQuery,
};
pub use messaging::{ExtensionMessage, ExtractionBroker};

use std::sync::Arc;
use tracing::error;

use crate::error::{ClientError, Result};

/// 没有可用宿主时优雅降级：注入返回错误，查询活动标签页返回 None
#[derive(Clone, Default)]
pub struct Bridge {
    host: Option<Arc<dyn ExtensionHost>>,
}

impl Bridge {
    pub fn new(host: Option<Arc<dyn ExtensionHost>>) -> Self {
        Self { host }
    }

    pub fn detect(probe: &HostProbe) -> Self {
        Self::new(detect_host(probe))
    }

    pub fn is_available(&self) -> bool {
        self.host.is_some()
    }

    pub fn kind(&self) -> Option<HostKind> {
        self.host.as_ref().map(|h| h.kind())
    }

    pub async fn execute_content_script(&self, tab_id: u32, file: &str) -> Result<()> {
        match &self.host {
            Some(host) => host.execute_content_script(tab_id, file).await,
            None => {
                error!("❌ No compatible executeScript API found");
                Err(ClientError::HostUnavailable)
            }
        }
    }

    pub async fn get_active_tab(&self) -> Result<Option<Tab>> {
        match &self.host {
            Some(host) => host.active_tab().await,
            None => {
                error!("❌ No compatible getActiveTab API found");
                Ok(None)
            }
        }
    }

    pub async fn send_to_tab(&self, tab_id: u32, message: ExtensionMessage) -> Result<()> {
        match &self.host {
            Some(host) => host.send_to_tab(tab_id, message).await,
            None => Err(ClientError::HostUnavailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_host_soft_fails() {
        let bridge = Bridge::detect(&HostProbe::default());
        assert!(!bridge.is_available());
        assert!(bridge.kind().is_none());

        let err = bridge.execute_content_script(1, CONTENT_SCRIPT).await.unwrap_err();
        assert!(matches!(err, ClientError::HostUnavailable));
        assert_eq!(bridge.get_active_tab().await.unwrap(), None);
    }
}
