//! 浏览器扩展宿主API适配
//!
//! 两种互不兼容的宿主：
//! - MV3：`chrome.scripting` / `chrome.tabs`，返回 Promise
//! - MV2：`browser.tabs.executeScript` 等，回调风格
//!
//! 启动时探测一次，调用方只依赖统一的 `ExtensionHost`。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info};

use super::messaging::ExtensionMessage;
use crate::error::{ClientError, Result};

/// 浏览器标签页
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tab {
    pub id: u32,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabQuery {
    pub active: bool,
    pub current_window: bool,
}

impl TabQuery {
    /// 当前窗口中的活动标签页
    pub fn active_in_current_window() -> Self {
        Self {
            active: true,
            current_window: true,
        }
    }
}

/// MV3 `executeScript` 的 `target`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionTarget {
    pub tab_id: u32,
}

/// MV2 `tabs.executeScript` 的 details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptDetails {
    pub file: String,
}

/// MV3 Promise风格的原始API
#[async_trait]
pub trait ScriptingApi: Send + Sync {
    async fn execute_script(&self, target: InjectionTarget, files: Vec<String>) -> Result<()>;
    async fn query_tabs(&self, query: TabQuery) -> Result<Vec<Tab>>;
    async fn send_message(&self, tab_id: u32, message: ExtensionMessage) -> Result<()>;
}

pub type Callback<T> = Box<dyn FnOnce(Result<T>) + Send>;

/// MV2 回调风格的原始API
pub trait LegacyTabsApi: Send + Sync {
    fn execute_script(&self, tab_id: u32, details: ScriptDetails, callback: Callback<()>);
    fn query(&self, query: TabQuery, callback: Callback<Vec<Tab>>);
    fn send_message(&self, tab_id: u32, message: ExtensionMessage, callback: Callback<()>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    /// MV3 scripting API
    Promise,
    /// MV2 tabs API
    Callback,
}

/// 统一的宿主接口
#[async_trait]
pub trait ExtensionHost: Send + Sync {
    fn kind(&self) -> HostKind;

    /// 把内容脚本注入到标签页的文档上下文中运行
    async fn execute_content_script(&self, tab_id: u32, file: &str) -> Result<()>;

    /// 当前窗口的活动标签页
    async fn active_tab(&self) -> Result<Option<Tab>>;

    async fn send_to_tab(&self, tab_id: u32, message: ExtensionMessage) -> Result<()>;
}

pub struct PromiseHost {
    api: Arc<dyn ScriptingApi>,
}

impl PromiseHost {
    pub fn new(api: Arc<dyn ScriptingApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ExtensionHost for PromiseHost {
    fn kind(&self) -> HostKind {
        HostKind::Promise
    }

    async fn execute_content_script(&self, tab_id: u32, file: &str) -> Result<()> {
        self.api
            .execute_script(InjectionTarget { tab_id }, vec![file.to_string()])
            .await
    }

    async fn active_tab(&self) -> Result<Option<Tab>> {
        let tabs = self.api.query_tabs(TabQuery::active_in_current_window()).await?;
        Ok(tabs.into_iter().next())
    }

    async fn send_to_tab(&self, tab_id: u32, message: ExtensionMessage) -> Result<()> {
        self.api.send_message(tab_id, message).await
    }
}

pub struct CallbackHost {
    api: Arc<dyn LegacyTabsApi>,
}

impl CallbackHost {
    pub fn new(api: Arc<dyn LegacyTabsApi>) -> Self {
        Self { api }
    }
}

/// 把回调式调用转换成可 await 的 receiver
fn bridge_callback<T: Send + 'static>(register: impl FnOnce(Callback<T>)) -> oneshot::Receiver<Result<T>> {
    let (tx, rx) = oneshot::channel();
    register(Box::new(move |result| {
        // 调用方可能已经放弃等待
        let _ = tx.send(result);
    }));
    rx
}

/// 回调被丢弃而从未调用时视为取消
async fn settle<T>(rx: oneshot::Receiver<Result<T>>) -> Result<T> {
    match rx.await {
        Ok(result) => result,
        Err(_) => Err(ClientError::Cancelled),
    }
}

#[async_trait]
impl ExtensionHost for CallbackHost {
    fn kind(&self) -> HostKind {
        HostKind::Callback
    }

    async fn execute_content_script(&self, tab_id: u32, file: &str) -> Result<()> {
        let details = ScriptDetails {
            file: file.to_string(),
        };
        let rx = bridge_callback(|cb| self.api.execute_script(tab_id, details, cb));
        settle(rx).await
    }

    async fn active_tab(&self) -> Result<Option<Tab>> {
        let rx = bridge_callback(|cb| self.api.query(TabQuery::active_in_current_window(), cb));
        Ok(settle(rx).await?.into_iter().next())
    }

    async fn send_to_tab(&self, tab_id: u32, message: ExtensionMessage) -> Result<()> {
        let rx = bridge_callback(|cb| self.api.send_message(tab_id, message, cb));
        settle(rx).await
    }
}

/// 运行时能探测到的宿主API
#[derive(Clone, Default)]
pub struct HostProbe {
    pub scripting: Option<Arc<dyn ScriptingApi>>,
    pub legacy_tabs: Option<Arc<dyn LegacyTabsApi>>,
}

/// 选择宿主：优先Promise API，其次回调API，都没有时返回 None
pub fn detect_host(probe: &HostProbe) -> Option<Arc<dyn ExtensionHost>> {
    if let Some(api) = &probe.scripting {
        info!("🧩 Using promise-based scripting API");
        return Some(Arc::new(PromiseHost::new(api.clone())));
    }
    if let Some(api) = &probe.legacy_tabs {
        info!("🧩 Using callback-based tabs API");
        return Some(Arc::new(CallbackHost::new(api.clone())));
    }
    error!("❌ No compatible browser extension API found");
    None
}
