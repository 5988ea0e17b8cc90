//! 扩展运行时消息与提取请求的关联
//!
//! 每次提取注册一个请求id和一个 oneshot。内容脚本回发的
//! `htmlExtracted` 按id交付；不带id的消息交给最早的未完成请求。
//! 每个请求只交付一次，之后的重复消息不产生效果。

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;

/// 弹窗与内容脚本之间的运行时消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum ExtensionMessage {
    #[serde(rename = "extractHTML")]
    ExtractHtml {
        #[serde(default, rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<Uuid>,
    },
    #[serde(rename = "htmlExtracted")]
    HtmlExtracted {
        #[serde(default, rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<Uuid>,
        html: String,
    },
}

#[derive(Default)]
struct Pending {
    order: VecDeque<Uuid>,
    waiters: HashMap<Uuid, oneshot::Sender<String>>,
}

impl Pending {
    fn take(&mut self, id: &Uuid) -> Option<oneshot::Sender<String>> {
        let sender = self.waiters.remove(id)?;
        self.order.retain(|queued| queued != id);
        Some(sender)
    }

    /// 丢掉接收端已释放的监听器
    fn prune_closed(&mut self) {
        let waiters = &mut self.waiters;
        waiters.retain(|_, sender| !sender.is_closed());
        self.order.retain(|id| waiters.contains_key(id));
    }

    fn take_oldest(&mut self) -> Option<(Uuid, oneshot::Sender<String>)> {
        while let Some(id) = self.order.pop_front() {
            if let Some(sender) = self.waiters.remove(&id) {
                return Some((id, sender));
            }
        }
        None
    }
}

#[derive(Clone, Default)]
pub struct ExtractionBroker {
    inner: Arc<Mutex<Pending>>,
}

impl ExtractionBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Pending> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// 注册一个一次性监听器
    pub fn register(&self) -> (Uuid, oneshot::Receiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        let mut pending = self.lock();
        pending.prune_closed();
        pending.order.push_back(id);
        pending.waiters.insert(id, tx);
        debug!("registered extraction {}", id);
        (id, rx)
    }

    /// 交付一条消息；返回是否有请求因此完成
    pub fn dispatch(&self, message: &ExtensionMessage) -> bool {
        let (request_id, html) = match message {
            ExtensionMessage::HtmlExtracted { request_id, html } => (request_id, html),
            ExtensionMessage::ExtractHtml { .. } => return false,
        };

        let mut pending = self.lock();
        match request_id {
            Some(id) => match pending.take(id) {
                Some(sender) => sender.send(html.clone()).is_ok(),
                None => {
                    debug!("no pending extraction for {}, ignoring", id);
                    false
                }
            },
            None => {
                // 接收端已放弃的请求跳过，继续找下一个
                while let Some((id, sender)) = pending.take_oldest() {
                    if sender.send(html.clone()).is_ok() {
                        debug!("delivered uncorrelated html to {}", id);
                        return true;
                    }
                }
                debug!("no pending extraction, ignoring html");
                false
            }
        }
    }

    /// 交付来自运行时的原始JSON消息
    pub fn dispatch_json(&self, raw: &str) -> Result<bool> {
        let message: ExtensionMessage = serde_json::from_str(raw)?;
        Ok(self.dispatch(&message))
    }

    /// 移除监听器（超时或放弃）
    pub fn cancel(&self, id: Uuid) -> bool {
        self.lock().take(&id).is_some()
    }

    pub fn pending(&self) -> usize {
        let mut pending = self.lock();
        pending.prune_closed();
        pending.waiters.len()
    }
}
