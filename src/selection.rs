//! 选择模式与批量操作
//!
//! 在文件夹内容或标签列表上开启选择模式，累积选中的id，
//! 然后一次性执行批量操作（从文件夹移除、删除标签）。

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::{FolderApi, TagApi};
use crate::error::{ClientError, Result};
use crate::models::StatusResponse;
use crate::status::{StatusBoard, StatusLevel};

/// 对一组id执行的服务端批量操作
#[async_trait]
pub trait BulkAction: Send + Sync {
    fn name(&self) -> &str;
    async fn execute(&self, ids: &[String]) -> Result<StatusResponse>;
}

/// DELETE /folder/{id}/content
pub struct RemoveFromFolder {
    api: Arc<dyn FolderApi>,
    folder_id: String,
}

impl RemoveFromFolder {
    pub fn new(api: Arc<dyn FolderApi>, folder_id: impl Into<String>) -> Self {
        Self {
            api,
            folder_id: folder_id.into(),
        }
    }
}

#[async_trait]
impl BulkAction for RemoveFromFolder {
    fn name(&self) -> &str {
        "remove"
    }

    async fn execute(&self, ids: &[String]) -> Result<StatusResponse> {
        self.api.remove_from_folder(&self.folder_id, ids).await
    }
}

/// DELETE /tag
pub struct DeleteTags {
    api: Arc<dyn TagApi>,
}

impl DeleteTags {
    pub fn new(api: Arc<dyn TagApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl BulkAction for DeleteTags {
    fn name(&self) -> &str {
        "delete"
    }

    async fn execute(&self, ids: &[String]) -> Result<StatusResponse> {
        self.api.delete_tags(ids).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkOutcome {
    /// 服务端成功，已从列表中移除
    Applied { removed: usize },
    /// 服务端返回非success状态，选择保留以便重试
    Rejected,
}

/// 选择模式状态；选中顺序即请求中id的顺序
#[derive(Debug, Default, Clone)]
pub struct SelectionController {
    active: bool,
    selected: Vec<String>,
}

impl SelectionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// 进入选择模式，清空之前的选择
    pub fn enter(&mut self) {
        self.active = true;
        self.selected.clear();
    }

    pub fn exit(&mut self) {
        self.active = false;
        self.selected.clear();
    }

    /// 在选择/非选择模式之间切换（"Select Bookmarks" / "Cancel Selection"）
    pub fn toggle_mode(&mut self) {
        if self.active {
            self.exit();
        } else {
            self.enter();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// 不在集合中则加入，否则移除；返回切换后是否选中
    ///
    /// 选择集合只在选择模式下存在，模式外的切换不生效。
    pub fn toggle(&mut self, id: &str) -> bool {
        if !self.active {
            debug!("not in selection mode, ignoring toggle of {}", id);
            return false;
        }
        if let Some(pos) = self.selected.iter().position(|s| s == id) {
            self.selected.remove(pos);
            false
        } else {
            self.selected.push(id.to_string());
            true
        }
    }

    /// 列表重新加载后丢掉已不存在的id
    pub fn retain_present<'a>(&mut self, present: impl IntoIterator<Item = &'a str>) {
        let present: HashSet<&str> = present.into_iter().collect();
        let before = self.selected.len();
        self.selected.retain(|id| present.contains(id.as_str()));
        if self.selected.len() != before {
            debug!("dropped {} stale selections", before - self.selected.len());
        }
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.iter().any(|s| s == id)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.selected
    }

    /// 取出要提交的id；为空时拒绝
    pub fn take_for_action(&self) -> Result<Vec<String>> {
        if self.selected.is_empty() {
            return Err(ClientError::EmptySelection);
        }
        Ok(self.selected.clone())
    }

    /// 执行批量操作
    ///
    /// 空选择：提示警告，不发请求。成功：在同一遍中从 `backing`
    /// 移除这些id，清空选择并退出选择模式。失败：保留选择。
    pub async fn run<T, F>(
        &mut self,
        action: &dyn BulkAction,
        backing: &mut Vec<T>,
        key: F,
        status: &mut StatusBoard,
    ) -> Result<BulkOutcome>
    where
        T: Send,
        F: Fn(&T) -> &str + Send,
    {
        let ids = match self.take_for_action() {
            Ok(ids) => ids,
            Err(e) => {
                status.post(StatusLevel::Warning, "No items selected!");
                return Err(e);
            }
        };

        debug!("running bulk '{}' on {} ids", action.name(), ids.len());
        let response = match action.execute(&ids).await {
            Ok(response) => response,
            Err(e) => {
                status.post(StatusLevel::Error, format!("Failed to {} selected items", action.name()));
                return Err(e);
            }
        };

        if !response.is_success() {
            status.post(
                StatusLevel::Error,
                format!("Server refused to {} items: {}", action.name(), response.status),
            );
            return Ok(BulkOutcome::Rejected);
        }

        let doomed: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let before = backing.len();
        backing.retain(|item| !doomed.contains(key(item)));
        let removed = before - backing.len();

        self.exit();
        info!("✅ Bulk '{}' applied to {} items", action.name(), removed);
        status.post(StatusLevel::Success, format!("{} items updated", removed));

        Ok(BulkOutcome::Applied { removed })
    }
}
