//! 文件夹与标签视图
//!
//! 非分页列表：一次加载全部内容，在其上叠加选择模式。

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::{FolderApi, TagApi};
use crate::error::{ClientError, Result};
use crate::models::{ActionResponse, Bookmark, Folder, FolderMetadata, StatusResponse, Tag};
use crate::selection::{BulkOutcome, DeleteTags, RemoveFromFolder, SelectionController};
use crate::status::{StatusBoard, StatusLevel};

/// 单个文件夹的内容页
pub struct FolderView {
    api: Arc<dyn FolderApi>,
    folder_id: String,
    items: Vec<Bookmark>,
    metadata: Option<FolderMetadata>,
    pub selection: SelectionController,
    pub status: StatusBoard,
}

impl FolderView {
    pub fn new(api: Arc<dyn FolderApi>, folder_id: impl Into<String>) -> Self {
        Self {
            api,
            folder_id: folder_id.into(),
            items: Vec::new(),
            metadata: None,
            selection: SelectionController::new(),
            status: StatusBoard::default(),
        }
    }

    pub fn with_status_ttl(mut self, ttl: Duration) -> Self {
        self.status = StatusBoard::new(ttl);
        self
    }

    pub fn folder_id(&self) -> &str {
        &self.folder_id
    }

    pub fn items(&self) -> &[Bookmark] {
        &self.items
    }

    pub fn metadata(&self) -> Option<&FolderMetadata> {
        self.metadata.as_ref()
    }

    /// 加载文件夹内容；失败时保留之前的列表
    ///
    /// 选择中已不在新列表里的id会被丢弃。
    pub async fn load(&mut self) -> Result<usize> {
        match self.api.folder_contents(&self.folder_id).await {
            Ok(items) => {
                debug!("folder {} has {} items", self.folder_id, items.len());
                self.items = items;
                self.selection
                    .retain_present(self.items.iter().map(|b| b.content_id.as_str()));
                Ok(self.items.len())
            }
            Err(e) => {
                self.status.post(StatusLevel::Error, "Failed to load folder");
                Err(e)
            }
        }
    }

    pub async fn remove_selected(&mut self) -> Result<BulkOutcome> {
        let action = RemoveFromFolder::new(self.api.clone(), self.folder_id.clone());
        self.selection
            .run(&action, &mut self.items, |b| b.content_id.as_str(), &mut self.status)
            .await
    }

    pub async fn load_metadata(&mut self) -> Result<&FolderMetadata> {
        let metadata = self.api.folder_metadata(&self.folder_id).await?;
        Ok(self.metadata.insert(metadata))
    }

    pub async fn save_metadata(&mut self, metadata: FolderMetadata) -> Result<()> {
        if metadata.name.trim().is_empty() {
            return Err(ClientError::InvalidInput("folder name cannot be empty".into()));
        }
        self.api.update_folder_metadata(&self.folder_id, &metadata).await?;
        info!("📁 Folder {} updated", self.folder_id);
        self.status.post(StatusLevel::Success, "Folder settings saved");
        self.metadata = Some(metadata);
        Ok(())
    }
}

/// 标签管理页
pub struct TagView {
    api: Arc<dyn TagApi>,
    tags: Vec<Tag>,
    pub selection: SelectionController,
    pub status: StatusBoard,
}

impl TagView {
    pub fn new(api: Arc<dyn TagApi>) -> Self {
        Self {
            api,
            tags: Vec::new(),
            selection: SelectionController::new(),
            status: StatusBoard::default(),
        }
    }

    pub fn with_status_ttl(mut self, ttl: Duration) -> Self {
        self.status = StatusBoard::new(ttl);
        self
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub async fn load(&mut self) -> Result<usize> {
        self.tags = self.api.list_tags().await?;
        self.selection
            .retain_present(self.tags.iter().map(|t| t.tag_id.as_str()));
        Ok(self.tags.len())
    }

    /// 创建标签；空名或与现有标签重名时本地拒绝
    pub async fn create_tag(&mut self, name: &str) -> Result<StatusResponse> {
        let name = name.trim();
        if name.is_empty() {
            self.status.post(StatusLevel::Warning, "Tag name cannot be empty");
            return Err(ClientError::InvalidInput("tag name cannot be empty".into()));
        }
        if self.tags.iter().any(|t| t.tag_name == name) {
            self.status.post(StatusLevel::Warning, format!("Tag '{}' already exists", name));
            return Err(ClientError::InvalidInput(format!("tag '{}' already exists", name)));
        }

        let response = self.api.create_tag(name).await?;
        if response.is_success() {
            self.status.post(StatusLevel::Success, format!("Tag '{}' created", name));
            self.load().await?;
        } else {
            self.status.post(StatusLevel::Error, format!("Failed to create tag '{}'", name));
        }
        Ok(response)
    }

    pub async fn delete_selected(&mut self) -> Result<BulkOutcome> {
        let action = DeleteTags::new(self.api.clone());
        self.selection
            .run(&action, &mut self.tags, |t| t.tag_id.as_str(), &mut self.status)
            .await
    }

    pub async fn bookmarks_for(&self, tag_id: &str) -> Result<Vec<Bookmark>> {
        self.api.tag_bookmarks(tag_id).await
    }
}

/// 文件夹列表缓存：首次使用或失效后才请求
pub struct FolderCache {
    api: Arc<dyn FolderApi>,
    folders: Mutex<Option<Vec<Folder>>>,
}

impl FolderCache {
    pub fn new(api: Arc<dyn FolderApi>) -> Self {
        Self {
            api,
            folders: Mutex::new(None),
        }
    }

    pub async fn get(&self) -> Result<Vec<Folder>> {
        // 持锁期间请求，并发调用只触发一次
        let mut slot = self.folders.lock().await;
        if let Some(folders) = slot.as_ref() {
            return Ok(folders.clone());
        }
        let folders = self.api.list_folders().await?;
        debug!("cached {} folders", folders.len());
        Ok(slot.insert(folders).clone())
    }

    /// 删除文件夹，成功后同步从缓存中移除
    pub async fn delete(&self, folder_id: &str) -> Result<ActionResponse> {
        let response = self.api.delete_folder(folder_id).await?;
        if response.success {
            if let Some(folders) = self.folders.lock().await.as_mut() {
                folders.retain(|f| f.folder_id != folder_id);
            }
        } else {
            warn!(
                "⚠️  Folder {} not deleted: {}",
                folder_id,
                response.message.as_deref().unwrap_or("no reason given")
            );
        }
        Ok(response)
    }

    pub async fn invalidate(&self) {
        *self.folders.lock().await = None;
    }
}
