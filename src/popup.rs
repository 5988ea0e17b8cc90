//! 弹窗：保存当前页面为书签
//!
//! 读取活动标签页的HTML，连同备注、标签和目标文件夹一起提交。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::ContentApi;
use crate::bridge::PageExtractor;
use crate::error::{ClientError, Result};
use crate::models::{Bookmark, SaveBookmarkRequest, SaveTag, Tag};
use crate::status::{StatusBoard, StatusLevel, StatusMessage};

pub const MAX_NOTES_CHARS: usize = 280;

/// 表单内容
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookmarkDraft {
    notes: String,
    tags: Vec<String>,
    /// None 表示未选择文件夹
    pub folder_id: Option<String>,
}

impl BookmarkDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// 超出上限的部分被截掉（按字符计）
    pub fn set_notes(&mut self, notes: &str) {
        self.notes = notes.chars().take(MAX_NOTES_CHARS).collect();
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn notes_len(&self) -> usize {
        self.notes.chars().count()
    }

    /// 添加标签；空白或重复时忽略，返回是否加入
    pub fn add_tag(&mut self, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() || self.tags.iter().any(|t| t == tag) {
            return false;
        }
        self.tags.push(tag.to_string());
        true
    }

    pub fn remove_tag(&mut self, tag: &str) {
        self.tags.retain(|t| t != tag);
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// 生成请求体；已有标签带上其id，新标签id为空
    pub fn to_request(&self, url: &str, title: Option<String>, html: String, known: &[Tag]) -> SaveBookmarkRequest {
        let tags = self
            .tags
            .iter()
            .map(|name| SaveTag {
                tag_name: name.clone(),
                tag_id: known
                    .iter()
                    .find(|t| &t.tag_name == name)
                    .map(|t| t.tag_id.clone())
                    .unwrap_or_default(),
            })
            .collect();

        SaveBookmarkRequest {
            url: url.to_string(),
            title,
            notes: (!self.notes.is_empty()).then(|| self.notes.clone()),
            html,
            tags,
            folder_id: self.folder_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// 服务端状态不是 Success
    Rejected,
}

struct PopupState {
    draft: BookmarkDraft,
    known_tags: Vec<Tag>,
    recent: Vec<Bookmark>,
    status: StatusBoard,
}

#[derive(Clone)]
pub struct SaveController {
    api: Arc<dyn ContentApi>,
    extractor: PageExtractor,
    saving: Arc<AtomicBool>,
    state: Arc<Mutex<PopupState>>,
}

/// 保存结束时复位 in-flight 标志（包括提前返回）
struct SavingGuard(Arc<AtomicBool>);

impl Drop for SavingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SaveController {
    pub fn new(api: Arc<dyn ContentApi>, extractor: PageExtractor) -> Self {
        Self {
            api,
            extractor,
            saving: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(PopupState {
                draft: BookmarkDraft::new(),
                known_tags: Vec::new(),
                recent: Vec::new(),
                status: StatusBoard::default(),
            })),
        }
    }

    pub fn with_status_ttl(self, ttl: Duration) -> Self {
        self.lock().status = StatusBoard::new(ttl);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PopupState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// 没有可用宿主时保存按钮不可用
    pub fn is_enabled(&self) -> bool {
        self.extractor.bridge().is_available() && !self.is_saving()
    }

    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::SeqCst)
    }

    pub fn draft(&self) -> BookmarkDraft {
        self.lock().draft.clone()
    }

    pub fn edit_draft<R>(&self, f: impl FnOnce(&mut BookmarkDraft) -> R) -> R {
        f(&mut self.lock().draft)
    }

    pub fn set_known_tags(&self, tags: Vec<Tag>) {
        self.lock().known_tags = tags;
    }

    pub fn recent(&self) -> Vec<Bookmark> {
        self.lock().recent.clone()
    }

    pub fn status(&self) -> Option<StatusMessage> {
        self.lock().status.current().cloned()
    }

    pub fn acknowledge_status(&self) {
        self.lock().status.acknowledge();
    }

    fn post(&self, level: StatusLevel, text: &str) {
        self.lock().status.post(level, text);
    }

    pub async fn refresh_recent(&self) -> Result<usize> {
        let recent = self.api.recent_bookmarks().await?;
        let count = recent.len();
        self.lock().recent = recent;
        Ok(count)
    }

    pub async fn save_active_page(&self) -> Result<SaveOutcome> {
        if !self.extractor.bridge().is_available() {
            return Err(ClientError::HostUnavailable);
        }
        if self.saving.swap(true, Ordering::SeqCst) {
            debug!("save already in flight, ignoring");
            return Err(ClientError::Busy);
        }
        let _guard = SavingGuard(self.saving.clone());

        let page = match self.extractor.extract_active_page().await {
            Ok(page) => page,
            Err(e @ ClientError::ExtractionTimeout { .. }) => {
                self.lock().status.post_sticky(StatusLevel::Error, "Could not read page");
                return Err(e);
            }
            Err(e) => {
                self.post(StatusLevel::Error, "Failed to save bookmark");
                return Err(e);
            }
        };

        let url = page.tab.url.clone().unwrap_or_default();
        let request = {
            let state = self.lock();
            state.draft.to_request(&url, page.tab.title.clone(), page.html, &state.known_tags)
        };

        let response = match self.api.save_bookmark(&request).await {
            Ok(response) => response,
            Err(e) => {
                self.post(StatusLevel::Error, "Failed to save bookmark");
                return Err(e);
            }
        };

        if !response.is_success() {
            warn!("⚠️  Server returned error: {}", response.status);
            self.post(StatusLevel::Error, "Failed to save bookmark");
            return Ok(SaveOutcome::Rejected);
        }

        info!("🔖 Saved {}", url);
        {
            let mut state = self.lock();
            state.draft.clear();
            state.status.post(StatusLevel::Success, "Bookmark successfully saved");
        }

        if let Err(e) = self.refresh_recent().await {
            warn!("⚠️  Could not refresh recent bookmarks: {}", e);
        }
        Ok(SaveOutcome::Saved)
    }
}
