//! 书签数据契约
//!
//! 与远端API共享的数据结构。客户端把书签当作不透明记录处理，
//! 只依赖 `content_id` 的唯一性和分类标签。

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// 渲染时标题缺失的占位文本
pub const UNTITLED: &str = "Untitled";

/// 服务端保存的一条书签
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub content_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub ai_summary: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub first_saved_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<Tag>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub folder: Option<String>,
}

impl Bookmark {
    /// 创建只有id和url的书签（测试和导入时使用）
    pub fn new(content_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            content_id: content_id.into(),
            title: None,
            url: url.into(),
            source: None,
            ai_summary: None,
            first_saved_at: None,
            created_at: None,
            notes: None,
            tags: Vec::new(),
            categories: Vec::new(),
            folder: None,
        }
    }

    pub fn with_categories(mut self, categories: Vec<Category>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// 标题，缺失或为空白时返回 "Untitled"
    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(t) if !t.trim().is_empty() => t,
            _ => UNTITLED,
        }
    }

    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        self.first_saved_at.or(self.created_at)
    }

    pub fn category_ids(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.category_id.as_str())
    }

    /// 保存时间的相对描述
    ///
    /// 天数按 `ceil(|now - saved| / 1天)` 计算：1 为 "Today"，2 为 "Yesterday"，
    /// 7天以内为 "N days ago"，更早的显示日期。
    pub fn relative_saved_label(&self, now: DateTime<Utc>) -> String {
        let Some(saved) = self.saved_at() else {
            return "Unknown date".to_string();
        };

        let diff_ms = (now - saved).num_milliseconds().unsigned_abs();
        let day_ms: u64 = 24 * 60 * 60 * 1000;
        let diff_days = (diff_ms + day_ms - 1) / day_ms;

        match diff_days {
            0 | 1 => "Today".to_string(),
            2 => "Yesterday".to_string(),
            d if d <= 7 => format!("{} days ago", d),
            _ => saved.format("%Y-%m-%d").to_string(),
        }
    }
}

/// 分类（标签式的分面），以 `category_id` 为去重键
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Category {
    pub category_id: String,
    #[serde(default)]
    pub category_name: String,
}

impl Category {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            category_id: id.into(),
            category_name: name.into(),
        }
    }
}

/// 用户标签
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub tag_id: String,
    #[serde(default)]
    pub tag_name: String,
}

/// 列表/搜索/未读接口返回的一页
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookmarkPage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub bookmarks: Vec<Bookmark>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub categories: Vec<Category>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub has_next: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub next_cursor: String,
}

/// 保存书签时携带的标签
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveTag {
    pub tag_name: String,
    pub tag_id: String,
}

/// POST /content/save 请求体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveBookmarkRequest {
    pub url: String,
    pub title: Option<String>,
    pub notes: Option<String>,
    /// 完整的页面HTML
    pub html: String,
    pub tags: Vec<SaveTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
}

/// 通用的 `{status}` 响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub status: String,
}

impl StatusResponse {
    pub fn new(status: impl Into<String>) -> Self {
        Self { status: status.into() }
    }

    /// 保存接口回复 "Success"，文件夹接口回复 "success"
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }
}

/// 用户文件夹
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub folder_id: String,
    pub folder_name: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub file_count: u64,
}

/// GET /folder 响应
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FolderListResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<Folder>,
    #[serde(default)]
    pub error: Option<String>,
}

/// 文件夹的智能归类设置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub keywords: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url_patterns: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default)]
    pub smart_bucketing_enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnreadCount {
    #[serde(default)]
    pub count: u64,
}

/// `{success, message}` 形式的操作结果（标记已读、加入/删除文件夹）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl ActionResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// GET /content/{id}/archive 响应
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArchiveLink {
    #[serde(default)]
    pub url: Option<String>,
}

/// 回顾视图中的一个月份分组
#[derive(Debug, Clone, PartialEq)]
pub struct MonthGroup {
    pub month: String,
    pub bookmarks: Vec<Bookmark>,
}

/// GET /content/rediscover 响应：月份 → 书签列表，保持服务端给出的顺序
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RediscoverFeed {
    pub groups: Vec<MonthGroup>,
}

impl RediscoverFeed {
    pub fn total(&self) -> usize {
        self.groups.iter().map(|g| g.bookmarks.len()).sum()
    }
}

struct RediscoverVisitor;

impl<'de> Visitor<'de> for RediscoverVisitor {
    type Value = RediscoverFeed;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object mapping months to bookmark lists")
    }

    fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
        Ok(RediscoverFeed::default())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut groups = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((month, bookmarks)) = map.next_entry::<String, Option<Vec<Bookmark>>>()? {
            groups.push(MonthGroup {
                month,
                bookmarks: bookmarks.unwrap_or_default(),
            });
        }
        Ok(RediscoverFeed { groups })
    }
}

impl<'de> Deserialize<'de> for RediscoverFeed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RediscoverVisitor)
    }
}

/// 把JSON里的 null 当作默认值
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// 接受RFC3339或不带时区的ISO时间（按UTC处理），无法解析时为 None
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
