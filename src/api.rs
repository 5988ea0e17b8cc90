//! Csphere REST API客户端
//!
//! 所有持久状态（书签、文件夹、标签）都在远端，这里只负责调用。
//! 控制器只依赖 `ContentApi` / `BookmarkActions` / `FolderApi` / `TagApi`，
//! 测试时可以替换成脚本化的实现。

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::models::{
    ActionResponse, ArchiveLink, Bookmark, BookmarkPage, Folder, FolderListResponse, FolderMetadata,
    RediscoverFeed, SaveBookmarkRequest, StatusResponse, Tag, UnreadCount,
};
use crate::token_store::TokenStore;

/// 书签内容相关接口
#[async_trait]
pub trait ContentApi: Send + Sync {
    /// GET /content，可选 `cursor`
    async fn list_bookmarks(&self, cursor: Option<&str>) -> Result<BookmarkPage>;

    /// GET /content/unread，可选 `cursor`
    async fn list_unread(&self, cursor: Option<&str>) -> Result<BookmarkPage>;

    /// GET /content/search?query=
    async fn search_bookmarks(&self, query: &str, cursor: Option<&str>) -> Result<BookmarkPage>;

    /// POST /content/recent
    async fn recent_bookmarks(&self) -> Result<Vec<Bookmark>>;

    /// GET /content/unread/count
    async fn unread_count(&self) -> Result<u64>;

    /// POST /content/save
    async fn save_bookmark(&self, request: &SaveBookmarkRequest) -> Result<StatusResponse>;

    /// GET /content/rediscover，按月份分组
    async fn rediscover(&self) -> Result<RediscoverFeed>;
}

/// 单条书签上的操作
#[async_trait]
pub trait BookmarkActions: Send + Sync {
    /// POST /content/save/url，只提交链接，由服务端抓取页面
    async fn save_url(&self, url: &str) -> Result<()>;

    /// POST /content/update/notes
    async fn update_notes(&self, content_id: &str, notes: &str) -> Result<()>;

    /// POST /content/read/{id}
    async fn mark_read(&self, content_id: &str) -> Result<ActionResponse>;

    /// POST /content/tab 或 /content/untab
    async fn set_read_later(&self, content_id: &str, saved: bool) -> Result<()>;

    /// GET /content/{id}/archive，返回存档页面的临时链接
    async fn archive_url(&self, content_id: &str) -> Result<Option<String>>;
}

/// 文件夹相关接口
#[async_trait]
pub trait FolderApi: Send + Sync {
    async fn list_folders(&self) -> Result<Vec<Folder>>;

    /// GET /folder/{id}，源接口没有分页
    async fn folder_contents(&self, folder_id: &str) -> Result<Vec<Bookmark>>;

    /// DELETE /folder/{id}/content，body `{content_ids}`
    async fn remove_from_folder(&self, folder_id: &str, content_ids: &[String]) -> Result<StatusResponse>;

    async fn folder_metadata(&self, folder_id: &str) -> Result<FolderMetadata>;

    async fn update_folder_metadata(&self, folder_id: &str, metadata: &FolderMetadata) -> Result<()>;

    /// POST /users/folder/add
    async fn add_to_folder(&self, folder_id: &str, content_id: &str) -> Result<ActionResponse>;

    /// DELETE /folder/{id}
    async fn delete_folder(&self, folder_id: &str) -> Result<ActionResponse>;
}

/// 标签相关接口
#[async_trait]
pub trait TagApi: Send + Sync {
    async fn list_tags(&self) -> Result<Vec<Tag>>;

    async fn create_tag(&self, tag_name: &str) -> Result<StatusResponse>;

    async fn delete_tags(&self, tag_ids: &[String]) -> Result<StatusResponse>;

    /// GET /tag/bookmark/{id}
    async fn tag_bookmarks(&self, tag_id: &str) -> Result<Vec<Bookmark>>;
}

#[derive(Serialize)]
struct RemoveFromFolderBody<'a> {
    content_ids: &'a [String],
}

#[derive(Serialize)]
struct CreateTagBody<'a> {
    tag_name: &'a str,
}

#[derive(Serialize)]
struct DeleteTagsBody<'a> {
    tag_ids: &'a [String],
}

#[derive(Serialize)]
struct SaveUrlBody<'a> {
    url: &'a str,
}

#[derive(Serialize)]
struct NotesBody<'a> {
    notes: &'a str,
    #[serde(rename = "bookmarkID")]
    bookmark_id: &'a str,
}

#[derive(Serialize)]
struct ContentRef<'a> {
    content_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FolderItemBody<'a> {
    folder_id: &'a str,
    content_id: &'a str,
}

#[derive(Deserialize)]
struct MetadataEnvelope {
    #[serde(default)]
    data: FolderMetadata,
}

/// 基于reqwest的API客户端
#[derive(Clone)]
pub struct HttpApiClient {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
}

impl HttpApiClient {
    pub fn new(config: &ClientConfig, tokens: Arc<dyn TokenStore>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("csphere-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        info!("🌐 API endpoint: {}", config.base_url());

        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            tokens,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// 构造带 Bearer token 的请求；没有token时不发出任何请求
    fn authorized(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let token = self.tokens.load()?.ok_or(ClientError::Unauthenticated)?;
        let url = self.url(path);
        debug!("   {} {}", method, url);
        Ok(self
            .client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", token)))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }

    async fn send_empty(&self, request: RequestBuilder) -> Result<()> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn get_page(&self, path: &str, params: &[(&str, &str)]) -> Result<BookmarkPage> {
        let request = self.authorized(Method::GET, path)?.query(params);
        let page: BookmarkPage = self.send_json(request).await?;
        debug!(
            "   page: {} bookmarks, {} categories, has_next={}",
            page.bookmarks.len(),
            page.categories.len(),
            page.has_next
        );
        Ok(page)
    }
}

/// 只在cursor非空时带上参数，cursor原样回传
fn cursor_param<'a>(params: &mut Vec<(&'static str, &'a str)>, cursor: Option<&'a str>) {
    if let Some(c) = cursor.filter(|c| !c.is_empty()) {
        params.push(("cursor", c));
    }
}

#[async_trait]
impl ContentApi for HttpApiClient {
    async fn list_bookmarks(&self, cursor: Option<&str>) -> Result<BookmarkPage> {
        let mut params = Vec::new();
        cursor_param(&mut params, cursor);
        self.get_page("/content", &params).await
    }

    async fn list_unread(&self, cursor: Option<&str>) -> Result<BookmarkPage> {
        let mut params = Vec::new();
        cursor_param(&mut params, cursor);
        self.get_page("/content/unread", &params).await
    }

    async fn search_bookmarks(&self, query: &str, cursor: Option<&str>) -> Result<BookmarkPage> {
        let mut params = vec![("query", query)];
        cursor_param(&mut params, cursor);
        self.get_page("/content/search", &params).await
    }

    async fn recent_bookmarks(&self) -> Result<Vec<Bookmark>> {
        let request = self.authorized(Method::POST, "/content/recent")?;
        self.send_json(request).await
    }

    async fn unread_count(&self) -> Result<u64> {
        let request = self.authorized(Method::GET, "/content/unread/count")?;
        let count: UnreadCount = self.send_json(request).await?;
        Ok(count.count)
    }

    async fn save_bookmark(&self, request: &SaveBookmarkRequest) -> Result<StatusResponse> {
        info!("📤 Saving bookmark: {}", request.url);
        let builder = self.authorized(Method::POST, "/content/save")?.json(request);
        self.send_json(builder).await
    }

    async fn rediscover(&self) -> Result<RediscoverFeed> {
        let request = self.authorized(Method::GET, "/content/rediscover")?;
        let feed: RediscoverFeed = self.send_json(request).await?;
        debug!("   rediscover: {} months, {} bookmarks", feed.groups.len(), feed.total());
        Ok(feed)
    }
}

#[async_trait]
impl BookmarkActions for HttpApiClient {
    async fn save_url(&self, url: &str) -> Result<()> {
        info!("📤 Saving url: {}", url);
        let request = self
            .authorized(Method::POST, "/content/save/url")?
            .json(&SaveUrlBody { url });
        self.send_empty(request).await
    }

    async fn update_notes(&self, content_id: &str, notes: &str) -> Result<()> {
        let request = self
            .authorized(Method::POST, "/content/update/notes")?
            .json(&NotesBody {
                notes,
                bookmark_id: content_id,
            });
        self.send_empty(request).await
    }

    async fn mark_read(&self, content_id: &str) -> Result<ActionResponse> {
        let request = self.authorized(Method::POST, &format!("/content/read/{}", content_id))?;
        self.send_json(request).await
    }

    async fn set_read_later(&self, content_id: &str, saved: bool) -> Result<()> {
        let path = if saved { "/content/tab" } else { "/content/untab" };
        let request = self
            .authorized(Method::POST, path)?
            .json(&ContentRef { content_id });
        self.send_empty(request).await
    }

    async fn archive_url(&self, content_id: &str) -> Result<Option<String>> {
        let request = self.authorized(Method::GET, &format!("/content/{}/archive", content_id))?;
        // 没有存档时服务端回复 null
        let link: Option<ArchiveLink> = self.send_json(request).await?;
        Ok(link.and_then(|l| l.url).filter(|u| !u.is_empty()))
    }
}

#[async_trait]
impl FolderApi for HttpApiClient {
    async fn list_folders(&self) -> Result<Vec<Folder>> {
        let request = self.authorized(Method::GET, "/folder")?;
        let response: FolderListResponse = self.send_json(request).await?;
        if !response.success {
            return Err(ClientError::Status {
                status: 200,
                body: response.error.unwrap_or_else(|| "folder listing failed".to_string()),
            });
        }
        Ok(response.data)
    }

    async fn folder_contents(&self, folder_id: &str) -> Result<Vec<Bookmark>> {
        let request = self.authorized(Method::GET, &format!("/folder/{}", folder_id))?;
        self.send_json(request).await
    }

    async fn remove_from_folder(&self, folder_id: &str, content_ids: &[String]) -> Result<StatusResponse> {
        info!("🗑️  Removing {} bookmarks from folder {}", content_ids.len(), folder_id);
        let request = self
            .authorized(Method::DELETE, &format!("/folder/{}/content", folder_id))?
            .json(&RemoveFromFolderBody { content_ids });
        self.send_json(request).await
    }

    async fn folder_metadata(&self, folder_id: &str) -> Result<FolderMetadata> {
        let request = self.authorized(Method::GET, &format!("/folder/metadata/{}", folder_id))?;
        let envelope: MetadataEnvelope = self.send_json(request).await?;
        Ok(envelope.data)
    }

    async fn update_folder_metadata(&self, folder_id: &str, metadata: &FolderMetadata) -> Result<()> {
        let request = self
            .authorized(Method::PUT, &format!("/folder/{}", folder_id))?
            .json(metadata);
        self.send_empty(request).await
    }

    async fn add_to_folder(&self, folder_id: &str, content_id: &str) -> Result<ActionResponse> {
        info!("📁 Adding {} to folder {}", content_id, folder_id);
        let request = self
            .authorized(Method::POST, "/users/folder/add")?
            .json(&FolderItemBody { folder_id, content_id });
        self.send_json(request).await
    }

    async fn delete_folder(&self, folder_id: &str) -> Result<ActionResponse> {
        info!("🗑️  Deleting folder {}", folder_id);
        let request = self.authorized(Method::DELETE, &format!("/folder/{}", folder_id))?;
        self.send_json(request).await
    }
}

#[async_trait]
impl TagApi for HttpApiClient {
    async fn list_tags(&self) -> Result<Vec<Tag>> {
        let request = self.authorized(Method::GET, "/tag")?;
        self.send_json(request).await
    }

    async fn create_tag(&self, tag_name: &str) -> Result<StatusResponse> {
        let request = self
            .authorized(Method::POST, "/tag")?
            .json(&CreateTagBody { tag_name });
        self.send_json(request).await
    }

    async fn delete_tags(&self, tag_ids: &[String]) -> Result<StatusResponse> {
        let request = self
            .authorized(Method::DELETE, "/tag")?
            .json(&DeleteTagsBody { tag_ids });
        self.send_json(request).await
    }

    async fn tag_bookmarks(&self, tag_id: &str) -> Result<Vec<Bookmark>> {
        let request = self.authorized(Method::GET, &format!("/tag/bookmark/{}", tag_id))?;
        self.send_json(request).await
    }
}
