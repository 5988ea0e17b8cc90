//! 分页书签列表聚合
//!
//! 每个列表视图（最新、未读、搜索）各持有一个 `Aggregator`：
//! 按服务端cursor逐页拉取，追加到只增不减的权威列表中，
//! 合并分类集合，并在本地按分类过滤而不重新请求。
//!
//! 同一时间最多只有一个页请求在进行（`is_loading` 守卫），
//! 所以页总是按发起顺序应用。视图卸载或查询变化时，
//! 代数（generation）递增，旧请求的结果被丢弃。

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::ContentApi;
use crate::error::{ClientError, Result};
use crate::models::{Bookmark, BookmarkPage, Category};

/// 列表数据来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListSource {
    Latest,
    Unread,
    Search(String),
}

impl ListSource {
    pub fn name(&self) -> &str {
        match self {
            ListSource::Latest => "latest",
            ListSource::Unread => "unread",
            ListSource::Search(_) => "search",
        }
    }

    async fn fetch(&self, api: &dyn ContentApi, cursor: &str) -> Result<BookmarkPage> {
        let cursor = if cursor.is_empty() { None } else { Some(cursor) };
        match self {
            ListSource::Latest => api.list_bookmarks(cursor).await,
            ListSource::Unread => api.list_unread(cursor).await,
            ListSource::Search(query) => api.search_bookmarks(query, cursor).await,
        }
    }
}

/// 滚动位置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub viewport_height: f64,
    pub content_height: f64,
}

/// 无限滚动的触发策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollPolicy {
    /// 剩余未滚动距离低于此值时加载下一页
    pub threshold_px: u32,
}

impl Default for ScrollPolicy {
    fn default() -> Self {
        Self { threshold_px: 250 }
    }
}

impl ScrollPolicy {
    pub fn new(threshold_px: u32) -> Self {
        Self { threshold_px }
    }

    pub fn should_load(&self, metrics: ScrollMetrics) -> bool {
        metrics.scroll_top + metrics.viewport_height
            >= metrics.content_height - f64::from(self.threshold_px)
    }
}

/// 同一个 `category_id` 出现了不同的名字
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryConflict {
    pub category_id: String,
    pub kept_name: String,
    pub rejected_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// 服务端表示没有更多数据
    Exhausted,
    /// 已经有一个页请求在进行
    InFlight,
    /// 滚动位置离底部还远
    NotNearBottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded {
        appended: usize,
        skipped_duplicates: usize,
    },
    Skipped(SkipReason),
    /// 请求期间视图被重置或取消，结果已丢弃
    Stale,
}

/// 渲染用的状态快照
#[derive(Debug, Clone)]
pub struct AggregatorSnapshot {
    pub source: ListSource,
    pub bookmarks: Vec<Bookmark>,
    pub categories: Vec<Category>,
    pub selected_categories: BTreeSet<String>,
    pub cursor: String,
    pub has_next: bool,
    pub is_loading: bool,
}

struct ListState {
    base_source: ListSource,
    source: ListSource,
    bookmarks: Vec<Bookmark>,
    seen: HashSet<String>,
    categories: Vec<Category>,
    category_index: HashMap<String, usize>,
    conflicts: Vec<CategoryConflict>,
    selected: BTreeSet<String>,
    cursor: String,
    has_next: bool,
    is_loading: bool,
    generation: u64,
}

impl ListState {
    fn new(source: ListSource) -> Self {
        Self {
            base_source: source.clone(),
            source,
            bookmarks: Vec::new(),
            seen: HashSet::new(),
            categories: Vec::new(),
            category_index: HashMap::new(),
            conflicts: Vec::new(),
            selected: BTreeSet::new(),
            cursor: String::new(),
            has_next: true,
            is_loading: false,
            generation: 0,
        }
    }

    fn clear_list(&mut self) {
        self.bookmarks.clear();
        self.seen.clear();
        self.categories.clear();
        self.category_index.clear();
        self.conflicts.clear();
        self.selected.clear();
    }

    /// 按服务端顺序追加，跳过已见过的 `content_id`
    fn append_page(&mut self, page: BookmarkPage) -> LoadOutcome {
        let mut appended = 0;
        let mut skipped_duplicates = 0;

        for bookmark in page.bookmarks {
            if self.seen.insert(bookmark.content_id.clone()) {
                self.bookmarks.push(bookmark);
                appended += 1;
            } else {
                debug!("跳过重复书签: {}", bookmark.content_id);
                skipped_duplicates += 1;
            }
        }

        self.merge_categories(page.categories);
        self.cursor = page.next_cursor;
        self.has_next = page.has_next;

        LoadOutcome::Loaded {
            appended,
            skipped_duplicates,
        }
    }

    /// 以 `category_id` 为键合并；同id不同名保留先到的名字并记录冲突
    fn merge_categories(&mut self, incoming: Vec<Category>) {
        for category in incoming {
            if category.category_name.trim().is_empty() {
                continue;
            }

            match self.category_index.get(&category.category_id) {
                Some(&idx) => {
                    let kept = &self.categories[idx];
                    if kept.category_name != category.category_name {
                        let already_recorded = self.conflicts.iter().any(|c| {
                            c.category_id == category.category_id
                                && c.rejected_name == category.category_name
                        });
                        if !already_recorded {
                            warn!(
                                "⚠️  Category {} has conflicting names: keeping '{}', got '{}'",
                                category.category_id, kept.category_name, category.category_name
                            );
                            self.conflicts.push(CategoryConflict {
                                category_id: category.category_id.clone(),
                                kept_name: kept.category_name.clone(),
                                rejected_name: category.category_name,
                            });
                        }
                    }
                }
                None => {
                    self.category_index
                        .insert(category.category_id.clone(), self.categories.len());
                    self.categories.push(category);
                }
            }
        }
    }

    fn visible(&self) -> Vec<Bookmark> {
        if self.selected.is_empty() {
            return self.bookmarks.clone();
        }
        self.bookmarks
            .iter()
            .filter(|b| b.category_ids().any(|id| self.selected.contains(id)))
            .cloned()
            .collect()
    }
}

/// 等到代数不再等于 `generation`
async fn generation_changed(mut rx: watch::Receiver<u64>, generation: u64) {
    loop {
        if *rx.borrow_and_update() != generation {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// 单个列表视图的聚合器句柄，克隆后共享同一份状态
#[derive(Clone)]
pub struct Aggregator {
    api: Arc<dyn ContentApi>,
    state: Arc<Mutex<ListState>>,
    cancel: Arc<watch::Sender<u64>>,
    policy: ScrollPolicy,
}

impl Aggregator {
    pub fn new(api: Arc<dyn ContentApi>, source: ListSource, policy: ScrollPolicy) -> Self {
        let (cancel, _) = watch::channel(0);
        Self {
            api,
            state: Arc::new(Mutex::new(ListState::new(source))),
            cancel: Arc::new(cancel),
            policy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ListState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 发起请求；代数变化时提前放弃
    async fn fetch(&self, source: &ListSource, cursor: &str, generation: u64) -> Result<BookmarkPage> {
        let cancelled = self.cancel.subscribe();
        tokio::select! {
            result = source.fetch(self.api.as_ref(), cursor) => result,
            _ = generation_changed(cancelled, generation) => Err(ClientError::Cancelled),
        }
    }

    /// 从头加载第一页，替换已累积的列表和分类
    ///
    /// 非空查询切换到搜索，空查询恢复视图本来的数据源。
    /// 失败时保留原有列表、cursor和数据源，可以重试。
    pub async fn load_first_page(&self, query: Option<&str>) -> Result<LoadOutcome> {
        let (source, generation) = {
            let mut state = self.lock();
            state.generation += 1;
            state.is_loading = true;
            let source = match query.map(str::trim).filter(|q| !q.is_empty()) {
                Some(q) => ListSource::Search(q.to_string()),
                None => state.base_source.clone(),
            };
            (source, state.generation)
        };
        self.cancel.send_replace(generation);

        info!("📥 Loading first {} page", source.name());
        let result = self.fetch(&source, "", generation).await;

        let mut state = self.lock();
        if state.generation != generation {
            debug!("丢弃过期的首页响应 (generation {})", generation);
            return Ok(LoadOutcome::Stale);
        }
        state.is_loading = false;

        match result {
            Ok(page) => {
                state.clear_list();
                state.source = source;
                let outcome = state.append_page(page);
                info!(
                    "✅ Loaded {} bookmarks, {} categories (has_next={})",
                    state.bookmarks.len(),
                    state.categories.len(),
                    state.has_next
                );
                Ok(outcome)
            }
            Err(ClientError::Cancelled) => Ok(LoadOutcome::Stale),
            Err(e) => {
                warn!("❌ Failed to load first page: {}", e);
                Err(e)
            }
        }
    }

    /// 加载下一页
    ///
    /// `is_loading` 或 `!has_next` 时不发请求、不改状态。
    /// 失败时cursor和has_next保持不变，下一次滚动会重试。
    pub async fn load_next_page(&self) -> Result<LoadOutcome> {
        let (source, cursor, generation) = {
            let mut state = self.lock();
            if state.is_loading {
                debug!("已有页请求进行中，忽略");
                return Ok(LoadOutcome::Skipped(SkipReason::InFlight));
            }
            if !state.has_next {
                return Ok(LoadOutcome::Skipped(SkipReason::Exhausted));
            }
            state.is_loading = true;
            (state.source.clone(), state.cursor.clone(), state.generation)
        };

        debug!("loading next {} page, cursor='{}'", source.name(), cursor);
        let result = self.fetch(&source, &cursor, generation).await;

        let mut state = self.lock();
        if state.generation != generation {
            debug!("丢弃过期的分页响应 (generation {})", generation);
            return Ok(LoadOutcome::Stale);
        }
        state.is_loading = false;

        match result {
            Ok(page) => Ok(state.append_page(page)),
            Err(ClientError::Cancelled) => Ok(LoadOutcome::Stale),
            Err(e) => {
                warn!("❌ Failed to load next page: {}", e);
                Err(e)
            }
        }
    }

    /// 滚动事件：接近底部时加载下一页
    pub async fn on_scroll(&self, metrics: ScrollMetrics) -> Result<LoadOutcome> {
        if !self.policy.should_load(metrics) {
            return Ok(LoadOutcome::Skipped(SkipReason::NotNearBottom));
        }
        self.load_next_page().await
    }

    /// 取消进行中的请求（视图卸载），其结果不会再改动状态
    pub fn cancel(&self) {
        let generation = {
            let mut state = self.lock();
            state.generation += 1;
            state.is_loading = false;
            state.generation
        };
        self.cancel.send_replace(generation);
        debug!("aggregator cancelled, generation {}", generation);
    }

    /// 设置选中的分类并返回过滤后的列表；空集合表示不过滤
    pub fn apply_category_filter<I, S>(&self, category_ids: I) -> Vec<Bookmark>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.lock();
        state.selected = category_ids.into_iter().map(Into::into).collect();
        state.visible()
    }

    /// 切换单个分类的选中状态，返回切换后是否选中
    pub fn toggle_category(&self, category_id: &str) -> bool {
        let mut state = self.lock();
        if state.selected.remove(category_id) {
            false
        } else {
            state.selected.insert(category_id.to_string());
            true
        }
    }

    /// 当前过滤条件下可见的书签
    pub fn visible(&self) -> Vec<Bookmark> {
        self.lock().visible()
    }

    pub fn len(&self) -> usize {
        self.lock().bookmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().bookmarks.is_empty()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().is_loading
    }

    pub fn has_next(&self) -> bool {
        self.lock().has_next
    }

    pub fn cursor(&self) -> String {
        self.lock().cursor.clone()
    }

    /// 列表已到末尾（"You've reached the end of your bookmarks!"）
    pub fn is_exhausted(&self) -> bool {
        !self.lock().has_next
    }

    pub fn categories(&self) -> Vec<Category> {
        self.lock().categories.clone()
    }

    pub fn category_conflicts(&self) -> Vec<CategoryConflict> {
        self.lock().conflicts.clone()
    }

    pub fn snapshot(&self) -> AggregatorSnapshot {
        let state = self.lock();
        AggregatorSnapshot {
            source: state.source.clone(),
            bookmarks: state.bookmarks.clone(),
            categories: state.categories.clone(),
            selected_categories: state.selected.clone(),
            cursor: state.cursor.clone(),
            has_next: state.has_next,
            is_loading: state.is_loading,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RediscoverFeed, SaveBookmarkRequest, StatusResponse};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tokio::sync::Notify;

    /// 按顺序返回预设页的API，可选地在请求中途挂起
    #[derive(Default)]
    struct ScriptedApi {
        pages: Mutex<VecDeque<Result<BookmarkPage>>>,
        calls: Mutex<Vec<(String, Option<String>)>>,
        gate: Option<(Arc<Notify>, Arc<Notify>)>,
    }

    impl ScriptedApi {
        fn new(pages: Vec<Result<BookmarkPage>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                ..Default::default()
            }
        }

        fn gated(pages: Vec<Result<BookmarkPage>>, entered: Arc<Notify>, release: Arc<Notify>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                gate: Some((entered, release)),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<(String, Option<String>)> {
            self.calls.lock().unwrap().clone()
        }

        async fn next(&self, kind: &str, cursor: Option<&str>) -> Result<BookmarkPage> {
            self.calls
                .lock()
                .unwrap()
                .push((kind.to_string(), cursor.map(String::from)));
            if let Some((entered, release)) = &self.gate {
                entered.notify_one();
                release.notified().await;
            }
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(BookmarkPage::default()))
        }
    }

    #[async_trait]
    impl ContentApi for ScriptedApi {
        async fn list_bookmarks(&self, cursor: Option<&str>) -> Result<BookmarkPage> {
            self.next("latest", cursor).await
        }
        async fn list_unread(&self, cursor: Option<&str>) -> Result<BookmarkPage> {
            self.next("unread", cursor).await
        }
        async fn search_bookmarks(&self, query: &str, cursor: Option<&str>) -> Result<BookmarkPage> {
            self.next(&format!("search:{query}"), cursor).await
        }
        async fn recent_bookmarks(&self) -> Result<Vec<Bookmark>> {
            Ok(Vec::new())
        }
        async fn unread_count(&self) -> Result<u64> {
            Ok(0)
        }
        async fn save_bookmark(&self, _request: &SaveBookmarkRequest) -> Result<StatusResponse> {
            Ok(StatusResponse::new("Success"))
        }
        async fn rediscover(&self) -> Result<RediscoverFeed> {
            Ok(RediscoverFeed::default())
        }
    }

    fn bm(id: &str, cats: &[(&str, &str)]) -> Bookmark {
        Bookmark::new(id, format!("https://example.com/{id}"))
            .with_categories(cats.iter().map(|(i, n)| Category::new(*i, *n)).collect())
    }

    fn page(ids: &[&str], has_next: bool, cursor: &str) -> BookmarkPage {
        BookmarkPage {
            bookmarks: ids.iter().map(|id| bm(id, &[])).collect(),
            categories: vec![],
            has_next,
            next_cursor: cursor.to_string(),
        }
    }

    fn aggregator(api: Arc<ScriptedApi>) -> Aggregator {
        Aggregator::new(api, ListSource::Latest, ScrollPolicy::default())
    }

    fn transport_error() -> ClientError {
        ClientError::Status {
            status: 503,
            body: "unavailable".into(),
        }
    }

    #[tokio::test]
    async fn test_first_page_replaces_state() {
        let first = BookmarkPage {
            bookmarks: vec![bm("a", &[("c1", "tech")])],
            categories: vec![Category::new("c1", "tech")],
            has_next: true,
            next_cursor: "tok1".into(),
        };
        let api = Arc::new(ScriptedApi::new(vec![Ok(first.clone()), Ok(first)]));
        let agg = aggregator(api.clone());

        agg.load_first_page(None).await.unwrap();
        agg.load_first_page(None).await.unwrap();

        let snap = agg.snapshot();
        assert_eq!(snap.bookmarks.len(), 1);
        assert_eq!(snap.categories.len(), 1);
        assert!(snap.has_next);
        assert_eq!(snap.cursor, "tok1");
        // 首页总是从空cursor开始
        assert!(api.calls().iter().all(|(_, c)| c.is_none()));
    }

    #[tokio::test]
    async fn test_next_page_appends_in_server_order() {
        let api = Arc::new(ScriptedApi::new(vec![
            Ok(page(&["c", "a"], true, "tok1")),
            Ok(page(&["b", "d"], false, "")),
        ]));
        let agg = aggregator(api.clone());

        agg.load_first_page(None).await.unwrap();
        let outcome = agg.load_next_page().await.unwrap();

        assert_eq!(outcome, LoadOutcome::Loaded { appended: 2, skipped_duplicates: 0 });
        let ids: Vec<_> = agg.visible().into_iter().map(|b| b.content_id).collect();
        assert_eq!(ids, vec!["c", "a", "b", "d"]);
        assert_eq!(api.calls()[1].1.as_deref(), Some("tok1"));
        assert!(agg.is_exhausted());

        // 已到末尾，不再请求
        let outcome = agg.load_next_page().await.unwrap();
        assert_eq!(outcome, LoadOutcome::Skipped(SkipReason::Exhausted));
        assert_eq!(api.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_ids_across_pages_are_dropped() {
        let api = Arc::new(ScriptedApi::new(vec![
            Ok(page(&["a", "b"], true, "tok1")),
            Ok(page(&["b", "c", "c"], false, "")),
        ]));
        let agg = aggregator(api);

        agg.load_first_page(None).await.unwrap();
        let outcome = agg.load_next_page().await.unwrap();

        assert_eq!(outcome, LoadOutcome::Loaded { appended: 1, skipped_duplicates: 2 });
        assert_eq!(agg.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_page_with_more_is_not_terminal() {
        let api = Arc::new(ScriptedApi::new(vec![
            Ok(page(&["a"], true, "tok1")),
            Ok(page(&[], true, "tok2")),
            Ok(page(&["b"], false, "")),
        ]));
        let agg = aggregator(api.clone());

        agg.load_first_page(None).await.unwrap();
        agg.load_next_page().await.unwrap();
        assert_eq!(agg.len(), 1);
        assert!(agg.has_next());
        assert_eq!(agg.cursor(), "tok2");

        let outcome = agg.load_next_page().await.unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded { appended: 1, skipped_duplicates: 0 });
        assert_eq!(api.calls()[2].1.as_deref(), Some("tok2"));
    }

    #[tokio::test]
    async fn test_zero_result_first_page() {
        let api = Arc::new(ScriptedApi::new(vec![Ok(page(&[], false, ""))]));
        let agg = aggregator(api);

        agg.load_first_page(None).await.unwrap();
        assert!(agg.is_empty());
        assert!(agg.is_exhausted());
    }

    #[tokio::test]
    async fn test_failed_page_keeps_cursor_and_is_retryable() {
        let api = Arc::new(ScriptedApi::new(vec![
            Ok(page(&["a"], true, "tok1")),
            Err(transport_error()),
            Ok(page(&["b"], false, "")),
        ]));
        let agg = aggregator(api.clone());

        agg.load_first_page(None).await.unwrap();
        assert!(agg.load_next_page().await.is_err());

        assert_eq!(agg.cursor(), "tok1");
        assert!(agg.has_next());
        assert!(!agg.is_loading());
        assert_eq!(agg.len(), 1);

        agg.load_next_page().await.unwrap();
        assert_eq!(agg.len(), 2);
        assert_eq!(api.calls()[2].1.as_deref(), Some("tok1"));
    }

    #[tokio::test]
    async fn test_failed_search_keeps_previous_list() {
        let api = Arc::new(ScriptedApi::new(vec![
            Ok(page(&["a"], true, "tok1")),
            Err(transport_error()),
        ]));
        let agg = aggregator(api);

        agg.load_first_page(None).await.unwrap();
        assert!(agg.load_first_page(Some("rust")).await.is_err());

        let snap = agg.snapshot();
        assert_eq!(snap.source, ListSource::Latest);
        assert_eq!(snap.cursor, "tok1");
        assert_eq!(snap.bookmarks.len(), 1);
    }

    #[tokio::test]
    async fn test_search_query_switches_source() {
        let api = Arc::new(ScriptedApi::new(vec![
            Ok(page(&["a"], false, "")),
            Ok(page(&["z"], false, "")),
        ]));
        let agg = aggregator(api.clone());

        agg.load_first_page(Some("  rust  ")).await.unwrap();
        assert_eq!(agg.snapshot().source, ListSource::Search("rust".into()));

        agg.load_first_page(Some("   ")).await.unwrap();
        assert_eq!(agg.snapshot().source, ListSource::Latest);

        let kinds: Vec<_> = api.calls().into_iter().map(|(k, _)| k).collect();
        assert_eq!(kinds, vec!["search:rust", "latest"]);
    }

    #[tokio::test]
    async fn test_in_flight_guard_blocks_second_request() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let api = Arc::new(ScriptedApi::gated(
            vec![Ok(page(&["a"], true, "tok1"))],
            entered.clone(),
            release.clone(),
        ));
        let agg = aggregator(api.clone());

        let background = agg.clone();
        let handle = tokio::spawn(async move { background.load_next_page().await });
        entered.notified().await;

        let before = agg.snapshot();
        let outcome = agg.load_next_page().await.unwrap();
        assert_eq!(outcome, LoadOutcome::Skipped(SkipReason::InFlight));
        assert_eq!(api.calls().len(), 1);
        assert_eq!(agg.cursor(), before.cursor);
        assert!(agg.is_loading());

        release.notify_one();
        let first = handle.await.unwrap().unwrap();
        assert_eq!(first, LoadOutcome::Loaded { appended: 1, skipped_duplicates: 0 });
        assert!(!agg.is_loading());
    }

    #[tokio::test]
    async fn test_cancel_discards_in_flight_response() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let api = Arc::new(ScriptedApi::gated(
            vec![Ok(page(&["late"], false, "never"))],
            entered.clone(),
            release,
        ));
        let agg = aggregator(api);

        let background = agg.clone();
        let handle = tokio::spawn(async move { background.load_next_page().await });
        entered.notified().await;

        agg.cancel();
        let outcome = handle.await.unwrap().unwrap();

        assert_eq!(outcome, LoadOutcome::Stale);
        assert!(agg.is_empty());
        assert_eq!(agg.cursor(), "");
        assert!(!agg.is_loading());
    }

    #[tokio::test]
    async fn test_query_change_discards_older_page() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let api = Arc::new(ScriptedApi::gated(
            vec![
                Ok(page(&["a", "b"], true, "tok1")),
                Ok(page(&["hit"], false, "")),
                Ok(page(&["old-page-2"], false, "")),
            ],
            entered.clone(),
            release.clone(),
        ));
        let agg = aggregator(api.clone());

        let first = tokio::spawn({
            let agg = agg.clone();
            async move { agg.load_first_page(None).await }
        });
        entered.notified().await;
        release.notify_one();
        first.await.unwrap().unwrap();
        assert_eq!(agg.len(), 2);

        let older = tokio::spawn({
            let agg = agg.clone();
            async move { agg.load_next_page().await }
        });
        entered.notified().await;

        let search = tokio::spawn({
            let agg = agg.clone();
            async move { agg.load_first_page(Some("rust")).await }
        });
        entered.notified().await;

        // 查询变化后旧的第二页作废，不能写入列表
        assert_eq!(older.await.unwrap().unwrap(), LoadOutcome::Stale);
        release.notify_one();
        let outcome = search.await.unwrap().unwrap();

        assert_eq!(outcome, LoadOutcome::Loaded { appended: 1, skipped_duplicates: 0 });
        let snapshot = agg.snapshot();
        assert_eq!(snapshot.source, ListSource::Search("rust".into()));
        let ids: Vec<_> = snapshot.bookmarks.iter().map(|b| b.content_id.as_str()).collect();
        assert_eq!(ids, vec!["hit"]);
        assert!(!snapshot.has_next);
        assert!(!agg.is_loading());
        assert_eq!(
            api.calls(),
            vec![
                ("latest".to_string(), None),
                ("latest".to_string(), Some("tok1".to_string())),
                ("search:rust".to_string(), None),
            ]
        );
    }

    #[tokio::test]
    async fn test_category_merge_and_conflicts() {
        let first = BookmarkPage {
            bookmarks: vec![bm("a", &[("c1", "tech")])],
            categories: vec![Category::new("c1", "tech"), Category::new("c0", "  ")],
            has_next: true,
            next_cursor: "tok1".into(),
        };
        let second = BookmarkPage {
            bookmarks: vec![bm("b", &[("c2", "news")])],
            categories: vec![
                Category::new("c2", "news"),
                Category::new("c1", "technology"),
                Category::new("c3", "tech"),
            ],
            has_next: false,
            next_cursor: String::new(),
        };
        let api = Arc::new(ScriptedApi::new(vec![Ok(first), Ok(second)]));
        let agg = aggregator(api);

        agg.load_first_page(None).await.unwrap();
        agg.load_next_page().await.unwrap();

        let names: Vec<_> = agg
            .categories()
            .into_iter()
            .map(|c| (c.category_id, c.category_name))
            .collect();
        assert_eq!(
            names,
            vec![
                ("c1".to_string(), "tech".to_string()),
                ("c2".to_string(), "news".to_string()),
                ("c3".to_string(), "tech".to_string()),
            ]
        );
        let conflicts = agg.category_conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kept_name, "tech");
        assert_eq!(conflicts[0].rejected_name, "technology");
    }

    #[tokio::test]
    async fn test_category_filter_is_derived_view() {
        let first = BookmarkPage {
            bookmarks: vec![
                bm("a", &[("c1", "tech")]),
                bm("b", &[("c2", "news")]),
                bm("c", &[("c1", "tech"), ("c2", "news")]),
                bm("d", &[]),
            ],
            categories: vec![Category::new("c1", "tech"), Category::new("c2", "news")],
            has_next: false,
            next_cursor: String::new(),
        };
        let api = Arc::new(ScriptedApi::new(vec![Ok(first)]));
        let agg = aggregator(api.clone());
        agg.load_first_page(None).await.unwrap();

        let ids = |v: Vec<Bookmark>| v.into_iter().map(|b| b.content_id).collect::<Vec<_>>();

        assert_eq!(ids(agg.apply_category_filter(["c1"])), vec!["a", "c"]);
        assert_eq!(ids(agg.apply_category_filter(["c1"])), vec!["a", "c"]);
        assert_eq!(ids(agg.apply_category_filter(["c1", "c2"])), vec!["a", "b", "c"]);
        assert_eq!(ids(agg.apply_category_filter(Vec::<String>::new())), vec!["a", "b", "c", "d"]);

        assert!(agg.toggle_category("c2"));
        assert_eq!(ids(agg.visible()), vec!["b", "c"]);
        assert!(!agg.toggle_category("c2"));
        assert_eq!(agg.visible().len(), 4);

        // 过滤不触发请求
        assert_eq!(api.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_on_scroll_threshold() {
        let api = Arc::new(ScriptedApi::new(vec![Ok(page(&["a"], false, ""))]));
        let agg = aggregator(api.clone());

        let far = ScrollMetrics { scroll_top: 0.0, viewport_height: 800.0, content_height: 3000.0 };
        assert_eq!(
            agg.on_scroll(far).await.unwrap(),
            LoadOutcome::Skipped(SkipReason::NotNearBottom)
        );
        assert!(api.calls().is_empty());

        let near = ScrollMetrics { scroll_top: 2000.0, viewport_height: 800.0, content_height: 3000.0 };
        assert!(matches!(agg.on_scroll(near).await.unwrap(), LoadOutcome::Loaded { .. }));
    }

    #[test]
    fn test_scroll_policy_boundary() {
        let policy = ScrollPolicy::new(100);
        let at = |top: f64| ScrollMetrics { scroll_top: top, viewport_height: 500.0, content_height: 1000.0 };
        assert!(!policy.should_load(at(399.0)));
        assert!(policy.should_load(at(400.0)));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::models::{RediscoverFeed, SaveBookmarkRequest, StatusResponse};
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    struct PageQueue(Mutex<VecDeque<BookmarkPage>>);

    #[async_trait]
    impl ContentApi for PageQueue {
        async fn list_bookmarks(&self, _cursor: Option<&str>) -> Result<BookmarkPage> {
            Ok(self.0.lock().unwrap().pop_front().unwrap_or_default())
        }
        async fn list_unread(&self, cursor: Option<&str>) -> Result<BookmarkPage> {
            self.list_bookmarks(cursor).await
        }
        async fn search_bookmarks(&self, _query: &str, cursor: Option<&str>) -> Result<BookmarkPage> {
            self.list_bookmarks(cursor).await
        }
        async fn recent_bookmarks(&self) -> Result<Vec<Bookmark>> {
            Ok(Vec::new())
        }
        async fn unread_count(&self) -> Result<u64> {
            Ok(0)
        }
        async fn save_bookmark(&self, _request: &SaveBookmarkRequest) -> Result<StatusResponse> {
            Ok(StatusResponse::new("Success"))
        }
        async fn rediscover(&self) -> Result<RediscoverFeed> {
            Ok(RediscoverFeed::default())
        }
    }

    fn id_strategy() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["a", "b", "c", "d", "e", "f"]).prop_map(String::from)
    }

    fn page_strategy() -> impl Strategy<Value = BookmarkPage> {
        (
            prop::collection::vec((id_strategy(), prop::collection::vec(0u8..4, 0..3)), 0..5),
            "[a-z]{0,4}",
        )
            .prop_map(|(items, cursor)| BookmarkPage {
                bookmarks: items
                    .into_iter()
                    .map(|(id, cats)| {
                        Bookmark::new(id.clone(), format!("https://x/{id}")).with_categories(
                            cats.into_iter()
                                .map(|c| Category::new(format!("c{c}"), format!("cat{c}")))
                                .collect(),
                        )
                    })
                    .collect(),
                categories: vec![],
                has_next: true,
                next_cursor: cursor,
            })
    }

    fn load_all(pages: Vec<BookmarkPage>) -> Aggregator {
        let count = pages.len();
        let api = Arc::new(PageQueue(Mutex::new(pages.into())));
        let agg = Aggregator::new(api, ListSource::Latest, ScrollPolicy::default());
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            agg.load_first_page(None).await.unwrap();
            for _ in 1..count {
                agg.load_next_page().await.unwrap();
            }
        });
        agg
    }

    /// 任意页序列累积后 `content_id` 唯一
    proptest! {
        #[test]
        fn prop_accumulated_ids_unique(pages in prop::collection::vec(page_strategy(), 1..6)) {
            let agg = load_all(pages);
            let snap = agg.snapshot();
            let unique: HashSet<_> = snap.bookmarks.iter().map(|b| b.content_id.clone()).collect();
            prop_assert_eq!(unique.len(), snap.bookmarks.len());
        }

        #[test]
        fn prop_cursor_follows_last_response(pages in prop::collection::vec(page_strategy(), 1..6)) {
            let expected = pages.last().map(|p| p.next_cursor.clone()).unwrap_or_default();
            let agg = load_all(pages);
            prop_assert_eq!(agg.cursor(), expected);
        }

        #[test]
        fn prop_filter_idempotent_and_clear_restores(
            pages in prop::collection::vec(page_strategy(), 1..4),
            selected in prop::collection::btree_set(0u8..4, 0..3),
        ) {
            let agg = load_all(pages);
            let ids: Vec<String> = selected.into_iter().map(|c| format!("c{c}")).collect();

            let once = agg.apply_category_filter(ids.clone());
            let twice = agg.apply_category_filter(ids);
            prop_assert_eq!(once, twice);

            let all = agg.apply_category_filter(Vec::<String>::new());
            prop_assert_eq!(all, agg.snapshot().bookmarks);
        }
    }
}
