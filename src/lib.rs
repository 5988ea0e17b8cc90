//! Csphere bookmark client core
//!
//! 分页书签列表聚合、扩展宿主桥接、选择与批量操作，
//! 以及与 Csphere 后端通信的HTTP客户端。

pub mod aggregator;
pub mod api;
pub mod bridge;
pub mod config;
pub mod error;
pub mod models;
pub mod popup;
pub mod progress;
pub mod selection;
pub mod status;
pub mod token_store;
pub mod views;

pub use aggregator::{Aggregator, ListSource, LoadOutcome, ScrollMetrics, ScrollPolicy};
pub use api::{BookmarkActions, ContentApi, FolderApi, HttpApiClient, TagApi};
pub use bridge::{Bridge, ExtractionBroker, PageExtractor};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use models::{ActionResponse, Bookmark, BookmarkPage, Category, Folder, MonthGroup, RediscoverFeed, Tag};
pub use selection::{BulkAction, SelectionController};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};
