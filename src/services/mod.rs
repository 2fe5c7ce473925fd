pub mod file_service;
pub mod markdown_service;
pub mod meta_store;
pub mod page_service;
pub mod search_service;

pub use file_service::ContentStore;
pub use markdown_service::MarkdownService;
pub use meta_store::MetaStore;
pub use page_service::PageService;
pub use search_service::SearchService;
