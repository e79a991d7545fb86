pub mod cache;
pub mod config;
pub mod crawler;
pub mod epub;
pub mod extractor;
pub mod logger;
pub mod novel;
pub mod site;
pub mod utils;

pub use cache::NovelCache;
pub use config::Config;
pub use crawler::NovelFetcher;
pub use epub::{Chapter, Epub};
pub use novel::{ChapterContent, NovelInfo};
pub use site::{SiteError, SiteKind, TranslationSite};
