pub mod genesistudio;
pub mod novelupdates;
pub mod penguin_squad;
pub mod readingpia;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use crate::config::Config;
use crate::crawler::Downloader;
use crate::crawler::retry::RetryPolicy;
use crate::novel::ChapterContent;

pub use genesistudio::GenesistudioSite;
pub use novelupdates::{NovelUpdates, NovelUpdatesSite};
pub use penguin_squad::PenguinSquadSite;
pub use readingpia::ReadingPiaSite;

#[derive(Debug, Error)]
pub enum SiteError {
    #[error("Paywall detected. Unable to access further chapters.")]
    Paywall,
    #[error("遇到 Cloudflare 验证页面: {url}")]
    Challenge { url: String },
    #[error("跳转到了意外的站点: {url}")]
    UnexpectedHost { url: String },
    #[error("页面缺少元素 '{selector}': {url}")]
    MissingElement { selector: String, url: String },
    #[error("尚未登录 NovelUpdates")]
    NotLoggedIn,
    #[error("{attempts} 次尝试后仍未获取到内容: {target}")]
    RetriesExhausted { attempts: u32, target: String },
}

impl SiteError {
    pub fn missing(selector: &str, url: &str) -> Self {
        Self::MissingElement {
            selector: selector.to_owned(),
            url: url.to_owned(),
        }
    }

    pub fn is_paywall(error: &anyhow::Error) -> bool {
        matches!(error.downcast_ref::<SiteError>(), Some(SiteError::Paywall))
    }

    pub fn is_retryable(error: &anyhow::Error) -> bool {
        !matches!(
            error.downcast_ref::<SiteError>(),
            Some(SiteError::Paywall | SiteError::NotLoggedIn)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteKind {
    PenguinSquad,
    Genesistudio,
    ReadingPia,
    /// 直接跟随 NovelUpdates 的外链, 用通用规则提取正文
    NovelUpdates,
}

impl SiteKind {
    pub const ALL: [SiteKind; 4] = [
        SiteKind::PenguinSquad,
        SiteKind::Genesistudio,
        SiteKind::ReadingPia,
        SiteKind::NovelUpdates,
    ];

    pub fn from_choice(choice: &str) -> Option<Self> {
        let index: usize = choice.trim().parse().ok()?;
        Self::ALL.get(index.checked_sub(1)?).copied()
    }

    pub fn menu() -> String {
        Self::ALL
            .iter()
            .enumerate()
            .map(|(i, kind)| format!("{} {}", i + 1, kind.label()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `auth`/`sites` 配置中使用的键
    pub fn name(&self) -> &'static str {
        match self {
            SiteKind::PenguinSquad => "penguinsquad",
            SiteKind::Genesistudio => "genesistudio",
            SiteKind::ReadingPia => "readingpia",
            SiteKind::NovelUpdates => "novelupdates",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SiteKind::PenguinSquad => "PenguinSquad",
            SiteKind::Genesistudio => "Genesistudio",
            SiteKind::ReadingPia => "ReadingPia",
            SiteKind::NovelUpdates => "NovelUpdates",
        }
    }

    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            SiteKind::PenguinSquad => Some("https://penguin-squad.com"),
            SiteKind::Genesistudio => Some("https://genesistudio.com"),
            SiteKind::ReadingPia => Some(readingpia::BASE_URL),
            SiteKind::NovelUpdates => Some(novelupdates::BASE_URL),
        }
    }

    pub fn default_retry(&self) -> RetryPolicy {
        match self {
            SiteKind::Genesistudio => RetryPolicy::fixed(3, 5),
            SiteKind::ReadingPia => RetryPolicy::linear(3, 1),
            SiteKind::PenguinSquad | SiteKind::NovelUpdates => RetryPolicy::fixed(1, 0),
        }
    }

    /// 章节目录来自翻译站本身, 而不是 NovelUpdates
    pub fn needs_source_url(&self) -> bool {
        matches!(self, SiteKind::PenguinSquad | SiteKind::ReadingPia)
    }
}

#[async_trait]
pub trait TranslationSite: Send + Sync {
    fn kind(&self) -> SiteKind;

    /// 下载前的准备, 例如登录
    async fn prepare(&self) -> Result<()> {
        Ok(())
    }

    /// 按阅读顺序返回章节链接
    async fn chapter_links(&self, url: &str) -> Result<Vec<String>>;

    async fn chapter_content(&self, url: &str) -> Result<ChapterContent>;
}

pub fn build(
    kind: SiteKind,
    config: &Config,
    downloader: Arc<Downloader>,
    novelupdates: Arc<NovelUpdates>,
) -> Box<dyn TranslationSite> {
    let retry = config.retry_policy(kind);
    match kind {
        SiteKind::PenguinSquad => Box::new(PenguinSquadSite::new(downloader)),
        SiteKind::Genesistudio => Box::new(GenesistudioSite::new(
            downloader,
            novelupdates,
            retry,
            genesistudio::HOST,
        )),
        SiteKind::ReadingPia => {
            let base_url = config.base_url(kind.name(), readingpia::BASE_URL);
            Box::new(ReadingPiaSite::new(downloader, base_url, retry))
        }
        SiteKind::NovelUpdates => Box::new(NovelUpdatesSite::new(novelupdates, retry)),
    }
}

/// 处理 `//host/path` 和相对路径形式的链接
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if let Some(rest) = href.strip_prefix("//") {
        return Some(format!("https://{}", rest));
    }
    let base = url::Url::parse(base).ok()?;
    base.join(href).ok().map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choice_maps_to_kind() {
        assert_eq!(SiteKind::from_choice("1"), Some(SiteKind::PenguinSquad));
        assert_eq!(SiteKind::from_choice(" 2 "), Some(SiteKind::Genesistudio));
        assert_eq!(SiteKind::from_choice("0"), None);
        assert_eq!(SiteKind::from_choice("5"), None);
        assert_eq!(SiteKind::from_choice("x"), None);
    }

    #[test]
    fn resolves_protocol_relative_and_relative_links() {
        assert_eq!(
            resolve_url("https://a.com/series/", "//www.novelupdates.com/extnu/1/").as_deref(),
            Some("https://www.novelupdates.com/extnu/1/")
        );
        assert_eq!(
            resolve_url("https://a.com/series/x/", "/chapter-1").as_deref(),
            Some("https://a.com/chapter-1")
        );
        assert_eq!(resolve_url("https://a.com/", "  "), None);
    }

    #[test]
    fn paywall_is_detected_through_anyhow() {
        let err: anyhow::Error = SiteError::Paywall.into();
        assert!(SiteError::is_paywall(&err));
        assert!(!SiteError::is_retryable(&err));

        let err = anyhow::anyhow!("timeout");
        assert!(!SiteError::is_paywall(&err));
        assert!(SiteError::is_retryable(&err));
    }
}
