use std::sync::{Arc, LazyLock};

use anyhow::Result;
use async_trait::async_trait;
use html_escape::encode_text;
use scraper::{Html, Selector};
use tracing::{info, instrument};

use super::{SiteError, SiteKind, TranslationSite, resolve_url};
use crate::crawler::Downloader;
use crate::novel::ChapterContent;

static PAYWALL_MESSAGE: &str = "You are attempting to access the Glacial Archives when you are not even a citizen of the Antarctic Empire. Immigrate to the Antarctic Empire to buy access to the Glacial Archives.";

static LINK_SELECTOR: &str = "a.chapter-group__list-item-link";
static TITLE_SELECTOR: &str = "h1.chapter__title";
static CONTENT_SELECTOR: &str = "section#chapter-content";

static LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(LINK_SELECTOR).expect("无法创建章节链接选择器"));
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(TITLE_SELECTOR).expect("无法创建标题选择器"));
static CONTENT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(CONTENT_SELECTOR).expect("无法创建正文选择器"));

pub struct PenguinSquadSite {
    downloader: Arc<Downloader>,
}

impl PenguinSquadSite {
    pub fn new(downloader: Arc<Downloader>) -> Self {
        Self { downloader }
    }
}

#[async_trait]
impl TranslationSite for PenguinSquadSite {
    fn kind(&self) -> SiteKind {
        SiteKind::PenguinSquad
    }

    #[instrument(skip(self))]
    async fn chapter_links(&self, url: &str) -> Result<Vec<String>> {
        let page = self.downloader.page(url).await?;
        let links = parse_chapter_links(&page.html, &page.url);
        info!("找到 {} 个章节链接", links.len());
        Ok(links)
    }

    #[instrument(skip(self))]
    async fn chapter_content(&self, url: &str) -> Result<ChapterContent> {
        let page = self.downloader.page(url).await?;
        extract_content(&page.html, &page.url)
    }
}

pub fn parse_chapter_links(html: &str, page_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&LINK)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| resolve_url(page_url, href))
        .collect()
}

/// 正文是纯文本, 按行转成段落; 遇到付费墙返回 `SiteError::Paywall`
pub fn extract_content(html: &str, url: &str) -> Result<ChapterContent> {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE)
        .next()
        .map(|e| e.text().collect::<String>().trim().to_owned())
        .ok_or_else(|| SiteError::missing(TITLE_SELECTOR, url))?;
    let text = document
        .select(&CONTENT)
        .next()
        .map(|e| e.text().collect::<String>().trim().to_owned())
        .ok_or_else(|| SiteError::missing(CONTENT_SELECTOR, url))?;

    if text.contains(PAYWALL_MESSAGE) {
        return Err(SiteError::Paywall.into());
    }

    Ok(ChapterContent::new(title, text_to_paragraphs(&text)))
}

fn text_to_paragraphs(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| format!("<p>{}</p>", encode_text(line)))
        .collect::<Vec<_>>()
        .join("\n")
}
