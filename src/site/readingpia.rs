use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use anyhow::Result;
use async_trait::async_trait;
use regex::{Captures, Regex};
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};

use super::{SiteKind, TranslationSite};
use crate::crawler::Downloader;
use crate::crawler::retry::RetryPolicy;
use crate::novel::ChapterContent;

pub static BASE_URL: &str = "https://www.readingpia.me";

static CHAPTER_LIST: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.chapter-list").expect("无法创建目录选择器"));
static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("无法创建链接选择器"));
static CHAPTER_BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.chapter-body").expect("无法创建正文选择器"));
static STRONG: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("strong").expect("无法创建标题选择器"));
static AD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.m_ad_code").expect("无法创建广告选择器"));

static JOIN_DISCORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Join Discord").expect("正则表达式编译失败"));
static DISCORD_BANNER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\[ Join Our Discord for regular updates and have fun with other community members: <a href="(https://discord\.com/invite/\S+)">([^<]*)</a> \]"#,
    )
    .expect("正则表达式编译失败")
});
static DISCORD_INVITE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https://discord\.com/invite/\w{10}").expect("正则表达式编译失败"));
static CENTERED_WRAPPER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(<div[^>]*class="chapter-body"[^>]*>)\s*<div style="text-align: center;">"#)
        .expect("正则表达式编译失败")
});

pub struct ReadingPiaSite {
    downloader: Arc<Downloader>,
    base_url: String,
    retry: RetryPolicy,
}

impl ReadingPiaSite {
    pub fn new(downloader: Arc<Downloader>, base_url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            downloader,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            retry,
        }
    }

    async fn attempt(&self, url: &str) -> Result<Option<ChapterContent>> {
        let page = self.downloader.page(url).await?;
        let chapter = extract_content(&page.html);
        if chapter.is_none() {
            warn!("未找到章节正文: {}", url);
        }
        Ok(chapter)
    }
}

#[async_trait]
impl TranslationSite for ReadingPiaSite {
    fn kind(&self) -> SiteKind {
        SiteKind::ReadingPia
    }

    #[instrument(skip(self))]
    async fn chapter_links(&self, url: &str) -> Result<Vec<String>> {
        let page = self.downloader.page(url).await?;
        let links = parse_chapter_links(&page.html, &self.base_url);
        if links.is_empty() {
            warn!("没有找到章节目录: {}", url);
        }
        info!("找到 {} 个章节链接", links.len());
        Ok(links)
    }

    #[instrument(skip(self))]
    async fn chapter_content(&self, url: &str) -> Result<ChapterContent> {
        self.retry.run(url, |_| self.attempt(url)).await
    }
}

/// 只接受站内绝对路径, 去重后反转 (目录最新章节在前)
pub fn parse_chapter_links(html: &str, base_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Some(chapter_list) = document.select(&CHAPTER_LIST).next() else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for anchor in chapter_list.select(&ANCHOR) {
        let Some(href) = anchor.value().attr("href") else {
            warn!("链接缺少 href 属性: {}", anchor.html());
            continue;
        };
        if !href.starts_with('/') {
            warn!("无效的链接: {}", href);
            continue;
        }
        let link = format!("{}{}", base_url, href);
        if seen.insert(link.clone()) {
            debug!("添加章节链接: {}", link);
            links.push(link);
        }
    }

    links.reverse();
    links
}

/// 没有正文或清理后为空时返回 `None`
pub fn extract_content(html: &str) -> Option<ChapterContent> {
    let mut document = Html::parse_document(html);
    let body = document.select(&CHAPTER_BODY).next()?;

    let title_elem = body.select(&STRONG).next();
    let title = title_elem
        .map(|e| e.text().collect::<String>().trim().to_owned())
        .unwrap_or_default();
    info!("章节标题: {}", title);

    // 标题和广告从正文中移除
    let mut removed: Vec<_> = title_elem.map(|e| e.id()).into_iter().collect();
    removed.extend(body.select(&AD).map(|e| e.id()));
    for id in removed {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }

    let body_html = document.select(&CHAPTER_BODY).next()?.html();
    let content = scrub(&body_html);
    if content.is_empty() {
        return None;
    }
    Some(ChapterContent::new(title, content))
}

fn scrub(html: &str) -> String {
    let content = JOIN_DISCORD.replace_all(html, "");
    let content = DISCORD_BANNER.replace_all(&content, |caps: &Captures| {
        if caps[1] == caps[2] {
            String::new()
        } else {
            caps[0].to_owned()
        }
    });
    let content = DISCORD_INVITE.replace_all(&content, "");
    let content = CENTERED_WRAPPER.replace_all(&content, "$1");
    content.trim().to_owned()
}
