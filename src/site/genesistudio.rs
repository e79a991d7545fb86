use std::sync::{Arc, LazyLock};

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{error, info, instrument, warn};

use super::{NovelUpdates, SiteKind, TranslationSite};
use crate::crawler::Downloader;
use crate::crawler::retry::RetryPolicy;
use crate::novel::ChapterContent;

pub static HOST: &str = "genesistudio.com";

static CONTENT_START: &str = r#"<div class="break-words">"#;
static CONTENT_END: &str = r#"<div class="mb-48">"#;

static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("main h1.sr-only").expect("无法创建标题选择器"));
static BREAK_WORDS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".break-words").expect("无法创建正文选择器"));
static TITLE_FALLBACK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<h1 class="sr-only">(.*?)</h1>"#).expect("标题正则编译失败"));
static CHAPTER_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Read .+ - Chapter (\d+)(?::\s*(.+))? \|").expect("章节标题正则编译失败")
});

/// 章节目录来自 NovelUpdates, 外链跳转到 Genesis Studio 后提取正文
pub struct GenesistudioSite {
    downloader: Arc<Downloader>,
    novelupdates: Arc<NovelUpdates>,
    retry: RetryPolicy,
    host: String,
}

impl GenesistudioSite {
    pub fn new(
        downloader: Arc<Downloader>,
        novelupdates: Arc<NovelUpdates>,
        retry: RetryPolicy,
        host: &str,
    ) -> Self {
        Self {
            downloader,
            novelupdates,
            retry,
            host: host.to_owned(),
        }
    }

    async fn attempt(&self, url: &str) -> Result<Option<ChapterContent>> {
        let page = self.downloader.page(url).await?;
        info!("跳转后的地址: {}", page.url);

        if !is_on_host(&page.url, &self.host) {
            warn!("预期跳转到 {}, 实际为: {}", self.host, page.url);
            return Ok(None);
        }
        if !is_loaded(&page.html) {
            error!("页面中没有 .break-words, 可能尚未加载完成");
            return Ok(None);
        }

        let chapter = extract_content(&page.html);
        if chapter.content.is_empty() {
            return Ok(None);
        }
        Ok(Some(chapter))
    }
}

#[async_trait]
impl TranslationSite for GenesistudioSite {
    fn kind(&self) -> SiteKind {
        SiteKind::Genesistudio
    }

    async fn prepare(&self) -> Result<()> {
        if !self.novelupdates.login().await? {
            anyhow::bail!("无法登录 NovelUpdates, 不能获取章节目录");
        }
        Ok(())
    }

    async fn chapter_links(&self, url: &str) -> Result<Vec<String>> {
        self.novelupdates.get_chapter_links(url).await
    }

    #[instrument(skip(self))]
    async fn chapter_content(&self, url: &str) -> Result<ChapterContent> {
        self.retry.run(url, |_| self.attempt(url)).await
    }
}

fn is_on_host(url: &str, host: &str) -> bool {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h == host || h.ends_with(&format!(".{}", host))))
        .unwrap_or(false)
}

fn is_loaded(html: &str) -> bool {
    Html::parse_document(html).select(&BREAK_WORDS).next().is_some()
}

fn full_title(html: &str) -> String {
    let document = Html::parse_document(html);
    if let Some(title) = document.select(&TITLE).next() {
        let title = title.text().collect::<String>().trim().to_owned();
        info!("找到标题元素: '{}'", title);
        return title;
    }

    match TITLE_FALLBACK.captures(html) {
        Some(caps) => {
            let title = caps[1].trim().to_owned();
            info!("在 HTML 中找到标题: '{}'", title);
            title
        }
        None => {
            warn!("找不到标题元素 (main h1.sr-only)");
            "Unknown Title".to_owned()
        }
    }
}

/// `Read <小说> - Chapter 12: 名称 | ...` 转为 `Chapter 12: 名称`
pub fn chapter_title(full_title: &str) -> String {
    let Some(caps) = CHAPTER_TITLE.captures(full_title) else {
        warn!("章节标题匹配失败: '{}'", full_title);
        return "Unknown Chapter".to_owned();
    };
    let number = &caps[1];
    match caps.get(2).map(|m| m.as_str().trim()).filter(|n| !n.is_empty()) {
        Some(name) => format!("Chapter {}: {}", number, name),
        None => format!("Chapter {}", number),
    }
}

/// 正文取原始 HTML 中两个标记之间的部分
pub fn extract_content(html: &str) -> ChapterContent {
    let title = chapter_title(&full_title(html));

    let content = html.find(CONTENT_START).and_then(|start| {
        html[start..]
            .find(CONTENT_END)
            .map(|end| html[start..start + end].to_owned())
    });
    let content = match content {
        Some(content) => {
            info!("提取到章节内容 (长度: {})", content.len());
            content
        }
        None => {
            warn!("找不到正文标记之间的内容");
            String::new()
        }
    };

    ChapterContent::new(title, content)
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::Config;
    use crate::site::SiteError;

    const PAGE: &str = r#"<html><body><main>
        <h1 class="sr-only">Read Fated Villains - Chapter 12: The Butterfly | Genesis</h1>
        <div class="break-words"><p class="narration">The concept known as the butterfly effect</p>
        <p class="dialogue">"Eleanor"</p></div>
        <div class="mb-48"></div></main></body></html>"#;

    #[test]
    fn chapter_title_variants() {
        assert_eq!(
            chapter_title("Read Foo Bar - Chapter 3: A New Day | Genesis Studio"),
            "Chapter 3: A New Day"
        );
        assert_eq!(chapter_title("Read Foo - Chapter 4 | Genesis"), "Chapter 4");
        assert_eq!(chapter_title("Foo"), "Unknown Chapter");
    }

    #[test]
    fn content_is_cut_between_markers() {
        let chapter = extract_content(PAGE);
        assert_eq!(chapter.title, "Chapter 12: The Butterfly");
        assert!(chapter.content.starts_with(CONTENT_START));
        assert!(chapter.content.contains(r#"<p class="dialogue">"#));
        assert!(!chapter.content.contains(CONTENT_END));
    }

    #[test]
    fn title_falls_back_to_regex() {
        let html = r#"<div><h1 class="sr-only">Read X - Chapter 1: Start |</h1></div>"#;
        assert_eq!(full_title(html), "Read X - Chapter 1: Start |");
        assert_eq!(full_title("<p></p>"), "Unknown Title");
    }

    #[test]
    fn host_matching() {
        assert!(is_on_host("https://genesistudio.com/viewer/1", HOST));
        assert!(is_on_host("https://www.genesistudio.com/viewer/1", HOST));
        assert!(!is_on_host("https://notgenesistudio.com/", HOST));
        assert!(!is_on_host("https://www.novelupdates.com/extnu/1/", HOST));
    }

    fn site(server: &MockServer, host: &str) -> GenesistudioSite {
        let downloader = Arc::new(Downloader::new(&Config::default()).unwrap());
        let novelupdates = Arc::new(NovelUpdates::new(downloader.clone(), server.uri(), None));
        GenesistudioSite::new(downloader, novelupdates, RetryPolicy::fixed(3, 0), host)
    }

    #[tokio::test]
    async fn follows_redirect_to_chapter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/extnu/12/"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/viewer/12"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/viewer/12"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;

        let genesis = site(&server, "127.0.0.1");
        let chapter = genesis
            .chapter_content(&format!("{}/extnu/12/", server.uri()))
            .await
            .unwrap();
        assert_eq!(chapter.title, "Chapter 12: The Butterfly");
    }

    #[tokio::test]
    async fn wrong_host_is_retried_then_given_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/extnu/12/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .expect(3)
            .mount(&server)
            .await;

        let genesis = site(&server, HOST);
        let err = genesis
            .chapter_content(&format!("{}/extnu/12/", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SiteError>(),
            Some(SiteError::RetriesExhausted { attempts: 3, .. })
        ));
    }
}
