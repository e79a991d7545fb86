use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use anyhow::Result;
use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{error, info, instrument, warn};

use super::{SiteError, SiteKind, TranslationSite, resolve_url};
use crate::config::{Config, NOVELUPDATES};
use crate::crawler::Downloader;
use crate::crawler::downloader::Page;
use crate::crawler::retry::RetryPolicy;
use crate::novel::ChapterContent;

pub static BASE_URL: &str = "https://www.novelupdates.com";

static LOGGED_IN_MARKER: &str = "Log Out";
static POST_ID_SELECTOR: &str = "input#mypostid";
static CHAPTER_LINK_SELECTOR: &str = "li.sp_li_chp a";
static CONTENT_SELECTORS: [&str; 3] = ["article", "#chapter-content", ".chapter-content"];

static POST_ID: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(POST_ID_SELECTOR).expect("无法创建文章ID选择器"));
static CHAPTER_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(CHAPTER_LINK_SELECTOR).expect("无法创建章节链接选择器"));
static HEADING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1").expect("无法创建标题选择器"));

/// NovelUpdates 会话: 登录、系列页面和完整章节目录
pub struct NovelUpdates {
    downloader: Arc<Downloader>,
    base_url: String,
    credentials: Option<(String, String)>,
    logged_in: AtomicBool,
}

impl NovelUpdates {
    pub fn new(
        downloader: Arc<Downloader>,
        base_url: impl Into<String>,
        credentials: Option<(String, String)>,
    ) -> Self {
        Self {
            downloader,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            credentials,
            logged_in: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &Config, downloader: Arc<Downloader>) -> Self {
        Self::new(
            downloader,
            config.base_url(NOVELUPDATES, BASE_URL),
            config.novelupdates_credentials(),
        )
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::Relaxed)
    }

    /// 登录失败只返回 `false`, 由调用方决定是否中止
    #[instrument(skip_all)]
    pub async fn login(&self) -> Result<bool> {
        if self.is_logged_in() {
            return Ok(true);
        }
        let Some((username, password)) = &self.credentials else {
            error!("未找到 NovelUpdates 账号, 请在 .env 中设置 NU_USERNAME 和 NU_PASSWORD");
            return Ok(false);
        };

        info!("正在登录 NovelUpdates");
        let login_url = format!("{}/login/", self.base_url);
        let page = self.downloader.page(&login_url).await?;
        if page.html.contains(LOGGED_IN_MARKER) {
            info!("已经登录 NovelUpdates");
            self.logged_in.store(true, Ordering::Relaxed);
            return Ok(true);
        }

        let redirect_to = format!("{}/", self.base_url);
        let form = [
            ("log", username.as_str()),
            ("pwd", password.as_str()),
            ("rememberme", "forever"),
            ("wp-submit", "Log In"),
            ("redirect_to", redirect_to.as_str()),
            ("testcookie", "1"),
        ];
        let submit_url = format!("{}/wp-login.php", self.base_url);
        let response = match self.downloader.post_form(&submit_url, &form).await {
            Ok(page) => page,
            Err(e) => {
                error!("登录 NovelUpdates 失败: {:#}", e);
                return Ok(false);
            }
        };

        let success = if response.html.contains(LOGGED_IN_MARKER) {
            true
        } else {
            match self.downloader.page(&login_url).await {
                Ok(page) => page.html.contains(LOGGED_IN_MARKER),
                Err(e) => {
                    error!("无法确认 NovelUpdates 登录状态: {:#}", e);
                    return Ok(false);
                }
            }
        };
        if success {
            info!("登录 NovelUpdates 成功");
            self.logged_in.store(true, Ordering::Relaxed);
        } else {
            error!("登录 NovelUpdates 失败");
        }
        Ok(success)
    }

    pub async fn series_page(&self, series_url: &str) -> Result<Page> {
        self.downloader.page(series_url).await
    }

    #[instrument(skip(self))]
    pub async fn get_chapter_links(&self, series_url: &str) -> Result<Vec<String>> {
        if !self.is_logged_in() {
            error!("请先登录 NovelUpdates");
            return Err(SiteError::NotLoggedIn.into());
        }

        let page = self.series_page(series_url).await?;
        let post_id = parse_post_id(&page.html)
            .ok_or_else(|| SiteError::missing(POST_ID_SELECTOR, &page.url))?;

        let ajax_url = format!("{}/wp-admin/admin-ajax.php", self.base_url);
        let form = [
            ("action", "nd_getchapters"),
            ("mypostid", post_id.as_str()),
            ("mygrr", "0"),
        ];
        let list = self.downloader.post_form(&ajax_url, &form).await?;

        let links = parse_chapter_links(&list.html, &self.base_url);
        info!("从 NovelUpdates 获取到 {} 个章节链接", links.len());
        Ok(links)
    }

    /// `/extnu/` 链接会跳转到翻译站, 用通用规则提取
    #[instrument(skip(self))]
    pub async fn get_chapter_content(&self, chapter_url: &str) -> Result<ChapterContent> {
        let page = self.downloader.page(chapter_url).await?;
        info!("跳转后的地址: {}", page.url);
        extract_generic_content(&page.html, &page.url)
    }
}

pub fn parse_post_id(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&POST_ID)
        .next()
        .and_then(|input| input.value().attr("value"))
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
}

/// 目录按最新在前排列, 反转后按阅读顺序返回
pub fn parse_chapter_links(html: &str, base_url: &str) -> Vec<String> {
    let document = Html::parse_fragment(html);
    let mut seen = HashSet::new();
    let mut links: Vec<String> = document
        .select(&CHAPTER_LINK)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| href.contains("/extnu/"))
        .filter_map(|href| resolve_url(base_url, href))
        .filter(|link| seen.insert(link.clone()))
        .collect();
    links.reverse();
    links
}

pub fn extract_generic_content(html: &str, url: &str) -> Result<ChapterContent> {
    let document = Html::parse_document(html);

    let title = document
        .select(&HEADING)
        .next()
        .map(|h1| h1.text().collect::<String>().trim().to_owned())
        .filter(|title| !title.is_empty())
        .ok_or_else(|| SiteError::missing("h1", url))?;

    let content = CONTENT_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| document.select(&selector).next().map(|e| e.html()));

    match content {
        Some(content) => Ok(ChapterContent::new(title, content)),
        None => {
            warn!("找不到章节内容: {}", url);
            Err(SiteError::missing(&CONTENT_SELECTORS.join(", "), url).into())
        }
    }
}

/// 跟随 NovelUpdates 目录中的外链, 适用于没有专门适配的翻译站
pub struct NovelUpdatesSite {
    novelupdates: Arc<NovelUpdates>,
    retry: RetryPolicy,
}

impl NovelUpdatesSite {
    pub fn new(novelupdates: Arc<NovelUpdates>, retry: RetryPolicy) -> Self {
        Self {
            novelupdates,
            retry,
        }
    }
}

#[async_trait]
impl TranslationSite for NovelUpdatesSite {
    fn kind(&self) -> SiteKind {
        SiteKind::NovelUpdates
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

    async fn chapter_content(&self, url: &str) -> Result<ChapterContent> {
        let novelupdates = &self.novelupdates;
        self.retry
            .run(url, |_| async move {
                novelupdates.get_chapter_content(url).await.map(Some)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const CHAPTER_LIST: &str = r#"
        <ol class="sp_chp">
          <li class="sp_li_chp"><a href="//www.novelupdates.com/extnu/3/"><span>c3</span></a></li>
          <li class="sp_li_chp"><a href="//www.novelupdates.com/series/foo/">series</a>
                                <a href="//www.novelupdates.com/extnu/2/"><span>c2</span></a></li>
          <li class="sp_li_chp"><a href="//www.novelupdates.com/extnu/1/"><span>c1</span></a></li>
        </ol>"#;

    fn session(server: &MockServer, credentials: Option<(String, String)>) -> NovelUpdates {
        let downloader = Arc::new(Downloader::new(&Config::default()).unwrap());
        NovelUpdates::new(downloader, server.uri(), credentials)
    }

    fn reader() -> Option<(String, String)> {
        Some(("reader".to_owned(), "secret".to_owned()))
    }

    #[test]
    fn chapter_links_are_oldest_first() {
        let links = parse_chapter_links(CHAPTER_LIST, BASE_URL);
        assert_eq!(
            links,
            vec![
                "https://www.novelupdates.com/extnu/1/",
                "https://www.novelupdates.com/extnu/2/",
                "https://www.novelupdates.com/extnu/3/",
            ]
        );
    }

    #[test]
    fn post_id_from_series_page() {
        let html = r#"<html><body><input type="hidden" id="mypostid" value=" 4242 "></body></html>"#;
        assert_eq!(parse_post_id(html).as_deref(), Some("4242"));
        assert_eq!(parse_post_id("<html></html>"), None);
    }

    #[test]
    fn generic_content_prefers_article() {
        let html = r#"<html><body><h1> Chapter 7 </h1>
            <div class="chapter-content">fallback</div>
            <article><p>Body</p></article></body></html>"#;
        let chapter = extract_generic_content(html, "https://t.example/7").unwrap();
        assert_eq!(chapter.title, "Chapter 7");
        assert_eq!(chapter.content, "<article><p>Body</p></article>");
    }

    #[test]
    fn generic_content_without_body_fails() {
        let html = "<html><body><h1>Chapter 7</h1><p>nothing</p></body></html>";
        let err = extract_generic_content(html, "https://t.example/7").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SiteError>(),
            Some(SiteError::MissingElement { .. })
        ));
    }

    #[tokio::test]
    async fn login_without_credentials_fails_softly() {
        let server = MockServer::start().await;
        let nu = session(&server, None);
        assert!(!nu.login().await.unwrap());
        assert!(!nu.is_logged_in());
    }

    #[tokio::test]
    async fn links_require_login() {
        let server = MockServer::start().await;
        let nu = session(&server, reader());
        let err = nu
            .get_chapter_links(&format!("{}/series/foo/", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SiteError>(),
            Some(SiteError::NotLoggedIn)
        ));
    }

    #[tokio::test]
    async fn login_then_fetch_chapter_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/login/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<form id=\"loginform\"></form>"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/wp-login.php"))
            .and(body_string_contains("log=reader"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<a>Log Out</a>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/series/foo/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"<input id="mypostid" value="99">"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/wp-admin/admin-ajax.php"))
            .and(body_string_contains("action=nd_getchapters"))
            .and(body_string_contains("mypostid=99"))
            .respond_with(ResponseTemplate::new(200).set_body_string(CHAPTER_LIST))
            .mount(&server)
            .await;

        let nu = session(&server, reader());
        assert!(nu.login().await.unwrap());
        let links = nu
            .get_chapter_links(&format!("{}/series/foo/", server.uri()))
            .await
            .unwrap();
        assert_eq!(links.len(), 3);
        assert!(links[0].ends_with("/extnu/1/"));
    }

    #[tokio::test]
    async fn already_logged_in_skips_form() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/login/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<a>Log Out</a>"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/wp-login.php"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let nu = session(&server, reader());
        assert!(nu.login().await.unwrap());
    }

    #[tokio::test]
    async fn failed_login_check_returns_false() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/login/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<form id=\"loginform\"></form>"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/login/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/wp-login.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>redirecting</p>"))
            .expect(1)
            .mount(&server)
            .await;

        let nu = session(&server, reader());
        assert!(!nu.login().await.unwrap());
        assert!(!nu.is_logged_in());
    }
}
