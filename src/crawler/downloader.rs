use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use rand::Rng;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, info, instrument};

use crate::config::{Config, RequestConfig};
use crate::site::SiteError;

static IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

/// 一次请求的结果, `url` 为跟随跳转后的最终地址
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub status: StatusCode,
    pub html: String,
}

/// 整个流程共用的 HTTP 会话, cookie (包括登录状态) 在各站点间共享
pub struct Downloader {
    client: Client,
    request: RequestConfig,
}

impl Downloader {
    pub fn new(config: &Config) -> Result<Self> {
        let user_agent = match &config.user_agent {
            Some(ua) => ua.clone(),
            None => ua_generator::ua::spoof_ua().to_owned(),
        };
        debug!("User-Agent: {}", user_agent);

        let client = Client::builder()
            .cookie_provider(config.get_jar())
            .user_agent(user_agent)
            .timeout(Duration::from_secs(config.request.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            request: config.request,
        })
    }

    async fn pause(&self) {
        let jitter = if self.request.jitter_ms > 0 {
            rand::rng().random_range(0..=self.request.jitter_ms)
        } else {
            0
        };
        let wait = self.request.delay_ms + jitter;
        if wait > 0 {
            tokio::time::sleep(Duration::from_millis(wait)).await;
        }
    }

    #[instrument(skip(self))]
    pub async fn page(&self, url: &str) -> Result<Page> {
        self.pause().await;
        info!("正在请求页面");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("请求失败 {}: {}", url, e))?;
        Self::into_page(response).await
    }

    #[instrument(skip(self, form))]
    pub async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Page> {
        self.pause().await;
        info!("正在提交表单");
        let response = self
            .client
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("请求失败 {}: {}", url, e))?;
        Self::into_page(response).await
    }

    async fn into_page(response: Response) -> Result<Page> {
        let url = response.url().to_string();
        let status = response.status();
        let html = response
            .text()
            .await
            .map_err(|e| anyhow::anyhow!("读取响应失败 {}: {}", url, e))?;

        if is_challenge(status, &html) {
            return Err(SiteError::Challenge { url }.into());
        }
        if !status.is_success() {
            anyhow::bail!("{} 返回状态码 {}", url, status);
        }
        Ok(Page { url, status, html })
    }

    /// 下载图片, 返回内容和扩展名
    #[instrument(skip(self))]
    pub async fn image(&self, url: &str) -> Result<(Bytes, String)> {
        self.pause().await;
        info!("正在下载图片");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("下载失败 {}: {}", url, e))?
            .error_for_status()?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let extension = image_extension(url, content_type.as_deref());

        let image_bytes = response
            .bytes()
            .await
            .map_err(|e| anyhow::anyhow!("读取响应失败 {}: {}", url, e))?;
        if image_bytes.is_empty() {
            anyhow::bail!("图片内容为空: {}", url);
        }
        Ok((image_bytes, extension))
    }
}

/// Cloudflare 验证页通常是 403/503 加上固定的页面特征
pub fn is_challenge(status: StatusCode, html: &str) -> bool {
    let suspicious_status =
        status == StatusCode::FORBIDDEN || status == StatusCode::SERVICE_UNAVAILABLE;
    suspicious_status
        && (html.contains("Just a moment...")
            || html.contains("cf-chl")
            || html.contains("challenge-platform"))
}

fn image_extension(url: &str, content_type: Option<&str>) -> String {
    let path = url::Url::parse(url)
        .map(|u| u.path().to_owned())
        .unwrap_or_else(|_| url.to_owned());
    let from_path = Path::new(&path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .filter(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()));
    if let Some(ext) = from_path {
        return ext;
    }

    match content_type {
        Some(ct) if ct.starts_with("image/png") => "png".to_owned(),
        Some(ct) if ct.starts_with("image/gif") => "gif".to_owned(),
        Some(ct) if ct.starts_with("image/webp") => "webp".to_owned(),
        _ => "jpg".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn challenge_needs_status_and_marker() {
        let body = "<title>Just a moment...</title>";
        assert!(is_challenge(StatusCode::SERVICE_UNAVAILABLE, body));
        assert!(!is_challenge(StatusCode::OK, body));
        assert!(!is_challenge(StatusCode::FORBIDDEN, "<p>forbidden</p>"));
    }

    #[test]
    fn extension_from_path_then_content_type() {
        assert_eq!(image_extension("https://a.com/cover.PNG?x=1", None), "png");
        assert_eq!(image_extension("https://a.com/cover", Some("image/webp")), "webp");
        assert_eq!(image_extension("https://a.com/cover.php", Some("text/html")), "jpg");
    }

    #[tokio::test]
    async fn challenge_page_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/guarded"))
            .respond_with(
                ResponseTemplate::new(503).set_body_string("<title>Just a moment...</title>"),
            )
            .mount(&server)
            .await;

        let downloader = Downloader::new(&Config::default()).unwrap();
        let err = downloader
            .page(&format!("{}/guarded", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SiteError>(),
            Some(SiteError::Challenge { .. })
        ));
    }

    #[tokio::test]
    async fn image_is_downloaded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cover.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;

        let downloader = Downloader::new(&Config::default()).unwrap();
        let (bytes, ext) = downloader
            .image(&format!("{}/cover.png", server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes.as_ref(), &[1u8, 2, 3]);
        assert_eq!(ext, "png");
    }
}
