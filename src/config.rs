use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use reqwest::cookie::Jar;
use serde::Deserialize;
use tracing::{info, warn};

use crate::crawler::retry::RetryPolicy;
use crate::extractor::BookExtractor;
use crate::site::SiteKind;

static CONFIG_FILE: &str = "config";
static ENV_PREFIX: &str = "NOVEL_FETCH";
static SITE_CONFIG_DIR: &str = "config";
static BUILTIN_CATALOG_CONFIG: &str = include_str!("../config/novelupdates.toml");

/// 站点名, 用于 `auth` 与 `sites` 表的键
pub static NOVELUPDATES: &str = "novelupdates";

#[derive(Deserialize)]
pub struct Config {
    #[serde(default)]
    pub auth: HashMap<String, AuthType>,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// 使用 Cloudflare cookie 时必须与获取 cookie 的浏览器一致
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub request: RequestConfig,
    #[serde(default)]
    pub sites: HashMap<String, SiteSettings>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auth: HashMap::new(),
            cache_dir: default_cache_dir(),
            output_dir: default_output_dir(),
            user_agent: None,
            request: RequestConfig::default(),
            sites: HashMap::new(),
        }
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    Basic { username: String, password: String },
    Cookies(HashMap<String, String>),
}

#[derive(Deserialize, Clone, Copy, Debug)]
pub struct RequestConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// 每次请求前的固定等待
    #[serde(default)]
    pub delay_ms: u64,
    /// 在固定等待上叠加的随机等待上限
    #[serde(default)]
    pub jitter_ms: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            delay_ms: 0,
            jitter_ms: 0,
        }
    }
}

#[derive(Deserialize, Clone, Default, Debug)]
pub struct SiteSettings {
    pub base_url: Option<String>,
    pub retry: Option<RetryPolicy>,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache").join("db")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_timeout_secs() -> u64 {
    30
}

pub fn init_config() -> Result<Config> {
    let config = config::Config::builder()
        .add_source(
            config::File::with_name(CONFIG_FILE)
                .format(config::FileFormat::Toml)
                .required(false),
        )
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?
        .try_deserialize()
        .map_err(|e| anyhow::anyhow!("配置文件反序列化失败: {}", e))?;
    Ok(config)
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("配置反序列化失败: {}", e))
    }

    pub fn site(&self, name: &str) -> SiteSettings {
        self.sites.get(name).cloned().unwrap_or_default()
    }

    pub fn base_url(&self, name: &str, default: &str) -> String {
        self.site(name)
            .base_url
            .unwrap_or_else(|| default.to_owned())
            .trim_end_matches('/')
            .to_owned()
    }

    pub fn retry_policy(&self, kind: SiteKind) -> RetryPolicy {
        self.site(kind.name())
            .retry
            .unwrap_or_else(|| kind.default_retry())
    }

    /// 环境变量 `NU_USERNAME`/`NU_PASSWORD` 优先, 其次是 `auth.novelupdates`
    pub fn novelupdates_credentials(&self) -> Option<(String, String)> {
        if let (Ok(username), Ok(password)) =
            (std::env::var("NU_USERNAME"), std::env::var("NU_PASSWORD"))
        {
            if !username.is_empty() && !password.is_empty() {
                return Some((username, password));
            }
        }
        match self.auth.get(NOVELUPDATES) {
            Some(AuthType::Basic { username, password }) => {
                Some((username.clone(), password.clone()))
            }
            _ => None,
        }
    }

    /// 把 `auth` 表中的 cookie 按站点写入同一个 cookie jar
    pub fn get_jar(&self) -> Arc<Jar> {
        let jar = Jar::default();
        for (name, auth_type) in &self.auth {
            let AuthType::Cookies(cookies) = auth_type else {
                continue;
            };
            let Some(default_base) = known_base_url(name) else {
                warn!("未知站点 '{}' 的 cookie 配置已忽略", name);
                continue;
            };
            let base = self.base_url(name, default_base);
            let Ok(url) = reqwest::Url::parse(&base) else {
                warn!("站点 '{}' 的地址无效: {}", name, base);
                continue;
            };
            for (key, value) in cookies {
                jar.add_cookie_str(&format!("{}={}", key, value), &url);
            }
            info!("已加载站点 '{}' 的 {} 个 cookie", name, cookies.len());
        }
        Arc::new(jar)
    }
}

fn known_base_url(name: &str) -> Option<&'static str> {
    if name == NOVELUPDATES {
        return Some(crate::site::novelupdates::BASE_URL);
    }
    SiteKind::ALL
        .iter()
        .find(|kind| kind.name() == name)
        .and_then(|kind| kind.default_base_url())
}

/// 目录站点的信息提取配置
#[derive(Deserialize)]
pub struct SiteConfig {
    pub name: String,
    pub lang: String,
    pub book: BookExtractor,
}

impl SiteConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        let file_content = std::fs::read_to_string(config_path)?;
        Self::from_toml_str(&file_content)
            .map_err(|e| anyhow::anyhow!("{}文件反序列化失败: {}", config_path.display(), e))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("{}", e))
    }

    /// `config/novelupdates.toml` 存在时覆盖内置配置
    pub fn catalog() -> Result<Self> {
        let path = Path::new(SITE_CONFIG_DIR).join(format!("{}.toml", NOVELUPDATES));
        if path.is_file() {
            info!("使用本地站点配置: {}", path.display());
            return Self::load(&path);
        }
        Self::from_toml_str(BUILTIN_CATALOG_CONFIG)
    }

    pub fn get_book_config(&self) -> &BookExtractor {
        &self.book
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::crawler::retry::Backoff;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("cache").join("db"));
        assert_eq!(config.request.timeout_secs, 30);
        assert!(config.auth.is_empty());
    }

    #[test]
    fn auth_and_site_overrides() {
        let config = Config::from_toml_str(
            r#"
            cache_dir = "/tmp/novels"

            [auth.novelupdates.basic]
            username = "reader"
            password = "secret"

            [auth.genesistudio.cookies]
            cf_clearance = "abc"

            [sites.readingpia]
            base_url = "http://localhost:8080/"

            [sites.genesistudio.retry]
            max_attempts = 5
            backoff = { kind = "fixed", secs = 1 }
            "#,
        )
        .unwrap();

        assert_eq!(config.cache_dir, PathBuf::from("/tmp/novels"));
        assert_eq!(
            config.auth.get(NOVELUPDATES),
            Some(&AuthType::Basic {
                username: "reader".to_owned(),
                password: "secret".to_owned()
            })
        );
        assert_eq!(
            config.base_url("readingpia", "https://www.readingpia.me"),
            "http://localhost:8080"
        );

        let retry = config.retry_policy(SiteKind::Genesistudio);
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.backoff, Backoff::Fixed { secs: 1 });
        assert_eq!(retry.delay(0), Duration::from_secs(1));

        let default_retry = config.retry_policy(SiteKind::ReadingPia);
        assert_eq!(default_retry, SiteKind::ReadingPia.default_retry());
    }

    #[test]
    fn builtin_catalog_config_parses() {
        let site = SiteConfig::from_toml_str(BUILTIN_CATALOG_CONFIG).unwrap();
        assert_eq!(site.name, NOVELUPDATES);
        assert_eq!(site.lang, "en");
    }
}
