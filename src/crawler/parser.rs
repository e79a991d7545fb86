use anyhow::Result;
use scraper::Html;
use tracing::{info, instrument};

use crate::config::SiteConfig;
use crate::extractor::Value;
use crate::novel::NovelInfo;

/// 按站点配置解析 NovelUpdates 系列页面
pub struct Parser {
    config: SiteConfig,
}

impl Parser {
    pub fn new(config: SiteConfig) -> Self {
        Self { config }
    }

    pub fn catalog() -> Result<Self> {
        Ok(Self::new(SiteConfig::catalog()?))
    }

    pub fn lang(&self) -> &str {
        &self.config.lang
    }

    /// 别名可以为空, 其余字段缺失时报错
    #[instrument(skip_all)]
    pub fn novel_info(&self, novel_html: &str) -> Result<NovelInfo> {
        info!("正在解析小说信息");
        let document = Html::parse_document(novel_html);

        let book_extractor = self.config.get_book_config();

        let Some(book_elem) = book_extractor.this(document.root_element()) else {
            anyhow::bail!("无法获取小说元素")
        };

        let Some(title) = book_extractor.extract_title(book_elem).into_single() else {
            anyhow::bail!("无法提取小说标题");
        };

        let Some(author) = book_extractor.extract_author(book_elem).into_single() else {
            anyhow::bail!("无法提取作者信息");
        };

        let cover = required(book_extractor.extract_cover_url(book_elem), "封面")?;
        let novel_type = required(book_extractor.extract_novel_type(book_elem), "类型")?;
        let associated_names = book_extractor
            .extract_associated_names(book_elem)
            .into_vec();
        let genre = required(book_extractor.extract_genre(book_elem), "分类")?;
        let tags = required(book_extractor.extract_tags(book_elem), "标签")?;
        let description = required(book_extractor.extract_description(book_elem), "简介")?;

        let novel_info = NovelInfo {
            title,
            cover: Some(cover),
            author,
            novel_type,
            associated_names,
            genre,
            tags,
            description,
        };

        info!("小说信息解析完成: {}", novel_info.title);
        Ok(novel_info)
    }
}

fn required(value: Value, field: &str) -> Result<String> {
    match value.into_single() {
        Some(v) => Ok(v),
        None => anyhow::bail!("无法提取{}", field),
    }
}
