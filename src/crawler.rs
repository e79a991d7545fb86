pub mod downloader;
pub mod parser;
pub mod processor;
pub mod retry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, instrument, warn};

pub use downloader::Downloader;
pub use parser::Parser;
pub use processor::Processor;

use crate::cache::NovelCache;
use crate::config::Config;
use crate::epub::{Chapter, Epub};
use crate::novel::{ChapterContent, NovelInfo};
use crate::site::{self, NovelUpdates, SiteError, SiteKind, TranslationSite};
use crate::utils::sanitize_filename;

/// 一次完整的抓取流程: 小说信息 → 章节 → EPUB
pub struct NovelFetcher {
    config: Config,
    parser: Parser,
    downloader: Arc<Downloader>,
    novelupdates: Arc<NovelUpdates>,
}

impl NovelFetcher {
    pub fn new(config: Config) -> Result<Self> {
        let downloader = Arc::new(Downloader::new(&config)?);
        let novelupdates = Arc::new(NovelUpdates::from_config(&config, downloader.clone()));
        Ok(Self {
            parser: Parser::catalog()?,
            config,
            downloader,
            novelupdates,
        })
    }

    pub fn site(&self, kind: SiteKind) -> Box<dyn TranslationSite> {
        site::build(
            kind,
            &self.config,
            self.downloader.clone(),
            self.novelupdates.clone(),
        )
    }

    /// 抓取并缓存系列页面的小说信息, 解析失败直接返回错误
    #[instrument(skip(self))]
    pub async fn novel_info(&self, series_url: &str) -> Result<(NovelInfo, NovelCache)> {
        let page = self.novelupdates.series_page(series_url).await?;
        let novel_info = self.parser.novel_info(&page.html)?;

        let cache = NovelCache::open(&self.config.cache_dir, &novel_info.title).await?;
        cache.cache_novel_info(&novel_info).await?;
        Ok((novel_info, cache))
    }

    /// 已缓存的章节直接使用, 其余逐章下载后写入缓存
    #[instrument(skip_all)]
    pub async fn download(
        &self,
        site: &dyn TranslationSite,
        source_url: &str,
        cache: &NovelCache,
    ) -> Result<Vec<ChapterContent>> {
        let links = site.chapter_links(source_url).await?;
        if links.is_empty() {
            warn!("没有找到任何章节: {}", source_url);
            return Ok(Vec::new());
        }

        let total = links.len();
        let pb = progress_bar(total)?;
        let mut chapters = Vec::with_capacity(total);
        for (i, link) in links.iter().enumerate() {
            let chapter_number = u32::try_from(i)?;

            if let Some(cached) = cache.get_cached_chapter(chapter_number).await? {
                if cached.is_complete() {
                    pb.suspend(|| info!("[{}/{}] 使用缓存: {}", i + 1, total, cached.title));
                    chapters.push(cached);
                    pb.inc(1);
                    continue;
                }
            }

            match site.chapter_content(link).await {
                Ok(chapter) if chapter.is_complete() => {
                    cache
                        .cache_chapter(chapter_number, &chapter.title, &chapter.content)
                        .await?;
                    pb.suspend(|| info!("[{}/{}] 已下载: {}", i + 1, total, chapter.title));
                    chapters.push(chapter);
                }
                Ok(_) => pb.suspend(|| {
                    warn!("[{}/{}] 章节内容为空, 已跳过: {}", i + 1, total, link)
                }),
                Err(e) if SiteError::is_paywall(&e) => {
                    pb.suspend(|| warn!("[{}/{}] {}, 停止下载", i + 1, total, e));
                    break;
                }
                Err(e) => pb.suspend(|| {
                    error!("[{}/{}] 下载失败, 已跳过: {}: {:#}", i + 1, total, link, e)
                }),
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        info!("共获得 {}/{} 章", chapters.len(), total);
        Ok(chapters)
    }

    /// 返回生成的 EPUB 路径, 文件名中的章节数为实际收录的章节数
    #[instrument(skip_all)]
    pub async fn generate_epub(
        &self,
        novel_info: &NovelInfo,
        chapters: &[ChapterContent],
    ) -> Result<PathBuf> {
        let epub_name = sanitize_filename(&format!(
            "{} - {} chapters",
            novel_info.title,
            chapters.len()
        ));
        let output_dir = &self.config.output_dir;
        tokio::fs::create_dir_all(output_dir).await?;
        let epub_path = output_dir.join(format!("{}.epub", epub_name));

        let mut epub = Epub::new(novel_info, self.parser.lang(), output_dir.join(&epub_name));
        epub.create_dirs().await?;
        let processor = Processor::new(epub.image_dir.clone(), epub.text_dir.clone());

        if let Some(cover_url) = &novel_info.cover {
            match self.cover(&processor, cover_url).await {
                Ok(cover_name) => {
                    let cover_page = Chapter::cover_page();
                    let body = format!(
                        "<div class=\"cover\"><img src=\"../Images/{}\" alt=\"Cover\"/></div>",
                        cover_name
                    );
                    processor
                        .write_html(&processor::page(&cover_page.title, &body), &cover_page)
                        .await?;
                    epub.cover = Some(cover_name);
                }
                Err(e) => warn!("封面下载失败, 不带封面继续: {:#}", e),
            }
        }

        let info_page = processor::page(&epub.info_page.title, &novel_info.info_body());
        processor.write_html(&info_page, &epub.info_page).await?;

        for (i, chapter_content) in chapters.iter().enumerate() {
            let chapter = Chapter::numbered(i + 1, chapter_content.title.as_str());
            processor
                .write_chapter(&chapter_content.content, &chapter)
                .await?;
            epub.chapters.push(chapter);
        }

        epub.generate(&epub_path).await
    }

    async fn cover(&self, processor: &Processor, cover_url: &str) -> Result<String> {
        let (cover_bytes, extension) = self.downloader.image(cover_url).await?;
        processor.write_image(cover_bytes, &extension).await
    }

    /// `source_url` 为空时使用 NovelUpdates 系列页面
    #[instrument(skip(self))]
    pub async fn run(
        &self,
        kind: SiteKind,
        series_url: &str,
        source_url: Option<&str>,
    ) -> Result<PathBuf> {
        let site = self.site(kind);
        site.prepare().await?;

        let (novel_info, cache) = self.novel_info(series_url).await?;
        info!("小说: {} / {}", novel_info.title, novel_info.author);

        let source_url = source_url.unwrap_or(series_url);
        let chapters = self.download(site.as_ref(), source_url, &cache).await?;
        cache.close().await;

        if chapters.is_empty() {
            anyhow::bail!("没有可用的章节, 不生成 EPUB");
        }
        self.generate_epub(&novel_info, &chapters).await
    }
}

fn progress_bar(total: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/dim}] {pos}/{len} ({eta})")?
            .progress_chars("█▓░"),
    );
    pb.set_message("Downloading chapters");
    Ok(pb)
}
