pub mod chapter;
pub mod compression;
pub mod metadata;

pub use chapter::Chapter;
pub use compression::Compressor;
pub use metadata::Metadata;

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::instrument;

use crate::novel::NovelInfo;

#[derive(Debug)]
pub struct Epub {
    pub id: String,
    pub title: String,
    pub lang: String,
    pub author: String,
    pub summary: String,       // 简介内容
    pub tags: Vec<String>,     // 类型和标签
    pub cover: Option<String>, // 封面图片文件名, 位于 Images/
    pub info_page: Chapter,
    pub chapters: Vec<Chapter>,
    pub epub_dir: PathBuf,
    pub meta_dir: PathBuf,
    pub oebps_dir: PathBuf,
    pub image_dir: PathBuf,
    pub text_dir: PathBuf,
}

impl Epub {
    /// 标题同时作为唯一标识
    pub fn new(info: &NovelInfo, lang: &str, epub_dir: PathBuf) -> Self {
        let oebps_dir = epub_dir.join("OEBPS");
        let tags = [info.genre.as_str(), info.tags.as_str()]
            .iter()
            .flat_map(|list| list.split(','))
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_owned)
            .collect();

        Self {
            id: info.title.clone(),
            title: info.title.clone(),
            lang: lang.to_owned(),
            author: info.author.clone(),
            summary: info.description.clone(),
            tags,
            cover: None,
            info_page: Chapter::info_page(),
            chapters: Vec::new(),
            meta_dir: epub_dir.join("META-INF"),
            image_dir: oebps_dir.join("Images"),
            text_dir: oebps_dir.join("Text"),
            oebps_dir,
            epub_dir,
        }
    }

    pub async fn create_dirs(&self) -> Result<()> {
        if self.epub_dir.exists() {
            tokio::fs::remove_dir_all(&self.epub_dir).await?;
        }
        tokio::fs::create_dir_all(&self.meta_dir).await?;
        tokio::fs::create_dir_all(&self.image_dir).await?;
        tokio::fs::create_dir_all(&self.text_dir).await?;
        Ok(())
    }

    #[instrument(skip_all)]
    pub async fn generate(&self, epub_path: &Path) -> Result<PathBuf> {
        tracing::info!("正在生成EPUB文件: {}", self.title);

        let metadata = Metadata::new();

        // 生成所有元数据文件
        metadata.generate(self).await?;

        // 压缩成EPUB文件
        let compressor = Compressor::new();
        compressor.compress_epub(&self.epub_dir, epub_path).await?;

        tracing::info!("EPUB文件生成成功: {}", epub_path.display());
        Ok(epub_path.to_path_buf())
    }
}

impl Drop for Epub {
    fn drop(&mut self) {
        if self.epub_dir.exists() {
            // 删除EPUB文件夹
            tracing::info!("正在清理临时文件夹: {}", self.epub_dir.display());
            match std::fs::remove_dir_all(&self.epub_dir) {
                Ok(_) => tracing::info!("临时文件夹已删除: {}", self.epub_dir.display()),
                Err(e) => {
                    tracing::error!("删除临时文件夹时出错: {}: {}", self.epub_dir.display(), e)
                }
            }
        }
    }
}
