use std::path::Path;

use anyhow::Result;
use async_zip::tokio::write::ZipFileWriter;
use async_zip::{Compression, ZipEntryBuilder};
use tokio::fs::{self, File};
use tracing::{debug, info, instrument, warn};

pub struct Compressor;

impl Default for Compressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor {
    pub fn new() -> Self {
        Self
    }

    /// 把工作目录打包到 `epub_path`, 完成后删除工作目录
    #[instrument(skip_all)]
    pub async fn compress_epub(&self, epub_dir: &Path, epub_path: &Path) -> Result<()> {
        info!("正在压缩EPUB文件: {}", epub_path.display());

        let file = File::create(epub_path).await?;
        let mut writer = ZipFileWriter::with_tokio(file);

        // mimetype 必须是第一个且不压缩
        Self::add_mimetype(&mut writer, epub_dir).await?;
        Self::add_directory(&mut writer, epub_dir).await?;

        writer.close().await?;

        match fs::remove_dir_all(epub_dir).await {
            Ok(_) => debug!("临时文件夹已删除: {}", epub_dir.display()),
            Err(e) => warn!("删除临时文件夹时出错: {}: {}", epub_dir.display(), e),
        }

        Ok(())
    }

    async fn add_mimetype(writer: &mut ZipFileWriter<File>, dir: &Path) -> Result<()> {
        let content = fs::read(dir.join("mimetype")).await?;
        if content != b"application/epub+zip" {
            anyhow::bail!("mimetype 内容无效");
        }

        let entry = ZipEntryBuilder::new("mimetype".into(), Compression::Stored);
        writer.write_entry_whole(entry, &content).await?;
        Ok(())
    }

    async fn add_directory(writer: &mut ZipFileWriter<File>, root_dir: &Path) -> Result<()> {
        // 栈中保存待处理的目录和它在 ZIP 中的路径
        let mut stack = vec![(root_dir.to_path_buf(), String::new())];

        while let Some((current_dir, current_base_path)) = stack.pop() {
            let mut entries = fs::read_dir(&current_dir).await?;

            let mut sub_dirs = Vec::new();
            let mut files = Vec::new();

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().to_string();

                if name == "mimetype" && current_base_path.is_empty() {
                    continue;
                }

                let zip_path = if current_base_path.is_empty() {
                    name
                } else {
                    format!("{}/{}", current_base_path, name)
                };

                if entry.file_type().await?.is_dir() {
                    sub_dirs.push((path, zip_path));
                } else {
                    files.push((path, zip_path));
                }
            }

            // 保证条目顺序稳定
            files.sort();
            sub_dirs.sort();

            for (file_path, zip_path) in files {
                Self::add_file(writer, &file_path, &zip_path).await?;
            }

            for (dir_path, zip_path) in sub_dirs.into_iter().rev() {
                stack.push((dir_path, zip_path));
            }
        }

        Ok(())
    }

    async fn add_file(
        writer: &mut ZipFileWriter<File>,
        file_path: &Path,
        zip_path: &str,
    ) -> Result<()> {
        debug!("正在添加文件: {}", zip_path);

        let content = fs::read(file_path).await?;
        let entry = ZipEntryBuilder::new(zip_path.into(), Compression::Deflate);
        writer.write_entry_whole(entry, &content).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mimetype_is_stored_first() {
        let dir = tempfile::tempdir().unwrap();
        let epub_dir = dir.path().join("book");
        std::fs::create_dir_all(epub_dir.join("META-INF")).unwrap();
        std::fs::write(epub_dir.join("mimetype"), "application/epub+zip").unwrap();
        std::fs::write(epub_dir.join("META-INF").join("container.xml"), "<container/>").unwrap();

        let epub_path = dir.path().join("book.epub");
        Compressor::new().compress_epub(&epub_dir, &epub_path).await.unwrap();

        assert!(!epub_dir.exists());
        let bytes = std::fs::read(&epub_path).unwrap();
        // 本地文件头固定 30 字节, 紧接着是文件名
        assert_eq!(&bytes[0..4], b"PK\x03\x04");
        assert_eq!(&bytes[30..38], b"mimetype");
        let stored = bytes
            .windows(20)
            .position(|w| w == b"application/epub+zip")
            .unwrap();
        assert!(stored < 128);
    }

    #[tokio::test]
    async fn invalid_mimetype_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mimetype"), "text/plain").unwrap();
        let result = Compressor::new()
            .compress_epub(dir.path(), &dir.path().join("x.epub"))
            .await;
        assert!(result.is_err());
    }
}
