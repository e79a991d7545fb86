use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info, instrument};

use crate::novel::{ChapterContent, NovelInfo};
use crate::utils::sanitize_filename;

/// 单本小说的本地缓存, 一本小说对应一个 SQLite 文件
pub struct NovelCache {
    pool: SqlitePool,
    path: Option<PathBuf>,
}

impl NovelCache {
    /// `<cache_dir>/<title>.db`, 标题中的空格替换为下划线
    pub fn db_path(cache_dir: &Path, novel_title: &str) -> PathBuf {
        let name = sanitize_filename(&format!("{}.db", novel_title)).replace(' ', "_");
        cache_dir.join(name)
    }

    #[instrument(skip(cache_dir))]
    pub async fn open(cache_dir: &Path, novel_title: &str) -> Result<Self> {
        tokio::fs::create_dir_all(cache_dir).await?;
        let path = Self::db_path(cache_dir, novel_title);
        info!("打开缓存: {}", path.display());

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let cache = Self {
            pool,
            path: Some(path),
        };
        cache.init_tables().await?;
        Ok(cache)
    }

    /// 仅用于测试和一次性运行
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let cache = Self { pool, path: None };
        cache.init_tables().await?;
        Ok(cache)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS novel_info (
                key TEXT PRIMARY KEY,
                value TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chapters (
                chapter_number INTEGER PRIMARY KEY,
                title TEXT,
                content TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn cache_novel_info(&self, novel_info: &NovelInfo) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in novel_info.to_pairs() {
            sqlx::query("INSERT OR REPLACE INTO novel_info (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        debug!("小说信息已缓存");
        Ok(())
    }

    pub async fn get_novel_info(&self) -> Result<HashMap<String, String>> {
        let rows: Vec<(String, Option<String>)> =
            sqlx::query_as("SELECT key, value FROM novel_info")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(key, value)| (key, value.unwrap_or_default()))
            .collect())
    }

    pub async fn cache_chapter(&self, chapter_number: u32, title: &str, content: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO chapters (chapter_number, title, content) VALUES (?, ?, ?)",
        )
        .bind(i64::from(chapter_number))
        .bind(title)
        .bind(content)
        .execute(&self.pool)
        .await?;
        debug!("第 {} 章已缓存", chapter_number + 1);
        Ok(())
    }

    pub async fn get_cached_chapter(&self, chapter_number: u32) -> Result<Option<ChapterContent>> {
        let row: Option<(Option<String>, Option<String>)> =
            sqlx::query_as("SELECT title, content FROM chapters WHERE chapter_number = ?")
                .bind(i64::from(chapter_number))
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(title, content)| {
            ChapterContent::new(title.unwrap_or_default(), content.unwrap_or_default())
        }))
    }

    pub async fn get_all_cached_chapters(&self) -> Result<Vec<(u32, ChapterContent)>> {
        let rows: Vec<(i64, Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT chapter_number, title, content FROM chapters ORDER BY chapter_number",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(number, title, content)| {
                let number = u32::try_from(number)
                    .map_err(|_| anyhow::anyhow!("无效的章节序号: {}", number))?;
                Ok((
                    number,
                    ChapterContent::new(title.unwrap_or_default(), content.unwrap_or_default()),
                ))
            })
            .collect()
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
