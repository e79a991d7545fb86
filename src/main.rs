use std::io;
use std::time::Instant;

use anyhow::Result;
use tracing::{error, info};

use novel_fetch::config::init_config;
use novel_fetch::utils::{ask_continue, display_elapsed_time, prompt_url, select_site};
use novel_fetch::{NovelFetcher, logger};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logger::init();

    let config = init_config()?;
    let fetcher = NovelFetcher::new(config)?;
    let mut input = io::stdin().lock();

    loop {
        println!("\n=== novel-fetch ===");
        let kind = select_site(&mut input)?;
        let series_url = prompt_url(&mut input, "NovelUpdates 系列页面")?;
        let source_url = if kind.needs_source_url() {
            Some(prompt_url(&mut input, kind.label())?)
        } else {
            None
        };

        info!("开始爬取: {} ({})", series_url, kind.label());
        let start = Instant::now();
        match fetcher.run(kind, &series_url, source_url.as_deref()).await {
            Ok(epub_path) => {
                info!("EPUB 已保存: {}", epub_path.display());
                display_elapsed_time(start.elapsed());
            }
            Err(e) => error!("爬取失败: {:#}", e),
        }

        if !ask_continue(&mut input)? {
            break;
        }
    }

    Ok(())
}
