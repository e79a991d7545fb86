use std::io::{self, BufRead, Write};
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::site::SiteKind;

static INVALID_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\-_\. ]").expect("文件名正则编译失败"));

fn read_line<R: BufRead>(input: &mut R) -> Result<String> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        anyhow::bail!("输入已结束");
    }
    Ok(line.trim().to_owned())
}

fn prompt(message: &str) -> Result<()> {
    print!("{}", message);
    io::stdout().flush()?;
    Ok(())
}

/// 选择翻译站点, 输入无效时重新询问
#[instrument(skip_all)]
pub fn select_site<R: BufRead>(input: &mut R) -> Result<SiteKind> {
    loop {
        prompt(&format!("选择翻译站点 ({}): ", SiteKind::menu()))?;
        let choice = read_line(input)?;
        debug!("用户输入: {}", choice);
        match SiteKind::from_choice(&choice) {
            Some(kind) => return Ok(kind),
            None => println!("无效的选择, 请输入 1-{}", SiteKind::ALL.len()),
        }
    }
}

/// 读取一个合法的 URL, 输入无效时重新询问
#[instrument(skip(input))]
pub fn prompt_url<R: BufRead>(input: &mut R, label: &str) -> Result<String> {
    loop {
        prompt(&format!("请输入 {} 链接: ", label))?;
        let url = read_line(input)?;
        if validate_url(&url) {
            return Ok(url);
        }
        warn!("无效的链接, 请重新输入");
    }
}

pub fn ask_continue<R: BufRead>(input: &mut R) -> Result<bool> {
    prompt("\n是否继续爬取其他小说? (y/n): ")?;
    let choice = read_line(input)?;
    Ok(choice.to_lowercase() == "y")
}

/// 必须同时带有协议和主机
pub fn validate_url(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => !parsed.scheme().is_empty() && parsed.host_str().is_some(),
        Err(_) => false,
    }
}

pub fn sanitize_filename(name: &str) -> String {
    INVALID_FILENAME_CHARS.replace_all(name, "_").into_owned()
}

pub fn format_elapsed(duration: std::time::Duration) -> String {
    let total_ms = duration.as_millis();

    if total_ms >= 60000 {
        // 超过1分钟：显示分秒
        let mins = total_ms / 60000;
        let secs = (total_ms % 60000) / 1000;
        let ms_remaining = total_ms % 1000;

        if ms_remaining > 0 {
            format!("{}分{}秒{}毫秒", mins, secs, ms_remaining)
        } else {
            format!("{}分{}秒", mins, secs)
        }
    } else if total_ms >= 1000 {
        let secs = total_ms / 1000;
        let ms_remaining = total_ms % 1000;

        if ms_remaining > 0 {
            format!("{}秒{}毫秒", secs, ms_remaining)
        } else {
            format!("{}秒", secs)
        }
    } else {
        format!("{}毫秒", total_ms)
    }
}

#[instrument(skip_all)]
pub fn display_elapsed_time(duration: std::time::Duration) {
    info!("✅ 爬取完成！耗时: {}", format_elapsed(duration));
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use super::*;

    #[test]
    fn url_needs_scheme_and_host() {
        assert!(validate_url("https://www.novelupdates.com/series/foo/"));
        assert!(!validate_url("www.novelupdates.com/series/foo/"));
        assert!(!validate_url("mailto:someone"));
        assert!(!validate_url(""));
    }

    #[test]
    fn filename_keeps_word_chars() {
        assert_eq!(
            sanitize_filename("Re:Zero? - 12 chapters.epub"),
            "Re_Zero_ - 12 chapters.epub"
        );
        assert_eq!(sanitize_filename("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_filename("转生 - 3 chapters.epub"), "转生 - 3 chapters.epub");
    }

    #[test]
    fn select_site_reprompts_until_valid() {
        let mut input = Cursor::new("9\nabc\n2\n");
        let kind = select_site(&mut input).unwrap();
        assert_eq!(kind, SiteKind::Genesistudio);
    }

    #[test]
    fn select_site_fails_on_eof() {
        let mut input = Cursor::new("7\n");
        assert!(select_site(&mut input).is_err());
    }

    #[test]
    fn prompt_url_skips_invalid() {
        let mut input = Cursor::new("not a url\nhttps://penguin-squad.com/series/x/\n");
        let url = prompt_url(&mut input, "PenguinSquad").unwrap();
        assert_eq!(url, "https://penguin-squad.com/series/x/");
    }

    #[test]
    fn continue_answer_is_case_insensitive() {
        assert!(ask_continue(&mut Cursor::new("Y\n")).unwrap());
        assert!(!ask_continue(&mut Cursor::new("n\n")).unwrap());
    }

    #[test]
    fn elapsed_formats() {
        assert_eq!(format_elapsed(Duration::from_millis(250)), "250毫秒");
        assert_eq!(format_elapsed(Duration::from_millis(3000)), "3秒");
        assert_eq!(format_elapsed(Duration::from_millis(61_500)), "1分1秒500毫秒");
    }
}
