use std::path::PathBuf;

use anyhow::Result;
use bytes::Bytes;
use html_escape::{encode_double_quoted_attribute, encode_text};
use scraper::{ElementRef, Html, Node};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info, instrument};

use crate::epub::chapter::Chapter;

static XML_CONTENT_1: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.1//EN" "http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd">
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
    <title>"#;

static XML_CONTENT_2: &str = r#"</title>
    <meta http-equiv="Content-Type" content="text/html; charset=UTF-8"/>
</head>
<body>
"#;

static XML_CONTENT_3: &str = r#"
</body>
</html>"#;

static VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

static DROPPED_ELEMENTS: [&str; 5] = ["script", "style", "iframe", "noscript", "template"];

#[derive(Clone)]
pub struct Processor {
    image_dir: PathBuf,
    text_dir: PathBuf,
}

impl Processor {
    pub fn new(image_dir: PathBuf, text_dir: PathBuf) -> Self {
        Self {
            image_dir,
            text_dir,
        }
    }

    /// 章节页: 标题 + 正文, 正文先规范化为 XHTML
    #[instrument(skip_all)]
    pub async fn write_chapter(&self, chapter_content: &str, chapter: &Chapter) -> Result<()> {
        info!("正在保存章节: {}", chapter.title);
        let body = format!(
            "    <h1>{}</h1>\n    <div class=\"chapter-content\">\n{}\n    </div>",
            encode_text(&chapter.title),
            to_xhtml(chapter_content)
        );
        self.write_html(&page(&chapter.title, &body), chapter).await
    }

    #[instrument(skip_all)]
    pub async fn write_html(&self, html: &str, chapter: &Chapter) -> Result<()> {
        let html_path = self.text_dir.join(&chapter.filename);
        fs::write(&html_path, html).await?;

        debug!("XHTML 已保存到: {}", html_path.display());

        Ok(())
    }

    #[instrument(skip_all)]
    pub async fn write_image(&self, image_bytes: Bytes, extension: &str) -> Result<String> {
        info!("正在保存图片: {}", extension);
        let mut hasher = Sha256::new();
        hasher.update(&image_bytes);
        let hash = hasher.finalize();
        let filename = format!("{:x}.{}", hash, extension);
        let image_path = self.image_dir.join(&filename);
        if image_path.exists() {
            info!("重复图片: {}", image_path.display());
            return Ok(filename);
        }
        fs::write(&image_path, &image_bytes).await?;
        info!("图片已保存到: {}", image_path.display());
        Ok(filename)
    }
}

/// 完整的 XHTML 页面, `body` 原样插入
pub fn page(title: &str, body: &str) -> String {
    let mut xhtml_content = String::new();
    xhtml_content.push_str(XML_CONTENT_1);
    xhtml_content.push_str(&encode_text(title));
    xhtml_content.push_str(XML_CONTENT_2);
    xhtml_content.push_str(body);
    xhtml_content.push_str(XML_CONTENT_3);
    xhtml_content
}

/// 把站点返回的 HTML 片段重新序列化为合法的 XHTML
pub fn to_xhtml(fragment: &str) -> String {
    let document = Html::parse_fragment(fragment);
    let mut out = String::with_capacity(fragment.len());
    write_children(document.root_element(), &mut out);
    out
}

fn write_children(element: ElementRef, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&encode_text(&**text)),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    write_element(child, out);
                }
            }
            _ => {}
        }
    }
}

fn write_element(element: ElementRef, out: &mut String) {
    let name = element.value().name();
    if DROPPED_ELEMENTS.contains(&name) {
        return;
    }

    out.push('<');
    out.push_str(name);
    for (attr, value) in element.value().attrs() {
        if !is_xml_name(attr) {
            continue;
        }
        out.push_str(&format!(" {}=\"{}\"", attr, encode_double_quoted_attribute(value)));
    }

    if VOID_ELEMENTS.contains(&name) {
        out.push_str("/>");
        return;
    }

    out.push('>');
    write_children(element, out);
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

// 带命名空间前缀或非法字符的属性在 XHTML 中无法解析
fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
