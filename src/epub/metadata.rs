use anyhow::Result;
use html_escape::{encode_double_quoted_attribute, encode_text};
use tokio::fs;
use tracing::{debug, info, instrument};

use super::{Chapter, Epub};

pub struct Metadata;

impl Default for Metadata {
    fn default() -> Self {
        Self::new()
    }
}

impl Metadata {
    pub fn new() -> Self {
        Self
    }

    /// 生成mimetype文件
    #[instrument(skip_all)]
    pub async fn mimetype(&self, epub: &Epub) -> Result<()> {
        fs::write(epub.epub_dir.join("mimetype"), "application/epub+zip").await?;
        debug!("mimetype文件生成完成");
        Ok(())
    }

    /// 生成container.xml文件
    #[instrument(skip_all)]
    pub async fn container_xml(&self, epub: &Epub) -> Result<()> {
        let container_content = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
    <rootfiles>
        <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
    </rootfiles>
</container>"#;
        fs::write(epub.meta_dir.join("container.xml"), container_content).await?;
        debug!("container.xml文件生成完成");
        Ok(())
    }

    /// 生成content.opf文件
    #[instrument(skip_all)]
    pub async fn content_opf(&self, epub: &Epub) -> Result<()> {
        fs::write(epub.oebps_dir.join("content.opf"), Self::opf(epub)).await?;
        debug!("content.opf文件生成完成");
        Ok(())
    }

    /// 生成toc.ncx文件
    #[instrument(skip_all)]
    pub async fn toc_ncx(&self, epub: &Epub) -> Result<()> {
        fs::write(epub.oebps_dir.join("toc.ncx"), Self::ncx(epub)).await?;
        debug!("toc.ncx文件生成完成");
        Ok(())
    }

    /// 生成所有元数据文件
    #[instrument(skip_all)]
    pub async fn generate(&self, epub: &Epub) -> Result<()> {
        info!("正在生成EPUB元数据文件");
        self.mimetype(epub).await?;
        self.container_xml(epub).await?;
        self.content_opf(epub).await?;
        self.toc_ncx(epub).await?;
        info!("EPUB元数据文件已生成");
        Ok(())
    }
}

impl Metadata {
    pub fn opf(epub: &Epub) -> String {
        let mut content_opf = String::new();
        content_opf.push_str(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package version="2.0" xmlns="http://www.idpf.org/2007/opf" unique-identifier="BookId">"#,
        );
        Self::opf_metadata(&mut content_opf, epub);
        Self::opf_manifest(&mut content_opf, epub);
        Self::opf_spine(&mut content_opf, epub);
        Self::opf_guide(&mut content_opf, epub);
        content_opf.push_str("\n</package>");
        content_opf
    }

    fn opf_metadata(content_opf: &mut String, epub: &Epub) {
        content_opf.push_str(&format!(
            r#"
    <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
        <dc:identifier id="BookId">{}</dc:identifier>
        <dc:title>{}</dc:title>
        <dc:language>{}</dc:language>
        <dc:creator opf:role="aut">{}</dc:creator>"#,
            encode_text(&epub.id),
            encode_text(&epub.title),
            encode_text(&epub.lang),
            encode_text(&epub.author)
        ));

        for tag in &epub.tags {
            content_opf.push_str(&format!(
                r#"
        <dc:subject>{}</dc:subject>"#,
                encode_text(tag)
            ));
        }

        if !epub.summary.is_empty() {
            content_opf.push_str(&format!(
                r#"
        <dc:description>{}</dc:description>"#,
                encode_text(&epub.summary)
            ));
        }

        content_opf.push_str(&format!(
            r#"
        <dc:date>{}</dc:date>"#,
            chrono::Local::now().format("%Y-%m-%d")
        ));

        if epub.cover.is_some() {
            content_opf.push_str(
                r#"
        <meta name="cover" content="cover-image"/>"#,
            );
        }

        content_opf.push_str(
            r#"
        <meta name="generator" content="novel-fetch"/>
    </metadata>"#,
        );
    }

    fn opf_manifest(content_opf: &mut String, epub: &Epub) {
        content_opf.push_str(
            r#"
    <manifest>
        <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>"#,
        );

        if let Some(cover_name) = &epub.cover {
            content_opf.push_str(&format!(
                r#"
        <item id="cover-image" href="Images/{}" media-type="{}"/>
        <item id="cover" href="Text/{}" media-type="application/xhtml+xml"/>"#,
                cover_name,
                Self::get_media_type(cover_name),
                Chapter::cover_page().filename
            ));
        }

        content_opf.push_str(&format!(
            r#"
        <item id="info" href="Text/{}" media-type="application/xhtml+xml"/>"#,
            epub.info_page.filename
        ));

        for chapter in &epub.chapters {
            content_opf.push_str(&format!(
                r#"
        <item id="chap{}" href="Text/{}" media-type="application/xhtml+xml"/>"#,
                chapter.index, chapter.filename
            ));
        }
        content_opf.push_str(
            r#"
    </manifest>"#,
        );
    }

    fn opf_spine(content_opf: &mut String, epub: &Epub) {
        content_opf.push_str(
            r#"
    <spine toc="ncx">"#,
        );
        if epub.cover.is_some() {
            content_opf.push_str(
                r#"
        <itemref idref="cover"/>"#,
            );
        }
        content_opf.push_str(
            r#"
        <itemref idref="info"/>"#,
        );
        for chapter in &epub.chapters {
            content_opf.push_str(&format!(
                r#"
        <itemref idref="chap{}"/>"#,
                chapter.index
            ));
        }
        content_opf.push_str(
            r#"
    </spine>"#,
        );
    }

    fn opf_guide(content_opf: &mut String, epub: &Epub) {
        content_opf.push_str(
            r#"
    <guide>"#,
        );
        if epub.cover.is_some() {
            content_opf.push_str(&format!(
                r#"
        <reference type="cover" title="Cover" href="Text/{}"/>"#,
                Chapter::cover_page().filename
            ));
        }
        content_opf.push_str(&format!(
            r#"
        <reference type="text" title="{}" href="Text/{}"/>
    </guide>"#,
            encode_double_quoted_attribute(&epub.info_page.title),
            epub.info_page.filename
        ));
    }

    fn get_media_type(filename: &str) -> &str {
        if filename.ends_with(".png") {
            "image/png"
        } else if filename.ends_with(".jpg") || filename.ends_with(".jpeg") {
            "image/jpeg"
        } else if filename.ends_with(".gif") {
            "image/gif"
        } else if filename.ends_with(".webp") {
            "image/webp"
        } else {
            "application/octet-stream"
        }
    }
}

impl Metadata {
    /// 信息页在前, 章节归入 "Chapters" 分组
    pub fn ncx(epub: &Epub) -> String {
        let mut toc_ncx = String::new();
        toc_ncx.push_str(&format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx version="2005-1" xmlns="http://www.daisy.org/z3986/2005/ncx/">
    <head>
        <meta name="dtb:uid" content="{}"/>
        <meta name="dtb:depth" content="2"/>
        <meta name="dtb:totalPageCount" content="0"/>
        <meta name="dtb:maxPageNumber" content="0"/>
    </head>
    <docTitle>
        <text>{}</text>
    </docTitle>
    <navMap>"#,
            encode_double_quoted_attribute(&epub.id),
            encode_text(&epub.title)
        ));

        let mut nav_point_counter = 1;
        toc_ncx.push_str(&format!(
            r#"
        <navPoint id="navPoint{}" playOrder="{}">
            <navLabel>
                <text>{}</text>
            </navLabel>
            <content src="Text/{}"/>
        </navPoint>"#,
            nav_point_counter,
            nav_point_counter,
            encode_text(&epub.info_page.title),
            epub.info_page.filename
        ));
        nav_point_counter += 1;

        if let Some(first) = epub.chapters.first() {
            // 分组节点指向第一章, 同一文件必须使用同一个 playOrder
            toc_ncx.push_str(&format!(
                r#"
        <navPoint id="chapters" playOrder="{}">
            <navLabel>
                <text>Chapters</text>
            </navLabel>
            <content src="Text/{}"/>"#,
                nav_point_counter, first.filename
            ));

            Self::toc_ncx_chapters(&mut toc_ncx, &epub.chapters, &mut nav_point_counter);

            toc_ncx.push_str(
                r#"
        </navPoint>"#,
            );
        }

        toc_ncx.push_str(
            r#"
    </navMap>
</ncx>"#,
        );
        toc_ncx
    }

    fn toc_ncx_chapters(toc_ncx: &mut String, chapters: &[Chapter], nav_point_counter: &mut usize) {
        for chapter in chapters {
            toc_ncx.push_str(&format!(
                r#"
            <navPoint id="navPoint{}" playOrder="{}">
                <navLabel>
                    <text>{}</text>
                </navLabel>
                <content src="Text/{}"/>
            </navPoint>"#,
                nav_point_counter,
                nav_point_counter,
                encode_text(&chapter.title),
                chapter.filename
            ));
            *nav_point_counter += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::novel::NovelInfo;

    fn epub(with_cover: bool) -> Epub {
        let info = NovelInfo {
            title: "Tom & Jerry".to_owned(),
            author: "A <B>".to_owned(),
            genre: "Drama, Fantasy".to_owned(),
            tags: "Villainess".to_owned(),
            description: "Short".to_owned(),
            ..Default::default()
        };
        // 不存在的目录, Drop 时不会删除任何东西
        let mut epub = Epub::new(&info, "en", PathBuf::from("does-not-exist-epub-test"));
        if with_cover {
            epub.cover = Some("abc.jpg".to_owned());
        }
        epub.chapters.push(Chapter::numbered(1, "Chapter 1"));
        epub.chapters.push(Chapter::numbered(2, "Chapter 2: <Two>"));
        epub
    }

    #[test]
    fn opf_lists_everything_in_order() {
        let opf = Metadata::opf(&epub(true));
        assert!(opf.contains("<dc:title>Tom &amp; Jerry</dc:title>"));
        assert!(opf.contains("<dc:creator opf:role=\"aut\">A &lt;B&gt;</dc:creator>"));
        assert!(opf.contains("<dc:subject>Drama</dc:subject>"));
        assert!(opf.contains("<dc:subject>Fantasy</dc:subject>"));
        assert!(opf.contains("<dc:subject>Villainess</dc:subject>"));
        assert!(opf.contains(r#"<meta name="cover" content="cover-image"/>"#));
        assert!(opf.contains(r#"href="Images/abc.jpg" media-type="image/jpeg""#));

        let cover = opf.find(r#"<itemref idref="cover"/>"#).unwrap();
        let info = opf.find(r#"<itemref idref="info"/>"#).unwrap();
        let chap1 = opf.find(r#"<itemref idref="chap1"/>"#).unwrap();
        let chap2 = opf.find(r#"<itemref idref="chap2"/>"#).unwrap();
        assert!(cover < info && info < chap1 && chap1 < chap2);
    }

    #[test]
    fn opf_without_cover() {
        let opf = Metadata::opf(&epub(false));
        assert!(!opf.contains("cover-image"));
        assert!(!opf.contains(r#"idref="cover""#));
    }

    #[test]
    fn ncx_nests_chapters() {
        let ncx = Metadata::ncx(&epub(false));
        assert!(ncx.contains("<text>Novel Information</text>"));
        assert!(ncx.contains("<text>Chapters</text>"));
        assert!(ncx.contains("<text>Chapter 2: &lt;Two&gt;</text>"));
        assert_eq!(ncx.matches("<navPoint ").count(), 4);
        assert_eq!(ncx.matches("</navPoint>").count(), 4);
    }

    fn play_orders(ncx: &str) -> Vec<(String, String)> {
        let re = regex::Regex::new(r#"(?s)playOrder="(\d+)">.*?<content src="([^"]+)"/>"#).unwrap();
        re.captures_iter(ncx)
            .map(|caps| (caps[2].to_owned(), caps[1].to_owned()))
            .collect()
    }

    #[test]
    fn same_target_shares_play_order() {
        let ncx = Metadata::ncx(&epub(false));
        assert_eq!(
            play_orders(&ncx),
            vec![
                ("Text/info.xhtml".to_owned(), "1".to_owned()),
                ("Text/chapter_1.xhtml".to_owned(), "2".to_owned()),
                ("Text/chapter_1.xhtml".to_owned(), "2".to_owned()),
                ("Text/chapter_2.xhtml".to_owned(), "3".to_owned()),
            ]
        );

        let mut single = epub(false);
        single.chapters.truncate(1);
        let orders = play_orders(&Metadata::ncx(&single));
        let chapter_orders: Vec<_> = orders
            .iter()
            .filter(|(src, _)| src == "Text/chapter_1.xhtml")
            .map(|(_, order)| order.as_str())
            .collect();
        assert_eq!(chapter_orders, vec!["2", "2"]);
    }
}
