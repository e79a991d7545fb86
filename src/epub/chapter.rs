/// EPUB 中的一个 XHTML 页面
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub index: usize,
    pub title: String,
    pub filename: String, // Text/ 目录下的文件名
}

impl Chapter {
    pub fn numbered(index: usize, title: impl Into<String>) -> Self {
        Self {
            index,
            title: title.into(),
            filename: format!("chapter_{}.xhtml", index),
        }
    }

    pub fn info_page() -> Self {
        Self {
            index: 0,
            title: "Novel Information".to_owned(),
            filename: "info.xhtml".to_owned(),
        }
    }

    pub fn cover_page() -> Self {
        Self {
            index: 0,
            title: "Cover".to_owned(),
            filename: "cover.xhtml".to_owned(),
        }
    }
}
