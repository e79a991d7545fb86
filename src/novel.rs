use html_escape::encode_text;

/// 从 NovelUpdates 系列页面解析出的小说信息
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NovelInfo {
    pub title: String,
    pub cover: Option<String>, // 封面图片链接
    pub author: String,
    pub novel_type: String,
    pub associated_names: Vec<String>, // 别名
    pub genre: String,                 // 逗号分隔
    pub tags: String,                  // 逗号分隔
    pub description: String,
}

impl NovelInfo {
    /// 转成缓存表 `novel_info` 的键值对
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("title", self.title.clone()),
            ("cover", self.cover.clone().unwrap_or_default()),
            ("author", self.author.clone()),
            ("type", self.novel_type.clone()),
            ("associated_names", self.associated_names.join("\n")),
            ("genre", self.genre.clone()),
            ("tags", self.tags.clone()),
            ("description", self.description.clone()),
        ]
    }

    /// 信息页正文, 不含 XHTML 外壳
    pub fn info_body(&self) -> String {
        let mut body = String::new();
        body.push_str(&format!("<h1>{}</h1>\n", encode_text(&self.title)));
        let fields = [
            ("Author", &self.author),
            ("Type", &self.novel_type),
            ("Genre", &self.genre),
            ("Tags", &self.tags),
            ("Description", &self.description),
        ];
        for (label, value) in fields {
            body.push_str(&format!(
                "<p><strong>{}:</strong> {}</p>\n",
                label,
                encode_text(value)
            ));
        }
        body
    }
}

/// 单章内容, `content` 为 HTML 片段
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterContent {
    pub title: String,
    pub content: String,
}

impl ChapterContent {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.title.trim().is_empty() && !self.content.trim().is_empty()
    }
}
