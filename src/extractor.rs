pub mod attr;
pub mod combine;
pub mod lines;
pub mod list;
pub mod text;

use scraper::{ElementRef, Selector};
use serde::{Deserialize, Deserializer};

pub use attr::Attr;
pub use combine::Combine;
pub use lines::Lines;
pub use list::List;
pub use text::Text;

#[derive(Debug, PartialEq)]
pub enum Value {
    /// 空结果
    Empty,
    /// 单值结果
    Single(String),
    /// 多值结果
    Multiple(Vec<String>),
}

impl Value {
    pub fn into_single(self) -> Option<String> {
        match self {
            Value::Single(v) => Some(v),
            Value::Multiple(vs) => vs.into_iter().next(),
            Value::Empty => None,
        }
    }

    pub fn into_vec(self) -> Vec<String> {
        match self {
            Value::Single(v) => vec![v],
            Value::Multiple(vs) => vs,
            Value::Empty => Vec::new(),
        }
    }

    fn from_vec(values: Vec<String>) -> Self {
        if values.is_empty() {
            Value::Empty
        } else {
            Value::Multiple(values)
        }
    }
}

#[typetag::deserialize(tag = "type")]
pub trait Extractor: Send + Sync {
    fn extract(&self, element: ElementRef) -> Value;

    fn extract_all(&self, element: ElementRef) -> Value;
}

/// 小说信息页的提取规则, 未配置的可选字段提取结果为 `Value::Empty`
#[derive(Deserialize)]
pub struct BookExtractor {
    #[serde(default, deserialize_with = "deserialize_nullable_selector")]
    pub this: Option<Selector>,
    pub title: Box<dyn Extractor>,
    pub author: Box<dyn Extractor>,
    pub cover_url: Option<Box<dyn Extractor>>,
    pub novel_type: Option<Box<dyn Extractor>>,
    pub associated_names: Option<Box<dyn Extractor>>,
    pub genre: Option<Box<dyn Extractor>>,
    pub tags: Option<Box<dyn Extractor>>,
    pub description: Option<Box<dyn Extractor>>,
}

fn extract_optional(extractor: &Option<Box<dyn Extractor>>, this: ElementRef) -> Value {
    match extractor {
        Some(extractor) => extractor.extract(this),
        None => Value::Empty,
    }
}

impl BookExtractor {
    /// 未配置 `this` 时直接使用传入的根元素
    pub fn this<'a>(&self, element: ElementRef<'a>) -> Option<ElementRef<'a>> {
        match &self.this {
            Some(selector) => element.select(selector).next(),
            None => Some(element),
        }
    }

    pub fn extract_title(&self, this: ElementRef) -> Value {
        self.title.extract(this)
    }

    pub fn extract_author(&self, this: ElementRef) -> Value {
        self.author.extract(this)
    }

    pub fn extract_cover_url(&self, this: ElementRef) -> Value {
        extract_optional(&self.cover_url, this)
    }

    pub fn extract_novel_type(&self, this: ElementRef) -> Value {
        extract_optional(&self.novel_type, this)
    }

    pub fn extract_associated_names(&self, this: ElementRef) -> Value {
        extract_optional(&self.associated_names, this)
    }

    pub fn extract_genre(&self, this: ElementRef) -> Value {
        extract_optional(&self.genre, this)
    }

    pub fn extract_tags(&self, this: ElementRef) -> Value {
        extract_optional(&self.tags, this)
    }

    pub fn extract_description(&self, this: ElementRef) -> Value {
        extract_optional(&self.description, this)
    }
}

fn deserialize_selector<'de, D>(deserializer: D) -> Result<Selector, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;

    Selector::parse(&s).map_err(|e| serde::de::Error::custom(format!("Invalid selector: {}", e)))
}

fn deserialize_nullable_selector<'de, D>(deserializer: D) -> Result<Option<Selector>, D::Error>
where
    D: Deserializer<'de>,
{
    let option_str: Option<String> = Option::deserialize(deserializer)?;

    match option_str {
        Some(s) if s.trim().is_empty() => Ok(None), // 空字符串也视为 None
        Some(s) => Selector::parse(&s)
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("Invalid selector '{}': {}", s, e))),
        None => Ok(None),
    }
}
