use scraper::{ElementRef, Selector};
use serde::Deserialize;

use super::{Extractor, Value, deserialize_nullable_selector};

/// 元素的全部文本, 去掉首尾空白
#[derive(Debug, Deserialize)]
pub struct Text {
    #[serde(default, deserialize_with = "deserialize_nullable_selector")]
    selector: Option<Selector>,
}

fn text_of(element: ElementRef) -> Option<String> {
    let text = element.text().collect::<String>();
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_owned())
    }
}

#[typetag::deserialize]
impl Extractor for Text {
    fn extract(&self, element: ElementRef) -> Value {
        let elem = if let Some(selector) = &self.selector {
            element.select(selector).next()
        } else {
            Some(element)
        };
        elem.and_then(text_of).map_or(Value::Empty, Value::Single)
    }

    fn extract_all(&self, element: ElementRef) -> Value {
        let results = if let Some(selector) = &self.selector {
            element.select(selector).filter_map(text_of).collect()
        } else {
            text_of(element).into_iter().collect()
        };

        Value::from_vec(results)
    }
}
