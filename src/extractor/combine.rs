use scraper::ElementRef;
use serde::Deserialize;

use super::{Extractor, List, Value};

/// 把列表结果用分隔符拼成单值
#[derive(Deserialize)]
pub struct Combine {
    separator: String,
    items: List,
}

impl Combine {
    fn join(&self, value: Value) -> Value {
        let combined = value.into_vec();
        if combined.is_empty() {
            Value::Empty
        } else {
            Value::Single(combined.join(&self.separator))
        }
    }
}

#[typetag::deserialize]
impl Extractor for Combine {
    fn extract(&self, element: ElementRef) -> Value {
        self.join(self.items.extract(element))
    }

    fn extract_all(&self, element: ElementRef) -> Value {
        self.join(self.items.extract_all(element))
    }
}
