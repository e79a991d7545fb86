use scraper::{ElementRef, Selector};
use serde::Deserialize;

use super::{Extractor, Value, deserialize_selector};

/// 按文本节点拆分, 适用于以 `<br>` 分隔的列表
#[derive(Deserialize)]
pub struct Lines {
    #[serde(deserialize_with = "deserialize_selector")]
    selector: Selector,
}

fn lines_of(element: ElementRef) -> Vec<String> {
    element
        .text()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

#[typetag::deserialize]
impl Extractor for Lines {
    fn extract(&self, element: ElementRef) -> Value {
        match element.select(&self.selector).next() {
            Some(container) => Value::from_vec(lines_of(container)),
            None => Value::Empty,
        }
    }

    fn extract_all(&self, element: ElementRef) -> Value {
        let results = element
            .select(&self.selector)
            .flat_map(lines_of)
            .collect();
        Value::from_vec(results)
    }
}
