use scraper::{ElementRef, Selector};
use serde::Deserialize;

use super::{Extractor, Value, deserialize_selector};

/// 在容器内对 `item` 做 `extract_all`
#[derive(Deserialize)]
pub struct List {
    #[serde(deserialize_with = "deserialize_selector")]
    selector: Selector,
    item: Box<dyn Extractor>,
}

#[typetag::deserialize]
impl Extractor for List {
    fn extract(&self, element: ElementRef) -> Value {
        let Some(container) = element.select(&self.selector).next() else {
            return Value::Empty;
        };

        Value::from_vec(self.item.extract_all(container).into_vec())
    }

    fn extract_all(&self, element: ElementRef) -> Value {
        let results = element
            .select(&self.selector)
            .flat_map(|container| self.item.extract_all(container).into_vec())
            .collect();

        Value::from_vec(results)
    }
}
