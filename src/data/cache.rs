//! Element Cache
//!
//! Canonical in-memory store of the elements fetched from the current engine.
//! The cache itself is not synchronized; `FetchCoordinator` owns it behind a
//! single mutex so every merge and update is serialized.

use std::collections::HashMap;

use crate::model::{Element, ElementResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Incremental page: add unseen elements, ignore known ids
    Append,
    /// Full refresh: the page becomes the new truth
    Replace,
}

#[derive(Debug, Clone, Default)]
pub struct ElementCache {
    elements: Vec<Element>,
    index: HashMap<String, usize>,
}

impl ElementCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a page and returns how many elements it contributed.
    pub fn merge(&mut self, page: Vec<Element>, mode: MergeMode) -> usize {
        match mode {
            MergeMode::Append => self.append(page),
            MergeMode::Replace => self.replace(page),
        }
    }

    fn append(&mut self, page: Vec<Element>) -> usize {
        let mut added = 0;
        for element in page {
            if self.index.contains_key(&element.itemid) {
                continue;
            }
            self.push(element);
            added += 1;
        }
        added
    }

    fn replace(&mut self, page: Vec<Element>) -> usize {
        let mut previous = std::mem::take(&mut self.elements);
        let previous_index = std::mem::take(&mut self.index);

        for mut element in page {
            if self.index.contains_key(&element.itemid) {
                continue;
            }
            // A partial refresh must never lose results we already know
            if element.results().is_empty() {
                if let Some(&pos) = previous_index.get(&element.itemid) {
                    let known = previous[pos].take_results();
                    element.set_results(known);
                }
            }
            self.push(element);
        }
        self.elements.len()
    }

    fn push(&mut self, element: Element) {
        self.index.insert(element.itemid.clone(), self.elements.len());
        self.elements.push(element);
    }

    /// Replaces an element by identity. Unknown ids are ignored.
    pub fn update(&mut self, element: Element) -> bool {
        match self.index.get(&element.itemid) {
            Some(&pos) => {
                self.elements[pos] = element;
                true
            }
            None => false,
        }
    }

    pub fn count(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Element> {
        self.index.get(id).map(|&pos| &self.elements[pos])
    }

    /// Read-only view in insertion order
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn find_result(&self, result_id: &str) -> Option<&ElementResult> {
        self.elements
            .iter()
            .flat_map(|e| e.results())
            .find(|r| r.itemid == result_id)
    }

    pub fn clear(&mut self) {
        self.elements.clear();
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn element(id: &str) -> Element {
        Element::new(id, format!("name-{id}"), format!("tcp://{id}"), "A10HTTPRESTv2")
    }

    fn with_results(id: &str, results: &[&str]) -> Element {
        let now = Utc::now();
        element(id).with_results(
            results
                .iter()
                .enumerate()
                .map(|(i, r)| ElementResult::new(*r, id, 0, now - Duration::minutes(i as i64)))
                .collect(),
        )
    }

    fn ids(cache: &ElementCache) -> Vec<&str> {
        cache.elements().iter().map(|e| e.itemid.as_str()).collect()
    }

    #[test]
    fn test_append_is_idempotent() {
        let page = vec![element("a"), element("b")];
        let mut once = ElementCache::new();
        once.merge(page.clone(), MergeMode::Append);

        let mut twice = ElementCache::new();
        assert_eq!(twice.merge(page.clone(), MergeMode::Append), 2);
        assert_eq!(twice.merge(page, MergeMode::Append), 0);

        assert_eq!(once.elements(), twice.elements());
        assert_eq!(ids(&twice), vec!["a", "b"]);
    }

    #[test]
    fn test_append_keeps_existing_copy() {
        let mut cache = ElementCache::new();
        cache.merge(vec![with_results("a", &["r1"])], MergeMode::Append);
        cache.merge(vec![element("a"), element("c")], MergeMode::Append);

        assert_eq!(ids(&cache), vec!["a", "c"]);
        assert_eq!(cache.get("a").unwrap().results().len(), 1);
    }

    #[test]
    fn test_replace_discards_missing_elements() {
        let mut cache = ElementCache::new();
        cache.merge(vec![element("a"), element("b")], MergeMode::Append);
        cache.merge(vec![element("c"), element("a")], MergeMode::Replace);

        assert_eq!(ids(&cache), vec!["c", "a"]);
        assert!(cache.get("b").is_none());
        assert_eq!(cache.count(), 2);
    }

    #[test]
    fn test_replace_preserves_known_results() {
        let mut cache = ElementCache::new();
        cache.merge(vec![with_results("e", &["r1", "r2"])], MergeMode::Append);
        cache.merge(vec![element("e")], MergeMode::Replace);

        let kept = cache.get("e").unwrap();
        let results: Vec<_> = kept.results().iter().map(|r| r.itemid.as_str()).collect();
        assert_eq!(results, vec!["r1", "r2"]);
    }

    #[test]
    fn test_replace_takes_fresh_results_when_provided() {
        let mut cache = ElementCache::new();
        cache.merge(vec![with_results("e", &["r1"])], MergeMode::Append);
        cache.merge(vec![with_results("e", &["r9"])], MergeMode::Replace);

        assert_eq!(cache.get("e").unwrap().results()[0].itemid, "r9");
    }

    #[test]
    fn test_update_only_known_ids() {
        let mut cache = ElementCache::new();
        cache.merge(vec![element("a")], MergeMode::Append);

        assert!(cache.update(with_results("a", &["r1"])));
        assert!(!cache.update(element("zz")));
        assert_eq!(cache.count(), 1);
        assert_eq!(cache.get("a").unwrap().results().len(), 1);
    }

    #[test]
    fn test_find_result_across_elements() {
        let mut cache = ElementCache::new();
        cache.merge(
            vec![with_results("a", &["r1"]), with_results("b", &["r2", "r3"])],
            MergeMode::Append,
        );
        assert_eq!(cache.find_result("r3").unwrap().element_id, "b");
        assert!(cache.find_result("missing").is_none());
    }
}
