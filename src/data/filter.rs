//! Keyword filtering of the element view
//!
//! A filter list is a conjunction: an element is shown only if it satisfies
//! every `DataFilter`. Inside one filter the keywords are combined according
//! to its `MatchType`.

use serde::{Deserialize, Serialize};

use crate::model::Element;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    /// Every keyword must be found
    MatchAll,
    /// At least one keyword must be found
    MatchAny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFilter {
    keywords: Vec<String>,
    match_type: MatchType,
}

impl DataFilter {
    /// Keywords are lowercased and deduplicated, first occurrence wins.
    pub fn new<I, S>(keywords: I, match_type: MatchType) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for keyword in keywords {
            let keyword = keyword.as_ref().trim().to_lowercase();
            if !keyword.is_empty() && !unique.contains(&keyword) {
                unique.push(keyword);
            }
        }
        Self { keywords: unique, match_type }
    }

    /// Whitespace-separated tokens of `text`
    pub fn from_text(text: &str, match_type: MatchType) -> Self {
        Self::new(text.split_whitespace(), match_type)
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn match_type(&self) -> MatchType {
        self.match_type
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// An empty keyword list matches everything in both modes.
    pub fn matches(&self, element: &Element) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        match self.match_type {
            MatchType::MatchAll => self.keywords.iter().all(|k| element.matches_keyword(k)),
            MatchType::MatchAny => self.keywords.iter().any(|k| element.matches_keyword(k)),
        }
    }
}

/// The subsequence of `elements` passing every filter, order preserved.
pub fn apply_filters(elements: &[Element], filters: &[DataFilter]) -> Vec<Element> {
    elements
        .iter()
        .filter(|e| filters.iter().all(|f| f.matches(e)))
        .cloned()
        .collect()
}

/// Builds the filter list for the element list screen.
pub struct FilterBuilder;

impl FilterBuilder {
    /// `base` (e.g. ids of failing elements to highlight) is matched with
    /// `MatchAny`; the search box text is matched with `MatchAll`. Both
    /// must pass. Empty inputs add no entry.
    pub fn build_with_base_filter(base: Option<&str>, search: &str) -> Vec<DataFilter> {
        let base = base.map(|b| DataFilter::from_text(b, MatchType::MatchAny));
        let search = DataFilter::from_text(search, MatchType::MatchAll);

        base.into_iter()
            .chain(std::iter::once(search))
            .filter(|f| !f.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alpha_beta() -> Element {
        Element::new("id-1", "alpha", "beta", "")
    }

    #[test]
    fn test_match_all_truth_table() {
        let e = alpha_beta();
        assert!(DataFilter::new(["al"], MatchType::MatchAll).matches(&e));
        assert!(!DataFilter::new(["al", "zz"], MatchType::MatchAll).matches(&e));
        assert!(DataFilter::new(["al", "zz"], MatchType::MatchAny).matches(&e));
        assert!(!DataFilter::new(["zz"], MatchType::MatchAny).matches(&e));
    }

    #[test]
    fn test_case_insensitive_over_all_fields() {
        let e = Element::new("ID-7", "Edge", "tcp://10.1.1.1", "A10HTTPRESTv2")
            .with_types(["TPM2.0", "Router"])
            .with_description("Rack FOUR");

        for kw in ["id-7", "EDGE", "10.1.1", "resTv2", "tpm2", "router", "four"] {
            assert!(DataFilter::new([kw], MatchType::MatchAll).matches(&e), "{kw}");
        }
    }

    #[test]
    fn test_empty_keywords_match_everything() {
        let e = alpha_beta();
        assert!(DataFilter::new(Vec::<String>::new(), MatchType::MatchAll).matches(&e));
        assert!(DataFilter::new(["  "], MatchType::MatchAny).matches(&e));
    }

    #[test]
    fn test_keywords_normalized() {
        let f = DataFilter::from_text("  Foo bar FOO  ", MatchType::MatchAll);
        assert_eq!(f.keywords(), ["foo", "bar"]);
    }

    #[test]
    fn test_filters_compose_as_and() {
        let elements = vec![
            Element::new("a", "alpha", "x", "p"),
            Element::new("b", "beta", "x", "p"),
            Element::new("c", "alpha beta", "x", "p"),
        ];
        let filters = vec![
            DataFilter::new(["alpha"], MatchType::MatchAll),
            DataFilter::new(["beta"], MatchType::MatchAll),
        ];
        let shown: Vec<_> =
            apply_filters(&elements, &filters).into_iter().map(|e| e.itemid).collect();
        assert_eq!(shown, vec!["c"]);

        assert_eq!(apply_filters(&elements, &[]).len(), 3);
    }

    #[test]
    fn test_builder_combines_base_and_search() {
        let elements = vec![
            Element::new("e1", "router", "x", "p"),
            Element::new("e2", "switch", "x", "p"),
            Element::new("e3", "router", "x", "p"),
        ];
        let filters = FilterBuilder::build_with_base_filter(Some("e1 e2"), "router");
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].match_type(), MatchType::MatchAny);
        assert_eq!(filters[1].match_type(), MatchType::MatchAll);

        let shown: Vec<_> =
            apply_filters(&elements, &filters).into_iter().map(|e| e.itemid).collect();
        assert_eq!(shown, vec!["e1"]);
    }

    #[test]
    fn test_builder_skips_empty_inputs() {
        assert!(FilterBuilder::build_with_base_filter(None, "   ").is_empty());
        assert_eq!(FilterBuilder::build_with_base_filter(Some(""), "x").len(), 1);
    }
}
