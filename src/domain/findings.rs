//! Raw detector output
//!
//! Both the pattern library and the structural scanner report what they found
//! as [`Findings`]: byte offsets into the document paired with the offending
//! fragment. The count and boolean views used by callers are derived from it.

use serde::{Deserialize, Serialize};

/// One offending fragment of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Byte offset of the fragment in the document
    pub offset: usize,
    /// The offending substring
    pub fragment: String,
}

impl Finding {
    pub fn new(offset: usize, fragment: impl Into<String>) -> Self {
        Self { offset, fragment: fragment.into() }
    }
}

/// Ordered list of findings from one detector run over one document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Findings(Vec<Finding>);

impl Findings {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, finding: Finding) {
        self.0.push(finding);
    }

    /// Number of violations found
    pub fn count(&self) -> usize {
        self.0.len()
    }

    /// Whether at least one violation was found
    pub fn any(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The offending fragments, in document order
    pub fn fragments(&self) -> Vec<&str> {
        self.0.iter().map(|f| f.fragment.as_str()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Finding> {
        self.0.iter()
    }
}

impl FromIterator<Finding> for Findings {
    fn from_iter<I: IntoIterator<Item = Finding>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Findings {
    type Item = Finding;
    type IntoIter = std::vec::IntoIter<Finding>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Findings {
    type Item = &'a Finding;
    type IntoIter = std::slice::Iter<'a, Finding>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_and_boolean_views_agree() {
        let empty = Findings::new();
        assert_eq!(empty.count(), 0);
        assert!(!empty.any());

        let findings: Findings =
            vec![Finding::new(3, "<div>"), Finding::new(40, "<table>")].into_iter().collect();
        assert_eq!(findings.count(), 2);
        assert!(findings.any());
        assert_eq!(findings.fragments(), vec!["<div>", "<table>"]);
    }
}
