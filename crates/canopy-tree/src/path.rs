//! Ancestry path codec.
//!
//! An ancestry path is the `/`-delimited chain of ancestor codes from the
//! root down to, but excluding, a node. The root's path is the empty string.
//!
//! ```text
//! root            ""
//! child of root   "0000000001"
//! grandchild      "0000000001/0000000002"
//! ```
//!
//! Every function here is pure; stores evaluate [`PathPattern`] against the
//! paths they hold.

/// Segment separator.
pub const SEPARATOR: char = '/';

/// Extend `path` with one more ancestor code.
pub fn append_segment(path: &str, code: &str) -> String {
    if path.is_empty() {
        code.to_string()
    } else {
        let mut out = String::with_capacity(path.len() + 1 + code.len());
        out.push_str(path);
        out.push(SEPARATOR);
        out.push_str(code);
        out
    }
}

/// The final segment of a path: the structural parent's code.
pub fn last_segment(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    path.rsplit(SEPARATOR).next()
}

/// The first segment of a path: the root's code.
pub fn first_segment(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    path.split(SEPARATOR).next()
}

/// Iterate the segments of a path, root first. The empty path has none.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty())
}

/// Number of ancestors encoded in a path.
pub fn depth(path: &str) -> usize {
    segments(path).count()
}

/// Build the pattern selecting the descendants of `code`.
///
/// A node matches when `code` appears as a segment of its path and at most
/// `max_extra` further segments follow it. `None` means no bound.
pub fn descendant_pattern(code: &str, max_extra: Option<usize>) -> PathPattern {
    PathPattern {
        anchor: code.to_string(),
        max_extra,
    }
}

/// A depth-bounded descendant match over ancestry paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    anchor: String,
    max_extra: Option<usize>,
}

impl PathPattern {
    /// The ancestor code every match must contain.
    pub fn anchor(&self) -> &str {
        &self.anchor
    }

    /// Maximum number of segments allowed after the anchor.
    pub fn max_extra(&self) -> Option<usize> {
        self.max_extra
    }

    /// Test an ancestry path against the pattern.
    pub fn matches(&self, path: &str) -> bool {
        let mut after_anchor: Option<usize> = None;
        for segment in segments(path) {
            match after_anchor.as_mut() {
                Some(n) => *n += 1,
                None if segment == self.anchor => after_anchor = Some(0),
                None => {}
            }
        }

        match (after_anchor, self.max_extra) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(n), Some(max)) => n <= max,
        }
    }
}

impl std::fmt::Display for PathPattern {
    /// Renders the equivalent regular expression, for logs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.max_extra {
            Some(max) => write!(f, "{}(/[^/]+){{0,{}}}$", self.anchor, max),
            None => write!(f, "{}(/[^/]+)*$", self.anchor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn append_to_empty_path() {
        assert_eq!(append_segment("", "0000000001"), "0000000001");
    }

    #[test]
    fn append_to_existing_path() {
        assert_eq!(
            append_segment("0000000001/0000000002", "0000000004"),
            "0000000001/0000000002/0000000004"
        );
    }

    #[test]
    fn last_and_first_segment() {
        assert_eq!(last_segment(""), None);
        assert_eq!(first_segment(""), None);
        assert_eq!(last_segment("0000000001"), Some("0000000001"));
        assert_eq!(last_segment("0000000001/0000000003"), Some("0000000003"));
        assert_eq!(first_segment("0000000001/0000000003"), Some("0000000001"));
    }

    #[test]
    fn depth_counts_segments() {
        assert_eq!(depth(""), 0);
        assert_eq!(depth("a"), 1);
        assert_eq!(depth("a/b/c"), 3);
    }

    #[test]
    fn bounded_pattern() {
        let p = descendant_pattern("b", Some(1));
        assert!(p.matches("a/b"));
        assert!(p.matches("a/b/c"));
        assert!(!p.matches("a/b/c/d"));
        assert!(!p.matches("a"));
        assert!(!p.matches(""));
    }

    #[test]
    fn zero_extra_selects_children_only() {
        let p = descendant_pattern("a", Some(0));
        assert!(p.matches("a"));
        assert!(!p.matches("a/b"));
    }

    #[test]
    fn unbounded_pattern() {
        let p = descendant_pattern("a", None);
        assert!(p.matches("a"));
        assert!(p.matches("a/b/c/d/e/f"));
        assert!(!p.matches("b/c"));
    }

    #[test]
    fn anchor_never_matches_inside_a_segment() {
        let p = descendant_pattern("1", None);
        assert!(!p.matches("11/21"));
        assert!(p.matches("11/1"));
    }

    #[test]
    fn display_renders_regex() {
        assert_eq!(
            descendant_pattern("0001", Some(2)).to_string(),
            "0001(/[^/]+){0,2}$"
        );
    }

    fn arb_path() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[0-9]{4}", 0..8)
    }

    proptest! {
        #[test]
        fn appended_code_is_last_segment(segs in arb_path(), code in "[0-9]{4}") {
            let path = segs.join("/");
            let extended = append_segment(&path, &code);
            prop_assert_eq!(last_segment(&extended), Some(code.as_str()));
            prop_assert_eq!(depth(&extended), segs.len() + 1);
        }

        #[test]
        fn raising_the_bound_never_drops_matches(
            segs in arb_path(),
            anchor in "[0-9]{4}",
            bound in 0usize..6,
        ) {
            let path = segs.join("/");
            if descendant_pattern(&anchor, Some(bound)).matches(&path) {
                prop_assert!(descendant_pattern(&anchor, Some(bound + 1)).matches(&path));
                prop_assert!(descendant_pattern(&anchor, None).matches(&path));
            }
        }
    }
}
