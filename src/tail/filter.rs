//! Line-level include/exclude filtering.

use regex::Regex;

/// Decides which lines of a stream are delivered.
///
/// Excludes are checked first; a non-empty include list then requires a match.
#[derive(Clone, Debug, Default)]
pub struct LineFilter {
    exclude: Vec<Regex>,
    include: Vec<Regex>,
}

impl LineFilter {
    pub fn new(exclude: Vec<Regex>, include: Vec<Regex>) -> Self {
        Self { exclude, include }
    }

    /// Returns true if `line` should be delivered.
    pub fn accepts(&self, line: &str) -> bool {
        if self.exclude.iter().any(|re| re.is_match(line)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|re| re.is_match(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn re(p: &str) -> Regex {
        Regex::new(p).unwrap()
    }

    #[test]
    fn test_empty_filter_accepts_everything() {
        assert!(LineFilter::default().accepts("anything"));
    }

    #[test]
    fn test_debug_error_ordering() {
        let f = LineFilter::new(vec![re("DEBUG")], vec![re("ERROR")]);
        assert!(!f.accepts("DEBUG ERROR retrying"));
        assert!(f.accepts("ERROR disk full"));
        assert!(!f.accepts("INFO ready"));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let f = LineFilter::new(vec![re("healthz")], vec![re("GET")]);
        assert!(f.accepts("GET /cart"));
        assert!(!f.accepts("GET /healthz"));
        assert!(!f.accepts("POST /cart"));
    }
}
