use regex::Regex;

use crate::Error;

/// A list of regular expressions matched against complete reference names.
///
/// Each pattern is anchored at both ends, so `refs/heads/topic/.*` does not match
/// `refs/heads/topic-branch`, and `master` does not match `refs/heads/master`.
#[derive(Debug, Clone, Default)]
pub struct RefPatterns {
    patterns: Vec<(String, Regex)>,
}

impl RefPatterns {
    /// Compile `sources`, attributing failures to the configuration option `key`.
    pub fn new<I, S>(key: &str, sources: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = sources
            .into_iter()
            .map(|source| {
                let source = source.as_ref().trim();
                Regex::new(&format!("^(?:{source})$"))
                    .map(|re| (source.to_owned(), re))
                    .map_err(|err| Error::configuration(key, source, err))
            })
            .collect::<Result<_, _>>()?;
        Ok(RefPatterns { patterns })
    }

    /// True if any pattern matches `name` entirely.
    pub fn matches(&self, name: &str) -> bool {
        self.first_match(name).is_some()
    }

    /// The source of the first pattern matching `name` entirely.
    pub fn first_match(&self, name: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|(_, re)| re.is_match(name))
            .map(|(source, _)| source.as_str())
    }

    /// True if there are no patterns.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The patterns as configured.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|(source, _)| source.as_str())
    }
}

impl PartialEq for RefPatterns {
    fn eq(&self, other: &Self) -> bool {
        self.sources().eq(other.sources())
    }
}

impl Eq for RefPatterns {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patterns_match_whole_names() {
        let p = RefPatterns::new("hooks.x", ["refs/heads/topic/.+", "master"]).unwrap();
        assert!(p.matches("refs/heads/topic/foo"));
        assert!(!p.matches("refs/heads/topic-foo"));
        assert!(!p.matches("refs/heads/master"));
        assert!(p.matches("master"));
        assert_eq!(p.first_match("master"), Some("master"));
    }

    #[test]
    fn alternations_are_anchored_as_a_whole() {
        let p = RefPatterns::new("hooks.x", ["a|b"]).unwrap();
        assert!(p.matches("a"));
        assert!(!p.matches("ab"));
        assert!(!p.matches("xb"));
    }

    #[test]
    fn invalid_patterns_name_the_option() {
        let err = RefPatterns::new("hooks.frozen-ref", ["refs/heads/(unclosed"]).unwrap_err();
        assert!(err.to_string().contains("hooks.frozen-ref"));
        assert!(err.to_string().contains("refs/heads/(unclosed"));
    }
}
