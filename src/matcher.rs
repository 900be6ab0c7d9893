use crate::condition::{SearchCondition, SearchMode};
use crate::errors::Result;
use regex::Regex;

/// Outcome of testing one textual value against the search condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// `true` if the value contains the search word.
    pub matched: bool,
    /// The value to write back, or `None` when no replacement applies.
    pub output: Option<String>,
}

impl MatchResult {
    fn miss() -> Self {
        Self {
            matched: false,
            output: None,
        }
    }
}

/// Decides matches and computes replacement values.
///
/// The search word plays two roles. Match detection is always a literal
/// substring test, in both modes. In FUZZY mode with a replacement word the
/// same search word is also compiled as a regular expression, and every regex
/// match is substituted. A search word such as `a.c` therefore only *matches*
/// values containing the literal text `a.c`, but once matched, the `.` is a
/// wildcard during substitution. Callers wanting literal substitution must
/// escape the word themselves.
pub struct Matcher {
    search_word: String,
    mode: SearchMode,
    replace_word: Option<String>,
    pattern: Option<Regex>,
}

impl Matcher {
    /// Creates a matcher for `condition`.
    ///
    /// The regex is compiled up front, so an invalid FUZZY pattern fails here
    /// rather than once per document.
    pub fn new(condition: &SearchCondition) -> Result<Self> {
        let pattern = match (condition.mode(), condition.replace_word()) {
            (SearchMode::Fuzzy, Some(_)) => Some(Regex::new(condition.search_word())?),
            _ => None,
        };

        Ok(Self {
            search_word: condition.search_word().to_string(),
            mode: condition.mode(),
            replace_word: condition.replace_word().map(str::to_string),
            pattern,
        })
    }

    /// Tests `value` and, when configured, computes its replacement.
    pub fn match_value(&self, value: &str) -> MatchResult {
        if !value.contains(&self.search_word) {
            return MatchResult::miss();
        }

        let output = match (&self.replace_word, self.mode) {
            (None, _) => None,
            (Some(replacement), SearchMode::Strict) => Some(replacement.clone()),
            (Some(replacement), SearchMode::Fuzzy) => self
                .pattern
                .as_ref()
                .map(|re| re.replace_all(value, replacement.as_str()).into_owned()),
        };

        MatchResult {
            matched: true,
            output,
        }
    }
}
