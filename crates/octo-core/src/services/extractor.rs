use std::sync::LazyLock;

use regex::Regex;

use crate::error::{OrchestratorError, Result};
use crate::models::config::DEFAULT_LISTENING_PATTERN;

static LISTENING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DEFAULT_LISTENING_PATTERN).unwrap());

/// Pulls a single captured value out of log lines.
#[derive(Debug, Clone)]
pub struct AddressExtractor {
    pattern: Regex,
}

impl AddressExtractor {
    /// Build from a pattern that must contain exactly one capture group.
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| OrchestratorError::InvalidConfig(format!("listening pattern: {e}")))?;
        Self::from_regex(regex)
    }

    fn from_regex(pattern: Regex) -> Result<Self> {
        // captures_len counts the implicit whole-match group.
        let groups = pattern.captures_len() - 1;
        if groups != 1 {
            return Err(OrchestratorError::InvalidConfig(format!(
                "listening pattern must have exactly one capture group, found {groups}"
            )));
        }
        Ok(Self { pattern })
    }

    /// Extractor for the backend's "Listening on <addr> (version ...)" line.
    pub fn listening() -> Self {
        Self {
            pattern: LISTENING_RE.clone(),
        }
    }

    /// Captured value of the first match, if any.
    pub fn extract<'a>(&self, line: &'a str) -> Option<&'a str> {
        self.matches(line).next()
    }

    /// Captured values of every non-overlapping match, left to right.
    pub fn matches<'a, 'r>(&'r self, line: &'a str) -> impl Iterator<Item = &'a str> + 'r
    where
        'a: 'r,
    {
        self.pattern
            .captures_iter(line)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
    }

    /// Feed every captured value to `sink`, stopping at its first error.
    pub fn scan<E, F>(&self, line: &str, mut sink: F) -> std::result::Result<(), E>
    where
        F: FnMut(&str) -> std::result::Result<(), E>,
    {
        for captured in self.matches(line) {
            sink(captured)?;
        }
        Ok(())
    }
}
