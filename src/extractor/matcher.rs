//! Declarative field matchers.

use regex::Regex;

use crate::error::MatcherError;

/// Post-match cleanup applied to a matched value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cleanup {
    /// Keep the match as is.
    None,
    /// Cut the match at the first NUL byte. Payloads are framed binary,
    /// so a greedy pattern can run into padding.
    TruncateAtNul,
    /// Drop one trailing occurrence of the given character.
    StripTrailing(char),
}

impl Cleanup {
    /// Apply the rule to a matched value.
    pub fn apply<'a>(&self, value: &'a str) -> &'a str {
        match self {
            Cleanup::None => value,
            Cleanup::TruncateAtNul => value.split('\0').next().unwrap_or(value),
            Cleanup::StripTrailing(c) => value.strip_suffix(*c).unwrap_or(value),
        }
    }
}

/// A signature string, an extraction pattern and a cleanup rule.
///
/// The pattern is only tried on payloads containing the signature. The
/// first capture group is the value when the pattern has one, otherwise
/// the whole match is used.
#[derive(Debug, Clone)]
pub struct FieldMatcher {
    name: String,
    signature: String,
    pattern: Regex,
    cleanup: Cleanup,
}

impl FieldMatcher {
    /// Build a matcher, compiling `pattern`.
    pub fn new(
        name: impl Into<String>,
        signature: impl Into<String>,
        pattern: &str,
        cleanup: Cleanup,
    ) -> Result<Self, MatcherError> {
        let name = name.into();
        let signature = signature.into();
        if signature.is_empty() {
            return Err(MatcherError::EmptySignature(name));
        }

        let pattern = Regex::new(pattern).map_err(|source| MatcherError::InvalidPattern {
            name: name.clone(),
            source,
        })?;

        Ok(Self {
            name,
            signature,
            pattern,
            cleanup,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn cleanup(&self) -> Cleanup {
        self.cleanup
    }

    /// Whether the payload carries this matcher's signature.
    pub fn is_triggered(&self, payload: &str) -> bool {
        payload.contains(self.signature.as_str())
    }

    /// Find the value in a payload.
    ///
    /// Returns `None` when the signature is absent, the pattern does not
    /// match, or cleanup leaves nothing.
    pub fn find(&self, payload: &str) -> Option<String> {
        if !self.is_triggered(payload) {
            return None;
        }

        let captures = self.pattern.captures(payload)?;
        let matched = captures.get(1).or_else(|| captures.get(0))?;
        let value = self.cleanup.apply(matched.as_str());

        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }
}
