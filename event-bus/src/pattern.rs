//! Wildcard topic patterns for bulk unsubscription
//!
//! `*` matches zero or more characters. Every other character, including the
//! `.` namespace separator, matches itself.

use regex::Regex;

/// A compiled topic pattern
#[derive(Debug, Clone)]
pub struct TopicPattern {
    source: String,
    matcher: Matcher,
}

#[derive(Debug, Clone)]
enum Matcher {
    Everything,
    Exact,
    Wildcard(Regex),
}

impl TopicPattern {
    /// Compile a pattern
    pub fn new(pattern: &str) -> Self {
        let matcher = if pattern == "*" {
            Matcher::Everything
        } else if !pattern.contains('*') {
            Matcher::Exact
        } else {
            let body = pattern
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*");
            match Regex::new(&format!("^{}$", body)) {
                Ok(regex) => Matcher::Wildcard(regex),
                Err(e) => {
                    tracing::warn!("Topic pattern {:?} failed to compile ({}), matching literally", pattern, e);
                    Matcher::Exact
                }
            }
        };

        Self {
            source: pattern.to_string(),
            matcher,
        }
    }

    /// The pattern as written
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Check a topic name against the pattern
    pub fn matches(&self, topic: &str) -> bool {
        match &self.matcher {
            Matcher::Everything => true,
            Matcher::Exact => self.source == topic,
            Matcher::Wildcard(regex) => regex.is_match(topic),
        }
    }
}
