//! Event triggers and branch filter matching

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of event that can trigger a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Push,
    PullRequest,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Push => write!(f, "push"),
            EventKind::PullRequest => write!(f, "pull_request"),
        }
    }
}

impl FromStr for EventKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "push" => Ok(EventKind::Push),
            "pull_request" => Ok(EventKind::PullRequest),
            other => bail!("unknown event kind '{}' (expected 'push' or 'pull_request')", other),
        }
    }
}

/// An incoming event a workflow may react to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// What happened
    pub kind: EventKind,

    /// Git reference the event points at (`refs/heads/master` or plain `master`)
    pub ref_name: String,
}

impl TriggerEvent {
    pub fn new(kind: EventKind, ref_name: impl Into<String>) -> Self {
        Self {
            kind,
            ref_name: ref_name.into(),
        }
    }

    /// Branch name with any `refs/heads/` prefix stripped
    pub fn branch(&self) -> &str {
        self.ref_name
            .strip_prefix("refs/heads/")
            .unwrap_or(&self.ref_name)
    }
}

/// A branch filter glob compiled to an anchored regex (not serializable due to Regex)
#[derive(Debug, Clone)]
pub struct BranchPattern {
    pattern: String,
    regex: Regex,
}

impl BranchPattern {
    /// Compile a branch glob: `*` matches within one path segment, `**`
    /// crosses segments, `?` is a single non-slash character.
    pub fn compile(pattern: &str) -> Result<Self> {
        if pattern.trim().is_empty() {
            bail!("branch pattern cannot be empty");
        }
        let regex = Regex::new(&glob_to_regex(pattern))
            .with_context(|| format!("invalid branch pattern '{}'", pattern))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Check if the pattern matches the given branch name
    pub fn matches(&self, branch: &str) -> bool {
        self.regex.is_match(branch)
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut regex = String::from("^");
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    regex.push_str(".*");
                } else {
                    regex.push_str("[^/]*");
                }
            }
            '?' => regex.push_str("[^/]"),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');
    regex
}

/// Compiled trigger filters for a workflow
#[derive(Debug, Clone, Default)]
pub struct TriggerSet {
    /// Branch patterns for push events (None = pushes never trigger)
    pub push: Option<Vec<BranchPattern>>,

    /// Branch patterns for pull_request events
    pub pull_request: Option<Vec<BranchPattern>>,
}

impl TriggerSet {
    /// Check whether an event triggers the workflow.
    ///
    /// The event kind must be configured; an empty pattern list matches
    /// every branch. Matching is against the branch name, never the full ref.
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        let patterns = match event.kind {
            EventKind::Push => &self.push,
            EventKind::PullRequest => &self.pull_request,
        };
        match patterns {
            None => false,
            Some(patterns) if patterns.is_empty() => true,
            Some(patterns) => patterns.iter().any(|p| p.matches(event.branch())),
        }
    }

    /// Event kinds this workflow reacts to
    pub fn configured_events(&self) -> Vec<EventKind> {
        let mut events = Vec::new();
        if self.push.is_some() {
            events.push(EventKind::Push);
        }
        if self.pull_request.is_some() {
            events.push(EventKind::PullRequest);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_round_trip() {
        assert_eq!("push".parse::<EventKind>().unwrap(), EventKind::Push);
        assert_eq!(
            "pull_request".parse::<EventKind>().unwrap(),
            EventKind::PullRequest
        );
        assert!("release".parse::<EventKind>().is_err());
        assert_eq!(EventKind::PullRequest.to_string(), "pull_request");
    }

    #[test]
    fn test_branch_strips_ref_prefix() {
        let event = TriggerEvent::new(EventKind::Push, "refs/heads/master");
        assert_eq!(event.branch(), "master");

        let bare = TriggerEvent::new(EventKind::Push, "master");
        assert_eq!(bare.branch(), "master");
    }

    #[test]
    fn test_literal_pattern() {
        let pattern = BranchPattern::compile("master").unwrap();
        assert!(pattern.matches("master"));
        assert!(!pattern.matches("master-backup"));
        assert!(!pattern.matches("old-master"));
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        let pattern = BranchPattern::compile("3.*").unwrap();
        assert!(pattern.matches("3.x"));
        assert!(pattern.matches("3.11-fixes"));
        assert!(!pattern.matches("master"));
        assert!(!pattern.matches("3.x/backport"));
    }

    #[test]
    fn test_double_star_crosses_segments() {
        let pattern = BranchPattern::compile("release/**").unwrap();
        assert!(pattern.matches("release/3.9"));
        assert!(pattern.matches("release/3.9/hotfix"));
        assert!(!pattern.matches("feature/release"));
    }

    #[test]
    fn test_question_mark_single_char() {
        let pattern = BranchPattern::compile("v?").unwrap();
        assert!(pattern.matches("v1"));
        assert!(!pattern.matches("v12"));
        assert!(!pattern.matches("v/"));
    }

    #[test]
    fn test_empty_pattern_rejected() {
        assert!(BranchPattern::compile("").is_err());
        assert!(BranchPattern::compile("   ").is_err());
    }

    #[test]
    fn test_trigger_set_unconfigured_kind_never_matches() {
        let set = TriggerSet {
            push: Some(vec![BranchPattern::compile("master").unwrap()]),
            pull_request: None,
        };
        assert!(set.matches(&TriggerEvent::new(EventKind::Push, "refs/heads/master")));
        assert!(!set.matches(&TriggerEvent::new(
            EventKind::PullRequest,
            "refs/heads/master"
        )));
    }

    #[test]
    fn test_trigger_set_empty_patterns_match_any_branch() {
        let set = TriggerSet {
            push: Some(vec![]),
            pull_request: None,
        };
        assert!(set.matches(&TriggerEvent::new(EventKind::Push, "refs/heads/anything")));
    }

    #[test]
    fn test_trigger_set_requires_one_matching_pattern() {
        let set = TriggerSet {
            push: Some(vec![
                BranchPattern::compile("master").unwrap(),
                BranchPattern::compile("3.*").unwrap(),
            ]),
            pull_request: None,
        };
        assert!(set.matches(&TriggerEvent::new(EventKind::Push, "refs/heads/3.x")));
        assert!(set.matches(&TriggerEvent::new(EventKind::Push, "master")));
        assert!(!set.matches(&TriggerEvent::new(EventKind::Push, "refs/heads/develop")));
    }
}
