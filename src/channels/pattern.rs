//! # Take patterns.
//!
//! A [`Pattern`] describes which messages a pending consumer accepts:
//!
//! | Pattern | Matches |
//! |---|---|
//! | `"*"` / [`Pattern::Wildcard`] | everything |
//! | `"TAG"` / [`Pattern::Tag`] | messages whose tag equals `TAG` |
//! | `["A", "B"]` / [`Pattern::Tags`] | messages whose tag is one of the list |
//! | [`Pattern::predicate`] | whatever the predicate accepts |
//!
//! Untagged values (plain ints, strings…) only match the wildcard or a predicate.
//!
//! ```rust
//! use sagavisor::{Message, Pattern, Value};
//!
//! let action = Value::from(Message::new("action-2"));
//! assert!(Pattern::from("*").matches(&action));
//! assert!(Pattern::from(["action-2", "action-2222"]).matches(&action));
//! assert!(!Pattern::from("action-1").matches(&action));
//! assert!(Pattern::predicate(|v| v.tag().is_some()).matches(&action));
//! ```

use std::fmt;
use std::sync::Arc;

use crate::value::Value;

/// Boolean test derived from a [`Pattern`].
pub type Matcher = Box<dyn Fn(&Value) -> bool + Send + Sync>;

/// Consumer-side message filter.
#[derive(Clone)]
pub enum Pattern {
    /// Matches every message.
    Wildcard,
    /// Exact tag match.
    Tag(Arc<str>),
    /// Tag is one of the listed tags.
    Tags(Vec<Arc<str>>),
    /// Custom predicate.
    Predicate(Arc<dyn Fn(&Value) -> bool + Send + Sync>),
}

impl Pattern {
    /// Wraps a predicate.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Pattern::Predicate(Arc::new(f))
    }

    /// Returns `true` if `input` satisfies this pattern.
    pub fn matches(&self, input: &Value) -> bool {
        match self {
            Pattern::Wildcard => true,
            Pattern::Tag(tag) => input.tag() == Some(tag.as_ref()),
            Pattern::Tags(tags) => input
                .tag()
                .is_some_and(|t| tags.iter().any(|p| p.as_ref() == t)),
            Pattern::Predicate(f) => f(input),
        }
    }

    /// Turns the pattern into an owned boolean test.
    pub fn matcher(&self) -> Matcher {
        let pattern = self.clone();
        Box::new(move |input| pattern.matches(input))
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Pattern::Wildcard
    }
}

impl From<&str> for Pattern {
    fn from(s: &str) -> Self {
        if s == "*" {
            Pattern::Wildcard
        } else {
            Pattern::Tag(s.into())
        }
    }
}

impl From<String> for Pattern {
    fn from(s: String) -> Self {
        Pattern::from(s.as_str())
    }
}

impl<const N: usize> From<[&str; N]> for Pattern {
    fn from(tags: [&str; N]) -> Self {
        Pattern::Tags(tags.iter().map(|t| Arc::from(*t)).collect())
    }
}

impl From<Vec<&str>> for Pattern {
    fn from(tags: Vec<&str>) -> Self {
        Pattern::Tags(tags.into_iter().map(Arc::from).collect())
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Wildcard => f.write_str("*"),
            Pattern::Tag(t) => write!(f, "{t:?}"),
            Pattern::Tags(ts) => f.debug_list().entries(ts).finish(),
            Pattern::Predicate(_) => f.write_str("<predicate>"),
        }
    }
}
