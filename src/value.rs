//! # Dynamic values flowing through channels and effects.
//!
//! Effects resume routines with heterogeneous results (a taken message, a
//! selector's output, a forked task's handle, a race's keyed winner), so the
//! runtime speaks one closed dynamic type, [`Value`].
//!
//! Two variants are sentinels rather than data:
//! - [`Value::End`]: no more messages will ever arrive on a channel. Putting it closes the channel.
//! - [`Value::Cancelled`]: what a joiner receives when the joined task was cancelled.
//!
//! ## Example
//! ```rust
//! use sagavisor::{Message, Value};
//!
//! let v = Value::from(Message::new("INCREMENT").with_payload(3));
//! assert_eq!(v.tag(), Some("INCREMENT"));
//! assert_eq!(v.as_message().and_then(|m| m.payload.as_int()), Some(3));
//! assert!(Value::End.is_end());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::core::TaskHandle;

/// Tagged message: `{ tag, ...payload }`.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// Discriminating tag used by pattern matching.
    pub tag: Arc<str>,
    /// Arbitrary payload (`Unit` when absent).
    pub payload: Value,
}

impl Message {
    /// Creates a message with the given tag and no payload.
    pub fn new(tag: impl Into<Arc<str>>) -> Self {
        Self {
            tag: tag.into(),
            payload: Value::Unit,
        }
    }

    /// Attaches a payload.
    #[inline]
    pub fn with_payload(mut self, payload: impl Into<Value>) -> Self {
        self.payload = payload.into();
        self
    }
}

/// Dynamic value exchanged between routines, channels and the runtime.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Unit,
    Bool(bool),
    Int(i64),
    Str(Arc<str>),
    Message(Box<Message>),
    List(Vec<Value>),
    Map(BTreeMap<Arc<str>, Value>),
    /// Handle to a forked task.
    Task(TaskHandle),
    /// End-of-stream sentinel.
    End,
    /// Outcome of joining a cancelled task.
    Cancelled,
}

impl Value {
    /// Returns the message tag, if this value is a tagged message.
    pub fn tag(&self) -> Option<&str> {
        match self {
            Value::Message(m) => Some(&m.tag),
            _ => None,
        }
    }

    #[inline]
    pub fn is_end(&self) -> bool {
        matches!(self, Value::End)
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Value::Cancelled)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Value::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<Arc<str>, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_task(&self) -> Option<&TaskHandle> {
        match self {
            Value::Task(h) => Some(h),
            _ => None,
        }
    }

    /// Looks up `key` in a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit)
            | (Value::End, Value::End)
            | (Value::Cancelled, Value::Cancelled) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Message(a), Value::Message(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Task(a), Value::Task(b)) => a.id() == b.id(),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => f.write_str("()"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Message(m) if matches!(m.payload, Value::Unit) => {
                write!(f, "{{tag: {:?}}}", m.tag)
            }
            Value::Message(m) => write!(f, "{{tag: {:?}, payload: {:?}}}", m.tag, m.payload),
            Value::List(items) => f.debug_list().entries(items).finish(),
            Value::Map(map) => f.debug_map().entries(map).finish(),
            Value::Task(h) => write!(f, "Task#{}({})", h.id(), h.name()),
            Value::End => f.write_str("End"),
            Value::Cancelled => f.write_str("Cancelled"),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Unit
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl From<Message> for Value {
    fn from(m: Message) -> Self {
        Value::Message(Box::new(m))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<TaskHandle> for Value {
    fn from(h: TaskHandle) -> Self {
        Value::Task(h)
    }
}
