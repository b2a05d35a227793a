//! Messages exchanged with systems under test, as seen by message listeners.

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use uuid::Uuid;

use crate::value::Value;

/// Direction of a message relative to the test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

impl MessageDirection {
    /// Verb used when logging a message in this direction
    pub fn operation(&self) -> &'static str {
        match self {
            MessageDirection::Inbound => "Receive",
            MessageDirection::Outbound => "Send",
        }
    }
}

impl fmt::Display for MessageDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageDirection::Inbound => write!(f, "INBOUND"),
            MessageDirection::Outbound => write!(f, "OUTBOUND"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    id: Uuid,
    name: Option<String>,
    payload: Value,
    headers: IndexMap<String, Value>,
    timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(payload: impl Into<Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: None,
            payload: payload.into(),
            headers: IndexMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn header(&self, name: &str) -> Option<&Value> {
        self.headers.get(name)
    }

    pub fn headers(&self) -> &IndexMap<String, Value> {
        &self.headers
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MESSAGE [id: {}, payload: {}][headers: {}]",
            self.id,
            self.payload.to_string().trim(),
            Value::Map(self.headers.clone())
        )
    }
}
