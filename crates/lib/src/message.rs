//! Inbound push message: delivered by the transport and read (never mutated) by every routing step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scheme used for the intent-like URI rendering of a message.
const URI_SCHEME: &str = "push";

/// A push message as received from the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// Transport-assigned message id, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Sender id or topic (e.g. "/topics/news").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapse_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    /// Key/value payload. Sorted so the URI rendering is stable.
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl InboundMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style helper for adding a data entry.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    /// Raw intent-like representation: `push:#Intent;S.<key>=<value>;...;end`.
    /// Extras are percent-encoded so separators inside values survive.
    pub fn to_uri(&self) -> String {
        let mut uri = format!("{}:#Intent;", URI_SCHEME);
        if let Some(id) = &self.message_id {
            uri.push_str(&format!("S.message_id={};", encode(id)));
        }
        if let Some(from) = &self.from {
            uri.push_str(&format!("S.from={};", encode(from)));
        }
        if let Some(key) = &self.collapse_key {
            uri.push_str(&format!("S.collapse_key={};", encode(key)));
        }
        if let Some(sent) = &self.sent_at {
            uri.push_str(&format!("l.sent_at={};", sent.timestamp_millis()));
        }
        for (k, v) in &self.data {
            uri.push_str(&format!("S.{}={};", encode(k), encode(v)));
        }
        uri.push_str("end");
        uri
    }
}

fn encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_lists_extras_in_key_order() {
        let msg = InboundMessage::new()
            .with_message_id("m1")
            .with_data("title", "Hello")
            .with_data("body", "a;b=c");
        assert_eq!(
            msg.to_uri(),
            "push:#Intent;S.message_id=m1;S.body=a%3Bb%3Dc;S.title=Hello;end"
        );
    }

    #[test]
    fn empty_message_uri() {
        assert_eq!(InboundMessage::new().to_uri(), "push:#Intent;end");
    }

    #[test]
    fn parses_camel_case_json() {
        let msg: InboundMessage = serde_json::from_str(
            r#"{"messageId":"42","from":"/topics/news","data":{"title":"Hi"}}"#,
        )
        .unwrap();
        assert_eq!(msg.message_id.as_deref(), Some("42"));
        assert_eq!(msg.get("title"), Some("Hi"));
        assert!(msg.collapse_key.is_none());
    }
}
