//! Pooled trace record kinds
//!
//! Records are plain data carriers filled by instrumentation and cleared by
//! [`Recyclable::reset_state`] before reuse. Names and attribute keys use
//! `Cow<'static, str>` so the common case of static operation names does not
//! allocate.

use crate::object_pool::Recyclable;
use std::borrow::Cow;

/// Outcome of a transaction or span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Outcome {
    #[default]
    Unknown,
    Success,
    Failure,
}

/// Root unit of work of a trace
#[derive(Debug, Clone, Default)]
pub struct TransactionRecord {
    pub trace_id: [u8; 16],
    pub id: [u8; 8],
    pub parent_id: Option<[u8; 8]>,
    pub name: Cow<'static, str>,
    pub transaction_type: Cow<'static, str>,
    pub timestamp_nanos: u64,
    pub duration_nanos: u64,
    pub outcome: Outcome,
    pub started_spans: u32,
    pub dropped_spans: u32,
    pub labels: Vec<(Cow<'static, str>, String)>,
}

impl TransactionRecord {
    pub fn set_name_static(&mut self, name: &'static str) {
        self.name = Cow::Borrowed(name);
    }

    pub fn set_name_owned(&mut self, name: String) {
        self.name = Cow::Owned(name);
    }

    pub fn add_label(&mut self, key: &'static str, value: String) {
        self.labels.push((Cow::Borrowed(key), value));
    }
}

impl Recyclable for TransactionRecord {
    fn reset_state(&mut self) {
        self.trace_id = [0; 16];
        self.id = [0; 8];
        self.parent_id = None;
        self.name = Cow::Borrowed("");
        self.transaction_type = Cow::Borrowed("");
        self.timestamp_nanos = 0;
        self.duration_nanos = 0;
        self.outcome = Outcome::Unknown;
        self.started_spans = 0;
        self.dropped_spans = 0;
        // Keep the allocation, drop the contents
        self.labels.clear();
    }
}

/// Timed operation within a transaction
#[derive(Debug, Clone, Default)]
pub struct SpanRecord {
    pub trace_id: [u8; 16],
    pub id: [u8; 8],
    pub parent_id: [u8; 8],
    /// Operation name, often static (e.g. "db:query", "http:request")
    pub name: Cow<'static, str>,
    pub attributes: Vec<(Cow<'static, str>, String)>,
    pub timestamp_nanos: u64,
    pub duration_nanos: u64,
    pub outcome: Outcome,
    pub links: Vec<SpanLinkRecord>,
}

impl SpanRecord {
    /// Set span name from static string (zero-copy)
    pub fn set_name_static(&mut self, name: &'static str) {
        self.name = Cow::Borrowed(name);
    }

    /// Set span name from owned string
    pub fn set_name_owned(&mut self, name: String) {
        self.name = Cow::Owned(name);
    }

    /// Add attribute with static key (zero-copy for key)
    pub fn add_attribute_static(&mut self, key: &'static str, value: String) {
        self.attributes.push((Cow::Borrowed(key), value));
    }

    /// Add attribute with owned key
    pub fn add_attribute_owned(&mut self, key: String, value: String) {
        self.attributes.push((Cow::Owned(key), value));
    }
}

impl Recyclable for SpanRecord {
    fn reset_state(&mut self) {
        self.trace_id = [0; 16];
        self.id = [0; 8];
        self.parent_id = [0; 8];
        self.name = Cow::Borrowed("");
        self.attributes.clear();
        self.timestamp_nanos = 0;
        self.duration_nanos = 0;
        self.outcome = Outcome::Unknown;
        self.links.clear();
    }
}

/// Captured error or exception
#[derive(Debug, Clone, Default)]
pub struct ErrorRecord {
    pub id: [u8; 16],
    pub trace_id: [u8; 16],
    pub transaction_id: Option<[u8; 8]>,
    pub parent_id: Option<[u8; 8]>,
    pub exception_type: Cow<'static, str>,
    pub message: String,
    pub culprit: String,
    pub timestamp_nanos: u64,
    pub handled: bool,
}

impl Recyclable for ErrorRecord {
    fn reset_state(&mut self) {
        self.id = [0; 16];
        self.trace_id = [0; 16];
        self.transaction_id = None;
        self.parent_id = None;
        self.exception_type = Cow::Borrowed("");
        self.message.clear();
        self.culprit.clear();
        self.timestamp_nanos = 0;
        self.handled = false;
    }
}

/// Link from a span to a context in another trace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanLinkRecord {
    pub trace_id: [u8; 16],
    pub parent_id: [u8; 8],
    pub flags: u8,
}

impl SpanLinkRecord {
    pub fn is_sampled(&self) -> bool {
        self.flags & 0x01 == 0x01
    }
}

impl Recyclable for SpanLinkRecord {
    fn reset_state(&mut self) {
        self.trace_id = [0; 16];
        self.parent_id = [0; 8];
        self.flags = 0;
    }
}

/// Identifier correlating a span with a profiler stack trace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StackTraceId([u8; 16]);

impl StackTraceId {
    pub fn set(&mut self, bytes: [u8; 16]) {
        self.0 = bytes;
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0; 16]
    }
}

impl Recyclable for StackTraceId {
    fn reset_state(&mut self) {
        self.0 = [0; 16];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_reset_keeps_no_state() {
        let mut span = SpanRecord::default();
        span.set_name_owned("db:query".to_string());
        span.add_attribute_static("db.system", "postgresql".to_string());
        span.trace_id = [7; 16];
        span.duration_nanos = 1_500;
        span.outcome = Outcome::Failure;
        span.links.push(SpanLinkRecord {
            trace_id: [1; 16],
            parent_id: [2; 8],
            flags: 1,
        });

        span.reset_state();

        assert_eq!(span.name.as_ref(), "");
        assert!(span.attributes.is_empty());
        assert!(span.links.is_empty());
        assert_eq!(span.trace_id, [0; 16]);
        assert_eq!(span.duration_nanos, 0);
        assert_eq!(span.outcome, Outcome::Unknown);
    }

    #[test]
    fn test_zero_copy_static_strings() {
        let mut span = SpanRecord::default();
        span.set_name_static("http:request");
        span.add_attribute_static("http.method", "GET".to_string());
        assert!(matches!(span.name, Cow::Borrowed(_)));
        assert!(matches!(span.attributes[0].0, Cow::Borrowed(_)));

        span.add_attribute_owned("http.route".to_string(), "/users".to_string());
        assert!(matches!(span.attributes[1].0, Cow::Owned(_)));
    }

    #[test]
    fn test_transaction_reset_retains_label_capacity() {
        let mut tx = TransactionRecord::default();
        tx.set_name_static("GET /users");
        for i in 0..8 {
            tx.add_label("tenant", i.to_string());
        }
        let capacity = tx.labels.capacity();

        tx.reset_state();
        assert!(tx.labels.is_empty());
        assert_eq!(tx.labels.capacity(), capacity);
        assert_eq!(tx.name.as_ref(), "");
    }

    #[test]
    fn test_error_reset() {
        let mut error = ErrorRecord {
            exception_type: Cow::Borrowed("IoError"),
            message: "connection reset".to_string(),
            handled: true,
            transaction_id: Some([3; 8]),
            ..Default::default()
        };
        error.reset_state();
        assert!(error.message.is_empty());
        assert!(!error.handled);
        assert!(error.transaction_id.is_none());
    }

    #[test]
    fn test_span_link_flags() {
        let mut link = SpanLinkRecord {
            flags: 0x01,
            ..Default::default()
        };
        assert!(link.is_sampled());
        link.reset_state();
        assert!(!link.is_sampled());
    }

    #[test]
    fn test_stack_trace_id() {
        let mut id = StackTraceId::default();
        assert!(id.is_empty());
        id.set([9; 16]);
        assert_eq!(id.as_bytes(), &[9; 16]);
        id.reset_state();
        assert!(id.is_empty());
    }
}
