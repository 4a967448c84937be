use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::field::{Field, Visit};
use tracing::span;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// A warn-or-error event kept in memory.
#[derive(Clone, Debug, Serialize)]
pub struct LogRecord {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub fields: serde_json::Map<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:<5} {}: {}",
            self.timestamp.format("%H:%M:%S"),
            self.level,
            self.target,
            self.message
        )?;
        if let Some(thread) = &self.thread_id {
            write!(f, " thread={thread}")?;
        }
        if let Some(run) = &self.run_id {
            write!(f, " run={run}")?;
        }
        for (key, value) in &self.fields {
            match value {
                serde_json::Value::String(s) => write!(f, " {key}={s}")?,
                other => write!(f, " {key}={other}")?,
            }
        }
        Ok(())
    }
}

/// Query parameters for searching buffered logs.
#[derive(Clone, Debug, Default)]
pub struct LogQuery {
    pub level: Option<String>,
    pub target: Option<String>,
    pub thread_id: Option<String>,
    pub limit: Option<usize>,
}

/// Bounded ring of recent warn+ records. Oldest records are evicted first.
pub struct LogBuffer {
    capacity: usize,
    inner: Mutex<BufferState>,
}

struct BufferState {
    records: VecDeque<LogRecord>,
    next_seq: u64,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(BufferState {
                records: VecDeque::with_capacity(capacity),
                next_seq: 1,
            }),
        }
    }

    fn push(&self, mut record: LogRecord) {
        let mut state = self.inner.lock();
        record.seq = state.next_seq;
        state.next_seq += 1;
        if state.records.len() == self.capacity {
            let _ = state.records.pop_front();
        }
        state.records.push_back(record);
    }

    /// Matching records, most recent first.
    pub fn query(&self, q: &LogQuery) -> Vec<LogRecord> {
        let state = self.inner.lock();
        state
            .records
            .iter()
            .rev()
            .filter(|r| q.level.as_ref().map_or(true, |l| r.level.eq_ignore_ascii_case(l)))
            .filter(|r| q.target.as_ref().map_or(true, |t| r.target.contains(t.as_str())))
            .filter(|r| q.thread_id.is_none() || r.thread_id == q.thread_id)
            .take(q.limit.unwrap_or(100))
            .cloned()
            .collect()
    }

    /// The last `limit` records in the order they were logged.
    pub fn recent(&self, limit: usize) -> Vec<LogRecord> {
        let state = self.inner.lock();
        let skip = state.records.len().saturating_sub(limit);
        state.records.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// tracing Layer that copies warn+ events into a [`LogBuffer`].
pub struct LogBufferLayer {
    buffer: Arc<LogBuffer>,
}

impl LogBufferLayer {
    pub fn new(buffer: Arc<LogBuffer>) -> Self {
        Self { buffer }
    }
}

/// Visitor that extracts fields from a tracing event or span.
#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: serde_json::Map<String, serde_json::Value>,
    thread_id: Option<String>,
    run_id: Option<String>,
}

impl FieldVisitor {
    fn record_text(&mut self, name: &str, value: String) {
        match name {
            "message" => self.message = Some(value),
            "thread_id" => self.thread_id = Some(value),
            "run_id" => self.run_id = Some(value),
            name => {
                self.fields
                    .insert(name.to_string(), serde_json::Value::String(value));
            }
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let val = format!("{value:?}");
        let val = match field.name() {
            "message" => val,
            _ => val.trim_matches('"').to_string(),
        };
        self.record_text(field.name(), val);
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_text(field.name(), value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Number(value.into()));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(n) = serde_json::Number::from_f64(value) {
            self.fields
                .insert(field.name().to_string(), serde_json::Value::Number(n));
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Bool(value));
    }
}

/// Stored on spans to propagate thread_id / run_id to child events.
struct SpanFields {
    thread_id: Option<String>,
    run_id: Option<String>,
}

impl<S> Layer<S> for LogBufferLayer
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > tracing::Level::WARN {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        if visitor.thread_id.is_none() || visitor.run_id.is_none() {
            if let Some(scope) = ctx.event_scope(event) {
                for span in scope {
                    let extensions = span.extensions();
                    if let Some(fields) = extensions.get::<SpanFields>() {
                        if visitor.thread_id.is_none() {
                            visitor.thread_id.clone_from(&fields.thread_id);
                        }
                        if visitor.run_id.is_none() {
                            visitor.run_id.clone_from(&fields.run_id);
                        }
                    }
                }
            }
        }

        self.buffer.push(LogRecord {
            seq: 0,
            timestamp: Utc::now(),
            level: level.to_string(),
            target: event.metadata().target().to_string(),
            message: visitor.message.unwrap_or_default(),
            fields: visitor.fields,
            thread_id: visitor.thread_id,
            run_id: visitor.run_id,
        });
    }

    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);

        if visitor.thread_id.is_some() || visitor.run_id.is_some() {
            if let Some(span) = ctx.span(id) {
                span.extensions_mut().insert(SpanFields {
                    thread_id: visitor.thread_id,
                    run_id: visitor.run_id,
                });
            }
        }
    }
}
