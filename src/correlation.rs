// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Correlation context.
//!
//! Every public [`Flow`](crate::Flow) operation opens one [`Correlation`].
//! Nested internal calls borrow it (`&Correlation`); nothing below the
//! outermost call ever opens its own. The sink's `finish` runs exactly once,
//! when the owning value is dropped, whichever path the operation took.
//!
//! The context also carries a `tracing` span with a `correlation_id` field,
//! so plain `tracing` events emitted while the span is entered are tied to
//! the same operation.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn, Level, Span};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Structured diagnostics consumer. Implementations must not fail or block.
pub trait CorrelationSink: Send + Sync {
    fn start(&self, operation: &str) -> CorrelationId;
    fn annotate(&self, id: &CorrelationId, level: Level, message: &str);
    fn mark_used(&self, id: &CorrelationId, step: &str);
    fn finish(&self, id: &CorrelationId);
}

/// Default sink: forwards everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl CorrelationSink for TracingSink {
    fn start(&self, operation: &str) -> CorrelationId {
        let id = CorrelationId(Uuid::new_v4().to_string());
        debug!(correlation_id = %id, operation, "Correlation opened");
        id
    }

    fn annotate(&self, id: &CorrelationId, level: Level, message: &str) {
        match level {
            Level::ERROR => error!(correlation_id = %id, "{}", message),
            Level::WARN => warn!(correlation_id = %id, "{}", message),
            Level::INFO => info!(correlation_id = %id, "{}", message),
            Level::DEBUG => debug!(correlation_id = %id, "{}", message),
            _ => trace!(correlation_id = %id, "{}", message),
        }
    }

    fn mark_used(&self, id: &CorrelationId, step: &str) {
        trace!(correlation_id = %id, step, "Correlation reused");
    }

    fn finish(&self, id: &CorrelationId) {
        debug!(correlation_id = %id, "Correlation closed");
    }
}

/// One captured sink call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Start { id: CorrelationId, operation: String },
    Annotate { id: CorrelationId, level: Level, message: String },
    MarkUsed { id: CorrelationId, step: String },
    Finish { id: CorrelationId },
}

/// Sink that keeps every call in memory. Ids are sequential.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<SinkEvent>>,
    next: Mutex<u64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    pub fn started(&self) -> usize {
        self.count(|e| matches!(e, SinkEvent::Start { .. }))
    }

    pub fn finished(&self) -> usize {
        self.count(|e| matches!(e, SinkEvent::Finish { .. }))
    }

    /// Messages annotated at `level`, in order.
    pub fn messages(&self, level: Level) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Annotate { level: l, message, .. } if *l == level => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&SinkEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}

impl CorrelationSink for MemorySink {
    fn start(&self, operation: &str) -> CorrelationId {
        let id = {
            let mut next = self.next.lock();
            *next += 1;
            CorrelationId(format!("op-{}", *next))
        };
        self.events.lock().push(SinkEvent::Start {
            id: id.clone(),
            operation: operation.to_string(),
        });
        id
    }

    fn annotate(&self, id: &CorrelationId, level: Level, message: &str) {
        self.events.lock().push(SinkEvent::Annotate {
            id: id.clone(),
            level,
            message: message.to_string(),
        });
    }

    fn mark_used(&self, id: &CorrelationId, step: &str) {
        self.events.lock().push(SinkEvent::MarkUsed {
            id: id.clone(),
            step: step.to_string(),
        });
    }

    fn finish(&self, id: &CorrelationId) {
        self.events.lock().push(SinkEvent::Finish { id: id.clone() });
    }
}

/// Scoped context for one outward-facing operation.
pub struct Correlation {
    sink: Arc<dyn CorrelationSink>,
    id: CorrelationId,
    span: Span,
}

impl Correlation {
    pub fn open(sink: Arc<dyn CorrelationSink>, operation: &str, model: &str) -> Self {
        let id = sink.start(operation);
        let span = tracing::info_span!("flow", correlation_id = %id, operation, model);
        Self { sink, id, span }
    }

    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Note that a nested step is running under this context.
    pub fn reuse(&self, step: &str) -> &Self {
        self.sink.mark_used(&self.id, step);
        self
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.sink.annotate(&self.id, Level::DEBUG, message.as_ref());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.sink.annotate(&self.id, Level::INFO, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.sink.annotate(&self.id, Level::WARN, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.sink.annotate(&self.id, Level::ERROR, message.as_ref());
    }
}

impl fmt::Debug for Correlation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Correlation").field("id", &self.id).finish()
    }
}

impl Drop for Correlation {
    fn drop(&mut self) {
        self.sink.finish(&self.id);
    }
}
