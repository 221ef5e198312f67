//! Captures tracing events so tests can assert on emitted log records.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use tracing::{
    field::{Field, Visit},
    Event, Level, Subscriber,
};
use tracing_subscriber::{layer::Context, prelude::*, registry::Registry, Layer};

/// One captured log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRecord {
    /// Event level.
    pub level: Level,
    /// Event target, usually the module path.
    pub target: String,
    /// The `message` field, empty if none.
    pub message: String,
    /// All other fields rendered as strings.
    pub fields: BTreeMap<String, String>,
}

impl CapturedRecord {
    /// Returns a structured field by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Shared sink of captured records.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    records: Arc<Mutex<Vec<CapturedRecord>>>,
}

impl LogCapture {
    /// Creates an empty capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// A layer feeding this capture. Records every level.
    pub fn layer(&self) -> CaptureLayer {
        CaptureLayer { records: Arc::clone(&self.records) }
    }

    /// A subscriber with only this capture attached.
    pub fn subscriber(&self) -> impl Subscriber + Send + Sync {
        Registry::default().with(self.layer())
    }

    /// Runs `f` with this capture as the thread's default subscriber.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::subscriber::with_default(self.subscriber(), f)
    }

    /// Installs this capture as the thread's default subscriber until the
    /// guard is dropped.
    pub fn set_default(&self) -> tracing::subscriber::DefaultGuard {
        tracing::subscriber::set_default(self.subscriber())
    }

    /// Every captured record.
    pub fn records(&self) -> Vec<CapturedRecord> {
        self.lock().clone()
    }

    /// Records at `level` or more severe (`INFO` includes `WARN` and
    /// `ERROR`).
    pub fn at_least(&self, level: Level) -> Vec<CapturedRecord> {
        self.lock().iter().filter(|record| record.level <= level).cloned().collect()
    }

    /// Records whose message contains `needle`.
    pub fn containing(&self, needle: &str) -> Vec<CapturedRecord> {
        self.lock().iter().filter(|record| record.message.contains(needle)).cloned().collect()
    }

    /// Discards captured records.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<CapturedRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Layer produced by [`LogCapture::layer`].
#[derive(Debug, Clone)]
pub struct CaptureLayer {
    records: Arc<Mutex<Vec<CapturedRecord>>>,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        let record = CapturedRecord {
            level: *metadata.level(),
            target: metadata.target().to_string(),
            message: visitor.message,
            fields: visitor.fields,
        };

        self.records.lock().unwrap_or_else(PoisonError::into_inner).push(record);
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: BTreeMap<String, String>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, format!("{value:?}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_fields_and_levels() {
        let capture = LogCapture::new();

        capture.in_scope(|| {
            tracing::debug!(offset = 7, "quiet");
            tracing::error!(topic = "events", partition = 3, "loud");
        });

        assert_eq!(capture.records().len(), 2);

        let loud = capture.at_least(Level::INFO);
        assert_eq!(loud.len(), 1);
        assert_eq!(loud[0].message, "loud");
        assert_eq!(loud[0].field("topic"), Some("events"));
        assert_eq!(loud[0].field("partition"), Some("3"));

        capture.clear();
        assert!(capture.records().is_empty());
    }
}
