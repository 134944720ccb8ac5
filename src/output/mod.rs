//! User-facing output
//!
//! The measurement core never formats for a terminal. It classifies what it
//! has to say as an [`Event`] and hands it to an [`EventSink`]; a
//! [`Renderer`] turns events into text. The [`Bus`] sits between the two so
//! that concurrent producers (transfer workers, the progress ticker, the
//! runner) are serialized through a single render task.

mod bus;
mod colored;
mod formatter;

pub use bus::Bus;
pub use colored::TtyRenderer;
pub use formatter::{PlainRenderer, Renderer};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::IsTerminal;
use std::sync::Mutex;

/// Category of an output event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Banner,
    Header,
    Info,
    Warn,
    Result,
    /// Label/value pair
    Kv,
    /// Separator line
    Line,
    /// Re-rendered in place on a terminal
    Progress,
    Fatal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub label: String,
    pub value: String,
    pub time: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: EventKind, label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            value: value.into(),
            time: Utc::now(),
        }
    }
}

/// Destination for output events.
///
/// `emit` never blocks; `flush` resolves once everything emitted so far has
/// been written out.
#[async_trait]
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);

    async fn flush(&self) {}

    fn banner(&self, value: &str) {
        self.emit(Event::new(EventKind::Banner, "", value));
    }

    fn header(&self, value: &str) {
        self.emit(Event::new(EventKind::Header, "", value));
    }

    fn info(&self, value: &str) {
        self.emit(Event::new(EventKind::Info, "", value));
    }

    fn warn(&self, value: &str) {
        self.emit(Event::new(EventKind::Warn, "", value));
    }

    fn result(&self, value: &str) {
        self.emit(Event::new(EventKind::Result, "", value));
    }

    fn kv(&self, label: &str, value: &str) {
        self.emit(Event::new(EventKind::Kv, label, value));
    }

    fn line(&self) {
        self.emit(Event::new(EventKind::Line, "", ""));
    }

    fn progress(&self, label: &str, value: &str) {
        self.emit(Event::new(EventKind::Progress, label, value));
    }

    fn fatal(&self, value: &str) {
        self.emit(Event::new(EventKind::Fatal, "", value));
    }
}

/// Sink that records events in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Values of every recorded event of `kind`, in emission order
    pub fn values(&self, kind: EventKind) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|event| event.kind == kind)
            .map(|event| event.value)
            .collect()
    }

    /// Whether any event's label or value contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.events()
            .iter()
            .any(|event| event.value.contains(needle) || event.label.contains(needle))
    }
}

#[async_trait]
impl EventSink for MemorySink {
    fn emit(&self, event: Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Whether stderr, where all output goes, is attached to a terminal
pub fn is_tty() -> bool {
    std::io::stderr().is_terminal()
}

/// Renderer for stderr: colored and in-place progress on a terminal, one line
/// per event otherwise
pub fn stderr_renderer(tty: bool, enable_color: bool) -> Box<dyn Renderer> {
    if tty {
        Box::new(TtyRenderer::new(std::io::stderr(), enable_color))
    } else {
        Box::new(PlainRenderer::new(std::io::stderr()))
    }
}
