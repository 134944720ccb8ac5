//! Renderer trait and the plain (non-terminal) renderer

use super::{Event, EventKind};
use std::io::Write;

/// Turns events into text. Called from a single task, so implementations
/// need no locking of their own.
pub trait Renderer: Send {
    fn render(&mut self, event: &Event);

    fn flush(&mut self) {}
}

/// One line per event, no escape sequences; progress lines are not redrawn
pub struct PlainRenderer<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> PlainRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn format(event: &Event) -> String {
        match event.kind {
            EventKind::Banner => format!("\n  {}\n", event.value),
            EventKind::Header => format!("\n  > {}\n", event.value),
            EventKind::Info => format!("  [+] {}\n", event.value),
            EventKind::Warn => format!("  [!] {}\n", event.value),
            EventKind::Result => format!("      -> {}\n", event.value),
            EventKind::Kv => format!("  {:<18} {}\n", format!("{}:", event.label), event.value),
            EventKind::Line => format!("  {}\n", "-".repeat(56)),
            EventKind::Progress => format!("  [{}] {}\n", event.label, event.value),
            EventKind::Fatal => format!("  [X] {}\n", event.value),
        }
    }
}

impl<W: Write + Send> Renderer for PlainRenderer<W> {
    fn render(&mut self, event: &Event) {
        let _ = self.writer.write_all(Self::format(event).as_bytes());
    }

    fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}
