//! Terminal renderer with ANSI colors and in-place progress

use super::formatter::Renderer;
use super::{Event, EventKind};
use ::colored::Colorize;
use std::io::Write;

const SEPARATOR_WIDTH: usize = 60;

/// Renderer for an interactive terminal.
///
/// Progress events overwrite each other on one line via `\r`; the line is
/// blanked before the next non-progress event is written.
pub struct TtyRenderer<W: Write + Send> {
    writer: W,
    use_color: bool,
    last_progress: Option<usize>,
}

impl<W: Write + Send> TtyRenderer<W> {
    pub fn new(writer: W, use_color: bool) -> Self {
        Self {
            writer,
            use_color,
            last_progress: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn paint(&self, text: &str, style: fn(&str) -> ::colored::ColoredString) -> String {
        if self.use_color {
            style(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn format(&self, event: &Event) -> String {
        match event.kind {
            EventKind::Banner => format!("\n  {}\n", self.paint(&event.value, |s| s.cyan().bold())),
            EventKind::Header => {
                let text = format!("  ▸ {}", event.value);
                format!("\n{}\n", self.paint(&text, |s| s.cyan().bold()))
            }
            EventKind::Info => format!("  {} {}\n", self.paint("[+]", |s| s.green().bold()), event.value),
            EventKind::Warn => format!("  {} {}\n", self.paint("[!]", |s| s.yellow().bold()), event.value),
            EventKind::Result => {
                let text = format!("    ➜  {}", event.value);
                format!("  {}\n", self.paint(&text, |s| s.green().bold()))
            }
            EventKind::Kv => {
                let label = format!("{:<18}", format!("{}:", event.label));
                format!("  {} {}\n", self.paint(&label, |s| s.dimmed().bold()), event.value)
            }
            EventKind::Line => format!("{}\n", self.paint(&"─".repeat(SEPARATOR_WIDTH), |s| s.dimmed())),
            EventKind::Progress => {
                let text = format!("[{}] {}", event.label, event.value);
                format!("\r  {}", self.paint(&text, |s| s.dimmed()))
            }
            EventKind::Fatal => format!("  {} {}\n", self.paint("[✗]", |s| s.red().bold()), event.value),
        }
    }
}

impl<W: Write + Send> Renderer for TtyRenderer<W> {
    fn render(&mut self, event: &Event) {
        if event.kind != EventKind::Progress {
            if let Some(width) = self.last_progress.take() {
                let _ = write!(self.writer, "\r{}\r", " ".repeat(width + 2));
            }
        }

        let text = self.format(event);
        if event.kind == EventKind::Progress {
            self.last_progress = Some(text.chars().count());
        }
        let _ = self.writer.write_all(text.as_bytes());
        let _ = self.writer.flush();
    }

    fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_plain(events: &[Event]) -> String {
        let mut renderer = TtyRenderer::new(Vec::new(), false);
        for event in events {
            renderer.render(event);
        }
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[test]
    fn test_tty_layout_without_color() {
        let out = render_plain(&[
            Event::new(EventKind::Banner, "", "⚡ iNetSpeed-CLI"),
            Event::new(EventKind::Header, "", "Download (single thread)"),
            Event::new(EventKind::Result, "", "94 Mbps"),
        ]);
        assert!(out.contains("\n  ⚡ iNetSpeed-CLI\n"));
        assert!(out.contains("\n  ▸ Download (single thread)\n"));
        assert!(out.contains("      ➜  94 Mbps\n"));
    }

    #[test]
    fn test_progress_redrawn_in_place_then_cleared() {
        let out = render_plain(&[
            Event::new(EventKind::Progress, "Download", "10.0 Mbps"),
            Event::new(EventKind::Progress, "Download", "20.0 Mbps"),
            Event::new(EventKind::Info, "", "done"),
        ]);

        assert!(out.starts_with("\r  [Download] 10.0 Mbps\r  [Download] 20.0 Mbps"));
        let blank = format!("\r{}\r", " ".repeat("\r  [Download] 20.0 Mbps".chars().count() + 2));
        assert!(out.contains(&blank));
        assert!(out.ends_with("  [+] done\n"));
    }

    #[test]
    fn test_no_clear_without_progress() {
        let out = render_plain(&[Event::new(EventKind::Info, "", "a"), Event::new(EventKind::Info, "", "b")]);
        assert_eq!(out, "  [+] a\n  [+] b\n");
    }

    #[test]
    fn test_separator() {
        let out = render_plain(&[Event::new(EventKind::Line, "", "")]);
        assert_eq!(out, format!("{}\n", "─".repeat(60)));
    }
}
