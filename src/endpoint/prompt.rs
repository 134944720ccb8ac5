//! Interactive endpoint choice
//!
//! The blocking line read runs on its own OS thread and is raced against
//! cancellation. A cancelled prompt does not wait for that thread: a read on
//! a terminal cannot be interrupted portably, so the thread stays parked
//! until input arrives or the process exits.

use crate::{i18n::Lang, log_debug, logging::Logger, output::EventSink};
use ::colored::Colorize;
use async_trait::async_trait;
use std::{
    fs::File,
    io::{self, BufRead, BufReader, IsTerminal, Read, Write},
};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Obtains a zero-based choice among `count` candidates.
///
/// `None` means the prompt was cancelled and nothing should be selected.
#[async_trait]
pub trait ChoicePrompt: Send + Sync {
    async fn choose(&self, count: usize, sink: &dyn EventSink, token: &CancellationToken) -> Option<usize>;
}

/// Zero-based index for a typed line. Blank input picks the first candidate;
/// anything else must be a number in `1..=count`.
pub fn parse_choice(line: &str, count: usize) -> Option<usize> {
    let line = line.trim();
    if line.is_empty() {
        return Some(0);
    }
    match line.parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => Some(n - 1),
        _ => None,
    }
}

#[cfg(windows)]
const CONSOLE_INPUT: &str = "CONIN$";
#[cfg(not(windows))]
const CONSOLE_INPUT: &str = "/dev/tty";

/// The console device first, then stdin when it is itself a terminal
fn open_input() -> io::Result<Box<dyn Read + Send>> {
    if let Ok(file) = File::open(CONSOLE_INPUT) {
        return Ok(Box::new(file));
    }
    if io::stdin().is_terminal() {
        return Ok(Box::new(io::stdin()));
    }
    Err(io::Error::new(io::ErrorKind::NotFound, "interactive input not available"))
}

/// Prompt on stderr and read the answer from the terminal
pub struct TerminalPrompt {
    lang: Lang,
    use_color: bool,
    logger: Logger,
}

impl TerminalPrompt {
    pub fn new(lang: Lang, use_color: bool, logger: Logger) -> Self {
        Self { lang, use_color, logger }
    }

    fn write_question(&self, count: usize) {
        let marker = if self.use_color {
            "[?]".cyan().bold().to_string()
        } else {
            "[?]".to_string()
        };
        let question = match self.lang {
            Lang::En => format!("Select endpoint [1-{}, Enter=1]: ", count),
            Lang::Zh => format!("选择节点 [1-{}，回车=1]: ", count),
        };
        let mut stderr = io::stderr();
        let _ = write!(stderr, "  {} {}", marker, question);
        let _ = stderr.flush();
    }

    /// Read one line from `input` and turn it into a choice
    pub async fn read_choice<R>(&self, input: R, count: usize, sink: &dyn EventSink, token: &CancellationToken) -> Option<usize>
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        std::thread::spawn(move || {
            let mut line = String::new();
            // A failed read keeps whatever arrived before the failure
            let _ = BufReader::new(input).read_line(&mut line);
            let _ = tx.send(line);
        });

        let line = tokio::select! {
            _ = token.cancelled() => {
                log_debug!(self.logger, "Endpoint prompt cancelled; input thread left blocked");
                return None;
            }
            received = rx => match received {
                Ok(read) => read,
                Err(_) => return Some(0),
            },
        };

        // EOF or a read error before any input
        if line.is_empty() {
            return Some(0);
        }

        match parse_choice(&line, count) {
            Some(choice) => Some(choice),
            None => {
                let typed = line.trim();
                sink.warn(&match self.lang {
                    Lang::En => format!("Invalid selection '{}', fallback to 1.", typed),
                    Lang::Zh => format!("选择无效 '{}'，回退到 1。", typed),
                });
                Some(0)
            }
        }
    }
}

#[async_trait]
impl ChoicePrompt for TerminalPrompt {
    async fn choose(&self, count: usize, sink: &dyn EventSink, token: &CancellationToken) -> Option<usize> {
        self.write_question(count);

        match open_input() {
            Ok(input) => self.read_choice(input, count, sink, token).await,
            Err(e) => {
                log_debug!(self.logger, "Prompt input unavailable: {}", e);
                sink.warn(self.lang.text(
                    "Interactive input unavailable, defaulting to endpoint 1.",
                    "交互输入不可用，默认使用节点 1。",
                ));
                Some(0)
            }
        }
    }
}
