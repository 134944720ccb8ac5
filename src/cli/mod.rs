//! Command-line interface definitions
//!
//! Help and version output are produced by this module rather than by clap so
//! that the usage text follows the selected language.

use crate::defaults::{
    DEFAULT_DL_URL, DEFAULT_LATENCY_COUNT, DEFAULT_LATENCY_URL, DEFAULT_MAX, DEFAULT_THREADS,
    DEFAULT_TIMEOUT_SECS, DEFAULT_UL_URL,
};
use crate::error::{AppError, Result};
use crate::i18n::Lang;
use clap::Parser;

/// Network speed tester: idle/loaded latency and multi-threaded throughput
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "nst")]
#[command(about, long_about = None)]
#[command(disable_help_flag = true, disable_version_flag = true)]
pub struct Cli {
    /// Download test URL
    #[arg(long, value_name = "URL")]
    pub dl_url: Option<String>,

    /// Upload test URL
    #[arg(long, value_name = "URL")]
    pub ul_url: Option<String>,

    /// Latency test URL
    #[arg(long, value_name = "URL")]
    pub latency_url: Option<String>,

    /// Per-thread transfer cap, e.g. 2G/500M/1GiB
    #[arg(long, value_name = "SIZE")]
    pub max: Option<String>,

    /// Per-thread timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Concurrent threads
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Latency sample count
    #[arg(long, value_name = "N")]
    pub latency_count: Option<usize>,

    /// Output language (zh or en)
    #[arg(long, value_name = "LANG")]
    pub lang: Option<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Enable verbose diagnostics on stderr
    #[arg(long)]
    pub verbose: bool,

    /// Enable debug diagnostics (JSON log lines) on stderr
    #[arg(long)]
    pub debug: bool,

    #[arg(short = 'h', long = "help")]
    pub help: bool,

    #[arg(short = 'v', long = "version")]
    pub version: bool,

    /// Bare words: `help` and `version` are commands, anything else is rejected
    #[arg(hide = true)]
    pub args: Vec<String>,
}

/// What the process should do after argument parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliAction {
    Run,
    Help,
    Version,
}

impl Cli {
    /// Decide between running, printing help and printing the version
    pub fn action(&self, lang: Lang) -> Result<CliAction> {
        if self.version {
            return Ok(CliAction::Version);
        }
        if self.help {
            return Ok(CliAction::Help);
        }

        match self.args.as_slice() {
            [] => Ok(CliAction::Run),
            [word] if word == "help" => Ok(CliAction::Help),
            [word] if word == "version" => Ok(CliAction::Version),
            rest => Err(AppError::config(format!(
                "{}: {}",
                lang.text("unexpected argument(s)", "存在未识别参数"),
                rest.join(" ")
            ))),
        }
    }

    /// Colors are on unless disabled by flag or environment
    pub fn use_colors(&self) -> bool {
        !self.no_color && supports_color()
    }
}

/// Version line printed by `-v`, `--version` and `version`
pub fn version_line() -> String {
    format!(
        "nst {} (commit {}, built {})",
        crate::VERSION,
        crate::GIT_COMMIT,
        crate::BUILD_TIME
    )
}

/// Localized usage text
pub fn usage(lang: Lang) -> String {
    match lang {
        Lang::Zh => format!(
            r#"用法:
  nst [选项]
  nst help

选项:
  -h, --help                    显示帮助信息
  -v, --version                 显示版本
  --lang LANG                   输出语言：zh 显示中文，其他显示英文（默认读取 SPEEDTEST_LANG/LC_ALL/LC_MESSAGES/LANGUAGE/LANG）
  --dl-url URL                  下载测速地址（默认取 DL_URL 或 "{dl}"）
  --ul-url URL                  上传测速地址（默认取 UL_URL 或 "{ul}"）
  --latency-url URL             延迟测速地址（默认取 LATENCY_URL 或 "{lat}"）
  --max SIZE                    单线程流量上限，如 2G/500M/1GiB（默认取 MAX 或 "{max}"）
  --timeout SECONDS             单线程超时（秒），范围 1-120（默认取 TIMEOUT 或 {timeout}）
  --threads N                   并发线程数，范围 1-64（默认取 THREADS 或 {threads}）
  --latency-count N             延迟采样次数，范围 1-100（默认取 LATENCY_COUNT 或 {count}）
  --no-color                    关闭彩色输出
  --verbose                     在 stderr 输出诊断日志
  --debug                       在 stderr 输出 JSON 调试日志

环境变量:
  DL_URL, UL_URL, LATENCY_URL, MAX, TIMEOUT, THREADS, LATENCY_COUNT
  SPEEDTEST_LANG, LC_ALL, LC_MESSAGES, LANGUAGE, LANG
"#,
            dl = DEFAULT_DL_URL,
            ul = DEFAULT_UL_URL,
            lat = DEFAULT_LATENCY_URL,
            max = DEFAULT_MAX,
            timeout = DEFAULT_TIMEOUT_SECS,
            threads = DEFAULT_THREADS,
            count = DEFAULT_LATENCY_COUNT,
        ),
        Lang::En => format!(
            r#"Usage:
  nst [options]
  nst help

Options:
  -h, --help                    Show this help message
  -v, --version                 Show version
  --lang LANG                   Output language: zh for Chinese, others for English (default from SPEEDTEST_LANG/LC_ALL/LC_MESSAGES/LANGUAGE/LANG)
  --dl-url URL                  Download test URL (default from DL_URL or "{dl}")
  --ul-url URL                  Upload test URL (default from UL_URL or "{ul}")
  --latency-url URL             Latency test URL (default from LATENCY_URL or "{lat}")
  --max SIZE                    Per-thread transfer cap, e.g. 2G/500M/1GiB (default from MAX or "{max}")
  --timeout SECONDS             Per-thread timeout in seconds, 1-120 (default from TIMEOUT or {timeout})
  --threads N                   Concurrent threads, 1-64 (default from THREADS or {threads})
  --latency-count N             Latency sample count, 1-100 (default from LATENCY_COUNT or {count})
  --no-color                    Disable colored output
  --verbose                     Print diagnostic log lines to stderr
  --debug                       Print JSON debug log lines to stderr

Environment variables:
  DL_URL, UL_URL, LATENCY_URL, MAX, TIMEOUT, THREADS, LATENCY_COUNT
  SPEEDTEST_LANG, LC_ALL, LC_MESSAGES, LANGUAGE, LANG
"#,
            dl = DEFAULT_DL_URL,
            ul = DEFAULT_UL_URL,
            lat = DEFAULT_LATENCY_URL,
            max = DEFAULT_MAX,
            timeout = DEFAULT_TIMEOUT_SECS,
            threads = DEFAULT_THREADS,
            count = DEFAULT_LATENCY_COUNT,
        ),
    }
}

/// Check if the terminal supports color output
fn supports_color() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    true
}
