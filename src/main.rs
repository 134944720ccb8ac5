//! Network Speed Tester - Main CLI Application
//!
//! Parses arguments, resolves configuration, and hands a cancellation token
//! wired to SIGINT/SIGTERM to the runner. All output goes to stderr except
//! help and version text.

use clap::Parser;
use network_speed_tester::{
    app::App,
    cli::{usage, version_line, Cli, CliAction},
    config::load_config,
    i18n::Lang,
    output::{is_tty, stderr_renderer, Bus, EventSink},
};
use std::{process, sync::Arc};
use tokio_util::sync::CancellationToken;

/// Exit status for argument and configuration errors
const EXIT_CONFIG: i32 = 1;

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        eprintln!("Please report this issue at: https://github.com/MaurUppi/network-speed-tester/issues");
        process::exit(99);
    }));

    let args: Vec<String> = std::env::args().collect();
    let lang = Lang::resolve(Lang::find_lang_arg(&args[1..]).as_deref());

    let cli = match Cli::try_parse_from(&args) {
        Ok(cli) => cli,
        Err(e) => {
            let rendered = e.to_string();
            let first = rendered.lines().next().unwrap_or_default();
            config_error(lang, first.trim_start_matches("error: "))
        }
    };

    match cli.action(lang) {
        Ok(CliAction::Help) => {
            print!("{}", usage(lang));
            process::exit(0);
        }
        Ok(CliAction::Version) => {
            println!("{}", version_line());
            process::exit(0);
        }
        Ok(CliAction::Run) => {}
        Err(e) => config_error(lang, &e.to_string()),
    }

    let config = match load_config(cli) {
        Ok(config) => config,
        Err(e) => config_error(lang, &e.to_string()),
    };

    let tty = is_tty();
    let bus = Arc::new(Bus::new(stderr_renderer(tty, config.enable_color)));

    let token = CancellationToken::new();
    tokio::spawn(cancel_on_signal(token.clone()));

    let app = App::new(config, bus.clone(), tty);
    let code = match app.run(&token).await {
        Ok(code) => code,
        Err(e) => {
            bus.fatal(&e.to_string());
            e.exit_code()
        }
    };

    bus.close().await;
    process::exit(code);
}

/// Print a configuration problem followed by the usage text, then exit 1
fn config_error(lang: Lang, message: &str) -> ! {
    eprintln!("  [✗] {}", message);
    eprintln!();
    eprint!("{}", usage(lang));
    process::exit(EXIT_CONFIG);
}

/// Cancel `token` on Ctrl-C, or on SIGTERM where that exists
async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    token.cancel();
}
