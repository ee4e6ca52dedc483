//! Main application entry point

use std::io::{self, BufRead, Write};
use std::path::Path;
use anyhow::{Context, Result};
use tracing::{error, info};

use il_core::settings::SETTINGS_FILE_NAME;
use il_core::Settings;

mod app;
mod commands;

use app::App;
use commands::Command;

fn main() -> Result<()> {
    // Logs go to stderr so they never interleave with command output
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    let settings = Settings::load_or_default(Path::new(SETTINGS_FILE_NAME))
        .with_context(|| format!("Failed to load {}", SETTINGS_FILE_NAME))?;
    info!(model = %settings.llm.model, "Starting InsightLoop");

    let mut app = App::new(settings, ".")?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    writeln!(out, "InsightLoop: Upload. Clean. Ask. Visualize.")?;
    let files: Vec<String> = std::env::args().skip(1).collect();
    if !files.is_empty() {
        app.load_paths(&files, &mut out)?;
    }
    writeln!(out, "Type `help` for commands.")?;

    let stdin = io::stdin();
    loop {
        write!(out, "> ")?;
        out.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                writeln!(out, "{}", e)?;
                continue;
            }
        };

        match app.execute(command, &mut out) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                error!("Command failed: {:#}", e);
                writeln!(out, "Error: {:#}", e)?;
            }
        }
    }

    info!("Exiting InsightLoop");
    Ok(())
}
