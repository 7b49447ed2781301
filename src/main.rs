mod app;
mod commands;
mod config;
mod logging;
mod recording;
mod setup;
mod ui;

fn main() {
    if let Err(e) = app::run() {
        tracing::error!("{e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
