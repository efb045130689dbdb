use std::io::Write;

use env_logger::Builder;
use log::{Level, LevelFilter};

/// Dependencies log at warn; our crates at info, or debug with `--verbose`.
/// `RUST_LOG` is applied first, so the explicit filters below win.
pub fn setup_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::from_default_env()
        .filter_level(LevelFilter::Warn)
        .filter_module(env!("CARGO_PKG_NAME"), level)
        .filter_module("wikisync_core", level)
        .format(|buf, record| match record.level() {
            Level::Error | Level::Warn => writeln!(
                buf,
                "[wikisync {} {}] {}",
                record.level(),
                record.target(),
                record.args()
            ),
            _ => writeln!(buf, "[wikisync] {}", record.args()),
        })
        .init();
}
