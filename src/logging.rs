use env_logger::{Builder, Env, Target};
use log::info;
use std::io::Write;

/// Install the panic hook and the process-wide logger.
///
/// Errors go to stderr, everything else to stdout. The filter defaults to
/// `debug` for debug builds and `info` otherwise and honours `RUST_LOG`.
pub fn init(service_name: &str) {
    log_panics::init();

    let mut builder = if cfg!(debug_assertions) {
        Builder::from_env(Env::default().default_filter_or("debug"))
    } else {
        Builder::from_env(Env::default().default_filter_or("info"))
    };

    builder.format(|f, record| match record.level() {
        log::Level::Error => {
            eprintln!("{}", record.args());
            Ok(())
        }
        _ => {
            writeln!(f, "{}", record.args())
        }
    });

    builder.target(Target::Stdout).init();

    info!("{service_name} version: {}", env!("CARGO_PKG_VERSION"));
}
