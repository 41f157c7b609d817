//! Logging setup for hv-newton binaries and benches
//!
//! The library itself only emits `tracing` events: warnings for recovered numerical
//! degeneracy (pre-conditioning exhaustion, line searches out of attempts, solver
//! fallbacks), `info` lines for the per-iteration HVN report and `debug` tables.
//! Executables call one of the initializers below once at start-up.
//!
//! Output format: `[LEVEL YYYY-MM-DD HH:MM:SS target] message`, with `file:line`
//! instead of the target for DEBUG/TRACE events.

use tracing::Level;

/// Initialize the subscriber at INFO (overrideable via `RUST_LOG`).
///
/// # Example
/// ```no_run
/// use hv_newton::init_logger;
///
/// init_logger();
/// tracing::info!("HVN run started");
/// ```
pub fn init_logger() {
    init_logger_with_level(Level::INFO)
}

/// Initialize the subscriber from a verbosity flag: DEBUG when set, WARN otherwise.
///
/// The optimizer's per-iteration tables are emitted at DEBUG, so a verbose run
/// shows them while a quiet run only reports recovered numerical problems.
pub fn init_logger_with_verbosity(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    init_logger_with_level(level)
}

/// Initialize the subscriber with a custom default level.
///
/// ```bash
/// RUST_LOG=hv_newton=trace cargo run --bin hvn_demo
/// ```
pub fn init_logger_with_level(default_level: Level) {
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    // `try_init` so tests and benches may call this more than once.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .event_format(BracketFormatter { ansi: true })
        .try_init();
}

struct BracketFormatter {
    ansi: bool,
}

impl BracketFormatter {
    fn level_tag(&self, level: Level) -> &'static str {
        match (level, self.ansi) {
            (Level::ERROR, true) => "\x1b[31mERROR\x1b[0m",
            (Level::WARN, true) => "\x1b[33mWARN\x1b[0m",
            (Level::INFO, true) => "\x1b[32mINFO\x1b[0m",
            (Level::DEBUG, true) => "\x1b[34mDEBUG\x1b[0m",
            (Level::TRACE, true) => "\x1b[35mTRACE\x1b[0m",
            (Level::ERROR, false) => "ERROR",
            (Level::WARN, false) => "WARN",
            (Level::INFO, false) => "INFO",
            (Level::DEBUG, false) => "DEBUG",
            (Level::TRACE, false) => "TRACE",
        }
    }
}

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for BracketFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let level = *metadata.level();

        write!(
            writer,
            "[{} {} ",
            self.level_tag(level),
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;

        let verbose_location = level == Level::DEBUG || level == Level::TRACE;
        match (verbose_location, metadata.file()) {
            (true, Some(file)) => {
                let filename = file.rsplit('/').next().unwrap_or(file);
                write!(writer, "{}:{}", filename, metadata.line().unwrap_or(0))?;
            }
            _ => write!(writer, "{}", metadata.target())?,
        }

        write!(writer, "] ")?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
