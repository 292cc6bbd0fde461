use slog::{o, Drain, Logger};
use slog_async::Async;
use slog_term::{FullFormat, TermDecorator};

/// Terminal logger for a batch run. Every record carries the component and
/// the module that asked for the logger.
pub fn create_logger(for_module: &str) -> Logger {
    let decorator = TermDecorator::new().stderr().build();
    let drain = FullFormat::new(decorator)
        .use_utc_timestamp()
        .use_original_order()
        .build()
        .fuse();
    let async_drain = Async::new(drain).build().fuse();
    Logger::root(async_drain, o!("component" => "ecgfeat", "module" => for_module.to_string()))
}

/// Logger that drops everything, for callers that do not care about diagnostics.
pub fn discard_logger() -> Logger {
    Logger::root(slog::Discard, o!())
}
