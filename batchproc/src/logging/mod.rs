//! Pluggable logging
//!
//! The processor never logs to a fixed destination. Log lines are passed
//! to a `LoggingAdapter` along with a `LoggingContext` which identifies
//! the processor and the run-cycle the line belongs to.
use std::fmt;
use std::fmt::Arguments;
use std::sync::Arc;

use crate::batchproc_types::config::ProcessorName;

pub trait Logs {
    fn debug(&self, args: Arguments);
    fn info(&self, args: Arguments);
    fn warn(&self, args: Arguments);
    fn error(&self, args: Arguments);
}

#[derive(Clone)]
pub(crate) struct Logger {
    context: Arc<LoggingContext>,
    logging_adapter: Arc<dyn LoggingAdapter>,
}

impl Logger {
    pub fn new(logging_adapter: Arc<dyn LoggingAdapter>) -> Self {
        Logger {
            context: Arc::new(LoggingContext::default()),
            logging_adapter,
        }
    }

    pub fn with_processor_name(&self, processor_name: ProcessorName) -> Self {
        let mut context = (*self.context).clone();
        context.processor_name = Some(processor_name);
        let logging_adapter = Arc::clone(&self.logging_adapter);

        Logger {
            context: Arc::new(context),
            logging_adapter,
        }
    }

    pub fn with_cycle(&self, cycle: u64) -> Self {
        let mut context = (*self.context).clone();
        context.cycle = Some(cycle);
        let logging_adapter = Arc::clone(&self.logging_adapter);

        Logger {
            context: Arc::new(context),
            logging_adapter,
        }
    }
}

impl Logs for Logger {
    #[cfg(feature = "debug-mode")]
    fn debug(&self, args: Arguments) {
        self.logging_adapter.debug(&self.context, args);
    }

    #[cfg(not(feature = "debug-mode"))]
    fn debug(&self, _args: Arguments) {}

    fn info(&self, args: Arguments) {
        self.logging_adapter.info(&self.context, args);
    }

    fn warn(&self, args: Arguments) {
        self.logging_adapter.warn(&self.context, args);
    }

    fn error(&self, args: Arguments) {
        self.logging_adapter.error(&self.context, args);
    }
}

/// An adapter for pluggable logging.
///
/// Implementors can be used by the `BatchProcessor`. Since batch jobs
/// log from worker threads, adapters must be `Send` and `Sync`.
pub trait LoggingAdapter: Send + Sync + 'static {
    fn debug(&self, context: &LoggingContext, args: Arguments);
    fn info(&self, context: &LoggingContext, args: Arguments);
    fn warn(&self, context: &LoggingContext, args: Arguments);
    fn error(&self, context: &LoggingContext, args: Arguments);
}

/// Logs to stdout
///
/// This blocks the current thread.
#[derive(Clone)]
pub struct StdOutLogger(LogConfig);

impl StdOutLogger {
    pub fn new(config: LogConfig) -> Self {
        Self(config)
    }
}

impl Default for StdOutLogger {
    fn default() -> Self {
        Self::new(LogConfig::default())
    }
}

impl LoggingAdapter for StdOutLogger {
    fn debug(&self, context: &LoggingContext, args: Arguments) {
        println!("[DEBUG]{}{}", context.create_display(&self.0), args);
    }

    fn info(&self, context: &LoggingContext, args: Arguments) {
        println!("[INFO]{}{}", context.create_display(&self.0), args);
    }

    fn warn(&self, context: &LoggingContext, args: Arguments) {
        println!("[WARN]{}{}", context.create_display(&self.0), args);
    }

    fn error(&self, context: &LoggingContext, args: Arguments) {
        println!("[ERROR]{}{}", context.create_display(&self.0), args);
    }
}

/// Does no logging at all
#[derive(Clone, Copy)]
pub struct DevNullLogger;

impl LoggingAdapter for DevNullLogger {
    fn debug(&self, _context: &LoggingContext, _args: Arguments) {}
    fn info(&self, _context: &LoggingContext, _args: Arguments) {}
    fn warn(&self, _context: &LoggingContext, _args: Arguments) {}
    fn error(&self, _context: &LoggingContext, _args: Arguments) {}
}

/// Contextual data passed to a logger to be displayed along with a log message
#[derive(Default, Debug, Clone)]
#[non_exhaustive]
pub struct LoggingContext {
    processor_name: Option<ProcessorName>,
    cycle: Option<u64>,
}

impl LoggingContext {
    /// The name of the processor if one was configured
    pub fn processor_name(&self) -> Option<&ProcessorName> {
        self.processor_name.as_ref()
    }

    /// The ordinal of the run-cycle, starting at 1
    pub fn cycle(&self) -> Option<u64> {
        self.cycle
    }

    /// Creates a `Display` based on the given `LogConfig`
    pub fn create_display<'a>(&'a self, config: &'a LogConfig) -> ContextDisplay<'a> {
        ContextDisplay {
            context: self,
            config,
        }
    }
}

/// Configures which contextual data should be made available with a log message
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct LogConfig {
    pub show_processor_name: bool,
    pub show_cycle: bool,
}

impl LogConfig {
    /// Only display the run-cycle
    pub fn short() -> Self {
        Self {
            show_processor_name: false,
            show_cycle: true,
        }
    }

    /// Display the processor name and the run-cycle
    pub fn long() -> Self {
        Self {
            show_processor_name: true,
            show_cycle: true,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::long()
    }
}

pub struct ContextDisplay<'a> {
    config: &'a LogConfig,
    context: &'a LoggingContext,
}

impl<'a> ContextDisplay<'a> {
    fn format(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        let mut n = self.item_count();
        if n == 0 {
            return Ok(());
        }

        write!(f, "[")?;
        if self.config.show_processor_name {
            if let Some(ref processor_name) = self.context.processor_name {
                write!(f, "PROC:{}", processor_name)?;
                add_delimiter(&mut n, f)?;
            }
        }
        if self.config.show_cycle {
            if let Some(cycle) = self.context.cycle {
                write!(f, "CYC:{}", cycle)?;
                add_delimiter(&mut n, f)?;
            }
        }
        Ok(())
    }

    fn item_count(&self) -> usize {
        let mut n = 0;
        if self.config.show_processor_name && self.context.processor_name.is_some() {
            n += 1;
        }
        if self.config.show_cycle && self.context.cycle.is_some() {
            n += 1;
        }
        n
    }
}

fn add_delimiter(n: &mut usize, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
    (*n) -= 1;
    if *n == 0 {
        write!(f, "] ")?;
    } else {
        write!(f, ";")?;
    }
    Ok(())
}

impl<'a> fmt::Display for ContextDisplay<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.format(f)
    }
}

#[cfg(feature = "slog")]
pub mod slog_adapter {
    use std::fmt;

    use super::*;
    use slog::{debug, error, info, o, warn, Logger};

    /// A logger based on `slog`
    #[derive(Clone)]
    pub struct SlogLogger {
        logger: Logger,
        config: LogConfig,
    }

    impl SlogLogger {
        pub fn new(logger: Logger) -> Self {
            SlogLogger {
                logger,
                config: LogConfig::short(),
            }
        }

        pub fn new_with_config(logger: Logger, config: LogConfig) -> Self {
            SlogLogger { logger, config }
        }
    }

    impl LoggingAdapter for SlogLogger {
        fn debug(&self, context: &LoggingContext, args: Arguments) {
            let ctx_display = context.create_display(&self.config);
            let kvs = o!("processor" => value(context.processor_name.as_ref()),
            "cycle" => value(context.cycle.as_ref()));
            debug!(&self.logger, "{}{}", ctx_display, args; kvs)
        }

        fn info(&self, context: &LoggingContext, args: Arguments) {
            let ctx_display = context.create_display(&self.config);
            let kvs = o!("processor" => value(context.processor_name.as_ref()),
            "cycle" => value(context.cycle.as_ref()));
            info!(&self.logger, "{}{}", ctx_display, args; kvs)
        }

        fn warn(&self, context: &LoggingContext, args: Arguments) {
            let ctx_display = context.create_display(&self.config);
            let kvs = o!("processor" => value(context.processor_name.as_ref()),
            "cycle" => value(context.cycle.as_ref()));
            warn!(&self.logger, "{}{}", ctx_display, args; kvs)
        }

        fn error(&self, context: &LoggingContext, args: Arguments) {
            let ctx_display = context.create_display(&self.config);
            let kvs = o!("processor" => value(context.processor_name.as_ref()),
            "cycle" => value(context.cycle.as_ref()));
            error!(&self.logger, "{}{}", ctx_display, args; kvs)
        }
    }

    fn value<V: fmt::Display>(value: Option<&V>) -> String {
        value
            .map(|s| s.to_string())
            .unwrap_or_else(|| "none".to_owned())
    }
}

#[cfg(feature = "log")]
pub mod log_adapter {
    use std::fmt::Arguments;

    use super::*;
    use log::{debug, error, info, warn};

    /// A logger based on `log`
    #[derive(Clone)]
    pub struct LogLogger(LogConfig);

    impl LogLogger {
        pub fn new(config: LogConfig) -> Self {
            Self(config)
        }
    }

    impl Default for LogLogger {
        fn default() -> Self {
            Self::new(LogConfig::default())
        }
    }

    impl LoggingAdapter for LogLogger {
        fn debug(&self, context: &LoggingContext, args: Arguments) {
            debug!("{}{}", context.create_display(&self.0), args);
        }
        fn info(&self, context: &LoggingContext, args: Arguments) {
            info!("{}{}", context.create_display(&self.0), args);
        }
        fn warn(&self, context: &LoggingContext, args: Arguments) {
            warn!("{}{}", context.create_display(&self.0), args);
        }
        fn error(&self, context: &LoggingContext, args: Arguments) {
            error!("{}{}", context.create_display(&self.0), args);
        }
    }
}

/// Collects log lines so that tests can count them
#[cfg(test)]
pub(crate) mod collecting {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Level {
        Debug,
        Info,
        Warn,
        Error,
    }

    #[derive(Clone, Default)]
    pub struct CollectingLogger {
        lines: Arc<Mutex<Vec<(Level, String)>>>,
    }

    impl CollectingLogger {
        fn push(&self, level: Level, context: &LoggingContext, args: Arguments) {
            let line = format!("{}{}", context.create_display(&LogConfig::long()), args);
            self.lines.lock().unwrap().push((level, line));
        }

        pub fn lines(&self, level: Level) -> Vec<String> {
            self.lines
                .lock()
                .unwrap()
                .iter()
                .filter(|(l, _)| *l == level)
                .map(|(_, line)| line.clone())
                .collect()
        }

        pub fn count_containing(&self, level: Level, needle: &str) -> usize {
            self.lines(level)
                .iter()
                .filter(|line| line.contains(needle))
                .count()
        }
    }

    impl LoggingAdapter for CollectingLogger {
        fn debug(&self, context: &LoggingContext, args: Arguments) {
            self.push(Level::Debug, context, args)
        }
        fn info(&self, context: &LoggingContext, args: Arguments) {
            self.push(Level::Info, context, args)
        }
        fn warn(&self, context: &LoggingContext, args: Arguments) {
            self.push(Level::Warn, context, args)
        }
        fn error(&self, context: &LoggingContext, args: Arguments) {
            self.push(Level::Error, context, args)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn context(name: Option<&str>, cycle: Option<u64>) -> LoggingContext {
        LoggingContext {
            processor_name: name.map(ProcessorName::from),
            cycle,
        }
    }

    #[test]
    fn empty_context_displays_nothing() {
        let ctx = context(None, None);
        assert_eq!(ctx.create_display(&LogConfig::long()).to_string(), "");
    }

    #[test]
    fn long_config_displays_all_items() {
        let ctx = context(Some("loader"), Some(3));
        assert_eq!(
            ctx.create_display(&LogConfig::long()).to_string(),
            "[PROC:loader;CYC:3] "
        );
    }

    #[test]
    fn short_config_displays_the_cycle_only() {
        let ctx = context(Some("loader"), Some(3));
        assert_eq!(
            ctx.create_display(&LogConfig::short()).to_string(),
            "[CYC:3] "
        );
    }

    #[test]
    fn logger_derives_context() {
        let collector = collecting::CollectingLogger::default();
        let logger = Logger::new(Arc::new(collector.clone()))
            .with_processor_name("loader".into())
            .with_cycle(2);

        logger.info(format_args!("hello {}", 1));

        assert_eq!(
            collector.lines(collecting::Level::Info),
            vec!["[PROC:loader;CYC:2] hello 1".to_owned()]
        );
    }
}
