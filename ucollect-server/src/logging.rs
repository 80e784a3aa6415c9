//! Tracing setup for the `ucollect` binary: a console formatter always on,
//! plus an optional syslog sink (spec.md §1's "Syslog/console logging"
//! external collaborator) enabled with `--syslog`, standing in for the
//! original's `ulog`/`syslog(3)` leveled logger in `src/core/util.c`.

use std::fmt::Write as _;
use std::sync::Mutex;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer};

/// A boxed, already-type-erased sink so this module never has to name
/// `syslog::Logger`'s backend/formatter generic parameters.
type SyslogSink = Box<dyn FnMut(Level, &str) + Send>;

struct SyslogLayer {
    sink: Mutex<SyslogSink>,
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.message, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.message, " {}={value:?}", field.name());
        }
    }
}

impl<S> Layer<S> for SyslogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let mut sink = self.sink.lock().expect("syslog sink mutex poisoned");
        sink(*event.metadata().level(), &visitor.message);
    }
}

fn connect_syslog() -> anyhow::Result<SyslogSink> {
    let formatter = syslog::Formatter3164 {
        facility: syslog::Facility::LOG_DAEMON,
        hostname: None,
        process: "ucollect".to_string(),
        pid: std::process::id() as i32,
    };
    let mut logger = syslog::unix(formatter)?;
    Ok(Box::new(move |level, message| {
        let result = match level {
            Level::ERROR => logger.err(message),
            Level::WARN => logger.warning(message),
            Level::INFO => logger.info(message),
            Level::DEBUG | Level::TRACE => logger.debug(message),
        };
        if let Err(e) = result {
            eprintln!("syslog write failed: {e}");
        }
    }))
}

/// Install the console (and optionally syslog) tracing subscriber. Must be
/// called at most once, before the first `tracing` event is emitted.
pub fn install(log_level: &str, use_syslog: bool) -> anyhow::Result<()> {
    use tracing_subscriber::prelude::*;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);

    if use_syslog {
        let sink = connect_syslog()?;
        let syslog_layer = SyslogLayer { sink: Mutex::new(sink) };
        tracing_subscriber::registry().with(env_filter).with(fmt_layer).with(syslog_layer).init();
    } else {
        tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
    }
    Ok(())
}
