use anyhow::Result;
use log::{LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;
use std::sync::OnceLock;

use crate::ringlog::RingLog;

static LOGGER: OnceLock<TeeLogger> = OnceLock::new();

struct RingSink {
    tag: &'static str,
    log: Mutex<RingLog>,
}

/// Console logging from `RUST_LOG`, plus the ring log once a service attaches it.
struct TeeLogger {
    console: Box<dyn Log>,
    ring: OnceLock<RingSink>,
}

impl Log for TeeLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.console.enabled(metadata)
            || (self.ring.get().is_some() && metadata.level() <= LevelFilter::Info)
    }

    fn log(&self, record: &Record) {
        if self.console.enabled(record.metadata()) {
            self.console.log(record);
        }

        let Some(sink) = self.ring.get() else {
            return;
        };
        if record.level() > LevelFilter::Info {
            return;
        }

        let line = format!("[{}] {}", sink.tag, record.args());
        // Nowhere left to report a failing log write.
        let _ = sink.log.lock().append(&line);
    }

    fn flush(&self) {
        self.console.flush();
    }
}

pub fn init() {
    let console = pretty_env_logger::formatted_builder()
        .parse_default_env()
        .build();
    let level = console.filter();

    let logger = LOGGER.get_or_init(|| TeeLogger {
        console: Box::new(console),
        ring: OnceLock::new(),
    });

    if log::set_logger(logger).is_ok() {
        log::set_max_level(level);
    }
}

/// Mirrors `info` and more severe records into `log`, prefixed with `[tag]`.
pub fn attach_ring(log: RingLog, tag: &'static str) -> Result<()> {
    let Some(logger) = LOGGER.get() else {
        anyhow::bail!("Logging is not initialized");
    };

    let path = log.path().display().to_string();
    if logger
        .ring
        .set(RingSink {
            tag,
            log: Mutex::new(log),
        })
        .is_err()
    {
        anyhow::bail!("A ring log is already attached");
    }

    log::set_max_level(log::max_level().max(LevelFilter::Info));
    log::debug!("Logging to {path}");

    Ok(())
}
