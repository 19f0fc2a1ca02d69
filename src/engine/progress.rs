// Progress/log events: the only channel from the worker to a control surface.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestEvent {
    Log {
        level: LogLevel,
        message: String,
    },
    Progress {
        current: usize,
        total: usize,
        message: String,
    },
}

/// Receives events on the worker thread. Implementations hand them over to
/// whatever thread owns the presentation layer.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: HarvestEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(HarvestEvent) + Send + Sync,
{
    fn emit(&self, event: HarvestEvent) {
        self(event)
    }
}

/// Discards every event.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: HarvestEvent) {}
}

/// Forwards events over an unbounded channel; a dropped receiver is ignored.
pub struct ChannelSink(mpsc::UnboundedSender<HarvestEvent>);

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<HarvestEvent>) -> Self {
        Self(tx)
    }

    /// Sink plus the receiving end for the control surface.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<HarvestEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: HarvestEvent) {
        let _ = self.0.send(event);
    }
}

/// Mirrors every event to `tracing` before handing it to the sink.
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn ProgressSink>,
}

impl Reporter {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self { sink }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Debug => debug!("{}", message),
            LogLevel::Info => info!("{}", message),
            LogLevel::Warning => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
        }
        self.sink.emit(HarvestEvent::Log { level, message });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    pub fn progress(&self, current: usize, total: usize, message: impl Into<String>) {
        let message = message.into();
        debug!("progress {}/{} {}", current, total, message);
        self.sink.emit(HarvestEvent::Progress {
            current,
            total,
            message,
        });
    }
}
