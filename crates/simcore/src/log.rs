//! Logging facilities.
//!
//! Component messages are written through the `log` facade with the component name as the target
//! and look like `[12.500 DEBUG datacenter] message`.

use atty::Stream;
use colored::{Color, ColoredString, Colorize};
use log::Level;
use serde_json::json;
use serde_type_name::type_name;

use crate::event::Event;

/// Colors the string if stderr is a terminal.
pub fn paint(s: &str, color: Color) -> ColoredString {
    if atty::is(Stream::Stderr) {
        s.color(color)
    } else {
        s.normal()
    }
}

/// Returns the fixed-width colored label of the level.
pub fn level_label(level: Level) -> ColoredString {
    let (label, color) = match level {
        Level::Error => ("ERROR", Color::Red),
        Level::Warn => ("WARN ", Color::Yellow),
        Level::Info => ("INFO ", Color::Green),
        Level::Debug => ("DEBUG", Color::Blue),
        Level::Trace => ("TRACE", Color::Cyan),
    };
    paint(label, color)
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log_from_ctx {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {
        $crate::__log::log!(
            target: $ctx.name(),
            $level,
            "[{:.3} {} {}] {}",
            $ctx.time(),
            $crate::log::level_label($level),
            $ctx.name(),
            format_args!($($arg)+)
        )
    };
}

/// Logs a message at the info level on behalf of the context owner.
///
/// ```rust
/// use simcore::{log_info, Simulation};
///
/// let mut sim = Simulation::new(123);
/// let ctx = sim.create_context("comp");
/// log_info!(ctx, "started with {} workers", 4);
/// ```
#[macro_export]
macro_rules! log_info {
    ($ctx:expr, $($arg:tt)+) => ($crate::__log_from_ctx!($crate::__log::Level::Info, $ctx, $($arg)+));
}

/// Logs a message at the debug level, see [`log_info!`](crate::log_info!).
#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $($arg:tt)+) => ($crate::__log_from_ctx!($crate::__log::Level::Debug, $ctx, $($arg)+));
}

/// Logs a message at the trace level, see [`log_info!`](crate::log_info!).
#[macro_export]
macro_rules! log_trace {
    ($ctx:expr, $($arg:tt)+) => ($crate::__log_from_ctx!($crate::__log::Level::Trace, $ctx, $($arg)+));
}

/// Logs a message at the warn level, see [`log_info!`](crate::log_info!).
#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $($arg:tt)+) => ($crate::__log_from_ctx!($crate::__log::Level::Warn, $ctx, $($arg)+));
}

/// Logs a message at the error level, see [`log_info!`](crate::log_info!).
#[macro_export]
macro_rules! log_error {
    ($ctx:expr, $($arg:tt)+) => ($crate::__log_from_ctx!($crate::__log::Level::Error, $ctx, $($arg)+));
}

/// Problems with events detected by the simulation itself.
pub(crate) enum EventIssue<'a> {
    /// Destination component did not match the event type.
    Unhandled,
    /// Destination component has no handler.
    Undelivered,
    /// Event was rejected when scheduled.
    Incorrect(&'a str),
}

pub(crate) fn report_event(issue: EventIssue, event: &Event) {
    let what = match issue {
        EventIssue::Unhandled => "Unhandled event".to_string(),
        EventIssue::Undelivered => "Undelivered event".to_string(),
        EventIssue::Incorrect(reason) => format!("Incorrect event ({})", reason),
    };
    log::error!(
        target: "simulation",
        "[{:.3} {} simulation] {}: {}",
        event.time,
        level_label(Level::Error),
        what,
        json!({
            "type": type_name(&event.data).unwrap_or("unknown"),
            "data": event.data,
            "src": event.src,
            "dst": event.dst,
        })
    );
}

/// Logs an event which the handler does not know, used by [`cast!`](crate::cast!).
pub fn log_unhandled_event(event: Event) {
    report_event(EventIssue::Unhandled, &event);
}
