//! Event handling.

use crate::event::Event;

/// Trait for consuming events in simulation components.
pub trait EventHandler {
    /// Processes event.
    fn on(&mut self, event: Event);
}

/// Enables the use of pattern matching syntax for processing different types of events
/// by downcasting the event payload from [`EventData`](crate::event::EventData) to user-defined types.
///
/// Match arms need not be exhaustive. If the event payload does not match any of specified arms,
/// the macro logs the event as unhandled under `ERROR` level.
///
/// # Examples
///
/// ```rust
/// use serde::Serialize;
/// use simcore::{cast, Event, EventHandler, SimulationContext};
///
/// #[derive(Clone, Serialize)]
/// pub struct Start {
///     delay: f64,
/// }
///
/// #[derive(Clone, Serialize)]
/// pub struct Stop {}
///
/// pub struct Component {
///     running: bool,
///     ctx: SimulationContext,
/// }
///
/// impl EventHandler for Component {
///     fn on(&mut self, event: Event) {
///         cast!(match event.data {
///             Start { delay } => {
///                 self.running = true;
///                 self.ctx.emit_self(Stop {}, delay);
///             }
///             Stop {} => {
///                 self.running = false;
///             }
///         })
///     }
/// }
/// ```
#[macro_export]
macro_rules! cast {
    ( match $event:ident.data { $( $type:ident { $($tt:tt)* } => { $($expr:tt)* } )+ } ) => {
        $(
            if $event.data.is::<$type>() {
                if let Ok(__value) = $event.data.downcast::<$type>() {
                    let $type { $($tt)* } = *__value;
                    $($expr)*
                }
            } else
        )*
        {
            $crate::log::log_unhandled_event($event);
        }
    }
}
