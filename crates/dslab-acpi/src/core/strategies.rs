//! Strategy implementations.

pub mod adaptive;
pub mod greedy;
pub mod timeout;
