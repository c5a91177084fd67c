//! Shared-shift cab scheduling: books ride requests onto drivers who serve
//! multiple passengers per shift slot, under capacity, timing, and
//! route-compatibility constraints.

pub mod config;
pub mod error;
pub mod scheduling;
pub mod server;
pub mod telemetry;
