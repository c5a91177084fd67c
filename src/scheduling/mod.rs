//! Driver slot assignment for shared shift bookings.
//!
//! A booking names a pickup, a drop, an `HH:mm` pickup time, a cab type, and
//! one or more scheduled dates. Assigning a driver walks every scheduled date
//! and, per date, either joins an existing slot on the driver's calendar or
//! opens a new one. The engine serializes all work for one (driver, date)
//! pair so concurrent requests can never oversubscribe a slot.

pub mod compat;
pub mod coordinator;
pub mod domain;
pub mod directory;
pub mod engine;
pub mod geo;
pub mod locks;
pub mod service;
pub mod store;

pub use compat::RouteCompatibilityChecker;
pub use coordinator::{DateOutcome, MultiDateAssignmentCoordinator, MultiDateReport};
pub use domain::{Booking, BookingId, CabType, DriverId, ScheduledDate, SlotId, UserId, VendorId};
pub use engine::{AssignmentFailure, SlotAssignmentEngine};
pub use service::{CreateScheduleRequest, SchedulingService, ServiceError};
