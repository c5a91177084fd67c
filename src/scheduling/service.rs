use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::compat::RouteCompatibilityChecker;
use super::coordinator::{MultiDateAssignmentCoordinator, MultiDateReport};
use super::directory::{
    DirectoryError, DriverDirectory, DriverProfile, UserDirectory, UserProfile, VendorDirectory,
    VendorProfile,
};
use super::domain::{
    parse_hhmm, Booking, BookingId, CabType, DriverId, ScheduleStatus, ScheduledDate, SlotId,
    UserId, VendorId,
};
use super::engine::SlotAssignmentEngine;
use super::store::{BookingStore, StoreError};

/// Error raised by the scheduling service facade.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("booking {0} not found")]
    BookingNotFound(BookingId),
    #[error("user {0} not found")]
    UserNotFound(UserId),
    #[error("vendor {0} not found")]
    VendorNotFound(VendorId),
    #[error("driver {0} not found")]
    DriverNotFound(DriverId),
    #[error("invalid schedule request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("directory lookup failed: {0}")]
    Directory(String),
}

/// Intake payload for a new multi-date schedule.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateScheduleRequest {
    pub user_id: UserId,
    pub pickup_location: String,
    pub drop_location: String,
    pub time: String,
    #[serde(default)]
    pub return_time: Option<String>,
    #[serde(default)]
    pub shift: Option<String>,
    #[serde(default)]
    pub cab_type: Option<String>,
    pub dates: Vec<NaiveDate>,
}

/// Booking response view enriched with directory records. Enrichment is
/// best-effort: a directory fault degrades the field to null instead of
/// failing the read.
#[derive(Debug, Clone, Serialize)]
pub struct BookingView {
    pub id: BookingId,
    pub pickup_location: String,
    pub drop_location: String,
    pub time: String,
    pub return_time: Option<String>,
    pub shift: Option<String>,
    pub cab_type: Option<CabType>,
    pub scheduled_dates: Vec<ScheduledDateView>,
    pub user: Option<UserProfile>,
    pub vendor: Option<VendorProfile>,
    pub vendor_driver: Option<DriverProfile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduledDateView {
    pub date: NaiveDate,
    pub status: &'static str,
    pub slot_id: Option<SlotId>,
}

/// One slot on a driver's calendar, as shown to operations staff.
#[derive(Debug, Clone, Serialize)]
pub struct SlotView {
    pub slot_id: Option<SlotId>,
    pub date: NaiveDate,
    pub booking_count: usize,
    pub bookings: Vec<SlotBookingView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotBookingView {
    pub booking_id: BookingId,
    pub user_id: UserId,
    pub vendor_id: Option<VendorId>,
    pub driver_id: Option<DriverId>,
    pub pickup_time: String,
    pub pickup_location: String,
    pub drop_location: String,
    pub status: &'static str,
    pub user_name: Option<String>,
    pub user_phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriverSlotsView {
    pub driver_id: DriverId,
    pub slots: Vec<SlotView>,
}

/// Facade composing the booking store, directories, and the assignment
/// pipeline behind one surface for the HTTP shell and CLI.
pub struct SchedulingService {
    store: Arc<dyn BookingStore>,
    drivers: Arc<dyn DriverDirectory>,
    users: Arc<dyn UserDirectory>,
    vendors: Arc<dyn VendorDirectory>,
    coordinator: MultiDateAssignmentCoordinator,
}

static BOOKING_SEQUENCE: AtomicI64 = AtomicI64::new(1);

fn next_booking_id() -> BookingId {
    BookingId(BOOKING_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

impl SchedulingService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        drivers: Arc<dyn DriverDirectory>,
        users: Arc<dyn UserDirectory>,
        vendors: Arc<dyn VendorDirectory>,
        checker: RouteCompatibilityChecker,
    ) -> Self {
        let engine = Arc::new(SlotAssignmentEngine::new(
            store.clone(),
            drivers.clone(),
            checker,
        ));
        let coordinator = MultiDateAssignmentCoordinator::new(engine, store.clone());

        Self {
            store,
            drivers,
            users,
            vendors,
            coordinator,
        }
    }

    /// Creates a booking with one pending schedule entry per requested date.
    pub fn create_schedule(&self, request: CreateScheduleRequest) -> Result<Booking, ServiceError> {
        if request.dates.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "at least one date is required".to_string(),
            ));
        }
        if parse_hhmm(&request.time).is_err() {
            return Err(ServiceError::InvalidRequest(format!(
                "time '{}' is not HH:mm",
                request.time
            )));
        }
        let cab_type = match &request.cab_type {
            Some(raw) => Some(CabType::parse(raw).ok_or_else(|| {
                ServiceError::InvalidRequest(format!("unknown cab type '{raw}'"))
            })?),
            None => None,
        };

        match self.users.get_user(request.user_id) {
            Ok(_) => {}
            Err(DirectoryError::NotFound { .. }) => {
                return Err(ServiceError::UserNotFound(request.user_id))
            }
            Err(err) => return Err(ServiceError::Directory(err.to_string())),
        }

        let booking = Booking {
            id: next_booking_id(),
            user_id: request.user_id,
            vendor_id: None,
            driver_id: None,
            pickup_location: request.pickup_location,
            drop_location: request.drop_location,
            pickup_time: request.time,
            return_time: request.return_time,
            shift: request.shift,
            cab_type,
            scheduled_dates: request.dates.into_iter().map(ScheduledDate::pending).collect(),
        };

        let stored = self.store.save(booking)?;
        info!(booking = %stored.id, user = %stored.user_id, dates = stored.scheduled_dates.len(), "schedule created");
        Ok(stored)
    }

    /// Runs the multi-date driver assignment and returns the per-date report.
    pub fn assign_driver(&self, booking_id: BookingId, driver_id: DriverId) -> MultiDateReport {
        self.coordinator.assign_across_dates(booking_id, driver_id)
    }

    pub fn assign_vendor(
        &self,
        booking_id: BookingId,
        vendor_id: VendorId,
    ) -> Result<Booking, ServiceError> {
        let mut booking = self
            .store
            .find_by_id(booking_id)?
            .ok_or(ServiceError::BookingNotFound(booking_id))?;

        match self.vendors.get_vendor(vendor_id) {
            Ok(_) => {}
            Err(DirectoryError::NotFound { .. }) => {
                return Err(ServiceError::VendorNotFound(vendor_id))
            }
            Err(err) => return Err(ServiceError::Directory(err.to_string())),
        }

        booking.vendor_id = Some(vendor_id);
        Ok(self.store.save(booking)?)
    }

    /// Marks a user's pending schedule entries as completed once their date
    /// has passed. Returns how many entries were updated.
    pub fn complete_elapsed_dates(
        &self,
        user_id: UserId,
        today: NaiveDate,
    ) -> Result<usize, ServiceError> {
        let bookings = self.store.find_by_user(user_id)?;

        let mut updated = 0;
        for mut booking in bookings {
            let mut changed = false;
            for entry in &mut booking.scheduled_dates {
                if entry.date < today && entry.status == ScheduleStatus::Pending {
                    entry.status = ScheduleStatus::Completed;
                    changed = true;
                    updated += 1;
                }
            }
            if changed {
                self.store.save(booking)?;
            }
        }

        if updated > 0 {
            info!(user = %user_id, updated, "marked elapsed schedule entries completed");
        }
        Ok(updated)
    }

    pub fn booking_view(&self, booking_id: BookingId) -> Result<BookingView, ServiceError> {
        let booking = self
            .store
            .find_by_id(booking_id)?
            .ok_or(ServiceError::BookingNotFound(booking_id))?;
        Ok(self.enrich(booking))
    }

    pub fn bookings_for_user(&self, user_id: UserId) -> Result<Vec<BookingView>, ServiceError> {
        let bookings = self.store.find_by_user(user_id)?;
        Ok(bookings.into_iter().map(|b| self.enrich(b)).collect())
    }

    pub fn bookings_for_driver(
        &self,
        driver_id: DriverId,
    ) -> Result<Vec<BookingView>, ServiceError> {
        let bookings = self.store.find_by_driver(driver_id)?;
        Ok(bookings.into_iter().map(|b| self.enrich(b)).collect())
    }

    /// Groups a driver's bookings into slots per (slot id, date), newest date
    /// first, members ordered by pickup time.
    pub fn driver_slots(&self, driver_id: DriverId) -> Result<DriverSlotsView, ServiceError> {
        match self.drivers.get_driver(driver_id) {
            Ok(_) => {}
            Err(DirectoryError::NotFound { .. }) => {
                return Err(ServiceError::DriverNotFound(driver_id))
            }
            Err(err) => return Err(ServiceError::Directory(err.to_string())),
        }

        let bookings = self.store.find_by_driver(driver_id)?;

        let mut grouped: BTreeMap<(NaiveDate, Option<SlotId>), Vec<SlotBookingView>> =
            BTreeMap::new();
        for booking in &bookings {
            for entry in &booking.scheduled_dates {
                let key = (entry.date, entry.slot_id.clone());
                grouped
                    .entry(key)
                    .or_default()
                    .push(self.slot_booking_view(booking, entry.status.label()));
            }
        }

        let mut slots: Vec<SlotView> = grouped
            .into_iter()
            .map(|((date, slot_id), mut members)| {
                // Intake accepts single-digit hours ("9:05"), so raw strings
                // do not sort chronologically. Unparseable times sort last.
                members.sort_by(|a, b| {
                    match (parse_hhmm(&a.pickup_time), parse_hhmm(&b.pickup_time)) {
                        (Ok(left), Ok(right)) => left.cmp(&right),
                        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
                        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
                        (Err(_), Err(_)) => a.pickup_time.cmp(&b.pickup_time),
                    }
                });
                SlotView {
                    slot_id,
                    date,
                    booking_count: members.len(),
                    bookings: members,
                }
            })
            .collect();
        slots.sort_by(|a, b| b.date.cmp(&a.date));

        Ok(DriverSlotsView { driver_id, slots })
    }

    fn slot_booking_view(&self, booking: &Booking, status: &'static str) -> SlotBookingView {
        let user = self.lookup_user(booking.user_id);
        SlotBookingView {
            booking_id: booking.id,
            user_id: booking.user_id,
            vendor_id: booking.vendor_id,
            driver_id: booking.driver_id,
            pickup_time: booking.pickup_time.clone(),
            pickup_location: booking.pickup_location.clone(),
            drop_location: booking.drop_location.clone(),
            status,
            user_name: user.as_ref().map(|u| u.user_name.clone()),
            user_phone: user.as_ref().and_then(|u| u.phone.clone()),
        }
    }

    fn enrich(&self, booking: Booking) -> BookingView {
        let user = self.lookup_user(booking.user_id);
        let vendor = booking.vendor_id.and_then(|id| match self.vendors.get_vendor(id) {
            Ok(profile) => Some(profile),
            Err(err) => {
                warn!(vendor = %id, %err, "vendor enrichment skipped");
                None
            }
        });
        let vendor_driver = booking.driver_id.and_then(|id| match self.drivers.get_driver(id) {
            Ok(profile) => Some(profile),
            Err(err) => {
                warn!(driver = %id, %err, "driver enrichment skipped");
                None
            }
        });

        BookingView {
            id: booking.id,
            pickup_location: booking.pickup_location,
            drop_location: booking.drop_location,
            time: booking.pickup_time,
            return_time: booking.return_time,
            shift: booking.shift,
            cab_type: booking.cab_type,
            scheduled_dates: booking
                .scheduled_dates
                .iter()
                .map(|sd| ScheduledDateView {
                    date: sd.date,
                    status: sd.status.label(),
                    slot_id: sd.slot_id.clone(),
                })
                .collect(),
            user,
            vendor,
            vendor_driver,
        }
    }

    fn lookup_user(&self, user_id: UserId) -> Option<UserProfile> {
        match self.users.get_user(user_id) {
            Ok(profile) => Some(profile),
            Err(err) => {
                warn!(user = %user_id, %err, "user enrichment skipped");
                None
            }
        }
    }
}
