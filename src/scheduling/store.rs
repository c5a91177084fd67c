use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::NaiveDate;

use super::domain::{Booking, BookingId, DriverId, UserId};

/// Storage abstraction for bookings and their per-date schedule entries, so
/// the engine and service can be exercised without a real database.
pub trait BookingStore: Send + Sync {
    fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>, StoreError>;
    fn save(&self, booking: Booking) -> Result<Booking, StoreError>;
    fn find_by_driver_and_date(
        &self,
        driver_id: DriverId,
        date: NaiveDate,
    ) -> Result<Vec<Booking>, StoreError>;
    fn find_by_driver(&self, driver_id: DriverId) -> Result<Vec<Booking>, StoreError>;
    fn find_by_user(&self, user_id: UserId) -> Result<Vec<Booking>, StoreError>;
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("booking store unavailable: {0}")]
    Unavailable(String),
}

/// Mutex-backed in-memory store used by the demo stack and tests.
#[derive(Debug, Default)]
pub struct InMemoryBookingStore {
    inner: Mutex<HashMap<BookingId, Booking>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn bookings(&self) -> std::sync::MutexGuard<'_, HashMap<BookingId, Booking>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BookingStore for InMemoryBookingStore {
    fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        Ok(self.bookings().get(&id).cloned())
    }

    fn save(&self, booking: Booking) -> Result<Booking, StoreError> {
        self.bookings().insert(booking.id, booking.clone());
        Ok(booking)
    }

    fn find_by_driver_and_date(
        &self,
        driver_id: DriverId,
        date: NaiveDate,
    ) -> Result<Vec<Booking>, StoreError> {
        let mut matches: Vec<Booking> = self
            .bookings()
            .values()
            .filter(|b| b.driver_id == Some(driver_id) && b.scheduled_date(date).is_some())
            .cloned()
            .collect();
        matches.sort_by_key(|b| b.id);
        Ok(matches)
    }

    fn find_by_driver(&self, driver_id: DriverId) -> Result<Vec<Booking>, StoreError> {
        let mut matches: Vec<Booking> = self
            .bookings()
            .values()
            .filter(|b| b.driver_id == Some(driver_id))
            .cloned()
            .collect();
        matches.sort_by_key(|b| b.id);
        Ok(matches)
    }

    fn find_by_user(&self, user_id: UserId) -> Result<Vec<Booking>, StoreError> {
        let mut matches: Vec<Booking> = self
            .bookings()
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        matches.sort_by_key(|b| b.id);
        Ok(matches)
    }
}
