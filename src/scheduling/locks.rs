use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDate;

use super::domain::DriverId;

/// Registry of mutexes scoped to one `(driver, date)` pair.
///
/// Slot membership, capacity, and slot-id generation are a read-modify-write
/// over the scheduled dates of a single driver on a single date; two
/// concurrent assignments for the same pair must serialize or both can
/// observe the same free seat. The scope is deliberately exact: one lock per
/// driver per date, never a global lock and never per booking row.
///
/// Entries are never removed; like slots themselves, stale entries are
/// logical garbage, not physical.
#[derive(Debug, Default)]
pub struct DriverDateLocks {
    cells: Mutex<HashMap<(DriverId, NaiveDate), Arc<Mutex<()>>>>,
}

impl DriverDateLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the mutex for the pair, creating it on first use. The caller
    /// locks the returned cell for the whole read-group-pick-validate-write
    /// sequence of one assignment.
    pub fn cell(&self, driver_id: DriverId, date: NaiveDate) -> Arc<Mutex<()>> {
        self.cells
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((driver_id, date))
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_pair_shares_a_cell() {
        let locks = DriverDateLocks::new();
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid date");
        let a = locks.cell(DriverId(1), date);
        let b = locks.cell(DriverId(1), date);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn different_drivers_and_dates_do_not_contend() {
        let locks = DriverDateLocks::new();
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid date");
        let later = NaiveDate::from_ymd_opt(2024, 6, 2).expect("valid date");

        let a = locks.cell(DriverId(1), date);
        let b = locks.cell(DriverId(2), date);
        let c = locks.cell(DriverId(1), later);
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));

        // Holding one cell must not block acquiring the others.
        let _guard = a.lock().expect("lock");
        assert!(b.try_lock().is_ok());
        assert!(c.try_lock().is_ok());
    }
}
