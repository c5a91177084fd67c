use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::Serialize;
use tracing::{debug, info};

use super::compat::RouteCompatibilityChecker;
use super::directory::{DirectoryError, DriverDirectory};
use super::domain::{
    parse_hhmm, serialize_hhmm, Booking, BookingId, CabType, DriverId, SlotId, SlotSnapshot,
    SLOT_JOIN_GAP_MINUTES,
};
use super::locks::DriverDateLocks;
use super::store::BookingStore;

/// Closed set of reasons one (booking, driver, date) assignment can fail.
///
/// Business rejections carry the structured fields callers need to render
/// suggestions; nothing is ever recovered by parsing a message string.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssignmentFailure {
    #[error("booking has no cab type set")]
    MissingCabType,
    #[error("driver {driver_id} not found")]
    DriverNotFound { driver_id: DriverId },
    #[error("invalid pickup time '{raw}', expected HH:mm")]
    InvalidTime { raw: String },
    #[error("pickup {requested} falls inside the 20-minute window after slot start {slot_start}; next available {next_available}")]
    TimeGapViolation {
        #[serde(serialize_with = "serialize_hhmm")]
        slot_start: NaiveTime,
        #[serde(serialize_with = "serialize_hhmm")]
        requested: NaiveTime,
        #[serde(serialize_with = "serialize_hhmm")]
        next_available: NaiveTime,
    },
    #[error("slot requires {required}, but booking has {requested}")]
    CabTypeMismatch {
        required: CabType,
        requested: CabType,
    },
    #[error("slot {slot_id} is at capacity ({capacity} seats)")]
    SlotCapacityExceeded { slot_id: SlotId, capacity: u32 },
    #[error("route overlaps with existing booking {conflicting_booking_id} ({existing_route})")]
    RouteOverlap {
        conflicting_booking_id: BookingId,
        existing_route: String,
    },
    #[error("booking {booking_id} not found")]
    BookingNotFound { booking_id: BookingId },
    #[error("unexpected assignment fault: {detail}")]
    Unexpected { detail: String },
}

/// Assigns one booking to a driver's slot on one date.
///
/// Per call: fetch the driver's other bookings for the date, group them by
/// the slot id on that date's schedule entry, pick the active slot, then gate
/// the join on the time-gap, cab-type, capacity, and route-overlap rules in
/// that order. No active slot (or no existing bookings at all) opens a new
/// slot instead. The whole sequence runs under the `(driver, date)` lock.
pub struct SlotAssignmentEngine {
    store: Arc<dyn BookingStore>,
    drivers: Arc<dyn DriverDirectory>,
    checker: RouteCompatibilityChecker,
    locks: DriverDateLocks,
}

static SLOT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_slot_id(driver_id: DriverId, date: NaiveDate, time: NaiveTime) -> SlotId {
    // Epoch millis keep ids readable; the sequence keeps them unique even
    // when two slots open within the same millisecond.
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    let seq = SLOT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    SlotId(format!(
        "SLOT_{}_{}_{}_{}-{}",
        driver_id,
        date.format("%Y%m%d"),
        time.format("%H%M"),
        millis,
        seq
    ))
}

impl SlotAssignmentEngine {
    pub fn new(
        store: Arc<dyn BookingStore>,
        drivers: Arc<dyn DriverDirectory>,
        checker: RouteCompatibilityChecker,
    ) -> Self {
        Self {
            store,
            drivers,
            checker,
            locks: DriverDateLocks::new(),
        }
    }

    /// Assigns `booking_id` to `driver_id` on `date`, returning the updated
    /// booking or the first rule that blocked it.
    pub fn assign(
        &self,
        booking_id: BookingId,
        driver_id: DriverId,
        date: NaiveDate,
    ) -> Result<Booking, AssignmentFailure> {
        let cell = self.locks.cell(driver_id, date);
        let _guard = cell.lock().unwrap_or_else(PoisonError::into_inner);

        let booking = self
            .store
            .find_by_id(booking_id)
            .map_err(|err| AssignmentFailure::Unexpected {
                detail: err.to_string(),
            })?
            .ok_or(AssignmentFailure::BookingNotFound { booking_id })?;

        let cab_type = booking.cab_type.ok_or(AssignmentFailure::MissingCabType)?;

        match self.drivers.get_driver(driver_id) {
            Ok(_) => {}
            Err(DirectoryError::NotFound { .. }) => {
                return Err(AssignmentFailure::DriverNotFound { driver_id })
            }
            Err(err) => {
                return Err(AssignmentFailure::Unexpected {
                    detail: err.to_string(),
                })
            }
        }

        let new_time =
            parse_hhmm(&booking.pickup_time).map_err(|_| AssignmentFailure::InvalidTime {
                raw: booking.pickup_time.clone(),
            })?;

        let others: Vec<Booking> = self
            .store
            .find_by_driver_and_date(driver_id, date)
            .map_err(|err| AssignmentFailure::Unexpected {
                detail: err.to_string(),
            })?
            .into_iter()
            .filter(|other| other.id != booking.id)
            .collect();

        debug!(%booking_id, %driver_id, %date, existing = others.len(), "evaluating assignment");

        if others.is_empty() {
            return self.open_new_slot(booking, driver_id, date, new_time);
        }

        let Some(active) = pick_active_slot(&others, date, new_time) else {
            debug!(%driver_id, %date, pickup = %booking.pickup_time, "no active slot, opening a new one");
            return self.open_new_slot(booking, driver_id, date, new_time);
        };

        self.join_slot(booking, driver_id, date, new_time, cab_type, active)
    }

    fn join_slot(
        &self,
        booking: Booking,
        driver_id: DriverId,
        date: NaiveDate,
        new_time: NaiveTime,
        cab_type: CabType,
        active: ActiveSlot,
    ) -> Result<Booking, AssignmentFailure> {
        debug!(
            slot = %active.snapshot.slot_id,
            start = %active.start.format("%H:%M"),
            end = %active.end.format("%H:%M"),
            members = active.snapshot.members.len(),
            "joining candidate slot"
        );

        // Gap rule: the interval (start, start + gap) is closed to joins;
        // both boundaries are allowed.
        let next_available = active.start + Duration::minutes(SLOT_JOIN_GAP_MINUTES);
        if new_time > active.start && new_time < next_available {
            return Err(AssignmentFailure::TimeGapViolation {
                slot_start: active.start,
                requested: new_time,
                next_available,
            });
        }

        if let Some(required) = active
            .snapshot
            .members
            .iter()
            .find_map(|member| member.cab_type)
        {
            if required != cab_type {
                return Err(AssignmentFailure::CabTypeMismatch {
                    required,
                    requested: cab_type,
                });
            }
        }

        let capacity = cab_type.seat_capacity();
        if active.snapshot.members.len() as u32 >= capacity {
            return Err(AssignmentFailure::SlotCapacityExceeded {
                slot_id: active.snapshot.slot_id.clone(),
                capacity,
            });
        }

        for member in &active.snapshot.members {
            let shareable = self.checker.compatible(
                &member.pickup_location,
                &member.drop_location,
                &booking.pickup_location,
                &booking.drop_location,
            );
            if !shareable {
                return Err(AssignmentFailure::RouteOverlap {
                    conflicting_booking_id: member.id,
                    existing_route: member.route_description(),
                });
            }
        }

        let seats_used = active.snapshot.members.len() + 1;
        info!(
            booking = %booking.id,
            slot = %active.snapshot.slot_id,
            %driver_id,
            %date,
            seats = %format_args!("{seats_used}/{capacity}"),
            "joined existing slot"
        );
        self.commit(booking, driver_id, date, active.snapshot.slot_id)
    }

    fn open_new_slot(
        &self,
        booking: Booking,
        driver_id: DriverId,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Booking, AssignmentFailure> {
        let slot_id = next_slot_id(driver_id, date, time);
        info!(booking = %booking.id, slot = %slot_id, %driver_id, %date, "opened new slot");
        self.commit(booking, driver_id, date, slot_id)
    }

    fn commit(
        &self,
        mut booking: Booking,
        driver_id: DriverId,
        date: NaiveDate,
        slot_id: SlotId,
    ) -> Result<Booking, AssignmentFailure> {
        let booking_id = booking.id;
        let entry = booking
            .scheduled_date_mut(date)
            .ok_or_else(|| AssignmentFailure::Unexpected {
                detail: format!("booking {booking_id} has no schedule entry for {date}"),
            })?;
        entry.slot_id = Some(slot_id);
        booking.driver_id = Some(driver_id);

        self.store
            .save(booking)
            .map_err(|err| AssignmentFailure::Unexpected {
                detail: err.to_string(),
            })
    }
}

struct ActiveSlot {
    snapshot: SlotSnapshot,
    start: NaiveTime,
    end: NaiveTime,
}

/// Groups the driver's other bookings by the slot id recorded on their
/// schedule entry for `date`. Entries without a slot id never form a group.
fn group_by_slot(others: &[Booking], date: NaiveDate) -> BTreeMap<SlotId, Vec<Booking>> {
    let mut groups: BTreeMap<SlotId, Vec<Booking>> = BTreeMap::new();
    for booking in others {
        if let Some(slot_id) = booking.slot_id_on(date) {
            groups
                .entry(slot_id.clone())
                .or_default()
                .push(booking.clone());
        }
    }
    groups
}

/// Picks the first slot, in ascending start-time order, whose derived end is
/// not strictly before the new booking's pickup. Slots whose window cannot be
/// derived (no parseable member time) are skipped.
fn pick_active_slot(others: &[Booking], date: NaiveDate, new_time: NaiveTime) -> Option<ActiveSlot> {
    let mut candidates: Vec<ActiveSlot> = group_by_slot(others, date)
        .into_iter()
        .filter_map(|(slot_id, members)| {
            let snapshot = SlotSnapshot { slot_id, members };
            let start = snapshot.start()?;
            let end = snapshot.end()?;
            Some(ActiveSlot {
                snapshot,
                start,
                end,
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| a.snapshot.slot_id.cmp(&b.snapshot.slot_id))
    });

    candidates.into_iter().find(|slot| slot.end >= new_time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduling::domain::{ScheduledDate, UserId, VendorId};

    fn member(id: i64, date: NaiveDate, slot: Option<&str>, time: &str) -> Booking {
        Booking {
            id: BookingId(id),
            user_id: UserId(1),
            vendor_id: None::<VendorId>,
            driver_id: Some(DriverId(4)),
            pickup_location: "Kothrud".to_string(),
            drop_location: "Viman Nagar".to_string(),
            pickup_time: time.to_string(),
            return_time: None,
            shift: None,
            cab_type: Some(CabType::Sedan),
            scheduled_dates: vec![ScheduledDate {
                date,
                status: crate::scheduling::domain::ScheduleStatus::Pending,
                slot_id: slot.map(|s| SlotId(s.to_string())),
            }],
        }
    }

    #[test]
    fn grouping_ignores_unslotted_entries() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid date");
        let others = vec![
            member(1, date, Some("SLOT_A"), "09:00"),
            member(2, date, None, "09:30"),
            member(3, date, Some("SLOT_A"), "10:00"),
        ];
        let groups = group_by_slot(&others, date);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[&SlotId("SLOT_A".to_string())].len(), 2);
    }

    #[test]
    fn expired_slot_is_skipped() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid date");
        let others = vec![member(1, date, Some("SLOT_A"), "09:00")];

        // End is 10:30; a pickup strictly after that finds nothing.
        let at_end = parse_hhmm("10:30").expect("valid time");
        assert!(pick_active_slot(&others, date, at_end).is_some());

        let past_end = parse_hhmm("10:31").expect("valid time");
        assert!(pick_active_slot(&others, date, past_end).is_none());
    }

    #[test]
    fn earliest_start_wins_among_open_slots() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid date");
        let others = vec![
            member(1, date, Some("SLOT_LATE"), "11:00"),
            member(2, date, Some("SLOT_EARLY"), "09:00"),
        ];
        let picked = pick_active_slot(&others, date, parse_hhmm("09:30").expect("valid time"))
            .expect("an open slot");
        assert_eq!(picked.snapshot.slot_id, SlotId("SLOT_EARLY".to_string()));
    }

    #[test]
    fn slot_ids_are_unique_per_call() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid date");
        let time = parse_hhmm("09:00").expect("valid time");
        let a = next_slot_id(DriverId(4), date, time);
        let b = next_slot_id(DriverId(4), date, time);
        assert_ne!(a, b);
        assert!(a.0.starts_with("SLOT_4_20240601_0900_"));
    }
}
