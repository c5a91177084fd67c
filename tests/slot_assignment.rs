use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use chrono::NaiveDate;
use shiftpool::scheduling::directory::{DriverProfile, InMemoryDirectory};
use shiftpool::scheduling::geo::{DistanceProvider, GeoError};
use shiftpool::scheduling::store::{BookingStore, InMemoryBookingStore};
use shiftpool::scheduling::{
    AssignmentFailure, Booking, BookingId, CabType, DriverId, RouteCompatibilityChecker,
    ScheduledDate, SlotAssignmentEngine, UserId,
};

const DRIVER: DriverId = DriverId(7);

/// Places addresses on a straight line; road distance is the position gap in
/// kilometres and geocoding returns the position as longitude. Keeping every
/// route pointed the same way makes compatibility depend only on the spacing
/// each test sets up.
struct LineProvider {
    positions: HashMap<String, f64>,
}

impl LineProvider {
    fn with_positions(pairs: &[(&str, f64)]) -> Self {
        Self {
            positions: pairs
                .iter()
                .map(|(name, pos)| (name.to_string(), *pos))
                .collect(),
        }
    }

    fn position(&self, place: &str) -> Result<f64, GeoError> {
        self.positions
            .get(place)
            .copied()
            .ok_or_else(|| GeoError::NoResult {
                address: place.to_string(),
            })
    }
}

impl DistanceProvider for LineProvider {
    fn road_distance(&self, origin: &str, destination: &str) -> Result<f64, GeoError> {
        let a = self.position(origin)?;
        let b = self.position(destination)?;
        Ok((a - b).abs() * 1000.0)
    }

    fn geocode(&self, address: &str) -> Result<(f64, f64), GeoError> {
        Ok((0.0, self.position(address)?))
    }
}

struct Fixture {
    store: Arc<InMemoryBookingStore>,
    engine: Arc<SlotAssignmentEngine>,
}

fn fixture(provider: LineProvider) -> Fixture {
    let store = Arc::new(InMemoryBookingStore::new());
    let directory = Arc::new(InMemoryDirectory::new());
    directory.insert_driver(DriverProfile {
        driver_id: DRIVER,
        driver_name: "Prakash More".to_string(),
        contact_no: None,
        alt_contact_no: None,
    });
    let engine = Arc::new(SlotAssignmentEngine::new(
        store.clone(),
        directory,
        RouteCompatibilityChecker::new(Arc::new(provider)),
    ));
    Fixture { store, engine }
}

/// Pickups clustered around position 1 and drops around position 9 are
/// pairwise compatible in either direction.
fn corridor_provider() -> LineProvider {
    LineProvider::with_positions(&[
        ("P0", 1.0),
        ("P1", 1.1),
        ("P2", 1.2),
        ("P3", 1.3),
        ("P4", 1.4),
        ("P5", 1.5),
        ("D0", 9.0),
        ("D1", 9.1),
        ("D2", 9.2),
        ("D3", 9.3),
        ("D4", 9.4),
        ("D5", 9.5),
        ("REVERSE_P", 8.0),
        ("REVERSE_D", 2.0),
    ])
}

fn test_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 9, 14).expect("valid date")
}

fn hhmm(raw: &str) -> chrono::NaiveTime {
    chrono::NaiveTime::parse_from_str(raw, "%H:%M").expect("valid time")
}

fn booking(
    id: i64,
    pickup: &str,
    drop: &str,
    time: &str,
    cab_type: Option<CabType>,
) -> Booking {
    Booking {
        id: BookingId(id),
        user_id: UserId(id),
        vendor_id: None,
        driver_id: None,
        pickup_location: pickup.to_string(),
        drop_location: drop.to_string(),
        pickup_time: time.to_string(),
        return_time: None,
        shift: None,
        cab_type,
        scheduled_dates: vec![ScheduledDate::pending(test_date())],
    }
}

fn seed(fixture: &Fixture, booking: Booking) -> BookingId {
    let id = booking.id;
    fixture.store.save(booking).expect("seed booking");
    id
}

fn assigned_slot(booking: &Booking) -> String {
    booking
        .slot_id_on(test_date())
        .expect("slot recorded on the scheduled date")
        .0
        .clone()
}

#[test]
fn first_booking_opens_a_new_slot() {
    let fx = fixture(corridor_provider());
    let id = seed(&fx, booking(1, "P0", "D0", "09:00", Some(CabType::Sedan)));

    let assigned = fx.engine.assign(id, DRIVER, test_date()).expect("assigned");

    assert_eq!(assigned.driver_id, Some(DRIVER));
    assert!(assigned_slot(&assigned).starts_with("SLOT_7_20260914_0900_"));
}

#[test]
fn compatible_booking_joins_the_open_slot() {
    let fx = fixture(corridor_provider());
    let opener = seed(&fx, booking(1, "P0", "D0", "09:00", Some(CabType::Sedan)));
    let joiner = seed(&fx, booking(2, "P1", "D1", "09:25", Some(CabType::Sedan)));

    let opened = fx
        .engine
        .assign(opener, DRIVER, test_date())
        .expect("opener assigned");
    let joined = fx
        .engine
        .assign(joiner, DRIVER, test_date())
        .expect("joiner assigned");

    assert_eq!(assigned_slot(&joined), assigned_slot(&opened));
}

#[test]
fn gap_window_boundaries_are_open_but_interior_is_closed() {
    let fx = fixture(corridor_provider());
    let opener = seed(&fx, booking(1, "P0", "D0", "09:00", Some(CabType::Sedan)));
    fx.engine
        .assign(opener, DRIVER, test_date())
        .expect("opener assigned");

    // Exactly at the slot start is allowed.
    let at_start = seed(&fx, booking(2, "P1", "D1", "09:00", Some(CabType::Sedan)));
    fx.engine
        .assign(at_start, DRIVER, test_date())
        .expect("pickup at slot start joins");

    // Inside the window is the one rejected band.
    let inside = seed(&fx, booking(3, "P2", "D2", "09:19", Some(CabType::Sedan)));
    let failure = fx
        .engine
        .assign(inside, DRIVER, test_date())
        .expect_err("pickup inside the gap window is rejected");
    assert_eq!(
        failure,
        AssignmentFailure::TimeGapViolation {
            slot_start: hhmm("09:00"),
            requested: hhmm("09:19"),
            next_available: hhmm("09:20"),
        }
    );

    // Exactly at start + gap is allowed again.
    let at_gap_end = seed(&fx, booking(4, "P3", "D3", "09:20", Some(CabType::Sedan)));
    fx.engine
        .assign(at_gap_end, DRIVER, test_date())
        .expect("pickup at the gap boundary joins");
}

#[test]
fn sedan_slot_rejects_a_fourth_rider() {
    let fx = fixture(corridor_provider());
    let times = ["09:00", "09:25", "09:30"];
    let mut slot = None;
    for (idx, time) in times.iter().enumerate() {
        let pickup = format!("P{idx}");
        let drop = format!("D{idx}");
        let id = seed(
            &fx,
            booking(idx as i64 + 1, &pickup, &drop, time, Some(CabType::Sedan)),
        );
        let assigned = fx.engine.assign(id, DRIVER, test_date()).expect("assigned");
        slot = Some(assigned_slot(&assigned));
    }

    let overflow = seed(&fx, booking(4, "P3", "D3", "09:35", Some(CabType::Sedan)));
    let failure = fx
        .engine
        .assign(overflow, DRIVER, test_date())
        .expect_err("fourth sedan rider is rejected");

    match failure {
        AssignmentFailure::SlotCapacityExceeded { slot_id, capacity } => {
            assert_eq!(Some(slot_id.0), slot);
            assert_eq!(capacity, 3);
        }
        other => panic!("expected capacity rejection, got {other:?}"),
    }
}

#[test]
fn suv_slot_seats_four() {
    let fx = fixture(corridor_provider());
    let times = ["09:00", "09:20", "09:25", "09:30"];
    for (idx, time) in times.iter().enumerate() {
        let pickup = format!("P{idx}");
        let drop = format!("D{idx}");
        let id = seed(
            &fx,
            booking(idx as i64 + 1, &pickup, &drop, time, Some(CabType::Suv)),
        );
        fx.engine
            .assign(id, DRIVER, test_date())
            .expect("SUV seats four riders");
    }

    let overflow = seed(&fx, booking(5, "P4", "D4", "09:35", Some(CabType::Suv)));
    let failure = fx
        .engine
        .assign(overflow, DRIVER, test_date())
        .expect_err("fifth SUV rider is rejected");
    assert!(matches!(
        failure,
        AssignmentFailure::SlotCapacityExceeded { capacity: 4, .. }
    ));
}

#[test]
fn cab_type_must_match_the_slot() {
    let fx = fixture(corridor_provider());
    let opener = seed(&fx, booking(1, "P0", "D0", "09:00", Some(CabType::Sedan)));
    fx.engine
        .assign(opener, DRIVER, test_date())
        .expect("opener assigned");

    let suv = seed(&fx, booking(2, "P1", "D1", "09:25", Some(CabType::Suv)));
    let failure = fx
        .engine
        .assign(suv, DRIVER, test_date())
        .expect_err("SUV cannot join a sedan slot");
    assert_eq!(
        failure,
        AssignmentFailure::CabTypeMismatch {
            required: CabType::Sedan,
            requested: CabType::Suv,
        }
    );
}

#[test]
fn opposite_direction_route_is_rejected_with_the_conflict() {
    let fx = fixture(corridor_provider());
    let opener = seed(&fx, booking(1, "P0", "D0", "09:00", Some(CabType::Sedan)));
    fx.engine
        .assign(opener, DRIVER, test_date())
        .expect("opener assigned");

    let reverse = seed(
        &fx,
        booking(2, "REVERSE_P", "REVERSE_D", "09:25", Some(CabType::Sedan)),
    );
    let failure = fx
        .engine
        .assign(reverse, DRIVER, test_date())
        .expect_err("reverse commute cannot share the slot");
    assert_eq!(
        failure,
        AssignmentFailure::RouteOverlap {
            conflicting_booking_id: BookingId(1),
            existing_route: "P0 to D0".to_string(),
        }
    );
}

#[test]
fn unknown_address_is_treated_as_incompatible() {
    let fx = fixture(corridor_provider());
    let opener = seed(&fx, booking(1, "P0", "D0", "09:00", Some(CabType::Sedan)));
    fx.engine
        .assign(opener, DRIVER, test_date())
        .expect("opener assigned");

    let unmapped = seed(
        &fx,
        booking(2, "Nowhere Lane", "D1", "09:25", Some(CabType::Sedan)),
    );
    let failure = fx
        .engine
        .assign(unmapped, DRIVER, test_date())
        .expect_err("missing distance data blocks the join");
    assert!(matches!(failure, AssignmentFailure::RouteOverlap { .. }));
}

#[test]
fn pickup_after_slot_expiry_opens_a_second_slot() {
    let fx = fixture(corridor_provider());
    let opener = seed(&fx, booking(1, "P0", "D0", "08:00", Some(CabType::Sedan)));
    let opened = fx
        .engine
        .assign(opener, DRIVER, test_date())
        .expect("opener assigned");

    // The first slot closes 90 minutes after its latest pickup, at 09:30.
    let late = seed(&fx, booking(2, "P1", "D1", "09:31", Some(CabType::Sedan)));
    let assigned = fx
        .engine
        .assign(late, DRIVER, test_date())
        .expect("late pickup gets a fresh slot");

    assert_ne!(assigned_slot(&assigned), assigned_slot(&opened));
}

#[test]
fn reassignment_does_not_conflict_with_itself() {
    let fx = fixture(corridor_provider());
    let id = seed(&fx, booking(1, "P0", "D0", "09:05", Some(CabType::Sedan)));

    fx.engine
        .assign(id, DRIVER, test_date())
        .expect("first assignment");
    // A second run must not trip the gap rule against the booking's own slot.
    fx.engine
        .assign(id, DRIVER, test_date())
        .expect("reassignment succeeds");
}

#[test]
fn booking_without_cab_type_is_rejected() {
    let fx = fixture(corridor_provider());
    let id = seed(&fx, booking(1, "P0", "D0", "09:00", None));

    let failure = fx
        .engine
        .assign(id, DRIVER, test_date())
        .expect_err("cab type is required");
    assert_eq!(failure, AssignmentFailure::MissingCabType);
}

#[test]
fn malformed_pickup_time_is_rejected() {
    let fx = fixture(corridor_provider());
    let id = seed(&fx, booking(1, "P0", "D0", "quarter past", Some(CabType::Sedan)));

    let failure = fx
        .engine
        .assign(id, DRIVER, test_date())
        .expect_err("time must be HH:mm");
    assert_eq!(
        failure,
        AssignmentFailure::InvalidTime {
            raw: "quarter past".to_string(),
        }
    );
}

#[test]
fn unknown_driver_is_rejected() {
    let fx = fixture(corridor_provider());
    let id = seed(&fx, booking(1, "P0", "D0", "09:00", Some(CabType::Sedan)));

    let failure = fx
        .engine
        .assign(id, DriverId(999), test_date())
        .expect_err("driver must exist");
    assert_eq!(
        failure,
        AssignmentFailure::DriverNotFound {
            driver_id: DriverId(999),
        }
    );
}

#[test]
fn unknown_booking_is_rejected() {
    let fx = fixture(corridor_provider());

    let failure = fx
        .engine
        .assign(BookingId(404), DRIVER, test_date())
        .expect_err("booking must exist");
    assert_eq!(
        failure,
        AssignmentFailure::BookingNotFound {
            booking_id: BookingId(404),
        }
    );
}

#[test]
fn concurrent_joins_never_overfill_the_slot() {
    let fx = fixture(corridor_provider());
    let opener = seed(&fx, booking(1, "P0", "D0", "09:00", Some(CabType::Sedan)));
    let opened = fx
        .engine
        .assign(opener, DRIVER, test_date())
        .expect("opener assigned");
    let slot = assigned_slot(&opened);

    let contenders: Vec<BookingId> = (0..5)
        .map(|idx| {
            let pickup = format!("P{}", idx + 1);
            let drop = format!("D{}", idx + 1);
            seed(
                &fx,
                booking(idx + 10, &pickup, &drop, "09:25", Some(CabType::Sedan)),
            )
        })
        .collect();

    let handles: Vec<_> = contenders
        .into_iter()
        .map(|id| {
            let engine = fx.engine.clone();
            thread::spawn(move || engine.assign(id, DRIVER, test_date()))
        })
        .collect();

    let mut joined = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.join().expect("assignment thread") {
            Ok(assigned) => {
                assert_eq!(assigned_slot(&assigned), slot);
                joined += 1;
            }
            Err(AssignmentFailure::SlotCapacityExceeded { capacity, .. }) => {
                assert_eq!(capacity, 3);
                rejected += 1;
            }
            Err(other) => panic!("unexpected rejection: {other:?}"),
        }
    }

    // One opener plus exactly two joiners fill the sedan.
    assert_eq!(joined, 2);
    assert_eq!(rejected, 3);
}
