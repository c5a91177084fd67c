use std::fmt;

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for scheduling bookings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BookingId(pub i64);

/// Identifier wrapper for vendor drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DriverId(pub i64);

/// Identifier wrapper for riders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// Identifier wrapper for vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VendorId(pub i64);

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for VendorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque slot identifier recorded on a scheduled date. Only the engine
/// synthesizes these; every other component treats them as plain strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotId(pub String);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Vehicle classes offered for shared shifts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CabType {
    Hatchback,
    Sedan,
    SedanPremium,
    Suv,
}

impl CabType {
    /// How many bookings one slot of this class can carry.
    pub const fn seat_capacity(self) -> u32 {
        match self {
            CabType::Suv => 4,
            CabType::Hatchback | CabType::Sedan | CabType::SedanPremium => 3,
        }
    }

    /// Case-insensitive parse accepting the spellings the booking intake
    /// produces ("Sedan Premium", "sedan_premium", "sedanpremium").
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "hatchback" => Some(CabType::Hatchback),
            "sedan" => Some(CabType::Sedan),
            "sedan premium" | "sedan_premium" | "sedanpremium" => Some(CabType::SedanPremium),
            "suv" => Some(CabType::Suv),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            CabType::Hatchback => "Hatchback",
            CabType::Sedan => "Sedan",
            CabType::SedanPremium => "Sedan Premium",
            CabType::Suv => "SUV",
        }
    }
}

impl fmt::Display for CabType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle of one scheduled date within a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleStatus {
    Pending,
    Completed,
}

impl ScheduleStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "PENDING",
            ScheduleStatus::Completed => "COMPLETED",
        }
    }
}

/// One calendar date a booking is scheduled for. The date is immutable once
/// created; only the engine writes the slot id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledDate {
    pub date: NaiveDate,
    pub status: ScheduleStatus,
    pub slot_id: Option<SlotId>,
}

impl ScheduledDate {
    pub fn pending(date: NaiveDate) -> Self {
        Self {
            date,
            status: ScheduleStatus::Pending,
            slot_id: None,
        }
    }
}

/// A ride request spanning one or more scheduled dates.
///
/// The pickup time is kept in its raw `HH:mm` form; the engine parses it per
/// assignment and rejects bookings whose time does not parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub user_id: UserId,
    pub vendor_id: Option<VendorId>,
    pub driver_id: Option<DriverId>,
    pub pickup_location: String,
    pub drop_location: String,
    pub pickup_time: String,
    pub return_time: Option<String>,
    pub shift: Option<String>,
    pub cab_type: Option<CabType>,
    pub scheduled_dates: Vec<ScheduledDate>,
}

impl Booking {
    pub fn scheduled_date(&self, date: NaiveDate) -> Option<&ScheduledDate> {
        self.scheduled_dates.iter().find(|sd| sd.date == date)
    }

    pub fn scheduled_date_mut(&mut self, date: NaiveDate) -> Option<&mut ScheduledDate> {
        self.scheduled_dates.iter_mut().find(|sd| sd.date == date)
    }

    /// Slot id recorded specifically on the scheduled entry for `date`.
    pub fn slot_id_on(&self, date: NaiveDate) -> Option<&SlotId> {
        self.scheduled_date(date).and_then(|sd| sd.slot_id.as_ref())
    }

    /// Pickup time parsed from the raw `HH:mm` field, if well formed.
    pub fn parsed_pickup_time(&self) -> Option<NaiveTime> {
        parse_hhmm(&self.pickup_time).ok()
    }

    pub fn route_description(&self) -> String {
        format!("{} to {}", self.pickup_location, self.drop_location)
    }
}

/// Minutes a slot stays open past its latest member pickup.
pub const SLOT_DURATION_MINUTES: i64 = 90;

/// Minimum separation between a slot's start and a joining booking's pickup;
/// joining exactly at the start or at/after this mark is allowed.
pub const SLOT_JOIN_GAP_MINUTES: i64 = 20;

/// Derived view of one slot on one date: the member bookings sharing a slot
/// id, plus the window they span. Slots are never persisted as rows; they
/// exist only through the slot ids on scheduled dates.
#[derive(Debug, Clone)]
pub struct SlotSnapshot {
    pub slot_id: SlotId,
    pub members: Vec<Booking>,
}

impl SlotSnapshot {
    /// Earliest member pickup time. Members with malformed times are ignored;
    /// a slot with no parseable member has no derived window.
    pub fn start(&self) -> Option<NaiveTime> {
        self.members
            .iter()
            .filter_map(Booking::parsed_pickup_time)
            .min()
    }

    /// Latest member pickup time plus the slot duration, recomputed from the
    /// current membership on every call.
    pub fn end(&self) -> Option<NaiveTime> {
        self.members
            .iter()
            .filter_map(Booking::parsed_pickup_time)
            .max()
            .map(|latest| latest + Duration::minutes(SLOT_DURATION_MINUTES))
    }
}

/// Parses a wall-clock `HH:mm` value with no timezone or seconds.
pub fn parse_hhmm(raw: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
}

/// Renders a time back into the wire format bookings carry.
pub fn format_hhmm(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

pub(crate) fn serialize_hhmm<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&format_hhmm(*time))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking_at(id: i64, time: &str) -> Booking {
        Booking {
            id: BookingId(id),
            user_id: UserId(1),
            vendor_id: None,
            driver_id: None,
            pickup_location: "Kharadi".to_string(),
            drop_location: "Hinjewadi".to_string(),
            pickup_time: time.to_string(),
            return_time: None,
            shift: None,
            cab_type: Some(CabType::Sedan),
            scheduled_dates: Vec::new(),
        }
    }

    #[test]
    fn cab_type_parsing_is_case_insensitive() {
        assert_eq!(CabType::parse("SUV"), Some(CabType::Suv));
        assert_eq!(CabType::parse("sedan premium"), Some(CabType::SedanPremium));
        assert_eq!(CabType::parse("SedanPremium"), Some(CabType::SedanPremium));
        assert_eq!(CabType::parse(" hatchback "), Some(CabType::Hatchback));
        assert_eq!(CabType::parse("rickshaw"), None);
    }

    #[test]
    fn seat_capacity_is_fixed_per_class() {
        assert_eq!(CabType::Hatchback.seat_capacity(), 3);
        assert_eq!(CabType::Sedan.seat_capacity(), 3);
        assert_eq!(CabType::SedanPremium.seat_capacity(), 3);
        assert_eq!(CabType::Suv.seat_capacity(), 4);
    }

    #[test]
    fn slot_window_spans_members() {
        let snapshot = SlotSnapshot {
            slot_id: SlotId("SLOT_X".to_string()),
            members: vec![booking_at(1, "09:00"), booking_at(2, "09:40")],
        };
        assert_eq!(snapshot.start(), parse_hhmm("09:00").ok());
        assert_eq!(snapshot.end(), parse_hhmm("11:10").ok());
    }

    #[test]
    fn slot_window_skips_malformed_member_times() {
        let snapshot = SlotSnapshot {
            slot_id: SlotId("SLOT_X".to_string()),
            members: vec![booking_at(1, "late morning"), booking_at(2, "10:15")],
        };
        assert_eq!(snapshot.start(), parse_hhmm("10:15").ok());
        assert_eq!(snapshot.end(), parse_hhmm("11:45").ok());
    }

    #[test]
    fn hhmm_rejects_other_shapes() {
        assert!(parse_hhmm("09:00").is_ok());
        assert!(parse_hhmm("9:05").is_ok());
        assert!(parse_hhmm("09:00:30").is_err());
        assert!(parse_hhmm("morning").is_err());
    }
}
