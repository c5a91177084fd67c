use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::{error, info};

use super::domain::{BookingId, DriverId, SlotId};
use super::engine::{AssignmentFailure, SlotAssignmentEngine};
use super::store::BookingStore;

/// Outcome of one date's assignment attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DateOutcome {
    Assigned {
        slot_id: SlotId,
        message: String,
    },
    Rejected {
        failure: AssignmentFailure,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        suggestions: Vec<String>,
    },
}

impl DateOutcome {
    pub fn is_assigned(&self) -> bool {
        matches!(self, DateOutcome::Assigned { .. })
    }

    pub fn failure(&self) -> Option<&AssignmentFailure> {
        match self {
            DateOutcome::Assigned { .. } => None,
            DateOutcome::Rejected { failure, .. } => Some(failure),
        }
    }
}

/// Per-date report for a multi-date driver assignment.
#[derive(Debug, Clone, Serialize)]
pub struct MultiDateReport {
    pub booking_id: BookingId,
    pub driver_id: DriverId,
    pub outcomes: BTreeMap<NaiveDate, DateOutcome>,
}

impl MultiDateReport {
    pub fn assigned_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_assigned()).count()
    }

    pub fn fully_assigned(&self) -> bool {
        self.assigned_count() == self.outcomes.len()
    }
}

/// Drives the engine once per scheduled date of a booking.
///
/// Failures are per-date: a rejection or fault on one date never aborts the
/// remaining dates, and dates are not a transactional unit, so a report with
/// a mix of assigned and rejected dates is a valid outcome.
pub struct MultiDateAssignmentCoordinator {
    engine: Arc<SlotAssignmentEngine>,
    store: Arc<dyn BookingStore>,
}

impl MultiDateAssignmentCoordinator {
    pub fn new(engine: Arc<SlotAssignmentEngine>, store: Arc<dyn BookingStore>) -> Self {
        Self { engine, store }
    }

    pub fn assign_across_dates(
        &self,
        booking_id: BookingId,
        driver_id: DriverId,
    ) -> MultiDateReport {
        let mut outcomes = BTreeMap::new();

        let booking = match self.store.find_by_id(booking_id) {
            Ok(Some(booking)) => booking,
            Ok(None) => {
                outcomes.insert(
                    Local::now().date_naive(),
                    rejected(AssignmentFailure::BookingNotFound { booking_id }),
                );
                return MultiDateReport {
                    booking_id,
                    driver_id,
                    outcomes,
                };
            }
            Err(err) => {
                outcomes.insert(
                    Local::now().date_naive(),
                    rejected(AssignmentFailure::Unexpected {
                        detail: err.to_string(),
                    }),
                );
                return MultiDateReport {
                    booking_id,
                    driver_id,
                    outcomes,
                };
            }
        };

        let dates: Vec<NaiveDate> = booking.scheduled_dates.iter().map(|sd| sd.date).collect();

        for date in dates {
            info!(%booking_id, %driver_id, %date, "assigning driver for date");

            let attempt = catch_unwind(AssertUnwindSafe(|| {
                self.engine.assign(booking_id, driver_id, date)
            }));

            let outcome = match attempt {
                Ok(Ok(updated)) => match updated.slot_id_on(date) {
                    Some(slot_id) => DateOutcome::Assigned {
                        slot_id: slot_id.clone(),
                        message: format!("Driver successfully assigned for {date}"),
                    },
                    None => rejected(AssignmentFailure::Unexpected {
                        detail: format!("assignment for {date} recorded no slot id"),
                    }),
                },
                Ok(Err(failure)) => rejected(failure),
                Err(panic) => {
                    let detail = panic_detail(panic);
                    error!(%booking_id, %driver_id, %date, %detail, "assignment panicked");
                    rejected(AssignmentFailure::Unexpected { detail })
                }
            };

            outcomes.insert(date, outcome);
        }

        MultiDateReport {
            booking_id,
            driver_id,
            outcomes,
        }
    }
}

fn rejected(failure: AssignmentFailure) -> DateOutcome {
    DateOutcome::Rejected {
        suggestions: suggestions_for(&failure),
        failure,
    }
}

/// Human-facing follow-ups rendered alongside a rejection; the structured
/// failure fields stay authoritative.
fn suggestions_for(failure: &AssignmentFailure) -> Vec<String> {
    match failure {
        AssignmentFailure::RouteOverlap { .. } => vec![
            "Try a different pickup time".to_string(),
            "Choose a pickup location closer to the existing route".to_string(),
            "Select a different driver for this route".to_string(),
        ],
        AssignmentFailure::TimeGapViolation { next_available, .. } => vec![format!(
            "Next available time: {}",
            next_available.format("%H:%M")
        )],
        _ => Vec::new(),
    }
}

fn panic_detail(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "assignment worker panicked".to_string()
    }
}
