//! Step Resolver - turns a step request into an inclusive id range
//!
//! Pure arithmetic, no I/O. A step count of 0 means "everything": all
//! pending migrations going forward, all applied migrations going back.

use std::ops::RangeInclusive;

use super::definitions::Direction;
use crate::error::{MigrationError, MigrationResult};

/// Inclusive range of migration ids selected for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepRange {
    pub from: i64,
    pub to: i64,
}

impl StepRange {
    pub fn contains(&self, id: i64) -> bool {
        self.from <= id && id <= self.to
    }

    pub fn as_range(&self) -> RangeInclusive<i64> {
        self.from..=self.to
    }
}

/// Resolve the ids to execute.
///
/// Forward selects `(last_applied, last_applied + steps]`, Reverse selects
/// `[last_applied - steps + 1, last_applied]`; both are clamped to
/// `[1, max_available]`. Returns `Ok(None)` when the clamped range is empty.
pub fn resolve_steps(
    direction: Direction,
    steps: i64,
    last_applied: i64,
    max_available: i64,
) -> MigrationResult<Option<StepRange>> {
    if steps < 0 {
        return Err(MigrationError::InvalidStepCount { steps });
    }

    let (from, to) = match direction {
        Direction::Forward => {
            let from = last_applied.saturating_add(1);
            let to = if steps == 0 {
                max_available
            } else {
                last_applied.saturating_add(steps)
            };
            (from, to)
        }
        Direction::Reverse => {
            let from = if steps == 0 {
                1
            } else {
                last_applied.saturating_sub(steps).saturating_add(1)
            };
            (from, last_applied)
        }
    };

    let from = from.max(1);
    let to = to.min(max_available);

    if from > to {
        return Ok(None);
    }

    Ok(Some(StepRange { from, to }))
}
