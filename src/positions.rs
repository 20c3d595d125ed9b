//! Validation of proposed position assignments.
//!
//! An assignment is valid for a member set `S` of size `n` when it maps every
//! member of `S` to a distinct value in `0..n`, and nothing else.

use crate::types::Id;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A position assignment: member id to zero-based position.
pub type Positions = HashMap<Id, i64>;

/// Why a position assignment was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionError {
    WrongCount { expected: usize, actual: usize },
    MissingPosition(Id),
    UnknownId(Id),
    DuplicatePosition(i64),
    InvalidPosition { id: Id, position: i64 },
}

impl fmt::Display for PositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionError::WrongCount { expected, actual } => {
                write!(f, "expected {} entries, got {}", expected, actual)
            }
            PositionError::MissingPosition(id) => write!(f, "missing position for id {}", id),
            PositionError::UnknownId(id) => write!(f, "unknown id {}", id),
            PositionError::DuplicatePosition(position) => write!(f, "duplicate position {}", position),
            PositionError::InvalidPosition { id, position } => {
                write!(f, "invalid position {} for id {}", position, id)
            }
        }
    }
}

impl std::error::Error for PositionError {}

/// Check that `positions` is a bijection from `ids` onto `0..ids.len()`.
///
/// Checks run in a fixed order so the reported error is deterministic:
/// cardinality, then ids outside `ids` (smallest first), then each member of
/// `ids` in turn for a missing, out-of-range or repeated position.
pub fn validate_positions(ids: &[Id], positions: &Positions) -> Result<(), PositionError> {
    let n = ids.len();
    if positions.len() != n {
        return Err(PositionError::WrongCount {
            expected: n,
            actual: positions.len(),
        });
    }

    let members: HashSet<Id> = ids.iter().copied().collect();
    if let Some(unknown) = positions.keys().filter(|id| !members.contains(*id)).min() {
        return Err(PositionError::UnknownId(*unknown));
    }

    let mut seen = HashSet::with_capacity(n);
    for id in ids {
        let position = *positions.get(id).ok_or(PositionError::MissingPosition(*id))?;
        if position < 0 || position >= n as i64 {
            return Err(PositionError::InvalidPosition { id: *id, position });
        }
        if !seen.insert(position) {
            return Err(PositionError::DuplicatePosition(position));
        }
    }

    Ok(())
}

/// Build the assignment that places `order[i]` at position `i`.
pub fn positions_from_order(order: &[Id]) -> Positions {
    order
        .iter()
        .enumerate()
        .map(|(position, id)| (*id, position as i64))
        .collect()
}
