//! Planning of record resizes.
//!
//! The runtime caps how much an account may grow within a single
//! instruction, so bringing a record to the size of a much larger buffer
//! takes several `resize` instructions.  Shrinking has no such cap.

use crate::error::{Error, Result};

/// Maximum number of bytes an account may grow by in one instruction.
pub const MAX_RESIZE_STEP: usize =
    solana_program::entrypoint::MAX_PERMITTED_DATA_INCREASE;


/// Returns the sizes an account has to be resized to, in order, to get from
/// `current` to `target` bytes.
///
/// Growth happens in steps of at most `max_step` bytes.  A shrink is always
/// a single step and an account already at `target` size needs no steps.
/// Fails with [`Error::InvalidPlan`] if `max_step` is zero.
pub fn plan_resize(
    current: usize,
    target: usize,
    max_step: usize,
) -> Result<Vec<usize>> {
    if max_step == 0 {
        return Err(Error::InvalidPlan(format!(
            "resize step must be positive (from {current} to {target} bytes)"
        )));
    }
    if target <= current {
        return Ok(if target < current { vec![target] } else { Vec::new() });
    }
    let mut steps = Vec::with_capacity((target - current).div_ceil(max_step));
    let mut size = current;
    while size < target {
        size += max_step.min(target - size);
        steps.push(size);
    }
    Ok(steps)
}
