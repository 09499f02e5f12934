//! Block subsidy schedule

use crate::{Error, Result};

/// Height of the last block paying the initial emission
pub const DROP0: u64 = 1440 * 365;

/// Length of every later emission cycle
pub const DROP1: u64 = 1440 * 265 * 4;

const INITIAL_REWARD: u64 = 80;

/// Block reward, in whole coins, paid at `height`.
///
/// The reward halves at `DROP0` and then every `DROP1` blocks, except that
/// from the second drop on the base is raised by a quarter first.
pub fn calculate(height: u64) -> Result<u64> {
    if height == 0 {
        return Err(Error::validation("height", "must be a positive integer"));
    }

    let height = height - 1;
    let mut base = INITIAL_REWARD;

    if height < DROP0 {
        return Ok(base);
    }

    let n = 1 + (height - DROP0) / DROP1;
    if n >= 2 {
        base += base >> 2;
    }

    Ok(if n >= 32 { 0 } else { base >> n })
}
