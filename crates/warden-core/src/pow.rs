//! Proof of work over event ids.
//!
//! Difficulty is the number of leading zero bits in the id. The solution is
//! carried in a `["nonce", <counter>, <target>]` tag.

use crate::error::Result;
use crate::event::{Event, EventId, UnsignedEvent};

/// Count leading zero bits of an id.
pub fn leading_zero_bits(id: &EventId) -> u32 {
    let mut count = 0;
    for byte in id.as_bytes() {
        if *byte == 0 {
            count += 8;
        } else {
            count += byte.leading_zeros();
            break;
        }
    }
    count
}

/// Difficulty an event claims and actually meets.
///
/// Returns 0 when there is no nonce tag or the id falls short of the
/// committed target.
pub fn committed_difficulty(event: &Event) -> u32 {
    let target = event
        .tags
        .iter()
        .find(|t| t.first().map(String::as_str) == Some("nonce"))
        .and_then(|t| t.get(2))
        .and_then(|v| v.parse::<u32>().ok());
    match target {
        Some(target) if leading_zero_bits(&event.id) >= target => target,
        _ => 0,
    }
}

/// Mine a nonce tag until the id has at least `difficulty` leading zero bits.
///
/// CPU bound; callers on an async runtime should run it on a blocking thread.
pub fn mine(mut event: UnsignedEvent, difficulty: u32) -> Result<UnsignedEvent> {
    if difficulty == 0 {
        return Ok(event);
    }

    event
        .tags
        .retain(|t| t.first().map(String::as_str) != Some("nonce"));
    event.tags.push(vec![
        "nonce".to_string(),
        "0".to_string(),
        difficulty.to_string(),
    ]);
    let idx = event.tags.len() - 1;

    let mut counter: u64 = 0;
    loop {
        event.tags[idx][1] = counter.to_string();
        if leading_zero_bits(&event.id()?) >= difficulty {
            return Ok(event);
        }
        counter += 1;
    }
}
