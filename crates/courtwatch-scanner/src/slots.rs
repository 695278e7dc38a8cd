//! Free-time computation: the complement of booked intervals inside the
//! business window.

use courtwatch_core::types::{DayBookings, FreeSlotMap, TimeInterval};

/// Free intervals of one venue inside `window`.
///
/// Sweeps the booked intervals in start order with a cursor that only moves
/// forward, so overlapping or touching bookings need no separate merge step.
/// Bookings are clipped to the window; the result never leaves it.
pub fn free_slots(booked: &[TimeInterval], window: &TimeInterval) -> Vec<TimeInterval> {
    let mut sorted = booked.to_vec();
    sorted.sort_by_key(|iv| (iv.start, iv.end));

    let mut free = Vec::new();
    let mut cursor = window.start;

    for iv in &sorted {
        if cursor >= window.end {
            break;
        }
        let gap_end = iv.start.min(window.end);
        if gap_end > cursor {
            free.push(TimeInterval {
                start: cursor,
                end: gap_end,
            });
        }
        cursor = cursor.max(iv.end);
    }

    if cursor < window.end {
        free.push(TimeInterval {
            start: cursor,
            end: window.end,
        });
    }
    free
}

/// Free intervals of every venue listed for the day. Venues without any
/// booking get the whole window.
pub fn free_slot_map(day: &DayBookings, window: &TimeInterval) -> FreeSlotMap {
    let mut map = FreeSlotMap::new();
    for venue in day.venues.iter().chain(day.booked.keys()) {
        if map.contains_key(venue) {
            continue;
        }
        map.insert(venue.clone(), free_slots(day.booked_for(venue), window));
    }
    map
}
