// Derivation Engine - fields computed from other records at save time
//
// Prediction fields depend only on the school snapshot; budget remaining
// depends only on the tracked amounts. Nothing here touches storage.

use serde::{Deserialize, Serialize};

/// Students that fit in one classroom.
pub const STUDENTS_PER_ROOM: u32 = 35;

/// Construction cost of one classroom (RWF).
pub const COST_PER_ROOM: i64 = 5_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomEstimate {
    pub required_rooms: u32,
    pub rooms_to_build: u32,
    pub estimated_budget: i64,
}

/// Rooms a school needs for its population, how many are missing and what they cost.
pub fn estimate_rooms(student_population: u32, existing_rooms: u32) -> RoomEstimate {
    let required_rooms = student_population.div_ceil(STUDENTS_PER_ROOM);
    let rooms_to_build = required_rooms.saturating_sub(existing_rooms);

    RoomEstimate {
        required_rooms,
        rooms_to_build,
        estimated_budget: i64::from(rooms_to_build) * COST_PER_ROOM,
    }
}

/// Remaining budget; negative when a project is overspent.
pub fn remaining_budget(allocated: f64, spent: f64) -> f64 {
    allocated - spent
}
