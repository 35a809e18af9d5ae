//! Checkpoint and finish line detection

use super::vector::Vec2;

/// Diameter shared by hovercrafts and checkpoints (world units)
pub const HOVERCRAFT_DIAMETER: f64 = 1.0;

/// Two circles of equal diameter touch when their centers are one diameter apart
pub const COLLISION_DISTANCE_SQUARED: f64 = HOVERCRAFT_DIAMETER * HOVERCRAFT_DIAMETER;

/// Result of checking one hovercraft position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Detection {
    /// Checkpoints removed from the remaining set this pass
    pub consumed: usize,
    /// The remaining set is empty and the craft touches the finish line
    pub reached_finish: bool,
}

/// Closed boundary: touching exactly at the threshold counts
pub fn is_colliding(a: Vec2, b: Vec2) -> bool {
    a.distance_squared(b) <= COLLISION_DISTANCE_SQUARED
}

/// Consume every remaining checkpoint in reach of `pos`, then test the
/// finish line once nothing is left. Order of `remaining` is not preserved.
pub fn detect(pos: Vec2, remaining: &mut Vec<Vec2>, finish_line: Vec2) -> Detection {
    let mut consumed = 0;
    let mut i = 0;
    while i < remaining.len() {
        if is_colliding(pos, remaining[i]) {
            remaining.swap_remove(i);
            consumed += 1;
        } else {
            i += 1;
        }
    }

    Detection {
        consumed,
        reached_finish: remaining.is_empty() && is_colliding(pos, finish_line),
    }
}
