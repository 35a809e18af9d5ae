//! Hovercraft physics and race tunables

use serde::{Deserialize, Serialize};

use super::vector::{angle_difference, normalize_angle, Vec2};

/// Speeds below this are snapped to rest while braking
pub const REST_SPEED_EPSILON: f64 = 0.01;

/// Upper bound for checkpoints per race
pub const MAX_CHECKPOINT_COUNT: usize = 100;

/// Tunable physics and race parameters for one game instance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    /// Throttle units per second the current throttle moves toward its target
    pub throttle_rate: f64,
    /// Degrees per second the heading turns toward its target
    pub turn_rate: f64,
    /// Acceleration at full throttle (units/s²)
    pub max_acceleration: f64,
    /// Hard cap on hovercraft speed (units/s)
    pub max_velocity: f64,
    /// Checkpoints generated per race
    pub checkpoint_count: usize,
    /// Ends a running race after this many milliseconds
    pub timeout_ms: Option<u64>,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            throttle_rate: 2.0,
            turn_rate: 180.0,
            max_acceleration: 8.0,
            max_velocity: 20.0,
            checkpoint_count: 10,
            timeout_ms: None,
        }
    }
}

impl RaceConfig {
    /// Replace zero, negative or non-finite fields with their defaults
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        let positive = |value: f64, fallback: f64| {
            if value.is_finite() && value > 0.0 {
                value
            } else {
                fallback
            }
        };

        Self {
            throttle_rate: positive(self.throttle_rate, defaults.throttle_rate),
            turn_rate: positive(self.turn_rate, defaults.turn_rate),
            max_acceleration: positive(self.max_acceleration, defaults.max_acceleration),
            max_velocity: positive(self.max_velocity, defaults.max_velocity),
            checkpoint_count: match self.checkpoint_count {
                0 => defaults.checkpoint_count,
                n => n.min(MAX_CHECKPOINT_COUNT),
            },
            timeout_ms: self.timeout_ms.filter(|ms| *ms > 0),
        }
    }
}

/// Kinematic state of one hovercraft
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hovercraft {
    pub pos: Vec2,
    pub vel: Vec2,
    pub acc: Vec2,
    /// Current heading in degrees, always in (-180, 180]
    pub angle: f64,
    /// Current throttle, always in [-1, 1]
    pub throttle: f64,
    /// Most recently commanded heading
    pub target_angle: f64,
    /// Most recently commanded throttle
    pub target_throttle: f64,
}

impl Hovercraft {
    pub fn at(pos: Vec2) -> Self {
        Self {
            pos,
            ..Self::default()
        }
    }

    /// Store a new steering intent. Values are clamped, never rejected.
    pub fn set_targets(&mut self, throttle: f64, angle: f64) {
        self.target_throttle = clamp_throttle(throttle);
        self.target_angle = if angle.is_finite() {
            normalize_angle(angle)
        } else {
            self.target_angle
        };
    }

    /// Advance by `dt` seconds.
    ///
    /// When `powered` is false the craft ignores its targets and brakes
    /// against its velocity until it comes to rest.
    pub fn update(&mut self, dt: f64, powered: bool, config: &RaceConfig) {
        if powered {
            let target_angle = self.angle + angle_difference(self.angle, self.target_angle);

            self.throttle = clamp_throttle(approach(
                self.throttle,
                self.target_throttle,
                config.throttle_rate * dt,
            ));
            self.angle = normalize_angle(approach(self.angle, target_angle, config.turn_rate * dt));
            self.acc = Vec2::from_angle(self.angle) * (config.max_acceleration * self.throttle);
        } else {
            self.throttle = 0.0;
            self.acc = self.braking(dt, config.max_acceleration);
        }

        self.vel += self.acc * dt;
        self.vel = self.vel.clamp_magnitude(config.max_velocity);
        self.pos += self.vel * dt;

        if !powered && self.vel.magnitude_squared() < REST_SPEED_EPSILON * REST_SPEED_EPSILON {
            self.vel = Vec2::ZERO;
            self.acc = Vec2::ZERO;
        }
    }

    /// Deceleration opposing the current velocity, capped so one step never
    /// reverses the direction of travel
    fn braking(&self, dt: f64, max_acceleration: f64) -> Vec2 {
        let Some(direction) = self.vel.normalize() else {
            return Vec2::ZERO;
        };
        let speed = self.vel.magnitude();
        let magnitude = if dt > 0.0 {
            max_acceleration.min(speed / dt)
        } else {
            max_acceleration
        };
        -direction * magnitude
    }

    pub fn is_moving(&self) -> bool {
        self.vel != Vec2::ZERO
    }
}

/// Throttle is limited to [-1, 1]; NaN counts as idle
pub fn clamp_throttle(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}

/// Move `current` toward `target` by at most `max_step`
fn approach(current: f64, target: f64, max_step: f64) -> f64 {
    let delta = target - current;
    if delta.abs() <= max_step {
        target
    } else {
        current + max_step.copysign(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 1.0 / 30.0;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn sanitized_replaces_invalid_fields_with_defaults() {
        let config = RaceConfig {
            throttle_rate: 0.0,
            turn_rate: -5.0,
            max_acceleration: f64::NAN,
            max_velocity: 42.0,
            checkpoint_count: 0,
            timeout_ms: Some(0),
        }
        .sanitized();

        let defaults = RaceConfig::default();
        assert_eq!(config.throttle_rate, defaults.throttle_rate);
        assert_eq!(config.turn_rate, defaults.turn_rate);
        assert_eq!(config.max_acceleration, defaults.max_acceleration);
        assert_eq!(config.max_velocity, 42.0);
        assert_eq!(config.checkpoint_count, defaults.checkpoint_count);
        assert_eq!(config.timeout_ms, None);
    }

    #[test]
    fn sanitized_caps_checkpoint_count() {
        let config = RaceConfig {
            checkpoint_count: 10_000,
            ..RaceConfig::default()
        }
        .sanitized();
        assert_eq!(config.checkpoint_count, MAX_CHECKPOINT_COUNT);
    }

    #[test]
    fn partial_json_uses_defaults_for_missing_fields() {
        let config: RaceConfig = serde_json::from_str(r#"{"checkpoint_count": 3}"#).unwrap();
        assert_eq!(config.checkpoint_count, 3);
        assert_eq!(config.turn_rate, RaceConfig::default().turn_rate);
    }

    #[test]
    fn set_targets_clamps_and_normalizes() {
        let mut craft = Hovercraft::default();
        craft.set_targets(2.0, 450.0);
        assert_eq!(craft.target_throttle, 1.0);
        assert!(approx(craft.target_angle, 90.0));

        craft.set_targets(-7.0, -270.0);
        assert_eq!(craft.target_throttle, -1.0);
        assert!(approx(craft.target_angle, 90.0));
    }

    #[test]
    fn set_targets_is_idempotent() {
        let mut once = Hovercraft::default();
        once.set_targets(0.5, 30.0);

        let mut twice = Hovercraft::default();
        twice.set_targets(0.5, 30.0);
        twice.set_targets(0.5, 30.0);

        assert_eq!(once, twice);
    }

    #[test]
    fn throttle_ramps_without_overshoot() {
        let config = RaceConfig::default();
        let mut craft = Hovercraft::default();
        craft.set_targets(1.0, 0.0);

        craft.update(DT, true, &config);
        assert!(approx(craft.throttle, config.throttle_rate * DT));

        for _ in 0..100 {
            craft.update(DT, true, &config);
        }
        assert_eq!(craft.throttle, 1.0);
    }

    #[test]
    fn heading_turns_through_the_short_side() {
        let config = RaceConfig::default();
        let mut craft = Hovercraft {
            angle: 170.0,
            target_angle: -170.0,
            ..Hovercraft::default()
        };

        craft.update(DT, true, &config);
        assert!(approx(craft.angle, 176.0), "angle was {}", craft.angle);

        // crosses 180 and wraps instead of sweeping back down through 0
        craft.update(DT, true, &config);
        assert!(approx(craft.angle, -178.0), "angle was {}", craft.angle);

        for _ in 0..10 {
            craft.update(DT, true, &config);
        }
        assert!(approx(craft.angle, -170.0));
    }

    #[test]
    fn throttle_and_angle_stay_in_range_under_arbitrary_commands() {
        let config = RaceConfig::default();
        let mut craft = Hovercraft::default();
        let commands = [(5.0, 1234.0), (-3.0, -999.0), (0.3, 179.9), (f64::NAN, 181.0)];

        for step in 0..2000 {
            let (throttle, angle) = commands[step % commands.len()];
            if step % 7 == 0 {
                craft.set_targets(throttle, angle);
            }
            craft.update(DT, true, &config);
            assert!((-1.0..=1.0).contains(&craft.throttle));
            assert!(craft.angle > -180.0 && craft.angle <= 180.0);
        }
    }

    #[test]
    fn acceleration_follows_heading() {
        let config = RaceConfig {
            throttle_rate: 1000.0,
            ..RaceConfig::default()
        };
        let mut craft = Hovercraft {
            angle: 90.0,
            target_angle: 90.0,
            ..Hovercraft::default()
        };
        craft.set_targets(1.0, 90.0);

        craft.update(DT, true, &config);
        assert!(approx(craft.acc.x, 0.0));
        assert!(approx(craft.acc.y, config.max_acceleration));
        assert!(craft.pos.y > 0.0);
    }

    #[test]
    fn velocity_is_clamped_to_max() {
        let config = RaceConfig {
            max_velocity: 5.0,
            ..RaceConfig::default()
        };
        let mut craft = Hovercraft::default();
        craft.set_targets(1.0, 0.0);

        for _ in 0..600 {
            craft.update(DT, true, &config);
        }
        assert!(craft.vel.magnitude() <= config.max_velocity + 1e-9);
        assert!(craft.vel.magnitude() > config.max_velocity - 1e-6);
    }

    #[test]
    fn unpowered_craft_brakes_to_exact_rest() {
        let config = RaceConfig::default();
        let mut craft = Hovercraft {
            vel: Vec2::new(6.0, -3.0),
            throttle: 1.0,
            target_throttle: 1.0,
            ..Hovercraft::default()
        };

        for _ in 0..300 {
            craft.update(DT, false, &config);
        }
        assert_eq!(craft.throttle, 0.0);
        assert_eq!(craft.vel, Vec2::ZERO);
        assert_eq!(craft.acc, Vec2::ZERO);
        assert!(!craft.is_moving());
    }

    #[test]
    fn braking_never_reverses_direction() {
        let config = RaceConfig::default();
        let mut craft = Hovercraft {
            vel: Vec2::new(0.05, 0.0),
            ..Hovercraft::default()
        };

        craft.update(DT, false, &config);
        assert!(craft.vel.x >= 0.0);
    }

    #[test]
    fn zero_delta_changes_nothing() {
        let config = RaceConfig::default();
        let mut craft = Hovercraft::at(Vec2::new(1.5, 0.0));
        craft.set_targets(1.0, 45.0);
        let before = craft.clone();

        craft.update(0.0, true, &config);
        assert_eq!(craft.pos, before.pos);
        assert_eq!(craft.vel, before.vel);
        assert_eq!(craft.angle, before.angle);
    }
}
