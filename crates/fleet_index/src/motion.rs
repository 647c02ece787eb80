//! Randomized kinematic model that keeps entities moving inside the world.
//!
//! Each step perturbs heading and speed with small random changes, moves
//! the entity along its heading, steers it back toward the interior when it
//! gets close to an edge and finally clamps it into the world as a hard
//! backstop. Occasionally the entity's status is resampled.
//!
//! Headings are compass-style: `0` points toward `+y` (north) and angles
//! grow toward `+x` (east), so displacement is `(sin h, cos h) * speed * dt`.

use crate::error::{IndexError, IndexResult};
use crate::types::{Bounds, DriverStatus, EntityState, Point};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// Tunable constants of the motion model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionParams {
    /// Lower speed limit in coordinate units per second
    pub min_speed: f64,
    /// Upper speed limit in coordinate units per second
    pub max_speed: f64,
    /// Chance per step of a heading change
    pub turn_probability: f64,
    /// Largest heading change in radians, in either direction
    pub turn_max_angle: f64,
    /// Chance per step of a speed change
    pub acceleration_probability: f64,
    /// Largest relative speed change, in either direction
    pub acceleration_max: f64,
    /// Distance from an edge at which entities steer back inward
    pub boundary_buffer: f64,
    /// Chance per step of resampling the status
    pub status_change_probability: f64,
    /// Weight of `Available` when a status is sampled
    pub available_probability: f64,
    /// Weight of `Busy` when a status is sampled; `Offline` takes the rest
    pub busy_probability: f64,
}

impl Default for MotionParams {
    fn default() -> Self {
        Self {
            min_speed: 0.00005,
            max_speed: 0.0001,
            turn_probability: 0.05,
            turn_max_angle: 0.15,
            acceleration_probability: 0.05,
            acceleration_max: 0.15,
            boundary_buffer: 0.01,
            status_change_probability: 0.01,
            available_probability: 0.7,
            busy_probability: 0.2,
        }
    }
}

impl MotionParams {
    /// Checks the parameters for consistency.
    pub fn validate(&self) -> IndexResult<()> {
        let probabilities = [
            ("turn_probability", self.turn_probability),
            ("acceleration_probability", self.acceleration_probability),
            ("status_change_probability", self.status_change_probability),
            ("available_probability", self.available_probability),
            ("busy_probability", self.busy_probability),
        ];
        for (name, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(IndexError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.available_probability + self.busy_probability > 1.0 {
            return Err(IndexError::InvalidConfig(
                "available_probability + busy_probability must not exceed 1".to_string(),
            ));
        }
        if !(self.min_speed >= 0.0 && self.min_speed <= self.max_speed && self.max_speed.is_finite()) {
            return Err(IndexError::InvalidConfig(format!(
                "speed limits must satisfy 0 <= min_speed <= max_speed, got {} and {}",
                self.min_speed, self.max_speed
            )));
        }
        if !(self.turn_max_angle >= 0.0 && self.turn_max_angle.is_finite()) {
            return Err(IndexError::InvalidConfig("turn_max_angle must be non-negative".to_string()));
        }
        if !(self.acceleration_max >= 0.0 && self.acceleration_max < 1.0) {
            return Err(IndexError::InvalidConfig(
                "acceleration_max must be within [0, 1)".to_string(),
            ));
        }
        if !(self.boundary_buffer >= 0.0 && self.boundary_buffer.is_finite()) {
            return Err(IndexError::InvalidConfig("boundary_buffer must be non-negative".to_string()));
        }
        Ok(())
    }
}

/// Which vertical world edge an entity is approaching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeX {
    West,
    East,
}

/// Which horizontal world edge an entity is approaching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeY {
    South,
    North,
}

/// Advances entity state one step at a time.
#[derive(Debug, Clone)]
pub struct MotionEngine {
    bounds: Bounds,
    params: MotionParams,
}

impl MotionEngine {
    pub fn new(bounds: Bounds, params: MotionParams) -> IndexResult<Self> {
        if !bounds.is_valid() {
            return Err(IndexError::InvalidConfig(format!(
                "world bounds are not an ordered finite rectangle: {bounds:?}"
            )));
        }
        params.validate()?;
        Ok(Self { bounds, params })
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn params(&self) -> &MotionParams {
        &self.params
    }

    /// Advances one entity by `dt` seconds.
    ///
    /// Offline entities are left untouched: they neither move nor resample
    /// their status, so `Offline` is permanent once reached.
    ///
    /// The caller must hold exclusive access to `state` for the whole call.
    pub fn advance<R: Rng + ?Sized>(&self, state: &mut EntityState, dt: f64, rng: &mut R) {
        if state.status == DriverStatus::Offline {
            return;
        }

        self.move_entity(state, dt, rng);

        if rng.gen::<f64>() < self.params.status_change_probability {
            state.status = self.sample_status(rng);
        }
    }

    fn move_entity<R: Rng + ?Sized>(&self, state: &mut EntityState, dt: f64, rng: &mut R) {
        let p = &self.params;

        if rng.gen::<f64>() < p.turn_probability {
            let turn = (rng.gen::<f64>() * 2.0 - 1.0) * p.turn_max_angle;
            state.heading = wrap_heading(state.heading + turn);
        }

        // A parked entity (speed 0) stays parked: scaling keeps it at zero.
        if rng.gen::<f64>() < p.acceleration_probability && state.speed > 0.0 {
            let factor = 1.0 + (rng.gen::<f64>() * 2.0 - 1.0) * p.acceleration_max;
            state.speed = (state.speed * factor).clamp(p.min_speed, p.max_speed);
        }

        let candidate = displaced(state.position, state.heading, state.speed, dt);
        if let Some(heading) = self.steer_inward(candidate, rng) {
            state.heading = heading;
        }

        let next = displaced(state.position, state.heading, state.speed, dt);
        state.position = self.bounds.clamp(next);
    }

    /// New heading for a candidate position inside the boundary buffer.
    ///
    /// The heading is drawn uniformly from the half-plane facing away from
    /// the edge being approached, or from the quarter-plane facing away from
    /// both edges near a corner. `None` if no edge is within the buffer.
    fn steer_inward<R: Rng + ?Sized>(&self, candidate: Point, rng: &mut R) -> Option<f64> {
        let buffer = self.params.boundary_buffer;

        let edge_x = if candidate.x < self.bounds.min_x + buffer {
            Some(EdgeX::West)
        } else if candidate.x > self.bounds.max_x - buffer {
            Some(EdgeX::East)
        } else {
            None
        };
        let edge_y = if candidate.y < self.bounds.min_y + buffer {
            Some(EdgeY::South)
        } else if candidate.y > self.bounds.max_y - buffer {
            Some(EdgeY::North)
        } else {
            None
        };

        // (start, span) of the allowed heading arc
        let (start, span) = match (edge_x, edge_y) {
            (None, None) => return None,
            (Some(EdgeX::West), None) => (0.0, PI),
            (Some(EdgeX::East), None) => (PI, PI),
            (None, Some(EdgeY::South)) => (3.0 * FRAC_PI_2, PI),
            (None, Some(EdgeY::North)) => (FRAC_PI_2, PI),
            (Some(EdgeX::West), Some(EdgeY::South)) => (0.0, FRAC_PI_2),
            (Some(EdgeX::West), Some(EdgeY::North)) => (FRAC_PI_2, FRAC_PI_2),
            (Some(EdgeX::East), Some(EdgeY::North)) => (PI, FRAC_PI_2),
            (Some(EdgeX::East), Some(EdgeY::South)) => (3.0 * FRAC_PI_2, FRAC_PI_2),
        };

        Some(wrap_heading(start + rng.gen::<f64>() * span))
    }

    /// Samples a status from the configured categorical distribution.
    pub fn sample_status<R: Rng + ?Sized>(&self, rng: &mut R) -> DriverStatus {
        let roll = rng.gen::<f64>();
        if roll < self.params.available_probability {
            DriverStatus::Available
        } else if roll < self.params.available_probability + self.params.busy_probability {
            DriverStatus::Busy
        } else {
            DriverStatus::Offline
        }
    }
}

/// Wraps an angle into `[0, 2π)`.
fn wrap_heading(heading: f64) -> f64 {
    let wrapped = heading.rem_euclid(TAU);
    // rem_euclid rounds up to exactly TAU for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

fn displaced(position: Point, heading: f64, speed: f64, dt: f64) -> Point {
    Point::new(
        position.x + heading.sin() * speed * dt,
        position.y + heading.cos() * speed * dt,
    )
}
