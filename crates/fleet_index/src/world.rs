//! World geography and the initial fleet population.

use crate::error::{IndexError, IndexResult};
use crate::motion::MotionEngine;
use crate::types::{Bounds, Entity, EntityId, Point};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// A city center that drivers cluster around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub name: String,
    pub center: Point,
    /// Rough extent of the city in coordinate units
    pub radius: f64,
}

impl City {
    pub fn new(name: impl Into<String>, center: Point, radius: f64) -> Self {
        Self {
            name: name.into(),
            center,
            radius,
        }
    }
}

/// The cities of the default world, Erbil first.
pub fn default_cities() -> Vec<City> {
    vec![
        City::new("Erbil", Point::new(44.009167, 36.191113), 0.1),
        City::new("Duhok", Point::new(42.948857, 36.867905), 0.08),
    ]
}

/// The default world rectangle around Erbil and Duhok.
pub fn default_bounds() -> Bounds {
    Bounds::new(42.5, 35.5, 44.5, 37.5)
}

/// Static world description: its bounds and its cities.
#[derive(Debug, Clone)]
pub struct World {
    bounds: Bounds,
    cities: Vec<City>,
}

impl Default for World {
    fn default() -> Self {
        Self {
            bounds: default_bounds(),
            cities: default_cities(),
        }
    }
}

impl World {
    /// Creates a world with at least one city.
    pub fn new(bounds: Bounds, cities: Vec<City>) -> IndexResult<Self> {
        if !bounds.is_valid() {
            return Err(IndexError::InvalidConfig(format!(
                "world bounds are not an ordered finite rectangle: {bounds:?}"
            )));
        }
        if cities.is_empty() {
            return Err(IndexError::InvalidConfig("a world needs at least one city".to_string()));
        }
        Ok(Self { bounds, cities })
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn cities(&self) -> &[City] {
        &self.cities
    }

    /// The city used when none is named or a name is unknown.
    pub fn home_city(&self) -> &City {
        &self.cities[0]
    }

    /// Case-insensitive lookup, falling back to the home city.
    pub fn resolve_city(&self, name: &str) -> &City {
        self.cities
            .iter()
            .find(|city| city.name.eq_ignore_ascii_case(name))
            .unwrap_or_else(|| self.home_city())
    }

    /// The closest city to `point` and its planar distance.
    pub fn nearest_city(&self, point: Point) -> (&City, f64) {
        let mut nearest = self.home_city();
        let mut best = point.distance(nearest.center);
        for city in &self.cities[1..] {
            let distance = point.distance(city.center);
            if distance < best {
                nearest = city;
                best = distance;
            }
        }
        (nearest, best)
    }

    /// Human-readable description of where `point` is.
    pub fn describe_location(&self, point: Point) -> String {
        let (city, distance) = self.nearest_city(point);
        if distance < city.radius * 2.0 {
            format!("near {}", city.name)
        } else {
            "in remote area".to_string()
        }
    }

    /// Creates `count` entities with ids `1..=count`, all clustered around
    /// the home city.
    ///
    /// Each entity sits at a uniform angle and at `10%..60%` of the city
    /// radius from its center, with a uniform heading, a speed drawn from
    /// the engine's speed limits and a status from its status weights.
    pub fn populate<R: Rng + ?Sized>(
        &self,
        count: usize,
        engine: &MotionEngine,
        rng: &mut R,
    ) -> Vec<Entity> {
        let city = self.home_city();
        let params = engine.params();

        (1..=count as u64)
            .map(|id| {
                let angle = rng.gen::<f64>() * TAU;
                let distance = (0.1 + rng.gen::<f64>() * 0.5) * city.radius;
                let position = self.bounds.clamp(Point::new(
                    city.center.x + angle.sin() * distance,
                    city.center.y + angle.cos() * distance,
                ));

                Entity {
                    id: EntityId(id),
                    position,
                    heading: rng.gen::<f64>() * TAU,
                    speed: params.min_speed + rng.gen::<f64>() * (params.max_speed - params.min_speed),
                    status: engine.sample_status(rng),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::MotionParams;
    use crate::types::DriverStatus;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_resolve_city() {
        let world = World::default();
        assert_eq!(world.resolve_city("duhok").name, "Duhok");
        assert_eq!(world.resolve_city("ERBIL").name, "Erbil");
        assert_eq!(world.resolve_city("Mosul").name, "Erbil");
        assert_eq!(world.resolve_city("").name, "Erbil");
    }

    #[test]
    fn test_nearest_city_and_description() {
        let world = World::default();
        let (city, distance) = world.nearest_city(Point::new(42.95, 36.87));
        assert_eq!(city.name, "Duhok");
        assert!(distance < 0.01);

        assert_eq!(world.describe_location(Point::new(44.0, 36.2)), "near Erbil");
        assert_eq!(world.describe_location(Point::new(42.6, 35.6)), "in remote area");
    }

    #[test]
    fn test_populate() {
        let world = World::default();
        let params = MotionParams::default();
        let engine = MotionEngine::new(world.bounds(), params.clone()).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let entities = world.populate(1000, &engine, &mut rng);

        assert_eq!(entities.len(), 1000);
        let home = world.home_city();
        for (i, entity) in entities.iter().enumerate() {
            assert_eq!(entity.id, EntityId(i as u64 + 1));
            assert!(world.bounds().contains(entity.position));
            let d = entity.position.distance(home.center);
            assert!(d >= 0.1 * home.radius - 1e-12 && d <= 0.6 * home.radius + 1e-12);
            assert!(entity.speed >= params.min_speed && entity.speed <= params.max_speed);
            assert!((0.0..TAU).contains(&entity.heading));
        }

        let available = entities
            .iter()
            .filter(|e| e.status == DriverStatus::Available)
            .count();
        assert!(available > 600 && available < 800, "available {available}");
    }

    #[test]
    fn test_world_requires_a_city() {
        assert!(World::new(default_bounds(), Vec::new()).is_err());
        assert!(World::new(Bounds::new(1.0, 1.0, 0.0, 0.0), default_cities()).is_err());
        assert!(World::new(default_bounds(), default_cities()).is_ok());
    }
}
