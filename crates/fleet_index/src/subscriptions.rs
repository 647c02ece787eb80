//! Push-style query subscriptions.
//!
//! Each subscriber registers its own center/city and radius and receives a
//! fresh [`QueryUpdate`] on every broadcast round through a bounded
//! `tokio` channel. Subscribers whose receiver is gone are dropped during
//! the next broadcast.

use crate::simulation::FleetSimulation;
use crate::spatial::QueryHit;
use crate::types::Point;
use crate::world::World;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Radii below this are treated as unset.
pub const MIN_BROADCAST_RADIUS: f64 = 0.01;

/// Unique identifier for a subscriber
pub type SubscriberId = u64;

/// What a subscriber wants to watch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionParams {
    pub center: Point,
    /// City name; takes precedence over `center` when set
    pub city: Option<String>,
    pub radius: f64,
}

impl Default for SubscriptionParams {
    fn default() -> Self {
        Self {
            center: Point::new(0.0, 0.0),
            city: None,
            radius: 0.0,
        }
    }
}

impl SubscriptionParams {
    pub fn at(center: Point, radius: f64) -> Self {
        Self {
            center,
            city: None,
            radius,
        }
    }

    pub fn city(name: impl Into<String>, radius: f64) -> Self {
        Self {
            center: Point::new(0.0, 0.0),
            city: Some(name.into()),
            radius,
        }
    }
}

/// One broadcast frame delivered to a subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryUpdate {
    pub hits: Vec<QueryHit>,
    /// Center actually queried after resolution
    pub center: Point,
    /// Radius actually queried after resolution
    pub radius: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: u64,
}

impl QueryUpdate {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Counters from one broadcast round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Frames skipped because the subscriber's buffer was full
    pub skipped: usize,
    /// Subscribers removed because their receiver was closed
    pub removed: usize,
    /// Subscribers whose query was rejected
    pub failed: usize,
}

#[derive(Debug)]
struct Subscriber {
    params: SubscriptionParams,
    sender: mpsc::Sender<QueryUpdate>,
}

/// Registry of active subscribers.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    subscribers: DashMap<SubscriberId, Subscriber>,
    next_id: AtomicU64,
    default_radius: f64,
    buffer: usize,
}

impl SubscriptionRegistry {
    /// `buffer` is the per-subscriber channel depth (at least 1).
    pub fn new(default_radius: f64, buffer: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            default_radius,
            buffer: buffer.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.contains_key(&id)
    }

    /// Registers a subscriber and returns its id and update stream.
    pub fn subscribe(&self, params: SubscriptionParams) -> (SubscriberId, mpsc::Receiver<QueryUpdate>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.buffer);
        self.subscribers.insert(id, Subscriber { params, sender });
        info!("📡 Subscriber {} registered", id);
        (id, receiver)
    }

    /// Replaces a subscriber's parameters. Returns `false` for unknown ids.
    pub fn update_params(&self, id: SubscriberId, params: SubscriptionParams) -> bool {
        match self.subscribers.get_mut(&id) {
            Some(mut subscriber) => {
                subscriber.params = params;
                true
            }
            None => false,
        }
    }

    pub fn params(&self, id: SubscriberId) -> Option<SubscriptionParams> {
        self.subscribers.get(&id).map(|s| s.params.clone())
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            info!("📡 Subscriber {} unregistered", id);
        }
        removed
    }

    /// The center and radius a subscriber's parameters resolve to.
    ///
    /// A city name wins over the center (unknown names resolve to the home
    /// city), a center at the origin with no city means the home city, and
    /// a radius below [`MIN_BROADCAST_RADIUS`] means the default radius.
    pub fn resolve(&self, params: &SubscriptionParams, world: &World) -> (Point, f64) {
        let center = match &params.city {
            Some(name) => world.resolve_city(name).center,
            None if params.center == Point::new(0.0, 0.0) => world.home_city().center,
            None => params.center,
        };
        let radius = if params.radius >= MIN_BROADCAST_RADIUS {
            params.radius
        } else {
            self.default_radius
        };
        (center, radius)
    }

    /// Runs one query per subscriber and pushes the results.
    pub fn broadcast(&self, simulation: &FleetSimulation) -> BroadcastReport {
        // Snapshot first so no map shard stays locked while querying
        let targets: Vec<(SubscriberId, SubscriptionParams, mpsc::Sender<QueryUpdate>)> = self
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), entry.params.clone(), entry.sender.clone()))
            .collect();

        let mut report = BroadcastReport::default();
        let timestamp_ms = now_millis();

        for (id, params, sender) in targets {
            if sender.is_closed() {
                self.subscribers.remove(&id);
                report.removed += 1;
                continue;
            }

            let (center, radius) = self.resolve(&params, simulation.world());
            let hits = match simulation.query(center, radius) {
                Ok(hits) => hits,
                Err(e) => {
                    warn!("Broadcast query for subscriber {} rejected: {}", id, e);
                    report.failed += 1;
                    continue;
                }
            };

            let update = QueryUpdate {
                hits,
                center,
                radius,
                timestamp_ms,
            };
            match sender.try_send(update) {
                Ok(()) => report.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!("Subscriber {} is lagging, skipping frame", id);
                    report.skipped += 1;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.subscribers.remove(&id);
                    report.removed += 1;
                }
            }
        }

        if report.removed > 0 {
            info!("📡 Removed {} disconnected subscribers", report.removed);
        }
        report
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
