//! Host → client replication of simulation state.
//!
//! The host owns the simulation. Every [`SnapshotTimer`] interval it takes
//! a [`Snapshot`] of it and broadcasts it with
//! [`Network::broadcast_snapshot`](crate::Network::broadcast_snapshot);
//! clients turn the message back into a snapshot with
//! [`Message::to_snapshot`](boltlink_protocol::Message::to_snapshot) and
//! apply it to their passive copy. The network layer never looks inside.

use std::time::Duration;

use boltlink_protocol::{Fields, Group};
pub use boltlink_protocol::Snapshot;

/// A simulation that can be captured on the host and overwritten on a
/// client.
pub trait Replicated {
    type Snapshot: Snapshot;

    fn snapshot(&self) -> Self::Snapshot;

    fn apply_snapshot(&mut self, snapshot: Self::Snapshot);
}

// ---------------------------------------------------------------------------
// HazardSnapshot
// ---------------------------------------------------------------------------

/// Upper bound on list lengths accepted from the wire.
const MAX_INSTANCES: usize = 64;

/// One visible effect: where it is and how long it has been alive.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EffectInstance {
    pub x: f64,
    pub age: f64,
}

/// State of a hazard generator such as random lightning.
///
/// Flattened onto one level of fields:
///
/// ```text
/// lightning|strikes=1|warnings=2|next=4.2|s0.x=310|s0.age=0.1|w0.x=88|w0.age=0.4|w1.x=500|w1.age=0
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HazardSnapshot {
    /// Effects currently striking.
    pub strikes: Vec<EffectInstance>,
    /// Effects announced but not yet striking.
    pub warnings: Vec<EffectInstance>,
    /// Seconds until the generator spawns the next warning.
    pub next_event_in: f64,
}

impl HazardSnapshot {
    /// Conventional message type for hazard broadcasts.
    pub const KIND: &'static str = "lightning";
}

impl Snapshot for HazardSnapshot {
    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new()
            .with("strikes", self.strikes.len())
            .with("warnings", self.warnings.len())
            .with("next", self.next_event_in);
        write_list(&mut fields, 's', &self.strikes);
        write_list(&mut fields, 'w', &self.warnings);
        fields
    }

    fn from_fields(fields: &Fields) -> Option<Self> {
        Some(Self {
            strikes: read_list(fields, "strikes", 's')?,
            warnings: read_list(fields, "warnings", 'w')?,
            next_event_in: fields.number("next")?,
        })
    }
}

fn write_list(fields: &mut Fields, prefix: char, items: &[EffectInstance]) {
    for (i, item) in items.iter().enumerate() {
        fields.insert_group(
            format!("{prefix}{i}"),
            Group::new().with("x", item.x).with("age", item.age),
        );
    }
}

fn read_list(fields: &Fields, count_key: &str, prefix: char) -> Option<Vec<EffectInstance>> {
    let count = fields.number(count_key)?;
    if count < 0.0 || count.fract() != 0.0 || count > MAX_INSTANCES as f64 {
        return None;
    }
    (0..count as usize)
        .map(|i| {
            let group = fields.group(&format!("{prefix}{i}"))?;
            Some(EffectInstance {
                x: group.number("x")?,
                age: group.number("age")?,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// SnapshotTimer
// ---------------------------------------------------------------------------

/// Decides which ticks should broadcast a snapshot.
///
/// Accumulates tick deltas and fires once per `interval`. A long stall
/// fires once, not once per missed interval.
#[derive(Debug, Clone)]
pub struct SnapshotTimer {
    interval: Duration,
    elapsed: Duration,
}

impl SnapshotTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            elapsed: Duration::ZERO,
        }
    }

    /// Advances by `dt`. Returns `true` when a snapshot is due.
    pub fn tick(&mut self, dt: Duration) -> bool {
        self.elapsed += dt;
        if self.elapsed < self.interval {
            return false;
        }
        self.elapsed -= self.interval;
        if self.elapsed >= self.interval {
            self.elapsed = Duration::ZERO;
        }
        true
    }

    pub fn reset(&mut self) {
        self.elapsed = Duration::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use boltlink_protocol::{Codec, Message, TextCodec};

    use super::*;

    fn sample() -> HazardSnapshot {
        HazardSnapshot {
            strikes: vec![EffectInstance { x: 310.25, age: 0.1 }],
            warnings: vec![
                EffectInstance { x: 88.0, age: 0.4 },
                EffectInstance { x: 500.0, age: 0.0 },
            ],
            next_event_in: 4.2,
        }
    }

    #[test]
    fn test_hazard_snapshot_field_layout() {
        let fields = sample().to_fields();

        assert_eq!(fields.number("strikes"), Some(1.0));
        assert_eq!(fields.number("warnings"), Some(2.0));
        assert_eq!(fields.number("next"), Some(4.2));
        assert_eq!(fields.group("s0").unwrap().number("x"), Some(310.25));
        assert_eq!(fields.group("w1").unwrap().number("age"), Some(0.0));
    }

    #[test]
    fn test_hazard_snapshot_survives_text_codec() {
        let snapshot = sample();
        let bytes = TextCodec
            .encode(&snapshot.to_message(HazardSnapshot::KIND))
            .unwrap();

        let msg = TextCodec.decode(&bytes).unwrap();

        assert_eq!(msg.kind, "lightning");
        assert_eq!(msg.to_snapshot::<HazardSnapshot>(), Some(snapshot));
    }

    #[test]
    fn test_hazard_snapshot_empty_lists() {
        let snapshot = HazardSnapshot {
            next_event_in: 7.0,
            ..HazardSnapshot::default()
        };
        let bytes = TextCodec.encode(&snapshot.to_message("lightning")).unwrap();
        assert_eq!(bytes, b"lightning|strikes=0|warnings=0|next=7");
    }

    #[test]
    fn test_from_fields_missing_instance_returns_none() {
        let msg = Message::new("lightning")
            .with("strikes", 1)
            .with("warnings", 0)
            .with("next", 3);
        assert_eq!(msg.to_snapshot::<HazardSnapshot>(), None);
    }

    #[test]
    fn test_from_fields_rejects_absurd_count() {
        for count in [-1.0, 1.5, 1e9] {
            let msg = Message::new("lightning")
                .with("strikes", count)
                .with("warnings", 0)
                .with("next", 3);
            assert_eq!(msg.to_snapshot::<HazardSnapshot>(), None, "count {count}");
        }
    }

    #[test]
    fn test_snapshot_timer_fires_once_per_interval() {
        let mut timer = SnapshotTimer::new(Duration::from_millis(100));
        let tick = Duration::from_millis(40);

        let fired: Vec<bool> = (0..6).map(|_| timer.tick(tick)).collect();

        assert_eq!(fired, [false, false, true, false, true, false]);
    }

    #[test]
    fn test_snapshot_timer_long_stall_fires_once() {
        let mut timer = SnapshotTimer::new(Duration::from_millis(100));

        assert!(timer.tick(Duration::from_secs(2)));
        assert!(!timer.tick(Duration::from_millis(10)));
    }

    #[test]
    fn test_snapshot_timer_reset_discards_progress() {
        let mut timer = SnapshotTimer::new(Duration::from_millis(100));
        timer.tick(Duration::from_millis(90));

        timer.reset();

        assert!(!timer.tick(Duration::from_millis(20)));
    }
}
