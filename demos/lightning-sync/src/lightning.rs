//! Random lightning over a flat arena.
//!
//! A warning appears at a random spot, turns into a strike after
//! [`WARNING_DURATION`], and the strike hurts every living player within
//! [`STRIKE_RADIUS`]. The host runs this; clients only hold the copy they
//! get from snapshots.

use std::collections::BTreeMap;

use boltlink::prelude::*;
use rand::Rng;

pub const DAMAGE: u32 = 20;
pub const STRIKE_RADIUS: f64 = 50.0;
pub const MIN_INTERVAL: f64 = 4.0;
pub const MAX_INTERVAL: f64 = 10.0;
pub const FLASH_DURATION: f64 = 0.5;
pub const WARNING_DURATION: f64 = 1.0;

pub const ARENA_WIDTH: f64 = 800.0;
const EDGE_MARGIN: f64 = 60.0;

pub const MAX_LIFE: u32 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub x: f64,
    pub life: u32,
}

impl Player {
    /// Spreads players evenly across the arena by id.
    pub fn spawn(id: PlayerId) -> Self {
        Self {
            x: ARENA_WIDTH * f64::from(id.0) / 4.0,
            life: MAX_LIFE,
        }
    }
}

/// A player taking a hit, for the host to announce.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub player_id: PlayerId,
    pub life: u32,
}

#[derive(Debug, Default)]
pub struct Lightning {
    strikes: Vec<EffectInstance>,
    warnings: Vec<EffectInstance>,
    next_strike: f64,
}

impl Lightning {
    pub fn new(rng: &mut impl Rng) -> Self {
        Self {
            next_strike: next_interval(rng),
            ..Self::default()
        }
    }

    pub fn strikes(&self) -> &[EffectInstance] {
        &self.strikes
    }

    pub fn warnings(&self) -> &[EffectInstance] {
        &self.warnings
    }

    /// Advances the storm by `dt` seconds and applies strike damage.
    pub fn update(
        &mut self,
        dt: f64,
        players: &mut BTreeMap<PlayerId, Player>,
        rng: &mut impl Rng,
    ) -> Vec<Hit> {
        self.next_strike -= dt;
        if self.next_strike <= 0.0 {
            let x = rng.random_range(EDGE_MARGIN..ARENA_WIDTH - EDGE_MARGIN);
            self.warnings.push(EffectInstance { x, age: 0.0 });
            self.next_strike = next_interval(rng);
        }

        let mut hits = Vec::new();
        let mut landed = Vec::new();
        self.warnings.retain_mut(|warning| {
            warning.age += dt;
            if warning.age >= WARNING_DURATION {
                landed.push(warning.x);
                return false;
            }
            true
        });

        self.strikes.retain_mut(|bolt| {
            bolt.age += dt;
            bolt.age < FLASH_DURATION
        });

        for x in landed {
            self.strikes.push(EffectInstance { x, age: 0.0 });
            hits.extend(strike(x, players));
        }
        hits
    }
}

impl Replicated for Lightning {
    type Snapshot = HazardSnapshot;

    fn snapshot(&self) -> HazardSnapshot {
        HazardSnapshot {
            strikes: self.strikes.clone(),
            warnings: self.warnings.clone(),
            next_event_in: self.next_strike,
        }
    }

    fn apply_snapshot(&mut self, snapshot: HazardSnapshot) {
        self.strikes = snapshot.strikes;
        self.warnings = snapshot.warnings;
        self.next_strike = snapshot.next_event_in;
    }
}

fn strike(x: f64, players: &mut BTreeMap<PlayerId, Player>) -> Vec<Hit> {
    players
        .iter_mut()
        .filter(|(_, player)| player.life > 0 && (player.x - x).abs() <= STRIKE_RADIUS)
        .map(|(&player_id, player)| {
            player.life = player.life.saturating_sub(DAMAGE);
            Hit {
                player_id,
                life: player.life,
            }
        })
        .collect()
}

fn next_interval(rng: &mut impl Rng) -> f64 {
    rng.random_range(MIN_INTERVAL..MAX_INTERVAL)
}
