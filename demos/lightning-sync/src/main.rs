//! Lightning storm shared over the LAN.
//!
//! ```text
//! lightning-sync host
//! lightning-sync join 192.168.1.20
//! ```
//!
//! The host runs the storm and broadcasts it; joiners mirror it and log
//! every strike that lands on a player.

mod lightning;

use std::collections::BTreeMap;
use std::time::Duration;

use boltlink::prelude::*;
use clap::{Parser, Subcommand};
use tokio::time::{Instant, MissedTickBehavior};
use tracing_subscriber::EnvFilter;

use lightning::{Hit, Lightning, Player};

const HIT: &str = "hit";

#[derive(Parser, Debug)]
#[command(name = "lightning-sync", about = "Shared lightning storm for up to three players")]
struct Args {
    /// UDP port the host listens on.
    #[arg(long, global = true, default_value_t = DEFAULT_PORT)]
    port: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Host a session as player 1.
    Host,
    /// Join the session hosted at ADDRESS.
    Join { address: String },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), NetError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = NetConfig::with_port(args.port);
    let tick = config.tick_duration();
    let mut game = Game::new(Network::new(RenetBackend::default(), config));

    match &args.command {
        Command::Host => {
            game.net.start_host()?;
            tracing::info!(address = %lan_address(), port = args.port, "tell the others to join");
        }
        Command::Join { address } => game.net.start_client(address)?,
    }

    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut last = Instant::now();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => break,
        }
        let now = Instant::now();
        let dt = now - last;
        last = now;

        if !game.tick(dt)? {
            break;
        }
    }

    game.net.stop();
    Ok(())
}

struct Game {
    net: Network<RenetBackend>,
    storm: Lightning,
    players: BTreeMap<PlayerId, Player>,
    timer: SnapshotTimer,
    rng: rand::rngs::ThreadRng,
}

impl Game {
    fn new(net: Network<RenetBackend>) -> Self {
        let mut rng = rand::rng();
        Self {
            storm: Lightning::new(&mut rng),
            players: BTreeMap::from([(PlayerId::HOST, Player::spawn(PlayerId::HOST))]),
            timer: SnapshotTimer::new(net.config().snapshot_interval),
            net,
            rng,
        }
    }

    /// Runs one simulation tick. Returns `false` once there is nothing left
    /// to do.
    fn tick(&mut self, dt: Duration) -> Result<bool, NetError> {
        self.net.update(dt);
        for event in self.net.messages() {
            if !self.handle(event) {
                return Ok(false);
            }
        }

        if self.net.role() == Role::Host {
            let hits = self
                .storm
                .update(dt.as_secs_f64(), &mut self.players, &mut self.rng);
            for hit in hits {
                tracing::info!(player_id = %hit.player_id, life = hit.life, "struck by lightning");
                self.net.send(&hit_message(hit), true)?;
            }
            if self.timer.tick(dt) {
                self.net
                    .broadcast_snapshot(HazardSnapshot::KIND, &self.storm.snapshot(), false)?;
            }
        }
        Ok(true)
    }

    fn handle(&mut self, event: NetEvent) -> bool {
        match event {
            NetEvent::Connected => tracing::info!("connected, waiting for a player id"),
            NetEvent::IdAssigned { player_id } => {
                tracing::info!(%player_id, "joined the storm");
            }
            NetEvent::ServerFull => tracing::warn!("session is full"),
            NetEvent::Disconnected => {
                tracing::warn!("lost the host");
                return false;
            }
            NetEvent::PlayerConnected { player_id } => {
                tracing::info!(%player_id, "player joined");
                self.players.insert(player_id, Player::spawn(player_id));
            }
            NetEvent::PlayerDisconnected { player_id } => {
                tracing::info!(%player_id, "player left");
                self.players.remove(&player_id);
            }
            NetEvent::Message { message, from } => match (message.kind.as_str(), from) {
                (HazardSnapshot::KIND, None) => match message.to_snapshot::<HazardSnapshot>() {
                    Some(snapshot) => {
                        self.storm.apply_snapshot(snapshot);
                        tracing::trace!(
                            strikes = self.storm.strikes().len(),
                            warnings = self.storm.warnings().len(),
                            "storm synced"
                        );
                    }
                    None => tracing::debug!("malformed storm snapshot"),
                },
                (HIT, None) => {
                    let player = message.fields.number("player").and_then(PlayerId::from_number);
                    let life = message.fields.number("life");
                    if let (Some(player_id), Some(life)) = (player, life) {
                        let you = player_id == self.net.local_player_id();
                        tracing::info!(%player_id, life, you, "struck by lightning");
                    }
                }
                // Anything a client sends is passed on to the others. A
                // message that cannot be passed on costs only that message.
                (_, Some(from)) => {
                    if let Err(err) = self.net.relay(from, &message, true) {
                        tracing::warn!(%from, kind = %message.kind, %err, "dropping unrelayable message");
                    }
                }
                (kind, None) => tracing::debug!(kind, "ignoring message"),
            },
        }
        true
    }
}

fn hit_message(hit: Hit) -> Message {
    Message::new(HIT)
        .with("player", hit.player_id)
        .with("life", hit.life)
}
