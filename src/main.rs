use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use skirmish_sim::config::{PartyMember, SimConfig};
use skirmish_sim::game::events::SimEvent;
use skirmish_sim::game::game_loop::GameLoop;
use skirmish_sim::metrics::SimMetrics;
use skirmish_sim::services::{Catalog, Services};

/// Level cap given to the catalog party; the last member is a low-cap character
const PARTY_MAX_LEVEL: u32 = 60;
const LOW_CAP_LEVEL: u32 = 20;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Skirmish simulation v{}", env!("CARGO_PKG_VERSION"));

    let catalog = Catalog::builtin().context("builtin content catalog is malformed")?;
    let roster: Vec<(Uuid, _)> = catalog.party.iter().map(|t| (Uuid::new_v4(), t.clone())).collect();
    let party = roster
        .iter()
        .enumerate()
        .map(|(i, (id, _))| {
            let cap = if i + 1 == roster.len() { LOW_CAP_LEVEL } else { PARTY_MAX_LEVEL };
            PartyMember::new(*id, cap)
        })
        .collect();

    let config = SimConfig::load_or_default().with_party(party);
    info!(
        "Configuration loaded: {}x{} arena, stage={}, {} Hz, max_enemies={}",
        config.arena_width, config.arena_height, config.stage, config.tick_rate, config.max_enemies
    );

    let mut game = GameLoop::new(config.clone(), Services::from_catalog(&catalog))?;
    for (id, template) in &roster {
        if let Err(e) = game.spawn_ally(template, Some(*id)) {
            warn!(template = %template.template_id, error = %e, "Failed to spawn party member");
        }
    }

    game.subscribe(|event| match event {
        SimEvent::BossSpawned { actor } => info!(boss = %actor, "Boss entered the arena"),
        SimEvent::BossDefeated { actor } => info!(boss = %actor, "Boss defeated"),
        SimEvent::ResourceHarvested { node_type, drops, .. } => {
            debug!(node_type = %node_type, items = drops.len(), "Resource harvested")
        }
        SimEvent::LootDropped { loot, .. } => debug!(item = %loot.item_id, qty = loot.quantity, "Loot dropped"),
        _ => {}
    });

    let metrics = Arc::new(SimMetrics::new());
    start_metrics(metrics.clone());

    // Simulated seconds to run for; unset runs until Ctrl+C
    let limit_ms: Option<u64> = std::env::var("SIM_DURATION_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(|secs| secs * 1000);

    let mut ticker = interval(Duration::from_secs_f32(config.tick_dt()));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Simulation loop started at {} Hz", config.tick_rate);
    let log_every = config.tick_rate as u64 * 30;
    let mut last = Instant::now();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                }
                info!("Shutdown signal received");
                break;
            }
        }

        let now = Instant::now();
        let dt = now.duration_since(last).as_secs_f32();
        last = now;

        let events = game.tick(dt);
        metrics.record_tick_time(now.elapsed());
        metrics.update_from(game.state(), events.len());

        let state = game.state();
        if state.tick % log_every == 0 {
            info!(
                tick = state.tick,
                kills = state.session.total_kills,
                crisis = game.reported_crisis(),
                actors = state.actors.len(),
                effects = state.effects.len(),
                "Simulation status"
            );
        }

        if limit_ms.map(|limit| state.now_ms >= limit).unwrap_or(false) {
            info!("Simulated duration reached");
            break;
        }
    }

    let state = game.state();
    info!(
        ticks = state.tick,
        sim_ms = state.now_ms,
        kills = state.session.total_kills,
        dropped_events = game.bus().dropped_count(),
        "Simulation stopped"
    );
    Ok(())
}

/// Serve metrics when `METRICS_PORT` is set
#[cfg(feature = "metrics_server")]
fn start_metrics(metrics: Arc<SimMetrics>) {
    let Some(port) = std::env::var("METRICS_PORT").ok().and_then(|s| s.parse::<u16>().ok()) else {
        return;
    };
    tokio::spawn(async move {
        if let Err(e) = skirmish_sim::metrics::start_metrics_server(metrics, port).await {
            tracing::error!("Metrics server error: {}", e);
        }
    });
}

#[cfg(not(feature = "metrics_server"))]
fn start_metrics(_metrics: Arc<SimMetrics>) {}
