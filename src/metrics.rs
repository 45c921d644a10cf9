//! Prometheus-compatible simulation metrics
//!
//! Gauges are refreshed from the simulation state after every tick; the
//! headless driver can serve them over plain HTTP on `METRICS_PORT`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::game::state::{Faction, SimState};

const TICK_HISTORY: usize = 1000;

#[derive(Debug)]
pub struct SimMetrics {
    // Actors
    pub allies_alive: AtomicU64,
    pub allies_injured: AtomicU64,
    pub enemies_alive: AtomicU64,
    pub boss_alive: AtomicU64,

    // Transient entities
    pub effect_count: AtomicU64,
    pub node_count: AtomicU64,
    pub scheduled_tasks: AtomicU64,

    // Progression
    pub total_kills: AtomicU64,
    pub crisis: AtomicU64,
    pub events_published: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,
    pub sim_time_ms: AtomicU64,

    start_time: Instant,
    tick_history: RwLock<VecDeque<u64>>,
}

impl SimMetrics {
    pub fn new() -> Self {
        Self {
            allies_alive: AtomicU64::new(0),
            allies_injured: AtomicU64::new(0),
            enemies_alive: AtomicU64::new(0),
            boss_alive: AtomicU64::new(0),
            effect_count: AtomicU64::new(0),
            node_count: AtomicU64::new(0),
            scheduled_tasks: AtomicU64::new(0),
            total_kills: AtomicU64::new(0),
            crisis: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            sim_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY)),
        }
    }

    /// Record one tick's wall time and refresh the percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY {
            history.pop_front();
        }
        if history.len() < 10 {
            return;
        }

        let mut sorted: Vec<u64> = history.iter().copied().collect();
        sorted.sort_unstable();
        let at = |q: f32| sorted[((sorted.len() as f32 * q) as usize).min(sorted.len() - 1)];
        self.tick_time_p95_us.store(at(0.95), Ordering::Relaxed);
        self.tick_time_p99_us.store(at(0.99), Ordering::Relaxed);
        self.tick_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
    }

    /// Snapshot gauges from the current state
    pub fn update_from(&self, state: &SimState, events_published: usize) {
        let injured = state
            .actors
            .values()
            .filter(|a| a.faction == Faction::Ally && a.is_injured())
            .count();
        self.allies_alive
            .store(state.alive_count(Faction::Ally) as u64, Ordering::Relaxed);
        self.allies_injured.store(injured as u64, Ordering::Relaxed);
        self.enemies_alive
            .store(state.alive_count(Faction::Enemy) as u64, Ordering::Relaxed);
        self.boss_alive.store(state.boss_alive() as u64, Ordering::Relaxed);
        self.effect_count.store(state.effects.len() as u64, Ordering::Relaxed);
        self.node_count.store(state.nodes.len() as u64, Ordering::Relaxed);
        self.scheduled_tasks
            .store(state.scheduler.len() as u64, Ordering::Relaxed);
        self.total_kills
            .store(state.session.total_kills, Ordering::Relaxed);
        self.crisis
            .store(state.session.reported_crisis() as u64, Ordering::Relaxed);
        self.events_published
            .fetch_add(events_published as u64, Ordering::Relaxed);
        self.sim_time_ms.store(state.now_ms, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Prometheus text exposition format
    pub fn render_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("skirmish_allies_alive", "Allies currently alive", "gauge",
            self.allies_alive.load(Ordering::Relaxed));
        metric!("skirmish_allies_injured", "Allies waiting to revive", "gauge",
            self.allies_injured.load(Ordering::Relaxed));
        metric!("skirmish_enemies_alive", "Enemies currently alive", "gauge",
            self.enemies_alive.load(Ordering::Relaxed));
        metric!("skirmish_boss_alive", "Whether a boss is in play (0/1)", "gauge",
            self.boss_alive.load(Ordering::Relaxed));

        metric!("skirmish_effects", "Active transient skill effects", "gauge",
            self.effect_count.load(Ordering::Relaxed));
        metric!("skirmish_resource_nodes", "Resource nodes in the arena", "gauge",
            self.node_count.load(Ordering::Relaxed));
        metric!("skirmish_scheduled_tasks", "Pending scheduled tasks", "gauge",
            self.scheduled_tasks.load(Ordering::Relaxed));

        metric!("skirmish_kills_total", "Enemies killed this session", "counter",
            self.total_kills.load(Ordering::Relaxed));
        metric!("skirmish_crisis_percent", "Reported crisis meter", "gauge",
            self.crisis.load(Ordering::Relaxed));
        metric!("skirmish_events_published_total", "Events published to observers", "counter",
            self.events_published.load(Ordering::Relaxed));

        metric!("skirmish_tick_time_microseconds", "Last tick time in microseconds", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("skirmish_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("skirmish_tick_time_p99_microseconds", "99th percentile tick time", "gauge",
            self.tick_time_p99_us.load(Ordering::Relaxed));
        metric!("skirmish_tick_time_max_microseconds", "Maximum tick time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("skirmish_tick_count", "Total ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));
        metric!("skirmish_sim_time_milliseconds", "Simulated clock", "counter",
            self.sim_time_ms.load(Ordering::Relaxed));
        metric!("skirmish_uptime_seconds", "Process uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    pub fn render_json(&self) -> String {
        serde_json::json!({
            "actors": {
                "allies_alive": self.allies_alive.load(Ordering::Relaxed),
                "allies_injured": self.allies_injured.load(Ordering::Relaxed),
                "enemies_alive": self.enemies_alive.load(Ordering::Relaxed),
                "boss_alive": self.boss_alive.load(Ordering::Relaxed) == 1,
            },
            "entities": {
                "effects": self.effect_count.load(Ordering::Relaxed),
                "nodes": self.node_count.load(Ordering::Relaxed),
                "scheduled": self.scheduled_tasks.load(Ordering::Relaxed),
            },
            "session": {
                "kills": self.total_kills.load(Ordering::Relaxed),
                "crisis": self.crisis.load(Ordering::Relaxed),
            },
            "performance": {
                "tick_time_us": self.tick_time_us.load(Ordering::Relaxed),
                "tick_time_p95_us": self.tick_time_p95_us.load(Ordering::Relaxed),
                "tick_time_p99_us": self.tick_time_p99_us.load(Ordering::Relaxed),
                "tick_count": self.tick_count.load(Ordering::Relaxed),
            },
        })
        .to_string()
    }
}

impl Default for SimMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serve `/metrics`, `/metrics/json` and `/health` until the listener fails
#[cfg(feature = "metrics_server")]
pub async fn start_metrics_server(metrics: std::sync::Arc<SimMetrics>, port: u16) -> anyhow::Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];
            let n = match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => n,
                Ok(_) => return,
                Err(e) => {
                    tracing::debug!("Failed to read from metrics socket {}: {}", peer, e);
                    return;
                }
            };
            let request = String::from_utf8_lossy(&buffer[..n]);

            let (content_type, body) = if request.starts_with("GET /metrics/json") {
                ("application/json", metrics.render_json())
            } else if request.starts_with("GET /metrics") {
                ("text/plain; version=0.0.4", metrics.render_prometheus())
            } else if request.starts_with("GET /health") {
                ("text/plain", "OK".to_string())
            } else {
                let _ = socket
                    .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                    .await;
                return;
            };
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                content_type,
                body.len(),
                body
            );
            if let Err(e) = socket.write_all(response.as_bytes()).await {
                tracing::debug!("Failed to write metrics response to {}: {}", peer, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::test_support::{spawn_test_actor, test_state};
    use crate::util::vec2::Vec2;

    #[test]
    fn test_record_tick_time() {
        let metrics = SimMetrics::new();
        for i in 0..100 {
            metrics.record_tick_time(Duration::from_micros(100 + i * 10));
        }
        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 100);
        assert_eq!(metrics.tick_time_max_us.load(Ordering::Relaxed), 1090);
        assert!(metrics.tick_time_p95_us.load(Ordering::Relaxed) >= 1040);
    }

    #[test]
    fn test_percentiles_wait_for_samples() {
        let metrics = SimMetrics::new();
        metrics.record_tick_time(Duration::from_micros(500));
        assert_eq!(metrics.tick_time_p99_us.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.tick_time_us.load(Ordering::Relaxed), 500);
    }

    #[test]
    fn test_update_from_state() {
        let mut state = test_state();
        spawn_test_actor(&mut state, Faction::Ally, Vec2::new(100.0, 100.0));
        let injured = spawn_test_actor(&mut state, Faction::Ally, Vec2::new(200.0, 100.0));
        state.get_actor_mut(injured).unwrap().life = crate::game::state::LifeState::Injured;
        spawn_test_actor(&mut state, Faction::Enemy, Vec2::new(300.0, 100.0));
        state.session.total_kills = 7;
        state.session.crisis = 35;

        let metrics = SimMetrics::new();
        metrics.update_from(&state, 12);
        assert_eq!(metrics.allies_alive.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.allies_injured.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.enemies_alive.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.crisis.load(Ordering::Relaxed), 35);
        assert_eq!(metrics.events_published.load(Ordering::Relaxed), 12);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = SimMetrics::new();
        metrics.total_kills.store(42, Ordering::Relaxed);
        metrics.enemies_alive.store(6, Ordering::Relaxed);

        let output = metrics.render_prometheus();
        assert!(output.contains("skirmish_kills_total 42"));
        assert!(output.contains("skirmish_enemies_alive 6"));
        assert!(output.contains("# TYPE skirmish_kills_total counter"));
    }

    #[test]
    fn test_json_format() {
        let metrics = SimMetrics::new();
        metrics.crisis.store(55, Ordering::Relaxed);
        let parsed: serde_json::Value = serde_json::from_str(&metrics.render_json()).unwrap();
        assert_eq!(parsed["session"]["crisis"], 55);
        assert_eq!(parsed["actors"]["boss_alive"], false);
    }
}
