//! Tick benchmarks for the skirmish simulation
//!
//! Run with: cargo bench --bench tick

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use uuid::Uuid;

use skirmish_sim::config::SimConfig;
use skirmish_sim::game::constants::physics::DT;
use skirmish_sim::game::game_loop::GameLoop;
use skirmish_sim::game::state::{Actor, Arena, Faction, SimState};
use skirmish_sim::game::systems::collision;
use skirmish_sim::services::{Catalog, Services};
use skirmish_sim::util::vec2::Vec2;

const WIDTH: f32 = 2000.0;
const HEIGHT: f32 = 1200.0;

fn random_actor<R: Rng>(rng: &mut R, i: usize) -> Actor {
    let faction = if i % 2 == 0 { Faction::Ally } else { Faction::Enemy };
    let position = Vec2::new(rng.gen_range(40.0..WIDTH - 40.0), rng.gen_range(40.0..HEIGHT - 40.0));
    let mut actor = Actor::new(Uuid::new_v4(), &format!("Actor{}", i), faction, position);
    actor.velocity = Vec2::new(rng.gen_range(-60.0..60.0), rng.gen_range(-60.0..60.0));
    actor.vitals.max_hp = 1.0e9;
    actor.vitals.hp = 1.0e9;
    actor
}

fn create_state(count: usize) -> SimState {
    let mut state = SimState::new(Arena::new(WIDTH, HEIGHT).unwrap(), "plains", Vec::new());
    let mut rng = rand::thread_rng();
    for i in 0..count {
        state.add_actor(random_actor(&mut rng, i)).unwrap();
    }
    state
}

fn create_loop(count: usize) -> GameLoop {
    let mut config = SimConfig::default();
    config.arena_width = WIDTH;
    config.arena_height = HEIGHT;
    config.max_enemies = count;
    let services = Services::from_catalog(&Catalog::builtin().unwrap());
    let mut game = GameLoop::new(config, services).unwrap();
    let mut rng = rand::thread_rng();
    for i in 0..count {
        game.state_mut().add_actor(random_actor(&mut rng, i)).unwrap();
    }
    game
}

fn bench_collision_detect(c: &mut Criterion) {
    let mut group = c.benchmark_group("collision_detect");
    group.sample_size(50);

    for count in [20, 50, 100, 200] {
        let state = create_state(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| black_box(collision::detect(&state)));
        });
    }
    group.finish();
}

fn bench_full_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_tick");
    group.sample_size(30);

    for count in [20, 50, 100, 200] {
        let mut game = create_loop(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| black_box(game.tick(DT).len()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_collision_detect, bench_full_tick);
criterion_main!(benches);
