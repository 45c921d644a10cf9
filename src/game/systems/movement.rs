//! Wandering, boss pursuit and position integration

use rand::Rng;

use crate::game::constants::movement::{
    BOSS_ACCELERATION, BOSS_TRACKING_PAUSE_MS, RENORMALIZE_RATE, SLIP_MAX_MS, SLIP_MIN_MS, WANDER_MAX_MS,
    WANDER_MIN_MS,
};
use crate::game::state::{Actor, Faction, SimState};
use crate::game::systems::arena::{bounce_off_edges, random_velocity};
use crate::util::vec2::Vec2;

/// Delay until the next wander re-roll
pub fn reroll_delay_ms<R: Rng + ?Sized>(rng: &mut R, slipping: bool) -> u64 {
    if slipping {
        rng.gen_range(SLIP_MIN_MS..=SLIP_MAX_MS)
    } else {
        rng.gen_range(WANDER_MIN_MS..=WANDER_MAX_MS)
    }
}

/// Pick a fresh heading at the actor's cruising speed
pub fn start_wander<R: Rng + ?Sized>(actor: &mut Actor, now_ms: u64, rng: &mut R) {
    actor.velocity = random_velocity(rng, actor.target_speed());
    actor.next_direction_change_ms = now_ms + reroll_delay_ms(rng, actor.slipping);
}

/// Move every alive actor one step
pub fn update(state: &mut SimState, dt: f32) {
    let now = state.now_ms;
    let arena = state.arena;
    let mut rng = rand::thread_rng();

    let ally_positions: Vec<Vec2> = state.alive_of(Faction::Ally).map(|a| a.position).collect();

    for actor in state.actors.values_mut() {
        if !actor.is_alive() {
            continue;
        }

        let recovering = actor.in_knockback(now);
        let pursuing = actor.is_boss
            && !ally_positions.is_empty()
            && actor
                .since_collision(now)
                .map(|elapsed| elapsed >= BOSS_TRACKING_PAUSE_MS)
                .unwrap_or(true);

        if pursuing {
            if let Some(target) = nearest(actor.position, &ally_positions) {
                actor.velocity += actor.position.direction_to(target) * (BOSS_ACCELERATION * dt);
            }
        } else if !recovering && now >= actor.next_direction_change_ms {
            start_wander(actor, now, &mut rng);
        }

        if !recovering {
            renormalize(actor, dt, &mut rng);
        }

        if !actor.can_move {
            continue;
        }

        actor.position += actor.velocity * dt;
        bounce_off_edges(&arena, &mut actor.position, &mut actor.velocity, &mut rng);
    }
}

/// Ease the speed toward the stat-derived target without changing heading
fn renormalize<R: Rng + ?Sized>(actor: &mut Actor, dt: f32, rng: &mut R) {
    let target = actor.target_speed();
    let (dir, speed) = actor.velocity.normalize_with_length();
    if speed <= f32::EPSILON {
        if target > 0.0 {
            actor.velocity = random_velocity(rng, target);
        }
        return;
    }
    let t = (RENORMALIZE_RATE * dt).min(1.0);
    actor.velocity = dir * (speed + (target - speed) * t);
}

fn nearest(from: Vec2, candidates: &[Vec2]) -> Option<Vec2> {
    candidates
        .iter()
        .copied()
        .min_by(|a, b| from.distance_sq_to(*a).total_cmp(&from.distance_sq_to(*b)))
}
