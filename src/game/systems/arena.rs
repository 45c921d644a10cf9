use rand::Rng;

use crate::game::constants::arena::{BOUNCE_JITTER, EDGE_MARGIN};
use crate::game::constants::spawn::{HOSTILE_SAFE_DISTANCE, MAX_PLACEMENT_ATTEMPTS, SAFE_DISTANCE};
use crate::game::state::Arena;
use crate::util::vec2::Vec2;

/// Random position inside the arena's margin
pub fn random_spawn_position(arena: &Arena) -> Vec2 {
    arena.random_point(&mut rand::thread_rng(), EDGE_MARGIN * 2.0)
}

/// Calculate a spawn position clear of other actors and further still from hostiles
pub fn safe_spawn_position(arena: &Arena, occupied: &[Vec2], hostiles: &[Vec2]) -> Vec2 {
    for _ in 0..MAX_PLACEMENT_ATTEMPTS {
        let pos = random_spawn_position(arena);

        let clear = occupied.iter().all(|other| pos.distance_to(*other) >= SAFE_DISTANCE)
            && hostiles
                .iter()
                .all(|other| pos.distance_to(*other) >= HOSTILE_SAFE_DISTANCE);

        if clear {
            return pos;
        }
    }

    // Fallback to random if can't find a clear spot
    random_spawn_position(arena)
}

/// Best of `samples` random positions by distance to the nearest threat
pub fn farthest_position(arena: &Arena, threats: &[Vec2], samples: u32) -> Vec2 {
    let mut best = random_spawn_position(arena);
    if threats.is_empty() {
        return best;
    }
    let nearest = |p: Vec2| {
        threats
            .iter()
            .map(|t| p.distance_sq_to(*t))
            .fold(f32::MAX, f32::min)
    };
    let mut best_score = nearest(best);
    for _ in 1..samples.max(1) {
        let candidate = random_spawn_position(arena);
        let score = nearest(candidate);
        if score > best_score {
            best = candidate;
            best_score = score;
        }
    }
    best
}

/// Velocity with a uniformly random heading
pub fn random_velocity<R: Rng + ?Sized>(rng: &mut R, speed: f32) -> Vec2 {
    Vec2::from_angle(rng.gen_range(0.0..std::f32::consts::TAU)) * speed
}

/// Reflect off any edge the position has crossed and add a little angular jitter
///
/// Returns true if a bounce happened.
pub fn bounce_off_edges<R: Rng + ?Sized>(
    arena: &Arena,
    position: &mut Vec2,
    velocity: &mut Vec2,
    rng: &mut R,
) -> bool {
    let min_x = EDGE_MARGIN.min(arena.width * 0.5);
    let max_x = arena.width - min_x;
    let min_y = EDGE_MARGIN.min(arena.height * 0.5);
    let max_y = arena.height - min_y;

    // Sign each axis must have after the bounce, if that axis bounced
    let mut force_x = None;
    let mut force_y = None;

    if position.x < min_x {
        position.x = min_x;
        force_x = Some(1.0);
    } else if position.x > max_x {
        position.x = max_x;
        force_x = Some(-1.0);
    }
    if position.y < min_y {
        position.y = min_y;
        force_y = Some(1.0);
    } else if position.y > max_y {
        position.y = max_y;
        force_y = Some(-1.0);
    }

    if force_x.is_none() && force_y.is_none() {
        return false;
    }

    if let Some(sign) = force_x {
        velocity.x = velocity.x.abs() * sign;
    }
    if let Some(sign) = force_y {
        velocity.y = velocity.y.abs() * sign;
    }

    *velocity = velocity.rotate(rng.gen_range(-BOUNCE_JITTER..=BOUNCE_JITTER));

    // Jitter must not point the actor back into the wall
    if let Some(sign) = force_x {
        velocity.x = velocity.x.abs() * sign;
    }
    if let Some(sign) = force_y {
        velocity.y = velocity.y.abs() * sign;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_arena() -> Arena {
        Arena::new(800.0, 600.0).unwrap()
    }

    #[test]
    fn test_random_spawn_inside_margin() {
        let arena = create_test_arena();
        for _ in 0..200 {
            let p = random_spawn_position(&arena);
            assert!(p.x >= EDGE_MARGIN && p.x <= arena.width - EDGE_MARGIN);
            assert!(p.y >= EDGE_MARGIN && p.y <= arena.height - EDGE_MARGIN);
        }
    }

    #[test]
    fn test_safe_spawn_avoids_hostiles() {
        let arena = create_test_arena();
        let hostile = arena.center();
        let mut clear = 0;
        for _ in 0..50 {
            let p = safe_spawn_position(&arena, &[], &[hostile]);
            if p.distance_to(hostile) >= HOSTILE_SAFE_DISTANCE {
                clear += 1;
            }
        }
        // A single hostile in the middle leaves plenty of room
        assert!(clear >= 48);
    }

    #[test]
    fn test_farthest_position_beats_random() {
        let arena = create_test_arena();
        let threats = [Vec2::new(100.0, 100.0), Vec2::new(700.0, 100.0)];
        let p = farthest_position(&arena, &threats, 20);
        let nearest = threats.iter().map(|t| p.distance_to(*t)).fold(f32::MAX, f32::min);
        assert!(nearest > 100.0);
    }

    #[test]
    fn test_bounce_reflects_and_clamps() {
        let arena = create_test_arena();
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let mut pos = Vec2::new(-5.0, 300.0);
            let mut vel = Vec2::new(-50.0, 0.0);
            assert!(bounce_off_edges(&arena, &mut pos, &mut vel, &mut rng));
            assert_eq!(pos.x, EDGE_MARGIN);
            assert!(vel.x > 0.0);
            assert!((vel.length() - 50.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_bounce_corner() {
        let arena = create_test_arena();
        let mut rng = rand::thread_rng();
        let mut pos = Vec2::new(900.0, 700.0);
        let mut vel = Vec2::new(30.0, 40.0);
        assert!(bounce_off_edges(&arena, &mut pos, &mut vel, &mut rng));
        assert!(vel.x <= 0.0 && vel.y <= 0.0);
    }

    #[test]
    fn test_no_bounce_inside() {
        let arena = create_test_arena();
        let mut rng = rand::thread_rng();
        let mut pos = arena.center();
        let mut vel = Vec2::new(30.0, 40.0);
        assert!(!bounce_off_edges(&arena, &mut pos, &mut vel, &mut rng));
        assert_eq!(vel, Vec2::new(30.0, 40.0));
    }
}
