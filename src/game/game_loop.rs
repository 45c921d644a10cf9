//! Tick driver
//!
//! Owns the simulation state, the injected collaborators and the event bus.
//! One call to [`GameLoop::tick`] runs every system once in a fixed order and
//! publishes whatever they emitted.

use crossbeam_channel::Receiver;

use crate::config::SimConfig;
use crate::game::constants::physics::MAX_DT;
use crate::game::error::SimError;
use crate::game::events::{EventBus, SimEvent};
use crate::game::state::{ActorId, ActorTemplate, Arena, Faction, SimState};
use crate::game::systems::skills::{self, CastOptions};
use crate::game::systems::{buffs, collision, effects, harvest, lifecycle, movement, progression};
use crate::services::{ActiveBuff, Services};
use crate::util::vec2::Vec2;

pub struct GameLoop {
    config: SimConfig,
    state: SimState,
    services: Services,
    bus: EventBus,
}

impl GameLoop {
    pub fn new(config: SimConfig, services: Services) -> Result<Self, SimError> {
        config.validate().map_err(SimError::InvalidConfig)?;
        let arena = Arena::new(config.arena_width, config.arena_height)?;
        let state = SimState::new(arena, &config.stage, config.party.clone());
        tracing::info!(
            width = arena.width,
            height = arena.height,
            stage = %config.stage,
            party = config.party.len(),
            "Simulation created"
        );
        Ok(Self {
            config,
            state,
            services,
            bus: EventBus::new(),
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn state(&self) -> &SimState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SimState {
        &mut self.state
    }

    pub fn services_mut(&mut self) -> &mut Services {
        &mut self.services
    }

    /// Call `f` for every event published from now on
    pub fn subscribe<F>(&mut self, f: F)
    where
        F: FnMut(&SimEvent) + Send + 'static,
    {
        self.bus.subscribe(f);
    }

    /// Bounded receiver for consumers on another thread
    pub fn event_channel(&mut self, capacity: usize) -> Receiver<SimEvent> {
        self.bus.channel(capacity)
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn spawn_ally(&mut self, template: &ActorTemplate, id: Option<ActorId>) -> Result<ActorId, SimError> {
        lifecycle::spawn_actor(&mut self.state, &mut self.services, template, Faction::Ally, false, id)
    }

    pub fn spawn_enemy(&mut self, template: &ActorTemplate, is_boss: bool) -> Result<ActorId, SimError> {
        if !is_boss && self.state.regular_enemy_count() >= self.config.max_enemies {
            return Err(SimError::CapacityReached(self.config.max_enemies));
        }
        let id = lifecycle::spawn_actor(&mut self.state, &mut self.services, template, Faction::Enemy, is_boss, None)?;
        if is_boss {
            self.state.session.boss_spawned = true;
            self.state.session.boss_id = Some(id);
        }
        Ok(id)
    }

    /// Remove an actor and everything it owns; false if it was already gone
    pub fn despawn(&mut self, id: ActorId) -> bool {
        lifecycle::despawn(&mut self.state, &mut self.services, id)
    }

    pub fn apply_buff(&mut self, id: ActorId, buff_id: &str, duration_secs: f32) -> Result<bool, SimError> {
        if self.state.get_actor(id).is_none() {
            return Err(SimError::UnknownActor(id));
        }
        if buffs::definition(&self.services, buff_id).is_none() {
            return Err(SimError::UnknownBuff(buff_id.to_string()));
        }
        Ok(buffs::apply(&mut self.state, &mut self.services, id, buff_id, duration_secs))
    }

    pub fn remove_buff(&mut self, id: ActorId, buff_id: &str) -> bool {
        buffs::remove(&mut self.state, &mut self.services, id, buff_id)
    }

    pub fn has_buff(&self, id: ActorId, buff_id: &str) -> bool {
        buffs::has(&self.services, id, buff_id)
    }

    pub fn active_buffs(&self, id: ActorId) -> Vec<ActiveBuff> {
        buffs::active(&self.services, id)
    }

    /// Cast a skill immediately, paying the caster's MP as a normal cast would
    pub fn cast_skill(&mut self, caster: ActorId, skill_id: &str) -> Result<bool, SimError> {
        skills::cast_skill(&mut self.state, &mut self.services, caster, skill_id, CastOptions::default())
    }

    /// Crisis value as observers see it
    pub fn reported_crisis(&self) -> u32 {
        self.state.session.reported_crisis()
    }

    pub fn total_kills(&self) -> u64 {
        self.state.session.total_kills
    }

    /// Advance the simulation by `dt` seconds (clamped) and publish the tick's events
    pub fn tick(&mut self, dt: f32) -> Vec<SimEvent> {
        let dt = if dt.is_finite() { dt.clamp(0.0, MAX_DT) } else { 0.0 };
        self.state.tick += 1;
        self.state.advance_clock(dt);

        let state = &mut self.state;
        let services = &mut self.services;

        movement::update(state, dt);
        collision::update(state, services);
        harvest::update(state, services);
        skills::update(state, services);
        skills::run_scheduled(state, services);
        effects::update(state, services, dt);
        buffs::update(state, services);
        lifecycle::update(state, services);
        progression::update(state, services, &self.config);

        sanitize(state);
        emit_motion(state);

        let events = self.state.drain_events();
        self.bus.publish(&events);
        events
    }
}

fn emit_motion(state: &mut SimState) {
    let samples: Vec<SimEvent> = state
        .actors
        .values()
        .filter(|a| a.is_alive())
        .map(|a| SimEvent::Motion {
            actor: a.id,
            position: a.position,
            velocity: a.velocity,
        })
        .collect();
    for event in samples {
        state.emit(event);
    }
}

/// Replace non-finite positions and velocities before they spread
fn sanitize(state: &mut SimState) {
    let arena = state.arena;
    for actor in state.actors.values_mut() {
        if !actor.position.x.is_finite() || !actor.position.y.is_finite() {
            tracing::warn!(actor = %actor.id, "Fixed non-finite position");
            actor.position = arena.center();
        }
        if !actor.velocity.x.is_finite() || !actor.velocity.y.is_finite() {
            tracing::warn!(actor = %actor.id, "Fixed non-finite velocity");
            actor.velocity = Vec2::ZERO;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PartyMember;
    use crate::game::state::Actor;
    use crate::game::test_support::{create_test_services, test_loop};
    use crate::services::Catalog;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use uuid::Uuid;

    fn add_at(game: &mut GameLoop, faction: Faction, position: Vec2) -> ActorId {
        let mut actor = Actor::new(Uuid::new_v4(), "test", faction, position);
        actor.next_direction_change_ms = u64::MAX;
        game.state_mut().add_actor(actor).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = SimConfig::default();
        config.tick_rate = 0;
        let Err(err) = GameLoop::new(config, create_test_services()) else {
            panic!("zero tick rate should be rejected");
        };
        assert!(matches!(err, SimError::InvalidConfig(_)));
    }

    #[test]
    fn test_clock_carries_fractional_ms() {
        let mut game = test_loop();
        for _ in 0..30 {
            game.tick(1.0 / 30.0);
        }
        assert_eq!(game.state().now_ms, 1000);
    }

    #[test]
    fn test_dt_is_clamped() {
        let mut game = test_loop();
        game.tick(5.0);
        assert_eq!(game.state().now_ms, 100);
        game.tick(f32::NAN);
        assert_eq!(game.state().now_ms, 100);
        assert_eq!(game.state().tick, 2);
    }

    #[test]
    fn test_subscribers_and_channels_receive_events() {
        let mut game = test_loop();
        let seen = Arc::new(Mutex::new(0usize));
        let counter = seen.clone();
        game.subscribe(move |_| *counter.lock() += 1);
        let rx = game.event_channel(64);

        add_at(&mut game, Faction::Ally, Vec2::new(200.0, 200.0));
        let events = game.tick(0.05);
        assert!(!events.is_empty());
        assert_eq!(*seen.lock(), events.len());
        assert_eq!(rx.try_iter().count(), events.len());
    }

    #[test]
    fn test_motion_sampled_for_alive_actors() {
        let mut game = test_loop();
        let id = add_at(&mut game, Faction::Enemy, Vec2::new(300.0, 300.0));
        let events = game.tick(0.05);
        assert!(events
            .iter()
            .any(|e| matches!(e, SimEvent::Motion { actor, .. } if *actor == id)));
    }

    #[test]
    fn test_lethal_collision_through_tick() {
        let mut game = test_loop();
        let ally = add_at(&mut game, Faction::Ally, Vec2::new(400.0, 400.0));
        let enemy = add_at(&mut game, Faction::Enemy, Vec2::new(440.0, 400.0));
        game.state_mut().get_actor_mut(enemy).unwrap().vitals.hp = 3.0;

        let events = game.tick(0.0);
        assert!(game.state().get_actor(enemy).is_none());
        assert_eq!(game.total_kills(), 1);
        assert_eq!(game.reported_crisis(), 5);
        assert!(events.iter().any(|e| matches!(
            e,
            SimEvent::Died { killer: Some(k), .. } if *k == ally
        )));
    }

    #[test]
    fn test_full_mp_ally_casts_on_tick() {
        let mut game = test_loop();
        let catalog = Catalog::builtin().unwrap();
        let knight = catalog.party_template("knight").unwrap().clone();
        let id = game.spawn_ally(&knight, None).unwrap();
        let max_mp = game.state().get_actor(id).unwrap().vitals.max_mp;
        game.state_mut().get_actor_mut(id).unwrap().vitals.mp = max_mp;

        let events = game.tick(0.01);
        assert!(events
            .iter()
            .any(|e| matches!(e, SimEvent::SkillCast { caster, .. } if *caster == id)));
        assert!(game.has_buff(id, "rage"));
        assert_eq!(game.state().get_actor(id).unwrap().vitals.mp, 0.0);
    }

    #[test]
    fn test_despawn_clears_owned_effects() {
        let mut game = test_loop();
        let caster = add_at(&mut game, Faction::Ally, Vec2::new(500.0, 400.0));
        assert!(game.cast_skill(caster, "blade_dance").unwrap());
        assert!(game.state().effects.iter().any(|e| e.owner == caster));

        assert!(game.despawn(caster));
        assert!(game.state().effects.is_empty());
        assert!(!game.despawn(caster));
    }

    #[test]
    fn test_buff_errors() {
        let mut game = test_loop();
        let id = add_at(&mut game, Faction::Enemy, Vec2::new(300.0, 300.0));
        assert_eq!(
            game.apply_buff(id, "nope", 1.0),
            Err(SimError::UnknownBuff("nope".into()))
        );
        let ghost = Uuid::new_v4();
        assert_eq!(game.apply_buff(ghost, "haste", 1.0), Err(SimError::UnknownActor(ghost)));
        assert_eq!(game.apply_buff(id, "haste", 1.0), Ok(true));
        assert_eq!(game.active_buffs(id).len(), 1);
        assert!(game.remove_buff(id, "haste"));
    }

    #[test]
    fn test_buff_expires_over_ticks() {
        let mut game = test_loop();
        let id = add_at(&mut game, Faction::Enemy, Vec2::new(300.0, 300.0));
        game.apply_buff(id, "haste", 0.2).unwrap();
        assert_eq!(game.state().get_actor(id).unwrap().stats.move_speed, 70.0);

        game.tick(0.1);
        assert!(game.has_buff(id, "haste"));
        game.tick(0.1);
        assert!(!game.has_buff(id, "haste"));
        assert_eq!(game.state().get_actor(id).unwrap().stats.move_speed, 40.0);
    }

    #[test]
    fn test_enemy_cap_on_manual_spawn() {
        let mut config = SimConfig::default();
        config.max_enemies = 1;
        let mut game = GameLoop::new(config, create_test_services()).unwrap();
        let catalog = Catalog::builtin().unwrap();
        let slime = catalog.enemy_template("slime").unwrap().clone();
        assert!(game.spawn_enemy(&slime, false).is_ok());
        assert_eq!(game.spawn_enemy(&slime, false), Err(SimError::CapacityReached(1)));
    }

    #[test]
    fn test_periodic_spawns_from_first_tick() {
        let config = SimConfig::default().with_party(vec![PartyMember::new(Uuid::new_v4(), 40)]);
        let mut game = GameLoop::new(config, create_test_services()).unwrap();
        game.tick(0.05);
        assert_eq!(game.state().regular_enemy_count(), 1);
        assert_eq!(game.state().nodes.len(), 1);
    }

    #[test]
    fn test_non_finite_position_repaired() {
        let mut game = test_loop();
        let id = add_at(&mut game, Faction::Enemy, Vec2::new(300.0, 300.0));
        game.state_mut().get_actor_mut(id).unwrap().velocity = Vec2::new(f32::NAN, 0.0);
        game.tick(0.05);
        let actor = game.state().get_actor(id).unwrap();
        assert!(actor.position.x.is_finite());
        assert!(actor.velocity.x.is_finite());
    }
}
