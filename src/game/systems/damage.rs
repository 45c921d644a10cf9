//! Damage and mitigation pipeline
//!
//! Fixed order: dodge, defense, crit, iron fortress, nullification, then
//! shield and HP. The only side effects are on the defender passed in; the
//! caller clears the attacker's guaranteed-crit flag when the outcome says it
//! was used.

use rand::Rng;
use smallvec::SmallVec;

use crate::game::constants::combat::{MAX_MITIGATION_PERCENT, MIN_DAMAGE};
use crate::game::state::{Actor, ActorId, CombatStats};

/// Attacker side of a hit
#[derive(Debug, Clone, Copy)]
pub struct Attack {
    pub stats: CombatStats,
    /// Pre-computed skill damage; collisions use the attacker's attack stat
    pub base: Option<f32>,
    pub guaranteed_crit: bool,
}

impl Attack {
    pub fn from_actor(actor: &Actor, base: Option<f32>) -> Self {
        Self {
            stats: actor.stats,
            base,
            guaranteed_crit: actor.passive.guaranteed_crit,
        }
    }
}

/// Ally aura that can nullify a hit on the defender
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Protector {
    pub id: ActorId,
    pub chance_pct: f32,
}

/// Defender-side passive modifiers gathered by the caller
#[derive(Debug, Clone, Default)]
pub struct DefenseModifiers {
    /// (reduction %, reduction % while shielded)
    pub iron_fortress: Option<(f32, f32)>,
    pub protectors: SmallVec<[Protector; 4]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitKind {
    Miss,
    Nullified { protector: ActorId },
    Landed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageOutcome {
    pub kind: HitKind,
    /// Final damage after mitigation, shield included
    pub damage: u32,
    /// Portion taken by the shield
    pub absorbed: u32,
    pub is_critical: bool,
    pub used_guaranteed_crit: bool,
}

impl DamageOutcome {
    fn miss() -> Self {
        Self {
            kind: HitKind::Miss,
            damage: 0,
            absorbed: 0,
            is_critical: false,
            used_guaranteed_crit: false,
        }
    }
}

/// Percent roll; 0 never succeeds and 100 always does
pub fn roll_percent<R: Rng + ?Sized>(rng: &mut R, pct: f32) -> bool {
    pct > 0.0 && rng.gen_range(0.0..100.0) < pct
}

/// Raw damage after the defense fraction, floored to a whole number >= 1
pub fn mitigate(raw: f32, defense: f32) -> f32 {
    let fraction = defense.min(MAX_MITIGATION_PERCENT) / 100.0;
    (raw.max(0.0) * (1.0 - fraction)).floor().max(MIN_DAMAGE)
}

/// Run one hit through the pipeline and apply it to the defender
pub fn resolve<R: Rng + ?Sized>(
    rng: &mut R,
    attack: &Attack,
    defender: &mut Actor,
    modifiers: &DefenseModifiers,
) -> DamageOutcome {
    // 1. Dodge
    if roll_percent(rng, defender.stats.dodge_rate) {
        return DamageOutcome::miss();
    }

    // 2. Defense
    let raw = attack.base.unwrap_or(attack.stats.attack);
    let mut damage = mitigate(raw, defender.stats.defense);

    // 3. Crit. One-shot flags override the roll and are consumed.
    let exposed = std::mem::take(&mut defender.passive.exposed_weakness);
    let used_guaranteed_crit = attack.guaranteed_crit;
    let is_critical = exposed || used_guaranteed_crit || roll_percent(rng, attack.stats.crit_rate);
    if is_critical {
        damage *= attack.stats.crit_damage.max(100.0) / 100.0;
    }

    // 4. Iron fortress
    if let Some((reduction, shielded_reduction)) = modifiers.iron_fortress {
        let pct = if defender.vitals.shield > 0.0 {
            shielded_reduction
        } else {
            reduction
        };
        damage *= 1.0 - pct.clamp(0.0, MAX_MITIGATION_PERCENT) / 100.0;
    }

    // 5. Nullification, one independent roll per protector
    for protector in &modifiers.protectors {
        if roll_percent(rng, protector.chance_pct) {
            return DamageOutcome {
                kind: HitKind::Nullified {
                    protector: protector.id,
                },
                damage: 0,
                absorbed: 0,
                is_critical,
                used_guaranteed_crit,
            };
        }
    }

    // 6. Shield then HP
    let final_damage = damage.floor().max(MIN_DAMAGE);
    let absorbed = defender.vitals.absorb(final_damage);

    DamageOutcome {
        kind: HitKind::Landed,
        damage: final_damage as u32,
        absorbed: absorbed as u32,
        is_critical,
        used_guaranteed_crit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{Attributes, Faction};
    use crate::util::vec2::Vec2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use uuid::Uuid;

    fn create_defender(defense: f32, dodge_rate: f32) -> Actor {
        let stats = CombatStats {
            defense,
            dodge_rate,
            ..CombatStats::default()
        };
        Actor::new(Uuid::new_v4(), "defender", Faction::Enemy, Vec2::ZERO)
            .with_stats(stats, Attributes::default(), 1_000.0, 0.0)
    }

    fn create_attack(attack: f32) -> Attack {
        Attack {
            stats: CombatStats {
                attack,
                crit_rate: 0.0,
                crit_damage: 200.0,
                ..CombatStats::default()
            },
            base: None,
            guaranteed_crit: false,
        }
    }

    #[test]
    fn test_full_dodge_always_misses() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut defender = create_defender(0.0, 100.0);
        for attack in [1.0, 50.0, 10_000.0] {
            let mut a = create_attack(attack);
            a.guaranteed_crit = true;
            let outcome = resolve(&mut rng, &a, &mut defender, &DefenseModifiers::default());
            assert_eq!(outcome.kind, HitKind::Miss);
            assert_eq!(outcome.damage, 0);
        }
        assert_eq!(defender.vitals.hp, 1_000.0);
    }

    #[test]
    fn test_no_defense_no_crit_is_floor_of_attack() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut defender = create_defender(0.0, 0.0);
        let outcome = resolve(&mut rng, &create_attack(37.8), &mut defender, &DefenseModifiers::default());
        assert_eq!(outcome.kind, HitKind::Landed);
        assert_eq!(outcome.damage, 37);
        assert!(!outcome.is_critical);
        assert_eq!(defender.vitals.hp, 963.0);
    }

    #[test]
    fn test_minimum_damage_is_one() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut defender = create_defender(95.0, 0.0);
        let outcome = resolve(&mut rng, &create_attack(0.3), &mut defender, &DefenseModifiers::default());
        assert_eq!(outcome.damage, 1);
    }

    #[test]
    fn test_defense_fraction() {
        assert_eq!(mitigate(100.0, 25.0), 75.0);
        assert_eq!(mitigate(10.0, 99.0), 1.0);
        // Negative defense amplifies
        assert_eq!(mitigate(100.0, -10.0), 110.0);
    }

    #[test]
    fn test_skill_base_overrides_attack() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut defender = create_defender(50.0, 0.0);
        let mut attack = create_attack(999.0);
        attack.base = Some(40.0);
        let outcome = resolve(&mut rng, &attack, &mut defender, &DefenseModifiers::default());
        assert_eq!(outcome.damage, 20);
    }

    #[test]
    fn test_guaranteed_crit_reported_as_used() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut defender = create_defender(0.0, 0.0);
        let mut attack = create_attack(10.0);
        attack.guaranteed_crit = true;
        let outcome = resolve(&mut rng, &attack, &mut defender, &DefenseModifiers::default());
        assert!(outcome.is_critical);
        assert!(outcome.used_guaranteed_crit);
        assert_eq!(outcome.damage, 20);
    }

    #[test]
    fn test_exposed_weakness_consumed() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut defender = create_defender(0.0, 0.0);
        defender.passive.exposed_weakness = true;

        let first = resolve(&mut rng, &create_attack(10.0), &mut defender, &DefenseModifiers::default());
        assert!(first.is_critical);
        assert!(!defender.passive.exposed_weakness);

        let second = resolve(&mut rng, &create_attack(10.0), &mut defender, &DefenseModifiers::default());
        assert!(!second.is_critical);
    }

    #[test]
    fn test_iron_fortress_stronger_when_shielded() {
        let mut rng = StdRng::seed_from_u64(1);
        let modifiers = DefenseModifiers {
            iron_fortress: Some((10.0, 50.0)),
            ..DefenseModifiers::default()
        };

        let mut bare = create_defender(0.0, 0.0);
        let outcome = resolve(&mut rng, &create_attack(100.0), &mut bare, &modifiers);
        assert_eq!(outcome.damage, 90);

        let mut shielded = create_defender(0.0, 0.0);
        shielded.vitals.add_shield(5.0);
        let outcome = resolve(&mut rng, &create_attack(100.0), &mut shielded, &modifiers);
        assert_eq!(outcome.damage, 50);
        assert_eq!(outcome.absorbed, 5);
        assert_eq!(shielded.vitals.hp, 955.0);
    }

    #[test]
    fn test_certain_protector_nullifies() {
        let mut rng = StdRng::seed_from_u64(1);
        let protector = Uuid::new_v4();
        let mut modifiers = DefenseModifiers::default();
        modifiers.protectors.push(Protector {
            id: protector,
            chance_pct: 100.0,
        });
        let mut defender = create_defender(0.0, 0.0);
        let outcome = resolve(&mut rng, &create_attack(100.0), &mut defender, &modifiers);
        assert_eq!(outcome.kind, HitKind::Nullified { protector });
        assert_eq!(outcome.damage, 0);
        assert_eq!(defender.vitals.hp, 1_000.0);
    }

    #[test]
    fn test_hp_floors_at_zero() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut defender = create_defender(0.0, 0.0);
        defender.vitals.hp = 5.0;
        resolve(&mut rng, &create_attack(500.0), &mut defender, &DefenseModifiers::default());
        assert_eq!(defender.vitals.hp, 0.0);
        assert_eq!(defender.vitals.shield, 0.0);
    }
}
