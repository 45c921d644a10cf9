pub mod arena;
pub mod buffs;
pub mod collision;
pub mod combat;
pub mod damage;
pub mod effects;
pub mod harvest;
pub mod lifecycle;
pub mod movement;
pub mod progression;
pub mod skills;
