//! Skirmish Simulation Library
//!
//! Real-time combat core for an action-RPG battle scene: actors wander a
//! bounded arena, collide into damage exchanges, cast skills that spawn
//! transient effects, and drive a crisis meter that summons a boss.
//!
//! # Features
//!
//! - `metrics_server` - Prometheus text endpoint for the headless driver (enabled by default)

pub mod config;
pub mod game;
pub mod metrics;
pub mod services;
pub mod util;
