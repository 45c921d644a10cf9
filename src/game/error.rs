use uuid::Uuid;

/// Simulation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimError {
    #[error("Invalid arena dimensions {width}x{height}")]
    InvalidArena { width: f32, height: f32 },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Actor {0} not found")]
    UnknownActor(Uuid),
    #[error("Actor {0} is already present")]
    AlreadyPresent(Uuid),
    #[error("Unknown skill '{0}'")]
    UnknownSkill(String),
    #[error("Unknown buff '{0}'")]
    UnknownBuff(String),
    #[error("Spawn cap of {0} reached")]
    CapacityReached(usize),
}
