//! Error types for the scene pipeline.
//!
//! Every scoped object (texture unit contexts, matrix scopes, shadow
//! executions, pools, batches) checks its state at the start of each public
//! operation and reports a typed [`RenderError`] instead of panicking.

use thiserror::Error;

use crate::backend::BackendError;
use crate::scene::{InstanceId, LightId, ShadowId};

/// Broad classification of a [`RenderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A scoped resource was used outside its valid window. Signals a caller
    /// logic defect and must not be retried.
    Protocol,
    /// A fixed-size resource is full. The caller may skip work or retry on a
    /// later frame.
    Capacity,
    /// Something was queried that was never registered this frame.
    LookupMiss,
    /// The graphics-resource API failed.
    Backend,
}

/// Errors raised by the scene pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("texture unit context is not active")]
    ContextNotActive,
    #[error("texture unit context stack limit reached (depth {depth})")]
    ContextLimitReached { depth: usize },
    #[error("out of texture units: required {required}, available {available}")]
    UnitsExhausted { required: usize, available: usize },

    #[error("observer already active")]
    ObserverAlreadyActive,
    #[error("observer is not active")]
    ObserverNotActive,
    #[error("instance transform already active")]
    InstanceAlreadyActive,
    #[error("projective light already active")]
    ProjectiveAlreadyActive,
    #[error("volume light already active")]
    VolumeLightAlreadyActive,

    #[error("render target pool `{0}` has been deleted")]
    PoolDeleted(String),
    #[error("render target pool `{pool}` hard limit exceeded: {requested} + {used} > {limit} pixels")]
    PoolHardLimit {
        pool: String,
        requested: u64,
        used: u64,
        limit: u64,
    },
    #[error("render target {0} was not created by this pool")]
    ForeignRenderTarget(u64),
    #[error("invalid area: {0}")]
    InvalidArea(String),

    #[error("batch is full (capacity is {capacity})")]
    BatchFull { capacity: usize },
    #[error("batch instance index {index} out of range (capacity is {capacity})")]
    InvalidInstanceIndex { index: usize, capacity: usize },
    #[error("batch instance index {0} is not enabled")]
    InstanceNotEnabled(usize),
    #[error("batch has been deleted")]
    BatchDeleted,
    #[error("batch capacity must be at least one")]
    EmptyBatch,

    #[error("index {index} does not fit in a {width}-bit index buffer")]
    IndexOutOfRange { index: u32, width: u32 },

    #[error("shadow execution is not active")]
    ExecutionNotActive,
    #[error("shadow map has not been rendered (light {light:?}, shadow {shadow:?})")]
    ShadowNotRendered { light: LightId, shadow: ShadowId },
    #[error("light {0:?} has no shadow")]
    LightWithoutShadow(LightId),

    #[error("group {group} is out of range (valid groups are 1..{maximum})")]
    InvalidGroup { group: u32, maximum: u32 },
    #[error("instance {0:?} is already visible")]
    InstanceAlreadyVisible(InstanceId),
    #[error("light {light:?} is already visible in group {group}")]
    LightAlreadyVisible { light: LightId, group: u32 },
    #[error("clip group has been deleted")]
    ClipGroupDeleted,
    #[error("consumer protocol violation: {0}")]
    ProtocolViolation(&'static str),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl RenderError {
    /// Classify this error for the frame driver.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BatchFull { .. } | Self::UnitsExhausted { .. } | Self::PoolHardLimit { .. } => {
                ErrorKind::Capacity
            }
            Self::ShadowNotRendered { .. }
            | Self::LightWithoutShadow(_)
            | Self::InstanceNotEnabled(_)
            | Self::InvalidInstanceIndex { .. } => ErrorKind::LookupMiss,
            Self::Backend(_) => ErrorKind::Backend,
            _ => ErrorKind::Protocol,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Capacity)
    }
}

pub type RenderResult<T> = Result<T, RenderError>;
