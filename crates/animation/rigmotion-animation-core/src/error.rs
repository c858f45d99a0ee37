//! Error types for graph building, avatar binding and the per-instance API.

use crate::human::HumanBone;
use crate::values::ParameterType;

/// Configuration errors, detected when a controller graph or an avatar binding
/// is built. The affected instance refuses to activate.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum BuildError {
    /// Two parameters share a name
    #[error("Duplicate parameter: {name}")]
    DuplicateParameter { name: String },

    /// A condition, blend tree or speed multiplier names an unknown parameter
    #[error("Unknown parameter '{parameter}' referenced by {context}")]
    UnknownParameter { context: String, parameter: String },

    /// A parameter is used with an incompatible type
    #[error("Parameter '{parameter}' in {context} has type {actual:?}, expected {expected}")]
    ParameterTypeMismatch {
        context: String,
        parameter: String,
        expected: &'static str,
        actual: ParameterType,
    },

    /// A transition targets a state that does not exist
    #[error("Transition in {context} targets missing state '{destination}'")]
    DanglingDestination { context: String, destination: String },

    /// The default state of a layer does not exist
    #[error("Layer '{layer}' default state '{state}' does not exist")]
    MissingDefaultState { layer: String, state: String },

    /// A state machine owns no states
    #[error("Layer '{layer}' has an empty state machine")]
    EmptyStateMachine { layer: String },

    /// A motion references a clip that is not part of the controller
    #[error("Clip '{clip}' referenced by {context} does not exist")]
    MissingClip { context: String, clip: String },

    /// Blend tree parameter references are missing for its blend type
    #[error("Blend tree '{tree}': {reason}")]
    InvalidBlendTree { tree: String, reason: &'static str },

    /// Synced layer references itself, another synced layer or nothing
    #[error("Synced layer '{layer}': {reason}")]
    InvalidSyncedLayer { layer: String, reason: &'static str },

    /// Layer index out of range for an authoring edit
    #[error("Layer index {index} out of range ({count} layers)")]
    LayerOutOfRange { index: usize, count: usize },

    /// Skeleton node parent is not a preceding node
    #[error("Skeleton node '{node}' has invalid parent index {parent}")]
    InvalidParent { node: String, parent: usize },

    /// Human bone mapping names a node the skeleton does not have
    #[error("Human bone {bone:?} mapped to unknown node '{node}'")]
    UnknownSkeletonNode { bone: HumanBone, node: String },

    /// A required humanoid bone is not mapped
    #[error("Required human bone {bone:?} is not mapped")]
    MissingHumanBone { bone: HumanBone },

    /// Humanoid clips require an avatar with a human description
    #[error("Controller uses humanoid clips but avatar '{avatar}' is not humanoid")]
    NotHumanoid { avatar: String },

    /// Structural edits are refused while a tick is evaluating against the graph
    #[error("Structural edit refused: a tick is in flight")]
    TickInFlight,

    /// Controller not registered in a library
    #[error("Controller not found: {name}")]
    ControllerNotFound { name: String },
}

/// Store-level parameter access errors.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueError {
    #[error("parameter does not exist")]
    DoesNotExist,
    #[error("parameter type mismatch: stored {stored:?}")]
    TypeMismatch { stored: ParameterType },
    #[error("parameter is controlled by an animation curve")]
    ControlledByCurve,
}

/// Usage errors reported by the per-instance API. Never fatal; the call leaves
/// the instance unchanged.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimatorError {
    #[error("animator is not initialized")]
    NotInitialized,
    #[error("parameter or state does not exist")]
    DoesNotExist,
    #[error("parameter type mismatch")]
    TypeMismatch,
    #[error("parameter is controlled by an animation curve")]
    ControlledByCurve,
    #[error("animator is in recorder playback mode")]
    PlaybackMode,
    #[error("index out of range")]
    InvalidIndex,
}

impl From<ValueError> for AnimatorError {
    fn from(e: ValueError) -> Self {
        match e {
            ValueError::DoesNotExist => AnimatorError::DoesNotExist,
            ValueError::TypeMismatch { .. } => AnimatorError::TypeMismatch,
            ValueError::ControlledByCurve => AnimatorError::ControlledByCurve,
        }
    }
}

/// Log a usage error in debug builds and pass it through.
#[inline]
pub(crate) fn usage(err: AnimatorError, what: &str) -> AnimatorError {
    #[cfg(debug_assertions)]
    log::warn!("{what}: {err}");
    #[cfg(not(debug_assertions))]
    let _ = what;
    err
}
