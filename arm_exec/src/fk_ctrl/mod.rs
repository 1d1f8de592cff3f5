//! Forward kinematics control module
//!
//! FkCtrl resolves the orientation of each joint in a fixed-length serial
//! chain from externally commanded per-joint angles. Each joint carries a
//! rest orientation captured at activation, a configured local rotation
//! axis, and optional angular limits. Processing is cyclic: once per cycle
//! the owning executable calls [`FkCtrl::proc`] with any new commanded
//! angles, and the module recomposes the chain only when a command has
//! changed beyond tolerance.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod chain;
mod compose;
mod params;
mod resolve_axis;
mod state;
mod validate_angle;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Serialize;

// Internal
pub use chain::*;
pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Squared-length threshold below which a configured rotation axis is
/// considered degenerate and replaced with the chain's fallback axis.
pub const AXIS_EPS_SQ: f64 = 1e-6;

/// Threshold on the difference between a joint's commanded and last applied
/// angles above which the chain is considered dirty.
///
/// Units: degrees
pub const ANGLE_DIRTY_THRESHOLD_DEG: f64 = 1e-4;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during FkCtrl operation.
///
/// These are caller contract violations. Bad joint data (missing references,
/// non-finite angles, degenerate axes) is recovered internally and surfaced
/// through [`FkWarning`]s instead.
#[derive(Debug, thiserror::Error)]
pub enum FkCtrlError {
    #[error("The module has not been initialised")]
    NotInitialised,

    #[error("Expected {expected} commanded angles but recieved {actual}")]
    CmdLengthMismatch { expected: usize, actual: usize },

    #[error("No joint with index {0} in the chain")]
    BadJointIndex(usize),
}

/// A warning raised while processing the chain.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum FkWarning {
    /// A joint's live pose reference is not bound. Raised once per joint per
    /// activation cycle; blocks the entire chain update while present.
    MissingReference { index: usize },

    /// A commanded angle was NaN or infinite. Raised on every cycle the bad
    /// input is seen; truncates the remainder of that cycle's composition.
    InvalidAngle { index: usize, angle_deg: f64 },

    /// A configured rotation axis was too close to zero length and the
    /// fallback axis was substituted. Raised once per joint per activation
    /// cycle.
    DegenerateAxis { index: usize },
}
