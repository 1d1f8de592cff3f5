//! Joint rotation axis resolution

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Unit, Vector3};

// Internal
use super::{JointChain, AXIS_EPS_SQ};

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl JointChain {

    /// Resolve the unit rotation axis for the joint at `index`.
    ///
    /// A degenerate configured axis (squared length below [`AXIS_EPS_SQ`])
    /// is replaced with the chain's fallback axis. The returned flag is true
    /// only the first time the substitution happens for this joint in the
    /// current activation cycle, so the caller can raise the warning exactly
    /// once; later cycles with the same configuration substitute silently.
    pub(crate) fn resolve_axis(
        &mut self,
        index: usize
    ) -> Option<(Unit<Vector3<f64>>, bool)> {
        let fallback = self.fallback_axis;
        let joint = self.joints.get_mut(index)?;

        if joint.local_axis.norm_squared() < AXIS_EPS_SQ {
            let newly_latched = !joint.degenerate_axis_warned;
            joint.degenerate_axis_warned = true;

            Some((fallback, newly_latched))
        }
        else {
            Some((Unit::new_normalize(joint.local_axis), false))
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
