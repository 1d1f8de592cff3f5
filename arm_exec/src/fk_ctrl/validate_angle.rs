//! Commanded angle validation and clamping

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
use super::JointChain;
use util::maths::clamp;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl JointChain {

    /// Validate the commanded angle of the joint at `index`, clamping it
    /// into the joint's limits when limits are enabled.
    ///
    /// Returns `None` if the commanded angle is NaN or infinite. This is a
    /// cycle-aborting condition handled by the caller, not a per-joint skip.
    ///
    /// Clamping raises no warning: hitting a limit during interactive input
    /// is routine. Clamping is idempotent, so re-validating an already
    /// applied angle returns the same value.
    pub(crate) fn try_clamp(&self, index: usize) -> Option<f64> {
        let joint = self.joints.get(index)?;

        if !joint.cmd_angle_deg.is_finite() {
            return None;
        }

        if self.use_limits {
            Some(clamp(&joint.cmd_angle_deg, &joint.min_deg, &joint.max_deg))
        }
        else {
            Some(joint.cmd_angle_deg)
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
