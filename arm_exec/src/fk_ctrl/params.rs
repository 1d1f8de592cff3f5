//! Parameters structure for FkCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;
use util::params::LoadError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for forward kinematics control.
///
/// The number of joints in the chain is set by the length of `joint_axes`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Params {

    // ---- CHAIN ----

    /// Whether commanded angles shall be clamped into the per-joint limits.
    /// Applies to the whole chain, not per joint.
    #[serde(default = "default_use_limits")]
    pub use_limits: bool,

    /// The axis substituted when a joint's configured axis is degenerate.
    /// Need not be normalised, but must itself be non-degenerate.
    #[serde(default = "default_fallback_axis")]
    pub fallback_axis: [f64; 3],

    // ---- JOINTS ----

    /// Each joint's rotation axis expressed in that joint's rest frame, in
    /// chain order. Need not be normalised.
    pub joint_axes: Vec<[f64; 3]>,

    /// Minimum commanded angle for each joint (lowest negative value).
    ///
    /// Units: degrees
    #[serde(default)]
    pub joint_min_deg: Vec<f64>,

    /// Maximum commanded angle for each joint (highest positive value).
    ///
    /// Units: degrees
    #[serde(default)]
    pub joint_max_deg: Vec<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {

    /// The number of joints in the chain described by these parameters.
    pub fn num_joints(&self) -> usize {
        self.joint_axes.len()
    }

    /// Check the parameters for consistency, filling in default limits where
    /// none were given.
    ///
    /// Must be called once after loading and before building a chain from
    /// the parameters.
    pub fn validate(&mut self) -> Result<(), LoadError> {
        let num_joints = self.num_joints();

        if num_joints == 0 {
            return Err(LoadError::InvalidParams(
                "at least one joint axis is required".into()
            ));
        }

        // Unset limits default to the full revolution
        if self.joint_min_deg.is_empty() {
            self.joint_min_deg = vec![-180.0; num_joints];
        }
        if self.joint_max_deg.is_empty() {
            self.joint_max_deg = vec![180.0; num_joints];
        }

        if self.joint_min_deg.len() != num_joints
            || self.joint_max_deg.len() != num_joints
        {
            return Err(LoadError::InvalidParams(format!(
                "expected {} entries in joint_min_deg and joint_max_deg, \
                 found {} and {}",
                num_joints,
                self.joint_min_deg.len(),
                self.joint_max_deg.len()
            )));
        }

        for i in 0..num_joints {
            if !self.joint_min_deg[i].is_finite()
                || !self.joint_max_deg[i].is_finite()
            {
                return Err(LoadError::InvalidParams(format!(
                    "limits for joint {} are not finite", i
                )));
            }
            if self.joint_min_deg[i] > self.joint_max_deg[i] {
                return Err(LoadError::InvalidParams(format!(
                    "joint {} has min_deg ({}) greater than max_deg ({})",
                    i, self.joint_min_deg[i], self.joint_max_deg[i]
                )));
            }
            if self.joint_axes[i].iter().any(|c| !c.is_finite()) {
                return Err(LoadError::InvalidParams(format!(
                    "axis for joint {} has non-finite components", i
                )));
            }
        }

        if self.fallback_axis.iter().any(|c| !c.is_finite())
            || self.fallback_axis.iter().map(|c| c * c).sum::<f64>()
                < super::AXIS_EPS_SQ
        {
            return Err(LoadError::InvalidParams(
                "fallback_axis is degenerate".into()
            ));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn default_use_limits() -> bool {
    true
}

fn default_fallback_axis() -> [f64; 3] {
    [1.0, 0.0, 0.0]
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
