//! Joint chain data model
//!
//! A [`JointChain`] is an ordered, fixed-length sequence of [`Joint`]
//! records. Its length is set at construction from the parameters and never
//! changes. Each joint slot carries an optional live pose binding: the
//! orientation of the real joint owned by the consuming application. An
//! unbound slot makes the whole chain `PartiallyMissing` and blocks updates
//! until it is bound.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Unit, UnitQuaternion, Vector3};
use serde::Serialize;

// Internal
use super::{FkWarning, Params, ANGLE_DIRTY_THRESHOLD_DEG};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A single joint in the chain.
#[derive(Clone, Debug)]
pub struct Joint {
    /// Position of this joint in the chain, stable over the chain's life.
    pub index: usize,

    /// The live pose of the bound joint, or `None` if no joint is bound to
    /// this slot.
    pub reference: Option<UnitQuaternion<f64>>,

    /// The configured rotation axis in this joint's rest frame. May be any
    /// vector, including non-normalised and degenerate ones.
    pub local_axis: Vector3<f64>,

    /// Minimum commanded angle.
    ///
    /// Units: degrees
    pub min_deg: f64,

    /// Maximum commanded angle.
    ///
    /// Units: degrees
    pub max_deg: f64,

    /// The externally commanded rotation about `local_axis`.
    ///
    /// Units: degrees
    pub cmd_angle_deg: f64,

    /// The angle composed into the joint's orientation on the most recent
    /// successful update. Used for change detection.
    ///
    /// Units: degrees
    pub last_applied_deg: f64,

    /// The joint's orientation at zero commanded rotation, captured from the
    /// live pose at activation. `None` until first captured.
    pub(crate) rest_orientation: Option<UnitQuaternion<f64>>,

    /// The orientation most recently composed for this joint. Retains its
    /// previous value over skipped or truncated updates.
    pub(crate) resolved_orientation: UnitQuaternion<f64>,

    /// Latch ensuring the missing reference warning is raised once per
    /// activation cycle.
    pub(crate) missing_ref_warned: bool,

    /// Latch ensuring the degenerate axis warning is raised once per
    /// activation cycle.
    pub(crate) degenerate_axis_warned: bool,
}

/// The ordered chain of joints.
pub struct JointChain {
    /// All joints, in chain order. Index in this vector equals
    /// `Joint::index`.
    pub(crate) joints: Vec<Joint>,

    /// Whether commanded angles are clamped into joint limits.
    pub use_limits: bool,

    /// Axis substituted for degenerate configured axes.
    pub(crate) fallback_axis: Unit<Vector3<f64>>,

    /// Whether a rest pose capture pass has been performed.
    pub(crate) has_rest_pose: bool,

    /// Forces the next update to recompose the chain regardless of the
    /// dirty check. Set on activation, cleared on a completed update.
    pub(crate) force_next_apply: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Readiness of the chain for composition.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum ChainValidity {
    /// All joint references are bound, composition may run.
    Valid,

    /// At least one joint reference is unbound, no composition runs.
    /// Re-evaluated every cycle; the chain returns to `Valid` once all
    /// references are bound.
    PartiallyMissing,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Joint {

    /// The orientation most recently composed for this joint. Retains its
    /// previous value over skipped or truncated updates.
    pub fn resolved_orientation(&self) -> UnitQuaternion<f64> {
        self.resolved_orientation
    }
}

impl JointChain {

    /// Build a chain from validated parameters.
    ///
    /// All joints start unbound, with zero commanded angle and identity
    /// resolved orientation.
    pub fn from_params(params: &Params) -> Self {
        let joints = (0..params.num_joints())
            .map(|index| Joint {
                index,
                reference: None,
                local_axis: Vector3::from(params.joint_axes[index]),
                min_deg: params.joint_min_deg[index],
                max_deg: params.joint_max_deg[index],
                cmd_angle_deg: 0.0,
                last_applied_deg: 0.0,
                rest_orientation: None,
                resolved_orientation: UnitQuaternion::identity(),
                missing_ref_warned: false,
                degenerate_axis_warned: false,
            })
            .collect();

        JointChain {
            joints,
            use_limits: params.use_limits,
            fallback_axis: Unit::new_normalize(
                Vector3::from(params.fallback_axis)
            ),
            has_rest_pose: false,
            force_next_apply: false,
        }
    }

    /// The fixed number of joints in the chain.
    pub fn num_joints(&self) -> usize {
        self.joints.len()
    }

    /// Get a reference to the joint at the given index.
    pub fn joint(&self, index: usize) -> Option<&Joint> {
        self.joints.get(index)
    }

    /// Iterate over the joints in chain order.
    pub fn joints(&self) -> impl Iterator<Item = &Joint> {
        self.joints.iter()
    }

    /// Capture the rest pose of every bound joint from its live pose.
    ///
    /// Unbound joints are skipped, leaving any previously captured rest
    /// orientation untouched. Resets the per-activation warning latches and
    /// marks the rest pose as captured.
    ///
    /// Does not validate axes or angles.
    pub fn capture_rest_pose(&mut self) {
        for joint in self.joints.iter_mut() {
            if let Some(live) = joint.reference {
                joint.rest_orientation = Some(live);
            }

            joint.missing_ref_warned = false;
            joint.degenerate_axis_warned = false;
        }

        self.has_rest_pose = true;
    }

    /// Determine whether the chain needs recomposing.
    ///
    /// The chain is dirty if any joint's commanded angle differs from its
    /// last applied angle by more than [`ANGLE_DIRTY_THRESHOLD_DEG`]. A
    /// single changed joint dirties the whole chain - composition is always
    /// all-or-nothing so downstream consumers see a consistent snapshot.
    ///
    /// A non-finite commanded angle always reads as dirty, so an ongoing
    /// invalid input keeps being reported rather than silently settling.
    pub fn is_dirty(&self) -> bool {
        self.joints.iter().any(|joint| {
            !joint.cmd_angle_deg.is_finite()
                || (joint.cmd_angle_deg - joint.last_applied_deg).abs()
                    > ANGLE_DIRTY_THRESHOLD_DEG
        })
    }

    /// Current readiness of the chain.
    pub fn validity(&self) -> ChainValidity {
        if self.joints.iter().any(|joint| joint.reference.is_none()) {
            ChainValidity::PartiallyMissing
        }
        else {
            ChainValidity::Valid
        }
    }

    /// The set of warnings currently latched on the chain's joints.
    pub fn latched_warnings(&self) -> Vec<FkWarning> {
        let mut warnings = Vec::new();

        for joint in self.joints.iter() {
            if joint.missing_ref_warned {
                warnings.push(FkWarning::MissingReference {
                    index: joint.index
                });
            }
            if joint.degenerate_axis_warned {
                warnings.push(FkWarning::DegenerateAxis {
                    index: joint.index
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn test_chain(num_joints: usize) -> JointChain {
        let mut params = Params {
            use_limits: true,
            fallback_axis: [1.0, 0.0, 0.0],
            joint_axes: vec![[1.0, 0.0, 0.0]; num_joints],
            joint_min_deg: vec![],
            joint_max_deg: vec![],
        };
        params.validate().unwrap();

        JointChain::from_params(&params)
    }

    #[test]
    fn test_capture_skips_unbound_joints() {
        let mut chain = test_chain(3);

        // Bind only the middle joint
        let live = UnitQuaternion::from_axis_angle(
            &Vector3::z_axis(), 0.5
        );
        chain.joints[1].reference = Some(live);

        chain.capture_rest_pose();

        assert!(chain.has_rest_pose);
        assert!(chain.joints[0].rest_orientation.is_none());
        assert_eq!(chain.joints[1].rest_orientation, Some(live));
        assert!(chain.joints[2].rest_orientation.is_none());
    }

    #[test]
    fn test_capture_resets_latches() {
        let mut chain = test_chain(2);
        chain.joints[0].missing_ref_warned = true;
        chain.joints[1].degenerate_axis_warned = true;

        chain.capture_rest_pose();

        assert!(chain.latched_warnings().is_empty());
    }

    #[test]
    fn test_dirty_threshold() {
        let mut chain = test_chain(2);

        // A fresh chain with zero commands is clean
        assert!(!chain.is_dirty());

        // A change below the threshold on one joint is still clean
        chain.joints[1].cmd_angle_deg = 0.5 * ANGLE_DIRTY_THRESHOLD_DEG;
        assert!(!chain.is_dirty());

        // A change above the threshold on a single joint dirties the chain
        chain.joints[1].cmd_angle_deg = 1.0;
        assert!(chain.is_dirty());
    }

    #[test]
    fn test_non_finite_cmd_is_dirty() {
        let mut chain = test_chain(1);
        chain.joints[0].cmd_angle_deg = f64::NAN;

        assert!(chain.is_dirty());
    }

    #[test]
    fn test_validity_tracks_bindings() {
        let mut chain = test_chain(2);
        assert_eq!(chain.validity(), ChainValidity::PartiallyMissing);

        chain.joints[0].reference = Some(UnitQuaternion::identity());
        assert_eq!(chain.validity(), ChainValidity::PartiallyMissing);

        chain.joints[1].reference = Some(UnitQuaternion::identity());
        assert_eq!(chain.validity(), ChainValidity::Valid);
    }
}
