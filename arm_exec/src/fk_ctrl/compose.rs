//! Chain composition pass
//!
//! One call to [`FkCtrl::update_chain`] performs at most one composition of
//! the whole chain: readiness check, lazy rest pose capture, dirty gate,
//! then the per-joint clamp / axis resolution / orientation composition
//! loop.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::warn;
use nalgebra::UnitQuaternion;

// Internal
use super::{FkCtrl, FkWarning};

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl FkCtrl {

    /// Run the composition pass for this cycle.
    ///
    /// Recovers from all bad joint data locally, recording [`FkWarning`]s in
    /// the cycle's warning buffer:
    /// - Any unbound joint reference skips the entire update (warned once
    ///   per joint per activation cycle).
    /// - A non-finite commanded angle truncates the pass at that joint:
    ///   joints already composed this cycle keep their new orientations,
    ///   later joints keep their previous ones.
    /// - A degenerate axis is substituted with the fallback axis (warned
    ///   once per joint per activation cycle).
    ///
    /// `force_next_apply` is cleared only when the whole chain composes.
    pub(crate) fn update_chain(&mut self) {
        let chain = match self.chain.as_mut() {
            Some(c) => c,
            None => return
        };

        // Readiness check: every joint must have a bound reference. All
        // missing joints are reported, not just the first.
        let mut ready = true;
        for joint in chain.joints.iter_mut() {
            if joint.reference.is_none() {
                ready = false;

                if !joint.missing_ref_warned {
                    joint.missing_ref_warned = true;
                    warn!(
                        "Joint {} has no bound reference, chain update \
                         skipped",
                        joint.index
                    );
                    self.cycle_warnings.push(FkWarning::MissingReference {
                        index: joint.index
                    });
                    self.report.warnings_raised += 1;
                }
            }
        }
        if !ready {
            return;
        }

        // Capture the rest pose if it hasn't been captured yet
        if !chain.has_rest_pose {
            chain.capture_rest_pose();
        }

        // Dirty gate: nothing to do if no command changed and no forced
        // update is scheduled
        if !chain.force_next_apply && !chain.is_dirty() {
            return;
        }

        for index in 0..chain.num_joints() {
            // Validate and clamp the commanded angle
            let clamped_deg = match chain.try_clamp(index) {
                Some(c) => c,
                None => {
                    let angle_deg = chain.joints[index].cmd_angle_deg;
                    warn!(
                        "Joint {} commanded angle is not finite ({}), \
                         truncating this cycle's update",
                        index, angle_deg
                    );
                    self.cycle_warnings.push(FkWarning::InvalidAngle {
                        index,
                        angle_deg
                    });
                    self.report.warnings_raised += 1;
                    return;
                }
            };

            if clamped_deg != chain.joints[index].cmd_angle_deg {
                self.report.angles_clamped += 1;
            }

            // Resolve the rotation axis
            let (axis, newly_latched) = match chain.resolve_axis(index) {
                Some(r) => r,
                None => return
            };
            if newly_latched {
                warn!(
                    "Joint {} has a degenerate rotation axis, substituting \
                     the fallback axis",
                    index
                );
                self.cycle_warnings.push(FkWarning::DegenerateAxis {
                    index
                });
                self.report.warnings_raised += 1;
            }

            let joint = &mut chain.joints[index];

            // The capture pass skips unbound joints, so a joint bound after
            // activation may still be missing its rest orientation. Capture
            // it now from the live pose.
            let rest = match joint.rest_orientation {
                Some(r) => r,
                None => match joint.reference {
                    Some(live) => {
                        joint.rest_orientation = Some(live);
                        live
                    }
                    // Readiness was checked above
                    None => return
                }
            };

            // The commanded rotation is intrinsic: applied after the rest
            // orientation, in the joint's own rest frame
            let rotation = UnitQuaternion::from_axis_angle(
                &axis,
                clamped_deg.to_radians()
            );
            joint.resolved_orientation = rest * rotation;
            joint.last_applied_deg = clamped_deg;

            self.report.joints_composed += 1;
        }

        chain.force_next_apply = false;
    }
}
