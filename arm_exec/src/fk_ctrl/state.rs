//! Implementations for the FkCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use nalgebra::UnitQuaternion;
use serde::Serialize;

// Internal
use super::{ChainValidity, FkCtrlError, FkWarning, Joint, JointChain, Params};
use util::{module::State, params};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Observer invoked after each processing cycle with the chain and the
/// cycle's status report. Kept outside the composition algorithm; intended
/// for diagnostics and logging collaborators.
pub type FkObserver = Box<dyn FnMut(&JointChain, &StatusReport)>;

/// Forward kinematics control module state
#[derive(Default)]
pub struct FkCtrl {

    pub(crate) params: Params,

    pub(crate) chain: Option<JointChain>,

    pub(crate) report: StatusReport,

    /// Warnings raised during the current cycle. Cleared at the start of
    /// each cycle, retaining its capacity, so the steady-state cycle
    /// performs no allocation.
    pub(crate) cycle_warnings: Vec<FkWarning>,

    observer: Option<FkObserver>,
}

/// Input data to forward kinematics control.
#[derive(Clone, Debug, Default)]
pub struct InputData {
    /// New commanded angles for every joint in chain order, or `None` if
    /// there is no new command on this cycle. Previously commanded angles
    /// persist when `None`.
    ///
    /// Units: degrees
    pub cmd_angles_deg: Option<Vec<f64>>,
}

/// Resolved chain state published after each cycle.
///
/// Deliberately small and `Copy`: the per-joint resolved orientations are
/// read from the chain itself ([`Joint::resolved_orientation`] through
/// [`JointChain::joint`]) so the cyclic path performs no allocation.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct OutputData {
    /// Readiness of the chain at the end of the cycle.
    pub validity: ChainValidity,
}

impl Default for OutputData {
    fn default() -> Self {
        OutputData {
            validity: ChainValidity::Valid,
        }
    }
}

/// Status report for FkCtrl processing.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct StatusReport {
    /// Number of joints whose orientation was composed this cycle. Zero for
    /// a skipped or gated cycle.
    pub joints_composed: usize,

    /// Number of commanded angles clamped into limits this cycle. Clamping
    /// is routine, not a warning.
    pub angles_clamped: usize,

    /// Number of warnings raised during this cycle. The warning events
    /// themselves are available from [`FkCtrl::cycle_warnings`]. Latched
    /// warnings are raised only on the cycle in which they latch.
    pub warnings_raised: usize,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for FkCtrl {
    type InitData = &'static str;
    type InitError = params::LoadError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = FkCtrlError;

    /// Initialise the FkCtrl module.
    ///
    /// Expected init data is the path to the parameter file. The chain is
    /// built unbound and inactive: the owner must bind the live joint poses
    /// and call [`FkCtrl::activate`] before the first cycle.
    fn init(&mut self, init_data: Self::InitData) -> Result<(), Self::InitError> {

        // Load and validate the parameters
        self.params = params::load(init_data)?;
        self.params.validate()?;

        // Build the chain
        self.chain = Some(JointChain::from_params(&self.params));

        Ok(())
    }

    /// Perform cyclic processing of forward kinematics control.
    ///
    /// Ingests any new commanded angles, runs at most one composition pass
    /// over the chain, and publishes the resolved orientations. All bad
    /// joint data is recovered locally and surfaced in the status report;
    /// an `Err` here means the caller broke the module's contract.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        let num_joints = match self.chain.as_ref() {
            Some(c) => c.num_joints(),
            None => return Err(FkCtrlError::NotInitialised)
        };

        // Clear the status report and the cycle's warning buffer
        self.report = StatusReport::default();
        self.cycle_warnings.clear();

        // Ingest the cycle's commanded angles, if any
        if let Some(cmds) = &input_data.cmd_angles_deg {
            if cmds.len() != num_joints {
                return Err(FkCtrlError::CmdLengthMismatch {
                    expected: num_joints,
                    actual: cmds.len()
                });
            }

            if let Some(chain) = self.chain.as_mut() {
                for (joint, cmd) in chain.joints.iter_mut().zip(cmds.iter()) {
                    joint.cmd_angle_deg = *cmd;
                }
            }
        }

        // Run the composition pass
        self.update_chain();

        let chain = match self.chain.as_ref() {
            Some(c) => c,
            None => return Err(FkCtrlError::NotInitialised)
        };

        let output = OutputData {
            validity: chain.validity(),
        };

        trace!(
            "FkCtrl output: validity {:?}, {} joints composed",
            output.validity,
            self.report.joints_composed
        );

        // Fire the diagnostic observer
        if let Some(observer) = self.observer.as_mut() {
            observer(chain, &self.report);
        }

        Ok((output, self.report))
    }
}

impl FkCtrl {

    /// Build a module directly from in-memory parameters, without loading a
    /// parameter file.
    pub fn with_params(mut params: Params) -> Result<Self, params::LoadError> {
        params.validate()?;
        let chain = JointChain::from_params(&params);

        Ok(FkCtrl {
            params,
            chain: Some(chain),
            report: StatusReport::default(),
            cycle_warnings: Vec::new(),
            observer: None,
        })
    }

    /// Get the chain, or `None` if the module is not initialised.
    pub fn chain(&self) -> Option<&JointChain> {
        self.chain.as_ref()
    }

    /// Get the parameters the module was initialised with.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// The warnings raised during the most recent cycle.
    pub fn cycle_warnings(&self) -> &[FkWarning] {
        &self.cycle_warnings
    }

    /// Bind the live pose of the joint at `index`.
    pub fn bind_joint(
        &mut self,
        index: usize,
        orientation: UnitQuaternion<f64>
    ) -> Result<(), FkCtrlError> {
        let joint = self.joint_mut(index)?;
        joint.reference = Some(orientation);
        Ok(())
    }

    /// Unbind the live pose of the joint at `index`, making the chain
    /// `PartiallyMissing` until it is rebound.
    pub fn unbind_joint(&mut self, index: usize) -> Result<(), FkCtrlError> {
        let joint = self.joint_mut(index)?;
        joint.reference = None;
        Ok(())
    }

    /// Set the commanded angle of the joint at `index`. May be called by the
    /// owning controller at any point before the cycle's [`FkCtrl::proc`].
    ///
    /// Units: degrees
    pub fn set_cmd_angle_deg(
        &mut self,
        index: usize,
        angle_deg: f64
    ) -> Result<(), FkCtrlError> {
        let joint = self.joint_mut(index)?;
        joint.cmd_angle_deg = angle_deg;
        Ok(())
    }

    /// Activate the chain: capture the rest pose from the currently bound
    /// live poses and schedule a forced update for the next cycle.
    ///
    /// Called on construction and whenever the owner transitions the chain
    /// from inactive to active. Starts a new activation cycle, resetting
    /// the warning latches.
    pub fn activate(&mut self) {
        if let Some(chain) = self.chain.as_mut() {
            chain.capture_rest_pose();
            chain.force_next_apply = true;
        }
    }

    /// Deactivate the chain, clearing any scheduled forced update.
    pub fn deactivate(&mut self) {
        if let Some(chain) = self.chain.as_mut() {
            chain.force_next_apply = false;
        }
    }

    /// Recapture the rest pose from the currently bound live poses without
    /// scheduling a forced update.
    pub fn recapture_rest_pose(&mut self) {
        if let Some(chain) = self.chain.as_mut() {
            chain.capture_rest_pose();
        }
    }

    /// Install the diagnostic observer, replacing any previous one.
    pub fn set_observer(&mut self, observer: FkObserver) {
        self.observer = Some(observer);
    }

    fn joint_mut(
        &mut self,
        index: usize
    ) -> Result<&mut Joint, FkCtrlError> {
        let chain = self.chain.as_mut().ok_or(FkCtrlError::NotInitialised)?;
        chain
            .joints
            .get_mut(index)
            .ok_or(FkCtrlError::BadJointIndex(index))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::Vector3;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Quaternion comparison tolerance, in radians of separation.
    const ORI_TOL_RAD: f64 = 1e-9;

    fn ctrl(axes: Vec<[f64; 3]>, use_limits: bool) -> FkCtrl {
        let num_joints = axes.len();
        let params = Params {
            use_limits,
            fallback_axis: [1.0, 0.0, 0.0],
            joint_axes: axes,
            joint_min_deg: vec![],
            joint_max_deg: vec![],
        };

        let mut fk_ctrl = FkCtrl::with_params(params).unwrap();

        // Bind every joint at identity and activate
        for i in 0..num_joints {
            fk_ctrl.bind_joint(i, UnitQuaternion::identity()).unwrap();
        }
        fk_ctrl.activate();

        fk_ctrl
    }

    fn input(cmds: Vec<f64>) -> InputData {
        InputData {
            cmd_angles_deg: Some(cmds)
        }
    }

    fn assert_ori_eq(actual: &UnitQuaternion<f64>, expected: &UnitQuaternion<f64>) {
        assert!(
            actual.angle_to(expected) < ORI_TOL_RAD,
            "expected {:?}, got {:?}",
            expected,
            actual
        );
    }

    fn ori(fk_ctrl: &FkCtrl, index: usize) -> UnitQuaternion<f64> {
        fk_ctrl
            .chain()
            .unwrap()
            .joint(index)
            .unwrap()
            .resolved_orientation()
    }

    #[test]
    fn test_identity_composition() {
        let mut fk_ctrl = ctrl(vec![[1.0, 0.0, 0.0]], false);

        let mut angle_deg = -180.0;
        while angle_deg <= 180.0 {
            fk_ctrl.proc(&input(vec![angle_deg])).unwrap();

            assert_ori_eq(
                &ori(&fk_ctrl, 0),
                &UnitQuaternion::from_axis_angle(
                    &Vector3::x_axis(),
                    angle_deg.to_radians()
                )
            );

            angle_deg += 7.5;
        }
    }

    #[test]
    fn test_end_to_end_two_joints() {
        let mut fk_ctrl = ctrl(
            vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            false
        );

        let (output, report) = fk_ctrl
            .proc(&input(vec![90.0, 45.0]))
            .unwrap();

        assert_eq!(report.joints_composed, 2);
        assert_eq!(output.validity, ChainValidity::Valid);
        assert_ori_eq(
            &ori(&fk_ctrl, 0),
            &UnitQuaternion::from_axis_angle(
                &Vector3::x_axis(),
                90f64.to_radians()
            )
        );
        assert_ori_eq(
            &ori(&fk_ctrl, 1),
            &UnitQuaternion::from_axis_angle(
                &Vector3::y_axis(),
                45f64.to_radians()
            )
        );

        // Re-issuing the same command shifted below the dirty threshold
        // must not recompose
        let (_, report) = fk_ctrl
            .proc(&input(vec![90.00005, 45.0]))
            .unwrap();

        assert_eq!(report.joints_composed, 0);
    }

    #[test]
    fn test_dirty_gating() {
        let mut fk_ctrl = ctrl(vec![[0.0, 0.0, 1.0]; 3], false);

        // First cycle is forced by activation
        let (_, report) = fk_ctrl.proc(&input(vec![5.0, 10.0, 15.0])).unwrap();
        assert_eq!(report.joints_composed, 3);

        // Unchanged command is a no-op
        let (_, report) = fk_ctrl.proc(&input(vec![5.0, 10.0, 15.0])).unwrap();
        assert_eq!(report.joints_composed, 0);
        assert_eq!(report.warnings_raised, 0);

        // No command at all is also a no-op
        let (_, report) = fk_ctrl.proc(&InputData::default()).unwrap();
        assert_eq!(report.joints_composed, 0);

        // A single changed joint recomposes the whole chain
        let (_, report) = fk_ctrl.proc(&input(vec![5.0, 10.0, 20.0])).unwrap();
        assert_eq!(report.joints_composed, 3);
    }

    #[test]
    fn test_nan_truncates_cycle() {
        let mut fk_ctrl = ctrl(vec![[1.0, 0.0, 0.0]; 3], false);

        fk_ctrl.proc(&input(vec![10.0, 20.0, 30.0])).unwrap();

        let (_, report) = fk_ctrl
            .proc(&input(vec![40.0, f64::NAN, 50.0]))
            .unwrap();

        // Joint 0 reflects the new command, joints 1 and 2 retain their
        // pre-cycle orientations
        assert_ori_eq(
            &ori(&fk_ctrl, 0),
            &UnitQuaternion::from_axis_angle(
                &Vector3::x_axis(),
                40f64.to_radians()
            )
        );
        assert_ori_eq(
            &ori(&fk_ctrl, 1),
            &UnitQuaternion::from_axis_angle(
                &Vector3::x_axis(),
                20f64.to_radians()
            )
        );
        assert_ori_eq(
            &ori(&fk_ctrl, 2),
            &UnitQuaternion::from_axis_angle(
                &Vector3::x_axis(),
                30f64.to_radians()
            )
        );

        assert_eq!(report.joints_composed, 1);
        assert!(fk_ctrl.cycle_warnings().iter().any(|w| matches!(
            w,
            FkWarning::InvalidAngle { index: 1, .. }
        )));

        // The invalid input persists, so the warning recurs on the next
        // cycle - it is not latched
        fk_ctrl.proc(&InputData::default()).unwrap();
        assert!(fk_ctrl.cycle_warnings().iter().any(|w| matches!(
            w,
            FkWarning::InvalidAngle { index: 1, .. }
        )));
    }

    #[test]
    fn test_degenerate_axis_warned_once() {
        let mut fk_ctrl = ctrl(
            vec![[0.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            false
        );

        fk_ctrl.proc(&input(vec![90.0, 0.0])).unwrap();

        // The fallback axis (+X) is used for the degenerate joint
        assert_ori_eq(
            &ori(&fk_ctrl, 0),
            &UnitQuaternion::from_axis_angle(
                &Vector3::x_axis(),
                90f64.to_radians()
            )
        );
        assert_eq!(
            fk_ctrl
                .cycle_warnings()
                .iter()
                .filter(|w| matches!(w, FkWarning::DegenerateAxis { .. }))
                .count(),
            1
        );

        // A further cycle with the same configuration substitutes silently
        fk_ctrl.proc(&input(vec![45.0, 0.0])).unwrap();
        assert!(fk_ctrl.cycle_warnings().is_empty());
        assert_eq!(
            fk_ctrl.chain().unwrap().latched_warnings(),
            vec![FkWarning::DegenerateAxis { index: 0 }]
        );

        // Reactivation starts a new cycle's worth of warnings
        fk_ctrl.activate();
        fk_ctrl.proc(&input(vec![30.0, 0.0])).unwrap();
        assert_eq!(
            fk_ctrl
                .cycle_warnings()
                .iter()
                .filter(|w| matches!(w, FkWarning::DegenerateAxis { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn test_missing_reference_blocks_update() {
        let params = Params {
            use_limits: false,
            fallback_axis: [1.0, 0.0, 0.0],
            joint_axes: vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            joint_min_deg: vec![],
            joint_max_deg: vec![],
        };
        let mut fk_ctrl = FkCtrl::with_params(params).unwrap();

        // Bind only the first joint
        fk_ctrl.bind_joint(0, UnitQuaternion::identity()).unwrap();
        fk_ctrl.activate();

        let (output, report) = fk_ctrl.proc(&input(vec![90.0, 45.0])).unwrap();

        // No joint at all is updated, even the bound one
        assert_eq!(output.validity, ChainValidity::PartiallyMissing);
        assert_eq!(report.joints_composed, 0);
        assert_ori_eq(&ori(&fk_ctrl, 0), &UnitQuaternion::identity());
        assert_eq!(
            fk_ctrl.cycle_warnings(),
            &[FkWarning::MissingReference { index: 1 }][..]
        );

        // The warning is latched
        fk_ctrl.proc(&InputData::default()).unwrap();
        assert!(fk_ctrl.cycle_warnings().is_empty());

        // Binding the missing joint restores validity and the forced update
        // from activation finally runs
        fk_ctrl.bind_joint(1, UnitQuaternion::identity()).unwrap();
        let (output, report) = fk_ctrl.proc(&InputData::default()).unwrap();

        assert_eq!(output.validity, ChainValidity::Valid);
        assert_eq!(report.joints_composed, 2);
        assert_ori_eq(
            &ori(&fk_ctrl, 1),
            &UnitQuaternion::from_axis_angle(
                &Vector3::y_axis(),
                45f64.to_radians()
            )
        );
    }

    #[test]
    fn test_limits_applied_in_composition() {
        let params = Params {
            use_limits: true,
            fallback_axis: [1.0, 0.0, 0.0],
            joint_axes: vec![[0.0, 0.0, 1.0]],
            joint_min_deg: vec![-45.0],
            joint_max_deg: vec![45.0],
        };
        let mut fk_ctrl = FkCtrl::with_params(params).unwrap();
        fk_ctrl.bind_joint(0, UnitQuaternion::identity()).unwrap();
        fk_ctrl.activate();

        let (_, report) = fk_ctrl.proc(&input(vec![90.0])).unwrap();

        // Out of range command is clamped silently
        assert_eq!(report.warnings_raised, 0);
        assert_eq!(report.angles_clamped, 1);
        assert_ori_eq(
            &ori(&fk_ctrl, 0),
            &UnitQuaternion::from_axis_angle(
                &Vector3::z_axis(),
                45f64.to_radians()
            )
        );
        assert_eq!(fk_ctrl.chain().unwrap().joint(0).unwrap().last_applied_deg, 45.0);
    }

    #[test]
    fn test_rest_pose_composes_intrinsically() {
        let params = Params {
            use_limits: false,
            fallback_axis: [1.0, 0.0, 0.0],
            joint_axes: vec![[0.0, 0.0, 1.0]],
            joint_min_deg: vec![],
            joint_max_deg: vec![],
        };
        let mut fk_ctrl = FkCtrl::with_params(params).unwrap();

        // Rest pose is a 90 degree rotation about X
        let rest = UnitQuaternion::from_axis_angle(
            &Vector3::x_axis(),
            90f64.to_radians()
        );
        fk_ctrl.bind_joint(0, rest).unwrap();
        fk_ctrl.activate();

        fk_ctrl.proc(&input(vec![30.0])).unwrap();

        // The commanded rotation is applied in the rest frame:
        // rest * rot(Z, 30 deg)
        let expected = rest
            * UnitQuaternion::from_axis_angle(
                &Vector3::z_axis(),
                30f64.to_radians()
            );
        assert_ori_eq(&ori(&fk_ctrl, 0), &expected);
    }

    #[test]
    fn test_cycle_outputs_are_copy() {
        // Per-cycle data must come out by value, with warnings borrowed from
        // the reused buffer, so proc allocates nothing in the steady state
        fn assert_copy<T: Copy>() {}
        assert_copy::<OutputData>();
        assert_copy::<StatusReport>();

        let mut fk_ctrl = ctrl(vec![[0.0, 0.0, 1.0]], false);
        fk_ctrl.proc(&input(vec![15.0])).unwrap();
        assert!(fk_ctrl.cycle_warnings().is_empty());
        let warning_cap = fk_ctrl.cycle_warnings.capacity();

        // A clean steady-state cycle leaves the warning buffer untouched
        fk_ctrl.proc(&input(vec![15.0])).unwrap();
        assert_eq!(fk_ctrl.cycle_warnings.capacity(), warning_cap);
    }

    #[test]
    fn test_cmd_length_mismatch_rejected() {
        let mut fk_ctrl = ctrl(vec![[1.0, 0.0, 0.0]; 2], false);

        let result = fk_ctrl.proc(&input(vec![1.0, 2.0, 3.0]));

        assert!(matches!(
            result,
            Err(FkCtrlError::CmdLengthMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_observer_fires_each_cycle() {
        let mut fk_ctrl = ctrl(vec![[1.0, 0.0, 0.0]], false);

        let cycles = Rc::new(Cell::new(0usize));
        let cycles_obs = cycles.clone();
        fk_ctrl.set_observer(Box::new(move |_, _| {
            cycles_obs.set(cycles_obs.get() + 1);
        }));

        fk_ctrl.proc(&input(vec![10.0])).unwrap();
        fk_ctrl.proc(&InputData::default()).unwrap();

        // Fires on gated cycles too - observation is outside the algorithm
        assert_eq!(cycles.get(), 2);
    }

    #[test]
    fn test_deactivate_clears_forced_update() {
        let mut fk_ctrl = ctrl(vec![[1.0, 0.0, 0.0]], false);

        fk_ctrl.deactivate();

        // Without the forced update and with an unchanged (zero) command
        // the first cycle is a no-op
        let (_, report) = fk_ctrl.proc(&input(vec![0.0])).unwrap();
        assert_eq!(report.joints_composed, 0);
    }
}
