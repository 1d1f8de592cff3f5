//! # Arm Control Executable
//!
//! This executable is responsible for resolving the arm's joint orientations
//! from commanded joint angles:
//! - Initialise the forward kinematics control module (`fk_ctrl`)
//! - Bind the live joint poses and activate the chain
//! - Main loop: write the cycle's commanded angles and run FkCtrl processing
//!
//! In place of a real command source the executable drives a sinusoidal
//! sweep over all joints, which exercises the full engine including limit
//! clamping.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Result,
};
use log::{info, trace};
use nalgebra::UnitQuaternion;
use std::thread;
use std::time::{Duration, Instant};

// Internal
use arm_lib::fk_ctrl::{FkCtrl, InputData};
use util::{
    logger::{logger_init, LevelFilter},
    maths::lin_map,
    module::State,
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Target period of one cycle.
const CYCLE_PERIOD_S: f64 = 0.10;

/// Number of cycles to run before exiting.
const NUM_CYCLES: u64 = 100;

/// Amplitude of the demo sweep.
///
/// Units: degrees
const SWEEP_AMPLITUDE_DEG: f64 = 60.0;

/// Period of the demo sweep.
///
/// Units: seconds
const SWEEP_PERIOD_S: f64 = 5.0;

// ---------------------------------------------------------------------------
// MAIN
// ---------------------------------------------------------------------------

fn main() -> Result<()> {

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new(
        "arm_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Arm Control Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    info!("Initialising...");

    // ---- INITIALISE MODULES ----

    let mut fk_ctrl = FkCtrl::default();

    fk_ctrl.init("arm_exec.toml")
        .wrap_err("Failed to initialise FkCtrl")?;

    let num_joints = fk_ctrl
        .chain()
        .map(|c| c.num_joints())
        .ok_or_else(|| eyre!("FkCtrl has no chain after init"))?;

    info!("FkCtrl init complete, {} joints in the chain", num_joints);

    // ---- BIND AND ACTIVATE THE CHAIN ----

    // The demo skeleton starts all joints at the identity orientation
    for i in 0..num_joints {
        fk_ctrl.bind_joint(i, UnitQuaternion::identity())
            .wrap_err("Failed to bind joint to the chain")?;
    }

    fk_ctrl.activate();

    info!("Initialisation complete, entering main loop\n");

    // ---- MAIN LOOP ----

    for cycle in 0..NUM_CYCLES {

        // Get cycle start time
        let cycle_start_instant = Instant::now();
        let time_s = cycle as f64 * CYCLE_PERIOD_S;

        // Sweep each joint sinusoidally, phase shifted along the chain
        let cmd_angles_deg: Vec<f64> = (0..num_joints)
            .map(|i| {
                let phase_rad =
                    i as f64 * std::f64::consts::PI / num_joints as f64;
                let sweep = (std::f64::consts::TAU * time_s / SWEEP_PERIOD_S
                    + phase_rad)
                    .sin();
                lin_map(
                    (-1.0, 1.0),
                    (-SWEEP_AMPLITUDE_DEG, SWEEP_AMPLITUDE_DEG),
                    sweep,
                )
            })
            .collect();

        // FkCtrl processing
        let (output, report) = fk_ctrl
            .proc(&InputData {
                cmd_angles_deg: Some(cmd_angles_deg)
            })
            .wrap_err("FkCtrl processing failed")?;

        trace!(
            "Cycle {}: validity {:?}, {} joints composed",
            cycle,
            output.validity,
            report.joints_composed
        );

        // Sleep out the remainder of the cycle
        let elapsed = cycle_start_instant.elapsed();
        if let Some(remaining) =
            Duration::from_secs_f64(CYCLE_PERIOD_S).checked_sub(elapsed)
        {
            thread::sleep(remaining);
        }
    }

    fk_ctrl.deactivate();

    info!("Main loop complete, exiting");

    Ok(())
}
