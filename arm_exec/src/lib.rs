//! # Arm Control Library
//!
//! Library which implements the modules used by the arm control executable.
//! The main item is the [`fk_ctrl`] module, the forward kinematics engine
//! which resolves each joint's orientation from externally commanded angles.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod fk_ctrl;
