//! Clinic duty-shift scheduling on a constraint solver.
//!
//! Assigns one shift code per staff member and day over a monthly period in
//! two phases: a hard-rule feasibility solve, then a weighted refinement that
//! stays close to the first schedule.
//!
//! # Domain Model
//!
//! - [`ShiftDomain`](domain::ShiftDomain): roster, shift codes and calendar of one run
//! - [`RequestTable`](domain::RequestTable): per-staff, per-day requested codes
//! - [`Schedule`](domain::Schedule): the produced staff × day grid
//!
//! # Constraints
//!
//! - **Hard**: one code per day, role restrictions, weekday closure, staffing
//!   minimums, single night, off after night, minimum rest, binding requests
//!   and pins
//! - **Soft**: rest balance, night balance, shift-type balance, compound
//!   night condition, stability against the first schedule

#[cfg(feature = "console")]
pub mod console;
pub mod backend;
pub mod config;
pub mod constraints;
pub mod demo_data;
pub mod domain;
pub mod dto;
pub mod error;
pub mod export;
pub mod model;
pub mod requests;
pub mod solver;
pub mod validation;
