//! Agent-based simulation of SME tax compliance under audit and
//! communication policy.
//!
//! Build a run with [`engine::SimEngine::build`], advance it with
//! [`engine::SimEngine::step`] or [`engine::SimEngine::run_report`].

pub mod audit_subsystem;
pub mod behaviour_subsystem;
pub mod calibration;
pub mod clock;
pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod event;
pub mod intervention_subsystem;
pub mod metrics;
pub mod network;
pub mod population;
pub mod rng;
pub mod snapshot;
pub mod store;
pub mod subsystem;
pub mod types;
