// Copyright 2026 Ticket Sniper Contributors
// SPDX-License-Identifier: Apache-2.0

//! Ticket sniper library: sale-window synchronized ticket acquisition.
//!
//! The binary wires these modules to a Chromium page; integration tests
//! drive them against a scripted page instead.

pub mod audit;
pub mod cli;
pub mod clock;
pub mod config;
pub mod driver;
pub mod layout;
pub mod orchestrator;
pub mod outcome;
pub mod pipeline;
pub mod scheduler;
pub mod selector;
pub mod session;

pub use outcome::{AcquisitionOutcome, AttemptResult, FailureReason};
