//! CLI subcommand implementations for the ticket-sniper binary.

pub mod check_cmd;
pub mod doctor;
pub mod logging;
pub mod run_cmd;
