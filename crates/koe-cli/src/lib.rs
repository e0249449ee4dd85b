//! # koe-cli — Scenario Runner for the Knowledge-Object Escrow
//!
//! Provides the `koe` command-line interface.
//!
//! ## Subcommands
//!
//! - `koe run <SCENARIO>`: drive a snapshot store, escrow, and scheduler
//!   through a scenario file and print a JSON summary.
//! - `koe validate <SCENARIO>`: parse and check a scenario file only.
//!
//! ```bash
//! koe validate scenarios/policy-upgrade.yaml
//! koe -v run scenarios/policy-upgrade.yaml --audit
//! ```
//!
//! Scheduler and history settings come from `KOE_*` environment variables
//! unless the scenario file overrides them.

pub mod run;
pub mod scenario;
pub mod validate;
