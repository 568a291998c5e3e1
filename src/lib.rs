//! Stepwise - Onboarding Wizard Engine
//!
//! A small, strongly typed engine for linear multi-step wizards: ordered
//! steps with per-step validation, guarded navigation, resumable progress
//! and async step actions (sign-in, connection checks) that never leave the
//! wizard in an inconsistent state.
//!
//! ## Features
//!
//! - **Guarded navigation:** advance only when the step validates and no
//!   action is in flight; jump back to any step already reached
//! - **Resumable:** progress is saved after every advance (memory, JSON
//!   files or SQLite) and offered back on the next start
//! - **Async actions:** on-advance or on-demand, bounded by a timeout,
//!   results dropped if the wizard closed meanwhile
//! - **Keyboard binding:** arrow-key navigation scoped to an open session
//! - **Terminal host:** a Ratatui front end for the product onboarding flow
//!
//! ## Quick Start
//!
//! ```bash
//! # Run the onboarding wizard
//! stepwise
//!
//! # Inspect or discard saved progress
//! stepwise status
//! stepwise reset
//! ```

pub mod action;
pub mod cli;
pub mod config;
pub mod error;
pub mod keyboard;
pub mod logging;
pub mod store;
pub mod tui;
pub mod utils;
pub mod wizard;

// Re-export commonly used types
pub use error::{ActionError, StoreError, WizardError};
pub use wizard::{StepRegistry, Transition, WizardController, WizardEvent};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
