//! Small cli/daemon pair that counts keystrokes and mouse clicks for each calendar day.
//! Counts survive restarts and are written to disk atomically every few events.
//!

pub mod cli;
pub mod daemon;
pub mod fs;
pub mod utils;
