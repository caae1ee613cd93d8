//! Command-line front end for drover configurations.

pub mod cli;
pub mod commands;
pub mod logging;
