#![deny(unsafe_code)]

pub mod avu;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod logging;
pub mod output;
pub mod query;
pub mod wildcard;

/// Entry point for the `imeta` binary.
pub fn run() -> u8 {
    cli::run()
}

/// Entry point for the `icat` binary.
pub fn run_icat() -> u8 {
    cli::icat::run()
}
