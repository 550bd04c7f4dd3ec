pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod fixture;
pub mod orchestrator;
pub mod reporter;
pub mod stats;
pub mod testutil;
pub mod transport;
pub mod verifier;
pub mod vu;
