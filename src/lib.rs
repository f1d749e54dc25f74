//! Sequenced bootstrap and verification harness for the Fabric REST API.
//!
//! Scenarios are declarative step lists ([`scenarios`]) executed in order by
//! the [`run::Sequencer`] over a fixed operation catalog ([`api`]).
pub mod api;
pub mod cli;
pub mod config;
pub mod report;
pub mod run;
pub mod scenarios;
