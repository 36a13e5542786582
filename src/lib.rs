//! Directory-tree hashing paced by a weighted admission gate.
//!
//! Files are walked breadth-first, charged admission units in proportion to
//! their size, and hashed on worker threads only while the total charge in
//! flight fits the device's bandwidth-delay budget.

pub mod cancel;
pub mod cli;
pub mod config;
pub mod error;
pub mod gate;
pub mod profile;
pub mod report;
pub mod scheduler;
pub mod tracker;
pub mod walker;
pub mod worker;
