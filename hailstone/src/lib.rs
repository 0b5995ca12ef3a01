//! Scenario driver for the Hailstone kernel.
//!
//! A scenario describes vats whose behavior is scripted by rules,
//! and a sequence of host steps to run against a kernel.
//! Running it yields a report of every crank and of requested table dumps.

#![warn(missing_docs)]

pub mod scenario;
