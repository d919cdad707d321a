//! Core types shared by the campaign republish scheduler crates.
//!
//! This crate provides the strongly-typed identifiers and the `Result`
//! alias used by the timeline and scheduler crates.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{CampaignId, ParseIdError, ScheduleId};
