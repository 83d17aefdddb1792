//! Fund-of-vehicles case study: per-vehicle fee/carry schedules, blended
//! portfolio cash flows and allocation rules across buyout, co-invest and VC.

pub mod aggregate;
pub mod allocation;
pub mod config;
pub mod performance;
pub mod portfolio;
