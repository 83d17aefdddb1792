//! Leveraged buyout case study: accounts, senior/subordinated cash sweep,
//! exit returns and the post-deal equity split.

pub mod accounts;
pub mod debt_schedule;
pub mod equity_structure;
pub mod exit;
