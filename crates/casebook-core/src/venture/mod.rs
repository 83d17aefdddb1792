//! Venture case study: Series C dilution under both pool orderings and the
//! tracking-certificate vs VC-fund return comparison built on it.

pub mod dilution;
pub mod return_comparison;
