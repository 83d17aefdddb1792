use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::*;

/// Fund term assumed when the term text carries no numbers.
const DEFAULT_FUND_TERM_YEARS: u32 = 10;

/// How carried interest is charged on a vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CarryStructure {
    /// One carry rate regardless of performance.
    Flat { rate_percent: Percent },
    /// Base rate up to the threshold multiple, higher rate strictly above it.
    Tiered {
        base_rate_percent: Percent,
        threshold_multiple: Multiple,
        higher_rate_percent: Percent,
    },
}

impl CarryStructure {
    /// Carry rate (0-100) applied for a realised gross multiple.
    pub fn applied_rate_percent(&self, gross_multiple: Multiple) -> Percent {
        match self {
            CarryStructure::Flat { rate_percent } => *rate_percent,
            CarryStructure::Tiered {
                base_rate_percent,
                threshold_multiple,
                higher_rate_percent,
            } => {
                if gross_multiple > *threshold_multiple {
                    *higher_rate_percent
                } else {
                    *base_rate_percent
                }
            }
        }
    }
}

impl Default for CarryStructure {
    fn default() -> Self {
        CarryStructure::Flat {
            rate_percent: Decimal::ZERO,
        }
    }
}

/// Static assumptions for one investment vehicle. Missing percentages mean
/// the fee is not charged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundConfig {
    pub name: String,
    /// Target fund size (also the allocation cap for the vehicle)
    pub target_size: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub management_fee_percent: Option<Percent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_return_percent: Option<Percent>,
    /// One-off fee on committed capital, charged at year 0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub establishment_fee_percent: Option<Percent>,
    #[serde(default)]
    pub carry: CarryStructure,
    /// Term as quoted in the fund documents, e.g. "10 + 1 + 1"
    pub fund_term: String,
    /// Gross multiple the manager targets on investments
    pub expected_gross_multiple: Multiple,
}

impl FundConfig {
    /// Main European buyout fund of the reference case.
    pub fn european_buyout() -> Self {
        FundConfig {
            name: "European Buyout (Main Fund)".into(),
            target_size: dec!(1000),
            management_fee_percent: Some(dec!(1.85)),
            preferred_return_percent: Some(dec!(8)),
            establishment_fee_percent: Some(dec!(0.2)),
            carry: CarryStructure::Flat {
                rate_percent: dec!(20),
            },
            fund_term: "10 + 1 + 1".into(),
            expected_gross_multiple: dec!(3),
        }
    }

    /// Fee-free co-investment vehicle alongside the main buyout fund.
    pub fn buyout_co_invest() -> Self {
        FundConfig {
            name: "European Buyout (Co-Investment Fund Vehicle)".into(),
            target_size: dec!(200),
            management_fee_percent: None,
            preferred_return_percent: None,
            establishment_fee_percent: None,
            carry: CarryStructure::default(),
            fund_term: "10 + 1 + 1".into(),
            expected_gross_multiple: dec!(3),
        }
    }

    /// European venture fund with tiered carry above 2.75x.
    pub fn european_venture() -> Self {
        FundConfig {
            name: "European VC Fund".into(),
            target_size: dec!(100),
            management_fee_percent: Some(dec!(2)),
            preferred_return_percent: Some(dec!(8)),
            establishment_fee_percent: Some(dec!(0.5)),
            carry: CarryStructure::Tiered {
                base_rate_percent: dec!(20),
                threshold_multiple: dec!(2.75),
                higher_rate_percent: dec!(25),
            },
            fund_term: "10 + 1 + 1".into(),
            expected_gross_multiple: dec!(5),
        }
    }

    /// Full term in years, see [`parse_fund_term_years`].
    pub fn term_years(&self) -> u32 {
        parse_fund_term_years(&self.fund_term)
    }
}

/// The three vehicles a client can allocate to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseStudyFunds {
    pub buyout: FundConfig,
    pub co_invest: FundConfig,
    pub venture: FundConfig,
}

impl CaseStudyFunds {
    pub fn reference() -> Self {
        CaseStudyFunds {
            buyout: FundConfig::european_buyout(),
            co_invest: FundConfig::buyout_co_invest(),
            venture: FundConfig::european_venture(),
        }
    }
}

impl Default for CaseStudyFunds {
    fn default() -> Self {
        Self::reference()
    }
}

/// Sum every run of digits in a term string ("10 + 1 + 1" -> 12).
/// Falls back to 10 years when there are no digits at all.
pub fn parse_fund_term_years(term: &str) -> u32 {
    let mut total: u32 = 0;
    let mut current: Option<u32> = None;

    for ch in term.chars() {
        match ch.to_digit(10) {
            Some(d) => {
                current = Some(current.unwrap_or(0).saturating_mul(10).saturating_add(d));
            }
            None => {
                if let Some(n) = current.take() {
                    total = total.saturating_add(n);
                }
            }
        }
    }

    match current {
        Some(n) => total.saturating_add(n),
        None if !term.chars().any(|c| c.is_ascii_digit()) => DEFAULT_FUND_TERM_YEARS,
        None => total,
    }
}
