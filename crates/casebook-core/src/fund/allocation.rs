//! Capital allocation across the buyout, co-investment and venture vehicles.
//!
//! Every edit to one side of the split is clamped to the vehicle caps
//! (their target fund sizes) and the other side absorbs what it can.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::config::CaseStudyFunds;
use crate::types::Money;

/// Co-invest to main-fund ratio used when the buyout target size is zero.
pub const FALLBACK_CO_INVEST_RATIO: Decimal = dec!(0.2);

/// `max(0, min(value, max_value))`
pub fn clamp_value(value: Money, max_value: Money) -> Money {
    value.min(max_value).max(Decimal::ZERO)
}

/// Convert raw user input to money; NaN and infinities become zero.
pub fn safe_number(value: f64) -> Money {
    if !value.is_finite() {
        return Decimal::ZERO;
    }
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationSplit {
    pub buyout: Money,
    pub vc: Money,
}

impl AllocationSplit {
    pub fn total(&self) -> Money {
        self.buyout + self.vc
    }

    /// Capital not committed to either strategy.
    pub fn unallocated(&self, total_capital: Money) -> Money {
        (total_capital - self.total()).max(Decimal::ZERO)
    }
}

/// Maximum commitment each vehicle accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationLimits {
    pub buyout_cap: Money,
    pub co_invest_cap: Money,
    pub vc_cap: Money,
}

impl AllocationLimits {
    pub fn from_funds(funds: &CaseStudyFunds) -> Self {
        AllocationLimits {
            buyout_cap: funds.buyout.target_size,
            co_invest_cap: funds.co_invest.target_size,
            vc_cap: funds.venture.target_size,
        }
    }

    /// The buyout strategy can absorb the co-invest vehicle's size as well
    /// when co-investment is enabled.
    pub fn effective_buyout_cap(&self, include_co_invest: bool) -> Money {
        if include_co_invest {
            self.buyout_cap + self.co_invest_cap
        } else {
            self.buyout_cap
        }
    }
}

/// Trim the buyout commitment to `buyout_cap` and move the excess into VC,
/// up to the VC headroom. Anything beyond both caps is dropped.
pub fn redistribute_from_buyout(
    buyout: Money,
    vc: Money,
    buyout_cap: Money,
    vc_cap: Money,
) -> AllocationSplit {
    let trimmed = buyout.min(buyout_cap);
    let mut vc_out = vc;
    if buyout > buyout_cap {
        let excess = buyout - buyout_cap;
        let headroom = vc_cap - vc_out;
        vc_out += headroom.min(excess);
    }
    AllocationSplit {
        buyout: trimmed,
        vc: vc_out,
    }
}

/// Re-split a new total capital figure, preserving the current buyout share.
///
/// With nothing allocated yet the cap-weighted ratio is used instead. After
/// clamping each side, any leftover tops up buyout once VC is full, then VC
/// once buyout has reached the main-fund cap.
pub fn rebalance_total_capital(
    total_capital: f64,
    current: AllocationSplit,
    limits: &AllocationLimits,
    include_co_invest: bool,
) -> (Money, AllocationSplit) {
    let total = safe_number(total_capital).max(Decimal::ZERO);
    let buyout_cap = limits.effective_buyout_cap(include_co_invest);

    let allocated = current.total();
    let split_ratio = if allocated > Decimal::ZERO {
        current.buyout / allocated
    } else if buyout_cap + limits.vc_cap > Decimal::ZERO {
        buyout_cap / (buyout_cap + limits.vc_cap)
    } else {
        Decimal::ZERO
    };

    let desired_buyout = total * split_ratio;
    let mut buyout = clamp_value(desired_buyout.min(total), buyout_cap);
    let mut vc = clamp_value(total - buyout, limits.vc_cap);
    let mut remaining = total - buyout - vc;

    if remaining > Decimal::ZERO && vc >= limits.vc_cap {
        let top_up = (buyout_cap - buyout).min(remaining);
        buyout += top_up;
        remaining -= top_up;
    }

    // Checked against the main-fund cap, not the co-invest-inclusive one.
    if remaining > Decimal::ZERO && buyout >= limits.buyout_cap {
        let top_up = (limits.vc_cap - vc).min(remaining);
        vc += top_up;
    }

    (total, AllocationSplit { buyout, vc })
}

/// Set the buyout commitment; VC takes whatever is left of the total.
pub fn set_buyout_allocation(
    value: f64,
    total_capital: Money,
    limits: &AllocationLimits,
    include_co_invest: bool,
) -> AllocationSplit {
    let buyout = clamp_value(
        safe_number(value).min(total_capital),
        limits.effective_buyout_cap(include_co_invest),
    );
    let vc = clamp_value(total_capital - buyout, limits.vc_cap);
    AllocationSplit { buyout, vc }
}

/// Set the VC commitment; buyout takes whatever is left of the total.
pub fn set_vc_allocation(
    value: f64,
    total_capital: Money,
    limits: &AllocationLimits,
    include_co_invest: bool,
) -> AllocationSplit {
    let vc = clamp_value(safe_number(value).min(total_capital), limits.vc_cap);
    let buyout = clamp_value(
        total_capital - vc,
        limits.effective_buyout_cap(include_co_invest),
    );
    AllocationSplit { buyout, vc }
}

/// Toggle co-investment. Disabling it shrinks the buyout cap back to the
/// main fund, so any excess is pushed to VC.
pub fn toggle_co_invest(
    current: AllocationSplit,
    limits: &AllocationLimits,
    include_co_invest: bool,
) -> AllocationSplit {
    if include_co_invest {
        current
    } else {
        redistribute_from_buyout(current.buyout, current.vc, limits.buyout_cap, limits.vc_cap)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoInvestSplit {
    pub main: Money,
    pub co_invest: Money,
}

/// Co-invest to main-fund size ratio.
pub fn co_invest_ratio(funds: &CaseStudyFunds) -> Decimal {
    if funds.buyout.target_size.is_zero() {
        FALLBACK_CO_INVEST_RATIO
    } else {
        funds.co_invest.target_size / funds.buyout.target_size
    }
}

/// Split a buyout commitment between the main fund and the co-invest vehicle
/// in proportion to their target sizes.
pub fn co_invest_split(
    buyout_allocation: Money,
    funds: &CaseStudyFunds,
    include_co_invest: bool,
) -> CoInvestSplit {
    if !include_co_invest {
        return CoInvestSplit {
            main: buyout_allocation,
            co_invest: Decimal::ZERO,
        };
    }
    let ratio = co_invest_ratio(funds);
    let main = buyout_allocation / (Decimal::ONE + ratio);
    CoInvestSplit {
        main,
        co_invest: buyout_allocation - main,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn limits() -> AllocationLimits {
        AllocationLimits::from_funds(&CaseStudyFunds::reference())
    }

    fn split(buyout: Money, vc: Money) -> AllocationSplit {
        AllocationSplit { buyout, vc }
    }

    #[test]
    fn test_clamp_value() {
        assert_eq!(clamp_value(dec!(1500), dec!(1000)), dec!(1000));
        assert_eq!(clamp_value(dec!(-100), dec!(1000)), Decimal::ZERO);
        assert_eq!(clamp_value(dec!(500), dec!(1000)), dec!(500));
        assert_eq!(clamp_value(Decimal::ZERO, dec!(1000)), Decimal::ZERO);
        assert_eq!(clamp_value(dec!(1000), dec!(1000)), dec!(1000));
    }

    #[test]
    fn test_safe_number() {
        assert_eq!(safe_number(100.0), dec!(100));
        assert_eq!(safe_number(0.0), Decimal::ZERO);
        assert_eq!(safe_number(-100.0), dec!(-100));
        assert!((safe_number(3.14) - dec!(3.14)).abs() < dec!(0.0000001));
        assert_eq!(safe_number(f64::INFINITY), Decimal::ZERO);
        assert_eq!(safe_number(f64::NEG_INFINITY), Decimal::ZERO);
        assert_eq!(safe_number(f64::NAN), Decimal::ZERO);
    }

    #[test]
    fn test_redistribute_trims_buyout() {
        assert_eq!(
            redistribute_from_buyout(dec!(1200), dec!(100), dec!(1000), dec!(100)),
            split(dec!(1000), dec!(100))
        );
    }

    #[test]
    fn test_redistribute_moves_excess_to_vc() {
        assert_eq!(
            redistribute_from_buyout(dec!(1200), dec!(50), dec!(1000), dec!(100)),
            split(dec!(1000), dec!(100))
        );
        assert_eq!(
            redistribute_from_buyout(dec!(1020), dec!(50), dec!(1000), dec!(100)),
            split(dec!(1000), dec!(70))
        );
    }

    #[test]
    fn test_redistribute_respects_vc_cap() {
        assert_eq!(
            redistribute_from_buyout(dec!(1500), dec!(50), dec!(1000), dec!(100)),
            split(dec!(1000), dec!(100))
        );
    }

    #[test]
    fn test_redistribute_within_cap_is_noop() {
        assert_eq!(
            redistribute_from_buyout(dec!(800), dec!(100), dec!(1000), dec!(100)),
            split(dec!(800), dec!(100))
        );
    }

    #[test]
    fn test_effective_buyout_cap() {
        let l = limits();
        assert_eq!(l.effective_buyout_cap(true), dec!(1200));
        assert_eq!(l.effective_buyout_cap(false), dec!(1000));
        assert_eq!(l.vc_cap, dec!(100));
    }

    #[test]
    fn test_rebalance_keeps_current_ratio() {
        let (total, s) =
            rebalance_total_capital(650.0, split(dec!(600), dec!(50)), &limits(), true);
        assert_eq!(total, dec!(650));
        assert!((s.buyout + s.vc - dec!(650)).abs() < dec!(0.0001));
        assert!((s.buyout - dec!(600)).abs() < dec!(0.0001));
    }

    #[test]
    fn test_rebalance_tops_up_buyout_when_vc_full() {
        // 10% VC share of 1300 wants 130 but VC caps at 100
        let (_, s) = rebalance_total_capital(1300.0, split(dec!(900), dec!(100)), &limits(), true);
        assert_eq!(s.vc, dec!(100));
        assert_eq!(s.buyout, dec!(1200));
    }

    #[test]
    fn test_rebalance_beyond_all_caps_leaves_idle_cash() {
        let (total, s) =
            rebalance_total_capital(2000.0, split(dec!(1200), dec!(100)), &limits(), true);
        assert_eq!(s, split(dec!(1200), dec!(100)));
        assert_eq!(s.unallocated(total), dec!(700));
    }

    #[test]
    fn test_rebalance_fallback_ratio_when_empty() {
        let (_, s) = rebalance_total_capital(
            1300.0,
            split(Decimal::ZERO, Decimal::ZERO),
            &limits(),
            true,
        );
        assert!((s.buyout - dec!(1200)).abs() < dec!(0.0001));
        assert_eq!(s.vc, dec!(100));
    }

    #[test]
    fn test_rebalance_sanitises_bad_input() {
        let (total, s) = rebalance_total_capital(f64::NAN, split(dec!(600), dec!(50)), &limits(), true);
        assert_eq!(total, Decimal::ZERO);
        assert_eq!(s, split(Decimal::ZERO, Decimal::ZERO));
        let (total, _) = rebalance_total_capital(-5.0, split(dec!(600), dec!(50)), &limits(), true);
        assert_eq!(total, Decimal::ZERO);
    }

    #[test]
    fn test_set_buyout_allocation() {
        let s = set_buyout_allocation(1250.0, dec!(1300), &limits(), true);
        assert_eq!(s, split(dec!(1200), dec!(100)));
        let s = set_buyout_allocation(500.0, dec!(550), &limits(), true);
        assert_eq!(s, split(dec!(500), dec!(50)));
        let s = set_buyout_allocation(1100.0, dec!(1300), &limits(), false);
        assert_eq!(s, split(dec!(1000), dec!(100)));
    }

    #[test]
    fn test_set_vc_allocation() {
        let s = set_vc_allocation(150.0, dec!(1300), &limits(), true);
        assert_eq!(s, split(dec!(1200), dec!(100)));
        let s = set_vc_allocation(40.0, dec!(500), &limits(), true);
        assert_eq!(s, split(dec!(460), dec!(40)));
    }

    #[test]
    fn test_toggle_co_invest_off_pushes_excess_to_vc() {
        let s = toggle_co_invest(split(dec!(1100), dec!(40)), &limits(), false);
        assert_eq!(s, split(dec!(1000), dec!(100)));
        let s = toggle_co_invest(split(dec!(1100), dec!(40)), &limits(), true);
        assert_eq!(s, split(dec!(1100), dec!(40)));
    }

    #[test]
    fn test_co_invest_split_by_target_sizes() {
        let funds = CaseStudyFunds::reference();
        let s = co_invest_split(dec!(1200), &funds, true);
        assert_eq!(s.main, dec!(1000));
        assert_eq!(s.co_invest, dec!(200));
        let s = co_invest_split(dec!(1200), &funds, false);
        assert_eq!(s.main, dec!(1200));
        assert_eq!(s.co_invest, Decimal::ZERO);
    }

    #[test]
    fn test_co_invest_ratio_fallback() {
        let mut funds = CaseStudyFunds::reference();
        funds.buyout.target_size = Decimal::ZERO;
        assert_eq!(co_invest_ratio(&funds), dec!(0.2));
    }
}
