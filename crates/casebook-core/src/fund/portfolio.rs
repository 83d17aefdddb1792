use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::aggregate::{combine_cash_flows, merge_cash_events};
use super::allocation::{co_invest_split, AllocationLimits, CoInvestSplit};
use super::config::CaseStudyFunds;
use super::performance::{compute_fund_performance, PerformanceResult, MAX_EXIT_YEAR};
use crate::error::CasebookError;
use crate::time_value::{solve_irr, split_flows};
use crate::types::*;
use crate::CasebookResult;

const BUYOUT_PREFIX: &str = "Buyout — ";
const CO_INVEST_PREFIX: &str = "Co-invest — ";
const VC_PREFIX: &str = "VC — ";

// ---------------------------------------------------------------------------
// Input / Output
// ---------------------------------------------------------------------------

/// A family's commitment across the buyout and venture strategies.
/// Missing fields fall back to the reference case.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioInput {
    pub total_capital: Money,
    /// Buyout commitment, split between main fund and co-invest vehicle
    pub buyout_allocation: Money,
    pub vc_allocation: Money,
    pub buyout_multiple: Multiple,
    pub vc_multiple: Multiple,
    pub buyout_exit_year: u32,
    pub vc_exit_year: u32,
    pub include_co_invest: bool,
    pub funds: CaseStudyFunds,
}

impl Default for PortfolioInput {
    fn default() -> Self {
        let funds = CaseStudyFunds::reference();
        PortfolioInput {
            total_capital: Decimal::from(1300),
            buyout_allocation: Decimal::from(1200),
            vc_allocation: Decimal::from(100),
            buyout_multiple: funds.buyout.expected_gross_multiple,
            vc_multiple: funds.venture.expected_gross_multiple,
            buyout_exit_year: 10,
            vc_exit_year: 10,
            include_co_invest: true,
            funds,
        }
    }
}

/// The portfolio seen as a single LP position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlendedResult {
    pub cash_flows: CashFlowSeries,
    pub net_multiple: Multiple,
    pub net_irr: Option<Rate>,
    /// Fees and carry across the three vehicles
    pub total_fees: Money,
    /// Inflows minus outflows of the blended schedule
    pub net_value: Money,
    pub cash_events: Vec<CashEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioOutput {
    pub co_invest_split: CoInvestSplit,
    pub buyout: PerformanceResult,
    pub co_invest: PerformanceResult,
    pub venture: PerformanceResult,
    pub unallocated_capital: Money,
    pub idle_cash_flows: CashFlowSeries,
    pub blended: BlendedResult,
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// Uninvested capital is held from year 0 and handed back at `horizon`.
fn idle_cash(unallocated: Money, horizon: u32) -> (CashFlowSeries, Vec<CashEvent>) {
    if unallocated <= Decimal::ZERO {
        return (vec![Decimal::ZERO], Vec::new());
    }
    let mut flows = vec![Decimal::ZERO; horizon as usize + 1];
    flows[0] -= unallocated;
    flows[horizon as usize] += unallocated;
    let events = vec![
        CashEvent::new("Idle cash — retained (Year 0)", -unallocated, 0),
        CashEvent::new(
            format!("Idle cash — released (Year {horizon})"),
            unallocated,
            horizon,
        ),
    ];
    (flows, events)
}

/// Run all three vehicles and blend them, together with idle cash, into one
/// schedule.
pub fn compute_portfolio(input: &PortfolioInput) -> PortfolioOutput {
    let funds = &input.funds;
    let split = co_invest_split(input.buyout_allocation, funds, input.include_co_invest);

    let buyout = compute_fund_performance(
        split.main,
        input.buyout_multiple,
        input.buyout_exit_year,
        &funds.buyout,
    );
    let co_invest = compute_fund_performance(
        split.co_invest,
        input.buyout_multiple,
        input.buyout_exit_year,
        &funds.co_invest,
    );
    let venture = compute_fund_performance(
        input.vc_allocation,
        input.vc_multiple,
        input.vc_exit_year,
        &funds.venture,
    );

    let unallocated_capital =
        (input.total_capital - input.buyout_allocation - input.vc_allocation).max(Decimal::ZERO);
    let horizon = input.buyout_exit_year.max(input.vc_exit_year);
    let (idle_cash_flows, idle_events) = idle_cash(unallocated_capital, horizon);

    let cash_flows = combine_cash_flows(&[
        buyout.cash_flows.clone(),
        co_invest.cash_flows.clone(),
        venture.cash_flows.clone(),
        idle_cash_flows.clone(),
    ]);
    let (net_out, net_in) = split_flows(&cash_flows);
    let net_multiple = if net_out.is_zero() {
        Decimal::ZERO
    } else {
        net_in / net_out
    };
    let cash_events = merge_cash_events(&[
        (BUYOUT_PREFIX, &buyout.cash_events[..]),
        (CO_INVEST_PREFIX, &co_invest.cash_events[..]),
        (VC_PREFIX, &venture.cash_events[..]),
        ("", &idle_events[..]),
    ]);

    let blended = BlendedResult {
        net_irr: solve_irr(&cash_flows),
        net_multiple,
        total_fees: buyout.total_fees + co_invest.total_fees + venture.total_fees,
        net_value: net_in - net_out,
        cash_flows,
        cash_events,
    };

    PortfolioOutput {
        co_invest_split: split,
        buyout,
        co_invest,
        venture,
        unallocated_capital,
        idle_cash_flows,
        blended,
    }
}

pub fn analyze_portfolio(input: &PortfolioInput) -> CasebookResult<ComputationOutput<PortfolioOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    // --- Validation ---
    for (field, value) in [
        ("total_capital", input.total_capital),
        ("buyout_allocation", input.buyout_allocation),
        ("vc_allocation", input.vc_allocation),
        ("buyout_multiple", input.buyout_multiple),
        ("vc_multiple", input.vc_multiple),
    ] {
        if value < Decimal::ZERO {
            return Err(CasebookError::InvalidInput {
                field: field.into(),
                reason: "Must not be negative".into(),
            });
        }
    }
    for (field, year) in [
        ("buyout_exit_year", input.buyout_exit_year),
        ("vc_exit_year", input.vc_exit_year),
    ] {
        if year == 0 || year > MAX_EXIT_YEAR {
            return Err(CasebookError::InvalidInput {
                field: field.into(),
                reason: format!("Exit year must be between 1 and {MAX_EXIT_YEAR}"),
            });
        }
    }
    for fund in [&input.funds.buyout, &input.funds.co_invest, &input.funds.venture] {
        if fund.term_years() > MAX_EXIT_YEAR {
            return Err(CasebookError::InvalidInput {
                field: "fund_term".into(),
                reason: format!("{}: term must not exceed {MAX_EXIT_YEAR} years", fund.name),
            });
        }
    }

    let limits = AllocationLimits::from_funds(&input.funds);
    if input.buyout_allocation > limits.effective_buyout_cap(input.include_co_invest) {
        warnings.push(format!(
            "Buyout allocation {} exceeds the available buyout capacity {}",
            input.buyout_allocation,
            limits.effective_buyout_cap(input.include_co_invest)
        ));
    }
    if input.vc_allocation > limits.vc_cap {
        warnings.push(format!(
            "VC allocation {} exceeds the fund target size {}",
            input.vc_allocation, limits.vc_cap
        ));
    }
    if input.buyout_allocation + input.vc_allocation > input.total_capital {
        warnings.push("Allocations exceed total capital".into());
    }

    let output = compute_portfolio(input);
    if output.blended.net_irr.is_none() && !output.blended.cash_flows.iter().all(|cf| cf.is_zero()) {
        warnings.push("Blended net IRR did not converge".into());
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Blended portfolio: per-vehicle fund performance combined with idle cash",
        &serde_json::json!({
            "total_capital": input.total_capital.to_string(),
            "include_co_invest": input.include_co_invest,
            "co_invest_ratio": super::allocation::co_invest_ratio(&input.funds).to_string(),
            "horizon_years": input.buyout_exit_year.max(input.vc_exit_year),
        }),
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reference_portfolio() {
        let out = compute_portfolio(&PortfolioInput::default());
        assert_eq!(out.co_invest_split.main, dec!(1000));
        assert_eq!(out.co_invest_split.co_invest, dec!(200));
        assert_eq!(out.unallocated_capital, Decimal::ZERO);
        assert_eq!(out.idle_cash_flows, vec![Decimal::ZERO]);
        assert!(out.blended.net_multiple > Decimal::ONE);
        assert!(out.blended.net_irr.is_some());
        assert_eq!(
            out.blended.total_fees,
            out.buyout.total_fees + out.co_invest.total_fees + out.venture.total_fees
        );
    }

    #[test]
    fn test_blended_flows_are_sum_of_vehicles() {
        let out = compute_portfolio(&PortfolioInput::default());
        let expected = combine_cash_flows(&[
            out.buyout.cash_flows.clone(),
            out.co_invest.cash_flows.clone(),
            out.venture.cash_flows.clone(),
        ]);
        assert_eq!(out.blended.cash_flows, expected);
    }

    #[test]
    fn test_idle_cash_booked_at_longest_horizon() {
        let input = PortfolioInput {
            total_capital: dec!(1500),
            vc_exit_year: 12,
            ..PortfolioInput::default()
        };
        let out = compute_portfolio(&input);
        assert_eq!(out.unallocated_capital, dec!(200));
        assert_eq!(out.idle_cash_flows.len(), 13);
        assert_eq!(out.idle_cash_flows[0], dec!(-200));
        assert_eq!(out.idle_cash_flows[12], dec!(200));
        let idle: Vec<&CashEvent> = out
            .blended
            .cash_events
            .iter()
            .filter(|e| e.label.starts_with("Idle cash"))
            .collect();
        assert_eq!(idle.len(), 2);
        assert_eq!(idle[1].label, "Idle cash — released (Year 12)");
    }

    #[test]
    fn test_idle_cash_dilutes_multiple() {
        let base = compute_portfolio(&PortfolioInput::default());
        let idle = compute_portfolio(&PortfolioInput {
            total_capital: dec!(2000),
            ..PortfolioInput::default()
        });
        assert!(idle.blended.net_multiple < base.blended.net_multiple);
    }

    #[test]
    fn test_events_are_prefixed_and_sorted() {
        let out = compute_portfolio(&PortfolioInput::default());
        let events = &out.blended.cash_events;
        assert!(events.iter().any(|e| e.label.starts_with("Buyout — ")));
        assert!(events.iter().any(|e| e.label.starts_with("Co-invest — ")));
        assert!(events.iter().any(|e| e.label.starts_with("VC — ")));
        for pair in events.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(a.year <= b.year);
            if a.year == b.year {
                assert!(a.amount <= b.amount);
            }
        }
    }

    #[test]
    fn test_co_invest_disabled() {
        let out = compute_portfolio(&PortfolioInput {
            buyout_allocation: dec!(1000),
            include_co_invest: false,
            ..PortfolioInput::default()
        });
        assert_eq!(out.co_invest_split.co_invest, Decimal::ZERO);
        assert_eq!(out.co_invest, PerformanceResult::zero(dec!(3)));
        assert!(!out
            .blended
            .cash_events
            .iter()
            .any(|e| e.label.starts_with("Co-invest")));
    }

    #[test]
    fn test_analyze_rejects_negative_allocation() {
        let input = PortfolioInput {
            vc_allocation: dec!(-1),
            ..PortfolioInput::default()
        };
        assert!(analyze_portfolio(&input).is_err());
    }

    #[test]
    fn test_analyze_warns_over_cap() {
        let input = PortfolioInput {
            total_capital: dec!(2000),
            vc_allocation: dec!(300),
            ..PortfolioInput::default()
        };
        let out = analyze_portfolio(&input).unwrap();
        assert!(out.warnings.iter().any(|w| w.contains("VC allocation")));
    }

    #[test]
    fn test_partial_json_uses_reference_defaults() {
        let input: PortfolioInput = serde_json::from_str(r#"{"total_capital": "1500"}"#).unwrap();
        assert_eq!(input.total_capital, dec!(1500));
        assert_eq!(input.buyout_allocation, dec!(1200));
        assert!(input.include_co_invest);
    }

    #[test]
    fn test_analyze_rejects_exit_beyond_horizon() {
        let input = PortfolioInput {
            vc_exit_year: MAX_EXIT_YEAR + 1,
            ..PortfolioInput::default()
        };
        assert!(analyze_portfolio(&input).is_err());
    }
}
