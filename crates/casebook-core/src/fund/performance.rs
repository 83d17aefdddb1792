use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::config::FundConfig;
use crate::error::CasebookError;
use crate::time_value::{cash_multiple, solve_irr};
use crate::types::*;
use crate::CasebookResult;

/// Capital is called in equal instalments over years 1..=6.
pub const INVESTMENT_PERIOD_YEARS: u32 = 6;
/// Latest exit year the boundary accepts; the schedule has one slot per year.
pub const MAX_EXIT_YEAR: u32 = 100;

// ---------------------------------------------------------------------------
// Input / Output
// ---------------------------------------------------------------------------

/// Input for a single-vehicle fund performance run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundPerformanceInput {
    /// Capital committed to the vehicle
    pub allocation: Money,
    /// Gross multiple realised on the committed capital
    pub gross_multiple: Multiple,
    /// Year (offset from first close) in which everything is divested
    pub exit_year: u32,
    pub config: FundConfig,
}

/// Derived performance of one vehicle. Recomputed from scratch on every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceResult {
    /// LP net cash flows by year (fees and carry included)
    pub cash_flows: CashFlowSeries,
    pub gross_multiple: Multiple,
    pub net_multiple: Multiple,
    /// IRR on capital calls and gross exit value only
    pub gross_irr: Option<Rate>,
    pub net_irr: Option<Rate>,
    /// gross_multiple - net_multiple
    pub fee_drag: Multiple,
    pub management_fees: Money,
    pub establishment_fee: Money,
    pub carry: Money,
    pub total_fees: Money,
    pub lp_distribution: Money,
    /// lp_distribution - total_fees
    pub net_value: Money,
    pub cash_events: Vec<CashEvent>,
}

impl PerformanceResult {
    /// Canonical result for a vehicle with nothing allocated.
    pub fn zero(gross_multiple: Multiple) -> Self {
        PerformanceResult {
            cash_flows: vec![Decimal::ZERO],
            gross_multiple,
            net_multiple: Decimal::ZERO,
            gross_irr: None,
            net_irr: None,
            fee_drag: Decimal::ZERO,
            management_fees: Decimal::ZERO,
            establishment_fee: Decimal::ZERO,
            carry: Decimal::ZERO,
            total_fees: Decimal::ZERO,
            lp_distribution: Decimal::ZERO,
            net_value: Decimal::ZERO,
            cash_events: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// Add `amount` at `year`, growing the series with zeros when needed.
fn book_at(series: &mut CashFlowSeries, year: u32, amount: Money) {
    let idx = year as usize;
    if idx >= series.len() {
        series.resize(idx + 1, Decimal::ZERO);
    }
    series[idx] += amount;
}

/// Gross series: equal capital calls over the investment period and a
/// single exit inflow, no fees.
fn gross_cash_flows(draw: Money, gross_value: Money, exit_year: u32) -> CashFlowSeries {
    let len = exit_year.max(INVESTMENT_PERIOD_YEARS) as usize + 1;
    let mut flows = vec![Decimal::ZERO; len];
    for year in 1..=INVESTMENT_PERIOD_YEARS {
        flows[year as usize] -= draw;
    }
    book_at(&mut flows, exit_year, gross_value);
    flows
}

/// Build the LP cash-flow schedule of one vehicle and derive its multiples,
/// IRRs and fee drag.
///
/// Establishment fee at year 0, capital called evenly over years 1-6,
/// management fees on committed capital each year until the exit or the end
/// of the fund term (whichever is sooner), carry on profit above the
/// compounded preferred return, and the LP distribution net of carry at the
/// exit year. A non-positive allocation short-circuits to
/// [`PerformanceResult::zero`].
pub fn compute_fund_performance(
    allocation: Money,
    gross_multiple: Multiple,
    exit_year: u32,
    config: &FundConfig,
) -> PerformanceResult {
    if allocation <= Decimal::ZERO {
        return PerformanceResult::zero(gross_multiple);
    }

    let term_years = config.term_years();
    let total_years = exit_year.max(term_years).max(INVESTMENT_PERIOD_YEARS);
    let mut cash_flows: CashFlowSeries = vec![Decimal::ZERO; total_years as usize + 1];
    let mut cash_events: Vec<CashEvent> = Vec::new();

    // --- Establishment fee ---
    let establishment_fee = match config.establishment_fee_percent {
        Some(pct) if pct > Decimal::ZERO => {
            let fee = allocation * percent_to_rate(pct);
            cash_flows[0] -= fee;
            cash_events.push(
                CashEvent::new("Establishment fees (Year 0)", -fee, 0).with_percent(Some(pct)),
            );
            fee
        }
        _ => Decimal::ZERO,
    };

    // --- Capital calls ---
    let draw = allocation / Decimal::from(INVESTMENT_PERIOD_YEARS);
    for year in 1..=INVESTMENT_PERIOD_YEARS {
        cash_flows[year as usize] -= draw;
        cash_events.push(CashEvent::new(
            format!("Capital called (Year {year})"),
            -draw,
            year,
        ));
    }

    // --- Management fees ---
    let mut management_fees = Decimal::ZERO;
    if let Some(pct) = config.management_fee_percent.filter(|p| *p > Decimal::ZERO) {
        let fee = allocation * percent_to_rate(pct);
        for year in 1..=exit_year.min(term_years) {
            book_at(&mut cash_flows, year, -fee);
            management_fees += fee;
            cash_events.push(
                CashEvent::new(format!("Management fees (Year {year})"), -fee, year)
                    .with_percent(Some(pct)),
            );
        }
    }

    // --- Preferred return and carry ---
    let gross_value = allocation * gross_multiple;
    // None: the compounded hurdle overflows, so no profit can clear it.
    let preferred_excess = match config.preferred_return_percent {
        Some(pct) if pct > Decimal::ZERO => (Decimal::ONE + percent_to_rate(pct))
            .checked_powi(i64::from(exit_year))
            .and_then(|growth| allocation.checked_mul(growth))
            .map(|hurdle| hurdle - allocation),
        _ => Some(Decimal::ZERO),
    };
    let profit = (gross_value - allocation).max(Decimal::ZERO);
    let carry_percent = config.carry.applied_rate_percent(gross_multiple);
    let carry = match preferred_excess {
        Some(excess) if profit > excess => (profit - excess) * percent_to_rate(carry_percent),
        _ => Decimal::ZERO,
    };

    if carry > Decimal::ZERO {
        cash_events.push(
            CashEvent::new(format!("Carry (Year {exit_year})"), -carry, exit_year)
                .with_percent(Some(carry_percent)),
        );
    }

    // --- Distribution ---
    let lp_distribution = gross_value - carry;
    book_at(&mut cash_flows, exit_year, lp_distribution);
    cash_events.push(CashEvent::new(
        format!("Distributions (Year {exit_year})"),
        lp_distribution,
        exit_year,
    ));

    // --- Metrics ---
    let net_multiple = cash_multiple(&cash_flows);
    let net_irr = solve_irr(&cash_flows);
    let gross_irr = solve_irr(&gross_cash_flows(draw, gross_value, exit_year));
    let total_fees = management_fees + establishment_fee + carry;

    PerformanceResult {
        cash_flows,
        gross_multiple,
        net_multiple,
        gross_irr,
        net_irr,
        fee_drag: gross_multiple - net_multiple,
        management_fees,
        establishment_fee,
        carry,
        total_fees,
        lp_distribution,
        net_value: lp_distribution - total_fees,
        cash_events,
    }
}

/// Validate a fund performance request and run [`compute_fund_performance`].
pub fn analyze_fund_performance(
    input: &FundPerformanceInput,
) -> CasebookResult<ComputationOutput<PerformanceResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    // --- Validation ---
    if input.allocation < Decimal::ZERO {
        return Err(CasebookError::InvalidInput {
            field: "allocation".into(),
            reason: "Allocation cannot be negative".into(),
        });
    }
    if input.gross_multiple < Decimal::ZERO {
        return Err(CasebookError::InvalidInput {
            field: "gross_multiple".into(),
            reason: "Gross multiple cannot be negative".into(),
        });
    }
    if input.exit_year == 0 || input.exit_year > MAX_EXIT_YEAR {
        return Err(CasebookError::InvalidInput {
            field: "exit_year".into(),
            reason: format!("Exit year must be between 1 and {MAX_EXIT_YEAR}"),
        });
    }
    let cfg = &input.config;
    if cfg.term_years() > MAX_EXIT_YEAR {
        return Err(CasebookError::InvalidInput {
            field: "fund_term".into(),
            reason: format!("Fund term must not exceed {MAX_EXIT_YEAR} years"),
        });
    }
    for (field, pct) in [
        ("management_fee_percent", cfg.management_fee_percent),
        ("preferred_return_percent", cfg.preferred_return_percent),
        ("establishment_fee_percent", cfg.establishment_fee_percent),
    ] {
        if let Some(p) = pct {
            if p < Decimal::ZERO || p > Decimal::ONE_HUNDRED {
                return Err(CasebookError::InvalidInput {
                    field: field.into(),
                    reason: "Percentage must be between 0 and 100".into(),
                });
            }
        }
    }

    if input.allocation.is_zero() {
        warnings.push("Zero allocation: all metrics reported as zero".into());
    }
    if input.exit_year < INVESTMENT_PERIOD_YEARS {
        warnings.push(format!(
            "Exit in year {} precedes the end of the {}-year investment period",
            input.exit_year, INVESTMENT_PERIOD_YEARS
        ));
    }

    let output = compute_fund_performance(
        input.allocation,
        input.gross_multiple,
        input.exit_year,
        cfg,
    );
    if !input.allocation.is_zero() && output.net_irr.is_none() {
        warnings.push("Net IRR did not converge".into());
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Fund performance: fee, carry and distribution schedule with gross/net IRR",
        &serde_json::json!({
            "fund": cfg.name,
            "allocation": input.allocation.to_string(),
            "gross_multiple": input.gross_multiple.to_string(),
            "exit_year": input.exit_year,
            "fund_term_years": cfg.term_years(),
        }),
        warnings,
        elapsed,
        output,
    ))
}
