use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::debt_schedule::{
    build_debt_schedule, years_in_holding_period, AccountingYear, DealTimeline, DebtScheduleEntry,
};
use crate::error::CasebookError;
use crate::time_value::annualised_return;
use crate::types::*;
use crate::CasebookResult;

pub const SENSITIVITY_STEP: Decimal = dec!(0.25);
pub const SENSITIVITY_STEPS_EACH_SIDE: i64 = 6;

/// Candidate multiples around `center` in quarter-turn steps, rounded to
/// 2 dp. Non-positive candidates are dropped.
pub fn sensitivity_values(center: Multiple) -> Vec<Multiple> {
    (-SENSITIVITY_STEPS_EACH_SIDE..=SENSITIVITY_STEPS_EACH_SIDE)
        .map(|k| (center + Decimal::from(k) * SENSITIVITY_STEP).round_dp(2))
        .filter(|m| *m > Decimal::ZERO)
        .collect()
}

/// Exit can only happen in a year strictly after the deal closed.
pub fn exit_year_candidates(years: &[AccountingYear], timeline: &DealTimeline) -> Vec<i32> {
    let entry = timeline.entry_year();
    years.iter().map(|y| y.year).filter(|y| *y > entry).collect()
}

/// Senior plus subordinated debt outstanding at the exit.
///
/// Prefers the modelled schedule; otherwise falls back to the balances
/// recorded on the exit year itself (ending, else starting). A recorded
/// total of zero is treated as unknown.
pub fn total_debt_at_exit(
    exit_year: i32,
    schedule: &[DebtScheduleEntry],
    exit_year_data: Option<&AccountingYear>,
) -> Option<Money> {
    if let Some(entry) = schedule.iter().find(|e| e.year == exit_year) {
        return Some(entry.senior.ending_balance + entry.subordinated.ending_balance);
    }
    let year = exit_year_data?;
    let recorded = |balance: &Option<super::debt_schedule::DebtBalance>| {
        balance
            .as_ref()
            .and_then(|b| b.ending_balance.or(b.starting_balance))
            .unwrap_or(Decimal::ZERO)
    };
    let total = recorded(&year.senior_debt) + recorded(&year.subordinated_debt);
    if total.is_zero() {
        None
    } else {
        Some(total)
    }
}

/// `cash - debt`, treating a single missing side as zero.
pub fn net_cash_minus_debt(cash: Option<Money>, debt: Option<Money>) -> Option<Money> {
    if cash.is_none() && debt.is_none() {
        return None;
    }
    Some(cash.unwrap_or(Decimal::ZERO) - debt.unwrap_or(Decimal::ZERO))
}

// ---------------------------------------------------------------------------
// Input / Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitValuationInput {
    pub years: Vec<AccountingYear>,
    pub entry_multiple: Multiple,
    pub exit_multiple: Multiple,
    /// Defaults to the first year after the close
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_year: Option<i32>,
    pub senior_rate_percent: Percent,
    pub subordinated_rate_percent: Percent,
    #[serde(default)]
    pub timeline: DealTimeline,
}

/// IRR and MOIC across entry/exit multiple pairs, indexed
/// `[exit multiple][entry multiple]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensitivityGrids {
    pub entry_multiples: Vec<Multiple>,
    pub exit_multiples: Vec<Multiple>,
    pub irr: Vec<Vec<Option<Rate>>>,
    pub moic: Vec<Vec<Option<Multiple>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitValuation {
    pub exit_year: i32,
    pub exit_ebitda: Option<Money>,
    pub enterprise_value: Option<Money>,
    pub entry_enterprise_value: Option<Money>,
    pub entry_equity_value: Option<Money>,
    pub total_debt_at_exit: Option<Money>,
    pub net_cash_minus_debt: Option<Money>,
    pub equity_value: Option<Money>,
    pub moic: Option<Multiple>,
    pub holding_period_years: Option<Years>,
    pub irr: Option<Rate>,
    pub debt_schedule: Vec<DebtScheduleEntry>,
    pub sensitivity: SensitivityGrids,
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

fn find_year(years: &[AccountingYear], year: i32) -> Option<&AccountingYear> {
    years.iter().find(|y| y.year == year)
}

struct GridBasis {
    entry_ebitda: Money,
    entry_net_cash: Money,
    exit_ebitda: Money,
    net_cash_minus_debt: Money,
}

fn sensitivity_grids(
    basis: Option<GridBasis>,
    entry_multiple: Multiple,
    exit_multiple: Multiple,
    holding: Option<Years>,
) -> SensitivityGrids {
    let entry_multiples = sensitivity_values(entry_multiple);
    let exit_multiples = sensitivity_values(exit_multiple);
    let Some(b) = basis else {
        return SensitivityGrids {
            entry_multiples,
            exit_multiples,
            ..SensitivityGrids::default()
        };
    };

    let moic: Vec<Vec<Option<Multiple>>> = exit_multiples
        .iter()
        .map(|exit_m| {
            let exit_equity = b.exit_ebitda * *exit_m + b.net_cash_minus_debt;
            entry_multiples
                .iter()
                .map(|entry_m| {
                    let entry_equity = b.entry_ebitda * *entry_m + b.entry_net_cash;
                    if entry_equity <= Decimal::ZERO || exit_equity <= Decimal::ZERO {
                        None
                    } else {
                        Some(exit_equity / entry_equity)
                    }
                })
                .collect()
        })
        .collect();

    let irr = match holding.filter(|h| *h > Decimal::ZERO) {
        Some(h) => moic
            .iter()
            .map(|row| {
                row.iter()
                    .map(|m| m.and_then(|m| annualised_return(m, h)))
                    .collect()
            })
            .collect(),
        None => Vec::new(),
    };

    SensitivityGrids {
        entry_multiples,
        exit_multiples,
        irr,
        moic,
    }
}

/// Value the exit: EV at the exit multiple, net of the debt left after the
/// cash sweep, against the entry equity at the entry multiple.
pub fn compute_exit_valuation(input: &ExitValuationInput, exit_year: i32) -> ExitValuation {
    let timeline = &input.timeline;
    let entry_year = timeline.entry_year();

    let exit_data = find_year(&input.years, exit_year);
    let exit_ebitda = exit_data.and_then(|y| y.ebitda);
    let exit_cash = exit_data.and_then(|y| y.cash_at_bank);
    let entry_ebitda = find_year(&input.years, entry_year).and_then(|y| y.ebitda);
    let entry_net_cash = find_year(&input.years, entry_year - 1).and_then(|y| y.cash_at_bank);

    let enterprise_value = exit_ebitda.map(|e| e * input.exit_multiple);
    let entry_enterprise_value = entry_ebitda.map(|e| e * input.entry_multiple);
    let entry_equity_value = entry_enterprise_value.zip(entry_net_cash).map(|(ev, c)| ev + c);

    let held = years_in_holding_period(&input.years, timeline, exit_year);
    let debt_schedule = build_debt_schedule(
        &held,
        input.senior_rate_percent,
        input.subordinated_rate_percent,
        timeline,
    );

    let total_debt = total_debt_at_exit(exit_year, &debt_schedule, exit_data);
    let net_cash_less_debt = net_cash_minus_debt(exit_cash, total_debt);
    let equity_value = enterprise_value
        .zip(net_cash_less_debt)
        .map(|(ev, nc)| ev + nc);

    let moic = match (equity_value, entry_equity_value) {
        (Some(exit_eq), Some(entry_eq)) if !entry_eq.is_zero() => Some(exit_eq / entry_eq),
        _ => None,
    };
    let holding_period_years = timeline.holding_period_years(exit_year);
    let irr = moic
        .zip(holding_period_years)
        .and_then(|(m, h)| annualised_return(m, h));

    let basis = match (entry_ebitda, entry_net_cash, exit_ebitda, net_cash_less_debt) {
        (Some(entry_ebitda), Some(entry_net_cash), Some(exit_ebitda), Some(ncd)) => {
            Some(GridBasis {
                entry_ebitda,
                entry_net_cash,
                exit_ebitda,
                net_cash_minus_debt: ncd,
            })
        }
        _ => None,
    };
    let sensitivity = sensitivity_grids(
        basis,
        input.entry_multiple,
        input.exit_multiple,
        holding_period_years,
    );

    ExitValuation {
        exit_year,
        exit_ebitda,
        enterprise_value,
        entry_enterprise_value,
        entry_equity_value,
        total_debt_at_exit: total_debt,
        net_cash_minus_debt: net_cash_less_debt,
        equity_value,
        moic,
        holding_period_years,
        irr,
        debt_schedule,
        sensitivity,
    }
}

pub fn analyze_exit_valuation(
    input: &ExitValuationInput,
) -> CasebookResult<ComputationOutput<ExitValuation>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.years.is_empty() {
        return Err(CasebookError::InsufficientData(
            "At least one accounting year is required".into(),
        ));
    }
    for (field, m) in [
        ("entry_multiple", input.entry_multiple),
        ("exit_multiple", input.exit_multiple),
    ] {
        if m <= Decimal::ZERO {
            return Err(CasebookError::InvalidInput {
                field: field.into(),
                reason: "Multiple must be positive".into(),
            });
        }
    }

    let candidates = exit_year_candidates(&input.years, &input.timeline);
    let exit_year = match input.exit_year {
        Some(year) if candidates.contains(&year) => year,
        Some(year) => {
            return Err(CasebookError::InvalidInput {
                field: "exit_year".into(),
                reason: format!(
                    "{year} is not an accounting year after the {} close",
                    input.timeline.entry_year()
                ),
            })
        }
        None => match candidates.first() {
            Some(year) => *year,
            None => {
                return Err(CasebookError::InsufficientData(
                    "No accounting years after the deal close".into(),
                ))
            }
        },
    };

    let output = compute_exit_valuation(input, exit_year);
    if output.entry_equity_value.is_none() {
        warnings.push("Entry equity unavailable: entry EBITDA or prior-year cash missing".into());
    }
    if output.equity_value.is_none() {
        warnings.push("Exit equity unavailable: exit EBITDA or net debt missing".into());
    }
    if output.debt_schedule.iter().any(|e| !e.converged) {
        warnings.push("Debt sweep did not settle in every year".into());
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "LBO exit: EV x multiple plus net cash less swept debt, MOIC and annualised IRR",
        &serde_json::json!({
            "entry_year": input.timeline.entry_year(),
            "exit_year": exit_year,
            "entry_multiple": input.entry_multiple.to_string(),
            "exit_multiple": input.exit_multiple.to_string(),
            "sensitivity_step": SENSITIVITY_STEP.to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}
