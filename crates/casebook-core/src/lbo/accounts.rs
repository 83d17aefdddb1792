//! Income-statement and cash-flow lines derived from the raw filed accounts.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::CasebookError;
use crate::time_value::annualised_return;
use crate::types::*;
use crate::CasebookResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataStatus {
    Audited,
    Unaudited,
    Plan,
    Forecast,
}

/// One year of filed or forecast accounts. Costs are negative amounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAccountingYear {
    pub year: i32,
    pub status: DataStatus,
    pub turnover: Money,
    pub cost_of_sales: Money,
    pub overheads: Money,
    pub interest_receivable: Money,
    #[serde(default)]
    pub depreciation: Option<Money>,
    #[serde(default)]
    pub profit_loss_on_sale_of_fixed_assets: Option<Money>,
    #[serde(default)]
    pub increase_decrease_in_debtors: Option<Money>,
    #[serde(default)]
    pub increase_decrease_in_creditors: Option<Money>,
    #[serde(default)]
    pub interest_received: Option<Money>,
    #[serde(default)]
    pub net_capital_expenditure: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedAccountingYear {
    #[serde(flatten)]
    pub raw: RawAccountingYear,
    pub gross_profit: Money,
    pub gross_profit_margin: Percent,
    pub ebit: Money,
    pub ebit_margin: Percent,
    pub pbt: Money,
    pub pbt_margin: Percent,
    pub cash_flow_from_operations: Money,
    pub free_cash_flow_pre_tax: Money,
}

fn margin(value: Money, turnover: Money) -> Percent {
    if turnover.is_zero() {
        Decimal::ZERO
    } else {
        value * Decimal::ONE_HUNDRED / turnover
    }
}

pub fn enrich_accounting_year(raw: &RawAccountingYear) -> EnrichedAccountingYear {
    let add = |v: Option<Money>| v.unwrap_or(Decimal::ZERO);

    let gross_profit = raw.turnover + raw.cost_of_sales;
    let ebit = gross_profit + raw.overheads;
    let pbt = ebit + raw.interest_receivable;

    let cash_flow_from_operations = ebit
        + add(raw.depreciation)
        + add(raw.profit_loss_on_sale_of_fixed_assets)
        + add(raw.increase_decrease_in_debtors)
        + add(raw.increase_decrease_in_creditors);
    let free_cash_flow_pre_tax = cash_flow_from_operations
        + add(raw.interest_received)
        + add(raw.net_capital_expenditure);

    EnrichedAccountingYear {
        gross_profit,
        gross_profit_margin: margin(gross_profit, raw.turnover),
        ebit,
        ebit_margin: margin(ebit, raw.turnover),
        pbt,
        pbt_margin: margin(pbt, raw.turnover),
        cash_flow_from_operations,
        free_cash_flow_pre_tax,
        raw: raw.clone(),
    }
}

/// Compound annual growth between the earliest and latest year.
///
/// `None` with fewer than two years, a non-positive endpoint, or no elapsed
/// time between the endpoints.
pub fn cagr<T>(
    years: &[T],
    year_of: impl Fn(&T) -> i32,
    value_of: impl Fn(&T) -> Option<Money>,
) -> Option<Rate> {
    if years.len() < 2 {
        return None;
    }
    let first = years.iter().min_by_key(|y| year_of(*y))?;
    let last = years.iter().max_by_key(|y| year_of(*y))?;

    let begin = value_of(first)?;
    let end = value_of(last)?;
    if begin <= Decimal::ZERO || end <= Decimal::ZERO {
        return None;
    }
    let elapsed = year_of(last) - year_of(first);
    if elapsed <= 0 {
        return None;
    }
    annualised_return(end / begin, Decimal::from(elapsed))
}

pub fn turnover_cagr(years: &[EnrichedAccountingYear]) -> Option<Rate> {
    cagr(years, |y| y.raw.year, |y| Some(y.raw.turnover))
}

pub fn ebit_cagr(years: &[EnrichedAccountingYear]) -> Option<Rate> {
    cagr(years, |y| y.raw.year, |y| Some(y.ebit))
}

// ---------------------------------------------------------------------------
// Boundary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountsInput {
    pub years: Vec<RawAccountingYear>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountsOutput {
    /// Enriched years, oldest first
    pub years: Vec<EnrichedAccountingYear>,
    pub turnover_cagr: Option<Rate>,
    pub ebit_cagr: Option<Rate>,
}

pub fn analyze_accounts(input: &AccountsInput) -> CasebookResult<ComputationOutput<AccountsOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.years.is_empty() {
        return Err(CasebookError::InsufficientData(
            "At least one accounting year is required".into(),
        ));
    }

    let mut years: Vec<EnrichedAccountingYear> =
        input.years.iter().map(enrich_accounting_year).collect();
    years.sort_by_key(|y| y.raw.year);

    for pair in years.windows(2) {
        if pair[0].raw.year == pair[1].raw.year {
            warnings.push(format!("Year {} appears more than once", pair[0].raw.year));
        }
    }
    for y in years.iter().filter(|y| y.raw.turnover.is_zero()) {
        warnings.push(format!("Year {} has no turnover; margins reported as zero", y.raw.year));
    }

    let output = AccountsOutput {
        turnover_cagr: turnover_cagr(&years),
        ebit_cagr: ebit_cagr(&years),
        years,
    };
    if output.years.len() >= 2 && output.turnover_cagr.is_none() {
        warnings.push("Turnover CAGR undefined for non-positive endpoints".into());
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Filed accounts enriched with margins, operating cash flow and growth rates",
        &serde_json::json!({
            "year_count": output.years.len(),
            "costs_sign": "negative",
        }),
        warnings,
        elapsed,
        output,
    ))
}
