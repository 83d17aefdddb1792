use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::CasebookError;
use crate::types::*;
use crate::CasebookResult;

/// Hard cap on fixed-point rounds per year.
pub const MAX_DEBT_ITERATIONS: u32 = 12;
/// Interest and repayment must each move by less than this between rounds.
pub const DEBT_CONVERGENCE_TOLERANCE: Decimal = dec!(0.01);

const MONTHS_IN_YEAR: u32 = 12;

// ---------------------------------------------------------------------------
// Deal timeline
// ---------------------------------------------------------------------------

/// When the buyout closed. Drives the partial first year of interest and the
/// holding-period fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealTimeline {
    pub close_date: NaiveDate,
}

impl DealTimeline {
    pub fn new(close_date: NaiveDate) -> Self {
        DealTimeline { close_date }
    }

    /// The Styles & Wood buyout, closed at the end of May 2004.
    pub fn reference() -> Self {
        DealTimeline {
            close_date: NaiveDate::from_ymd_opt(2004, 5, 31).unwrap_or_default(),
        }
    }

    pub fn entry_year(&self) -> i32 {
        self.close_date.year()
    }

    /// Fraction of the closing year the debt is outstanding.
    pub fn entry_partial_year(&self) -> Years {
        Decimal::from(MONTHS_IN_YEAR - self.close_date.month()) / Decimal::from(MONTHS_IN_YEAR)
    }

    /// 0 before the close, the partial fraction in the closing year, 1 after.
    pub fn interest_accrual_factor(&self, year: i32) -> Decimal {
        let entry = self.entry_year();
        if year < entry {
            Decimal::ZERO
        } else if year == entry {
            self.entry_partial_year()
        } else {
            Decimal::ONE
        }
    }

    /// Partial entry year plus full years to the exit; `None` before the close.
    pub fn holding_period_years(&self, exit_year: i32) -> Option<Years> {
        let full_years = exit_year - self.entry_year();
        if full_years < 0 {
            return None;
        }
        Some(self.entry_partial_year() + Decimal::from(full_years))
    }
}

impl Default for DealTimeline {
    fn default() -> Self {
        Self::reference()
    }
}

// ---------------------------------------------------------------------------
// Accounting input
// ---------------------------------------------------------------------------

/// Recorded balance of one debt tranche for a year.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebtBalance {
    pub starting_balance: Option<Money>,
    pub interest: Option<Money>,
    pub repayment: Option<Money>,
    pub ending_balance: Option<Money>,
}

/// The cash-flow lines of one financial year that feed debt service.
/// Missing lines count as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountingYear {
    pub year: i32,
    pub ebitda: Option<Money>,
    pub tax_expense: Option<Money>,
    pub increase_decrease_in_debtors: Option<Money>,
    pub increase_decrease_in_creditors: Option<Money>,
    pub change_in_other_long_term_liabilities: Option<Money>,
    pub net_capital_expenditure: Option<Money>,
    /// Operating cash at bank at the year end
    pub cash_at_bank: Option<Money>,
    pub senior_debt: Option<DebtBalance>,
    pub subordinated_debt: Option<DebtBalance>,
}

fn or_zero(value: Option<Money>) -> Money {
    value.unwrap_or(Decimal::ZERO)
}

pub fn change_in_working_capital(year: &AccountingYear) -> Money {
    or_zero(year.increase_decrease_in_debtors) + or_zero(year.increase_decrease_in_creditors)
}

/// EBITDA - tax - Δ working capital - Δ other long-term liabilities - capex
pub fn base_cash_flow_before_debt_service(year: &AccountingYear) -> Money {
    or_zero(year.ebitda)
        - or_zero(year.tax_expense)
        - change_in_working_capital(year)
        - or_zero(year.change_in_other_long_term_liabilities)
        - or_zero(year.net_capital_expenditure)
}

/// Interest on the average of starting and ending balance. Zero for a
/// non-positive rate.
pub fn interest_expense(
    starting_balance: Money,
    ending_balance: Money,
    rate_percent: Percent,
    accrual_factor: Decimal,
) -> Money {
    if rate_percent <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let average = (starting_balance + ending_balance) / dec!(2);
    average * percent_to_rate(rate_percent) * accrual_factor
}

// ---------------------------------------------------------------------------
// Single-year solver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DebtYearInput {
    pub base_cash_flow: Money,
    pub senior_starting_balance: Money,
    pub subordinated_starting_balance: Money,
    pub senior_rate_percent: Percent,
    pub subordinated_rate_percent: Percent,
    pub interest_accrual_factor: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DebtYearSolution {
    pub senior_repayment: Money,
    pub subordinated_repayment: Money,
    pub senior_ending_balance: Money,
    pub subordinated_ending_balance: Money,
    pub senior_interest: Money,
    pub subordinated_interest: Money,
    /// Cash left for debt repayment once interest is paid
    pub cash_available: Money,
    /// False when the round cap was hit; the last iterate is still returned
    pub converged: bool,
    pub iterations: u32,
}

/// Resolve the interest/repayment circularity of one year by fixed-point
/// iteration.
///
/// Interest is charged on the average balance, which depends on the
/// repayment, which depends on cash left after interest. Senior debt is
/// repaid first; subordinated debt only once senior is fully cleared.
pub fn solve_debt_year(input: &DebtYearInput) -> DebtYearSolution {
    let senior_start = input.senior_starting_balance;
    let sub_start = input.subordinated_starting_balance;
    let factor = input.interest_accrual_factor;

    let mut senior_repayment = Decimal::ZERO;
    let mut sub_repayment = Decimal::ZERO;
    let mut senior_end = senior_start;
    let mut sub_end = sub_start;
    let mut senior_interest =
        interest_expense(senior_start, senior_end, input.senior_rate_percent, factor);
    let mut sub_interest =
        interest_expense(sub_start, sub_end, input.subordinated_rate_percent, factor);

    let mut converged = false;
    let mut iterations = 0;

    while iterations < MAX_DEBT_ITERATIONS {
        iterations += 1;
        let available = (input.base_cash_flow - senior_interest - sub_interest).max(Decimal::ZERO);

        let next_senior_repayment = available.min(senior_start);
        let next_senior_end = (senior_start - next_senior_repayment).max(Decimal::ZERO);
        let next_senior_interest =
            interest_expense(senior_start, next_senior_end, input.senior_rate_percent, factor);

        let remaining = (available - next_senior_repayment).max(Decimal::ZERO);
        let next_sub_repayment = if next_senior_end.is_zero() {
            remaining.min(sub_start)
        } else {
            Decimal::ZERO
        };
        let next_sub_end = (sub_start - next_sub_repayment).max(Decimal::ZERO);
        let next_sub_interest =
            interest_expense(sub_start, next_sub_end, input.subordinated_rate_percent, factor);

        let settled = (next_senior_interest - senior_interest).abs() < DEBT_CONVERGENCE_TOLERANCE
            && (next_sub_interest - sub_interest).abs() < DEBT_CONVERGENCE_TOLERANCE
            && (next_senior_repayment - senior_repayment).abs() < DEBT_CONVERGENCE_TOLERANCE
            && (next_sub_repayment - sub_repayment).abs() < DEBT_CONVERGENCE_TOLERANCE;

        senior_repayment = next_senior_repayment;
        sub_repayment = next_sub_repayment;
        senior_end = next_senior_end;
        sub_end = next_sub_end;
        senior_interest = next_senior_interest;
        sub_interest = next_sub_interest;

        if settled {
            converged = true;
            break;
        }
    }

    if !converged {
        log::warn!(
            "debt sweep hit the {MAX_DEBT_ITERATIONS}-round cap; keeping last iterate"
        );
    }

    DebtYearSolution {
        senior_repayment,
        subordinated_repayment: sub_repayment,
        senior_ending_balance: senior_end,
        subordinated_ending_balance: sub_end,
        senior_interest,
        subordinated_interest: sub_interest,
        cash_available: (input.base_cash_flow - senior_interest - sub_interest).max(Decimal::ZERO),
        converged,
        iterations,
    }
}

// ---------------------------------------------------------------------------
// Multi-year schedule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrancheSchedule {
    pub starting_balance: Money,
    pub interest_expense: Money,
    pub repayment: Money,
    pub ending_balance: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtScheduleEntry {
    pub year: i32,
    pub base_cash_flow: Money,
    pub cash_available_for_debt_repayment: Money,
    pub senior: TrancheSchedule,
    pub subordinated: TrancheSchedule,
    pub converged: bool,
}

/// Run the year solver across the holding period, threading each year's
/// ending balances into the next. The first year's opening balances come
/// from its recorded tranche balances.
pub fn build_debt_schedule(
    years: &[AccountingYear],
    senior_rate_percent: Percent,
    subordinated_rate_percent: Percent,
    timeline: &DealTimeline,
) -> Vec<DebtScheduleEntry> {
    let mut schedule = Vec::with_capacity(years.len());
    let mut carried: Option<(Money, Money)> = None;

    for year in years {
        let (senior_start, sub_start) = match carried {
            Some((senior, sub)) => (senior.max(Decimal::ZERO), sub.max(Decimal::ZERO)),
            None => (
                year.senior_debt
                    .as_ref()
                    .and_then(|d| d.starting_balance)
                    .unwrap_or(Decimal::ZERO),
                year.subordinated_debt
                    .as_ref()
                    .and_then(|d| d.starting_balance)
                    .unwrap_or(Decimal::ZERO),
            ),
        };

        let base_cash_flow = base_cash_flow_before_debt_service(year);
        let solved = solve_debt_year(&DebtYearInput {
            base_cash_flow,
            senior_starting_balance: senior_start,
            subordinated_starting_balance: sub_start,
            senior_rate_percent,
            subordinated_rate_percent,
            interest_accrual_factor: timeline.interest_accrual_factor(year.year),
        });

        carried = Some((solved.senior_ending_balance, solved.subordinated_ending_balance));
        schedule.push(DebtScheduleEntry {
            year: year.year,
            base_cash_flow,
            cash_available_for_debt_repayment: solved.cash_available,
            senior: TrancheSchedule {
                starting_balance: senior_start,
                interest_expense: solved.senior_interest,
                repayment: solved.senior_repayment,
                ending_balance: solved.senior_ending_balance,
            },
            subordinated: TrancheSchedule {
                starting_balance: sub_start,
                interest_expense: solved.subordinated_interest,
                repayment: solved.subordinated_repayment,
                ending_balance: solved.subordinated_ending_balance,
            },
            converged: solved.converged,
        });
    }

    schedule
}

/// Years from the deal close up to and including `exit_year`.
pub fn years_in_holding_period(
    years: &[AccountingYear],
    timeline: &DealTimeline,
    exit_year: i32,
) -> Vec<AccountingYear> {
    let entry = timeline.entry_year();
    years
        .iter()
        .filter(|y| y.year >= entry && y.year <= exit_year)
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Boundary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtScheduleInput {
    pub years: Vec<AccountingYear>,
    pub senior_rate_percent: Percent,
    pub subordinated_rate_percent: Percent,
    /// Restrict the schedule to the holding period ending at this year
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_year: Option<i32>,
    #[serde(default)]
    pub timeline: DealTimeline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtScheduleOutput {
    pub schedule: Vec<DebtScheduleEntry>,
    pub total_interest: Money,
    pub total_repayment: Money,
    pub closing_debt: Money,
}

pub fn analyze_debt_schedule(
    input: &DebtScheduleInput,
) -> CasebookResult<ComputationOutput<DebtScheduleOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.years.is_empty() {
        return Err(CasebookError::InsufficientData(
            "At least one accounting year is required".into(),
        ));
    }
    for (field, rate) in [
        ("senior_rate_percent", input.senior_rate_percent),
        ("subordinated_rate_percent", input.subordinated_rate_percent),
    ] {
        if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
            return Err(CasebookError::InvalidInput {
                field: field.into(),
                reason: "Interest rate must be between 0 and 100".into(),
            });
        }
    }

    let years = match input.exit_year {
        Some(exit) => years_in_holding_period(&input.years, &input.timeline, exit),
        None => input.years.clone(),
    };
    if years.is_empty() {
        warnings.push("No accounting years fall inside the holding period".into());
    }

    let schedule = build_debt_schedule(
        &years,
        input.senior_rate_percent,
        input.subordinated_rate_percent,
        &input.timeline,
    );
    for entry in schedule.iter().filter(|e| !e.converged) {
        warnings.push(format!(
            "Debt sweep for {} did not settle within {} rounds",
            entry.year, MAX_DEBT_ITERATIONS
        ));
    }

    let total_interest: Money = schedule
        .iter()
        .map(|e| e.senior.interest_expense + e.subordinated.interest_expense)
        .sum();
    let total_repayment: Money = schedule
        .iter()
        .map(|e| e.senior.repayment + e.subordinated.repayment)
        .sum();
    let closing_debt = schedule
        .last()
        .map(|e| e.senior.ending_balance + e.subordinated.ending_balance)
        .unwrap_or(Decimal::ZERO);

    let output = DebtScheduleOutput {
        schedule,
        total_interest,
        total_repayment,
        closing_debt,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Senior-first cash sweep with average-balance interest solved by fixed-point iteration",
        &serde_json::json!({
            "close_date": input.timeline.close_date.to_string(),
            "senior_rate_percent": input.senior_rate_percent.to_string(),
            "subordinated_rate_percent": input.subordinated_rate_percent.to_string(),
            "max_iterations": MAX_DEBT_ITERATIONS,
            "tolerance": DEBT_CONVERGENCE_TOLERANCE.to_string(),
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

    fn year(year: i32, ebitda: Money) -> AccountingYear {
        AccountingYear {
            year,
            ebitda: Some(ebitda),
            ..AccountingYear::default()
        }
    }

    fn opening(mut y: AccountingYear, senior: Money, sub: Money) -> AccountingYear {
        y.senior_debt = Some(DebtBalance {
            starting_balance: Some(senior),
            ..DebtBalance::default()
        });
        y.subordinated_debt = Some(DebtBalance {
            starting_balance: Some(sub),
            ..DebtBalance::default()
        });
        y
    }

    fn solve(base: Money, senior: Money, sub: Money, sr: Percent, jr: Percent) -> DebtYearSolution {
        solve_debt_year(&DebtYearInput {
            base_cash_flow: base,
            senior_starting_balance: senior,
            subordinated_starting_balance: sub,
            senior_rate_percent: sr,
            subordinated_rate_percent: jr,
            interest_accrual_factor: Decimal::ONE,
        })
    }

    #[test]
    fn test_reference_timeline() {
        let t = DealTimeline::reference();
        assert_eq!(t.entry_year(), 2004);
        assert_eq!(t.entry_partial_year(), dec!(7) / dec!(12));
        assert_eq!(t.interest_accrual_factor(2003), Decimal::ZERO);
        assert_eq!(t.interest_accrual_factor(2004), dec!(7) / dec!(12));
        assert_eq!(t.interest_accrual_factor(2005), Decimal::ONE);
    }

    #[test]
    fn test_holding_period() {
        let t = DealTimeline::reference();
        assert_eq!(t.holding_period_years(2003), None);
        assert_eq!(t.holding_period_years(2004), Some(dec!(7) / dec!(12)));
        assert_eq!(t.holding_period_years(2008), Some(dec!(7) / dec!(12) + dec!(4)));
    }

    #[test]
    fn test_base_cash_flow() {
        let y = AccountingYear {
            year: 2005,
            ebitda: Some(dec!(100)),
            tax_expense: Some(dec!(20)),
            increase_decrease_in_debtors: Some(dec!(5)),
            increase_decrease_in_creditors: Some(dec!(-3)),
            change_in_other_long_term_liabilities: Some(dec!(1)),
            net_capital_expenditure: Some(dec!(10)),
            ..AccountingYear::default()
        };
        // 100 - 20 - 2 - 1 - 10
        assert_eq!(base_cash_flow_before_debt_service(&y), dec!(67));
        assert_eq!(base_cash_flow_before_debt_service(&AccountingYear::default()), Decimal::ZERO);
    }

    #[test]
    fn test_interest_expense() {
        assert_eq!(interest_expense(dec!(100), dec!(50), dec!(10), Decimal::ONE), dec!(7.5));
        assert_eq!(interest_expense(dec!(100), dec!(50), Decimal::ZERO, Decimal::ONE), Decimal::ZERO);
        assert_eq!(interest_expense(dec!(100), dec!(100), dec!(-2), Decimal::ONE), Decimal::ZERO);
        assert_eq!(interest_expense(dec!(120), dec!(120), dec!(10), dec!(0.5)), dec!(6));
    }

    #[test]
    fn test_senior_repaid_before_subordinated() {
        let s = solve(dec!(30), dec!(100), dec!(50), dec!(5), dec!(10));
        assert!(s.cash_available < dec!(100));
        assert_eq!(s.subordinated_repayment, Decimal::ZERO);
        assert_eq!(s.subordinated_ending_balance, dec!(50));
        assert!(s.senior_repayment > Decimal::ZERO);
        assert!(s.converged);
    }

    #[test]
    fn test_subordinated_repaid_once_senior_cleared() {
        let s = solve(dec!(100), dec!(50), dec!(100), dec!(8), dec!(10));
        assert_eq!(s.senior_repayment, dec!(50));
        assert_eq!(s.senior_ending_balance, Decimal::ZERO);
        assert!(s.subordinated_repayment > Decimal::ZERO);
        assert!(s.subordinated_ending_balance < dec!(100));
        // Senior interest on the average of 50 and 0
        assert_eq!(s.senior_interest, dec!(2));
        assert!(s.converged);
    }

    #[test]
    fn test_zero_rates_repay_straight_from_cash() {
        let s = solve(dec!(100), dec!(50), dec!(100), Decimal::ZERO, Decimal::ZERO);
        assert_eq!(s.senior_repayment, dec!(50));
        assert_eq!(s.subordinated_repayment, dec!(50));
        assert_eq!(s.subordinated_ending_balance, dec!(50));
        assert_eq!(s.cash_available, dec!(100));
    }

    #[test]
    fn test_negative_cash_flow_repays_nothing() {
        let s = solve(dec!(-40), dec!(100), dec!(50), dec!(5), dec!(10));
        assert_eq!(s.senior_repayment, Decimal::ZERO);
        assert_eq!(s.subordinated_repayment, Decimal::ZERO);
        assert_eq!(s.cash_available, Decimal::ZERO);
        assert_eq!(s.senior_interest, dec!(5));
        assert_eq!(s.subordinated_interest, dec!(5));
    }

    #[test]
    fn test_schedule_threads_balances() {
        let years = vec![
            opening(year(2004, dec!(40)), dec!(100), dec!(60)),
            year(2005, dec!(50)),
            year(2006, dec!(60)),
        ];
        let schedule = build_debt_schedule(&years, dec!(6), dec!(12), &DealTimeline::reference());
        assert_eq!(schedule.len(), 3);
        assert_eq!(schedule[0].senior.starting_balance, dec!(100));
        assert_eq!(schedule[0].subordinated.starting_balance, dec!(60));
        for pair in schedule.windows(2) {
            assert_eq!(pair[1].senior.starting_balance, pair[0].senior.ending_balance);
            assert_eq!(
                pair[1].subordinated.starting_balance,
                pair[0].subordinated.ending_balance
            );
        }
    }

    #[test]
    fn test_schedule_balance_conservation_and_priority() {
        let years = vec![
            opening(year(2004, dec!(25)), dec!(150), dec!(80)),
            year(2005, dec!(45)),
            year(2006, dec!(55)),
            year(2007, dec!(70)),
            year(2008, dec!(90)),
        ];
        let schedule = build_debt_schedule(&years, dec!(7), dec!(11), &DealTimeline::reference());
        for entry in &schedule {
            for tranche in [entry.senior, entry.subordinated] {
                assert_eq!(
                    tranche.ending_balance,
                    tranche.starting_balance - tranche.repayment
                );
            }
            if entry.cash_available_for_debt_repayment < entry.senior.starting_balance {
                assert_eq!(entry.subordinated.repayment, Decimal::ZERO);
            }
        }
    }

    #[test]
    fn test_first_year_without_recorded_debt_starts_at_zero() {
        let schedule = build_debt_schedule(
            &[year(2004, dec!(10))],
            dec!(5),
            dec!(10),
            &DealTimeline::reference(),
        );
        assert_eq!(schedule[0].senior.starting_balance, Decimal::ZERO);
        assert_eq!(schedule[0].senior.interest_expense, Decimal::ZERO);
        assert_eq!(schedule[0].cash_available_for_debt_repayment, dec!(10));
    }

    #[test]
    fn test_empty_schedule() {
        assert!(build_debt_schedule(&[], dec!(5), dec!(10), &DealTimeline::reference()).is_empty());
    }

    #[test]
    fn test_holding_period_filter() {
        let years = vec![year(2003, dec!(1)), year(2004, dec!(2)), year(2005, dec!(3)), year(2006, dec!(4))];
        let held = years_in_holding_period(&years, &DealTimeline::reference(), 2005);
        let ids: Vec<i32> = held.iter().map(|y| y.year).collect();
        assert_eq!(ids, vec![2004, 2005]);
    }

    #[test]
    fn test_analyze_rejects_empty_years() {
        let input = DebtScheduleInput {
            years: vec![],
            senior_rate_percent: dec!(5),
            subordinated_rate_percent: dec!(10),
            exit_year: None,
            timeline: DealTimeline::reference(),
        };
        assert!(analyze_debt_schedule(&input).is_err());
    }

    #[test]
    fn test_analyze_totals() {
        let input = DebtScheduleInput {
            years: vec![
                opening(year(2004, dec!(30)), dec!(80), dec!(40)),
                year(2005, dec!(50)),
            ],
            senior_rate_percent: Decimal::ZERO,
            subordinated_rate_percent: Decimal::ZERO,
            exit_year: Some(2005),
            timeline: DealTimeline::reference(),
        };
        let out = analyze_debt_schedule(&input).unwrap();
        assert_eq!(out.result.total_interest, Decimal::ZERO);
        assert_eq!(out.result.total_repayment, dec!(80));
        assert_eq!(out.result.closing_debt, dec!(40));
    }
}
