use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::CasebookError;
use crate::types::*;
use crate::CasebookResult;

const IRR_SEED: Rate = dec!(0.10);
const CONVERGENCE_THRESHOLD: Decimal = dec!(0.0000001);
const MAX_IRR_ITERATIONS: u32 = 100;

/// Net Present Value of a series of cash flows
pub fn npv(rate: Rate, cash_flows: &[Money]) -> CasebookResult<Money> {
    if rate <= dec!(-1) {
        return Err(CasebookError::InvalidInput {
            field: "rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }

    let mut result = Decimal::ZERO;
    let one_plus_r = Decimal::ONE + rate;
    let mut discount = Decimal::ONE;

    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount = discount
                .checked_mul(one_plus_r)
                .ok_or_else(|| discount_failure(rate, t, "discount factor overflowed"))?;
        }
        if discount.is_zero() {
            return Err(discount_failure(rate, t, "discount factor rounded to zero"));
        }
        result = cf
            .checked_div(discount)
            .and_then(|pv| result.checked_add(pv))
            .ok_or_else(|| discount_failure(rate, t, "present value overflowed"))?;
    }

    Ok(result)
}

fn discount_failure(rate: Rate, period: usize, what: &str) -> CasebookError {
    CasebookError::InvalidInput {
        field: "rate".into(),
        reason: format!("NPV at rate {rate}: {what} in period {period}"),
    }
}

/// NPV and dNPV/dr at `rate`, with discount factors built by repeated
/// multiplication. `None` when a term overflows or a discount factor is zero.
fn npv_and_derivative(rate: Rate, cash_flows: &[Money]) -> Option<(Money, Decimal)> {
    let one_plus_r = Decimal::ONE + rate;
    let mut value = Decimal::ZERO;
    let mut derivative = Decimal::ZERO;
    let mut discount = Decimal::ONE;

    for (t, cf) in cash_flows.iter().enumerate() {
        value = value.checked_add(cf.checked_div(discount)?)?;
        let next_discount = discount.checked_mul(one_plus_r)?;
        if t > 0 {
            let weighted = Decimal::from(t).checked_mul(*cf)?;
            derivative = derivative.checked_sub(weighted.checked_div(next_discount)?)?;
        }
        discount = next_discount;
    }

    Some((value, derivative))
}

/// Internal Rate of Return using single-seed Newton-Raphson.
///
/// Starts at 10%, runs at most 100 iterations and accepts the first step
/// smaller than 1e-7. Returns `None` when the NPV curve is flat at the current
/// iterate (|dNPV/dr| < 1e-7), when the budget runs out, or when the discount
/// arithmetic overflows.
///
/// Series with more than one sign change can have several roots; this returns
/// whichever one the iteration reaches from the 10% seed, which may not be the
/// economically meaningful one.
pub fn solve_irr(cash_flows: &[Money]) -> Option<Rate> {
    let mut rate = IRR_SEED;

    for iteration in 0..MAX_IRR_ITERATIONS {
        let Some((value, derivative)) = npv_and_derivative(rate, cash_flows) else {
            log::debug!("IRR: discounting overflowed at rate {rate} (iteration {iteration})");
            return None;
        };

        if derivative.abs() < CONVERGENCE_THRESHOLD {
            log::debug!("IRR: flat NPV curve at rate {rate} (iteration {iteration})");
            return None;
        }

        let next = value.checked_div(derivative).and_then(|step| rate.checked_sub(step))?;
        if (next - rate).abs() < CONVERGENCE_THRESHOLD {
            return Some(next);
        }
        rate = next;
    }

    log::debug!("IRR: no convergence after {MAX_IRR_ITERATIONS} iterations (last rate {rate})");
    None
}

/// Annualised return implied by a multiple earned over `years`: `multiple^(1/years) - 1`.
pub fn annualised_return(multiple: Multiple, years: Years) -> Option<Rate> {
    if years <= Decimal::ZERO || multiple <= Decimal::ZERO {
        return None;
    }
    let exponent = Decimal::ONE.checked_div(years)?;
    multiple
        .checked_powd(exponent)
        .map(|growth| growth - Decimal::ONE)
}

/// Total outflows and total inflows of a series, both as positive amounts.
pub fn split_flows(cash_flows: &[Money]) -> (Money, Money) {
    cash_flows
        .iter()
        .fold((Decimal::ZERO, Decimal::ZERO), |(out, inflow), cf| {
            if cf.is_sign_negative() {
                (out - *cf, inflow)
            } else {
                (out, inflow + *cf)
            }
        })
}

/// Multiple of money: inflows over outflows, 0 when nothing flowed out.
pub fn cash_multiple(cash_flows: &[Money]) -> Multiple {
    let (out, inflow) = split_flows(cash_flows);
    if out.is_zero() {
        Decimal::ZERO
    } else {
        inflow / out
    }
}

/// Input for stand-alone cash-flow analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashFlowInput {
    /// Yearly cash flows (index 0 = year 0, negative = contributions)
    pub cash_flows: CashFlowSeries,
    /// Optional discount rate for an NPV figure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_rate: Option<Rate>,
}

/// Output of stand-alone cash-flow analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashFlowOutput {
    pub irr: Option<Rate>,
    pub multiple: Multiple,
    pub total_contributed: Money,
    pub total_distributed: Money,
    pub npv: Option<Money>,
}

/// IRR, multiple and (optionally) NPV of a yearly cash-flow series.
pub fn analyze_cash_flows(
    input: &CashFlowInput,
) -> CasebookResult<ComputationOutput<CashFlowOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.cash_flows.is_empty() {
        return Err(CasebookError::InsufficientData(
            "At least one cash flow is required".into(),
        ));
    }

    let irr = solve_irr(&input.cash_flows);
    if irr.is_none() {
        warnings.push("IRR did not converge from the 10% seed".into());
    }

    let npv = match input.discount_rate {
        Some(rate) => Some(npv(rate, &input.cash_flows)?),
        None => None,
    };

    let (total_contributed, total_distributed) = split_flows(&input.cash_flows);
    let output = CashFlowOutput {
        irr,
        multiple: cash_multiple(&input.cash_flows),
        total_contributed,
        total_distributed,
        npv,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Newton-Raphson IRR (seed 10%, 100 iterations, tolerance 1e-7)",
        &serde_json::json!({
            "periods": input.cash_flows.len(),
            "discount_rate": input.discount_rate.map(|r| r.to_string()),
        }),
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_npv_basic() {
        let cfs = vec![dec!(-1000), dec!(300), dec!(400), dec!(500)];
        let result = npv(dec!(0.10), &cfs).unwrap();
        // -1000 + 300/1.1 + 400/1.21 + 500/1.331 ≈ -21.04
        assert!((result - dec!(-21.04)).abs() < dec!(1.0));
    }

    #[test]
    fn test_npv_rejects_rate_at_minus_one() {
        assert!(npv(dec!(-1), &[dec!(-100), dec!(110)]).is_err());
    }

    #[test]
    fn test_npv_rate_near_minus_one_is_error() {
        let cfs = vec![dec!(-1), dec!(1), dec!(1), dec!(1), dec!(1)];
        assert!(npv(dec!(-0.9999999999), &cfs).is_err());
    }

    #[test]
    fn test_npv_discount_overflow_is_error() {
        let cfs = vec![dec!(-1); 30];
        assert!(npv(dec!(100), &cfs).is_err());

        let input = CashFlowInput {
            cash_flows: cfs,
            discount_rate: Some(dec!(100)),
        };
        assert!(analyze_cash_flows(&input).is_err());
    }

    #[test]
    fn test_irr_round_trip_single_period() {
        for r in [dec!(0.05), dec!(0.10), dec!(0.25), dec!(1.0)] {
            let cfs = vec![dec!(-500), dec!(500) * (Decimal::ONE + r)];
            let irr = solve_irr(&cfs).unwrap();
            assert!((irr - r).abs() < dec!(0.001), "expected {r}, got {irr}");
        }
    }

    #[test]
    fn test_irr_break_even() {
        let irr = solve_irr(&[dec!(-1000), dec!(1000)]).unwrap();
        assert!(irr.abs() < dec!(0.001));
    }

    #[test]
    fn test_irr_annuity() {
        let cfs = vec![dec!(-1000), dec!(400), dec!(400), dec!(400)];
        let irr = solve_irr(&cfs).unwrap();
        // ~9.7%
        assert!((irr - dec!(0.097)).abs() < dec!(0.01));
    }

    #[test]
    fn test_irr_multi_year_fund_profile() {
        let cfs = vec![
            dec!(0),
            dec!(-200),
            dec!(-200),
            dec!(-200),
            dec!(-200),
            dec!(-200),
            dec!(0),
            dec!(0),
            dec!(0),
            dec!(0),
            dec!(3000),
        ];
        let irr = solve_irr(&cfs).unwrap();
        assert!(irr > Decimal::ZERO && irr < Decimal::ONE);
    }

    #[test]
    fn test_irr_loss_is_negative_when_found() {
        if let Some(irr) = solve_irr(&[dec!(-1000), dec!(500)]) {
            assert!(irr < Decimal::ZERO);
        }
    }

    #[test]
    fn test_irr_all_zero_series() {
        // Flat NPV curve: the solver may stop with None or report 0.
        match solve_irr(&[dec!(0), dec!(0), dec!(0)]) {
            None => {}
            Some(r) => assert!(r.abs() < dec!(0.001)),
        }
    }

    #[test]
    fn test_irr_multiple_roots_follows_seed() {
        // Roots at 10% and 20%; the seed sits on the lower one.
        let irr = solve_irr(&[dec!(-100), dec!(230), dec!(-132)]).unwrap();
        assert!((irr - dec!(0.1)).abs() < dec!(0.000001));
    }

    #[test]
    fn test_irr_single_flow_has_no_slope() {
        assert_eq!(solve_irr(&[dec!(-100)]), None);
    }

    #[test]
    fn test_annualised_return() {
        let r = annualised_return(dec!(2), dec!(1)).unwrap();
        assert!((r - dec!(1)).abs() < dec!(0.0001));
        let r = annualised_return(dec!(1.21), dec!(2)).unwrap();
        assert!((r - dec!(0.10)).abs() < dec!(0.0001));
        assert_eq!(annualised_return(dec!(2), dec!(0)), None);
        assert_eq!(annualised_return(dec!(-1), dec!(3)), None);
    }

    #[test]
    fn test_cash_multiple() {
        assert_eq!(cash_multiple(&[dec!(-100), dec!(-100), dec!(500)]), dec!(2.5));
        assert_eq!(cash_multiple(&[dec!(0), dec!(10)]), Decimal::ZERO);
    }

    #[test]
    fn test_analyze_cash_flows() {
        let input = CashFlowInput {
            cash_flows: vec![dec!(-100), dec!(121)],
            discount_rate: Some(dec!(0.21)),
        };
        let out = analyze_cash_flows(&input).unwrap();
        assert!(out.result.npv.unwrap().abs() < dec!(0.0001));
        assert_eq!(out.result.total_contributed, dec!(100));
        assert_eq!(out.result.total_distributed, dec!(121));
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_analyze_cash_flows_empty_error() {
        let input = CashFlowInput {
            cash_flows: vec![],
            discount_rate: None,
        };
        assert!(analyze_cash_flows(&input).is_err());
    }
}
