use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::CasebookError;
use crate::types::*;
use crate::CasebookResult;

/// Existing shares are normalised to 100 before any issuance.
const BASE_SHARES: Decimal = Decimal::ONE_HUNDRED;

/// Whether the option pool is carved out before or after the new round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolTiming {
    #[default]
    Before,
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DilutionInput {
    pub pre_money: Money,
    pub series_c_amount: Money,
    /// Target pool size after the carve-out, 0-100
    pub employee_pool_percent: Percent,
}

impl DilutionInput {
    /// Vestaron Series C: $90M at a $270M pre-money with a 15% pool.
    pub fn reference() -> Self {
        DilutionInput {
            pre_money: Decimal::from(270),
            series_c_amount: Decimal::from(90),
            employee_pool_percent: Decimal::from(15),
        }
    }

    pub fn post_money(&self) -> Money {
        self.pre_money + self.series_c_amount
    }
}

/// Cap table at one stage, in percent, with the valuation at that stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OwnershipStructure {
    pub existing: Percent,
    pub series_c: Percent,
    pub pool: Percent,
    pub ev: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoolBeforeRound {
    pub initial: OwnershipStructure,
    pub after_pool: OwnershipStructure,
    pub final_stage: OwnershipStructure,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoolAfterRound {
    pub initial: OwnershipStructure,
    pub after_round_c: OwnershipStructure,
    pub final_stage: OwnershipStructure,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DilutionScenarios {
    pub before: PoolBeforeRound,
    pub after: PoolAfterRound,
}

/// Share counts after every issuance, with existing holders at 100.
#[derive(Debug, Clone, Copy)]
struct ShareCounts {
    pool: Decimal,
    series_c: Decimal,
    total: Decimal,
}

impl ShareCounts {
    fn structure(&self, ev: Money) -> OwnershipStructure {
        let pct = |shares: Decimal| shares * Decimal::ONE_HUNDRED / self.total;
        OwnershipStructure {
            existing: pct(BASE_SHARES),
            series_c: pct(self.series_c),
            pool: pct(self.pool),
            ev,
        }
    }
}

fn validate(input: &DilutionInput) -> CasebookResult<Decimal> {
    if input.pre_money <= Decimal::ZERO {
        return Err(CasebookError::InvalidInput {
            field: "pre_money".into(),
            reason: "Pre-money valuation must be positive".into(),
        });
    }
    if input.series_c_amount < Decimal::ZERO {
        return Err(CasebookError::InvalidInput {
            field: "series_c_amount".into(),
            reason: "Round size cannot be negative".into(),
        });
    }
    if input.employee_pool_percent < Decimal::ZERO
        || input.employee_pool_percent >= Decimal::ONE_HUNDRED
    {
        return Err(CasebookError::InvalidInput {
            field: "employee_pool_percent".into(),
            reason: "Pool must be at least 0% and below 100%".into(),
        });
    }
    Ok(percent_to_rate(input.employee_pool_percent))
}

/// Pool first: the pool is issued to existing holders only, and the new
/// round is priced off the enlarged share count.
fn pool_before_round(input: &DilutionInput, pool_fraction: Decimal) -> ShareCounts {
    let pool = BASE_SHARES * pool_fraction / (Decimal::ONE - pool_fraction);
    let pre_round_total = BASE_SHARES + pool;
    let price_per_share = input.pre_money / pre_round_total;
    let series_c = input.series_c_amount / price_per_share;
    ShareCounts {
        pool,
        series_c,
        total: pre_round_total + series_c,
    }
}

/// Round first: the new round buys `amount / post-money` of the pre-pool
/// company, then the pool dilutes everyone.
fn pool_after_round(input: &DilutionInput, pool_fraction: Decimal) -> ShareCounts {
    let series_c = BASE_SHARES * input.series_c_amount / input.post_money();
    let pre_pool_total = BASE_SHARES + series_c;
    let pool = pre_pool_total * pool_fraction / (Decimal::ONE - pool_fraction);
    ShareCounts {
        pool,
        series_c,
        total: pre_pool_total + pool,
    }
}

/// Stage-by-stage cap tables for both pool orderings.
pub fn calculate_dilution_scenarios(input: &DilutionInput) -> CasebookResult<DilutionScenarios> {
    let pool_fraction = validate(input)?;
    let post_money = input.post_money();

    let initial = OwnershipStructure {
        existing: Decimal::ONE_HUNDRED,
        series_c: Decimal::ZERO,
        pool: Decimal::ZERO,
        ev: input.pre_money,
    };

    let pool_pct = pool_fraction * Decimal::ONE_HUNDRED;
    let round_pct = input.series_c_amount * Decimal::ONE_HUNDRED / post_money;

    Ok(DilutionScenarios {
        before: PoolBeforeRound {
            initial,
            after_pool: OwnershipStructure {
                existing: Decimal::ONE_HUNDRED - pool_pct,
                series_c: Decimal::ZERO,
                pool: pool_pct,
                ev: input.pre_money,
            },
            final_stage: pool_before_round(input, pool_fraction).structure(post_money),
        },
        after: PoolAfterRound {
            initial,
            after_round_c: OwnershipStructure {
                existing: Decimal::ONE_HUNDRED - round_pct,
                series_c: round_pct,
                pool: Decimal::ZERO,
                ev: post_money,
            },
            final_stage: pool_after_round(input, pool_fraction).structure(post_money),
        },
    })
}

/// Fraction (0-1) of the company the new round ends up holding.
pub fn series_c_ownership(input: &DilutionInput, timing: PoolTiming) -> CasebookResult<Decimal> {
    let pool_fraction = validate(input)?;
    let counts = match timing {
        PoolTiming::Before => pool_before_round(input, pool_fraction),
        PoolTiming::After => pool_after_round(input, pool_fraction),
    };
    Ok(counts.series_c / counts.total)
}

pub fn analyze_dilution(input: &DilutionInput) -> CasebookResult<ComputationOutput<DilutionScenarios>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let output = calculate_dilution_scenarios(input)?;
    if input.series_c_amount.is_zero() {
        warnings.push("Zero round size: both orderings reduce to the pool carve-out".into());
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Priced-round dilution by share-count algebra, pool before vs after the round",
        &serde_json::json!({
            "pre_money": input.pre_money.to_string(),
            "post_money": input.post_money().to_string(),
            "series_c_amount": input.series_c_amount.to_string(),
            "employee_pool_percent": input.employee_pool_percent.to_string(),
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

    fn close(actual: Decimal, expected: Decimal) -> bool {
        (actual - expected).abs() < dec!(0.01)
    }

    fn closes_to_100(s: &OwnershipStructure) -> bool {
        close(s.existing + s.series_c + s.pool, dec!(100))
    }

    #[test]
    fn test_reference_pool_before() {
        let s = calculate_dilution_scenarios(&DilutionInput::reference()).unwrap();
        let f = s.before.final_stage;
        assert!(close(f.existing, dec!(63.75)));
        assert!(close(f.series_c, dec!(25)));
        assert!(close(f.pool, dec!(11.25)));
        assert_eq!(f.ev, dec!(360));
    }

    #[test]
    fn test_reference_pool_after() {
        let s = calculate_dilution_scenarios(&DilutionInput::reference()).unwrap();
        let f = s.after.final_stage;
        assert!(close(f.existing, dec!(68)));
        assert!(close(f.series_c, dec!(17)));
        assert!(close(f.pool, dec!(15)));
    }

    #[test]
    fn test_orderings_differ() {
        let s = calculate_dilution_scenarios(&DilutionInput::reference()).unwrap();
        assert!((s.before.final_stage.existing - s.after.final_stage.existing).abs() > dec!(1));
        assert!((s.before.final_stage.series_c - s.after.final_stage.series_c).abs() > dec!(1));
    }

    #[test]
    fn test_larger_round() {
        let input = DilutionInput {
            pre_money: dec!(500),
            series_c_amount: dec!(100),
            employee_pool_percent: dec!(15),
        };
        let s = calculate_dilution_scenarios(&input).unwrap();
        assert!(close(s.before.final_stage.existing, dec!(70.83)));
        assert!(close(s.before.final_stage.series_c, dec!(16.67)));
        assert!(close(s.before.final_stage.pool, dec!(12.5)));
        assert!(close(s.after.final_stage.existing, dec!(72.86)));
        assert!(close(s.after.final_stage.series_c, dec!(12.14)));
        assert!(close(s.after.final_stage.pool, dec!(15)));
    }

    #[test]
    fn test_ownership_closure() {
        for (pre, amount, pool) in [
            (dec!(270), dec!(90), dec!(15)),
            (dec!(100), dec!(400), dec!(5)),
            (dec!(50), dec!(1), dec!(30)),
            (dec!(1000), Decimal::ZERO, dec!(10)),
        ] {
            let s = calculate_dilution_scenarios(&DilutionInput {
                pre_money: pre,
                series_c_amount: amount,
                employee_pool_percent: pool,
            })
            .unwrap();
            assert!(closes_to_100(&s.before.after_pool));
            assert!(closes_to_100(&s.before.final_stage));
            assert!(closes_to_100(&s.after.after_round_c));
            assert!(closes_to_100(&s.after.final_stage));
        }
    }

    #[test]
    fn test_intermediate_stages() {
        let s = calculate_dilution_scenarios(&DilutionInput::reference()).unwrap();
        assert_eq!(s.before.initial.existing, dec!(100));
        assert_eq!(s.before.after_pool.pool, dec!(15));
        assert_eq!(s.before.after_pool.existing, dec!(85));
        assert_eq!(s.after.after_round_c.series_c, dec!(25));
        assert_eq!(s.after.after_round_c.ev, dec!(360));
    }

    #[test]
    fn test_zero_pool_round_after_counts_pre_round_shares() {
        // Round-first issues amount/post-money of the pre-round count, so
        // even without a pool the two orderings differ.
        let input = DilutionInput {
            employee_pool_percent: Decimal::ZERO,
            ..DilutionInput::reference()
        };
        let before = series_c_ownership(&input, PoolTiming::Before).unwrap();
        let after = series_c_ownership(&input, PoolTiming::After).unwrap();
        assert!((before - dec!(0.25)).abs() < dec!(0.000001));
        assert!((after - dec!(0.2)).abs() < dec!(0.000001));
    }

    #[test]
    fn test_series_c_ownership_fraction() {
        let input = DilutionInput::reference();
        let before = series_c_ownership(&input, PoolTiming::Before).unwrap();
        let after = series_c_ownership(&input, PoolTiming::After).unwrap();
        assert!((before - dec!(0.25)).abs() < dec!(0.0001));
        assert!((after - dec!(0.17)).abs() < dec!(0.0001));
    }

    #[test]
    fn test_degenerate_inputs_rejected() {
        let full_pool = DilutionInput {
            employee_pool_percent: dec!(100),
            ..DilutionInput::reference()
        };
        assert!(calculate_dilution_scenarios(&full_pool).is_err());
        let no_value = DilutionInput {
            pre_money: Decimal::ZERO,
            ..DilutionInput::reference()
        };
        assert!(series_c_ownership(&no_value, PoolTiming::After).is_err());
    }

    #[test]
    fn test_zero_round_warns_negative_round_rejected() {
        let no_round = DilutionInput {
            series_c_amount: Decimal::ZERO,
            ..DilutionInput::reference()
        };
        let out = analyze_dilution(&no_round).unwrap();
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.result.before.final_stage.series_c, Decimal::ZERO);

        let negative = DilutionInput {
            series_c_amount: dec!(-1),
            ..DilutionInput::reference()
        };
        assert!(analyze_dilution(&negative).is_err());
    }
}
