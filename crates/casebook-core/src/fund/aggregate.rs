use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::CasebookError;
use crate::types::*;
use crate::CasebookResult;

/// Element-wise sum of several cash-flow series. Shorter series are padded
/// with zeros up to the longest one. An empty input yields an empty series.
pub fn combine_cash_flows(series: &[CashFlowSeries]) -> CashFlowSeries {
    let len = series.iter().map(Vec::len).max().unwrap_or(0);
    let mut combined = vec![Decimal::ZERO; len];
    for flows in series {
        for (slot, cf) in combined.iter_mut().zip(flows) {
            *slot += *cf;
        }
    }
    combined
}

/// Ordering key for merged events: undated events sort after every dated one.
fn event_year_key(event: &CashEvent) -> u32 {
    event.year.unwrap_or(u32::MAX)
}

/// Prefix each source's event labels, concatenate and sort by
/// `(year, amount)` so that outflows precede inflows within a year.
///
/// An empty prefix leaves the labels untouched. The sort is stable, so events
/// with the same year and amount keep their source order.
pub fn merge_cash_events(sources: &[(&str, &[CashEvent])]) -> Vec<CashEvent> {
    let mut merged: Vec<CashEvent> = sources
        .iter()
        .flat_map(|(prefix, events)| {
            events.iter().map(move |event| CashEvent {
                label: format!("{prefix}{}", event.label),
                ..event.clone()
            })
        })
        .collect();
    merged.sort_by(|a, b| {
        event_year_key(a)
            .cmp(&event_year_key(b))
            .then_with(|| a.amount.cmp(&b.amount))
    });
    merged
}

// ---------------------------------------------------------------------------
// Boundary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombineInput {
    pub series: Vec<CashFlowSeries>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombineOutput {
    pub combined: CashFlowSeries,
    pub total_contributed: Money,
    pub total_distributed: Money,
    pub net: Money,
}

pub fn analyze_combine(input: &CombineInput) -> CasebookResult<ComputationOutput<CombineOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.series.is_empty() {
        return Err(CasebookError::InsufficientData(
            "At least one cash-flow series is required".into(),
        ));
    }
    if input.series.iter().any(Vec::is_empty) {
        warnings.push("One or more series are empty and contribute nothing".into());
    }

    let combined = combine_cash_flows(&input.series);
    let (total_contributed, total_distributed) = crate::time_value::split_flows(&combined);
    let output = CombineOutput {
        net: total_distributed - total_contributed,
        combined,
        total_contributed,
        total_distributed,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Element-wise cash-flow aggregation with zero padding",
        &serde_json::json!({
            "series_count": input.series.len(),
            "longest_series": output.combined.len(),
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
    fn test_combine_pads_shorter_series() {
        let combined = combine_cash_flows(&[
            vec![dec!(-100), dec!(50), dec!(80)],
            vec![dec!(-200), dec!(100)],
            vec![dec!(-50)],
        ]);
        assert_eq!(combined, vec![dec!(-350), dec!(150), dec!(80)]);
    }

    #[test]
    fn test_combine_single_series_is_identity() {
        let flows = vec![dec!(-100), dec!(20), dec!(130)];
        assert_eq!(combine_cash_flows(&[flows.clone()]), flows);
    }

    #[test]
    fn test_combine_empty() {
        assert_eq!(combine_cash_flows(&[]), Vec::<Money>::new());
        assert_eq!(combine_cash_flows(&[vec![], vec![]]), Vec::<Money>::new());
    }

    #[test]
    fn test_combine_is_commutative() {
        let a = vec![dec!(-10), dec!(5), dec!(12)];
        let b = vec![dec!(-3), dec!(4)];
        assert_eq!(
            combine_cash_flows(&[a.clone(), b.clone()]),
            combine_cash_flows(&[b, a])
        );
    }

    #[test]
    fn test_combine_is_associative() {
        let a = vec![dec!(-10), dec!(5)];
        let b = vec![dec!(-3), dec!(4), dec!(9)];
        let c = vec![dec!(1)];
        let left = combine_cash_flows(&[combine_cash_flows(&[a.clone(), b.clone()]), c.clone()]);
        let right = combine_cash_flows(&[a, combine_cash_flows(&[b, c])]);
        assert_eq!(left, right);
    }

    #[test]
    fn test_merge_prefixes_and_sorts() {
        let buyout = vec![
            CashEvent::new("Distributions (Year 10)", dec!(900), 10),
            CashEvent::new("Capital called (Year 1)", dec!(-50), 1),
        ];
        let vc = vec![
            CashEvent::new("Capital called (Year 1)", dec!(-20), 1),
            CashEvent::new("Establishment fees (Year 0)", dec!(-0.5), 0),
        ];
        let merged = merge_cash_events(&[("Buyout — ", &buyout[..]), ("VC — ", &vc[..])]);
        let labels: Vec<&str> = merged.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "VC — Establishment fees (Year 0)",
                "Buyout — Capital called (Year 1)",
                "VC — Capital called (Year 1)",
                "Buyout — Distributions (Year 10)",
            ]
        );
    }

    #[test]
    fn test_merge_outflows_before_inflows_in_same_year() {
        let events = vec![
            CashEvent::new("in", dec!(100), 5),
            CashEvent::new("out", dec!(-10), 5),
        ];
        let merged = merge_cash_events(&[("", &events[..])]);
        assert_eq!(merged[0].label, "out");
        assert_eq!(merged[1].label, "in");
    }

    #[test]
    fn test_merge_missing_year_sorts_last() {
        let events = vec![
            CashEvent {
                label: "undated".into(),
                amount: dec!(-1000),
                percent: None,
                year: None,
            },
            CashEvent::new("late", dec!(5), 40),
        ];
        let merged = merge_cash_events(&[("", &events[..])]);
        assert_eq!(merged.last().unwrap().label, "undated");
    }

    #[test]
    fn test_merge_keeps_percent() {
        let events =
            vec![CashEvent::new("Carry (Year 10)", dec!(-30), 10).with_percent(Some(dec!(20)))];
        let merged = merge_cash_events(&[("Buyout — ", &events[..])]);
        assert_eq!(merged[0].percent, Some(dec!(20)));
        assert_eq!(merged[0].year, Some(10));
    }

    #[test]
    fn test_analyze_combine() {
        let input = CombineInput {
            series: vec![vec![dec!(-100), dec!(150)], vec![dec!(-50), dec!(0), dec!(80)]],
        };
        let out = analyze_combine(&input).unwrap();
        assert_eq!(out.result.combined, vec![dec!(-150), dec!(150), dec!(80)]);
        assert_eq!(out.result.total_contributed, dec!(150));
        assert_eq!(out.result.total_distributed, dec!(230));
        assert_eq!(out.result.net, dec!(80));
    }

    #[test]
    fn test_analyze_combine_requires_series() {
        let input = CombineInput { series: vec![] };
        assert!(analyze_combine(&input).is_err());
    }
}
