// resolver.rs — Feature resolution: observations → one scalar per input.
//
// For each input:
//
// 1. Check the observations against the declared value type and unit
// 2. Select the ones inside the time window
// 3. Reduce them with the declared aggregation
//
// The evaluation instant is always an argument. Nothing here reads the
// clock, so the same observations and instant always resolve the same way.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::debug;
use vp_policy::{AggregationSpec, InputSpec, TimeWindowSpec, Unit};

use crate::error::EvalError;
use crate::observation::{Observation, Scalar, TypeOf};

/// A time window pinned to concrete instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedWindow {
    /// The nearest observation at or before `at`.
    Point { at: DateTime<Utc> },
    /// Observations with `start <= t < end`.
    Span {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl ResolvedWindow {
    /// Pin a window spec against the evaluation instant `now`.
    ///
    /// Relative windows cover `[now - lookback - endOffset, now - endOffset)`.
    pub fn resolve(spec: &TimeWindowSpec, now: DateTime<Utc>) -> Self {
        match spec {
            TimeWindowSpec::Point { at } => ResolvedWindow::Point { at: at.instant() },
            TimeWindowSpec::Range { start, end } => ResolvedWindow::Span {
                start: start.instant(),
                end: end.instant(),
            },
            TimeWindowSpec::Relative {
                lookback,
                end_offset,
            } => {
                let end = match end_offset {
                    Some(offset) => saturating_sub(now, offset.to_chrono()),
                    None => now,
                };
                ResolvedWindow::Span {
                    start: saturating_sub(end, lookback.to_chrono()),
                    end,
                }
            }
        }
    }

    /// Whether `t` falls inside a span window. Point windows select by
    /// nearest-at-or-before instead, see [`select`].
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        match self {
            ResolvedWindow::Point { at } => t == *at,
            ResolvedWindow::Span { start, end } => *start <= t && t < *end,
        }
    }

    /// Window length in milliseconds; zero for a point.
    pub fn length_millis(&self) -> i64 {
        match self {
            ResolvedWindow::Point { .. } => 0,
            ResolvedWindow::Span { start, end } => (*end - *start).num_milliseconds(),
        }
    }
}

fn saturating_sub(t: DateTime<Utc>, d: chrono::Duration) -> DateTime<Utc> {
    t.checked_sub_signed(d).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// A resolved input value plus what the evaluator needs to check it.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub value: Scalar,
    pub unit: Option<Unit>,
    /// How many observations the window selected.
    pub observations: usize,
}

/// Resolve one input against its observations at evaluation instant `now`.
///
/// `max_observations` bounds how many observations the input may be handed.
pub fn resolve(
    input: &InputSpec,
    observations: &[Observation],
    now: DateTime<Utc>,
    max_observations: usize,
) -> Result<Feature, EvalError> {
    if observations.len() > max_observations {
        return Err(EvalError::TooManyObservations {
            input: input.id.clone(),
            count: observations.len(),
            limit: max_observations,
        });
    }
    check_observations(input, observations)?;

    let window = ResolvedWindow::resolve(&input.window, now);
    let selected = select(observations, &window);

    if selected.is_empty() && input.aggregation != AggregationSpec::Count {
        return Err(match window {
            ResolvedWindow::Point { .. } => EvalError::NoObservation {
                input: input.id.clone(),
                at: window_label(&input.window),
            },
            ResolvedWindow::Span { .. } => EvalError::InsufficientData {
                input: input.id.clone(),
                reason: format!(
                    "window selected no observations for '{}'",
                    input.aggregation.name()
                ),
            },
        });
    }

    let value = aggregate(input, &selected, &window)?;
    if let Scalar::Number(n) = value {
        if !n.is_finite() {
            return Err(EvalError::NonFiniteNumber {
                subject: format!("input '{}'", input.id),
            });
        }
    }

    debug!(
        input = %input.id,
        op = input.aggregation.name(),
        observations = selected.len(),
        "input resolved"
    );

    Ok(Feature {
        value,
        unit: input.feature_unit(),
        observations: selected.len(),
    })
}

/// Every observation must match the declared type and unit and be finite.
/// Checked across the whole sequence, not only the window, so the outcome
/// does not depend on which observations a window happens to select.
fn check_observations(input: &InputSpec, observations: &[Observation]) -> Result<(), EvalError> {
    let subject = || format!("input '{}'", input.id);
    for (pos, obs) in observations.iter().enumerate() {
        if obs.value.value_type() != input.value_type {
            return Err(EvalError::TypeMismatch {
                subject: subject(),
                reason: format!(
                    "observation {} is {}, input declares {}",
                    pos,
                    TypeOf(&obs.value),
                    input.value_type
                ),
            });
        }
        if let Scalar::Number(n) = obs.value {
            if !n.is_finite() {
                return Err(EvalError::NonFiniteNumber {
                    subject: format!("input '{}' observation {}", input.id, pos),
                });
            }
        }
        if let Some(unit) = obs.unit {
            if input.unit != Some(unit) {
                return Err(EvalError::TypeMismatch {
                    subject: subject(),
                    reason: format!(
                        "observation {} is in '{}', input declares {}",
                        pos,
                        unit,
                        input
                            .unit
                            .map(|u| format!("'{}'", u))
                            .unwrap_or_else(|| "no unit".to_string())
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Observations inside the window, in input order.
///
/// A point window yields at most one: the latest at or before its instant,
/// the later one in input order on a tie.
pub fn select<'a>(observations: &'a [Observation], window: &ResolvedWindow) -> Vec<&'a Observation> {
    match window {
        ResolvedWindow::Point { at } => observations
            .iter()
            .filter(|o| o.timestamp.instant() <= *at)
            .fold(None, |best: Option<&Observation>, o| match best {
                Some(b) if b.timestamp.instant() > o.timestamp.instant() => Some(b),
                _ => Some(o),
            })
            .into_iter()
            .collect(),
        ResolvedWindow::Span { .. } => observations
            .iter()
            .filter(|o| window.contains(o.timestamp.instant()))
            .collect(),
    }
}

fn window_label(spec: &TimeWindowSpec) -> String {
    match spec {
        TimeWindowSpec::Point { at } => at.to_string(),
        TimeWindowSpec::Range { start, end } => format!("[{}, {})", start, end),
        TimeWindowSpec::Relative { lookback, .. } => format!("lookback {}", lookback),
    }
}

fn aggregate(
    input: &InputSpec,
    selected: &[&Observation],
    window: &ResolvedWindow,
) -> Result<Scalar, EvalError> {
    let numbers = || -> Vec<f64> { selected.iter().filter_map(|o| o.value.as_number()).collect() };

    let value = match &input.aggregation {
        AggregationSpec::Latest => {
            // Ties on the maximum timestamp go to the later observation.
            let latest = selected
                .iter()
                .copied()
                .reduce(|best, o| {
                    if o.timestamp.instant() >= best.timestamp.instant() {
                        o
                    } else {
                        best
                    }
                })
                .ok_or_else(|| insufficient(input, "no observations"))?;
            latest.value.clone()
        }
        AggregationSpec::Min => Scalar::Number(
            numbers()
                .into_iter()
                .reduce(|a, b| if b < a { b } else { a })
                .ok_or_else(|| insufficient(input, "no observations"))?,
        ),
        AggregationSpec::Max => Scalar::Number(
            numbers()
                .into_iter()
                .reduce(|a, b| if b > a { b } else { a })
                .ok_or_else(|| insufficient(input, "no observations"))?,
        ),
        AggregationSpec::Sum => Scalar::Number(sum(&numbers())),
        AggregationSpec::Avg => {
            let values = numbers();
            if values.is_empty() {
                return Err(insufficient(input, "avg over zero observations"));
            }
            Scalar::Number(sum(&values) / values.len() as f64)
        }
        AggregationSpec::Count => Scalar::Number(selected.len() as f64),
        AggregationSpec::P50 | AggregationSpec::P90 | AggregationSpec::P95 | AggregationSpec::P99 => {
            let p = input.aggregation.percentile().unwrap_or(50);
            let mut values = numbers();
            values.sort_by(f64::total_cmp);
            Scalar::Number(
                nearest_rank(&values, p).ok_or_else(|| insufficient(input, "no observations"))?,
            )
        }
        AggregationSpec::DistinctCount => {
            let distinct: HashSet<DistinctKey<'_>> =
                selected.iter().map(|o| DistinctKey::of(&o.value)).collect();
            Scalar::Number(distinct.len() as f64)
        }
        AggregationSpec::WindowedRate { per } => {
            let window_ms = window.length_millis();
            if window_ms <= 0 {
                return Err(insufficient(input, "windowedRate over an empty window"));
            }
            // count / (window / per), kept as one division of integers
            // converted once.
            let events = selected.len() as f64;
            Scalar::Number(events * per.as_millis() as f64 / window_ms as f64)
        }
    };
    Ok(value)
}

/// Left-to-right sum in input order. `avg` divides this same sum, so
/// `avg == sum / count` holds exactly.
fn sum(values: &[f64]) -> f64 {
    values.iter().fold(0.0, |acc, v| acc + v)
}

/// Nearest-rank percentile over ascending `sorted`:
/// index = ceil(p × n / 100) − 1, clamped to `[0, n − 1]`.
pub fn nearest_rank(sorted: &[f64], p: u32) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    // Integer ceiling avoids any floating rounding in the rank itself.
    let rank = (p as usize * n).div_ceil(100);
    let index = rank.saturating_sub(1).min(n - 1);
    Some(sorted[index])
}

fn insufficient(input: &InputSpec, reason: &str) -> EvalError {
    EvalError::InsufficientData {
        input: input.id.clone(),
        reason: reason.to_string(),
    }
}

/// Equality key for `distinctCount`. `-0.0` and `0.0` compare equal, so
/// they share a key.
#[derive(PartialEq, Eq, Hash)]
enum DistinctKey<'a> {
    Bool(bool),
    Number(u64),
    String(&'a str),
}

impl<'a> DistinctKey<'a> {
    fn of(value: &'a Scalar) -> Self {
        match value {
            Scalar::Bool(b) => DistinctKey::Bool(*b),
            Scalar::Number(n) => {
                let n = if *n == 0.0 { 0.0 } else { *n };
                DistinctKey::Number(n.to_bits())
            }
            Scalar::String(s) => DistinctKey::String(s),
        }
    }
}
