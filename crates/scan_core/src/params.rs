//! Parameter-space model and deterministic expansion.
//!
//! A scan is declared as a set of named axes (fixed scalar, explicit list,
//! or `start:stop:step` range text) plus an optional list of pre-existing
//! explicit points. Expansion produces the full Cartesian product of all
//! non-scale axes in sorted key order, merges it into the explicit point
//! list without introducing structural duplicates, and cross-joins the
//! `scale` axis last. Downstream job addressing relies on the ordinal
//! position of each point being stable across invocations and workers, so
//! every step here is order-deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Axis name that is combined last, independently of the rest.
pub const SCALE_AXIS: &str = "scale";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unable to parse parameter '{param}': '{raw}'")]
    Axis { param: String, raw: String },
    #[error("malformed override '{raw}', expected name=value")]
    Override { raw: String },
}

/// One concrete assignment of values to every swept parameter.
///
/// Backed by a `BTreeMap`, so equality is structural and independent of
/// insertion order, and serialized key order is always sorted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterPoint(BTreeMap<String, f64>);

impl ParameterPoint {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Scale value carried by this point, defaulting to 1.0.
    pub fn scale(&self) -> f64 {
        self.get(SCALE_AXIS).unwrap_or(1.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }

    /// Entries except the scale axis, in sorted key order.
    pub fn non_scale(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter().filter(|(name, _)| name.as_str() != SCALE_AXIS)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, f64>> for ParameterPoint {
    fn from(map: BTreeMap<String, f64>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, f64)> for ParameterPoint {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Declared domain of a single named parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AxisSpec {
    Fixed(f64),
    List(Vec<f64>),
    /// Either a single scalar or `start:stop:step` range text; validated
    /// when the axis is resolved.
    Text(String),
}

impl AxisSpec {
    /// Expand the declared domain into an explicit ordered value list.
    pub fn resolve(&self, param: &str) -> Result<Vec<f64>, ParseError> {
        match self {
            AxisSpec::Fixed(value) => Ok(vec![*value]),
            AxisSpec::List(values) => Ok(values.clone()),
            AxisSpec::Text(text) => parse_axis_text(param, text),
        }
    }
}

/// Declared parameter space: named axes plus optional pre-existing points.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSpace {
    pub axes: BTreeMap<String, AxisSpec>,
    pub points: Vec<ParameterPoint>,
}

impl ParameterSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn axis(mut self, name: impl Into<String>, spec: AxisSpec) -> Self {
        self.axes.insert(name.into(), spec);
        self
    }

    pub fn point(mut self, point: ParameterPoint) -> Self {
        self.points.push(point);
        self
    }
}

fn parse_float(param: &str, text: &str) -> Result<f64, ParseError> {
    text.trim().parse::<f64>().map_err(|_| ParseError::Axis {
        param: param.to_string(),
        raw: text.trim().to_string(),
    })
}

/// Expand a closed `start:stop:step` range: N = floor((stop-start)/step) + 1
/// values `start + i*step`. A range that runs backwards resolves to an empty
/// list, matching upstream closed-range semantics.
fn expand_range(param: &str, raw: &str, start: f64, stop: f64, step: f64) -> Result<Vec<f64>, ParseError> {
    let count = ((stop - start) / step).floor();
    if !count.is_finite() {
        return Err(ParseError::Axis {
            param: param.to_string(),
            raw: raw.to_string(),
        });
    }
    let count = (count as i64 + 1).max(0);
    Ok((0..count).map(|i| start + i as f64 * step).collect())
}

/// Parse textual axis grammar: `float` or `start:stop:step`.
fn parse_axis_text(param: &str, text: &str) -> Result<Vec<f64>, ParseError> {
    let parts: Vec<&str> = text.split(':').collect();
    match parts.as_slice() {
        [single] => Ok(vec![parse_float(param, single)?]),
        [start, stop, step] => {
            let start = parse_float(param, start)?;
            let stop = parse_float(param, stop)?;
            let step = parse_float(param, step)?;
            expand_range(param, text, start, stop, step)
        }
        _ => Err(ParseError::Axis {
            param: param.to_string(),
            raw: text.to_string(),
        }),
    }
}

/// Parse one command-line override of the form `name=value`,
/// `name=[v1,v2,...]` or `name=start:stop:step`. The resolved value list
/// fully replaces the named axis.
pub fn parse_override(raw: &str) -> Result<(String, Vec<f64>), ParseError> {
    let (name, value) = raw.split_once('=').ok_or_else(|| ParseError::Override {
        raw: raw.to_string(),
    })?;
    let name = name.trim().to_string();
    let value = value.trim();
    if name.is_empty() {
        return Err(ParseError::Override {
            raw: raw.to_string(),
        });
    }
    if let Ok(scalar) = value.parse::<f64>() {
        return Ok((name, vec![scalar]));
    }
    if let Some(inner) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
        let values = inner
            .split(',')
            .map(|item| parse_float(&name, item))
            .collect::<Result<Vec<f64>, ParseError>>()?;
        return Ok((name, values));
    }
    if value.split(':').count() == 3 {
        return parse_axis_text(&name, value).map(|values| (name.clone(), values));
    }
    Err(ParseError::Axis {
        param: name,
        raw: value.to_string(),
    })
}

/// Expand a parameter space plus command-line overrides into the final
/// ordered point list.
///
/// Ordering contract: non-scale axes combine in sorted key order with the
/// last key varying fastest; explicit pre-existing points come first, then
/// freshly expanded points not already present; the scale axis cross-joins
/// last and varies fastest in the result.
pub fn expand(space: &ParameterSpace, overrides: &[String]) -> Result<Vec<ParameterPoint>, ParseError> {
    let mut axes: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (name, spec) in &space.axes {
        axes.insert(name.clone(), spec.resolve(name)?);
    }
    for raw in overrides {
        let (name, values) = parse_override(raw)?;
        axes.insert(name, values);
    }

    let scale_values = axes.remove(SCALE_AXIS).unwrap_or_else(|| vec![1.0]);

    // Cartesian product over the remaining axes in sorted key order.
    let mut product: Vec<ParameterPoint> = vec![ParameterPoint::new()];
    for (name, values) in &axes {
        let mut next = Vec::with_capacity(product.len() * values.len());
        for partial in &product {
            for &value in values {
                let mut point = partial.clone();
                point.insert(name.clone(), value);
                next.push(point);
            }
        }
        product = next;
    }

    // Merge into the pre-existing explicit point list, preserving order and
    // skipping points already structurally present.
    let mut merged = space.points.clone();
    for point in product {
        if !merged.contains(&point) {
            merged.push(point);
        }
    }

    let mut jobs = Vec::with_capacity(merged.len() * scale_values.len());
    for point in &merged {
        for &scale in &scale_values {
            let mut job = point.clone();
            job.insert(SCALE_AXIS, scale);
            jobs.push(job);
        }
    }
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(entries: &[(&str, f64)]) -> ParameterPoint {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    #[test]
    fn point_equality_ignores_insertion_order() {
        let mut a = ParameterPoint::new();
        a.insert("kappa", 1.0);
        a.insert("lambda", 2.0);
        let mut b = ParameterPoint::new();
        b.insert("lambda", 2.0);
        b.insert("kappa", 1.0);
        assert_eq!(a, b);
    }

    #[test]
    fn range_with_exact_step_is_closed() {
        let values = parse_axis_text("c", "0:1:0.5").expect("range should parse");
        assert_eq!(values, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn range_with_inexact_step_stops_short_of_stop() {
        let values = parse_axis_text("c", "0:1:0.3").expect("range should parse");
        let expected = [0.0, 0.3, 0.6, 0.9];
        assert_eq!(values.len(), expected.len());
        for (value, reference) in values.iter().zip(expected.iter()) {
            assert!((value - reference).abs() < 1e-12);
        }
    }

    #[test]
    fn range_with_zero_step_is_rejected() {
        let error = parse_axis_text("c", "0:1:0").expect_err("range should fail");
        assert_eq!(
            error,
            ParseError::Axis {
                param: "c".to_string(),
                raw: "0:1:0".to_string(),
            }
        );
    }

    #[test]
    fn override_grammar_accepts_scalar_list_and_range() {
        assert_eq!(
            parse_override("c_hhh=2.5").expect("scalar override"),
            ("c_hhh".to_string(), vec![2.5])
        );
        assert_eq!(
            parse_override("c_hhh=[1.0, 2.0,3.0]").expect("list override"),
            ("c_hhh".to_string(), vec![1.0, 2.0, 3.0])
        );
        assert_eq!(
            parse_override("c_hhh=0:1:0.5").expect("range override"),
            ("c_hhh".to_string(), vec![0.0, 0.5, 1.0])
        );
    }

    #[test]
    fn malformed_override_names_parameter_and_raw_value() {
        let error = parse_override("c_hhh=oops").expect_err("override should fail");
        assert_eq!(
            error,
            ParseError::Axis {
                param: "c_hhh".to_string(),
                raw: "oops".to_string(),
            }
        );
        let error = parse_override("no-equals-sign").expect_err("override should fail");
        assert_eq!(
            error,
            ParseError::Override {
                raw: "no-equals-sign".to_string(),
            }
        );
    }

    #[test]
    fn expansion_count_is_product_of_axis_cardinalities() {
        let space = ParameterSpace::new()
            .axis("kappa", AxisSpec::List(vec![0.5, 1.0, 1.5]))
            .axis("lambda", AxisSpec::List(vec![1.0, 2.0]))
            .axis("scale", AxisSpec::List(vec![0.5, 1.0, 2.0]));
        let jobs = expand(&space, &[]).expect("expansion should pass");
        assert_eq!(jobs.len(), 3 * 2 * 3);
    }

    #[test]
    fn scale_axis_defaults_to_unity_and_varies_fastest() {
        let space = ParameterSpace::new().axis("kappa", AxisSpec::List(vec![1.0, 2.0]));
        let jobs = expand(&space, &[]).expect("expansion should pass");
        assert_eq!(
            jobs,
            vec![
                point(&[("kappa", 1.0), ("scale", 1.0)]),
                point(&[("kappa", 2.0), ("scale", 1.0)]),
            ]
        );

        let space = space.axis("scale", AxisSpec::List(vec![0.5, 2.0]));
        let jobs = expand(&space, &[]).expect("expansion should pass");
        assert_eq!(jobs[0], point(&[("kappa", 1.0), ("scale", 0.5)]));
        assert_eq!(jobs[1], point(&[("kappa", 1.0), ("scale", 2.0)]));
        assert_eq!(jobs[2], point(&[("kappa", 2.0), ("scale", 0.5)]));
    }

    #[test]
    fn override_fully_replaces_declared_axis() {
        let space = ParameterSpace::new().axis("kappa", AxisSpec::List(vec![1.0, 2.0, 3.0]));
        let jobs = expand(&space, &["kappa=9.0".to_string()]).expect("expansion should pass");
        assert_eq!(jobs, vec![point(&[("kappa", 9.0), ("scale", 1.0)])]);
    }

    #[test]
    fn explicit_points_are_preserved_and_never_duplicated() {
        let space = ParameterSpace::new()
            .axis("kappa", AxisSpec::List(vec![1.0, 2.0]))
            .point(point(&[("kappa", 2.0)]))
            .point(point(&[("kappa", 7.0)]));
        let jobs = expand(&space, &[]).expect("expansion should pass");
        // Explicit points first, then only the expanded point not already
        // present (kappa = 1.0); kappa = 2.0 must not appear twice.
        assert_eq!(
            jobs,
            vec![
                point(&[("kappa", 2.0), ("scale", 1.0)]),
                point(&[("kappa", 7.0), ("scale", 1.0)]),
                point(&[("kappa", 1.0), ("scale", 1.0)]),
            ]
        );
    }

    #[test]
    fn expansion_is_deterministic_across_calls() {
        let space = ParameterSpace::new()
            .axis("b", AxisSpec::Text("0:1:0.5".to_string()))
            .axis("a", AxisSpec::List(vec![1.0, 2.0]))
            .axis("scale", AxisSpec::List(vec![0.5, 1.0]));
        let overrides = vec!["c=[3.0,4.0]".to_string()];
        let first = expand(&space, &overrides).expect("expansion should pass");
        let second = expand(&space, &overrides).expect("expansion should pass");
        assert_eq!(first, second);
        // Sorted key order: a varies slower than b, which varies slower
        // than c; scale fastest.
        assert_eq!(
            first[0],
            point(&[("a", 1.0), ("b", 0.0), ("c", 3.0), ("scale", 0.5)])
        );
        assert_eq!(
            first[1],
            point(&[("a", 1.0), ("b", 0.0), ("c", 3.0), ("scale", 1.0)])
        );
        assert_eq!(
            first[2],
            point(&[("a", 1.0), ("b", 0.0), ("c", 4.0), ("scale", 0.5)])
        );
    }
}
