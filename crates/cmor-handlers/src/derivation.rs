//! Declarative derivations from raw fields to the published quantity.

use cmip_common::{is_fill, FILL_VALUE};

use crate::error::{HandlerError, Result};

/// How the output field is formed from the raw input fields.
///
/// Inputs are aligned element by element; a fill value in any input yields
/// fill in the output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Derivation {
    /// The single input, unchanged.
    Identity,
    /// The single input times a constant.
    Scale(f64),
    /// Sum of all inputs, then scaled.
    Sum(f64),
    /// `Σ coef · input[key]`.
    Linear(&'static [(&'static str, f64)]),
    /// First input divided by the second; fill where the denominator is zero.
    Ratio,
    /// Level 0 of a `[level][cell]` field.
    SurfaceLevel,
}

impl Derivation {
    /// Number of levels in the derived field given `levels` in the input.
    pub fn output_levels(&self, levels: usize) -> usize {
        match self {
            Self::SurfaceLevel => 1,
            _ => levels,
        }
    }

    /// Apply to one time step. `inputs` holds `(raw name, values)` pairs in
    /// the order the raw fields are declared.
    pub fn apply(&self, variable: &str, inputs: &[(&str, &[f64])], levels: usize) -> Result<Vec<f64>> {
        let fail = |reason: String| HandlerError::derivation(variable, reason);

        let (_, first) = inputs
            .first()
            .ok_or_else(|| fail("no input fields".to_string()))?;
        let len = first.len();
        if let Some((name, values)) = inputs.iter().find(|(_, v)| v.len() != len) {
            return Err(fail(format!("input {name} has {} values, expected {len}", values.len())));
        }

        let out = match self {
            Self::Identity => single(variable, inputs)?.to_vec(),
            Self::Scale(k) => single(variable, inputs)?.iter().map(|&v| scale(v, *k)).collect(),
            Self::Sum(k) => (0..len)
                .map(|i| {
                    let mut acc = 0.0;
                    for (_, values) in inputs {
                        if is_fill(values[i]) {
                            return FILL_VALUE;
                        }
                        acc += values[i];
                    }
                    acc * k
                })
                .collect(),
            Self::Linear(terms) => {
                let mut columns = Vec::with_capacity(terms.len());
                for (key, coef) in terms.iter() {
                    let values = inputs
                        .iter()
                        .find(|(name, _)| name == key)
                        .map(|(_, v)| *v)
                        .ok_or_else(|| fail(format!("input {key} not provided")))?;
                    columns.push((values, *coef));
                }
                (0..len)
                    .map(|i| {
                        let mut acc = 0.0;
                        for (values, coef) in &columns {
                            if is_fill(values[i]) {
                                return FILL_VALUE;
                            }
                            acc += coef * values[i];
                        }
                        acc
                    })
                    .collect()
            }
            Self::Ratio => {
                let [(_, num), (_, den)] = inputs else {
                    return Err(fail(format!("ratio expects two inputs, got {}", inputs.len())));
                };
                num.iter()
                    .zip(den.iter())
                    .map(|(&n, &d)| {
                        if is_fill(n) || is_fill(d) || d == 0.0 {
                            FILL_VALUE
                        } else {
                            n / d
                        }
                    })
                    .collect()
            }
            Self::SurfaceLevel => {
                let values = single(variable, inputs)?;
                if levels == 0 || len % levels != 0 {
                    return Err(fail(format!("{len} values do not split into {levels} levels")));
                }
                values[..len / levels].to_vec()
            }
        };
        Ok(out)
    }
}

fn single<'a>(variable: &str, inputs: &[(&str, &'a [f64])]) -> Result<&'a [f64]> {
    match inputs {
        [(_, values)] => Ok(*values),
        _ => Err(HandlerError::derivation(
            variable,
            format!("expects one input, got {}", inputs.len()),
        )),
    }
}

fn scale(value: f64, k: f64) -> f64 {
    if is_fill(value) {
        value
    } else {
        value * k
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_and_identity() {
        let x = [1.0, FILL_VALUE, 3.0];
        assert_eq!(Derivation::Identity.apply("ts", &[("TS", &x[..])], 1).unwrap(), x.to_vec());
        assert_eq!(
            Derivation::Scale(100.0).apply("clt", &[("CLDTOT", &x[..])], 1).unwrap(),
            vec![100.0, FILL_VALUE, 300.0]
        );
        assert!(Derivation::Scale(2.0).apply("clt", &[("A", &x[..]), ("B", &x[..])], 1).is_err());
    }

    #[test]
    fn test_sum_propagates_fill() {
        let a = [1.0e-8, 2.0e-8, FILL_VALUE];
        let b = [3.0e-8, 0.0, 1.0];
        let out = Derivation::Sum(1000.0).apply("pr", &[("PRECC", &a[..]), ("PRECL", &b[..])], 1).unwrap();
        test_utils::assert_approx_eq!(out[0], 4.0e-5, 1e-15);
        test_utils::assert_approx_eq!(out[1], 2.0e-5, 1e-15);
        assert_eq!(out[2], FILL_VALUE);
    }

    #[test]
    fn test_linear_by_key() {
        const TERMS: &[(&str, f64)] = &[("FSDS", 1.0), ("FSNS", -1.0)];
        let fsns = [150.0, 80.0];
        let fsds = [200.0, 100.0];
        let out = Derivation::Linear(TERMS)
            .apply("rsus", &[("FSNS", &fsns[..]), ("FSDS", &fsds[..])], 1)
            .unwrap();
        assert_eq!(out, vec![50.0, 20.0]);

        let err = Derivation::Linear(TERMS).apply("rsus", &[("FSDS", &fsds[..])], 1).unwrap_err();
        assert!(matches!(err, HandlerError::Derivation { .. }));
    }

    #[test]
    fn test_ratio_zero_denominator() {
        let volume = [2.0, 1.0, 0.0];
        let area = [0.5, 0.0, 0.0];
        let out = Derivation::Ratio.apply("sithick", &[("vol", &volume[..]), ("area", &area[..])], 1).unwrap();
        assert_eq!(out, vec![4.0, FILL_VALUE, FILL_VALUE]);
    }

    #[test]
    fn test_surface_level() {
        // [level][cell] with 2 levels of 3 cells
        let field = [10.0, 11.0, 12.0, 5.0, 6.0, 7.0];
        let d = Derivation::SurfaceLevel;
        assert_eq!(d.output_levels(2), 1);
        assert_eq!(d.apply("tos", &[("temperature", &field[..])], 2).unwrap(), vec![10.0, 11.0, 12.0]);
        assert!(d.apply("tos", &[("temperature", &field[..])], 4).is_err());
    }

    #[test]
    fn test_mismatched_lengths() {
        let a = [1.0, 2.0];
        let b = [1.0];
        assert!(Derivation::Sum(1.0).apply("rlus", &[("FLDS", &a[..]), ("FLNS", &b[..])], 1).is_err());
    }
}
