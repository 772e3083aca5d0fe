// crates/permalign-solvers/src/brent.rs
//
// Bounded scalar minimization (Brent's method on a closed interval).
//
// Combines golden-section steps with successive parabolic interpolation.
// The interval endpoints themselves are never evaluated; callers that need
// them compare against the endpoints separately.

use serde::{Deserialize, Serialize};

use permalign_core::{LineSearch, PermAlignError, ScalarMinimum};

/// Configuration and implementation of the bounded Brent minimizer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundedBrent {
    /// Absolute tolerance on the abscissa. Default: 1e-5.
    pub xtol: f64,
    /// Maximum number of function evaluations. Default: 500.
    pub max_evaluations: usize,
}

impl Default for BoundedBrent {
    fn default() -> Self {
        Self {
            xtol: 1e-5,
            max_evaluations: 500,
        }
    }
}

/// Sign used for step directions; zero counts as positive.
fn step_sign(x: f64) -> f64 {
    if x < 0.0 {
        -1.0
    } else {
        1.0
    }
}

impl LineSearch for BoundedBrent {
    fn minimize(
        &self,
        f: &mut dyn FnMut(f64) -> f64,
        lower: f64,
        upper: f64,
    ) -> Result<ScalarMinimum, PermAlignError> {
        if !lower.is_finite() || !upper.is_finite() || lower > upper {
            return Err(PermAlignError::InvalidInput(format!(
                "invalid search interval [{}, {}]",
                lower, upper
            )));
        }
        if self.xtol <= 0.0 || self.max_evaluations == 0 {
            return Err(PermAlignError::InvalidConfig(format!(
                "line search needs xtol > 0 and max_evaluations > 0, got {} and {}",
                self.xtol, self.max_evaluations
            )));
        }

        // NaN never wins a comparison.
        let mut eval = |x: f64| {
            let y = f(x);
            if y.is_nan() {
                f64::INFINITY
            } else {
                y
            }
        };

        let sqrt_eps = f64::EPSILON.sqrt();
        let golden_mean = 0.5 * (3.0 - 5.0_f64.sqrt());

        let (mut a, mut b) = (lower, upper);
        let mut fulc = a + golden_mean * (b - a);
        let mut nfc = fulc;
        let mut xf = fulc;
        let mut rat = 0.0_f64;
        let mut e = 0.0_f64;

        let mut fx = eval(xf);
        let mut evaluations = 1usize;
        let mut ffulc = fx;
        let mut fnfc = fx;

        let mut xm = 0.5 * (a + b);
        let mut tol1 = sqrt_eps * xf.abs() + self.xtol / 3.0;
        let mut tol2 = 2.0 * tol1;

        while (xf - xm).abs() > tol2 - 0.5 * (b - a) {
            let mut golden = true;

            // Try a parabolic fit through the three best points.
            if e.abs() > tol1 {
                golden = false;
                let mut r = (xf - nfc) * (fx - ffulc);
                let mut q = (xf - fulc) * (fx - fnfc);
                let mut p = (xf - fulc) * q - (xf - nfc) * r;
                q = 2.0 * (q - r);
                if q > 0.0 {
                    p = -p;
                }
                q = q.abs();
                r = e;
                e = rat;

                let acceptable =
                    p.abs() < (0.5 * q * r).abs() && p > q * (a - xf) && p < q * (b - xf);
                if acceptable {
                    rat = p / q;
                    let x = xf + rat;
                    // Do not evaluate too close to the bounds.
                    if (x - a) < tol2 || (b - x) < tol2 {
                        rat = tol1 * step_sign(xm - xf);
                    }
                } else {
                    golden = true;
                }
            }

            if golden {
                e = if xf >= xm { a - xf } else { b - xf };
                rat = golden_mean * e;
            }

            let x = xf + step_sign(rat) * rat.abs().max(tol1);
            let fu = eval(x);
            evaluations += 1;

            if fu <= fx {
                if x >= xf {
                    a = xf;
                } else {
                    b = xf;
                }
                fulc = nfc;
                ffulc = fnfc;
                nfc = xf;
                fnfc = fx;
                xf = x;
                fx = fu;
            } else {
                if x < xf {
                    a = x;
                } else {
                    b = x;
                }
                if fu <= fnfc || nfc == xf {
                    fulc = nfc;
                    ffulc = fnfc;
                    nfc = x;
                    fnfc = fu;
                } else if fu <= ffulc || fulc == xf || fulc == nfc {
                    fulc = x;
                    ffulc = fu;
                }
            }

            xm = 0.5 * (a + b);
            tol1 = sqrt_eps * xf.abs() + self.xtol / 3.0;
            tol2 = 2.0 * tol1;

            if evaluations >= self.max_evaluations {
                tracing::debug!(
                    "Line search stopped at evaluation cap ({}), x = {}",
                    self.max_evaluations,
                    xf
                );
                break;
            }
        }

        Ok(ScalarMinimum {
            x: xf,
            fx,
            evaluations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_interior_minimum_of_parabola() {
        let brent = BoundedBrent::default();
        let mut f = |x: f64| (x - 0.3) * (x - 0.3) + 2.0;
        let min = brent.minimize(&mut f, 0.0, 1.0).unwrap();
        assert!((min.x - 0.3).abs() < 1e-4, "x = {}", min.x);
        assert!((min.fx - 2.0).abs() < 1e-8);
    }

    #[test]
    fn decreasing_function_converges_to_upper_bound() {
        let brent = BoundedBrent::default();
        let mut f = |x: f64| -3.0 * x;
        let min = brent.minimize(&mut f, 0.0, 1.0).unwrap();
        assert!(min.x > 1.0 - 1e-4, "x = {}", min.x);
        assert!(min.x <= 1.0);
    }

    #[test]
    fn respects_non_unit_bounds() {
        let brent = BoundedBrent::default();
        let mut f = |x: f64| (x - 3.0).powi(2);
        let min = brent.minimize(&mut f, -2.0, 5.0).unwrap();
        assert!((min.x - 3.0).abs() < 1e-4);
    }

    #[test]
    fn evaluation_cap_is_honored() {
        let brent = BoundedBrent {
            xtol: 1e-12,
            max_evaluations: 5,
        };
        let mut calls = 0usize;
        let mut f = |x: f64| {
            calls += 1;
            x.sin()
        };
        let min = brent.minimize(&mut f, 0.0, 6.0).unwrap();
        assert!(min.evaluations <= 5);
        assert_eq!(calls, min.evaluations);
    }

    #[test]
    fn rejects_inverted_interval() {
        let brent = BoundedBrent::default();
        let mut f = |x: f64| x;
        assert!(matches!(
            brent.minimize(&mut f, 1.0, 0.0),
            Err(PermAlignError::InvalidInput(_))
        ));
    }
}
