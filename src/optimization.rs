use log::debug;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use crate::{
    config::Ties,
    data::{RiskSet, SurvivalData},
    error::{SurvivalError, Result},
    linalg,
};

/// step halvings tried before we call an iteration stuck
const MAX_STEP_HALVINGS: usize = 30;

/// |beta| * sd(x) beyond this means the likelihood is monotone (beta -> inf)
const DIVERGENCE_LIMIT: f64 = 8.0;

/// Configuration for Cox model optimization
#[derive(Debug, Clone)]
pub struct OptimizationConfig {
    pub l2_penalty: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub ties: Ties,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            l2_penalty: 0.0,
            max_iterations: 50,
            tolerance: 1e-9,
            ties: Ties::Efron,
        }
    }
}

/// log partial likelihood w/ first and second derivatives
#[derive(Debug, Clone)]
pub struct Derivatives {
    pub log_likelihood: f64,
    pub gradient: Array1<f64>,
    /// observed information = minus the hessian
    pub information: Array2<f64>,
}

/// what a successful fit hands back
#[derive(Debug, Clone)]
pub struct FitResult {
    pub coefficients: Array1<f64>,
    /// inverse of the (penalized) information at the optimum
    pub variance: Array2<f64>,
    pub log_likelihood: f64,
    pub null_log_likelihood: f64,
    pub iterations: usize,
}

/// weight of the l-th of d tied deaths removed from the risk set
#[allow(clippy::cast_precision_loss)]
fn tie_fraction(ties: Ties, l: usize, d: usize) -> f64 {
    match ties {
        Ties::Breslow => 0.0,
        Ties::Efron => l as f64 / d as f64,
    }
}

/// exp(x·beta) for every subject, erroring out on overflow
fn risk_weights(x: ArrayView2<f64>, beta: &Array1<f64>) -> Result<Array1<f64>> {
    let weights = x.dot(beta).mapv(f64::exp);
    if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w <= 0.0) {
        return Err(SurvivalError::numerical_error(
            format!("invalid exponential prediction: {}", bad)
        ));
    }
    Ok(weights)
}

/// sum of w and w*x over a set of subjects
fn weighted_sums(
    x: ArrayView2<f64>,
    weights: &Array1<f64>,
    subjects: &[usize],
) -> (f64, Array1<f64>, Array2<f64>) {
    let p = x.ncols();
    let mut s0 = 0.0;
    let mut s1 = Array1::zeros(p);
    let mut s2 = Array2::zeros((p, p));
    for &i in subjects {
        let w = weights[i];
        let row = x.row(i);
        s0 += w;
        s1.scaled_add(w, &row);
        for j in 0..p {
            for k in 0..p {
                s2[[j, k]] += w * row[j] * row[k];
            }
        }
    }
    (s0, s1, s2)
}

/// log partial likelihood and derivatives at beta
pub fn partial_likelihood(
    x: ArrayView2<f64>,
    risk_sets: &[RiskSet],
    beta: &Array1<f64>,
    ties: Ties,
) -> Result<Derivatives> {
    let p = x.ncols();
    let weights = risk_weights(x, beta)?;

    let mut loglik = 0.0;
    let mut gradient = Array1::zeros(p);
    let mut information = Array2::zeros((p, p));

    for set in risk_sets {
        let d = set.deaths.len();
        if d == 0 {
            continue;
        }
        let (r0, r1, r2) = weighted_sums(x, &weights, &set.at_risk);
        let (t0, t1, t2) = weighted_sums(x, &weights, &set.deaths);

        for &i in &set.deaths {
            loglik += x.row(i).dot(beta);
            gradient += &x.row(i);
        }

        for l in 0..d {
            let f = tie_fraction(ties, l, d);
            let phi = r0 - f * t0;
            if !(phi > 0.0) {
                return Err(SurvivalError::numerical_error("risk set sum is non-positive"));
            }
            let mean = (&r1 - &(f * &t1)) / phi;
            let second = (&r2 - &(f * &t2)) / phi;

            loglik -= phi.ln();
            gradient -= &mean;
            for j in 0..p {
                for k in 0..p {
                    information[[j, k]] += second[[j, k]] - mean[j] * mean[k];
                }
            }
        }
    }

    if !loglik.is_finite() {
        return Err(SurvivalError::numerical_error("log partial likelihood is not finite"));
    }

    Ok(Derivatives { log_likelihood: loglik, gradient, information })
}

/// risk-set weighted covariate mean at each event time, averaged over tied deaths
#[allow(clippy::cast_precision_loss)]
pub fn risk_set_means(
    x: ArrayView2<f64>,
    risk_sets: &[RiskSet],
    beta: &Array1<f64>,
    ties: Ties,
) -> Result<Vec<Array1<f64>>> {
    let weights = risk_weights(x, beta)?;

    risk_sets
        .iter()
        .map(|set| {
            let d = set.deaths.len();
            let (r0, r1, _) = weighted_sums(x, &weights, &set.at_risk);
            let (t0, t1, _) = weighted_sums(x, &weights, &set.deaths);
            let mut mean = Array1::zeros(x.ncols());
            for l in 0..d {
                let f = tie_fraction(ties, l, d);
                let phi = r0 - f * t0;
                if !(phi > 0.0) {
                    return Err(SurvivalError::numerical_error("risk set sum is non-positive"));
                }
                mean += &((&r1 - &(f * &t1)) / phi);
            }
            Ok(mean / d as f64)
        })
        .collect()
}

/// covariates minus their column means - the optimum is unchanged, exp() is happier
pub fn centered_covariates(data: &SurvivalData) -> Array2<f64> {
    let means = data.covariate_means();
    &data.covariates() - &means.insert_axis(Axis(0))
}

/// Cox proportional hazards optimizer (newton-raphson w/ optional ridge)
pub struct CoxOptimizer {
    config: OptimizationConfig,
}

impl CoxOptimizer {
    pub fn new(config: OptimizationConfig) -> Self {
        Self { config }
    }

    fn penalized(&self, mut derivs: Derivatives, beta: &Array1<f64>) -> Derivatives {
        let lambda = self.config.l2_penalty;
        if lambda > 0.0 {
            derivs.log_likelihood -= 0.5 * lambda * beta.dot(beta);
            derivs.gradient.scaled_add(-lambda, beta);
            for i in 0..beta.len() {
                derivs.information[[i, i]] += lambda;
            }
        }
        derivs
    }

    /// maximize the partial likelihood; any failure to converge is an error
    pub fn optimize(&self, data: &SurvivalData) -> Result<FitResult> {
        if data.n_events() == 0 {
            return Err(SurvivalError::NoEvents);
        }
        if data.n_features() == 0 {
            return Err(SurvivalError::invalid_dimensions("no covariates to fit"));
        }

        let x = centered_covariates(data);
        let risk_sets = data.risk_sets();
        let ties = self.config.ties;
        let n_features = data.n_features();

        let mut beta = Array1::zeros(n_features);
        let null = partial_likelihood(x.view(), risk_sets, &beta, ties)?;
        let null_log_likelihood = null.log_likelihood;
        let mut current = self.penalized(null, &beta);

        for iteration in 1..=self.config.max_iterations {
            let step = linalg::spd_solve(&current.information, &current.gradient)?;

            // newton step, halved until the likelihood stops going down
            let mut scale = 1.0;
            let mut accepted = None;
            for _ in 0..MAX_STEP_HALVINGS {
                let candidate = &beta + &(scale * &step);
                match partial_likelihood(x.view(), risk_sets, &candidate, ties) {
                    Ok(derivs) => {
                        let derivs = self.penalized(derivs, &candidate);
                        if derivs.log_likelihood >= current.log_likelihood - self.config.tolerance {
                            accepted = Some((candidate, derivs));
                            break;
                        }
                    }
                    Err(SurvivalError::NumericalError { .. }) => {}
                    Err(other) => return Err(other),
                }
                scale *= 0.5;
            }

            let Some((next_beta, next)) = accepted else {
                return Err(SurvivalError::convergence_failed(format!(
                    "step halving could not improve the likelihood at iteration {iteration}"
                )));
            };

            let change = (next.log_likelihood - current.log_likelihood).abs();
            debug!(
                "newton iteration {}: loglik = {:.6}, step scale = {}",
                iteration, next.log_likelihood, scale
            );
            beta = next_beta;
            current = next;

            // predicted gain of one more full newton step
            let decrement = 0.5 * current
                .gradient
                .dot(&linalg::spd_solve(&current.information, &current.gradient)?);

            if self.has_converged(change, decrement, current.log_likelihood) {
                self.check_divergence(x.view(), &beta)?;
                let variance = linalg::spd_inverse(&current.information)?;
                let unpenalized = partial_likelihood(x.view(), risk_sets, &beta, ties)?;
                return Ok(FitResult {
                    coefficients: beta,
                    variance,
                    log_likelihood: unpenalized.log_likelihood,
                    null_log_likelihood,
                    iterations: iteration,
                });
            }
        }

        Err(SurvivalError::convergence_failed(format!(
            "newton-raphson did not converge in {} iterations",
            self.config.max_iterations
        )))
    }

    /// both the last likelihood change and the newton decrement are negligible
    fn has_converged(&self, change: f64, decrement: f64, log_likelihood: f64) -> bool {
        let threshold = self.config.tolerance * log_likelihood.abs().max(1.0);
        change <= threshold && decrement <= threshold
    }

    /// monotone likelihood: loglik flattens out while a coefficient runs off to infinity
    fn check_divergence(&self, x: ArrayView2<f64>, beta: &Array1<f64>) -> Result<()> {
        let sds = x.std_axis(Axis(0), 0.0);
        for (j, (&b, &sd)) in beta.iter().zip(sds.iter()).enumerate() {
            if (b * sd).abs() > DIVERGENCE_LIMIT {
                return Err(SurvivalError::convergence_failed(format!(
                    "coefficient {j} is diverging ({b:.3}) - likelihood has no finite maximum"
                )));
            }
        }
        Ok(())
    }
}
