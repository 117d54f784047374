//! The mixed-effects model fitting engine.
//!
//! One fitted model per outcome variable, with a fixed structure chosen by
//! the caller ([`FixedEffects`]) and one or two crossed random intercepts
//! ([`RandomIntercepts`]). Gaussian outcomes (identity and log-linear
//! families) are fit by REML; binary outcomes by penalized
//! quasi-likelihood (PQL), an outer re-linearization loop around the same
//! weighted REML core.
//!
//! # Estimation
//!
//! The marginal covariance of the observations is
//!
//! ```text
//! V = sigma^2 * D + sum_k tau_k^2 * Z_k Z_k'
//! ```
//!
//! where `D` is the identity for Gaussian fits and the inverse IRLS
//! working weights for PQL, and each `Z_k` is the indicator matrix of one
//! random-intercept grouping. Each iteration computes the GLS fixed
//! effects through a Cholesky factorization of `V`, the REML
//! log-likelihood, and EM updates of the variance components. EM steps
//! cannot leave the parameter space and increase the restricted likelihood
//! monotonically; a component driven toward zero is snapped to the
//! boundary and reported as a [`FitWarning::SingularFit`].
//!
//! # Failure modes
//!
//! Non-convergence within the iteration budget and boundary variance
//! estimates are **non-fatal**: estimates are returned with the caveat
//! attached to the model, never silently swallowed and never retried.
//! Samples that cannot identify the requested structure (too few
//! subjects, no replication within a grouping, more columns than rows)
//! fail fatally with [`InsufficientDataError`] and no model is produced.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};
use serde::Serialize;

use gamefx_stats::normal::pvalue_z;

use crate::{
    design::{CenteredCovariate, DesignFactor},
    family::logistic,
    formula::ModelSpec,
};

/// Tuning constants for the fitting loops.
#[derive(Debug, Clone)]
pub struct FitConfig {
    /// Maximum REML iterations.
    pub max_iter: usize,
    /// Convergence tolerance on the REML log-likelihood.
    pub tol: f64,
    /// Ridge added to diagonals for numerical stability.
    pub ridge: f64,
    /// Lower bound for variance components.
    pub var_lower_bound: f64,
    /// A variance component below this fraction of the residual scale is
    /// snapped to the boundary.
    pub boundary_fraction: f64,
    /// Maximum PQL re-linearization steps (binomial fits).
    pub pql_max_iter: usize,
    /// Convergence tolerance on the fixed effects between PQL steps.
    pub pql_tol: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_iter: 200,
            tol: 1e-6,
            ridge: 1e-8,
            var_lower_bound: 1e-10,
            boundary_fraction: 1e-2,
            pql_max_iter: 30,
            pql_tol: 1e-6,
        }
    }
}

/// Fatal data problems: no model can be produced from the sample.
#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum InsufficientDataError {
    #[display("outcome '{outcome}' has no usable observations")]
    EmptySample { outcome: String },
    #[display("mixed model needs at least two subjects, found {found}")]
    TooFewSubjects { found: usize },
    #[display("sample has {rows} rows but the fixed structure has {columns} columns")]
    SaturatedDesign { rows: usize, columns: usize },
    #[display(
        "random intercept for '{grouping}' has no replication ({groups} groups over {rows} rows)"
    )]
    NoReplication {
        grouping: &'static str,
        groups: usize,
        rows: usize,
    },
    #[display("covariance matrix is not positive definite; the sample cannot support the model")]
    IllConditioned,
}

/// Non-fatal caveats attached to a fitted model. These propagate into
/// every report derived from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, derive_more::Display)]
pub enum FitWarning {
    /// The iteration budget ran out before the estimates stabilized.
    /// Estimates are returned but should be treated as unreliable.
    #[display("estimates did not converge within the iteration budget")]
    NonConvergence,
    /// A random-intercept variance was estimated at its lower boundary.
    #[display("random-intercept variance for '{grouping}' estimated at its boundary")]
    SingularFit { grouping: &'static str },
}

/// One estimated fixed-effect coefficient.
#[derive(Debug, Clone, Serialize)]
pub struct Coefficient {
    /// Term label from the fixed structure.
    pub term: String,
    pub estimate: f64,
    pub std_error: f64,
    /// Wald z statistic (`estimate / std_error`).
    pub statistic: f64,
    /// Two-sided normal-approximation p-value.
    pub p_value: f64,
}

/// Estimated variance of one random intercept.
#[derive(Debug, Clone, Serialize)]
pub struct VarianceComponent {
    pub grouping: String,
    pub variance: f64,
}

/// Variance decomposition of a fitted model.
#[derive(Debug, Clone, Serialize)]
pub struct VarianceEstimates {
    /// One entry per random intercept, subject first.
    pub intercepts: Vec<VarianceComponent>,
    /// Residual variance. Fixed at 1.0 for binomial-logit fits.
    pub residual: f64,
}

/// One centered covariate together with its per-row values over the
/// fitting sample.
#[derive(Debug, Clone)]
pub struct CovariateColumn {
    pub covariate: CenteredCovariate,
    pub values: Vec<f64>,
}

/// An analysis sample prepared for one model fit.
///
/// The response is on the raw outcome scale; the family's transform is
/// applied inside [`fit`]. Subject and item indices are dense
/// (`0..n_subjects`, `0..n_items`).
#[derive(Debug, Clone)]
pub struct ModelSample {
    pub response: Vec<f64>,
    pub subject: Vec<usize>,
    pub n_subjects: usize,
    /// Item index per row; present for trial-level outcomes.
    pub item: Option<Vec<usize>>,
    pub n_items: usize,
    pub covariates: BTreeMap<DesignFactor, CovariateColumn>,
}

/// A fitted mixed-effects model. Immutable once constructed; the centering
/// origins of its covariates travel with it so prediction queries reuse
/// the exact encoding of the fitting sample.
#[derive(Debug, Clone, Serialize)]
pub struct FittedModel {
    spec: ModelSpec,
    covariates: BTreeMap<DesignFactor, CenteredCovariate>,
    coefficients: Vec<Coefficient>,
    variance: VarianceEstimates,
    warnings: Vec<FitWarning>,
    log_likelihood: f64,
    iterations: usize,
    n_obs: usize,
    n_subjects: usize,
    n_items: usize,
}

impl FittedModel {
    #[must_use]
    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    /// Estimated fixed effects, in design-matrix column order.
    #[must_use]
    pub fn coefficients(&self) -> &[Coefficient] {
        &self.coefficients
    }

    /// Looks up a coefficient by term name.
    #[must_use]
    pub fn coefficient(&self, term: &str) -> Option<&Coefficient> {
        self.coefficients.iter().find(|c| c.term == term)
    }

    /// The centered covariate encodings stored at fit time.
    #[must_use]
    pub fn covariates(&self) -> &BTreeMap<DesignFactor, CenteredCovariate> {
        &self.covariates
    }

    #[must_use]
    pub fn covariate(&self, factor: DesignFactor) -> Option<&CenteredCovariate> {
        self.covariates.get(&factor)
    }

    /// Non-fatal caveats attached during fitting.
    #[must_use]
    pub fn warnings(&self) -> &[FitWarning] {
        &self.warnings
    }

    /// Whether the estimates stabilized within the iteration budget.
    #[must_use]
    pub fn converged(&self) -> bool {
        !self.warnings.contains(&FitWarning::NonConvergence)
    }

    #[must_use]
    pub fn variance(&self) -> &VarianceEstimates {
        &self.variance
    }

    /// REML log-likelihood at the final iterate (up to a constant).
    #[must_use]
    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    #[must_use]
    pub fn n_obs(&self) -> usize {
        self.n_obs
    }

    #[must_use]
    pub fn n_subjects(&self) -> usize {
        self.n_subjects
    }

    #[must_use]
    pub fn n_items(&self) -> usize {
        self.n_items
    }

    /// The fixed-effect linear predictor at the given centered covariate
    /// values, with all random effects held at zero. This is the
    /// population-level prediction on the link scale.
    #[must_use]
    pub fn linear_predictor<F>(&self, value_of: F) -> f64
    where
        F: Fn(DesignFactor) -> f64,
    {
        self.spec
            .fixed
            .design_row(value_of)
            .iter()
            .zip(&self.coefficients)
            .map(|(x, c)| x * c.estimate)
            .sum()
    }
}

/// One random-intercept grouping: a dense group index per row.
struct Grouping {
    name: &'static str,
    index: Vec<usize>,
    n_groups: usize,
}

impl Grouping {
    /// Indicator matrix Z (rows × groups).
    fn indicator_matrix(&self, n: usize) -> DMatrix<f64> {
        DMatrix::from_fn(n, self.n_groups, |i, j| {
            if self.index[i] == j { 1.0 } else { 0.0 }
        })
    }
}

/// Fits one mixed-effects model to a prepared sample.
///
/// # Errors
///
/// [`InsufficientDataError`] when the sample cannot identify the requested
/// structure. Convergence problems are *not* errors; they surface as
/// [`FitWarning`]s on the returned model.
///
/// # Panics
///
/// Panics if the sample's columns disagree in length or a covariate
/// required by the fixed structure is missing; both are construction bugs
/// in the caller, not data conditions.
pub fn fit(
    spec: &ModelSpec,
    sample: &ModelSample,
    config: &FitConfig,
) -> Result<FittedModel, InsufficientDataError> {
    let n = sample.response.len();
    if n == 0 {
        return Err(InsufficientDataError::EmptySample {
            outcome: spec.outcome.clone(),
        });
    }
    if sample.n_subjects < 2 {
        return Err(InsufficientDataError::TooFewSubjects {
            found: sample.n_subjects,
        });
    }
    let p = spec.fixed.n_columns();
    if n <= p {
        return Err(InsufficientDataError::SaturatedDesign { rows: n, columns: p });
    }

    assert_eq!(sample.subject.len(), n, "subject column length mismatch");
    for factor in spec.fixed.factors() {
        let column = sample
            .covariates
            .get(factor)
            .unwrap_or_else(|| panic!("missing covariate column for factor '{}'", factor.label()));
        assert_eq!(column.values.len(), n, "covariate column length mismatch");
    }

    let groupings = build_groupings(spec, sample)?;

    // Design matrix: one column per fixed term, products of centered values.
    let x = DMatrix::from_fn(n, p, |i, j| {
        spec.fixed.terms()[j]
            .factors
            .iter()
            .map(|f| sample.covariates[f].values[i])
            .product()
    });
    let y = DVector::from_iterator(
        n,
        sample.response.iter().map(|&v| spec.family.transform(v)),
    );

    let mut warnings = Vec::new();
    let reml = if spec.family.is_binomial() {
        let (reml, outer_converged) = fit_pql(&y, &x, &groupings, config)?;
        if !outer_converged {
            warnings.push(FitWarning::NonConvergence);
        }
        reml
    } else {
        reml_fit(&y, &x, &groupings, None, true, None, config)?
    };

    if !reml.converged && !warnings.contains(&FitWarning::NonConvergence) {
        warnings.push(FitWarning::NonConvergence);
    }
    for (k, grouping) in groupings.iter().enumerate() {
        if reml.tau2[k] <= config.var_lower_bound * 10.0 {
            warnings.push(FitWarning::SingularFit {
                grouping: grouping.name,
            });
        }
    }

    let coefficients = spec
        .fixed
        .terms()
        .iter()
        .enumerate()
        .map(|(j, term)| {
            let estimate = reml.beta[j];
            let std_error = reml.cov_beta[(j, j)].max(0.0).sqrt();
            let statistic = if std_error > 0.0 {
                estimate / std_error
            } else {
                f64::NAN
            };
            Coefficient {
                term: term.name.to_string(),
                estimate,
                std_error,
                statistic,
                p_value: pvalue_z(statistic),
            }
        })
        .collect();

    let variance = VarianceEstimates {
        intercepts: groupings
            .iter()
            .zip(&reml.tau2)
            .map(|(g, &tau2)| VarianceComponent {
                grouping: g.name.to_string(),
                variance: tau2,
            })
            .collect(),
        residual: reml.sigma2,
    };

    Ok(FittedModel {
        spec: spec.clone(),
        covariates: sample
            .covariates
            .iter()
            .map(|(&f, column)| (f, column.covariate.clone()))
            .collect(),
        coefficients,
        variance,
        warnings,
        log_likelihood: reml.log_reml,
        iterations: reml.iterations,
        n_obs: n,
        n_subjects: sample.n_subjects,
        n_items: sample.n_items,
    })
}

fn build_groupings(
    spec: &ModelSpec,
    sample: &ModelSample,
) -> Result<Vec<Grouping>, InsufficientDataError> {
    let n = sample.response.len();
    let mut groupings = Vec::new();
    if spec.random.includes_subject() {
        groupings.push(Grouping {
            name: "subject",
            index: sample.subject.clone(),
            n_groups: sample.n_subjects,
        });
    }
    if spec.random.includes_item() {
        let item = sample
            .item
            .as_ref()
            .expect("trial-level model requires an item column");
        assert_eq!(item.len(), n, "item column length mismatch");
        groupings.push(Grouping {
            name: "item",
            index: item.clone(),
            n_groups: sample.n_items,
        });
    }
    for grouping in &groupings {
        if grouping.n_groups < 2 || n <= grouping.n_groups {
            return Err(InsufficientDataError::NoReplication {
                grouping: grouping.name,
                groups: grouping.n_groups,
                rows: n,
            });
        }
    }
    Ok(groupings)
}

/// Result of one (possibly weighted) REML fit.
struct RemlFit {
    beta: DVector<f64>,
    cov_beta: DMatrix<f64>,
    tau2: Vec<f64>,
    sigma2: f64,
    log_reml: f64,
    iterations: usize,
    converged: bool,
    /// Sum of the BLUP contributions `Z_k u_k`, one value per row.
    fitted_random: DVector<f64>,
}

/// REML estimation of `V = sigma^2 D + sum_k tau_k^2 Z_k Z_k'`.
///
/// `residual_weights` supplies IRLS working weights `w_i`
/// (`D = diag(1 / w_i)`); `None` means `D = I`. When `estimate_sigma` is
/// false the residual variance stays fixed at 1 (binomial working scale).
/// `init` warm-starts the variance components (used by the PQL outer loop
/// so later re-linearizations converge in a handful of iterations).
#[expect(clippy::cast_precision_loss, clippy::too_many_lines)]
fn reml_fit(
    y: &DVector<f64>,
    x: &DMatrix<f64>,
    groupings: &[Grouping],
    residual_weights: Option<&[f64]>,
    estimate_sigma: bool,
    init: Option<(f64, &[f64])>,
    config: &FitConfig,
) -> Result<RemlFit, InsufficientDataError> {
    let n = y.len();
    let p = x.ncols();
    let d: Vec<f64> = residual_weights.map_or_else(|| vec![1.0; n], |w| {
        w.iter().map(|&wi| 1.0 / wi).collect()
    });

    let z_mats: Vec<DMatrix<f64>> = groupings
        .iter()
        .map(|g| g.indicator_matrix(n))
        .collect();
    let zzt_mats: Vec<DMatrix<f64>> = z_mats.iter().map(|z| z * z.transpose()).collect();

    // Initialize from the OLS residual variance unless warm-started.
    let (mut sigma2, mut tau2) = if let Some((sigma2, tau2)) = init {
        (sigma2, tau2.to_vec())
    } else {
        let ols_var = ols_residual_variance(y, x, config)?;
        let sigma2 = if estimate_sigma {
            ols_var.max(config.var_lower_bound)
        } else {
            1.0
        };
        let init_scale = if estimate_sigma { ols_var } else { 1.0 };
        let tau2 = groupings
            .iter()
            .map(|_| (0.1 * init_scale).max(config.var_lower_bound))
            .collect();
        (sigma2, tau2)
    };

    let mut log_reml_prev = f64::NEG_INFINITY;
    let mut converged = false;
    let mut iterations = 0;
    let mut state: Option<(DVector<f64>, DMatrix<f64>, DVector<f64>)> = None;

    for iter in 0..config.max_iter {
        iterations = iter + 1;

        let mut v = DMatrix::zeros(n, n);
        for (zzt, &t2) in zzt_mats.iter().zip(&tau2) {
            v += zzt * t2;
        }
        for i in 0..n {
            v[(i, i)] += sigma2 * d[i] + config.ridge;
        }

        let chol = match v.clone().cholesky() {
            Some(c) => c,
            None => {
                for i in 0..n {
                    v[(i, i)] += 0.01;
                }
                v.clone()
                    .cholesky()
                    .ok_or(InsufficientDataError::IllConditioned)?
            }
        };
        let v_inv = chol.inverse();

        let vinv_x = &v_inv * x;
        let xtvinvx = x.transpose() * &vinv_x;
        let xtvinvx_inv = invert_with_ridge(&xtvinvx, config.ridge)
            .ok_or(InsufficientDataError::IllConditioned)?;
        let beta = &xtvinvx_inv * (vinv_x.transpose() * y);
        let residuals = y - x * &beta;
        // P y = V^-1 (y - X beta) because X' V^-1 residuals vanish at the
        // GLS solution.
        let py = &v_inv * &residuals;

        let log_det_v = 2.0 * chol.l().diagonal().map(f64::ln).sum();
        let log_det_xtvinvx = xtvinvx
            .clone()
            .cholesky()
            .map(|c| 2.0 * c.l().diagonal().map(f64::ln).sum())
            .ok_or(InsufficientDataError::IllConditioned)?;
        let quad = residuals.dot(&py);
        let log_reml = -0.5 * (log_det_v + log_det_xtvinvx + quad);

        if (log_reml - log_reml_prev).abs() < config.tol * (1.0 + log_reml.abs()) {
            converged = true;
        }
        log_reml_prev = log_reml;
        state = Some((beta, xtvinvx_inv.clone(), py.clone()));

        if converged {
            break;
        }

        // REML projector P = V^-1 - V^-1 X (X'V^-1X)^-1 X'V^-1.
        let p_mat = &v_inv - &vinv_x * &xtvinvx_inv * vinv_x.transpose();

        // EM updates. Each step stays in the parameter space and increases
        // the restricted likelihood; a component collapsing toward zero is
        // snapped to the boundary instead of decaying indefinitely.
        let reference = if estimate_sigma { sigma2 } else { 1.0 };
        for (k, zk) in z_mats.iter().enumerate() {
            let q_k = groupings[k].n_groups as f64;
            let ztpy = zk.transpose() * &py;
            let quad_k = ztpy.norm_squared();
            let pz = &p_mat * zk;
            let tr_ztpz = zk.component_mul(&pz).sum();
            let updated = tau2[k] + tau2[k] * tau2[k] * (quad_k - tr_ztpz) / q_k;
            tau2[k] = if updated < tau2[k] && updated < config.boundary_fraction * reference {
                config.var_lower_bound
            } else {
                updated.max(config.var_lower_bound)
            };
        }
        if estimate_sigma {
            let quad_s: f64 = (0..n).map(|i| d[i] * py[i] * py[i]).sum();
            let tr_dp: f64 = (0..n).map(|i| d[i] * p_mat[(i, i)]).sum();
            let updated = sigma2 + sigma2 * sigma2 * (quad_s - tr_dp) / (n as f64);
            sigma2 = updated.max(config.var_lower_bound);
        }
    }

    let (beta, cov_beta, py) = state.expect("REML loop runs at least one iteration");

    let mut fitted_random = DVector::zeros(n);
    for (zk, &t2) in z_mats.iter().zip(&tau2) {
        fitted_random += zk * (zk.transpose() * &py) * t2;
    }

    Ok(RemlFit {
        beta,
        cov_beta,
        tau2,
        sigma2,
        log_reml: log_reml_prev,
        iterations,
        converged,
        fitted_random,
    })
}

/// PQL for the binomial-logit family: iterate working response and weights
/// around weighted REML fits until the fixed effects stabilize.
fn fit_pql(
    y: &DVector<f64>,
    x: &DMatrix<f64>,
    groupings: &[Grouping],
    config: &FitConfig,
) -> Result<(RemlFit, bool), InsufficientDataError> {
    let n = y.len();
    let mut eta = y.map(|yi| logit((yi + 0.5) / 2.0));
    let mut beta_prev: Option<DVector<f64>> = None;
    let mut last: Option<RemlFit> = None;
    let mut warm: Option<(f64, Vec<f64>)> = None;
    let mut outer_converged = false;

    for _ in 0..config.pql_max_iter {
        let mu = eta.map(|e| logistic(e).clamp(1e-6, 1.0 - 1e-6));
        let w: Vec<f64> = mu.iter().map(|&m| (m * (1.0 - m)).max(1e-6)).collect();
        let z = DVector::from_fn(n, |i, _| eta[i] + (y[i] - mu[i]) / w[i]);

        let init = warm.as_ref().map(|(s, t)| (*s, t.as_slice()));
        let reml = reml_fit(&z, x, groupings, Some(&w), false, init, config)?;
        warm = Some((reml.sigma2, reml.tau2.clone()));
        eta = x * &reml.beta + &reml.fitted_random;

        if let Some(prev) = &beta_prev {
            let delta = (&reml.beta - prev).amax();
            if delta < config.pql_tol * (1.0 + reml.beta.amax()) {
                outer_converged = true;
                last = Some(reml);
                break;
            }
        }
        beta_prev = Some(reml.beta.clone());
        last = Some(reml);
    }

    let reml = last.expect("PQL loop runs at least one iteration");
    Ok((reml, outer_converged))
}

#[expect(clippy::cast_precision_loss)]
fn ols_residual_variance(
    y: &DVector<f64>,
    x: &DMatrix<f64>,
    config: &FitConfig,
) -> Result<f64, InsufficientDataError> {
    let n = y.len();
    let p = x.ncols();
    let xtx = x.transpose() * x;
    let xtx_inv =
        invert_with_ridge(&xtx, config.ridge).ok_or(InsufficientDataError::IllConditioned)?;
    let beta = &xtx_inv * (x.transpose() * y);
    let residuals = y - x * beta;
    Ok(residuals.norm_squared() / (n - p).max(1) as f64)
}

fn invert_with_ridge(m: &DMatrix<f64>, ridge: f64) -> Option<DMatrix<f64>> {
    m.clone().try_inverse().or_else(|| {
        let mut ridged = m.clone();
        for i in 0..ridged.nrows() {
            ridged[(i, i)] += ridge;
        }
        ridged.try_inverse()
    })
}

fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_distr::{Bernoulli, Distribution, Normal};
    use rand_pcg::Pcg64Mcg;

    use crate::{
        design::DesignFactor,
        family::ResponseFamily,
        formula::{FixedEffects, RandomIntercepts},
    };

    use super::*;

    /// Builds a balanced two-block sample: `n_subjects` subjects, each seen
    /// under both gamified levels, `items_per_block` items per block,
    /// group and order counterbalanced between subjects.
    fn balanced_sample<F>(
        n_subjects: usize,
        items_per_block: usize,
        mut response: F,
    ) -> ModelSample
    where
        F: FnMut(usize, bool, &str, &str, usize, &mut Pcg64Mcg) -> f64,
    {
        let mut rng = Pcg64Mcg::seed_from_u64(20_260_807);
        let mut rows_response = Vec::new();
        let mut subject = Vec::new();
        let mut item = Vec::new();
        let mut gamified_levels = Vec::new();
        let mut group_levels = Vec::new();
        let mut order_levels = Vec::new();

        for s in 0..n_subjects {
            let group = if s % 2 == 0 { "arithmetic" } else { "vocabulary" };
            let order = if (s / 2) % 2 == 0 { "control-first" } else { "gamified-first" };
            for (block, gamified) in [(0, false), (1, true)] {
                for i in 0..items_per_block {
                    let item_idx = block * items_per_block + i;
                    rows_response.push(response(s, gamified, group, order, item_idx, &mut rng));
                    subject.push(s);
                    item.push(item_idx);
                    gamified_levels.push(if gamified { "gamified" } else { "control" });
                    group_levels.push(group);
                    order_levels.push(order);
                }
            }
        }

        let mut covariates = BTreeMap::new();
        for (factor, levels) in [
            (DesignFactor::Gamified, &gamified_levels),
            (DesignFactor::Group, &group_levels),
            (DesignFactor::Order, &order_levels),
        ] {
            let (covariate, values) = CenteredCovariate::encode(factor, levels).unwrap();
            covariates.insert(factor, CovariateColumn { covariate, values });
        }

        ModelSample {
            response: rows_response,
            subject,
            n_subjects,
            item: Some(item),
            n_items: 2 * items_per_block,
            covariates,
        }
    }

    fn spec(family: ResponseFamily, random: RandomIntercepts) -> ModelSpec {
        ModelSpec {
            outcome: "test_outcome".to_string(),
            family,
            fixed: FixedEffects::GamifiedCrossed,
            random,
        }
    }

    #[test]
    fn test_constant_response_recovers_grand_mean_on_log_scale() {
        // Every response time is exactly 1000 ms; the log-linear grand-mean
        // prediction must invert back to 1000 ms.
        let sample = balanced_sample(8, 2, |_, _, _, _, _, _| 1000.0);
        let spec = spec(ResponseFamily::LinearLog, RandomIntercepts::SubjectAndItem);
        let model = fit(&spec, &sample, &FitConfig::default()).unwrap();

        let intercept = model.coefficient("(intercept)").unwrap().estimate;
        let grand_mean = spec.family.inverse_link(model.linear_predictor(|_| 0.0));
        assert_relative_eq!(intercept, 1000.0_f64.ln(), epsilon = 1e-6);
        assert_relative_eq!(grand_mean, 1000.0, epsilon = 1e-3);
    }

    #[test]
    fn test_linear_identity_recovers_within_subject_effect() {
        // True model: grand mean 5, gamified effect +1 (on the centered
        // +-0.5 scale the coefficient is the full level difference), a
        // per-subject shift, and small noise.
        let mut subject_shift = Vec::new();
        let mut rng = Pcg64Mcg::seed_from_u64(7);
        let shift_dist = Normal::new(0.0, 0.4).unwrap();
        for _ in 0..12 {
            subject_shift.push(shift_dist.sample(&mut rng));
        }
        let noise = Normal::new(0.0, 0.1).unwrap();
        let sample = balanced_sample(12, 2, |s, gamified, _, _, _, rng| {
            5.0 + if gamified { 0.5 } else { -0.5 } + subject_shift[s] + noise.sample(rng)
        });
        let spec = spec(ResponseFamily::LinearIdentity, RandomIntercepts::SubjectAndItem);
        let model = fit(&spec, &sample, &FitConfig::default()).unwrap();

        let gamified = model.coefficient("gamified").unwrap();
        assert!(
            (gamified.estimate - 1.0).abs() < 0.1,
            "gamified effect {} should be near 1.0",
            gamified.estimate
        );
        assert!(gamified.p_value < 0.01);
        // Subject variance should be well away from the boundary.
        let subject_var = &model.variance().intercepts[0];
        assert_eq!(subject_var.grouping, "subject");
        assert!(subject_var.variance > 0.01);
    }

    #[test]
    fn test_binomial_scenario_produces_probability() {
        // 20 subjects, balanced design, accuracy ~ Bernoulli(0.8): the fit
        // must succeed and the grand-mean prediction must be a probability.
        let accuracy = Bernoulli::new(0.8).unwrap();
        let sample = balanced_sample(20, 2, |_, _, _, _, _, rng| {
            f64::from(u8::from(accuracy.sample(rng)))
        });
        let spec = spec(ResponseFamily::BinomialLogit, RandomIntercepts::SubjectAndItem);
        let model = fit(&spec, &sample, &FitConfig::default()).unwrap();

        let predicted = spec.family.inverse_link(model.linear_predictor(|_| 0.0));
        assert!(predicted > 0.0 && predicted < 1.0);
        assert!(
            (predicted - 0.8).abs() < 0.15,
            "grand-mean accuracy {predicted} should be near 0.8"
        );
    }

    #[test]
    fn test_single_subject_is_insufficient() {
        let sample = ModelSample {
            response: vec![1.0, 2.0, 3.0, 4.0],
            subject: vec![0, 0, 0, 0],
            n_subjects: 1,
            item: None,
            n_items: 0,
            covariates: BTreeMap::new(),
        };
        let spec = spec(ResponseFamily::LinearIdentity, RandomIntercepts::Subject);
        let err = fit(&spec, &sample, &FitConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            InsufficientDataError::TooFewSubjects { found: 1 }
        ));
    }

    #[test]
    fn test_unreplicated_grouping_is_insufficient() {
        // One row per subject with a subject intercept requested: the
        // grouping is confounded with the residual.
        let full = balanced_sample(16, 1, |_, _, _, _, _, _| 1.0);
        let keep: Vec<usize> = (0..full.response.len()).step_by(2).collect();
        let covariates = full
            .covariates
            .iter()
            .map(|(&f, col)| {
                let values = keep.iter().map(|&i| col.values[i]).collect();
                (
                    f,
                    CovariateColumn {
                        covariate: col.covariate.clone(),
                        values,
                    },
                )
            })
            .collect();
        let sample = ModelSample {
            response: keep.iter().map(|&i| full.response[i]).collect(),
            subject: keep.iter().map(|&i| full.subject[i]).collect(),
            n_subjects: 16,
            item: None,
            n_items: 0,
            covariates,
        };
        let spec = spec(ResponseFamily::LinearIdentity, RandomIntercepts::Subject);
        let err = fit(&spec, &sample, &FitConfig::default()).unwrap_err();
        assert!(matches!(err, InsufficientDataError::NoReplication { .. }));
    }

    #[test]
    fn test_zero_subject_variance_flags_singular_fit() {
        // Every subject has an identical response profile: item effects and
        // a residual pattern that sums to zero within every subject and
        // every item. The subject variance sits exactly at the boundary and
        // the caveat must be surfaced, not swallowed.
        #[expect(clippy::cast_precision_loss)]
        let sample = balanced_sample(12, 2, |s, _, _, _, item, _| {
            let residual = if (s + item) % 2 == 0 { 0.1 } else { -0.1 };
            3.0 + 0.1 * item as f64 + residual
        });
        let spec = spec(ResponseFamily::LinearIdentity, RandomIntercepts::SubjectAndItem);
        let model = fit(&spec, &sample, &FitConfig::default()).unwrap();
        assert!(
            model
                .warnings()
                .iter()
                .any(|w| matches!(w, FitWarning::SingularFit { grouping: "subject" })),
            "expected a singular-fit caveat, got {:?}",
            model.warnings()
        );
    }

    #[test]
    fn test_warnings_never_block_estimates() {
        let noise = Normal::new(0.0, 0.2).unwrap();
        let sample = balanced_sample(8, 2, |_, _, _, _, _, rng| 3.0 + noise.sample(rng));
        let spec = spec(ResponseFamily::LinearIdentity, RandomIntercepts::Subject);
        let model = fit(&spec, &sample, &FitConfig::default()).unwrap();
        assert_eq!(model.coefficients().len(), 5);
        for c in model.coefficients() {
            assert!(c.estimate.is_finite());
            assert!(c.std_error.is_finite());
        }
    }
}
