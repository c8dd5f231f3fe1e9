//! Beta-Bernoulli Thompson sampling for exploration scoring
//!
//! Each item's click-through rate is modeled as Beta(α₀ + clicks,
//! β₀ + impressions − clicks). Ranking by a posterior draw (or a UCB on
//! the posterior) gives under-observed items a chance to be shown in
//! proportion to their remaining uncertainty.

use rand_distr::{Beta, Distribution};

/// One posterior sample with its summary statistics
#[derive(Debug, Clone, PartialEq)]
pub struct ThompsonSample {
    /// CTR drawn from the posterior
    pub sampled_ctr: f64,
    /// Posterior mean α/(α+β)
    pub mean_ctr: f64,
    /// Posterior variance
    pub variance: f64,
    /// Bonus proportional to posterior standard deviation
    pub exploration_bonus: f64,
}

/// How the exploration score is derived from the posterior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExplorationStrategy {
    /// Deterministic upper confidence bound: mean + 2·σ, clamped to 1
    #[default]
    Ucb,
    /// A fresh random draw from the posterior
    ThompsonDraw,
}

/// Diagnostic tier by observation volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplorationTier {
    /// Fewer than 10 impressions
    Cold,
    /// Fewer than 100 impressions
    Warm,
    /// 100 impressions or more
    Hot,
}

impl ExplorationTier {
    /// Tier for an item with the given impression count
    pub fn from_impressions(impressions: i64) -> Self {
        if impressions < 10 {
            Self::Cold
        } else if impressions < 100 {
            Self::Warm
        } else {
            Self::Hot
        }
    }
}

/// Beta-Bernoulli Thompson sampler
#[derive(Debug, Clone)]
pub struct ThompsonSampler {
    prior_alpha: f64,
    prior_beta: f64,
    exploration_boost: f64,
}

impl Default for ThompsonSampler {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

impl ThompsonSampler {
    /// Create a sampler with the given Beta priors
    pub fn new(prior_alpha: f64, prior_beta: f64) -> Self {
        Self {
            prior_alpha,
            prior_beta,
            exploration_boost: 0.1,
        }
    }

    /// Override the exploration bonus multiplier
    pub fn with_exploration_boost(mut self, boost: f64) -> Self {
        self.exploration_boost = boost;
        self
    }

    /// Posterior Beta parameters for an item
    pub fn beta_parameters(&self, clicks: i64, impressions: i64) -> (f64, f64) {
        let alpha = self.prior_alpha + clicks.max(0) as f64;
        let beta = self.prior_beta + (impressions - clicks).max(0) as f64;
        (alpha, beta)
    }

    /// Draw a sample from the posterior and summarize it
    pub fn sample(&self, clicks: i64, impressions: i64) -> ThompsonSample {
        let (alpha, beta) = self.beta_parameters(clicks, impressions);
        let (mean_ctr, variance) = posterior_moments(alpha, beta);

        // alpha/beta >= prior > 0, so the distribution is well-formed
        let sampled_ctr = Beta::new(alpha, beta)
            .map(|dist| dist.sample(&mut rand::thread_rng()))
            .unwrap_or(mean_ctr);

        ThompsonSample {
            sampled_ctr,
            mean_ctr,
            variance,
            exploration_bonus: self.exploration_boost * variance.sqrt(),
        }
    }

    /// Exploration score for composite ranking
    pub fn exploration_score(
        &self,
        clicks: i64,
        impressions: i64,
        strategy: ExplorationStrategy,
    ) -> f64 {
        let (alpha, beta) = self.beta_parameters(clicks, impressions);

        match strategy {
            ExplorationStrategy::Ucb => {
                let (mean, variance) = posterior_moments(alpha, beta);
                (mean + 2.0 * variance.sqrt()).min(1.0)
            }
            ExplorationStrategy::ThompsonDraw => Beta::new(alpha, beta)
                .map(|dist| dist.sample(&mut rand::thread_rng()))
                .unwrap_or_else(|_| posterior_moments(alpha, beta).0),
        }
    }
}

/// Mean and variance of Beta(alpha, beta)
fn posterior_moments(alpha: f64, beta: f64) -> (f64, f64) {
    let total = alpha + beta;
    let mean = alpha / total;
    let variance = (alpha * beta) / (total * total * (total + 1.0));
    (mean, variance)
}
