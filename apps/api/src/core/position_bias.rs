//! Position bias correction using Inverse Propensity Weighting (IPW)
//!
//! Items shown lower in a result list are clicked less regardless of
//! quality. Each observed click is reweighted by the inverse of the
//! propensity of its display position, so an item clicked at position 8
//! earns more popularity credit than one clicked at position 1.

use std::collections::HashMap;

/// Propensity table observed in typical search click logs, relative to
/// position 1.
pub const DEFAULT_PROPENSITIES: [(u32, f64); 20] = [
    (1, 1.00),
    (2, 0.70),
    (3, 0.50),
    (4, 0.35),
    (5, 0.25),
    (6, 0.18),
    (7, 0.13),
    (8, 0.10),
    (9, 0.08),
    (10, 0.06),
    (11, 0.05),
    (12, 0.04),
    (13, 0.035),
    (14, 0.03),
    (15, 0.025),
    (16, 0.02),
    (17, 0.018),
    (18, 0.016),
    (19, 0.014),
    (20, 0.012),
];

/// Floor applied when a propensity is used as a divisor in the
/// aggregate path
const AGGREGATE_PROPENSITY_FLOOR: f64 = 0.01;

/// Floor applied when computing per-event IPW weights
const WEIGHT_PROPENSITY_FLOOR: f64 = 1e-6;

/// Debiased engagement metrics for one item, from per-event data
#[derive(Debug, Clone, PartialEq)]
pub struct DebiasedMetrics {
    /// Raw click count
    pub raw_clicks: u64,
    /// Raw impression count
    pub raw_impressions: u64,
    /// Sum of IPW weights over clicked impressions
    pub debiased_clicks: f64,
    /// IPW-weighted click-through rate, clamped to [0, 1]
    pub debiased_ctr: f64,
    /// Mean display position over all impressions
    pub average_position: f64,
    /// Confidence in the estimate, roughly sqrt(n)/10 capped at 1
    pub confidence: f64,
}

/// IPW-based position bias corrector
#[derive(Debug, Clone)]
pub struct PositionBiasCorrector {
    propensities: HashMap<u32, f64>,
    default_propensity: f64,
    max_ipw_weight: f64,
}

impl Default for PositionBiasCorrector {
    fn default() -> Self {
        Self::new(DEFAULT_PROPENSITIES.iter().copied().collect(), 0.01)
    }
}

impl PositionBiasCorrector {
    /// Create a corrector from a propensity table and a floor for
    /// positions absent from it
    pub fn new(propensities: HashMap<u32, f64>, default_propensity: f64) -> Self {
        Self {
            propensities,
            default_propensity,
            max_ipw_weight: 20.0,
        }
    }

    /// Override the IPW weight cap
    pub fn with_max_weight(mut self, max_ipw_weight: f64) -> Self {
        self.max_ipw_weight = max_ipw_weight;
        self
    }

    /// Propensity of a click being observed at `position`
    pub fn propensity(&self, position: u32) -> f64 {
        self.propensities
            .get(&position)
            .copied()
            .unwrap_or(self.default_propensity)
    }

    /// IPW weight for a click observed at `position`, capped so rare
    /// positions cannot dominate the estimate
    pub fn ipw_weight(&self, position: u32) -> f64 {
        let propensity = self.propensity(position).max(WEIGHT_PROPENSITY_FLOOR);
        (1.0 / propensity).min(self.max_ipw_weight)
    }

    /// Weighted contribution of one event: the IPW weight when clicked,
    /// zero otherwise
    pub fn debias_click(&self, clicked: bool, position: u32) -> f64 {
        if clicked {
            self.ipw_weight(position)
        } else {
            0.0
        }
    }

    /// Debiased CTR from per-event `(position, clicked)` pairs
    ///
    /// The precise offline path: each impression contributes its IPW
    /// weight to the denominator, each click its weight to the
    /// numerator.
    pub fn debiased_ctr(&self, events: &[(u32, bool)]) -> DebiasedMetrics {
        if events.is_empty() {
            return DebiasedMetrics {
                raw_clicks: 0,
                raw_impressions: 0,
                debiased_clicks: 0.0,
                debiased_ctr: 0.5,
                average_position: 0.0,
                confidence: 0.0,
            };
        }

        let raw_clicks = events.iter().filter(|(_, clicked)| *clicked).count() as u64;
        let raw_impressions = events.len() as u64;

        let debiased_clicks: f64 = events
            .iter()
            .map(|&(position, clicked)| self.debias_click(clicked, position))
            .sum();
        let total_weight: f64 = events
            .iter()
            .map(|&(position, _)| self.ipw_weight(position))
            .sum();

        let debiased_ctr = debiased_clicks / total_weight.max(WEIGHT_PROPENSITY_FLOOR);
        let average_position =
            events.iter().map(|&(p, _)| f64::from(p)).sum::<f64>() / raw_impressions as f64;
        let confidence = ((raw_impressions as f64).sqrt() / 10.0).min(1.0);

        DebiasedMetrics {
            raw_clicks,
            raw_impressions,
            debiased_clicks,
            debiased_ctr: debiased_ctr.min(1.0),
            average_position,
            confidence,
        }
    }

    /// Cheap debiased CTR from aggregate counters
    ///
    /// The online path: divides raw CTR by the propensity of the
    /// rounded average position. Returns 0.5 (the prior midpoint) with
    /// no impressions. Positions outside the table fall through to the
    /// default floor, which can briefly inflate the estimate for items
    /// shown only in very deep positions.
    pub fn simplified_debiased_ctr(
        &self,
        clicks: i64,
        impressions: i64,
        position_sum: i64,
    ) -> f64 {
        if impressions <= 0 {
            return 0.5;
        }

        let avg_position = (position_sum as f64 / impressions as f64).round().max(0.0) as u32;
        let avg_propensity = self.propensity(avg_position).max(AGGREGATE_PROPENSITY_FLOOR);
        let raw_ctr = clicks as f64 / impressions as f64;

        (raw_ctr / avg_propensity).min(1.0)
    }
}

/// Click and impression counts at one display position
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionCounts {
    /// Clicks observed at the position
    pub clicks: i64,
    /// Impressions observed at the position
    pub impressions: i64,
}

/// Calibrate a propensity table from a per-position click distribution
///
/// `propensity[pos] = ctr[pos] / ctr[1]`. When position 1 has no
/// observed clicks the previous table is retained unchanged.
pub fn calibrate_propensities(
    distribution: &HashMap<u32, PositionCounts>,
    previous: &HashMap<u32, f64>,
) -> HashMap<u32, f64> {
    let ctr = |counts: &PositionCounts| -> f64 {
        if counts.impressions > 0 {
            counts.clicks as f64 / counts.impressions as f64
        } else {
            0.0
        }
    };

    let base_ctr = distribution.get(&1).map(ctr).unwrap_or(0.0);
    if base_ctr <= 0.0 {
        return previous.clone();
    }

    distribution
        .iter()
        .map(|(&position, counts)| (position, ctr(counts) / base_ctr))
        .collect()
}
