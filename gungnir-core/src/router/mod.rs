//! Venue selection
//!
//! Scores eligible venues on observed execution quality and picks the best
//! one deterministically. Scoring inputs are exponential moving averages fed
//! by execution results, so the router adapts as venues degrade or recover
//! without any per-order state.

use crate::core::errors::{reason, ExecutionError};
use crate::core::types::VenueId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// EMA smoothing for venue quality metrics
const METRIC_ALPHA: f64 = 0.2;

/// Relative importance of each scoring input, normalized at load time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterWeights {
    pub fill_rate: f64,
    pub latency: f64,
    pub price_improvement: f64,
    pub cost: f64,
}

impl Default for RouterWeights {
    fn default() -> Self {
        Self {
            fill_rate: 0.4,
            latency: 0.2,
            price_improvement: 0.25,
            cost: 0.15,
        }
    }
}

/// Observed quality of one venue
///
/// All values are EMAs except `fee_rate`, which is static per venue.
#[derive(Debug, Clone)]
pub struct VenueStats {
    /// Fraction of routed orders that filled, 0..=1
    pub fill_rate: f64,
    pub latency_ms: f64,
    /// Execution price improvement versus the reference quote, in basis
    /// points; negative means slippage
    pub improvement_bps: f64,
    /// Fee in basis points of notional
    pub fee_bps: f64,
    samples: u64,
}

/// Outcome of one routed order, fed back into the EMAs
#[derive(Debug, Clone)]
pub struct RouteResult {
    pub filled: bool,
    pub latency: Duration,
    /// Basis points versus the reference quote at routing time, if known
    pub improvement_bps: Option<f64>,
}

/// Where an order should go, and whether the choice was fully informed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    pub venue: VenueId,
    /// True when scoring data was missing and the router fell back to the
    /// first eligible venue
    pub degraded: bool,
}

pub struct SmartRouter {
    weights: RouterWeights,
    stats: DashMap<VenueId, VenueStats>,
}

impl SmartRouter {
    pub fn new(weights: RouterWeights) -> Self {
        Self {
            weights,
            stats: DashMap::new(),
        }
    }

    /// Register a venue with its fee schedule; stats start empty
    pub fn register_venue(&self, venue: VenueId, fee_bps: f64) {
        self.stats.insert(
            venue,
            VenueStats {
                fill_rate: 0.0,
                latency_ms: 0.0,
                improvement_bps: 0.0,
                fee_bps,
                samples: 0,
            },
        );
    }

    /// Pick a venue from the eligible set
    ///
    /// Deterministic: the same stats and the same eligible list always give
    /// the same decision. Ties resolve to the earliest eligible venue.
    pub fn route(&self, eligible: &[VenueId]) -> Result<RoutingDecision, ExecutionError> {
        let first = eligible.first().ok_or_else(|| {
            ExecutionError::validation(reason::VENUE_UNAVAILABLE, "no eligible venues")
        })?;

        // Single venue: nothing to score
        if eligible.len() == 1 {
            return Ok(RoutingDecision {
                venue: first.clone(),
                degraded: false,
            });
        }

        // Scoring needs at least one observation for every eligible venue
        let mut snapshots = Vec::with_capacity(eligible.len());
        for venue in eligible {
            match self.stats.get(venue) {
                Some(s) if s.samples > 0 => snapshots.push((venue.clone(), s.clone())),
                _ => {
                    warn!(venue = %venue, "routing degraded: no execution data for venue");
                    return Ok(RoutingDecision {
                        venue: first.clone(),
                        degraded: true,
                    });
                }
            }
        }

        let max_latency = snapshots
            .iter()
            .map(|(_, s)| s.latency_ms)
            .fold(1.0f64, f64::max);

        let mut best: Option<(VenueId, f64)> = None;
        for (venue, stats) in &snapshots {
            let score = self.score(stats, max_latency);
            debug!(venue = %venue, score, "venue scored");
            // Strictly-greater keeps the earliest venue on ties
            let better = match &best {
                Some((_, top)) => score > *top,
                None => true,
            };
            if better {
                best = Some((venue.clone(), score));
            }
        }

        // snapshots is non-empty, so best is always set
        let (venue, _) = best.ok_or_else(|| {
            ExecutionError::validation(reason::VENUE_UNAVAILABLE, "no scorable venues")
        })?;
        Ok(RoutingDecision {
            venue,
            degraded: false,
        })
    }

    /// Fold one execution result into the venue's EMAs
    pub fn record_result(&self, venue: &VenueId, result: &RouteResult) {
        let Some(mut stats) = self.stats.get_mut(venue) else {
            return;
        };
        let filled = if result.filled { 1.0 } else { 0.0 };
        let latency_ms = result.latency.as_secs_f64() * 1000.0;

        if stats.samples == 0 {
            stats.fill_rate = filled;
            stats.latency_ms = latency_ms;
            stats.improvement_bps = result.improvement_bps.unwrap_or(0.0);
        } else {
            stats.fill_rate = ema(stats.fill_rate, filled);
            stats.latency_ms = ema(stats.latency_ms, latency_ms);
            if let Some(bps) = result.improvement_bps {
                stats.improvement_bps = ema(stats.improvement_bps, bps);
            }
        }
        stats.samples += 1;
    }

    pub fn stats_for(&self, venue: &VenueId) -> Option<VenueStats> {
        self.stats.get(venue).map(|s| s.clone())
    }

    fn score(&self, stats: &VenueStats, max_latency: f64) -> f64 {
        let w = &self.weights;
        // Latency and cost hurt; fill rate and improvement help. Latency is
        // normalized against the slowest eligible venue, improvement and
        // cost against a 10bps scale.
        w.fill_rate * stats.fill_rate - w.latency * (stats.latency_ms / max_latency)
            + w.price_improvement * (stats.improvement_bps / 10.0)
            - w.cost * (stats.fee_bps / 10.0)
    }
}

fn ema(previous: f64, sample: f64) -> f64 {
    METRIC_ALPHA * sample + (1.0 - METRIC_ALPHA) * previous
}
