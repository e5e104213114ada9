//! The consensus algorithm.

use crate::config::FusionConfig;
use nimbus_common::{
    ConditionCode, ConsensusReading, MetricSpreads, NimbusError, Observation, ReadingStatus,
    Result,
};
use std::collections::{BTreeSet, HashMap};

/// Reconciles disagreeing observations of one location into a single reading.
///
/// Pure: the same inputs always give the same reading.
#[derive(Debug, Clone, Default)]
pub struct ConsensusFuser {
    config: FusionConfig,
}

impl ConsensusFuser {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Fuse observations into a [`ConsensusReading`].
    ///
    /// The first observation fixes the location; observations for any other
    /// location are excluded. `weights` maps `source_id` to a relative weight;
    /// missing, non-finite or non-positive weights count as 1.0.
    pub fn fuse(
        &self,
        observations: &[Observation],
        weights: Option<&HashMap<String, f64>>,
    ) -> Result<ConsensusReading> {
        let Some(first) = observations.first() else {
            return Err(NimbusError::InsufficientData(
                "no observations to fuse".into(),
            ));
        };

        let relevant: Vec<&Observation> = observations
            .iter()
            .filter(|o| o.location == first.location)
            .collect();

        if relevant.len() == 1 {
            return Ok(self.single(first));
        }

        // Sum in a canonical order so the mean does not depend on input order.
        let mut canonical = relevant.clone();
        canonical.sort_by(|a, b| {
            a.source_id
                .cmp(&b.source_id)
                .then(a.temperature.total_cmp(&b.temperature))
                .then(a.wind_speed.total_cmp(&b.wind_speed))
                .then(a.humidity.total_cmp(&b.humidity))
        });

        let weight_of = |o: &Observation| -> f64 {
            weights
                .and_then(|w| w.get(&o.source_id))
                .copied()
                .filter(|w| w.is_finite() && *w > 0.0)
                .unwrap_or(1.0)
        };

        let temperature = weighted_mean(&canonical, weight_of, |o| o.temperature);
        let wind_speed = weighted_mean(&canonical, weight_of, |o| o.wind_speed);
        let humidity = weighted_mean(&canonical, weight_of, |o| o.humidity);

        let spreads = MetricSpreads {
            temperature: range(&canonical, |o| o.temperature),
            wind_speed: range(&canonical, |o| o.wind_speed),
            humidity: range(&canonical, |o| o.humidity),
        };
        let spread = spreads.temperature.max(spreads.wind_speed);

        // Mode uses supplied order for ties.
        let (condition, agreement) = mode(&relevant);

        // Anchor on the strongest source so an extra agreeing source never
        // lowers the score below what that source would get alone.
        let source_confidence = relevant
            .iter()
            .map(|o| self.source_confidence(o))
            .fold(0.0, f64::max);

        let confidence_score =
            self.score(relevant.len(), spread, agreement, source_confidence);

        Ok(ConsensusReading {
            location: first.location.clone(),
            timestamp: relevant
                .iter()
                .map(|o| o.timestamp)
                .max()
                .unwrap_or(first.timestamp),
            temperature,
            condition,
            wind_speed,
            humidity,
            confidence_score,
            contributing_sources: relevant.iter().map(|o| o.source_id.clone()).collect(),
            spread,
            spreads,
            status: ReadingStatus::Consensus,
        })
    }

    /// The confidence a lone observation would get.
    fn source_confidence(&self, observation: &Observation) -> f64 {
        observation
            .raw_confidence
            .filter(|c| c.is_finite())
            .unwrap_or(self.config.baseline_confidence)
            .clamp(self.config.min_confidence, 1.0)
    }

    fn single(&self, observation: &Observation) -> ConsensusReading {
        let confidence = self.source_confidence(observation);

        ConsensusReading {
            location: observation.location.clone(),
            timestamp: observation.timestamp,
            temperature: observation.temperature,
            condition: observation.condition_code,
            wind_speed: observation.wind_speed,
            humidity: observation.humidity,
            confidence_score: confidence,
            contributing_sources: BTreeSet::from([observation.source_id.clone()]),
            spread: 0.0,
            spreads: MetricSpreads::default(),
            status: ReadingStatus::SingleSource,
        }
    }

    /// Confidence for `count >= 2` sources, where `source_confidence` is the
    /// best confidence any one of them would get alone.
    ///
    /// Non-increasing in `spread`, non-decreasing in `count`, and strictly
    /// below `low_confidence_threshold` once `spread` exceeds
    /// `max_reasonable_spread`.
    pub fn score(&self, count: usize, spread: f64, agreement: f64, source_confidence: f64) -> f64 {
        let c = &self.config;
        let source_confidence = if source_confidence.is_finite() { source_confidence } else { 0.0 };
        let anchor = c.base_confidence.max(source_confidence);
        let mut numeric = (anchor + c.source_bonus * (count.max(1) as f64).ln()
            - c.spread_penalty * spread)
            .clamp(0.0, 1.0);

        if spread > c.max_reasonable_spread {
            numeric = numeric.min(c.low_confidence_threshold * c.max_reasonable_spread / spread);
        }

        let categorical = 1.0 - c.condition_penalty * (1.0 - agreement.clamp(0.0, 1.0));

        (numeric * categorical).clamp(c.min_confidence, 1.0)
    }
}

fn weighted_mean(
    observations: &[&Observation],
    weight_of: impl Fn(&Observation) -> f64,
    value: impl Fn(&Observation) -> f64,
) -> f64 {
    let (sum, total) = observations.iter().fold((0.0, 0.0), |(sum, total), o| {
        let w = weight_of(o);
        (sum + w * value(o), total + w)
    });
    sum / total
}

/// Maximum pairwise absolute difference, which is max minus min.
fn range(observations: &[&Observation], value: impl Fn(&Observation) -> f64) -> f64 {
    let (lo, hi) = observations
        .iter()
        .map(|o| value(o))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if hi >= lo { hi - lo } else { 0.0 }
}

/// Most frequent condition and the share of sources reporting it.
/// Ties go to the value that appeared first.
fn mode(observations: &[&Observation]) -> (ConditionCode, f64) {
    let mut counts: Vec<(ConditionCode, usize)> = Vec::new();
    for o in observations {
        match counts.iter_mut().find(|(c, _)| *c == o.condition_code) {
            Some((_, n)) => *n += 1,
            None => counts.push((o.condition_code, 1)),
        }
    }

    let mut best = (ConditionCode::Unknown, 0usize);
    for (code, n) in counts {
        if n > best.1 {
            best = (code, n);
        }
    }
    (best.0, best.1 as f64 / observations.len().max(1) as f64)
}
