//! Combinatorial search over indicator subsets.
//!
//! A [`Sampler`] proposes an include/exclude choice per indicator. The
//! [`SearchDriver`] turns each proposal into a net signal, simulates and
//! scores it, and accepts the subset only if its `pnl_sum` clears the floor.
//! Empty and already-tried subsets are discarded without simulating.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use super::aggregate::{aggregate, merge_onto_bars, SignalFrame};
use super::error::CombotraderError;
use super::ledger::Ledger;
use super::metrics::{score, BarFrequency, MetricsRecord};
use super::ohlcv::Bar;
use super::simulator::{simulate, SimulationParams};

/// The universe of indicator names a sampler chooses from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSpace {
    indicators: Vec<String>,
}

impl SearchSpace {
    /// Duplicate names are dropped, first occurrence wins.
    pub fn new<I, S>(indicators: I) -> Result<Self, CombotraderError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let indicators: Vec<String> = indicators
            .into_iter()
            .map(Into::into)
            .filter(|name| seen.insert(name.clone()))
            .collect();
        if indicators.is_empty() {
            return Err(CombotraderError::EmptyUniverse);
        }
        Ok(SearchSpace { indicators })
    }

    pub fn indicators(&self) -> &[String] {
        &self.indicators
    }

    pub fn len(&self) -> usize {
        self.indicators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty()
    }
}

/// One proposal: an include flag per indicator in the space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    mask: Vec<bool>,
    indicators: Vec<String>,
}

impl Candidate {
    pub fn from_mask(space: &SearchSpace, mask: Vec<bool>) -> Self {
        let indicators = space
            .indicators()
            .iter()
            .zip(&mask)
            .filter(|(_, included)| **included)
            .map(|(name, _)| name.clone())
            .collect();
        Candidate { mask, indicators }
    }

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    /// Selected names, in search-space order.
    pub fn indicators(&self) -> &[String] {
        &self.indicators
    }

    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty()
    }

    /// Order-independent identity used for deduplication.
    pub fn canonical_key(&self) -> Vec<String> {
        canonical_key(&self.indicators)
    }
}

pub fn canonical_key<S: AsRef<str>>(indicators: &[S]) -> Vec<String> {
    indicators
        .iter()
        .map(|s| s.as_ref().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Proposal strategy used by the driver.
pub trait Sampler {
    fn propose(&mut self, space: &SearchSpace) -> Candidate;

    /// Feedback for the last proposal. Discarded and rejected rounds score 0.
    fn record(&mut self, candidate: &Candidate, score: f64);
}

impl<S: Sampler + ?Sized> Sampler for Box<S> {
    fn propose(&mut self, space: &SearchSpace) -> Candidate {
        (**self).propose(space)
    }

    fn record(&mut self, candidate: &Candidate, score: f64) {
        (**self).record(candidate, score)
    }
}

/// Independent fair coin per indicator.
#[derive(Debug, Clone)]
pub struct RandomSampler {
    rng: StdRng,
}

impl RandomSampler {
    pub fn new(seed: u64) -> Self {
        RandomSampler {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Sampler for RandomSampler {
    fn propose(&mut self, space: &SearchSpace) -> Candidate {
        let mask = (0..space.len()).map(|_| self.rng.gen_bool(0.5)).collect();
        Candidate::from_mask(space, mask)
    }

    fn record(&mut self, _candidate: &Candidate, _score: f64) {}
}

/// Walks non-empty subsets in binary-counter order, starting at an offset.
/// Spaces wider than 64 indicators only vary the first 64.
#[derive(Debug, Clone)]
pub struct GridSampler {
    cursor: u64,
}

impl GridSampler {
    pub fn starting_at(offset: u64) -> Self {
        GridSampler { cursor: offset }
    }
}

impl Sampler for GridSampler {
    fn propose(&mut self, space: &SearchSpace) -> Candidate {
        let n = space.len();
        if n == 0 {
            return Candidate::from_mask(space, Vec::new());
        }
        let non_empty = if n >= 64 { u64::MAX } else { (1u64 << n) - 1 };
        let bits = self.cursor % non_empty + 1;
        self.cursor = self.cursor.wrapping_add(1);
        let mask = (0..n).map(|i| i < 64 && (bits >> i) & 1 == 1).collect();
        Candidate::from_mask(space, mask)
    }

    fn record(&mut self, _candidate: &Candidate, _score: f64) {}
}

/// Tree-structured estimator over independent include/exclude choices.
///
/// After `startup_trials` random proposals, observed rounds are split into
/// the best `gamma` fraction and the rest. Each indicator is then included
/// with probability proportional to how much more often it appears in the
/// good group than in the bad group (Laplace-smoothed), clamped so every
/// choice keeps some chance.
#[derive(Debug, Clone)]
pub struct AdaptiveSampler {
    rng: StdRng,
    startup_trials: usize,
    gamma: f64,
    history: Vec<(Vec<bool>, f64)>,
}

const MIN_INCLUSION: f64 = 0.05;
const MAX_INCLUSION: f64 = 0.95;

impl AdaptiveSampler {
    pub fn new(seed: u64) -> Self {
        AdaptiveSampler {
            rng: StdRng::seed_from_u64(seed),
            startup_trials: 10,
            gamma: 0.25,
            history: Vec::new(),
        }
    }

    pub fn with_startup_trials(mut self, startup_trials: usize) -> Self {
        self.startup_trials = startup_trials;
        self
    }

    pub fn observations(&self) -> usize {
        self.history.len()
    }

    /// Inclusion probability for indicator `index`.
    pub fn inclusion_probability(&self, index: usize) -> f64 {
        if self.history.len() < self.startup_trials.max(2) {
            return 0.5;
        }

        let mut ranked: Vec<&(Vec<bool>, f64)> = self.history.iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        let n_good = ((ranked.len() as f64 * self.gamma).ceil() as usize).clamp(1, ranked.len() - 1);
        let (good, bad) = ranked.split_at(n_good);

        let included = |group: &[&(Vec<bool>, f64)]| {
            group
                .iter()
                .filter(|(mask, _)| mask.get(index).copied().unwrap_or(false))
                .count() as f64
        };
        let good_incl = (included(good) + 1.0) / (good.len() as f64 + 2.0);
        let bad_incl = (included(bad) + 1.0) / (bad.len() as f64 + 2.0);

        let ratio_incl = good_incl / bad_incl;
        let ratio_excl = (1.0 - good_incl) / (1.0 - bad_incl);
        (ratio_incl / (ratio_incl + ratio_excl)).clamp(MIN_INCLUSION, MAX_INCLUSION)
    }
}

impl Sampler for AdaptiveSampler {
    fn propose(&mut self, space: &SearchSpace) -> Candidate {
        let probabilities: Vec<f64> = (0..space.len())
            .map(|i| self.inclusion_probability(i))
            .collect();
        let mask = probabilities
            .into_iter()
            .map(|p| self.rng.gen_bool(p))
            .collect();
        Candidate::from_mask(space, mask)
    }

    fn record(&mut self, candidate: &Candidate, score: f64) {
        self.history.push((candidate.mask().to_vec(), score));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplerKind {
    #[default]
    Random,
    Grid,
    Adaptive,
}

impl SamplerKind {
    pub fn build(self, seed: u64) -> Box<dyn Sampler> {
        match self {
            SamplerKind::Random => Box::new(RandomSampler::new(seed)),
            SamplerKind::Grid => Box::new(GridSampler::starting_at(seed)),
            SamplerKind::Adaptive => Box::new(AdaptiveSampler::new(seed)),
        }
    }
}

impl FromStr for SamplerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "random" => Ok(SamplerKind::Random),
            "grid" => Ok(SamplerKind::Grid),
            "adaptive" | "tpe" => Ok(SamplerKind::Adaptive),
            other => Err(format!(
                "unknown sampler '{other}' (expected random, grid or adaptive)"
            )),
        }
    }
}

impl fmt::Display for SamplerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplerKind::Random => f.write_str("random"),
            SamplerKind::Grid => f.write_str("grid"),
            SamplerKind::Adaptive => f.write_str("adaptive"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    /// Candidates with a lower `pnl_sum` are rejected.
    pub min_pnl_sum: f64,
    pub frequency: BarFrequency,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            min_pnl_sum: 100.0,
            frequency: BarFrequency::Hour,
        }
    }
}

/// An evaluated round. Rejected rounds score 0 but keep their metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchTrial {
    pub indicators: Vec<String>,
    pub score: f64,
    pub accepted: bool,
    pub metrics: MetricsRecord,
}

/// A candidate that cleared the floor, with everything needed to persist it.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedCandidate {
    pub indicators: Vec<String>,
    pub score: f64,
    pub metrics: MetricsRecord,
    pub ledger: Ledger,
}

/// One search session: a sampler plus the set of subsets already tried.
///
/// `propose` takes `&mut self`; share a driver across threads only behind a
/// `Mutex`. Independent drivers share nothing.
pub struct SearchDriver<'a, S> {
    bars: &'a [Bar],
    frame: &'a SignalFrame,
    space: SearchSpace,
    params: SimulationParams,
    config: SearchConfig,
    sampler: S,
    tried: HashSet<Vec<String>>,
    trials: Vec<SearchTrial>,
}

impl<'a, S: Sampler> SearchDriver<'a, S> {
    pub fn new(
        bars: &'a [Bar],
        frame: &'a SignalFrame,
        space: SearchSpace,
        params: SimulationParams,
        config: SearchConfig,
        sampler: S,
    ) -> Result<Self, CombotraderError> {
        params.validate()?;
        if let Some(missing) = space.indicators().iter().find(|name| !frame.contains(name)) {
            return Err(CombotraderError::UnknownIndicator {
                name: missing.clone(),
            });
        }
        Ok(SearchDriver {
            bars,
            frame,
            space,
            params,
            config,
            sampler,
            tried: HashSet::new(),
            trials: Vec::new(),
        })
    }

    /// Aggregate, align, simulate and score one subset. Does not touch
    /// session state.
    pub fn evaluate<N: AsRef<str>>(
        &self,
        indicators: &[N],
    ) -> Result<(Ledger, MetricsRecord), CombotraderError> {
        let net = aggregate(self.frame, indicators)?;
        let aligned = merge_onto_bars(self.bars, self.frame.datetimes(), &net);
        let ledger = simulate(self.bars, &aligned, &self.params)?;
        let metrics = score(&ledger, self.config.frequency.periods_per_year());
        Ok((ledger, metrics))
    }

    /// Run exactly one proposal round.
    ///
    /// Returns `Ok(None)` when the proposal is empty, was already tried in
    /// this session, or scores below the floor.
    pub fn propose(&mut self) -> Result<Option<AcceptedCandidate>, CombotraderError> {
        let candidate = self.sampler.propose(&self.space);

        if candidate.is_empty() {
            tracing::debug!("discarding empty subset");
            self.sampler.record(&candidate, 0.0);
            return Ok(None);
        }
        let key = candidate.canonical_key();
        if self.tried.contains(&key) {
            tracing::debug!(indicators = ?candidate.indicators(), "discarding repeated subset");
            self.sampler.record(&candidate, 0.0);
            return Ok(None);
        }

        // marked tried only after a successful evaluation
        let (ledger, metrics) = self.evaluate(candidate.indicators())?;
        self.tried.insert(key);
        let indicators = candidate.indicators().to_vec();

        if metrics.pnl_sum < self.config.min_pnl_sum {
            tracing::debug!(
                indicators = ?indicators,
                pnl_sum = metrics.pnl_sum,
                floor = self.config.min_pnl_sum,
                "subset below pnl floor"
            );
            self.sampler.record(&candidate, 0.0);
            self.trials.push(SearchTrial {
                indicators,
                score: 0.0,
                accepted: false,
                metrics,
            });
            return Ok(None);
        }

        let score = metrics.pnl_sum;
        tracing::info!(
            indicators = ?indicators,
            pnl_sum = metrics.pnl_sum,
            final_balance = metrics.final_balance,
            "accepted subset"
        );
        self.sampler.record(&candidate, score);
        self.trials.push(SearchTrial {
            indicators: indicators.clone(),
            score,
            accepted: true,
            metrics: metrics.clone(),
        });
        Ok(Some(AcceptedCandidate {
            indicators,
            score,
            metrics,
            ledger,
        }))
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    pub fn sampler(&self) -> &S {
        &self.sampler
    }

    /// Evaluated rounds, accepted and rejected, in order.
    pub fn trials(&self) -> &[SearchTrial] {
        &self.trials
    }

    pub fn accepted(&self) -> impl Iterator<Item = &SearchTrial> {
        self.trials.iter().filter(|t| t.accepted)
    }

    pub fn tried_count(&self) -> usize {
        self.tried.len()
    }

    pub fn has_tried<N: AsRef<str>>(&self, indicators: &[N]) -> bool {
        self.tried.contains(&canonical_key(indicators))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub sessions: usize,
    pub rounds_per_session: usize,
    /// Session `k` (1-based) seeds its sampler with `base_seed + k`.
    pub base_seed: u64,
    pub parallel: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            sessions: 5,
            rounds_per_session: 1,
            base_seed: 42,
            parallel: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    /// 1-based session number.
    pub session: usize,
    pub seed: u64,
    pub accepted: Vec<AcceptedCandidate>,
    pub trials: Vec<SearchTrial>,
}

/// Inputs shared read-only by every session.
#[derive(Debug, Clone, Copy)]
pub struct SearchInputs<'a> {
    pub bars: &'a [Bar],
    pub frame: &'a SignalFrame,
    pub space: &'a SearchSpace,
    pub params: &'a SimulationParams,
    pub config: &'a SearchConfig,
}

/// Run independent sessions, each with a fresh driver and its own sampler.
/// Outcomes come back in session order whether or not they ran in parallel.
pub fn run_sessions<S, F>(
    inputs: SearchInputs<'_>,
    sessions: &SessionConfig,
    make_sampler: F,
) -> Result<Vec<SessionOutcome>, CombotraderError>
where
    S: Sampler,
    F: Fn(u64) -> S + Sync,
{
    let run_one = |session: usize| -> Result<SessionOutcome, CombotraderError> {
        let seed = sessions.base_seed.wrapping_add(session as u64);
        let mut driver = SearchDriver::new(
            inputs.bars,
            inputs.frame,
            inputs.space.clone(),
            inputs.params.clone(),
            inputs.config.clone(),
            make_sampler(seed),
        )?;

        let mut accepted = Vec::new();
        for _ in 0..sessions.rounds_per_session {
            if let Some(candidate) = driver.propose()? {
                accepted.push(candidate);
            }
        }
        tracing::info!(
            session,
            seed,
            evaluated = driver.trials().len(),
            accepted = accepted.len(),
            "search session finished"
        );
        Ok(SessionOutcome {
            session,
            seed,
            accepted,
            trials: driver.trials().to_vec(),
        })
    };

    if sessions.parallel {
        (1..=sessions.sessions)
            .into_par_iter()
            .map(run_one)
            .collect()
    } else {
        (1..=sessions.sessions).map(run_one).collect()
    }
}
