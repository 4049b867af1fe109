//! Bayesian skill ratings for matches between arbitrarily structured teams.
//!
//! Each player carries a Gaussian [`Rating`] over their latent skill. Feeding
//! an observed match outcome — any number of teams, unequal sizes, ties,
//! partial play — through [`TrueSkill::rate`] compiles the match into a
//! factor graph, runs expectation propagation over it, and returns posterior
//! ratings in the same team shape. [`TrueSkill::quality`] gives the
//! draw probability of a prospective match-up, the usual matchmaking
//! criterion.
//!
//! Head-to-head:
//!
//! ```
//! use skillgraph::{Rating, TrueSkill};
//!
//! let env = TrueSkill::default();
//! let (alice, bob) = env.rate_1vs1(Rating::default(), Rating::default(), false)?;
//! assert!(alice.mu() > bob.mu());
//! assert!(alice.sigma() < Rating::default().sigma());
//! # Ok::<(), skillgraph::Error>(())
//! ```
//!
//! A free-for-all with a tie for second place; lower rank is better:
//!
//! ```
//! use skillgraph::{Rating, TrueSkill};
//!
//! let env = TrueSkill::default();
//! let teams = vec![
//!     vec![Rating::default(), Rating::default()],
//!     vec![Rating::new(29.0, 7.0)],
//!     vec![Rating::default()],
//! ];
//! let rated = env.rate(&teams, Some(&[1, 0, 1]), None, None)?;
//! assert_eq!(rated.len(), 3);
//! assert_eq!(rated[0].len(), 2);
//! # Ok::<(), skillgraph::Error>(())
//! ```
//!
//! The module-level [`rate`], [`quality`] and friends use a process-wide
//! default environment, replaceable with [`setup`].

mod backend;
mod error;
mod factor;
mod gaussian;
mod graph;
mod matchmaking;
mod matrix;
mod rating;
mod update;

pub use backend::Backend;
pub use error::Error;
pub use rating::Rating;
pub use update::Weights;

use std::collections::BTreeMap;
use std::sync::RwLock;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default initial mean.
pub const MU: f64 = 25.0;
/// Default initial standard deviation.
pub const SIGMA: f64 = MU / 3.0;
/// Default performance noise.
pub const BETA: f64 = SIGMA / 2.0;
/// Default between-match dynamics.
pub const TAU: f64 = SIGMA / 100.0;
/// Default chance of a draw in the underlying match model.
pub const DRAW_PROBABILITY: f64 = 0.1;
/// Default convergence tolerance for message passing.
pub const MIN_DELTA: f64 = 1e-4;

/// Immutable bundle of the rating-model parameters and the special-function
/// backend. Cheap to copy; every operation hangs off one of these.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrueSkill {
    mu: f64,
    sigma: f64,
    beta: f64,
    tau: f64,
    draw_probability: f64,
    backend: Backend,
}

impl Eq for TrueSkill {}

impl TrueSkill {
    #[inline]
    pub const fn new(mu: f64, sigma: f64, beta: f64, tau: f64, draw_probability: f64) -> Self {
        Self::with_backend(mu, sigma, beta, tau, draw_probability, Backend::Internal)
    }

    #[inline]
    pub const fn with_backend(
        mu: f64,
        sigma: f64,
        beta: f64,
        tau: f64,
        draw_probability: f64,
        backend: Backend,
    ) -> Self {
        Self {
            mu,
            sigma,
            beta,
            tau,
            draw_probability,
            backend,
        }
    }

    #[inline]
    pub const fn mu(&self) -> f64 {
        self.mu
    }

    #[inline]
    pub const fn sigma(&self) -> f64 {
        self.sigma
    }

    #[inline]
    pub const fn beta(&self) -> f64 {
        self.beta
    }

    #[inline]
    pub const fn tau(&self) -> f64 {
        self.tau
    }

    #[inline]
    pub const fn draw_probability(&self) -> f64 {
        self.draw_probability
    }

    #[inline]
    pub const fn backend(&self) -> Backend {
        self.backend
    }

    #[inline]
    pub fn create_rating(&self) -> Rating {
        Rating::new(self.mu, self.sigma)
    }

    /// Conservative skill estimate μ − k·σ with k = μ₀/σ₀, which is 3 at the
    /// library defaults.
    #[inline]
    pub fn expose(&self, rating: &Rating) -> f64 {
        let k = self.mu / self.sigma;
        rating.mu() - k * rating.sigma()
    }

    /// Rates one match. `teams` is the finishing order unless `ranks` says
    /// otherwise (lower is better, equal ranks tie). Returns posterior
    /// ratings mirroring the input team shape.
    pub fn rate(
        &self,
        teams: &[Vec<Rating>],
        ranks: Option<&[usize]>,
        weights: Option<Weights>,
        min_delta: Option<f64>,
    ) -> Result<Vec<Vec<Rating>>, Error> {
        update::rate(self, teams, ranks, weights, min_delta)
    }

    /// [`rate`](Self::rate) over keyed teams; posterior ratings come back
    /// under the same keys. Weights are addressed by (team index, key).
    pub fn rate_keyed<K: Ord + Clone>(
        &self,
        teams: &[BTreeMap<K, Rating>],
        ranks: Option<&[usize]>,
        weights: Option<&[((usize, K), f64)]>,
        min_delta: Option<f64>,
    ) -> Result<Vec<BTreeMap<K, Rating>>, Error> {
        let positional = keyed_to_positional(teams);
        let sparse = keyed_weights(teams, weights)?;
        let rated = update::rate(
            self,
            &positional,
            ranks,
            sparse.as_deref().map(Weights::PerPlayer),
            min_delta,
        )?;
        Ok(teams
            .iter()
            .zip(rated)
            .map(|(team, ratings)| team.keys().cloned().zip(ratings).collect())
            .collect())
    }

    /// Draw probability of the match-up under the prior ratings, in (0, 1].
    pub fn quality(&self, teams: &[Vec<Rating>], weights: Option<Weights>) -> Result<f64, Error> {
        matchmaking::quality(self, teams, weights)
    }

    /// [`quality`](Self::quality) over keyed teams.
    pub fn quality_keyed<K: Ord + Clone>(
        &self,
        teams: &[BTreeMap<K, Rating>],
        weights: Option<&[((usize, K), f64)]>,
    ) -> Result<f64, Error> {
        let positional = keyed_to_positional(teams);
        let sparse = keyed_weights(teams, weights)?;
        matchmaking::quality(self, &positional, sparse.as_deref().map(Weights::PerPlayer))
    }

    /// Rates a head-to-head match won by `rating1`, or drawn.
    pub fn rate_1vs1(
        &self,
        rating1: Rating,
        rating2: Rating,
        drawn: bool,
    ) -> Result<(Rating, Rating), Error> {
        let teams = [vec![rating1], vec![rating2]];
        let ranks: [usize; 2] = if drawn { [0, 0] } else { [0, 1] };
        let rated = self.rate(&teams, Some(&ranks), None, None)?;
        Ok((rated[0][0], rated[1][0]))
    }

    pub fn quality_1vs1(&self, rating1: Rating, rating2: Rating) -> Result<f64, Error> {
        self.quality(&[vec![rating1], vec![rating2]], None)
    }

    /// Splits a player pool into the two most even teams by quality.
    pub fn balance(&self, players: &[Rating]) -> Result<(Vec<usize>, Vec<usize>), Error> {
        matchmaking::balance(self, players)
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if !self.mu.is_finite() {
            return Err(Error::InvalidEnvironment("mu", self.mu));
        }
        if !(self.sigma > 0.0) {
            return Err(Error::InvalidEnvironment("sigma", self.sigma));
        }
        if !(self.beta > 0.0) {
            return Err(Error::InvalidEnvironment("beta", self.beta));
        }
        if !(self.tau >= 0.0) {
            return Err(Error::InvalidEnvironment("tau", self.tau));
        }
        if !(self.draw_probability >= 0.0 && self.draw_probability < 1.0) {
            return Err(Error::InvalidEnvironment(
                "draw_probability",
                self.draw_probability,
            ));
        }
        Ok(())
    }
}

impl Default for TrueSkill {
    #[inline]
    fn default() -> Self {
        Self::new(MU, SIGMA, BETA, TAU, DRAW_PROBABILITY)
    }
}

fn keyed_to_positional<K: Ord + Clone>(teams: &[BTreeMap<K, Rating>]) -> Vec<Vec<Rating>> {
    teams
        .iter()
        .map(|team| team.values().copied().collect())
        .collect()
}

fn keyed_weights<K: Ord + Clone>(
    teams: &[BTreeMap<K, Rating>],
    weights: Option<&[((usize, K), f64)]>,
) -> Result<Option<Vec<((usize, usize), f64)>>, Error> {
    let entries = match weights {
        Some(entries) => entries,
        None => return Ok(None),
    };
    let mut sparse = Vec::with_capacity(entries.len());
    for ((team, key), weight) in entries {
        let players = teams.get(*team).ok_or(Error::WeightKey(*team))?;
        let position = players
            .keys()
            .position(|k| k == key)
            .ok_or(Error::WeightKey(*team))?;
        sparse.push(((*team, position), *weight));
    }
    Ok(Some(sparse))
}

static GLOBAL_ENV: RwLock<TrueSkill> =
    RwLock::new(TrueSkill::new(MU, SIGMA, BETA, TAU, DRAW_PROBABILITY));

/// Snapshot of the process-wide default environment.
pub fn global_env() -> TrueSkill {
    match GLOBAL_ENV.read() {
        Ok(guard) => *guard,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

/// Installs `env` as the process-wide default and returns the previous one,
/// so callers can restore it.
pub fn setup(env: TrueSkill) -> TrueSkill {
    let mut guard = match GLOBAL_ENV.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    core::mem::replace(&mut *guard, env)
}

/// [`TrueSkill::create_rating`] on the default environment.
pub fn create_rating() -> Rating {
    global_env().create_rating()
}

/// [`TrueSkill::rate`] on the default environment.
pub fn rate(
    teams: &[Vec<Rating>],
    ranks: Option<&[usize]>,
    weights: Option<Weights>,
    min_delta: Option<f64>,
) -> Result<Vec<Vec<Rating>>, Error> {
    global_env().rate(teams, ranks, weights, min_delta)
}

/// [`TrueSkill::rate_1vs1`] on the default environment.
pub fn rate_1vs1(rating1: Rating, rating2: Rating, drawn: bool) -> Result<(Rating, Rating), Error> {
    global_env().rate_1vs1(rating1, rating2, drawn)
}

/// [`TrueSkill::quality`] on the default environment.
pub fn quality(teams: &[Vec<Rating>], weights: Option<Weights>) -> Result<f64, Error> {
    global_env().quality(teams, weights)
}

/// [`TrueSkill::quality_1vs1`] on the default environment.
pub fn quality_1vs1(rating1: Rating, rating2: Rating) -> Result<f64, Error> {
    global_env().quality_1vs1(rating1, rating2)
}

/// [`TrueSkill::expose`] on the default environment.
pub fn expose(rating: &Rating) -> f64 {
    global_env().expose(rating)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> TrueSkill {
        TrueSkill::new(25.0, 25.0 / 3.0, 25.0 / 6.0, 25.0 / 300.0, 0.1)
    }

    fn check_rating(rating: Rating, (mu, sigma): (f64, f64)) -> bool {
        (rating.mu() - mu).abs() < 1e-3 && (rating.sigma() - sigma).abs() < 1e-3
    }

    #[test]
    fn quality() {
        let env = env();
        let teams = vec![
            vec![Rating::new(2.2, 1.7), Rating::new(36.7, 1.0)],
            vec![Rating::new(20.3, 5.0), Rating::new(17.0, 7.3)],
        ];
        let quality = env.quality(&teams, None).unwrap();
        assert!((quality - 0.671).abs() < 1e-3);
    }

    #[test]
    fn balance() {
        let env = env();
        let players = [
            Rating::new(2.2, 1.7),
            Rating::new(17.0, 7.3),
            Rating::new(20.3, 5.0),
            Rating::new(36.7, 1.0),
        ];
        let teams = env.balance(&players).unwrap();
        assert_eq!(teams.0, [0, 3]);
        assert_eq!(teams.1, [1, 2]);
    }

    #[test]
    fn rate_win() {
        let env = env();
        let teams = vec![
            vec![Rating::new(2.2, 1.7), Rating::new(36.7, 1.0)],
            vec![Rating::new(20.3, 5.0), Rating::new(17.0, 7.3)],
        ];
        let rated = env.rate(&teams, None, None, None).unwrap();
        assert!(check_rating(rated[0][0], (2.381, 1.692)));
        assert!(check_rating(rated[0][1], (36.763, 1.001)));
        assert!(check_rating(rated[1][0], (18.737, 4.735)));
        assert!(check_rating(rated[1][1], (13.670, 6.447)));
    }

    #[test]
    fn rate_loss() {
        let env = env();
        let teams = vec![
            vec![Rating::new(2.2, 1.7), Rating::new(36.7, 1.0)],
            vec![Rating::new(20.3, 5.0), Rating::new(17.0, 7.3)],
        ];
        let rated = env.rate(&teams, Some(&[1, 0]), None, None).unwrap();
        assert!(check_rating(rated[0][0], (1.979, 1.691)));
        assert!(check_rating(rated[0][1], (36.623, 1.001)));
        assert!(check_rating(rated[1][0], (22.208, 4.712)));
        assert!(check_rating(rated[1][1], (21.066, 6.367)));
    }

    #[test]
    fn rate_draw() {
        let env = env();
        let teams = vec![
            vec![Rating::new(2.2, 1.7), Rating::new(36.7, 1.0)],
            vec![Rating::new(20.3, 5.0), Rating::new(17.0, 7.3)],
        ];
        let rated = env.rate(&teams, Some(&[0, 0]), None, None).unwrap();
        assert!(check_rating(rated[0][0], (2.170, 1.686)));
        assert!(check_rating(rated[0][1], (36.689, 1.000)));
        assert!(check_rating(rated[1][0], (20.563, 4.571)));
        assert!(check_rating(rated[1][1], (17.561, 5.883)));
    }

    #[test]
    fn one_on_one_sugar_matches_rate() {
        let env = env();
        let (winner, loser) = env
            .rate_1vs1(Rating::default(), Rating::default(), false)
            .unwrap();
        assert!(check_rating(winner, (29.396, 7.171)));
        assert!(check_rating(loser, (20.604, 7.171)));

        let (left, right) = env
            .rate_1vs1(Rating::default(), Rating::default(), true)
            .unwrap();
        assert!(check_rating(left, (25.000, 6.458)));
        assert!(check_rating(right, (25.000, 6.458)));

        let quality = env
            .quality_1vs1(Rating::new(25.0, 0.001), Rating::new(25.0, 0.001))
            .unwrap();
        assert!((quality - 0.99999997).abs() < 1e-7);
    }

    #[test]
    fn swapped_teams_swap_results() {
        let env = env();
        let strong = Rating::new(29.0, 6.0);
        let weak = Rating::new(22.0, 6.0);
        let (a1, b1) = env.rate_1vs1(strong, weak, false).unwrap();
        let teams = [vec![weak], vec![strong]];
        let reversed = env.rate(&teams, Some(&[1, 0]), None, None).unwrap();
        assert_eq!(a1, reversed[1][0]);
        assert_eq!(b1, reversed[0][0]);
    }

    #[test]
    fn expose_uses_three_sigma_by_default() {
        let env = env();
        assert!((env.expose(&Rating::default())).abs() < 1e-12);
        let better = Rating::new(30.0, 1.0);
        assert!((env.expose(&better) - 27.0).abs() < 1e-12);
    }

    #[test]
    fn keyed_teams_round_trip() {
        let env = env();
        let mut team1 = BTreeMap::new();
        team1.insert("alice", Rating::default());
        team1.insert("bob", Rating::new(27.0, 6.0));
        let mut team2 = BTreeMap::new();
        team2.insert("carol", Rating::default());
        team2.insert("dave", Rating::new(23.0, 7.5));
        let keyed = [team1.clone(), team2.clone()];
        let weights = [((0usize, "bob"), 0.7)];

        let rated = env.rate_keyed(&keyed, None, Some(&weights), None).unwrap();
        assert_eq!(rated.len(), 2);
        assert_eq!(
            rated[0].keys().copied().collect::<Vec<_>>(),
            vec!["alice", "bob"]
        );

        // Same match in positional form.
        let positional = vec![
            vec![team1["alice"], team1["bob"]],
            vec![team2["carol"], team2["dave"]],
        ];
        let sparse = [((0usize, 1usize), 0.7)];
        let expected = env
            .rate(&positional, None, Some(Weights::PerPlayer(&sparse)), None)
            .unwrap();
        assert_eq!(rated[0]["alice"], expected[0][0]);
        assert_eq!(rated[0]["bob"], expected[0][1]);
        assert_eq!(rated[1]["carol"], expected[1][0]);
        assert_eq!(rated[1]["dave"], expected[1][1]);

        let keyed_quality = env.quality_keyed(&keyed, Some(&weights)).unwrap();
        let positional_quality = env
            .quality(&positional, Some(Weights::PerPlayer(&sparse)))
            .unwrap();
        assert_eq!(keyed_quality, positional_quality);

        let unknown = [((0usize, "mallory"), 0.5)];
        assert_eq!(
            env.rate_keyed(&keyed, None, Some(&unknown), None),
            Err(Error::WeightKey(0))
        );
    }

    #[test]
    fn statrs_backend_agrees() {
        let with_statrs = TrueSkill::with_backend(
            25.0,
            25.0 / 3.0,
            25.0 / 6.0,
            25.0 / 300.0,
            0.1,
            Backend::Statrs,
        );
        let (winner, loser) = with_statrs
            .rate_1vs1(Rating::default(), Rating::default(), false)
            .unwrap();
        let (expected_winner, expected_loser) = env()
            .rate_1vs1(Rating::default(), Rating::default(), false)
            .unwrap();
        assert!((winner.mu() - expected_winner.mu()).abs() < 1e-6);
        assert!((winner.sigma() - expected_winner.sigma()).abs() < 1e-6);
        assert!((loser.mu() - expected_loser.mu()).abs() < 1e-6);
        assert!((loser.sigma() - expected_loser.sigma()).abs() < 1e-6);
    }

    #[test]
    fn global_environment_swaps_atomically() {
        let snapshot = global_env();
        assert_eq!(snapshot, TrueSkill::default());
        let custom = TrueSkill::with_backend(30.0, 10.0, 5.0, 0.1, 0.2, Backend::Statrs);
        let previous = setup(custom);
        assert_eq!(previous, snapshot);
        assert_eq!(global_env(), custom);
        assert_eq!(create_rating(), Rating::new(30.0, 10.0));
        setup(snapshot);
        assert_eq!(global_env(), snapshot);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serialize() {
        let text = serde_json::to_string(&env()).unwrap();
        assert_eq!(
            text,
            r#"{"mu":25.0,"sigma":8.333333333333334,"beta":4.166666666666667,"tau":0.08333333333333333,"draw_probability":0.1,"backend":"Internal"}"#
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserialize() {
        let parsed = serde_json::from_str::<TrueSkill>(
            r#"{"mu":25.0,"sigma":8.333333333333334,"beta":4.166666666666667,"tau":0.08333333333333333,"draw_probability":0.1,"backend":"Internal"}"#,
        )
        .unwrap();
        assert_eq!(parsed, env());
    }
}
