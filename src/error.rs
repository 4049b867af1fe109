use thiserror::Error;

/// Failure modes of the rating operations.
///
/// No operation commits partially: on `Err` every input rating is left
/// untouched.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum Error {
    /// A match needs at least two teams to produce an outcome.
    #[error("need at least two teams, got {0}")]
    NotEnoughTeams(usize),
    /// The team at this index has no players.
    #[error("team {0} has no players")]
    EmptyTeam(usize),
    /// The rank list does not line up with the team list.
    #[error("expected {teams} ranks, got {ranks}")]
    RankCount { teams: usize, ranks: usize },
    /// A positional weight list does not line up with the team list.
    #[error("expected weights for {teams} teams, got {lists} lists")]
    WeightCount { teams: usize, lists: usize },
    /// A per-team weight list does not mirror that team's size.
    #[error("team {team} has {expected} players but {got} weights")]
    WeightShape {
        team: usize,
        expected: usize,
        got: usize,
    },
    /// A sparse weight entry points at a player that does not exist.
    #[error("weight entry ({team}, {player}) matches no player")]
    WeightIndex { team: usize, player: usize },
    /// A keyed weight entry names a team or player key that does not exist.
    #[error("weight entry for team {0} matches no player")]
    WeightKey(usize),
    /// An input rating carries a non-positive standard deviation.
    #[error("rating sigma must be positive, got {0}")]
    InvalidSigma(f64),
    /// An environment parameter is outside its domain.
    #[error("environment parameter {0} out of range: {1}")]
    InvalidEnvironment(&'static str, f64),
    /// A partial-play weight lies outside [0, 1].
    #[error("weights must lie in [0, 1], got {0}")]
    InvalidWeight(f64),
    /// The convergence tolerance must be positive.
    #[error("min_delta must be positive, got {0}")]
    InvalidMinDelta(f64),
    /// Double precision was not enough for this match-up. Retrying with
    /// another [`Backend`](crate::Backend) is the documented remedy.
    #[error("floating-point precision exhausted: {0}")]
    FloatingPoint(&'static str),
}
