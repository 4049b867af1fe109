use itertools::Itertools;

use crate::error::Error;
use crate::matrix::Matrix;
use crate::rating::Rating;
use crate::update::{self, Weights};
use crate::TrueSkill;

/// Draw probability of the match under the prior performance model, in
/// (0, 1]. The closer to 1, the more evenly matched the teams.
///
/// Block form over the flattened player list: with Σ the diagonal of skill
/// variances and A the weight-scaled difference operator between adjacent
/// teams,
///
/// quality = √(det(β²AAᵀ) / det(β²AAᵀ + AΣAᵀ)) · exp(−½ μᵀAᵀ(β²AAᵀ + AΣAᵀ)⁻¹Aμ)
pub(crate) fn quality(
    env: &TrueSkill,
    teams: &[Vec<Rating>],
    weights: Option<Weights>,
) -> Result<f64, Error> {
    env.validate()?;
    update::validate_teams(teams)?;
    let weights = update::resolve_weights(teams, weights)?;

    let flat_ratings: Vec<Rating> = teams.iter().flatten().copied().collect();
    let flat_weights: Vec<f64> = weights.iter().flatten().copied().collect();
    let players = flat_ratings.len();
    let pairs = teams.len() - 1;
    let beta2 = env.beta() * env.beta();

    let mean = Matrix::column(&flat_ratings.iter().map(Rating::mu).collect::<Vec<_>>());
    let variance = Matrix::diagonal(
        &flat_ratings
            .iter()
            .map(Rating::variance)
            .collect::<Vec<_>>(),
    );

    let mut difference = Matrix::zeroed(pairs, players);
    let mut offset = 0;
    for (pair, window) in teams.windows(2).enumerate() {
        for player in 0..window[0].len() {
            difference[(pair, offset + player)] = flat_weights[offset + player];
        }
        let next = offset + window[0].len();
        for player in 0..window[1].len() {
            difference[(pair, next + player)] = -flat_weights[next + player];
        }
        offset = next;
    }

    let transposed = difference.transpose();
    let rotated = (&difference * &transposed).scaled(beta2);
    let spread = &(&difference * &variance) * &transposed;
    let middle = &rotated + &spread;
    let inverse = middle
        .inverse()
        .ok_or(Error::FloatingPoint("quality covariance is singular"))?;
    let shifted = &difference * &mean;
    let quadratic = (&(&shifted.transpose() * &inverse) * &shifted)[(0, 0)];
    let ratio = rotated.determinant() / middle.determinant();
    Ok(ratio.sqrt() * (-0.5 * quadratic).exp())
}

/// Splits a pool of players into the two most even teams, exhaustively.
/// Returns the player indices of each side; the first player is pinned to
/// the first team to halve the search.
pub(crate) fn balance(
    env: &TrueSkill,
    players: &[Rating],
) -> Result<(Vec<usize>, Vec<usize>), Error> {
    if players.len() < 2 {
        return Err(Error::NotEnoughTeams(players.len()));
    }
    let len = players.len();
    let mut best_quality = f64::NEG_INFINITY;
    let mut best_teams = (Vec::new(), Vec::new());
    for chosen in (1..len).combinations(len / 2) {
        let mut is_team1 = vec![true; len];
        for &i in &chosen {
            is_team1[i] = false;
        }
        let mut team1 = Vec::new();
        let mut team2 = Vec::new();
        for (i, &check) in is_team1.iter().enumerate() {
            if check { &mut team1 } else { &mut team2 }.push(i);
        }
        let quality = env.quality(
            &[
                team1.iter().map(|&x| players[x]).collect::<Vec<_>>(),
                team2.iter().map(|&x| players[x]).collect::<Vec<_>>(),
            ],
            None,
        )?;
        if quality > best_quality {
            best_quality = quality;
            best_teams = (team1, team2);
        }
    }
    Ok(best_teams)
}
