use itertools::Itertools;

use crate::error::Error;
use crate::factor::Edge;
use crate::graph::{self, MatchGraph};
use crate::rating::Rating;
use crate::TrueSkill;

/// Weights below this are lifted to it so every sum coefficient stays
/// invertible. Small enough that a "zero" player keeps their prior to well
/// under any sensible tolerance.
const MIN_WEIGHT: f64 = 1e-6;

/// Partial-play weights for a match, each in [0, 1].
#[derive(Clone, Copy, Debug)]
pub enum Weights<'a> {
    /// One weight per player, mirroring the team structure.
    PerTeam(&'a [Vec<f64>]),
    /// Sparse (team index, player index) entries; everyone else plays fully.
    PerPlayer(&'a [((usize, usize), f64)]),
}

/// Rejects team structures no outcome can be learned from.
pub(crate) fn validate_teams(teams: &[Vec<Rating>]) -> Result<(), Error> {
    if teams.len() < 2 {
        return Err(Error::NotEnoughTeams(teams.len()));
    }
    for (index, team) in teams.iter().enumerate() {
        if team.is_empty() {
            return Err(Error::EmptyTeam(index));
        }
        for rating in team {
            if !(rating.sigma() > 0.0) {
                return Err(Error::InvalidSigma(rating.sigma()));
            }
        }
    }
    Ok(())
}

/// Resolves either weight form to a flat per-player table, defaulting to 1
/// and clamping to the numerical floor.
pub(crate) fn resolve_weights(
    teams: &[Vec<Rating>],
    weights: Option<Weights>,
) -> Result<Vec<Vec<f64>>, Error> {
    let mut table: Vec<Vec<f64>> = teams.iter().map(|team| vec![1.0; team.len()]).collect();
    match weights {
        None => {}
        Some(Weights::PerTeam(lists)) => {
            if lists.len() != teams.len() {
                return Err(Error::WeightCount {
                    teams: teams.len(),
                    lists: lists.len(),
                });
            }
            for (index, (list, team)) in lists.iter().zip(teams).enumerate() {
                if list.len() != team.len() {
                    return Err(Error::WeightShape {
                        team: index,
                        expected: team.len(),
                        got: list.len(),
                    });
                }
                for (slot, &weight) in table[index].iter_mut().zip(list) {
                    *slot = checked_weight(weight)?;
                }
            }
        }
        Some(Weights::PerPlayer(entries)) => {
            for &((team, player), weight) in entries {
                if team >= teams.len() || player >= teams[team].len() {
                    return Err(Error::WeightIndex { team, player });
                }
                table[team][player] = checked_weight(weight)?;
            }
        }
    }
    for list in &mut table {
        for weight in list {
            if *weight < MIN_WEIGHT {
                *weight = MIN_WEIGHT;
            }
        }
    }
    Ok(table)
}

fn checked_weight(weight: f64) -> Result<f64, Error> {
    if weight >= 0.0 && weight <= 1.0 {
        Ok(weight)
    } else {
        Err(Error::InvalidWeight(weight))
    }
}

/// Match description normalized to rank-sorted positional form, with the
/// permutation needed to restore the caller's team order.
struct Normalized {
    order: Vec<usize>,
    teams: Vec<Vec<Rating>>,
    ranks: Vec<usize>,
    weights: Vec<Vec<f64>>,
}

fn normalize(
    teams: &[Vec<Rating>],
    ranks: Option<&[usize]>,
    weights: Option<Weights>,
) -> Result<Normalized, Error> {
    validate_teams(teams)?;
    let ranks: Vec<usize> = match ranks {
        Some(ranks) => {
            if ranks.len() != teams.len() {
                return Err(Error::RankCount {
                    teams: teams.len(),
                    ranks: ranks.len(),
                });
            }
            ranks.to_vec()
        }
        None => (0..teams.len()).collect(),
    };
    let weights = resolve_weights(teams, weights)?;
    let order: Vec<usize> = ranks
        .iter()
        .enumerate()
        .sorted_by_key(|&(_, rank)| *rank)
        .map(|(index, _)| index)
        .collect();
    Ok(Normalized {
        teams: order.iter().map(|&i| teams[i].clone()).collect(),
        ranks: order.iter().map(|&i| ranks[i]).collect(),
        weights: order.iter().map(|&i| weights[i].clone()).collect(),
        order,
    })
}

/// Rates one match: builds the factor graph, runs the message-passing
/// schedule to convergence, and reads the posterior skills back out in the
/// caller's team order.
pub(crate) fn rate(
    env: &TrueSkill,
    teams: &[Vec<Rating>],
    ranks: Option<&[usize]>,
    weights: Option<Weights>,
    min_delta: Option<f64>,
) -> Result<Vec<Vec<Rating>>, Error> {
    env.validate()?;
    let min_delta = min_delta.unwrap_or(crate::MIN_DELTA);
    if !(min_delta > 0.0) {
        return Err(Error::InvalidMinDelta(min_delta));
    }
    let normalized = normalize(teams, ranks, weights)?;
    let mut built = graph::build(env, &normalized.teams, &normalized.ranks, &normalized.weights);
    log::debug!(
        "rating {} teams, {} players, {} factors",
        teams.len(),
        normalized.teams.iter().map(Vec::len).sum::<usize>(),
        built.factors.len()
    );
    run_schedule(&mut built, min_delta)?;

    let mut posterior = vec![Vec::new(); teams.len()];
    for (skills, &original) in built.skills.iter().zip(&normalized.order) {
        posterior[original] = skills
            .iter()
            .map(|&var| {
                let marginal = built.graph.marginal(var);
                debug_assert!(marginal.mu().is_finite() && marginal.sigma() > 0.0);
                Rating::new(marginal.mu(), marginal.sigma())
            })
            .collect();
    }
    Ok(posterior)
}

/// The three-phase schedule: one downward pass from the priors to the team
/// performances, iterated sweeps over the difference chain until the outcome
/// updates settle, one upward pass back to the skills.
fn run_schedule(built: &mut MatchGraph, min_delta: f64) -> Result<(), Error> {
    let MatchGraph {
        graph,
        factors,
        skills,
        priors,
        likelihoods,
        team_sums,
        diff_sums,
        truncations,
    } = built;

    for &id in priors.iter().chain(likelihoods.iter()).chain(team_sums.iter()) {
        factors[id].update(id, graph, Edge::Down)?;
    }

    let pairs = diff_sums.len();
    let cap = 10 * (pairs + 1);
    let mut converged = false;
    for sweep in 0..cap {
        let delta = if pairs == 1 {
            factors[diff_sums[0]].update(diff_sums[0], graph, Edge::Down)?;
            factors[truncations[0]].update(truncations[0], graph, Edge::Down)?
        } else {
            let mut delta: f64 = 0.0;
            for x in 0..pairs - 1 {
                factors[diff_sums[x]].update(diff_sums[x], graph, Edge::Down)?;
                delta = delta
                    .max(factors[truncations[x]].update(truncations[x], graph, Edge::Down)?);
                factors[diff_sums[x]].update(diff_sums[x], graph, Edge::Up(1))?;
            }
            for x in (1..pairs).rev() {
                factors[diff_sums[x]].update(diff_sums[x], graph, Edge::Down)?;
                delta = delta
                    .max(factors[truncations[x]].update(truncations[x], graph, Edge::Down)?);
                factors[diff_sums[x]].update(diff_sums[x], graph, Edge::Up(0))?;
            }
            delta
        };
        log::trace!("sweep {}: delta {:e}", sweep, delta);
        if delta <= min_delta {
            log::debug!("converged after {} sweeps", sweep + 1);
            converged = true;
            break;
        }
    }
    if !converged {
        return Err(Error::FloatingPoint("message passing did not converge"));
    }

    factors[diff_sums[0]].update(diff_sums[0], graph, Edge::Up(0))?;
    factors[diff_sums[pairs - 1]].update(diff_sums[pairs - 1], graph, Edge::Up(1))?;
    for (&id, team) in team_sums.iter().zip(skills.iter()) {
        for player in 0..team.len() {
            factors[id].update(id, graph, Edge::Up(player))?;
        }
    }
    for &id in likelihoods.iter() {
        factors[id].update(id, graph, Edge::Up(0))?;
    }
    Ok(())
}
