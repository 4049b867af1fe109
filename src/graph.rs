use crate::backend;
use crate::factor::Factor;
use crate::gaussian::Gaussian;
use crate::rating::Rating;
use crate::TrueSkill;

pub(crate) type VarId = usize;
pub(crate) type FactorId = usize;

/// Variable node: the current marginal plus the last message received from
/// each attached factor.
#[derive(Debug, Default)]
struct Variable {
    marginal: Gaussian,
    messages: Vec<(FactorId, Gaussian)>,
}

/// Arena of variable nodes for one match. Built once, mutated only while the
/// schedule runs, dropped with the call.
#[derive(Debug, Default)]
pub(crate) struct Graph {
    vars: Vec<Variable>,
}

impl Graph {
    pub fn add_var(&mut self) -> VarId {
        self.vars.push(Variable::default());
        self.vars.len() - 1
    }

    /// Registers `factor` as adjacent to `var` with an uninformative message.
    pub fn attach(&mut self, var: VarId, factor: FactorId) {
        debug_assert!(self.vars[var].messages.iter().all(|(f, _)| *f != factor));
        self.vars[var].messages.push((factor, Gaussian::default()));
    }

    pub fn marginal(&self, var: VarId) -> Gaussian {
        self.vars[var].marginal
    }

    /// The marginal with `factor`'s message removed.
    pub fn cavity(&self, var: VarId, factor: FactorId) -> Gaussian {
        self.marginal(var) / self.message(var, factor)
    }

    fn message(&self, var: VarId, factor: FactorId) -> Gaussian {
        match self.vars[var].messages.iter().find(|(f, _)| *f == factor) {
            Some((_, message)) => *message,
            None => panic!("factor {} is not attached to variable {}", factor, var),
        }
    }

    /// Replaces the message from `factor`, folds the change into the
    /// marginal, and reports how far the marginal moved.
    pub fn update_message(&mut self, var: VarId, factor: FactorId, message: Gaussian) -> f64 {
        let old = self.replace_message(var, factor, message);
        let value = self.vars[var].marginal / old * message;
        self.set_marginal(var, value)
    }

    /// Overwrites the marginal with `value` and backs out the message
    /// `factor` must have sent for the other messages to stay consistent.
    pub fn update_marginal(&mut self, var: VarId, factor: FactorId, value: Gaussian) -> f64 {
        let implied = value * self.message(var, factor) / self.vars[var].marginal;
        self.replace_message(var, factor, implied);
        self.set_marginal(var, value)
    }

    fn replace_message(&mut self, var: VarId, factor: FactorId, message: Gaussian) -> Gaussian {
        match self.vars[var]
            .messages
            .iter_mut()
            .find(|(f, _)| *f == factor)
        {
            Some((_, slot)) => core::mem::replace(slot, message),
            None => panic!("factor {} is not attached to variable {}", factor, var),
        }
    }

    fn set_marginal(&mut self, var: VarId, value: Gaussian) -> f64 {
        let delta = value.delta(&self.vars[var].marginal);
        self.vars[var].marginal = value;
        delta
    }
}

/// A match compiled into variables and factors, with the factor ids grouped
/// by layer in schedule order.
pub(crate) struct MatchGraph {
    pub graph: Graph,
    pub factors: Vec<Factor>,
    /// Skill variables per team, mirroring the (sorted) team shape.
    pub skills: Vec<Vec<VarId>>,
    pub priors: Vec<FactorId>,
    pub likelihoods: Vec<FactorId>,
    pub team_sums: Vec<FactorId>,
    pub diff_sums: Vec<FactorId>,
    pub truncations: Vec<FactorId>,
}

impl MatchGraph {
    fn add_factor(&mut self, factor: Factor) -> FactorId {
        let id = self.factors.len();
        for var in factor.variables() {
            self.graph.attach(var, id);
        }
        self.factors.push(factor);
        id
    }
}

/// Lays out the factor graph for one match: a prior and a likelihood per
/// player, a weighted sum per team, and a difference with its outcome factor
/// per adjacent team pair. Teams must already be sorted by rank.
pub(crate) fn build(
    env: &TrueSkill,
    teams: &[Vec<Rating>],
    ranks: &[usize],
    weights: &[Vec<f64>],
) -> MatchGraph {
    let total: usize = teams.iter().map(Vec::len).sum();
    let margin = backend::draw_margin(
        env.draw_probability(),
        total as f64,
        env.beta(),
        env.backend(),
    );
    let beta2 = env.beta() * env.beta();
    let tau2 = env.tau() * env.tau();

    let mut match_graph = MatchGraph {
        graph: Graph::default(),
        factors: Vec::new(),
        skills: Vec::new(),
        priors: Vec::new(),
        likelihoods: Vec::new(),
        team_sums: Vec::new(),
        diff_sums: Vec::new(),
        truncations: Vec::new(),
    };

    let mut team_perfs = Vec::with_capacity(teams.len());
    for (team, team_weights) in teams.iter().zip(weights) {
        let mut skills = Vec::with_capacity(team.len());
        let mut perfs = Vec::with_capacity(team.len());
        for rating in team {
            let skill = match_graph.graph.add_var();
            let perf = match_graph.graph.add_var();
            let prior = match_graph.add_factor(Factor::Prior {
                var: skill,
                prior: Gaussian::from_mu_sigma2(rating.mu(), rating.variance() + tau2),
            });
            let likelihood = match_graph.add_factor(Factor::Likelihood {
                mean: skill,
                value: perf,
                variance: beta2,
            });
            match_graph.priors.push(prior);
            match_graph.likelihoods.push(likelihood);
            skills.push(skill);
            perfs.push(perf);
        }
        let team_perf = match_graph.graph.add_var();
        let team_sum = match_graph.add_factor(Factor::Sum {
            sum: team_perf,
            terms: perfs,
            coeffs: team_weights.clone(),
        });
        match_graph.team_sums.push(team_sum);
        match_graph.skills.push(skills);
        team_perfs.push(team_perf);
    }

    for (pair, window) in team_perfs.windows(2).enumerate() {
        let diff = match_graph.graph.add_var();
        let diff_sum = match_graph.add_factor(Factor::Sum {
            sum: diff,
            terms: vec![window[0], window[1]],
            coeffs: vec![1.0, -1.0],
        });
        let truncation = if ranks[pair] == ranks[pair + 1] {
            Factor::Within {
                var: diff,
                margin,
                backend: env.backend(),
            }
        } else {
            Factor::Greater {
                var: diff,
                margin,
                backend: env.backend(),
            }
        };
        let truncation = match_graph.add_factor(truncation);
        match_graph.diff_sums.push(diff_sum);
        match_graph.truncations.push(truncation);
    }

    match_graph
}

#[cfg(test)]
mod test {
    use statrs::assert_almost_eq;

    use super::*;

    #[test]
    fn message_bookkeeping() {
        let mut graph = Graph::default();
        let var = graph.add_var();
        graph.attach(var, 0);
        graph.attach(var, 1);

        let delta = graph.update_message(var, 0, Gaussian::from_mu_sigma2(1.0, 2.0));
        assert!(delta > 0.0);
        let delta = graph.update_message(var, 1, Gaussian::from_mu_sigma2(3.0, 4.0));
        assert!(delta > 0.0);

        // Marginal is the product of the incoming messages.
        let expected =
            Gaussian::from_mu_sigma2(1.0, 2.0) * Gaussian::from_mu_sigma2(3.0, 4.0);
        assert_almost_eq!(graph.marginal(var).pi(), expected.pi(), 1e-12);
        assert_almost_eq!(graph.marginal(var).tau(), expected.tau(), 1e-12);

        // Cavity removes exactly one factor's contribution.
        let cavity = graph.cavity(var, 1);
        assert_almost_eq!(cavity.mu(), 1.0, 1e-12);
        assert_almost_eq!(cavity.sigma2(), 2.0, 1e-12);

        // Re-sending the identical message leaves the marginal unchanged.
        let delta = graph.update_message(var, 1, Gaussian::from_mu_sigma2(3.0, 4.0));
        assert_almost_eq!(delta, 0.0, 1e-12);
    }

    #[test]
    fn update_marginal_backs_out_message() {
        let mut graph = Graph::default();
        let var = graph.add_var();
        graph.attach(var, 0);
        graph.attach(var, 1);
        graph.update_message(var, 0, Gaussian::from_mu_sigma2(0.0, 1.0));

        let forced = Gaussian::from_mu_sigma2(0.5, 0.8);
        graph.update_marginal(var, 1, forced);
        assert_eq!(graph.marginal(var), forced);
        // Cavity for the forcing factor is still the other message.
        let cavity = graph.cavity(var, 1);
        assert_almost_eq!(cavity.mu(), 0.0, 1e-12);
        assert_almost_eq!(cavity.sigma2(), 1.0, 1e-12);
    }

    #[test]
    fn layout() {
        let env = TrueSkill::default();
        let teams = vec![
            vec![Rating::default(), Rating::default()],
            vec![Rating::default()],
            vec![Rating::default()],
        ];
        let weights = vec![vec![1.0, 1.0], vec![1.0], vec![1.0]];
        let built = build(&env, &teams, &[0, 1, 1], &weights);

        assert_eq!(built.priors.len(), 4);
        assert_eq!(built.likelihoods.len(), 4);
        assert_eq!(built.team_sums.len(), 3);
        assert_eq!(built.diff_sums.len(), 2);
        assert_eq!(built.truncations.len(), 2);
        assert_eq!(built.skills.iter().map(Vec::len).collect::<Vec<_>>(), [2, 1, 1]);
        assert!(matches!(
            built.factors[built.truncations[0]],
            Factor::Greater { .. }
        ));
        assert!(matches!(
            built.factors[built.truncations[1]],
            Factor::Within { .. }
        ));
    }
}
