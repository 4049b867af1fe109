use crate::backend::{self, Backend};
use crate::error::Error;
use crate::gaussian::Gaussian;
use crate::graph::{FactorId, Graph, VarId};

/// Which adjacent variable a factor should refresh: `Down` targets the child
/// (or only) variable, `Up(i)` the i-th parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Edge {
    Down,
    Up(usize),
}

/// The five factor kinds of the rating graph.
#[derive(Debug)]
pub(crate) enum Factor {
    /// Anchors a skill variable to its dynamics-inflated prior.
    Prior { var: VarId, prior: Gaussian },
    /// value = mean + N(0, variance); ties a performance to its skill.
    Likelihood {
        mean: VarId,
        value: VarId,
        variance: f64,
    },
    /// sum = Σ coeff·term; team performances and team differences.
    Sum {
        sum: VarId,
        terms: Vec<VarId>,
        coeffs: Vec<f64>,
    },
    /// The observed outcome "difference exceeded the draw margin".
    Greater {
        var: VarId,
        margin: f64,
        backend: Backend,
    },
    /// The observed draw: |difference| within the margin.
    Within {
        var: VarId,
        margin: f64,
        backend: Backend,
    },
}

impl Factor {
    pub fn variables(&self) -> Vec<VarId> {
        match self {
            Factor::Prior { var, .. } => vec![*var],
            Factor::Likelihood { mean, value, .. } => vec![*mean, *value],
            Factor::Sum { sum, terms, .. } => {
                let mut vars = Vec::with_capacity(terms.len() + 1);
                vars.push(*sum);
                vars.extend(terms);
                vars
            }
            Factor::Greater { var, .. } | Factor::Within { var, .. } => vec![*var],
        }
    }

    /// Recomputes the message along one edge from the cavities on the other
    /// edges, and returns how far the target marginal moved.
    pub fn update(&self, id: FactorId, graph: &mut Graph, edge: Edge) -> Result<f64, Error> {
        match (self, edge) {
            (Factor::Prior { var, prior }, Edge::Down) => {
                Ok(graph.update_marginal(*var, id, *prior))
            }
            (
                Factor::Likelihood {
                    mean,
                    value,
                    variance,
                },
                edge,
            ) => {
                let (from, to) = match edge {
                    Edge::Down => (*mean, *value),
                    Edge::Up(0) => (*value, *mean),
                    Edge::Up(_) => unreachable!("likelihood has a single parent"),
                };
                let cavity = graph.cavity(from, id);
                let gain = 1.0 / (1.0 + variance * cavity.pi());
                let message = Gaussian::new(gain * cavity.pi(), gain * cavity.tau());
                Ok(graph.update_message(to, id, message))
            }
            (Factor::Sum { sum, terms, coeffs }, Edge::Down) => {
                Ok(sum_update(graph, id, *sum, terms, coeffs))
            }
            (Factor::Sum { sum, terms, coeffs }, Edge::Up(index)) => {
                // Solve for term `index`: x_i = (sum − Σ_{j≠i} c_j·x_j) / c_i.
                let lead = coeffs[index];
                let mut vars = Vec::with_capacity(terms.len());
                let mut inverted = Vec::with_capacity(terms.len());
                for (i, (&term, &coeff)) in terms.iter().zip(coeffs).enumerate() {
                    if i == index {
                        vars.push(*sum);
                        inverted.push(1.0 / lead);
                    } else {
                        vars.push(term);
                        inverted.push(-coeff / lead);
                    }
                }
                Ok(sum_update(graph, id, terms[index], &vars, &inverted))
            }
            (
                Factor::Greater {
                    var,
                    margin,
                    backend,
                },
                Edge::Down,
            ) => truncate_update(
                graph,
                id,
                *var,
                *margin,
                *backend,
                backend::v_win,
                backend::w_win,
            ),
            (
                Factor::Within {
                    var,
                    margin,
                    backend,
                },
                Edge::Down,
            ) => truncate_update(
                graph,
                id,
                *var,
                *margin,
                *backend,
                backend::v_draw,
                backend::w_draw,
            ),
            _ => unreachable!("factor has no such edge"),
        }
    }
}

/// Linear-Gaussian message for `target = Σ coeff·var` over the cavities of
/// the listed variables.
fn sum_update(
    graph: &mut Graph,
    id: FactorId,
    target: VarId,
    vars: &[VarId],
    coeffs: &[f64],
) -> f64 {
    let mut precision_inv: f64 = 0.0;
    let mut mu = 0.0;
    for (&var, &coeff) in vars.iter().zip(coeffs) {
        let cavity = graph.cavity(var, id);
        mu += coeff * cavity.mu();
        if precision_inv.is_infinite() {
            continue;
        }
        if cavity.pi() == 0.0 {
            precision_inv = f64::INFINITY;
        } else {
            precision_inv += coeff * coeff / cavity.pi();
        }
    }
    let pi = 1.0 / precision_inv;
    let tau = pi * mu;
    graph.update_message(target, id, Gaussian::new(pi, tau))
}

type Correction = fn(f64, f64, Backend) -> Result<f64, Error>;

/// Moment-matches the marginal of a difference variable against a truncated
/// Gaussian and backs the result out as the outcome factor's message.
fn truncate_update(
    graph: &mut Graph,
    id: FactorId,
    var: VarId,
    margin: f64,
    backend: Backend,
    v_fn: Correction,
    w_fn: Correction,
) -> Result<f64, Error> {
    let cavity = graph.cavity(var, id);
    let sqrt_pi = cavity.pi().sqrt();
    let t = cavity.tau() / sqrt_pi;
    let eps = margin * sqrt_pi;
    let v = v_fn(t, eps, backend)?;
    let w = w_fn(t, eps, backend)?;
    let denom = 1.0 - w;
    if denom <= 0.0 {
        return Err(Error::FloatingPoint("variance correction reached 1"));
    }
    let value = Gaussian::new(cavity.pi() / denom, (cavity.tau() + sqrt_pi * v) / denom);
    Ok(graph.update_marginal(var, id, value))
}
