//! Adaptive Large Neighborhood Search engine for the 2E-CVRP.
//!
//! The engine owns the operator weights, usage counters, running mean
//! operator times, the RNG and the simulated-annealing temperature. Each
//! iteration clones the current solution, destroys and repairs the clone,
//! and decides acceptance against the current and best solutions. Every
//! stochastic choice flows through the single seeded RNG, so two runs with
//! identical seeds and inputs produce identical cost trajectories.

use crate::instance::TwoEcvrpInstance;
use crate::solution::Solution;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::time::Instant;

/// Number of destroy operators in the catalogue
pub const N_DESTROY_OPS: usize = 4;
/// Number of repair operators in the catalogue
pub const N_REPAIR_OPS: usize = 3;

/// Parameters of the ALNS
#[derive(Debug, Clone)]
pub struct AlnsParameters {
    /// Number of iterations of the main loop
    pub n_iterations: usize,
    /// Minimum neighborhood size
    pub min_size_nbh: usize,
    /// Value of the random seed
    pub random_seed: u64,
    /// Initial temperature for simulated annealing
    pub init_temperature: f64,
    /// Cooling rate applied every iteration
    pub cooling_rate: f64,
    /// Initial sensitivity of the weight updates
    pub init_lambda: f64,
    /// Decay applied to lambda every iteration
    pub lambda_decay: f64,
}

impl Default for AlnsParameters {
    fn default() -> Self {
        AlnsParameters {
            n_iterations: 500,
            min_size_nbh: 1,
            random_seed: 1,
            init_temperature: 100.0,
            cooling_rate: 0.99,
            init_lambda: 0.5,
            lambda_decay: 0.99,
        }
    }
}

/// Final bookkeeping of one operator
#[derive(Debug, Clone, Serialize)]
pub struct OperatorStats {
    /// Operator number within its family (1-based)
    pub operator: usize,
    /// Normalized weight at termination
    pub weight: f64,
    /// How often the operator was applied
    pub uses: usize,
    /// Running mean wall time per application, in seconds
    pub mean_time: f64,
}

/// Result of one ALNS run
#[derive(Debug, Clone)]
pub struct AlnsOutcome {
    /// Best solution found
    pub best: Solution,
    /// Cost of the best solution
    pub best_cost: f64,
    /// Wall time of the run in seconds
    pub elapsed: f64,
    /// Number of iterations executed
    pub iterations: usize,
    /// Per-operator statistics of the destroy family
    pub destroy_stats: Vec<OperatorStats>,
    /// Per-operator statistics of the repair family
    pub repair_stats: Vec<OperatorStats>,
    /// Cost of the candidate solution at each iteration
    pub candidate_trend: Vec<f64>,
    /// Cost of the current solution at each iteration
    pub current_trend: Vec<f64>,
    /// Cost of the best solution at each iteration
    pub best_trend: Vec<f64>,
    /// Weight of each repair operator at each iteration
    pub repair_weight_trend: Vec<Vec<f64>>,
}

/// The ALNS search engine
pub struct Alns<'a> {
    problem: &'a TwoEcvrpInstance,
    params: AlnsParameters,
    n_destroy_ops: usize,
    n_repair_ops: usize,
    verbose: bool,

    w_destroy: Vec<f64>,
    t_destroy: Vec<f64>,
    e_destroy: Vec<f64>,
    used_destroy: Vec<usize>,
    w_repair: Vec<f64>,
    t_repair: Vec<f64>,
    e_repair: Vec<f64>,
    used_repair: Vec<usize>,

    lambda: f64,
    temperature: f64,
    rng: ChaCha8Rng,

    current: Solution,
    best: Solution,
    best_cost: f64,

    candidate_trend: Vec<f64>,
    current_trend: Vec<f64>,
    best_trend: Vec<f64>,
    repair_weight_trend: Vec<Vec<f64>>,
}

impl<'a> Alns<'a> {
    /// Create an engine over the given problem with the leading
    /// `n_destroy_ops`/`n_repair_ops` operators of each family enabled.
    pub fn new(
        problem: &'a TwoEcvrpInstance,
        n_destroy_ops: usize,
        n_repair_ops: usize,
        params: AlnsParameters,
        verbose: bool,
    ) -> Self {
        let n_destroy_ops = n_destroy_ops.clamp(1, N_DESTROY_OPS);
        let n_repair_ops = n_repair_ops.clamp(1, N_REPAIR_OPS);
        let lambda = params.init_lambda;
        let temperature = params.init_temperature;
        let rng = ChaCha8Rng::seed_from_u64(params.random_seed);

        Alns {
            problem,
            params,
            n_destroy_ops,
            n_repair_ops,
            verbose,
            w_destroy: vec![1.0; n_destroy_ops],
            t_destroy: vec![0.0; n_destroy_ops],
            e_destroy: vec![0.0; n_destroy_ops],
            used_destroy: vec![0; n_destroy_ops],
            w_repair: vec![1.0; n_repair_ops],
            t_repair: vec![0.0; n_repair_ops],
            e_repair: vec![0.0; n_repair_ops],
            used_repair: vec![0; n_repair_ops],
            lambda,
            temperature,
            rng,
            current: Solution::empty(problem),
            best: Solution::empty(problem),
            best_cost: f64::INFINITY,
            candidate_trend: Vec::new(),
            current_trend: Vec::new(),
            best_trend: Vec::new(),
            repair_weight_trend: vec![Vec::new(); n_repair_ops],
        }
    }

    /// Construct the initial solution by random insertion
    fn construct_initial_solution(&mut self) -> Result<(), String> {
        let mut solution = Solution::empty(self.problem);
        if !solution.random_insertion(&mut self.rng, self.problem) {
            return Err(format!(
                "cannot construct a feasible initial solution for {}",
                self.problem.name
            ));
        }
        solution.compute_cost();
        self.best = solution.clone();
        self.best_cost = solution.cost;
        self.current = solution;
        if self.verbose {
            log::info!("Created initial solution with cost {:.2}", self.best_cost);
        }
        Ok(())
    }

    /// Execute the ALNS and return the outcome
    pub fn run(&mut self) -> Result<AlnsOutcome, String> {
        let start = Instant::now();
        log::debug!(
            "ALNS on {} with {} destroy and {} repair operators",
            self.problem.name,
            self.n_destroy_ops,
            self.n_repair_ops
        );
        self.construct_initial_solution()?;

        let max_nbh = self.params.min_size_nbh.max(self.problem.n_locations() / 2);

        for i in 0..self.params.n_iterations {
            let mut temp = self.current.clone();
            let size_nbh = self.rng.gen_range(self.params.min_size_nbh..=max_nbh);
            let destroy_op = self.select_destroy_op();
            let repair_op = self.select_repair_op();

            self.destroy_and_repair(&mut temp, destroy_op, repair_op, size_nbh);
            temp.compute_cost();
            if self.verbose {
                log::debug!("Iteration {}: found solution with cost {:.2}", i, temp.cost);
            }

            let score = self.check_if_accept(&temp, destroy_op, repair_op);
            self.update_weights(destroy_op, repair_op, score);
            self.used_destroy[destroy_op] += 1;
            self.used_repair[repair_op] += 1;

            self.candidate_trend.push(temp.cost);
            self.current_trend.push(self.current.cost);
            self.best_trend.push(self.best_cost);
        }

        let elapsed = start.elapsed().as_secs_f64();
        let outcome = AlnsOutcome {
            best: self.best.clone(),
            best_cost: self.best_cost,
            elapsed,
            iterations: self.params.n_iterations,
            destroy_stats: Self::collect_stats(&self.w_destroy, &self.used_destroy, &self.t_destroy),
            repair_stats: Self::collect_stats(&self.w_repair, &self.used_repair, &self.t_repair),
            candidate_trend: self.candidate_trend.clone(),
            current_trend: self.current_trend.clone(),
            best_trend: self.best_trend.clone(),
            repair_weight_trend: self.repair_weight_trend.clone(),
        };

        log::info!(
            "Terminated {}. Final cost: {:.2}, wall time: {:.2}s",
            self.problem.name,
            outcome.best_cost,
            outcome.elapsed
        );
        Ok(outcome)
    }

    /// Apply one destroy and one repair operator to the candidate, keeping
    /// the running mean wall time and work count of both operators up to
    /// date.
    fn destroy_and_repair(
        &mut self,
        temp: &mut Solution,
        destroy_op: usize,
        repair_op: usize,
        size_nbh: usize,
    ) {
        let served_before = temp.served.len();

        let destroy_start = Instant::now();
        match destroy_op {
            0 => temp.random_removal(size_nbh, &mut self.rng, false, self.problem),
            1 => temp.related_removal(size_nbh, &mut self.rng, false, self.problem),
            2 => temp.worst_removal(size_nbh, &mut self.rng, false, false, self.problem),
            _ => temp.worst_removal(size_nbh, &mut self.rng, false, true, self.problem),
        }
        let t_destroy = destroy_start.elapsed().as_secs_f64();
        let removed = temp.not_served.len();

        let repair_start = Instant::now();
        let complete = match repair_op {
            0 => temp.random_insertion(&mut self.rng, self.problem),
            1 => temp.greedy_insertion(&mut self.rng, true, self.problem),
            _ => temp.regret_insertion(&mut self.rng, true, self.problem),
        };
        let t_repair = repair_start.elapsed().as_secs_f64();
        if !complete {
            log::warn!(
                "repair operator {} left {} customers unserved",
                repair_op + 1,
                temp.not_served.len()
            );
        }

        // wall times feed the reported statistics
        update_mean(
            &mut self.t_destroy[destroy_op],
            self.used_destroy[destroy_op],
            t_destroy,
        );
        update_mean(
            &mut self.t_repair[repair_op],
            self.used_repair[repair_op],
            t_repair,
        );
        // deterministic work units feed the selection, so that the operator
        // draws do not depend on machine timing
        update_mean(
            &mut self.e_destroy[destroy_op],
            self.used_destroy[destroy_op],
            destroy_effort(destroy_op, removed, served_before),
        );
        update_mean(
            &mut self.e_repair[repair_op],
            self.used_repair[repair_op],
            repair_effort(repair_op, removed, temp.routes_2.len()),
        );
    }

    /// Simulated-annealing acceptance. Returns the operator score: 2 for a
    /// new global best, 1 for an accepted solution, 0 for a rejected one.
    /// The temperature cools in every case.
    fn check_if_accept(&mut self, temp: &Solution, destroy_op: usize, repair_op: usize) -> f64 {
        if temp.cost < self.best_cost {
            self.best_cost = temp.cost;
            self.best = temp.clone();
            self.current = temp.clone();
            self.temperature *= self.params.cooling_rate;
            if self.verbose {
                log::debug!(
                    "New global best using destroy operator {} and repair operator {}",
                    destroy_op + 1,
                    repair_op + 1
                );
            }
            2.0
        } else {
            let diff = temp.cost - self.current.cost;
            let prob = (-diff / self.temperature).exp();
            let p = self.rng.gen::<f64>();
            self.temperature *= self.params.cooling_rate;
            if p < prob {
                self.current = temp.clone();
                1.0
            } else {
                0.0
            }
        }
    }

    /// Exponential smoothing of the weights of the two operators used,
    /// followed by a decay of lambda and renormalization of both families.
    fn update_weights(&mut self, destroy_op: usize, repair_op: usize, score: f64) {
        self.w_destroy[destroy_op] =
            (1.0 - self.lambda) * self.w_destroy[destroy_op] + self.lambda * score;
        self.w_repair[repair_op] =
            (1.0 - self.lambda) * self.w_repair[repair_op] + self.lambda * score;
        self.lambda *= self.params.lambda_decay;

        normalize(&mut self.w_destroy);
        normalize(&mut self.w_repair);

        for (k, trend) in self.repair_weight_trend.iter_mut().enumerate() {
            trend.push(self.w_repair[k]);
        }
    }

    /// Pick a destroy operator: weight-proportional while some operator is
    /// unused, then proportional to weight over mean work.
    fn select_destroy_op(&mut self) -> usize {
        let probs = selection_weights(&self.w_destroy, &self.e_destroy, &self.used_destroy);
        weighted_draw(&probs, &mut self.rng)
    }

    fn select_repair_op(&mut self) -> usize {
        let probs = selection_weights(&self.w_repair, &self.e_repair, &self.used_repair);
        weighted_draw(&probs, &mut self.rng)
    }

    fn collect_stats(weights: &[f64], uses: &[usize], times: &[f64]) -> Vec<OperatorStats> {
        weights
            .iter()
            .zip(uses)
            .zip(times)
            .enumerate()
            .map(|(i, ((&weight, &uses), &mean_time))| OperatorStats {
                operator: i + 1,
                weight,
                uses,
                mean_time,
            })
            .collect()
    }
}

/// Iteratively updated mean of a per-operator sample series
fn update_mean(mean: &mut f64, uses: usize, sample: f64) {
    if uses == 0 {
        *mean = sample;
    } else {
        *mean = (uses as f64 * *mean + sample) / (uses as f64 + 1.0);
    }
}

/// Work model of one destroy application. The random removal touches only
/// what it removes; the related and worst removals additionally scan the
/// served customers.
fn destroy_effort(destroy_op: usize, removed: usize, served_before: usize) -> f64 {
    let units = match destroy_op {
        0 => removed,
        1 => removed + served_before,
        _ => served_before,
    };
    units.max(1) as f64
}

/// Work model of one repair application. Random insertion probes routes
/// one at a time; greedy and regret insertion evaluate every route per
/// customer, with regret also maintaining its table.
fn repair_effort(repair_op: usize, inserted: usize, n_routes: usize) -> f64 {
    let units = match repair_op {
        0 => inserted,
        1 => inserted * n_routes.max(1),
        _ => inserted * (n_routes.max(1) + 1),
    };
    units.max(1) as f64
}

/// Cold phase: raw weights. Once every operator has been used at least
/// once, bias toward cheap-and-effective operators with weight over mean
/// work per application.
fn selection_weights(weights: &[f64], costs: &[f64], used: &[usize]) -> Vec<f64> {
    if used.contains(&0) {
        weights.to_vec()
    } else {
        weights
            .iter()
            .zip(costs)
            .map(|(w, c)| w / c.max(f64::MIN_POSITIVE))
            .collect()
    }
}

/// Probability-proportional selection by the inverse-CDF method
fn weighted_draw(weights: &[f64], rng: &mut ChaCha8Rng) -> usize {
    let total: f64 = weights.iter().sum();
    let mut roll = rng.gen::<f64>() * total;
    for (i, w) in weights.iter().enumerate() {
        roll -= w;
        if roll <= 0.0 {
            return i;
        }
    }
    weights.len() - 1
}

fn normalize(weights: &mut [f64]) {
    let sum: f64 = weights.iter().sum();
    if sum > 0.0 {
        for w in weights.iter_mut() {
            *w /= sum;
        }
    }
}
