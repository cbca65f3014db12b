//! Tracing of sampled rays from a point source to a termination cell.
//!
//! Each history starts at the source with an isotropic direction and is
//! walked boundary by boundary with the calling worker's internal ray until it
//! enters a termination cell. Histories run in parallel on a rayon pool and
//! their counts are reduced on the fly.

use std::fmt;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::error::Result;
use crate::kernel::{EntityId, GeometryKernel};
use crate::navigator::{current_thread_id, NavigationContext};

/// Crossings after which a history is abandoned, e.g. a ray trapped between
/// reflecting surfaces.
pub const MAX_CROSSINGS: usize = 100_000;

/// What happened to one traced ray.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryOutcome {
    pub crossings: usize,
    pub reflections: usize,
    pub path_length: f64,
    /// Termination cell the ray ended in, or `None` if it was abandoned.
    pub termination_cell: Option<EntityId>,
}

/// Totals over many histories.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistorySummary {
    pub histories: usize,
    pub terminated: usize,
    pub crossings: usize,
    pub reflections: usize,
    pub path_length: f64,
}

impl HistorySummary {
    fn record(mut self, outcome: &HistoryOutcome) -> Self {
        self.histories += 1;
        self.terminated += usize::from(outcome.termination_cell.is_some());
        self.crossings += outcome.crossings;
        self.reflections += outcome.reflections;
        self.path_length += outcome.path_length;
        self
    }

    fn merge(mut self, other: Self) -> Self {
        self.histories += other.histories;
        self.terminated += other.terminated;
        self.crossings += other.crossings;
        self.reflections += other.reflections;
        self.path_length += other.path_length;
        self
    }

    pub fn mean_path_length(&self) -> f64 {
        if self.histories == 0 {
            0.0
        } else {
            self.path_length / self.histories as f64
        }
    }
}

impl fmt::Display for HistorySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Histories:
  - Traced: {}
  - Terminated: {}
  - Boundary Crossings: {}
  - Reflections: {}
  - Mean Path Length: {:.6}
  ",
            self.histories,
            self.terminated,
            self.crossings,
            self.reflections,
            self.mean_path_length(),
        )
    }
}

/// Samples a direction uniformly on the unit sphere.
pub fn isotropic_direction<R: Rng>(rng: &mut R) -> Vector3<f64> {
    let mu: f64 = rng.random_range(-1.0..1.0);
    let phi: f64 = rng.random_range(0.0..std::f64::consts::TAU);
    let sin_theta = (1.0 - mu * mu).max(0.0).sqrt();
    Vector3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), mu)
}

/// Walks one ray on the given thread's internal ray until it reaches a
/// termination cell.
pub fn trace_history<K: GeometryKernel>(
    nav: &NavigationContext<K>,
    thread: usize,
    source: &Point3<f64>,
    direction: &Vector3<f64>,
    use_cell_cache: bool,
) -> Result<HistoryOutcome> {
    nav.set_internal_ray(thread, source, direction, use_cell_cache)?;

    let mut outcome = HistoryOutcome {
        crossings: 0,
        reflections: 0,
        path_length: 0.0,
        termination_cell: None,
    };
    let mut cell = nav.find_cell_containing_internal_ray(thread);

    while !nav.model().is_termination_cell(cell) {
        if outcome.crossings == MAX_CROSSINGS {
            return Ok(outcome);
        }
        let (_, distance) = nav.fire_internal_ray(thread)?;
        outcome.path_length += distance;
        if nav.advance_internal_ray_to_cell_boundary(thread)? {
            outcome.reflections += 1;
        }
        outcome.crossings += 1;
        cell = nav.find_cell_containing_internal_ray(thread);
    }
    outcome.termination_cell = Some(cell);
    Ok(outcome)
}

/// Traces `histories` rays from `source` on the current rayon pool.
///
/// With a seed, history `i` draws its direction from a generator seeded with
/// `seed + i`, so results do not depend on scheduling.
///
/// Panics if the pool has more workers than `nav` has internal ray slots.
pub fn run_histories<K: GeometryKernel>(
    nav: &NavigationContext<K>,
    source: &Point3<f64>,
    histories: usize,
    seed: Option<u64>,
    use_cell_cache: bool,
) -> Result<HistorySummary> {
    let workers = rayon::current_num_threads();
    assert!(
        workers <= nav.num_threads(),
        "a pool of {} workers needs enable_thread_support({}) or more, but the context has {} ray slots",
        workers,
        workers,
        nav.num_threads()
    );
    let start = Instant::now();

    let pb = ProgressBar::new(histories as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] {bar:40.green/blue} {pos:>5}/{len:5} {msg} ETA: {eta_precise}",
    ) {
        pb.set_style(style.progress_chars("█▇▆▅▄▃▂▁"));
    }
    pb.set_message("histories".to_string());

    let summary = (0..histories)
        .into_par_iter()
        .map(|i| {
            let direction = match seed {
                Some(seed) => isotropic_direction(&mut StdRng::seed_from_u64(seed.wrapping_add(i as u64))),
                None => isotropic_direction(&mut rand::rng()),
            };
            let outcome = trace_history(nav, current_thread_id(), source, &direction, use_cell_cache);
            pb.inc(1);
            outcome
        })
        .try_fold(HistorySummary::default, |acc, outcome| {
            outcome.map(|o| acc.record(&o))
        })
        .try_reduce(HistorySummary::default, |a, b| Ok(a.merge(b)))?;

    pb.finish_and_clear();
    info!(
        "traced {} histories in {:.2?}",
        summary.histories,
        start.elapsed()
    );
    Ok(summary)
}
