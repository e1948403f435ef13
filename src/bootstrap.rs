//! Bootstrap resampling over the aggregator.
//!
//! Each run draws `round(sample_fraction × N)` sampling units (halves to
//! even) without replacement and re-aggregates them. For headlines the units are raw
//! occurrences, otherwise scored documents (see `aggregate::Prepared`).

use std::{
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
};

use ndarray::{Array, Array1, Array2, Array3, Dimension};
use ndarray_npy::{write_npy, WritableElement};
use rand::{seq::index::sample, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    aggregate::{AggregatedSeries, Aggregator, Prepared, Row},
    error::{DictError, Result},
};

/// progress is logged every this many finished runs
const PROGRESS_EVERY: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapOptions {
    pub runs: usize,
    /// share of sampling units drawn per run, in (0, 1]
    pub sample_fraction: f64,
    /// run `r` uses `seed + r`
    pub seed: u64,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self { runs: 200, sample_fraction: 0.8, seed: 0 }
    }
}

impl BootstrapOptions {
    fn validate(&self) -> Result<()> {
        if self.runs == 0 {
            return Err(DictError::Config("bootstrap needs at least one run".to_string()));
        }
        if !(self.sample_fraction > 0.0 && self.sample_fraction <= 1.0) {
            return Err(DictError::Config(format!(
                "sample fraction must be in (0, 1], got {}",
                self.sample_fraction
            )));
        }
        Ok(())
    }

    /// units drawn per run out of `n`, rounding halves to even
    pub fn sample_size(&self, n: usize) -> usize {
        ((self.sample_fraction * n as f64).round_ties_even() as usize).min(n)
    }
}

/// Draw one run's sample; deterministic in `(seed, run)`.
fn draw<'p>(prepared: &'p Prepared, opts: &BootstrapOptions, run: usize) -> Vec<&'p Row> {
    let mut rng = ChaCha8Rng::seed_from_u64(opts.seed.wrapping_add(run as u64));
    let n = prepared.len();
    sample(&mut rng, n, opts.sample_size(n))
        .into_iter()
        .filter_map(|i| prepared.units[i].as_ref())
        .collect()
}

fn run_all<T, F>(opts: &BootstrapOptions, task: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> Result<T> + Sync + Send,
{
    let done = AtomicUsize::new(0);
    (0..opts.runs)
        .into_par_iter()
        .map(|run| {
            let out = task(run)?;
            let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
            if finished % PROGRESS_EVERY == 0 || finished == opts.runs {
                info!(finished, runs = opts.runs, "bootstrap progress");
            }
            Ok(out)
        })
        .collect()
}

/// Time-bucketed bootstrap ensemble, shape `(runs, buckets, dim)`.
///
/// # Errors
/// - `DictError::Config` for zero runs or a fraction outside (0, 1]
/// - `DictError::Shape` when runs disagree on the time axis, which can only
///   happen without a forced window
/// - `DictError::Data` when a run has nothing to aggregate and no window
pub fn bootstrap_series(agg: &Aggregator<'_>, prepared: &Prepared, opts: &BootstrapOptions) -> Result<Array3<f64>> {
    opts.validate()?;
    let window = agg.options().force_time_window.len();
    if window == 0 {
        warn!("bootstrapping without a forced time window; runs may disagree on the time axis");
    }
    info!(runs = opts.runs, units = prepared.len(), draw = opts.sample_size(prepared.len()), "starting bootstrap");

    let runs: Vec<AggregatedSeries> = run_all(opts, |run| agg.series_of(draw(prepared, opts, run)))?;

    let dim = agg.dim();
    let buckets = if window > 0 { window } else { runs.first().map_or(0, |s| s.len()) };
    let mut out = Array3::<f64>::zeros((opts.runs, buckets, dim));
    for (r, series) in runs.iter().enumerate() {
        if series.len() != buckets || series.dim() != dim {
            return Err(DictError::Shape {
                expected: vec![opts.runs, buckets, dim],
                actual: vec![opts.runs, series.len(), series.dim()],
            });
        }
        out.index_axis_mut(ndarray::Axis(0), r).assign(series.values());
    }
    info!(shape = ?out.shape(), "bootstrap finished");
    Ok(out)
}

/// Whole-period bootstrap ensemble, shape `(runs, dim)`.
///
/// # Errors
/// `DictError::Config` for zero runs or a fraction outside (0, 1]
pub fn bootstrap_sum(agg: &Aggregator<'_>, prepared: &Prepared, opts: &BootstrapOptions) -> Result<Array2<f64>> {
    opts.validate()?;
    info!(runs = opts.runs, units = prepared.len(), draw = opts.sample_size(prepared.len()), "starting bootstrap");

    let runs: Vec<Array1<f64>> = run_all(opts, |run| agg.sum_of(draw(prepared, opts, run)))?;

    let dim = agg.dim();
    let mut out = Array2::<f64>::zeros((opts.runs, dim));
    for (r, total) in runs.iter().enumerate() {
        if total.len() != dim {
            return Err(DictError::Shape { expected: vec![opts.runs, dim], actual: vec![opts.runs, total.len()] });
        }
        out.row_mut(r).assign(total);
    }
    Ok(out)
}

/// Write an ensemble (or any dense array) as `.npy`
pub fn write_ensemble<P, A, D>(path: P, ensemble: &Array<A, D>) -> Result<()>
where
    P: AsRef<Path>,
    A: WritableElement,
    D: Dimension,
{
    write_npy(path, ensemble)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        aggregate::{AggregateOptions, Source, VectorKind},
        dictionary::{table::DictTable, DictionaryOptions, TopicDictionary},
        records::{parse_date, Occurrence, ScoredDocument},
    };

    fn dict() -> TopicDictionary {
        let table = DictTable::new(
            vec!["topic".into(), "word".into(), "if_reasonable".into()],
            vec![
                vec!["economy".into(), "jobs".into(), "1".into()],
                vec!["health".into(), "vaccine".into(), "1".into()],
            ],
        );
        TopicDictionary::load(&table, &DictionaryOptions::default()).unwrap()
    }

    fn docs(d: &TopicDictionary, n: usize) -> Vec<ScoredDocument> {
        (0..n)
            .map(|i| {
                let mut word_vec = Array1::zeros(d.n_words());
                word_vec[i % d.n_words()] = 1.0;
                ScoredDocument {
                    date: parse_date(if i % 2 == 0 { "2020-01-01" } else { "2020-01-02" }).unwrap(),
                    entity: None,
                    path: None,
                    textbody: format!("text {i}"),
                    cleaned_textbody: format!("text {i}"),
                    weight: None,
                    leaning: None,
                    candidate: None,
                    topic_vec: d.topic_word_matrix().dot(&word_vec),
                    word_vec,
                }
            })
            .collect()
    }

    fn word_opts(window: &[&str]) -> AggregateOptions {
        AggregateOptions {
            source: Source::Tweet,
            kind: VectorKind::Word,
            force_time_window: window.iter().map(|s| parse_date(s).unwrap()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn rejects_bad_options() {
        let d = dict();
        let opts = word_opts(&[]);
        let agg = Aggregator::new(&d, &opts).unwrap();
        let prepared = agg.prepare(&docs(&d, 4), None).unwrap();
        let zero = BootstrapOptions { runs: 0, ..Default::default() };
        assert!(matches!(bootstrap_sum(&agg, &prepared, &zero), Err(DictError::Config(_))));
        let frac = BootstrapOptions { sample_fraction: 1.5, ..Default::default() };
        assert!(matches!(bootstrap_series(&agg, &prepared, &frac), Err(DictError::Config(_))));
    }

    #[test]
    fn sample_size_rounds() {
        let o = BootstrapOptions { sample_fraction: 0.8, ..Default::default() };
        assert_eq!(o.sample_size(10), 8);
        assert_eq!(o.sample_size(3), 2);
        assert_eq!(o.sample_size(0), 0);
        let half = BootstrapOptions { sample_fraction: 0.5, ..Default::default() };
        assert_eq!(half.sample_size(5), 2);
        assert_eq!(half.sample_size(7), 4);
    }

    #[test]
    fn unequal_time_axes_are_shape_error() {
        let d = dict();
        let mut scored = docs(&d, 3);
        for (doc, date) in scored.iter_mut().zip(["2020-01-01", "2020-01-05", "2020-01-10"]) {
            doc.date = parse_date(date).unwrap();
        }
        let opts = word_opts(&[]);
        let agg = Aggregator::new(&d, &opts).unwrap();
        let prepared = agg.prepare(&scored, None).unwrap();
        // any two distinct pairs of dates span a different number of days
        let boot = BootstrapOptions { runs: 20, sample_fraction: 2.0 / 3.0, seed: 0 };
        assert_eq!(boot.sample_size(3), 2);
        let err = bootstrap_series(&agg, &prepared, &boot).unwrap_err();
        assert!(matches!(err, DictError::Shape { .. }), "{err:?}");

        // the whole-period sum has no time axis
        assert_eq!(bootstrap_sum(&agg, &prepared, &boot).unwrap().shape(), &[20, d.n_words()]);
    }

    #[test]
    fn series_shape_follows_window() {
        let d = dict();
        let opts = word_opts(&["2020-01-01", "2020-01-02", "2020-01-03"]);
        let agg = Aggregator::new(&d, &opts).unwrap();
        let prepared = agg.prepare(&docs(&d, 20), None).unwrap();
        let boot = BootstrapOptions { runs: 7, sample_fraction: 0.5, seed: 3 };
        let out = bootstrap_series(&agg, &prepared, &boot).unwrap();
        assert_eq!(out.shape(), &[7, 3, d.n_words()]);
        // every run draws 10 of 20 documents, each with one keyword
        for r in 0..7 {
            assert_eq!(out.index_axis(ndarray::Axis(0), r).sum(), 10.0);
        }
    }

    #[test]
    fn runs_are_deterministic_per_seed() {
        let d = dict();
        let opts = word_opts(&[]);
        let agg = Aggregator::new(&d, &opts).unwrap();
        let prepared = agg.prepare(&docs(&d, 30), None).unwrap();
        let boot = BootstrapOptions { runs: 5, sample_fraction: 0.3, seed: 42 };
        let a = bootstrap_sum(&agg, &prepared, &boot).unwrap();
        let b = bootstrap_sum(&agg, &prepared, &boot).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.shape(), &[5, d.n_words()]);
        assert!(a.rows().into_iter().all(|r| r.sum() == 9.0));
    }

    #[test]
    fn headline_samples_occurrences() {
        let d = dict();
        let scored = docs(&d, 1);
        let raw: Vec<Occurrence> = (0..10)
            .map(|i| Occurrence {
                entity: format!("site{i}.com"),
                date: "2020-01-01".into(),
                path: "/".into(),
                textbody: "text 0".into(),
            })
            .collect();
        let opts = AggregateOptions { source: Source::Headline, ..word_opts(&["2020-01-01"]) };
        let agg = Aggregator::new(&d, &opts).unwrap();
        let prepared = agg.prepare(&scored, Some(&raw)).unwrap();
        assert_eq!(prepared.len(), 10);
        let boot = BootstrapOptions { runs: 4, sample_fraction: 0.6, seed: 1 };
        let out = bootstrap_sum(&agg, &prepared, &boot).unwrap();
        assert!(out.rows().into_iter().all(|r| r.sum() == 6.0));
    }

    #[test]
    fn ensemble_writes_npy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ensemble.npy");
        write_ensemble(&path, &Array3::<f64>::zeros((2, 3, 4))).unwrap();
        assert!(path.metadata().unwrap().len() > 0);
    }
}
