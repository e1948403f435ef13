pub mod resample;
pub mod series;

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
    str::FromStr,
};

use chrono::NaiveDate;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    dictionary::TopicDictionary,
    error::{DictError, Result},
    postprocess::PostProcess,
    records::{parse_date, Occurrence, ScoredDocument},
};
use self::resample::{reindex, resample};
pub use self::series::AggregatedSeries;

/// Where the scored texts came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Headline,
    Survey,
    Tweet,
}

impl FromStr for Source {
    type Err = DictError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "headline" => Ok(Source::Headline),
            "survey" => Ok(Source::Survey),
            "tweet" => Ok(Source::Tweet),
            other => Err(DictError::Config(format!(
                "unknown data source `{other}` (expected headline, survey or tweet)"
            ))),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Source::Headline => "headline",
            Source::Survey => "survey",
            Source::Tweet => "tweet",
        })
    }
}

/// Which vector is aggregated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorKind {
    /// post-processed, majority-voted topic vectors
    Topic,
    /// raw keyword counts
    Word,
}

impl FromStr for VectorKind {
    type Err = DictError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "topic" | "topvec" => Ok(VectorKind::Topic),
            "word" | "wordvec" => Ok(VectorKind::Word),
            other => Err(DictError::Config(format!("unknown vector kind `{other}` (expected topic or word)"))),
        }
    }
}

/// Time bucket size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Day,
    /// weeks ending on Sunday
    Week,
}

impl FromStr for Granularity {
    type Err = DictError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "D" | "d" | "day" => Ok(Granularity::Day),
            "W" | "w" | "week" => Ok(Granularity::Week),
            other => Err(DictError::Config(format!("unknown granularity `{other}` (expected day or week)"))),
        }
    }
}

/// Aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateOptions {
    pub source: Source,
    pub kind: VectorKind,
    /// candidate label; required for topic vectors
    pub candidate: Option<String>,
    pub granularity: Granularity,
    /// headline only: keep occurrences from these entities (empty keeps all)
    pub select_domains: Vec<String>,
    /// survey only: keep respondents with this leaning
    pub select_leaning: Option<String>,
    /// headline only: scale by entity popularity
    pub weight_by_popularity: bool,
    /// entity -> popularity weight, unlisted entities weigh 0
    #[serde(skip)]
    pub popularity: Option<HashMap<String, f64>>,
    /// headline only: divide each (entity, date) sum by its distinct paths
    pub normalize_by_snapshot: bool,
    /// survey only: multiply by each response's sampling weight
    pub apply_survey_weights: bool,
    /// exact output date list, zero-filled
    pub force_time_window: Vec<NaiveDate>,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            source: Source::Headline,
            kind: VectorKind::Topic,
            candidate: None,
            granularity: Granularity::Day,
            select_domains: Vec::new(),
            select_leaning: None,
            weight_by_popularity: false,
            popularity: None,
            normalize_by_snapshot: true,
            apply_survey_weights: true,
            force_time_window: Vec::new(),
        }
    }
}

/// One sampling unit after joining and weighting.
#[derive(Debug, Clone)]
pub(crate) struct Row {
    /// `(entity, path)` for headline occurrences, grouped before resampling
    snapshot: Option<(String, String)>,
    date: NaiveDate,
    vec: Array1<f64>,
}

/// Rows ready for aggregation, one slot per input unit.
///
/// Units are raw occurrences for headlines and scored documents otherwise.
/// Units removed by a filter or the join stay as `None` so that resampling
/// draws from the full table.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub(crate) units: Vec<Option<Row>>,
    /// units removed by filters, failed joins or bad dates
    pub dropped: usize,
}

impl Prepared {
    /// number of sampling units
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// units that take part in aggregation
    pub fn n_rows(&self) -> usize {
        self.units.len() - self.dropped
    }
}

/// Aggregator
///
/// Borrows the dictionary and the options; the per-document topic pipeline is
/// resolved once at construction.
#[derive(Debug, Clone)]
pub struct Aggregator<'a> {
    dict: &'a TopicDictionary,
    opts: &'a AggregateOptions,
    post: Option<PostProcess>,
}

impl<'a> Aggregator<'a> {
    /// # Errors
    /// `DictError::Config` when topic vectors are requested without a
    /// candidate, or the dictionary lacks a topic the pipeline needs
    pub fn new(dict: &'a TopicDictionary, opts: &'a AggregateOptions) -> Result<Self> {
        let post = match opts.kind {
            VectorKind::Topic => {
                let candidate = opts.candidate.as_deref().ok_or_else(|| {
                    DictError::Config("topic aggregation needs a candidate label".to_string())
                })?;
                Some(PostProcess::new(dict, candidate)?)
            }
            VectorKind::Word => None,
        };
        Ok(Self { dict, opts, post })
    }

    pub fn options(&self) -> &AggregateOptions {
        self.opts
    }

    /// output vector length
    pub fn dim(&self) -> usize {
        match self.opts.kind {
            VectorKind::Topic => self.dict.n_topics(),
            VectorKind::Word => self.dict.n_words(),
        }
    }

    fn document_vector(&self, doc: &ScoredDocument) -> Array1<f64> {
        match &self.post {
            Some(post) => post.apply(&doc.topic_vec),
            None => doc.word_vec.clone(),
        }
    }

    /// Join, filter and weight the input tables.
    ///
    /// # Arguments
    /// * `scored` - one row per unique text
    /// * `occurrences` - raw appearance table, required for headlines
    pub fn prepare(&self, scored: &[ScoredDocument], occurrences: Option<&[Occurrence]>) -> Result<Prepared> {
        match self.opts.source {
            Source::Headline => {
                let occurrences = occurrences.ok_or_else(|| {
                    DictError::Config("headline aggregation needs the raw occurrence table".to_string())
                })?;
                Ok(self.prepare_headline(scored, occurrences))
            }
            Source::Survey | Source::Tweet => Ok(self.prepare_documents(scored)),
        }
    }

    fn popularity(&self) -> Option<&HashMap<String, f64>> {
        if !self.opts.weight_by_popularity {
            return None;
        }
        match &self.opts.popularity {
            Some(map) if !map.is_empty() => Some(map),
            _ => {
                warn!("popularity weighting requested without a popularity mapping; aggregating unweighted");
                None
            }
        }
    }

    fn prepare_headline(&self, scored: &[ScoredDocument], occurrences: &[Occurrence]) -> Prepared {
        let mut lookup: HashMap<&str, Array1<f64>> = HashMap::with_capacity(scored.len());
        for doc in scored {
            if !lookup.contains_key(doc.textbody.as_str()) {
                lookup.insert(doc.textbody.as_str(), self.document_vector(doc));
            }
        }
        let domains: HashSet<&str> = self.opts.select_domains.iter().map(|d| d.as_str()).collect();
        let popularity = self.popularity();

        let (mut filtered, mut unmatched, mut bad_date, mut unlisted) = (0usize, 0usize, 0usize, 0usize);
        let units: Vec<Option<Row>> = occurrences
            .iter()
            .map(|occ| {
                if !domains.is_empty() && !domains.contains(occ.entity.as_str()) {
                    filtered += 1;
                    return None;
                }
                let Some(vec) = lookup.get(occ.textbody.as_str()) else {
                    unmatched += 1;
                    return None;
                };
                let Ok(date) = parse_date(&occ.date) else {
                    bad_date += 1;
                    return None;
                };
                let vec = match popularity {
                    Some(map) => {
                        let w = map.get(&occ.entity).copied().unwrap_or_else(|| {
                            unlisted += 1;
                            0.0
                        });
                        vec * w
                    }
                    None => vec.clone(),
                };
                Some(Row {
                    snapshot: Some((occ.entity.clone(), occ.path.clone())),
                    date,
                    vec,
                })
            })
            .collect();

        if unmatched > 0 {
            warn!(unmatched, total = occurrences.len(), "occurrences without a scored text were dropped");
        }
        if bad_date > 0 {
            warn!(bad_date, "occurrences with an unparseable date were dropped");
        }
        if unlisted > 0 {
            debug!(unlisted, "occurrences from entities without a popularity weight count as 0");
        }
        debug!(filtered, "occurrences outside the selected domains");
        Prepared { units, dropped: filtered + unmatched + bad_date }
    }

    fn prepare_documents(&self, scored: &[ScoredDocument]) -> Prepared {
        let survey = self.opts.source == Source::Survey;
        let leaning = if survey { self.opts.select_leaning.as_deref() } else { None };
        let weighted = survey && self.opts.apply_survey_weights;

        let (mut filtered, mut missing_weight) = (0usize, 0usize);
        let units: Vec<Option<Row>> = scored
            .iter()
            .map(|doc| {
                if let Some(want) = leaning {
                    if doc.leaning.as_deref() != Some(want) {
                        filtered += 1;
                        return None;
                    }
                }
                let mut vec = self.document_vector(doc);
                if weighted {
                    let w = doc.weight.unwrap_or_else(|| {
                        missing_weight += 1;
                        1.0
                    });
                    vec *= w;
                }
                Some(Row { snapshot: None, date: doc.date, vec })
            })
            .collect();

        if missing_weight > 0 {
            warn!(missing_weight, "survey responses without a sampling weight count with weight 1");
        }
        debug!(filtered, "documents outside the selected leaning");
        Prepared { units, dropped: filtered }
    }

    /// Group by (entity, date) with per-snapshot normalization.
    /// Rows without a snapshot pass through unchanged.
    fn daily<'r, I>(&self, rows: I) -> Vec<(NaiveDate, Array1<f64>)>
    where
        I: IntoIterator<Item = &'r Row>,
    {
        let dim = self.dim();
        let mut out = Vec::new();
        let mut groups: BTreeMap<(&'r str, NaiveDate), (Array1<f64>, HashSet<&'r str>)> = BTreeMap::new();
        for row in rows {
            match &row.snapshot {
                Some((entity, path)) => {
                    let (acc, paths) = groups
                        .entry((entity.as_str(), row.date))
                        .or_insert_with(|| (Array1::zeros(dim), HashSet::new()));
                    *acc += &row.vec;
                    paths.insert(path.as_str());
                }
                None => out.push((row.date, row.vec.clone())),
            }
        }
        for ((_, date), (mut acc, paths)) in groups {
            if self.opts.normalize_by_snapshot && !paths.is_empty() {
                acc /= paths.len() as f64;
            }
            out.push((date, acc));
        }
        out
    }

    /// Time-bucketed aggregation of prepared rows.
    ///
    /// # Errors
    /// - `DictError::Data` when no row survives and no window is forced
    /// - `DictError::Shape` when the output length disagrees with the window
    pub fn series(&self, prepared: &Prepared) -> Result<AggregatedSeries> {
        self.series_of(prepared.units.iter().flatten())
    }

    pub(crate) fn series_of<'r, I>(&self, rows: I) -> Result<AggregatedSeries>
    where
        I: IntoIterator<Item = &'r Row>,
    {
        let dim = self.dim();
        let daily = self.daily(rows);
        let bucketed = resample(daily.iter().map(|(d, v)| (*d, v)), self.opts.granularity, dim);
        let window = &self.opts.force_time_window;
        let rows = if window.is_empty() {
            if bucketed.is_empty() {
                return Err(DictError::Data(format!(
                    "no {} rows left to aggregate and no time window forced",
                    self.opts.source
                )));
            }
            bucketed
        } else {
            let fixed = reindex(bucketed, window, dim);
            if fixed.len() != window.len() {
                return Err(DictError::Shape { expected: vec![window.len(), dim], actual: vec![fixed.len(), dim] });
            }
            fixed
        };
        AggregatedSeries::from_rows(rows, dim)
    }

    /// Whole-period sum of prepared rows; zeros when nothing survives.
    ///
    /// # Errors
    /// `DictError::Shape` when the sum length disagrees with the dictionary
    pub fn sum(&self, prepared: &Prepared) -> Result<Array1<f64>> {
        self.sum_of(prepared.units.iter().flatten())
    }

    pub(crate) fn sum_of<'r, I>(&self, rows: I) -> Result<Array1<f64>>
    where
        I: IntoIterator<Item = &'r Row>,
    {
        let dim = self.dim();
        let mut total = Array1::<f64>::zeros(dim);
        for (_, vec) in self.daily(rows) {
            if vec.len() != dim {
                return Err(DictError::Shape { expected: vec![dim], actual: vec![vec.len()] });
            }
            total += &vec;
        }
        Ok(total)
    }

    /// `prepare` then `series`, with a summary log line
    pub fn aggregate(&self, scored: &[ScoredDocument], occurrences: Option<&[Occurrence]>) -> Result<AggregatedSeries> {
        let prepared = self.prepare(scored, occurrences)?;
        let series = self.series(&prepared)?;
        info!(
            source = %self.opts.source,
            rows = prepared.n_rows(),
            dropped = prepared.dropped,
            buckets = series.len(),
            "aggregated vectors"
        );
        Ok(series)
    }

    /// `prepare` then `sum`
    pub fn aggregate_sum(&self, scored: &[ScoredDocument], occurrences: Option<&[Occurrence]>) -> Result<Array1<f64>> {
        let prepared = self.prepare(scored, occurrences)?;
        let total = self.sum(&prepared)?;
        info!(source = %self.opts.source, rows = prepared.n_rows(), "summed vectors over the whole period");
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::{table::DictTable, DictionaryOptions};
    use ndarray::array;

    fn dict() -> TopicDictionary {
        let rows = [
            ("government_ops", "congress"),
            ("election_campaign", "rally"),
            ("general_controversies", "scandal"),
            ("trump_controversies", "impeachment"),
            ("economy", "jobs"),
        ];
        let table = DictTable::new(
            vec!["topic".into(), "word".into(), "if_reasonable".into()],
            rows.iter().map(|(t, w)| vec![t.to_string(), w.to_string(), "1".into()]).collect(),
        );
        TopicDictionary::load(&table, &DictionaryOptions::default()).unwrap()
    }

    fn day(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    fn scored(d: &TopicDictionary, date: &str, text: &str, word: &str) -> ScoredDocument {
        let mut word_vec = Array1::zeros(d.n_words());
        word_vec[d.word_index(word).unwrap()] = 1.0;
        let topic_vec = d.topic_word_matrix().dot(&word_vec);
        ScoredDocument {
            date: day(date),
            entity: Some("cnn.com".into()),
            path: Some("/".into()),
            textbody: text.into(),
            cleaned_textbody: text.to_lowercase(),
            weight: None,
            leaning: None,
            candidate: Some("trump".into()),
            word_vec,
            topic_vec,
        }
    }

    fn occ(entity: &str, date: &str, path: &str, text: &str) -> Occurrence {
        Occurrence { entity: entity.into(), date: date.into(), path: path.into(), textbody: text.into() }
    }

    fn topic_opts(source: Source) -> AggregateOptions {
        AggregateOptions { source, candidate: Some("trump".into()), ..Default::default() }
    }

    #[test]
    fn source_names_parse() {
        assert_eq!("Headline".parse::<Source>().unwrap(), Source::Headline);
        assert_eq!("tweet".parse::<Source>().unwrap(), Source::Tweet);
        assert!(matches!("radio".parse::<Source>(), Err(DictError::Config(_))));
        assert_eq!("W".parse::<Granularity>().unwrap(), Granularity::Week);
    }

    #[test]
    fn topic_kind_requires_candidate() {
        let d = dict();
        let opts = AggregateOptions::default();
        assert!(matches!(Aggregator::new(&d, &opts), Err(DictError::Config(_))));
        let opts = AggregateOptions { kind: VectorKind::Word, ..Default::default() };
        assert_eq!(Aggregator::new(&d, &opts).unwrap().dim(), d.n_words());
    }

    #[test]
    fn headline_join_counts_repeats_and_normalizes_by_snapshot() {
        let d = dict();
        let docs = vec![scored(&d, "2020-01-01", "Jobs up", "jobs"), scored(&d, "2020-01-01", "Rally", "rally")];
        let raw = vec![
            occ("cnn.com", "2020-01-01", "/a", "Jobs up"),
            occ("cnn.com", "2020-01-01", "/b", "Jobs up"),
            occ("cnn.com", "2020-01-01", "/b", "Rally"),
            occ("fox.com", "2020-01-02", "/", "Jobs up"),
            occ("fox.com", "2020-01-02", "/", "never scored"),
        ];
        let opts = topic_opts(Source::Headline);
        let agg = Aggregator::new(&d, &opts).unwrap();
        let prepared = agg.prepare(&docs, Some(&raw)).unwrap();
        assert_eq!(prepared.len(), 5);
        assert_eq!(prepared.dropped, 1);

        let series = agg.series(&prepared).unwrap();
        assert_eq!(series.len(), 2);
        let economy = d.topic_index("economy").unwrap();
        let gov = d.topic_index("government_ops").unwrap();
        // cnn: two jobs + one campaign (merged into government_ops) over two paths
        assert_eq!(series.row(0)[economy], 1.0);
        assert_eq!(series.row(0)[gov], 0.5);
        assert_eq!(series.row(1)[economy], 1.0);

        let total = agg.sum(&prepared).unwrap();
        assert_eq!(total[economy], 2.0);
    }

    #[test]
    fn headline_requires_occurrences() {
        let d = dict();
        let opts = topic_opts(Source::Headline);
        let agg = Aggregator::new(&d, &opts).unwrap();
        assert!(matches!(agg.prepare(&[], None), Err(DictError::Config(_))));
    }

    #[test]
    fn popularity_weights_by_entity_with_zero_default() {
        let d = dict();
        let docs = vec![scored(&d, "2020-01-01", "Jobs up", "jobs")];
        let raw = vec![occ("cnn.com", "2020-01-01", "/", "Jobs up"), occ("blog.net", "2020-01-01", "/", "Jobs up")];
        let mut opts = topic_opts(Source::Headline);
        opts.weight_by_popularity = true;
        opts.popularity = Some(HashMap::from([("cnn.com".to_string(), 0.25)]));
        let agg = Aggregator::new(&d, &opts).unwrap();
        let total = agg.aggregate_sum(&docs, Some(&raw)).unwrap();
        assert_eq!(total[d.topic_index("economy").unwrap()], 0.25);

        // requested but missing: unweighted
        opts.popularity = None;
        let agg = Aggregator::new(&d, &opts).unwrap();
        let total = agg.aggregate_sum(&docs, Some(&raw)).unwrap();
        assert_eq!(total[d.topic_index("economy").unwrap()], 2.0);
    }

    #[test]
    fn select_domains_filters_occurrences() {
        let d = dict();
        let docs = vec![scored(&d, "2020-01-01", "Jobs up", "jobs")];
        let raw = vec![occ("cnn.com", "2020-01-01", "/", "Jobs up"), occ("fox.com", "2020-01-01", "/", "Jobs up")];
        let mut opts = AggregateOptions { kind: VectorKind::Word, ..Default::default() };
        opts.select_domains = vec!["fox.com".into()];
        let agg = Aggregator::new(&d, &opts).unwrap();
        let total = agg.aggregate_sum(&docs, Some(&raw)).unwrap();
        assert_eq!(total.sum(), 1.0);
    }

    #[test]
    fn survey_weights_and_leaning() {
        let d = dict();
        let mut a = scored(&d, "2020-01-01", "jobs", "jobs");
        a.weight = Some(2.0);
        a.leaning = Some("dem".into());
        let mut b = scored(&d, "2020-01-01", "impeachment", "impeachment");
        b.weight = Some(3.0);
        b.leaning = Some("rep".into());
        let docs = vec![a, b];

        let mut opts = topic_opts(Source::Survey);
        let agg = Aggregator::new(&d, &opts).unwrap();
        let total = agg.aggregate_sum(&docs, None).unwrap();
        assert_eq!(total.sum(), 5.0);

        opts.select_leaning = Some("rep".into());
        let agg = Aggregator::new(&d, &opts).unwrap();
        let total = agg.aggregate_sum(&docs, None).unwrap();
        assert_eq!(total[d.topic_index("trump_controversies").unwrap()], 3.0);
        assert_eq!(total.sum(), 3.0);
    }

    #[test]
    fn forced_window_zero_fills() {
        let d = dict();
        let docs = vec![scored(&d, "2020-01-02", "jobs", "jobs"), scored(&d, "2020-01-04", "rally", "rally")];
        let mut opts = topic_opts(Source::Tweet);
        opts.force_time_window = ["2020-01-01", "2020-01-02", "2020-01-03", "2020-01-04", "2020-01-05"]
            .iter()
            .map(|s| day(s))
            .collect();
        let agg = Aggregator::new(&d, &opts).unwrap();
        let series = agg.aggregate(&docs, None).unwrap();
        assert_eq!(series.len(), 5);
        assert_eq!(series.dim(), d.n_topics());
        let zero_rows = (0..5).filter(|&i| series.row(i).sum() == 0.0).count();
        assert_eq!(zero_rows, 3);
    }

    #[test]
    fn empty_input_without_window_is_data_error() {
        let d = dict();
        let opts = topic_opts(Source::Tweet);
        let agg = Aggregator::new(&d, &opts).unwrap();
        assert!(matches!(agg.aggregate(&[], None), Err(DictError::Data(_))));
        assert_eq!(agg.aggregate_sum(&[], None).unwrap(), Array1::<f64>::zeros(d.n_topics()));

        let opts = AggregateOptions { force_time_window: vec![day("2020-01-01")], ..topic_opts(Source::Tweet) };
        let agg = Aggregator::new(&d, &opts).unwrap();
        let series = agg.aggregate(&[], None).unwrap();
        assert_eq!(series.values(), &ndarray::Array2::<f64>::zeros((1, d.n_topics())));
    }

    #[test]
    fn keywordless_documents_vote_for_first_topic() {
        let d = dict();
        let mut blank = scored(&d, "2020-01-01", "Weather today", "jobs");
        blank.word_vec = Array1::zeros(d.n_words());
        blank.topic_vec = Array1::zeros(d.n_topics());
        let docs = vec![blank];

        for source in [Source::Tweet, Source::Survey] {
            let opts = topic_opts(source);
            let agg = Aggregator::new(&d, &opts).unwrap();
            let total = agg.aggregate_sum(&docs, None).unwrap();
            assert_eq!(total[0], 1.0, "{source}");
            assert_eq!(total.sum(), 1.0, "{source}");
        }

        let raw = vec![occ("cnn.com", "2020-01-01", "/", "Weather today")];
        let opts = topic_opts(Source::Headline);
        let agg = Aggregator::new(&d, &opts).unwrap();
        let series = agg.aggregate(&docs, Some(&raw)).unwrap();
        assert_eq!(series.row(0)[0], 1.0);
        assert_eq!(series.row(0).sum(), 1.0);
    }

    #[test]
    fn word_vectors_skip_post_processing() {
        let d = dict();
        let docs = vec![scored(&d, "2020-01-01", "rally", "rally")];
        let opts = AggregateOptions { source: Source::Tweet, kind: VectorKind::Word, ..Default::default() };
        let agg = Aggregator::new(&d, &opts).unwrap();
        let total = agg.aggregate_sum(&docs, None).unwrap();
        assert_eq!(total, docs[0].word_vec);
        assert_eq!(total, array![0.0, 1.0, 0.0, 0.0, 0.0]);
    }
}
