pub mod span;

use std::{collections::HashMap, sync::Once};

use indexmap::IndexMap;
use ndarray::Array1;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    dictionary::TopicDictionary,
    records::{parse_date, Document, ScoredDocument},
    utils::vector::normalize,
};
use self::span::{find_spans, resolve_overlaps, Span};

/// Per-word occurrence counts, indexed like `TopicDictionary::words`
pub type WordVector = Array1<f64>;
/// `topic_word_matrix · WordVector`
pub type TopicVector = Array1<f64>;

static MISSING_OVERLAP: Once = Once::new();

/// Count deduplicated keyword occurrences in a cleaned text.
///
/// Every keyword is searched as a whole word. When the dictionary carries an
/// overlap matrix, a keyword matched inside a longer overlapping keyword is
/// not counted (e.g. "trump" inside "trump campaign").
pub fn score(text: &str, dict: &TopicDictionary) -> WordVector {
    let mut spans: Vec<Vec<Span>> = dict.matchers.iter().map(|m| find_spans(m, text)).collect();
    match dict.overlap_matrix() {
        Some(overlap) => resolve_overlaps(&mut spans, overlap),
        None => MISSING_OVERLAP.call_once(|| {
            warn!("scoring without an overlap matrix; nested keywords are double counted");
        }),
    }
    spans.iter().map(|s| s.len() as f64).collect()
}

/// Project a word vector onto topics.
///
/// # Panics
/// when the vector length differs from the dictionary vocabulary size
pub fn project(word_vec: &WordVector, dict: &TopicDictionary) -> TopicVector {
    assert_eq!(word_vec.len(), dict.n_words(), "word vector length must match the dictionary");
    dict.topic_word_matrix().dot(word_vec)
}

/// Options for batch scoring
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreOptions {
    /// drop documents with no keyword at all
    pub drop_no_topic: bool,
    /// scale each topic vector to sum to one
    pub normalize_topic_vec: bool,
}

/// Result of `score_documents`
#[derive(Debug, Clone, Default)]
pub struct ScoreReport {
    pub documents: Vec<ScoredDocument>,
    /// rows with a missing or blank cleaned text, scored as all-zero
    pub failed: usize,
    /// rows skipped for an unparseable date
    pub skipped: usize,
    /// documents with at least one keyword, before `drop_no_topic`
    pub covered: usize,
    /// unique documents scored, before `drop_no_topic`
    pub total: usize,
}

impl ScoreReport {
    /// share of scored documents containing at least one keyword
    pub fn coverage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.covered as f64 / self.total as f64
        }
    }
}

/// Score a batch of documents in parallel.
///
/// One output row per unique `(candidate, textbody)`; vectors are computed once
/// per unique cleaned text and shared by every row that cleans to it.
pub fn score_documents(docs: &[Document], dict: &TopicDictionary, opts: &ScoreOptions) -> ScoreReport {
    let mut report = ScoreReport::default();

    // unique rows, first appearance wins
    let mut unique: IndexMap<(Option<&str>, &str), &Document> = IndexMap::new();
    for doc in docs {
        unique.entry((doc.candidate.as_deref(), doc.textbody.as_str())).or_insert(doc);
    }

    let cleaned_texts: Vec<&str> = {
        let mut seen: IndexMap<&str, ()> = IndexMap::new();
        for doc in unique.values() {
            if let Some(text) = usable_text(doc) {
                seen.insert(text, ());
            }
        }
        seen.into_keys().collect()
    };
    info!(rows = docs.len(), unique = unique.len(), texts = cleaned_texts.len(), "scoring documents");

    let vectors: HashMap<&str, (WordVector, TopicVector)> = cleaned_texts
        .par_iter()
        .map(|text| {
            let word_vec = score(text, dict);
            let mut topic_vec = project(&word_vec, dict);
            if opts.normalize_topic_vec {
                topic_vec = normalize(topic_vec.view(), 0.0);
            }
            (*text, (word_vec, topic_vec))
        })
        .collect();

    for doc in unique.into_values() {
        let date = match parse_date(&doc.date) {
            Ok(d) => d,
            Err(e) => {
                warn!(textbody = %doc.textbody, "skipping document: {e}");
                report.skipped += 1;
                continue;
            }
        };
        let (word_vec, topic_vec) = match usable_text(doc).and_then(|t| vectors.get(t)) {
            Some((w, t)) => (w.clone(), t.clone()),
            None => {
                report.failed += 1;
                (Array1::zeros(dict.n_words()), Array1::zeros(dict.n_topics()))
            }
        };
        report.total += 1;
        let has_keyword = word_vec.sum() > 0.0;
        if has_keyword {
            report.covered += 1;
        } else if opts.drop_no_topic {
            continue;
        }
        report.documents.push(ScoredDocument {
            date,
            entity: doc.entity.clone(),
            path: doc.path.clone(),
            textbody: doc.textbody.clone(),
            cleaned_textbody: doc.cleaned_textbody.clone().unwrap_or_default(),
            weight: doc.weight,
            leaning: doc.leaning.clone(),
            candidate: doc.candidate.clone(),
            word_vec,
            topic_vec,
        });
    }

    if report.failed > 0 {
        warn!(failed = report.failed, "documents without a usable cleaned text were scored as all-zero");
    }
    info!(
        scored = report.total,
        kept = report.documents.len(),
        coverage = report.coverage(),
        "finished counting topic keywords"
    );
    report
}

fn usable_text(doc: &Document) -> Option<&str> {
    doc.cleaned_textbody.as_deref().filter(|t| !t.trim().is_empty())
}
