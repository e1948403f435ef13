pub mod index;
pub mod normalize;
pub mod serde;
pub mod table;

use std::{collections::BTreeMap, path::Path};

use indexmap::IndexSet;
use ndarray::Array2;
use regex::Regex;
use ::serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{DictError, Result};
use self::{index::TopicIndex, normalize::WordNormalizer, table::{DictRow, DictTable}};

/// sentinel topic appended to every freshly indexed dictionary
pub const NO_TOPIC: &str = "no_topic";

/// Post-hoc corrections applied to the keyword table after relevance filtering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EditingRules {
    /// (topic, word) pairs to delete, matched on the raw table values
    #[serde(default)]
    pub remove: Vec<(String, String)>,
    /// (topic, word, relevance) rows to insert
    #[serde(default)]
    pub add: Vec<(String, String, f64)>,
}

/// Options for `TopicDictionary::load`
#[derive(Debug, Clone)]
pub struct DictionaryOptions {
    pub relevance_column: String,
    pub min_relevance: f64,
    pub weight_column: Option<String>,
    pub editing_rules: EditingRules,
    pub normalizer: WordNormalizer,
    /// import topic indices instead of assigning them
    pub topic_index: Option<TopicIndex>,
    /// turn a `remove` rule that matches nothing into an error
    pub strict_edits: bool,
}

impl Default for DictionaryOptions {
    fn default() -> Self {
        Self {
            relevance_column: "if_reasonable".to_string(),
            min_relevance: 1.0,
            weight_column: None,
            editing_rules: EditingRules::default(),
            normalizer: WordNormalizer::new(),
            topic_index: None,
            strict_edits: false,
        }
    }
}

/// A normalized (topic, word) assignment that survived filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictEntry {
    pub topic: String,
    pub word: String,
    pub relevance: f64,
    pub weight: f64,
    pub n_tokens: usize,
}

/// Topic/word listing used for the JSON export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicWords {
    pub topic: String,
    pub words: Vec<String>,
}

/// Topic Dictionary
///
/// Immutable after construction. Holds
/// - the vocabulary of keyword phrases (longest phrase first)
/// - the topic set, including the `no_topic` sentinel
/// - the topic-word incidence matrix, `n_topics x n_words`
/// - the optional word overlap matrix, `n_words x n_words`
/// - one compiled whole-word matcher per keyword
///
/// The dictionary is `Sync` and is shared by reference across scoring workers.
#[derive(Debug, Clone)]
pub struct TopicDictionary {
    pub(crate) entries: Vec<DictEntry>,
    pub(crate) words: IndexSet<String>,
    pub(crate) topics: IndexSet<String>,
    pub(crate) topic_word_matrix: Array2<f64>,
    pub(crate) overlap_matrix: Option<Array2<f64>>,
    pub(crate) matchers: Vec<Regex>,
}

impl TopicDictionary {
    /// Read a TSV keyword table and build the dictionary
    pub fn from_tsv<P: AsRef<Path>>(path: P, opts: &DictionaryOptions) -> Result<Self> {
        let table = DictTable::from_tsv(path)?;
        Self::load(&table, opts)
    }

    /// Build the dictionary from a keyword table
    pub fn load(table: &DictTable, opts: &DictionaryOptions) -> Result<Self> {
        let rows = table.rows(&opts.relevance_column, opts.weight_column.as_deref())?;
        let total = rows.len();
        let mut rows: Vec<DictRow> = rows
            .into_iter()
            .filter(|r| r.relevance >= opts.min_relevance)
            .collect();
        debug!(kept = rows.len(), total, "filtered dictionary rows by relevance");

        for (topic, word) in &opts.editing_rules.remove {
            let before = rows.len();
            rows.retain(|r| !(r.topic == *topic && r.word == *word));
            if rows.len() == before {
                if opts.strict_edits {
                    return Err(DictError::Config(format!(
                        "remove rule ({topic}, {word}) matches no dictionary row"
                    )));
                }
                warn!(%topic, %word, "remove rule matches no dictionary row");
            }
        }
        for (topic, word, relevance) in &opts.editing_rules.add {
            rows.push(DictRow {
                topic: topic.clone(),
                word: word.clone(),
                relevance: *relevance,
                weight: opts.weight_column.as_ref().map(|_| 1.0),
            });
        }

        let mut entries: Vec<DictEntry> = Vec::with_capacity(rows.len());
        for row in rows {
            let (word, n_tokens) = opts.normalizer.normalize(&row.word);
            if word.is_empty() {
                warn!(topic = %row.topic, raw = %row.word, "keyword is empty after normalization, skipped");
                continue;
            }
            if entries.iter().any(|e| e.topic == row.topic && e.word == word) {
                continue;
            }
            entries.push(DictEntry {
                topic: row.topic,
                word,
                relevance: row.relevance,
                weight: row.weight.unwrap_or(1.0),
                n_tokens,
            });
        }
        // stable: ties keep table order
        entries.sort_by(|a, b| b.n_tokens.cmp(&a.n_tokens));

        let topics = match &opts.topic_index {
            Some(index) => {
                let topics = index.to_index_set();
                if let Some(e) = entries.iter().find(|e| !topics.contains(&e.topic)) {
                    return Err(DictError::Config(format!(
                        "topic `{}` is missing from the external topic index",
                        e.topic
                    )));
                }
                topics
            }
            None => {
                let mut topics: IndexSet<String> = entries.iter().map(|e| e.topic.clone()).collect();
                topics.insert(NO_TOPIC.to_string());
                topics
            }
        };
        let words: IndexSet<String> = entries.iter().map(|e| e.word.clone()).collect();

        let mut topic_word_matrix = Array2::<f64>::zeros((topics.len(), words.len()));
        for e in &entries {
            // both lookups succeed: sets were built from (or checked against) entries
            if let (Some(t), Some(w)) = (topics.get_index_of(&e.topic), words.get_index_of(&e.word)) {
                topic_word_matrix[[t, w]] += e.weight;
            }
        }

        let matchers = compile_matchers(&words)?;
        info!(topics = topics.len(), words = words.len(), "loaded topic dictionary");

        Ok(Self {
            entries,
            words,
            topics,
            topic_word_matrix,
            overlap_matrix: None,
            matchers,
        })
    }

    /// Build the word overlap matrix.
    /// `overlap[i][j] = 1` when word `i` occurs inside word `j` next to a space.
    /// O(n_words^2) containment checks; required before overlap-aware scoring.
    pub fn build_overlap_matrix(&mut self) {
        let n = self.words.len();
        let mut overlap = Array2::<f64>::zeros((n, n));
        for (i, wi) in self.words.iter().enumerate() {
            let leading = format!(" {wi}");
            let trailing = format!("{wi} ");
            for (j, wj) in self.words.iter().enumerate() {
                if i != j && (wj.contains(&leading) || wj.contains(&trailing)) {
                    overlap[[i, j]] = 1.0;
                }
            }
        }
        debug!(pairs = overlap.iter().filter(|v| **v != 0.0).count(), "built overlap matrix");
        self.overlap_matrix = Some(overlap);
    }

    #[inline]
    pub fn n_words(&self) -> usize {
        self.words.len()
    }

    #[inline]
    pub fn n_topics(&self) -> usize {
        self.topics.len()
    }

    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.words.iter().map(|w| w.as_str())
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(|t| t.as_str())
    }

    pub fn word(&self, index: usize) -> Option<&str> {
        self.words.get_index(index).map(|w| w.as_str())
    }

    pub fn topic(&self, index: usize) -> Option<&str> {
        self.topics.get_index(index).map(|t| t.as_str())
    }

    pub fn word_index(&self, word: &str) -> Option<usize> {
        self.words.get_index_of(word)
    }

    pub fn topic_index(&self, topic: &str) -> Option<usize> {
        self.topics.get_index_of(topic)
    }

    /// Index of a topic that post-processing requires
    pub fn require_topic(&self, topic: &str) -> Result<usize> {
        self.topic_index(topic)
            .ok_or_else(|| DictError::Config(format!("topic `{topic}` is not in the dictionary")))
    }

    pub fn entries(&self) -> &[DictEntry] {
        &self.entries
    }

    pub fn topic_word_matrix(&self) -> &Array2<f64> {
        &self.topic_word_matrix
    }

    pub fn overlap_matrix(&self) -> Option<&Array2<f64>> {
        self.overlap_matrix.as_ref()
    }

    pub fn has_overlap_matrix(&self) -> bool {
        self.overlap_matrix.is_some()
    }

    /// Current topic ordering, for persisting with `TopicIndex::write_json_files`
    pub fn topic_index_map(&self) -> TopicIndex {
        TopicIndex::from_ordered(self.topics.iter().cloned())
    }

    /// Group keywords by topic, topics sorted by name
    pub fn to_topic_words(&self) -> Vec<TopicWords> {
        let mut grouped: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for e in &self.entries {
            grouped.entry(e.topic.as_str()).or_default().push(e.word.clone());
        }
        grouped
            .into_iter()
            .map(|(topic, words)| TopicWords { topic: topic.to_string(), words })
            .collect()
    }

    /// Write `to_topic_words()` as pretty JSON
    pub fn write_topic_words_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::io::BufWriter::new(std::fs::File::create(path.as_ref())?);
        serde_json::to_writer_pretty(file, &self.to_topic_words())?;
        Ok(())
    }
}

/// `\b<word>\b` matcher per keyword, in index order
pub(crate) fn compile_matchers(words: &IndexSet<String>) -> Result<Vec<Regex>> {
    words
        .iter()
        .map(|w| {
            Regex::new(&format!(r"\b{}\b", regex::escape(w)))
                .map_err(|e| DictError::Config(format!("keyword `{w}` cannot be matched: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[(&str, &str, &str)]) -> DictTable {
        DictTable::new(
            vec!["topic".into(), "word".into(), "if_reasonable".into()],
            rows.iter().map(|(t, w, r)| vec![t.to_string(), w.to_string(), r.to_string()]).collect(),
        )
    }

    #[test]
    fn filters_by_relevance_and_sorts_longest_first() {
        let t = table(&[
            ("candidate", "trump", "2"),
            ("election_campaign", "trump campaign", "2"),
            ("economy", "jobs", "0"),
        ]);
        let dict = TopicDictionary::load(&t, &DictionaryOptions::default()).unwrap();
        assert_eq!(dict.n_words(), 2);
        assert_eq!(dict.word(0), Some("trump campaign"));
        assert_eq!(dict.word(1), Some("trump"));
        assert_eq!(dict.word_index("jobs"), None);
        // topics keep first appearance in the sorted table, then the sentinel
        assert_eq!(dict.topics().collect::<Vec<_>>(), vec!["election_campaign", "candidate", NO_TOPIC]);
        assert_eq!(dict.topic_word_matrix().dim(), (3, 2));
    }

    #[test]
    fn matrix_counts_shared_words_per_topic() {
        let t = table(&[
            ("economy", "tax", "1"),
            ("government_ops", "tax", "1"),
            ("economy", "Tax", "1"),
        ]);
        let dict = TopicDictionary::load(&t, &DictionaryOptions::default()).unwrap();
        assert_eq!(dict.n_words(), 1);
        let m = dict.topic_word_matrix();
        assert_eq!(m[[dict.topic_index("economy").unwrap(), 0]], 1.0);
        assert_eq!(m[[dict.topic_index("government_ops").unwrap(), 0]], 1.0);
        assert_eq!(m[[dict.topic_index(NO_TOPIC).unwrap(), 0]], 0.0);
    }

    #[test]
    fn editing_rules_remove_and_add() {
        let t = table(&[("election_campaign", "clinton", "2"), ("economy", "jobs", "2")]);
        let mut opts = DictionaryOptions::default();
        opts.editing_rules.remove.push(("election_campaign".into(), "clinton".into()));
        opts.editing_rules.add.push(("health".into(), "vaccine".into(), 2.0));
        let dict = TopicDictionary::load(&t, &opts).unwrap();
        assert!(dict.word_index("clinton").is_none());
        assert!(dict.word_index("vaccine").is_some());
        assert!(dict.topic_index("election_campaign").is_none());
    }

    #[test]
    fn strict_edits_reject_unknown_remove() {
        let t = table(&[("economy", "jobs", "2")]);
        let mut opts = DictionaryOptions::default();
        opts.editing_rules.remove.push(("economy".into(), "taxes".into()));
        assert!(TopicDictionary::load(&t, &opts).is_ok());
        opts.strict_edits = true;
        assert!(matches!(TopicDictionary::load(&t, &opts), Err(DictError::Config(_))));
    }

    #[test]
    fn external_topic_index_fixes_positions() {
        let t = table(&[("economy", "jobs", "2")]);
        let mut opts = DictionaryOptions::default();
        opts.topic_index = Some(TopicIndex::from_ordered(["health", "economy", NO_TOPIC]));
        let dict = TopicDictionary::load(&t, &opts).unwrap();
        assert_eq!(dict.topic_index("economy"), Some(1));
        assert_eq!(dict.n_topics(), 3);

        opts.topic_index = Some(TopicIndex::from_ordered(["health", NO_TOPIC]));
        assert!(matches!(TopicDictionary::load(&t, &opts), Err(DictError::Config(_))));
    }

    #[test]
    fn weight_column_accumulates_weights() {
        let t = DictTable::new(
            vec!["topic".into(), "word".into(), "if_reasonable".into(), "w".into()],
            vec![vec!["economy".into(), "jobs".into(), "1".into(), "0.25".into()]],
        );
        let opts = DictionaryOptions { weight_column: Some("w".into()), ..Default::default() };
        let dict = TopicDictionary::load(&t, &opts).unwrap();
        assert_eq!(dict.topic_word_matrix()[[0, 0]], 0.25);
    }

    #[test]
    fn overlap_matrix_flags_space_bounded_substrings() {
        let t = table(&[
            ("candidate", "trump", "1"),
            ("election_campaign", "trump campaign", "1"),
            ("economy", "trumpet", "1"),
            ("economy", "campaign", "1"),
        ]);
        let mut dict = TopicDictionary::load(&t, &DictionaryOptions::default()).unwrap();
        assert!(!dict.has_overlap_matrix());
        dict.build_overlap_matrix();
        let o = dict.overlap_matrix().unwrap();
        let idx = |w: &str| dict.word_index(w).unwrap();
        assert_eq!(o[[idx("trump"), idx("trump campaign")]], 1.0);
        assert_eq!(o[[idx("campaign"), idx("trump campaign")]], 1.0);
        assert_eq!(o[[idx("trump campaign"), idx("trump")]], 0.0);
        assert_eq!(o[[idx("trump"), idx("trumpet")]], 0.0);
        for i in 0..dict.n_words() {
            assert_eq!(o[[i, i]], 0.0);
        }
    }

    #[test]
    fn topic_words_export_groups_by_topic() {
        let t = table(&[("economy", "jobs", "1"), ("economy", "tax cuts", "1"), ("health", "vaccine", "1")]);
        let dict = TopicDictionary::load(&t, &DictionaryOptions::default()).unwrap();
        let out = dict.to_topic_words();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].topic, "economy");
        assert_eq!(out[0].words, vec!["tax cuts".to_string(), "jobs".to_string()]);
    }
}
