//! This crate scores texts against a curated topic dictionary and aggregates
//! the resulting vectors over time windows, with bootstrap resampling.
pub mod aggregate;
pub mod bootstrap;
pub mod config;
pub mod dictionary;
pub mod error;
pub mod postprocess;
pub mod records;
pub mod scorer;
pub mod utils;

/// Topic Dictionary
/// The top-level struct of this crate.
/// It turns a keyword table into an ordered vocabulary of keyword phrases, a
/// topic set and a topic-word incidence matrix.
///
/// Internally, it holds:
/// - The keyword phrases, longest first
/// - The topics, with the `no_topic` sentinel
/// - The topic-word matrix
/// - The optional word overlap matrix
/// - One compiled whole-word matcher per keyword
///
/// The dictionary is immutable once built (apart from building the overlap
/// matrix) and is shared by reference across scoring threads.
///
/// # Serialization
/// Supported. Compiled matchers are skipped.
///
/// # Deserialization
/// Through `DictionaryData::into_topic_dictionary`, which recompiles the matchers.
pub use dictionary::TopicDictionary;

/// Topic Dictionary Data Structure for Serialization
/// A plain-data snapshot of `TopicDictionary` without compiled matchers.
/// Convert it back with `into_topic_dictionary`.
pub use dictionary::serde::DictionaryData;

/// Dictionary loading options and keyword edits
pub use dictionary::{DictionaryOptions, EditingRules};

/// External topic index
/// Fixes topic positions across dictionary rebuilds.
/// Read from and written to a pair of JSON files (`index -> topic`, `topic -> index`).
pub use dictionary::index::TopicIndex;

/// Lemmatizer / stemmer hook
/// The crate ships no linguistic models. Any `Fn(&str) -> String + Send + Sync`
/// works as a `TokenTransform`.
pub use dictionary::normalize::{TokenTransform, WordNormalizer};

/// Text scoring
/// - `score`: keyword occurrence counts of one cleaned text, with nested keywords
///   resolved in favour of the longer phrase
/// - `project`: word vector to topic vector
/// - `score_documents`: parallel batch scoring with deduplication and coverage report
pub use scorer::{project, score, score_documents, ScoreOptions, ScoreReport, TopicVector, WordVector};

/// Topic post-processing
/// Merge `election_campaign` into `government_ops`, fold `general_controversies`
/// into the candidate's controversies, then take the majority vote.
pub use postprocess::{collapse_general_controversies, majority_vote, merge_topic, PostProcess};

/// Aggregation
/// Groups scored documents by entity and day, resamples onto a dense day or week
/// axis and optionally reindexes onto a forced date window.
pub use aggregate::{AggregateOptions, AggregatedSeries, Aggregator, Granularity, Prepared, Source, VectorKind};

/// Bootstrap resampling
/// Re-runs the aggregator on random subsets, in parallel and seeded per run.
pub use bootstrap::{bootstrap_series, bootstrap_sum, write_ensemble, BootstrapOptions};

pub use config::{DictionaryConfig, RunConfig};
pub use error::{DictError, Result};
pub use records::{Document, Occurrence, ScoredDocument};
