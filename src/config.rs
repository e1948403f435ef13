//! Run configuration, read from a JSON file.

use std::{fs::File, io::BufReader, path::{Path, PathBuf}};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    aggregate::AggregateOptions,
    bootstrap::BootstrapOptions,
    dictionary::{index::TopicIndex, DictionaryOptions, EditingRules, TopicDictionary},
    error::{DictError, Result},
    scorer::ScoreOptions,
};

/// Dictionary loading settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DictionaryConfig {
    /// keyword table (TSV)
    pub path: Option<PathBuf>,
    pub relevance_column: String,
    pub min_relevance: f64,
    pub weight_column: Option<String>,
    pub editing_rules: EditingRules,
    /// `index -> topic` JSON, given together with `topic2index`
    pub index2topic: Option<PathBuf>,
    pub topic2index: Option<PathBuf>,
    pub strict_edits: bool,
    /// build the overlap matrix after loading
    pub resolve_overlaps: bool,
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        let opts = DictionaryOptions::default();
        Self {
            path: None,
            relevance_column: opts.relevance_column,
            min_relevance: opts.min_relevance,
            weight_column: None,
            editing_rules: EditingRules::default(),
            index2topic: None,
            topic2index: None,
            strict_edits: false,
            resolve_overlaps: true,
        }
    }
}

impl DictionaryConfig {
    /// Loader options; reads the external topic index when configured.
    ///
    /// # Errors
    /// `DictError::Config` when only one of the two index files is given
    pub fn to_options(&self) -> Result<DictionaryOptions> {
        let topic_index = match (&self.index2topic, &self.topic2index) {
            (Some(i2t), Some(t2i)) => Some(TopicIndex::from_json_files(i2t, t2i)?),
            (None, None) => None,
            _ => {
                return Err(DictError::Config(
                    "index2topic and topic2index must be given together".to_string(),
                ))
            }
        };
        Ok(DictionaryOptions {
            relevance_column: self.relevance_column.clone(),
            min_relevance: self.min_relevance,
            weight_column: self.weight_column.clone(),
            editing_rules: self.editing_rules.clone(),
            topic_index,
            strict_edits: self.strict_edits,
            ..Default::default()
        })
    }

    /// Load the dictionary from `path`, building the overlap matrix when enabled.
    pub fn load(&self) -> Result<TopicDictionary> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| DictError::Config("no dictionary path configured".to_string()))?;
        let mut dict = TopicDictionary::from_tsv(path, &self.to_options()?)?;
        if self.resolve_overlaps {
            dict.build_overlap_matrix();
        }
        Ok(dict)
    }
}

/// Whole-run settings. Every section falls back to its defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub dictionary: DictionaryConfig,
    pub scoring: ScoreOptions,
    pub aggregate: AggregateOptions,
    pub bootstrap: BootstrapOptions,
    /// entity -> weight JSON, used when `aggregate.weight_by_popularity` is set
    pub popularity_path: Option<PathBuf>,
    /// keep scored documents dated on or after this day
    pub period_start: Option<NaiveDate>,
    /// keep scored documents dated on or before this day
    pub period_end: Option<NaiveDate>,
}

impl RunConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = BufReader::new(File::open(path.as_ref())?);
        let config: Self = serde_json::from_reader(file)?;
        info!(path = %path.as_ref().display(), "loaded run configuration");
        Ok(config)
    }
}
