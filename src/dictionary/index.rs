use std::{collections::HashMap, fs::File, io::BufWriter, path::Path};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::error::{DictError, Result};

/// Persisted topic index.
/// Keeps topic-vector positions stable across independently rebuilt
/// dictionary versions.
///
/// On disk it is two string keyed JSON objects, `index -> topic` and
/// `topic -> index`, which must agree with each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicIndex {
    /// topics ordered by index
    topics: Vec<String>,
}

impl TopicIndex {
    /// Build from topics already in index order
    pub fn from_ordered<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { topics: topics.into_iter().map(Into::into).collect() }
    }

    /// Build from the two mapping objects, checking they are a bijection
    /// over `0..n`.
    pub fn from_maps(
        index2topic: &HashMap<String, String>,
        topic2index: &HashMap<String, usize>,
    ) -> Result<Self> {
        let n = topic2index.len();
        if index2topic.len() != n {
            return Err(DictError::Config(format!(
                "topic index files disagree: {} indices vs {} topics",
                index2topic.len(),
                n
            )));
        }
        let mut slots: Vec<Option<String>> = vec![None; n];
        for (topic, &idx) in topic2index {
            if idx >= n {
                return Err(DictError::Config(format!("topic `{topic}` has out of range index {idx}")));
            }
            if slots[idx].is_some() {
                return Err(DictError::Config(format!("topic index {idx} assigned twice")));
            }
            match index2topic.get(&idx.to_string()) {
                Some(t) if t == topic => {}
                other => {
                    return Err(DictError::Config(format!(
                        "index {idx} maps to {other:?} but topic `{topic}` maps to {idx}"
                    )))
                }
            }
            slots[idx] = Some(topic.clone());
        }
        // bijection check above guarantees every slot is filled
        let topics = slots.into_iter().flatten().collect();
        Ok(Self { topics })
    }

    /// Read `index -> topic` and `topic -> index` JSON files
    pub fn from_json_files<P: AsRef<Path>>(index2topic: P, topic2index: P) -> Result<Self> {
        let i2t: HashMap<String, String> = serde_json::from_reader(File::open(index2topic.as_ref())?)?;
        let t2i: HashMap<String, usize> = serde_json::from_reader(File::open(topic2index.as_ref())?)?;
        Self::from_maps(&i2t, &t2i)
    }

    /// Write both mapping files
    pub fn write_json_files<P: AsRef<Path>>(&self, index2topic: P, topic2index: P) -> Result<()> {
        let i2t: HashMap<String, &str> = self
            .topics
            .iter()
            .enumerate()
            .map(|(i, t)| (i.to_string(), t.as_str()))
            .collect();
        let t2i: HashMap<&str, usize> = self.topics.iter().enumerate().map(|(i, t)| (t.as_str(), i)).collect();
        serde_json::to_writer_pretty(BufWriter::new(File::create(index2topic.as_ref())?), &i2t)?;
        serde_json::to_writer_pretty(BufWriter::new(File::create(topic2index.as_ref())?), &t2i)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub(crate) fn to_index_set(&self) -> IndexSet<String> {
        self.topics.iter().cloned().collect()
    }
}
