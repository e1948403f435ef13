use std::{fs::File, io::{BufReader, BufWriter}, path::Path};

use indexmap::IndexSet;
use ndarray::Array2;
use serde::{ser::SerializeStruct, Deserialize, Serialize};

use crate::{dictionary::{compile_matchers, DictEntry, TopicDictionary}, error::{DictError, Result}};

/// Serializable form of `TopicDictionary`.
/// Compiled matchers are not stored; `into_topic_dictionary` rebuilds them.
#[derive(Debug, Deserialize)]
pub struct DictionaryData {
    pub entries: Vec<DictEntry>,
    pub words: Vec<String>,
    pub topics: Vec<String>,
    pub topic_word_matrix: Array2<f64>,
    pub overlap_matrix: Option<Array2<f64>>,
}

impl DictionaryData {
    /// Convert into a `TopicDictionary`, validating matrix shapes
    pub fn into_topic_dictionary(self) -> Result<TopicDictionary> {
        let words: IndexSet<String> = self.words.into_iter().collect();
        let topics: IndexSet<String> = self.topics.into_iter().collect();
        let expected = vec![topics.len(), words.len()];
        let actual = self.topic_word_matrix.shape().to_vec();
        if actual != expected {
            return Err(DictError::Shape { expected, actual });
        }
        if let Some(overlap) = &self.overlap_matrix {
            let expected = vec![words.len(), words.len()];
            let actual = overlap.shape().to_vec();
            if actual != expected {
                return Err(DictError::Shape { expected, actual });
            }
        }
        let matchers = compile_matchers(&words)?;
        Ok(TopicDictionary {
            entries: self.entries,
            words,
            topics,
            topic_word_matrix: self.topic_word_matrix,
            overlap_matrix: self.overlap_matrix,
            matchers,
        })
    }
}

impl Serialize for TopicDictionary {
    /// Serialize without the compiled matchers.
    /// Use `DictionaryData` to deserialize.
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("TopicDictionary", 5)?;
        state.serialize_field("entries", &self.entries)?;
        state.serialize_field("words", &self.words)?;
        state.serialize_field("topics", &self.topics)?;
        state.serialize_field("topic_word_matrix", &self.topic_word_matrix)?;
        state.serialize_field("overlap_matrix", &self.overlap_matrix)?;
        state.end()
    }
}

impl TopicDictionary {
    /// Persist the dictionary as CBOR
    pub fn save_cbor<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = BufWriter::new(File::create(path.as_ref())?);
        serde_cbor::to_writer(file, self)?;
        Ok(())
    }

    /// Load a dictionary written by `save_cbor`
    pub fn load_cbor<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = BufReader::new(File::open(path.as_ref())?);
        let data: DictionaryData = serde_cbor::from_reader(file)?;
        data.into_topic_dictionary()
    }
}
