//! Row types consumed and produced by the pipeline, with their file formats.

use std::{collections::HashMap, fs::File, io::{BufReader, BufWriter}, path::Path};

use chrono::NaiveDate;
use csv::ReaderBuilder;
use ndarray::Array1;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{DictError, Result};

/// A text to be scored: headline, survey response or tweet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// `YYYY-MM-DD`, anything after the first 10 characters is ignored
    pub date: String,
    #[serde(default, rename = "domain")]
    pub entity: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    pub textbody: String,
    /// output of the external text cleaner
    #[serde(default)]
    pub cleaned_textbody: Option<String>,
    /// survey sampling weight
    #[serde(default, rename = "weights")]
    pub weight: Option<f64>,
    /// survey respondent party leaning
    #[serde(default, rename = "partyln")]
    pub leaning: Option<String>,
    #[serde(default)]
    pub candidate: Option<String>,
}

/// One physical appearance of a headline (entity + date + path).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    #[serde(rename = "domain")]
    pub entity: String,
    pub date: String,
    pub path: String,
    pub textbody: String,
}

/// A scored unique text with its word and topic vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub date: NaiveDate,
    pub entity: Option<String>,
    pub path: Option<String>,
    pub textbody: String,
    pub cleaned_textbody: String,
    pub weight: Option<f64>,
    pub leaning: Option<String>,
    pub candidate: Option<String>,
    pub word_vec: Array1<f64>,
    pub topic_vec: Array1<f64>,
}

/// Parse the date prefix (`YYYY-MM-DD`) of a date or timestamp string
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    let prefix = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
        .map_err(|e| DictError::Data(format!("invalid date `{raw}`: {e}")))
}

/// Read a tab-separated file with a header row into typed rows
pub fn read_tsv<T, P>(path: P) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path.as_ref())?;
    let rows = rdr.deserialize().collect::<std::result::Result<Vec<T>, _>>()?;
    Ok(rows)
}

/// Write the scored-document cache (CBOR)
pub fn write_scored<P: AsRef<Path>>(path: P, docs: &[ScoredDocument]) -> Result<()> {
    let file = BufWriter::new(File::create(path.as_ref())?);
    serde_cbor::to_writer(file, &docs)?;
    Ok(())
}

/// Read the scored-document cache (CBOR)
pub fn read_scored<P: AsRef<Path>>(path: P) -> Result<Vec<ScoredDocument>> {
    let file = BufReader::new(File::open(path.as_ref())?);
    Ok(serde_cbor::from_reader(file)?)
}

/// Entity -> popularity weight mapping (JSON object)
pub fn read_popularity<P: AsRef<Path>>(path: P) -> Result<HashMap<String, f64>> {
    let file = BufReader::new(File::open(path.as_ref())?);
    Ok(serde_json::from_reader(file)?)
}

/// Keep rows dated within `[start, end]`
pub fn trim_period(docs: Vec<ScoredDocument>, start: NaiveDate, end: NaiveDate) -> Vec<ScoredDocument> {
    docs.into_iter().filter(|d| d.date >= start && d.date <= end).collect()
}
