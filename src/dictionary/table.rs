use std::{io::Read, path::Path};

use csv::ReaderBuilder;
use tracing::warn;

use crate::error::{DictError, Result};

/// One keyword assignment read from the dictionary table.
#[derive(Debug, Clone, PartialEq)]
pub struct DictRow {
    pub topic: String,
    pub word: String,
    pub relevance: f64,
    /// `None` when no weight column is used
    pub weight: Option<f64>,
}

/// Raw tab-separated keyword table.
/// Columns are kept by name because the relevance column is configurable.
#[derive(Debug, Clone, Default)]
pub struct DictTable {
    pub headers: Vec<String>,
    pub records: Vec<Vec<String>>,
}

impl DictTable {
    pub fn new(headers: Vec<String>, records: Vec<Vec<String>>) -> Self {
        Self { headers, records }
    }

    /// Read the table from a TSV file with a header row
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let headers = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let mut records = Vec::new();
        for rec in rdr.records() {
            let rec = rec?;
            records.push(rec.iter().map(|f| f.to_string()).collect());
        }
        Ok(Self { headers, records })
    }

    fn column(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| DictError::Data(format!("dictionary table has no `{name}` column")))
    }

    /// Extract typed rows.
    ///
    /// Rows with a blank relevance or weight cell fail the relevance filter
    /// and are left out.
    ///
    /// # Arguments
    /// * `relevance_col` - name of the relevance column (e.g. `if_reasonable`)
    /// * `weight_col` - optional per-row weight column
    pub fn rows(&self, relevance_col: &str, weight_col: Option<&str>) -> Result<Vec<DictRow>> {
        let topic_idx = self.column("topic")?;
        let word_idx = self.column("word")?;
        let rel_idx = self.column(relevance_col)?;
        let weight_idx = weight_col.map(|c| self.column(c)).transpose()?;

        let mut blank = 0usize;
        let mut rows = Vec::with_capacity(self.records.len());
        for (line, rec) in self.records.iter().enumerate() {
            let field = |idx: usize| rec.get(idx).map(|s| s.as_str()).unwrap_or("");
            let number = |idx: usize, what: &str| -> Result<Option<f64>> {
                let cell = field(idx).trim();
                if cell.is_empty() {
                    return Ok(None);
                }
                cell.parse::<f64>()
                    .map(Some)
                    .map_err(|_| DictError::Data(format!("row {}: {what} `{cell}` is not a number", line + 1)))
            };

            let Some(relevance) = number(rel_idx, relevance_col)? else {
                blank += 1;
                continue;
            };
            let weight = match weight_idx {
                Some(idx) => match number(idx, "weight")? {
                    Some(w) => Some(w),
                    None => {
                        blank += 1;
                        continue;
                    }
                },
                None => None,
            };
            rows.push(DictRow {
                topic: field(topic_idx).trim().to_string(),
                word: field(word_idx).to_string(),
                relevance,
                weight,
            });
        }
        if blank > 0 {
            warn!(blank, "dictionary rows with a blank relevance or weight cell were skipped");
        }
        Ok(rows)
    }
}
