use std::path::Path;

use chrono::NaiveDate;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{DictError, Result};

/// Aggregated vectors on a dense time axis.
///
/// `values` has one row per date, `values.ncols()` is the topic or word count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSeries {
    dates: Vec<NaiveDate>,
    values: Array2<f64>,
}

impl AggregatedSeries {
    pub(crate) fn from_rows(rows: Vec<(NaiveDate, Array1<f64>)>, dim: usize) -> Result<Self> {
        let mut values = Array2::<f64>::zeros((rows.len(), dim));
        let mut dates = Vec::with_capacity(rows.len());
        for (i, (date, vec)) in rows.into_iter().enumerate() {
            if vec.len() != dim {
                return Err(DictError::Shape { expected: vec![dim], actual: vec![vec.len()] });
            }
            values.row_mut(i).assign(&vec);
            dates.push(date);
        }
        Ok(Self { dates, values })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// number of time buckets
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// vector length per bucket
    pub fn dim(&self) -> usize {
        self.values.ncols()
    }

    pub fn row(&self, index: usize) -> ArrayView1<'_, f64> {
        self.values.row(index)
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn to_array(&self) -> Array2<f64> {
        self.values.clone()
    }

    pub fn into_array(self) -> Array2<f64> {
        self.values
    }

    /// Write as CSV with a `date` column followed by one column per label.
    ///
    /// # Arguments
    /// * `labels` - column names, usually the dictionary topics or words
    ///
    /// # Errors
    /// `DictError::Shape` when the label count differs from the vector length
    pub fn write_csv<P, S>(&self, path: P, labels: &[S]) -> Result<()>
    where
        P: AsRef<Path>,
        S: AsRef<str>,
    {
        if labels.len() != self.dim() {
            return Err(DictError::Shape { expected: vec![self.dim()], actual: vec![labels.len()] });
        }
        let mut wtr = csv::Writer::from_path(path.as_ref())?;
        let mut header = Vec::with_capacity(labels.len() + 1);
        header.push("date");
        header.extend(labels.iter().map(|l| l.as_ref()));
        wtr.write_record(&header)?;
        for (date, row) in self.dates.iter().zip(self.values.rows()) {
            let mut record = Vec::with_capacity(row.len() + 1);
            record.push(date.format("%Y-%m-%d").to_string());
            record.extend(row.iter().map(|v| v.to_string()));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}
