//! Data loading utilities

use crate::error::{ForestError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Marker the training CSVs use for missing values
pub const DEFAULT_NULL_MARKER: &str = "na";

/// CSV loader for training and scoring files
#[derive(Debug, Clone)]
pub struct DataLoader {
    separator: u8,
    null_values: Vec<String>,
    infer_schema_length: Option<usize>,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    /// Comma-separated, header row, `na` as null
    pub fn new() -> Self {
        Self {
            separator: b',',
            null_values: vec![DEFAULT_NULL_MARKER.to_string()],
            infer_schema_length: Some(1000),
        }
    }

    pub fn with_separator(mut self, separator: u8) -> Self {
        self.separator = separator;
        self
    }

    pub fn with_null_values(mut self, values: Vec<String>) -> Self {
        self.null_values = values;
        self
    }

    /// `None` scans the whole file before fixing column types
    pub fn with_infer_schema_length(mut self, n: Option<usize>) -> Self {
        self.infer_schema_length = n;
        self
    }

    /// Load a CSV file with a header row
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let start = Instant::now();
        let file = File::open(path)
            .map_err(|e| ForestError::DataError(format!("Failed to open {}: {}", path.display(), e)))?;

        let null_values = if self.null_values.is_empty() {
            None
        } else {
            Some(NullValues::AllColumns(
                self.null_values.iter().map(|v| v.as_str().into()).collect(),
            ))
        };
        let parse_opts = CsvParseOptions::default()
            .with_separator(self.separator)
            .with_null_values(null_values);

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(self.infer_schema_length)
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|e| ForestError::DataError(format!("Failed to parse {}: {}", path.display(), e)))?;

        info!(
            path = %path.display(),
            rows = df.height(),
            columns = df.width(),
            elapsed = ?start.elapsed(),
            "loaded csv"
        );
        Ok(df)
    }
}

/// Load a comma-separated file using the default loader settings
pub fn load_csv(path: impl AsRef<Path>) -> Result<DataFrame> {
    DataLoader::new().load_csv(path)
}

/// Features and target separated from a training frame
#[derive(Debug, Clone)]
pub struct Dataset {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub feature_names: Vec<String>,
    /// Feature columns only, in file order
    pub frame: DataFrame,
}

impl Dataset {
    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }
}

fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Boolean
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
            | DataType::Null
    )
}

/// Split a frame into a feature matrix and a float target.
///
/// Every column other than `target` is a feature, kept in frame order.
pub fn split_features_target(df: &DataFrame, target: &str) -> Result<Dataset> {
    let target_col = df
        .column(target)
        .map_err(|_| ForestError::FeatureNotFound(target.to_string()))?;

    if target_col.null_count() > 0 {
        return Err(ForestError::DataError(format!(
            "Target column '{}' has {} missing values",
            target,
            target_col.null_count()
        )));
    }
    let target_f64 = target_col.cast(&DataType::Float64).map_err(|e| {
        ForestError::DataError(format!("Target column '{}' is not numeric: {}", target, e))
    })?;
    let target_ca = target_f64.f64()?;
    // `cast` is non-strict: unparsable strings come back as nulls
    if target_ca.null_count() > 0 {
        return Err(ForestError::DataError(format!(
            "Target column '{}' contains values that are not numbers",
            target
        )));
    }
    let y: Array1<f64> = target_ca.into_iter().map(|v| v.unwrap_or(0.0)).collect();

    let feature_names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .filter(|name| name.as_str() != target)
        .map(|name| name.to_string())
        .collect();
    if feature_names.is_empty() {
        return Err(ForestError::DataError(format!(
            "No feature columns besides target '{}'",
            target
        )));
    }

    let frame = df.drop(target)?;
    let x = columns_to_array2(&frame, &feature_names)?;
    debug!(n_samples = x.nrows(), n_features = x.ncols(), target, "split features and target");

    Ok(Dataset {
        x,
        y,
        feature_names,
        frame,
    })
}

/// Extract named columns from a frame into a row-major `Array2<f64>`.
///
/// Missing values become `0.0`; non-numeric columns are rejected.
pub fn columns_to_array2(df: &DataFrame, col_names: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let n_cols = col_names.len();

    let col_data: Vec<Vec<f64>> = col_names
        .iter()
        .map(|col_name| {
            let column = df
                .column(col_name)
                .map_err(|_| ForestError::FeatureNotFound(col_name.clone()))?;
            if !is_numeric_dtype(column.dtype()) {
                return Err(ForestError::DataError(format!(
                    "Feature column '{}' has non-numeric type {}",
                    col_name,
                    column.dtype()
                )));
            }
            let nulls = column.null_count();
            if nulls > 0 {
                warn!(column = %col_name, nulls, "missing feature values replaced with 0.0");
            }
            let values: Vec<f64> = column
                .cast(&DataType::Float64)?
                .f64()?
                .into_iter()
                .map(|v| v.unwrap_or(0.0))
                .collect();
            Ok(values)
        })
        .collect::<Result<Vec<Vec<f64>>>>()?;

    let col_refs: Vec<&[f64]> = col_data.iter().map(|c| c.as_slice()).collect();
    Ok(Array2::from_shape_fn((n_rows, n_cols), |(r, c)| col_refs[c][r]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DataFrame {
        df! {
            "a" => &[1.0, 2.0, 3.0],
            "label" => &[0i64, 1, 0],
            "b" => &[10i32, 20, 30],
        }
        .unwrap()
    }

    #[test]
    fn test_split_keeps_feature_order() {
        let ds = split_features_target(&frame(), "label").unwrap();
        assert_eq!(ds.feature_names, vec!["a", "b"]);
        assert_eq!(ds.x.shape(), &[3, 2]);
        assert_eq!(ds.x[[1, 1]], 20.0);
        assert_eq!(ds.y.to_vec(), vec![0.0, 1.0, 0.0]);
        assert_eq!(ds.frame.width(), 2);
    }

    #[test]
    fn test_missing_target() {
        let err = split_features_target(&frame(), "nope").unwrap_err();
        assert!(matches!(err, ForestError::FeatureNotFound(name) if name == "nope"));
    }

    #[test]
    fn test_null_target_rejected() {
        let df = df! {
            "a" => &[1.0, 2.0],
            "label" => &[Some(1.0), None],
        }
        .unwrap();
        assert!(matches!(split_features_target(&df, "label"), Err(ForestError::DataError(_))));
    }

    #[test]
    fn test_unparsable_target_rejected() {
        let df = df! {
            "a" => &[1.0, 2.0],
            "label" => &["0", "yes"],
        }
        .unwrap();
        let err = split_features_target(&df, "label").unwrap_err();
        assert!(err.to_string().contains("not numbers"));
    }

    #[test]
    fn test_string_feature_rejected() {
        let df = df! {
            "a" => &["x", "y"],
            "label" => &[0.0, 1.0],
        }
        .unwrap();
        assert!(matches!(split_features_target(&df, "label"), Err(ForestError::DataError(_))));
    }

    #[test]
    fn test_null_features_become_zero() {
        let df = df! {
            "a" => &[Some(1.5), None],
            "label" => &[0.0, 1.0],
        }
        .unwrap();
        let ds = split_features_target(&df, "label").unwrap();
        assert_eq!(ds.x[[1, 0]], 0.0);
    }

    #[test]
    fn test_load_csv_with_na_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.csv");
        std::fs::write(&path, "x1,x2,label\n1.0,na,0\n2.0,3.0,1\n").unwrap();

        let df = load_csv(&path).unwrap();
        assert_eq!(df.shape(), (2, 3));
        assert_eq!(df.column("x2").unwrap().null_count(), 1);
    }

    #[test]
    fn test_loader_options() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.tsv");
        std::fs::write(&path, "x1;x2;label\n1;?;0\n2;3.5;1\nna;4.5;1\n").unwrap();

        let df = DataLoader::new()
            .with_separator(b';')
            .with_null_values(vec!["?".to_string()])
            .with_infer_schema_length(None)
            .load_csv(&path)
            .unwrap();

        assert_eq!(df.shape(), (3, 3));
        assert_eq!(df.column("x2").unwrap().null_count(), 1);
        // `na` is no longer a null marker, so x1 stays a string column
        assert_eq!(df.column("x1").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn test_load_csv_missing_file() {
        assert!(matches!(load_csv("/no/such/file.csv"), Err(ForestError::DataError(_))));
    }
}
