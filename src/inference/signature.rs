//! Model signatures: the input schema and call parameters a logged model accepts

use crate::error::{ForestError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Number of rows a signature and its input example are taken from
pub const SIGNATURE_SAMPLE_ROWS: usize = 2;

/// Column type recorded in a signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Boolean,
    Integer,
    Long,
    Float,
    Double,
    String,
}

impl ColumnType {
    fn from_dtype(dtype: &DataType) -> Self {
        match dtype {
            DataType::Boolean => ColumnType::Boolean,
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::UInt8 | DataType::UInt16 => {
                ColumnType::Integer
            }
            DataType::Int64 | DataType::UInt32 | DataType::UInt64 => ColumnType::Long,
            DataType::Float32 => ColumnType::Float,
            // All-null sample columns are recorded as double
            DataType::Float64 | DataType::Null => ColumnType::Double,
            _ => ColumnType::String,
        }
    }

    fn is_numeric(&self) -> bool {
        !matches!(self, ColumnType::String)
    }
}

/// One input column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

/// One call parameter with its default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub default: String,
}

/// Input columns plus the parameters `predict` accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSignature {
    pub inputs: Vec<ColumnSpec>,
    pub params: Vec<ParamSchema>,
}

impl ModelSignature {
    /// Infer a signature from the first rows of `sample` and string-valued
    /// call parameters given with their defaults.
    pub fn infer(sample: &DataFrame, params: &[(&str, &str)]) -> Result<Self> {
        if sample.width() == 0 {
            return Err(ForestError::ValidationError(
                "Cannot infer a signature from a frame without columns".to_string(),
            ));
        }
        let head = sample.head(Some(SIGNATURE_SAMPLE_ROWS));
        let inputs = head
            .get_columns()
            .iter()
            .map(|col| ColumnSpec {
                name: col.name().to_string(),
                column_type: ColumnType::from_dtype(col.dtype()),
            })
            .collect();
        let params = params
            .iter()
            .map(|(name, default)| ParamSchema {
                name: name.to_string(),
                param_type: "string".to_string(),
                default: default.to_string(),
            })
            .collect();
        Ok(Self { inputs, params })
    }

    pub fn input_names(&self) -> Vec<String> {
        self.inputs.iter().map(|c| c.name.clone()).collect()
    }

    /// Default value of a call parameter
    pub fn param_default(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.default.as_str())
    }

    /// Check that `input` carries every signature column with a compatible type.
    /// Extra columns are allowed and ignored.
    pub fn validate_input(&self, input: &DataFrame) -> Result<()> {
        for spec in &self.inputs {
            let col = input
                .column(&spec.name)
                .map_err(|_| ForestError::FeatureNotFound(spec.name.clone()))?;
            let actual = ColumnType::from_dtype(col.dtype());
            if spec.column_type.is_numeric() != actual.is_numeric() {
                return Err(ForestError::ValidationError(format!(
                    "Column '{}' expected {:?}, got {}",
                    spec.name,
                    spec.column_type,
                    col.dtype()
                )));
            }
        }
        Ok(())
    }
}

/// First rows of `frame` in split orientation:
/// `{"columns": [...], "data": [[...], ...]}` with nulls as JSON null
pub fn input_example(frame: &DataFrame) -> Result<Value> {
    let head = frame.head(Some(SIGNATURE_SAMPLE_ROWS));
    let columns: Vec<String> = head.get_column_names().iter().map(|n| n.to_string()).collect();

    let values: Vec<Vec<Option<f64>>> = head
        .get_columns()
        .iter()
        .map(|col| {
            Ok(col
                .cast(&DataType::Float64)?
                .f64()?
                .into_iter()
                .collect::<Vec<Option<f64>>>())
        })
        .collect::<Result<_>>()?;

    let data: Vec<Vec<Option<f64>>> = (0..head.height())
        .map(|r| values.iter().map(|col| col[r]).collect())
        .collect();

    Ok(json!({ "columns": columns, "data": data }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataFrame {
        df! {
            "age" => &[31i64, 45, 22],
            "income" => &[1200.5, 3400.0, 800.25],
            "member" => &[true, false, true],
        }
        .unwrap()
    }

    #[test]
    fn test_infer_schema_and_params() {
        let sig = ModelSignature::infer(&sample(), &[("predict_method", "predict_proba")]).unwrap();
        assert_eq!(sig.input_names(), vec!["age", "income", "member"]);
        assert_eq!(sig.inputs[0].column_type, ColumnType::Long);
        assert_eq!(sig.inputs[1].column_type, ColumnType::Double);
        assert_eq!(sig.inputs[2].column_type, ColumnType::Boolean);
        assert_eq!(sig.param_default("predict_method"), Some("predict_proba"));
        assert_eq!(sig.param_default("other"), None);
    }

    #[test]
    fn test_validate_missing_column() {
        let sig = ModelSignature::infer(&sample(), &[]).unwrap();
        let input = df! { "age" => &[1i64], "income" => &[2.0] }.unwrap();
        let err = sig.validate_input(&input).unwrap_err();
        assert!(matches!(err, ForestError::FeatureNotFound(name) if name == "member"));
    }

    #[test]
    fn test_validate_rejects_text_for_numeric() {
        let sig = ModelSignature::infer(&sample(), &[]).unwrap();
        let input = df! {
            "age" => &["old"],
            "income" => &[2.0],
            "member" => &[true],
        }
        .unwrap();
        assert!(matches!(sig.validate_input(&input), Err(ForestError::ValidationError(_))));
    }

    #[test]
    fn test_signature_json_shape() {
        let sig = ModelSignature::infer(&sample(), &[("predict_method", "predict_proba")]).unwrap();
        let value = serde_json::to_value(&sig).unwrap();
        assert_eq!(value["inputs"][0]["type"], "long");
        assert_eq!(value["params"][0]["type"], "string");
    }

    #[test]
    fn test_input_example_takes_two_rows() {
        let example = input_example(&sample()).unwrap();
        assert_eq!(example["columns"].as_array().unwrap().len(), 3);
        let data = example["data"].as_array().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[1][0], 45.0);
    }
}
