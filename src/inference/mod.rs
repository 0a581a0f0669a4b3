//! Inference module
//!
//! Wraps a fitted forest for prediction:
//! - Method selection per call (`predict`, `predict_proba`, `predict_log_proba`)
//! - Input signatures inferred from sample rows
//! - Bincode persistence and self-describing model directories

mod config;
mod model;
mod signature;

pub use config::{PredictMethod, PredictParams};
pub use model::{
    load_bincode, save_bincode, ForestClassifierModel, LoggedModel, ModelMetadata, PredictionOutput,
    FLAVOR, INPUT_EXAMPLE_FILE, MLMODEL_FILE, MODEL_DATA_FILE,
};
pub use signature::{input_example, ColumnSpec, ColumnType, ModelSignature, ParamSchema, SIGNATURE_SAMPLE_ROWS};
