//! Utility functions and types

pub mod data_loader;

pub use data_loader::{columns_to_array2, load_csv, split_features_target, DataLoader, Dataset};
