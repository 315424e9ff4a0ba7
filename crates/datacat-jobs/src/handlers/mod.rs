//! Built-in dataset handlers.

mod process_dataset;
mod process_dataset_url;

use std::path::Path;

use datacat_core::defaults;

pub use process_dataset::{ProcessDatasetHandler, ProcessDatasetPayload};
pub use process_dataset_url::{detect_suffix, ProcessDatasetUrlHandler, ProcessDatasetUrlPayload};

/// First candidate with a usable file stem, else the default table name.
pub(crate) fn table_name_from(candidates: &[Option<&str>]) -> String {
    candidates
        .iter()
        .flatten()
        .find_map(|candidate| {
            Path::new(candidate)
                .file_stem()
                .and_then(|stem| stem.to_str())
                .map(str::trim)
                .filter(|stem| !stem.is_empty())
                .map(String::from)
        })
        .unwrap_or_else(|| defaults::DEFAULT_TABLE_NAME.to_string())
}
