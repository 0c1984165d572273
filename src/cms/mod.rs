//! CMS SignedData handling and Master List extraction (spec §4.7, C7).

pub mod der;
pub mod extractor;

pub use extractor::{extract_master_list, ExtractedMasterList};
