//! Vulnerability database artifact model
//!
//! Everything the curator needs to know about an artifact directory without
//! understanding the payload itself:
//! - The description sidecar (build time, schema version, checksum)
//! - Content digests of the payload file
//! - Read handles and status reports over the active directory

pub mod checksum;
pub mod description;
mod reader;
mod status;

#[cfg(test)]
mod tests;

pub use checksum::{calculate_checksum, validate_by_hash, DigestAlgorithm};
pub use description::{
    read_description, write_description, Description, DescriptionError, SchemaVersion,
};
pub use reader::Reader;
pub use status::Status;

/// Schema model generation this build can read
pub const MODEL_VERSION: u32 = 6;

/// Schema revision this build produces
pub const REVISION: u32 = 0;

/// Schema addition this build produces
pub const ADDITION: u32 = 2;

/// Payload file inside an artifact directory
pub const VULNERABILITY_DB_FILE_NAME: &str = "vulnerability.db";

/// Description sidecar inside an artifact directory
pub const DESCRIPTION_FILE_NAME: &str = "import.json";
