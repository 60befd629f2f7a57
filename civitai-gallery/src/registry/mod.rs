//! Registry metadata: version ids, the version JSON model and the memoizing
//! resolver that fetches it.

mod resolver;
mod types;

pub use resolver::{MetadataResolver, DEFAULT_METADATA_CAPACITY};
pub use types::{FileVariant, ModelInfo, PreviewImage, RegistryFile, VersionId, VersionMetadata};
