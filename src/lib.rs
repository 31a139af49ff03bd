pub mod codec;
pub mod create;
pub mod error;
pub mod extract;
pub mod fsio;
pub mod paths;
pub mod superblock;

pub use codec::{BackwardLz77, Codec, CodecError};
pub use create::{create, create_with_codec, CreateOptions};
pub use error::{ExeFsError, Result};
pub use extract::{extract, extract_with_codec, is_exefs_file, ExtractOptions};
pub use paths::SectionPathMap;
pub use superblock::{SectionHeader, Superblock};
