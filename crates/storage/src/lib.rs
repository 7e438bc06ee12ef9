pub mod archive;
pub mod error;
pub mod photos;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use archive::{ArchiveCodec, TarZstdCodec};
pub use error::StorageError;
pub use photos::FsPhotoStore;
pub use sqlite::SqliteStore;
pub use traits::*;
