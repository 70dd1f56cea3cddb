pub mod error;
pub mod gcs;
pub mod local;
pub mod traits;

pub use error::{StorageError, StorageResult};
pub use gcs::{GcsUploader, plan_uploads};
pub use local::LocalStorage;
pub use traits::{FileMetadata, Storage, StorageConfig};
