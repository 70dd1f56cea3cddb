pub mod entity;
pub mod error;
pub mod fetcher;
pub mod in_memory_repository;
pub mod repository;
pub mod service;

pub use entity::{Dataset, DatasetId};
pub use error::{DatasetError, Result};
pub use fetcher::{DatasetFetcher, HuggingFaceDatasetFetcher};
pub use in_memory_repository::InMemoryDatasetRepository;
pub use repository::DatasetRepository;
pub use service::DatasetService;
