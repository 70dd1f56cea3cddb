pub mod error;
pub mod in_memory_repository;
pub mod model;
pub mod repository;
pub mod service;

pub use error::{LoraError, Result};
pub use in_memory_repository::InMemoryLoraRepository;
pub use model::{Lora, LoraId, LoraMetadata, LoraStatus, TrainingInfo};
pub use repository::LoraRepository;
pub use service::LoraService;
