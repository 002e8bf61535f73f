pub mod assembler;
pub mod error;
pub mod ollama;

pub use assembler::{AssemblerConfig, AssemblerState, StreamAssembler};
pub use error::ProviderError;
pub use ollama::OllamaClient;
