pub mod embedder;
pub mod openai_embedder;

pub use embedder::Embedder;
pub use openai_embedder::OpenAiEmbedder;
