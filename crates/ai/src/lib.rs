mod ports;
pub use ports::{EmbedTask, Embedder, TextModel, VECTOR_DIM};

mod embedding;
pub use embedding::JinaEmbedder;

mod chat;
pub use chat::OpenAiTextModel;

mod structured;
pub use structured::{complete_structured, extract_json};
