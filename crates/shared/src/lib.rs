mod error;
pub use error::{MemoryError, Result};

mod env;
pub use env::APP_ENV;

mod message;
pub use message::{Message, MessageRole};

mod similarity;
pub use similarity::{centroid, cosine_similarity};

mod text;
pub use text::{overlap_ratio, shared_token_count, tokenize};

mod tokens;
pub use tokens::{estimate_tokens, is_cjk};
