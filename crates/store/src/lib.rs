mod port;
pub use port::{Filter, Row, Scored, Table, VectorStore, init_table};

mod records;
pub use records::{
  EpisodeRecord, RawMessage, SemanticRecord, ThemeRecord, UserProfileRecord, new_id,
};

mod mem;
pub use mem::MemStore;
