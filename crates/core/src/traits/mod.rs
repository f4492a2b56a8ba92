pub mod cursor_store;
pub mod data_source;
pub mod message_queue;
pub mod repository;
pub mod vector_store;
pub mod vectorizer;

pub use cursor_store::CursorStore;
pub use data_source::{DataSourceStrategy, SourceConnection, SqlParam};
pub use message_queue::{Envelope, MessageQueue};
pub use repository::TaskRepository;
pub use vector_store::{CollectionStats, MetricType, SearchHit, VectorStore};
pub use vectorizer::Vectorizer;
