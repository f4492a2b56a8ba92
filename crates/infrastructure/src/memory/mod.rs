//! 内存实现
//!
//! 每个边界trait一个内存版本，共享状态用Arc包裹，克隆后指向同一
//! 份数据。队列和向量库支持注入故障，用于验证重试和降级路径。

mod cursor;
mod queue;
mod repository;
mod source;
mod vector_store;
mod vectorizer;

pub use cursor::InMemoryCursorStore;
pub use queue::InMemoryMessageQueue;
pub use repository::InMemoryTaskRepository;
pub use source::InMemorySourceStrategy;
pub use vector_store::InMemoryVectorStore;
pub use vectorizer::HashingVectorizer;
