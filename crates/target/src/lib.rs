//! 目标端写入与一致性校验
//!
//! `SyncWriter`封装对向量库的幂等写入和集合/索引生命周期；
//! `ConsistencyChecker`对源端计数和抽样记录做纯比对，产出
//! `ConsistencyReport`。两者都只依赖`VectorStore`边界。

pub mod checker;
pub mod writer;

pub use checker::ConsistencyChecker;
pub use writer::SyncWriter;
