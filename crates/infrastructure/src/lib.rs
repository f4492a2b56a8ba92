//! 基础设施适配层
//!
//! 对核心边界trait的具体实现：RabbitMQ消息队列、Redis断点存储，
//! 以及一组内存实现。内存实现不是测试专用的摆设，单机部署时
//! 可以直接作为运行时组件使用，测试里又能注入故障，所以放在
//! 正式代码而不是cfg(test)里。

pub mod memory;
pub mod rabbitmq;
pub mod redis_store;

pub use memory::{
    HashingVectorizer, InMemoryCursorStore, InMemoryMessageQueue, InMemorySourceStrategy,
    InMemoryTaskRepository, InMemoryVectorStore,
};
pub use rabbitmq::RabbitMqMessageQueue;
pub use redis_store::RedisCursorStore;
