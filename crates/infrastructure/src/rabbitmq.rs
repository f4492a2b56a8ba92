use std::sync::Arc;

use async_trait::async_trait;
use lapin::{
    options::*, types::FieldTable, BasicProperties, Channel, Connection, ConnectionProperties,
};
use tokio::sync::Mutex;
use tracing::{debug, info};
use vecsync_core::config::MessageQueueConfig;
use vecsync_core::traits::{Envelope, MessageQueue};
use vecsync_core::{SyncError, SyncResult};

/// RabbitMQ消息队列实现
///
/// 失败通知和告警都发到默认交换机，按destination路由到同名队列。
/// 投递模式为持久化，发布后等待broker确认。
pub struct RabbitMqMessageQueue {
    connection: Connection,
    channel: Arc<Mutex<Channel>>,
}

impl RabbitMqMessageQueue {
    pub async fn new(config: &MessageQueueConfig) -> SyncResult<Self> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(|e| SyncError::MessageQueue(format!("连接RabbitMQ失败: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| SyncError::MessageQueue(format!("创建通道失败: {e}")))?;

        info!("成功连接到RabbitMQ: {}", config.url);

        let queue = Self {
            connection,
            channel: Arc::new(Mutex::new(channel)),
        };

        // 失败队列和告警队列必须在首条消息之前就绪
        queue.create_queue(&config.failure_queue, true).await?;
        queue.create_queue(&config.alert_queue, true).await?;

        Ok(queue)
    }

    async fn declare_queue(
        &self,
        channel: &Channel,
        destination: &str,
        durable: bool,
    ) -> SyncResult<()> {
        channel
            .queue_declare(
                destination,
                QueueDeclareOptions {
                    durable,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| SyncError::MessageQueue(format!("声明队列 {destination} 失败: {e}")))?;

        debug!("队列 {} 声明成功", destination);
        Ok(())
    }

    fn is_not_found(e: &lapin::Error) -> bool {
        let msg = e.to_string();
        msg.contains("NOT_FOUND") || msg.contains("404")
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    pub async fn close(&self) -> SyncResult<()> {
        self.connection
            .close(200, "正常关闭")
            .await
            .map_err(|e| SyncError::MessageQueue(format!("关闭连接失败: {e}")))?;

        info!("RabbitMQ连接已关闭");
        Ok(())
    }
}

#[async_trait]
impl MessageQueue for RabbitMqMessageQueue {
    async fn publish(&self, destination: &str, envelope: &Envelope) -> SyncResult<()> {
        let channel = self.channel.lock().await;
        let payload = envelope.serialize()?;

        let confirm = channel
            .basic_publish(
                "",
                destination,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_delivery_mode(2), // 2 = persistent
            )
            .await
            .map_err(|e| {
                SyncError::MessageQueue(format!("发布消息到队列 {destination} 失败: {e}"))
            })?;

        confirm
            .await
            .map_err(|e| SyncError::MessageQueue(format!("消息发布确认失败: {e}")))?;

        debug!("消息已发布到队列: {}", destination);
        Ok(())
    }

    async fn fetch(&self, destination: &str) -> SyncResult<Vec<Envelope>> {
        let channel = self.channel.lock().await;

        match channel
            .basic_get(destination, BasicGetOptions::default())
            .await
        {
            Ok(Some(delivery)) => {
                let envelope = Envelope::deserialize(&delivery.data)?;
                channel
                    .basic_ack(delivery.delivery_tag, BasicAckOptions::default())
                    .await
                    .map_err(|e| SyncError::MessageQueue(format!("确认消息失败: {e}")))?;
                Ok(vec![envelope])
            }
            Ok(None) => Ok(vec![]),
            Err(e) if Self::is_not_found(&e) => {
                debug!("队列 {} 不存在，返回空结果", destination);
                Ok(vec![])
            }
            Err(e) => Err(SyncError::MessageQueue(format!(
                "从队列 {destination} 获取消息失败: {e}"
            ))),
        }
    }

    async fn create_queue(&self, destination: &str, durable: bool) -> SyncResult<()> {
        let channel = self.channel.lock().await;
        self.declare_queue(&channel, destination, durable).await
    }

    async fn queue_size(&self, destination: &str) -> SyncResult<u32> {
        let channel = self.channel.lock().await;
        let result = channel
            .queue_declare(
                destination,
                QueueDeclareOptions {
                    passive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await;

        match result {
            Ok(info) => Ok(info.message_count()),
            Err(e) if Self::is_not_found(&e) => {
                debug!("队列 {} 不存在，返回大小为0", destination);
                Ok(0)
            }
            Err(e) => Err(SyncError::MessageQueue(format!(
                "获取队列 {destination} 信息失败: {e}"
            ))),
        }
    }

    async fn purge_queue(&self, destination: &str) -> SyncResult<()> {
        let channel = self.channel.lock().await;
        channel
            .queue_purge(destination, QueuePurgeOptions::default())
            .await
            .map_err(|e| SyncError::MessageQueue(format!("清空队列 {destination} 失败: {e}")))?;

        debug!("队列 {} 已清空", destination);
        Ok(())
    }
}
