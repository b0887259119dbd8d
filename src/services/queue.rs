use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pending images; producers push on the left, the worker pops from the right.
const PENDING_KEY: &str = "image_relay:batch:pending";
/// Images handed to the worker and not yet completed.
const IN_FLIGHT_KEY: &str = "image_relay:batch:in_flight";

/// One batch image as stored in Redis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueuedImage {
    pub job_id: Uuid,
    pub url: String,
    /// Clear the image's earlier failure record before processing.
    #[serde(default)]
    pub retry: bool,
}

impl QueuedImage {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            url: url.into(),
            retry: false,
        }
    }

    /// A failed image to process again; its old failure record is cleared first.
    pub fn retry(url: impl Into<String>) -> Self {
        Self {
            retry: true,
            ..Self::new(url)
        }
    }

    /// `complete` removes by exact payload, so encoding must be deterministic.
    fn encode(&self) -> Result<String, QueueError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// FIFO batch queue with an in-flight list for crash recovery.
pub struct JobQueue {
    client: redis::Client,
}

impl JobQueue {
    /// Parse the URL; no connection is made until first use.
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, QueueError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Queue a whole batch in one `LPUSH`, so either every image is queued or none is.
    pub async fn enqueue_all(&self, images: &[QueuedImage]) -> Result<(), QueueError> {
        if images.is_empty() {
            return Ok(());
        }
        let payloads = images
            .iter()
            .map(QueuedImage::encode)
            .collect::<Result<Vec<_>, _>>()?;

        let mut conn = self.connection().await?;
        conn.lpush::<_, _, ()>(PENDING_KEY, payloads).await?;
        Ok(())
    }

    /// Take the oldest pending image, moving it to the in-flight list.
    pub async fn dequeue(&self) -> Result<Option<QueuedImage>, QueueError> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn.rpoplpush(PENDING_KEY, IN_FLIGHT_KEY).await?;
        payload
            .map(|payload| serde_json::from_str(&payload).map_err(QueueError::from))
            .transpose()
    }

    /// Drop a finished image from the in-flight list.
    pub async fn complete(&self, image: &QueuedImage) -> Result<(), QueueError> {
        let payload = image.encode()?;
        let mut conn = self.connection().await?;
        conn.lrem::<_, _, ()>(IN_FLIGHT_KEY, 1, payload).await?;
        Ok(())
    }

    /// Move images left in flight by a previous run back to pending.
    ///
    /// Only safe before this process starts dequeuing.
    pub async fn recover_in_flight(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let mut recovered = 0;
        while conn
            .rpoplpush::<_, _, Option<String>>(IN_FLIGHT_KEY, PENDING_KEY)
            .await?
            .is_some()
        {
            recovered += 1;
        }
        Ok(recovered)
    }

    pub async fn pending(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        Ok(conn.llen(PENDING_KEY).await?)
    }

    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Batch queue unavailable: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Malformed queued image: {0}")]
    Payload(#[from] serde_json::Error),
}
