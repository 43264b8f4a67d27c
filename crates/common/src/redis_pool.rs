use redis::Client;
use redis::aio::ConnectionManager;

/// Create the Redis connection manager backing the delivery queue.
///
/// The manager reconnects on its own; a `PING` is issued up front so a bad
/// `REDIS_URL` fails at startup instead of on the first dequeue.
pub async fn create_redis_pool(redis_url: &str) -> anyhow::Result<ConnectionManager> {
    let client = Client::open(redis_url)?;
    let mut manager = ConnectionManager::new(client).await?;

    let pong: String = redis::cmd("PING").query_async(&mut manager).await?;
    tracing::info!(reply = %pong, "Connected to Redis");
    Ok(manager)
}
