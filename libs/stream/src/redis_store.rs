use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use redis::streams::{StreamMaxlen, StreamReadOptions, StreamReadReply};

use crate::{StreamEntry, StreamError, StreamStore};
use vox_core::STREAM_MAXLEN;

/// Redis Streams implementation of [`StreamStore`].
///
/// A single multiplexed [`ConnectionManager`] is shared by cloning; it
/// reconnects on its own, so individual command failures surface as
/// retriable [`StreamError`]s instead of poisoning the store.
#[derive(Clone)]
pub struct RedisStreamStore {
    connection: ConnectionManager,
}

impl RedisStreamStore {
    pub async fn connect(url: &str) -> Result<Self, StreamError> {
        let client = redis::Client::open(url).map_err(map_err)?;
        let connection = ConnectionManager::new(client).await.map_err(map_err)?;
        Ok(Self { connection })
    }
}

fn map_err(err: redis::RedisError) -> StreamError {
    if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
        StreamError::Connection(err.to_string())
    } else {
        StreamError::Command(err.to_string())
    }
}

fn field_string(value: &redis::Value) -> Result<String, StreamError> {
    redis::from_redis_value(value).map_err(|err| StreamError::Decode(err.to_string()))
}

#[async_trait]
impl StreamStore for RedisStreamStore {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), StreamError> {
        let mut conn = self.connection.clone();
        match conn
            .xgroup_create_mkstream::<_, _, _, String>(stream, group, "0")
            .await
        {
            Ok(_) => Ok(()),
            // A second replica racing on the same group is expected.
            Err(err) if err.code() == Some("BUSYGROUP") => Ok(()),
            Err(err) => Err(map_err(err)),
        }
    }

    async fn publish(
        &self,
        stream: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<String, StreamError> {
        let mut conn = self.connection.clone();
        let items: Vec<(&str, &str)> = fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        conn.xadd_maxlen(stream, StreamMaxlen::Approx(STREAM_MAXLEN), "*", &items)
            .await
            .map_err(map_err)
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, StreamError> {
        let mut conn = self.connection.clone();
        let options = StreamReadOptions::default()
            .group(group, consumer)
            .count(count)
            .block(block.as_millis() as usize);
        let reply: StreamReadReply = conn
            .xread_options(&[stream], &[">"], &options)
            .await
            .map_err(map_err)?;

        let mut entries = Vec::new();
        for key in reply.keys {
            for id in key.ids {
                let mut fields = BTreeMap::new();
                for (name, value) in &id.map {
                    fields.insert(name.clone(), field_string(value)?);
                }
                entries.push(StreamEntry::new(id.id.clone(), fields));
            }
        }
        Ok(entries)
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<(), StreamError> {
        let mut conn = self.connection.clone();
        let _acked: usize = conn.xack(stream, group, &[id]).await.map_err(map_err)?;
        Ok(())
    }

    async fn list_push(&self, list: &str, value: &str) -> Result<(), StreamError> {
        let mut conn = self.connection.clone();
        let _len: usize = conn.lpush(list, value).await.map_err(map_err)?;
        Ok(())
    }

    async fn list_range(&self, list: &str) -> Result<Vec<String>, StreamError> {
        let mut conn = self.connection.clone();
        conn.lrange(list, 0, -1).await.map_err(map_err)
    }

    async fn list_remove(&self, list: &str, value: &str) -> Result<usize, StreamError> {
        let mut conn = self.connection.clone();
        conn.lrem(list, 1, value).await.map_err(map_err)
    }

    async fn counter_incr(&self, key: &str, window: Duration) -> Result<u64, StreamError> {
        let mut conn = self.connection.clone();
        let count: u64 = conn.incr(key, 1u64).await.map_err(map_err)?;
        if count == 1 {
            let _: bool = conn
                .expire(key, window.as_secs() as i64)
                .await
                .map_err(map_err)?;
        }
        Ok(count)
    }

    async fn ping(&self) -> Result<(), StreamError> {
        let mut conn = self.connection.clone();
        let _pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(())
    }
}
