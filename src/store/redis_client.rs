use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use super::KvStore;
use super::WriteOp;
use crate::config::RedisConfig;
use crate::errors::GeoRankError;
use crate::errors::Result;

/// Redis-backed store: sorted sets for logs and counters, strings for JSON values
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    namespace: String,
    op_timeout: Duration,
}

impl RedisStore {
    pub fn connect(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| GeoRankError::Store(format!("Redis open error: {e}")))?;

        Ok(Self {
            client,
            namespace: config.namespace.clone(),
            op_timeout: Duration::from_millis(config.op_timeout_ms),
        })
    }

    fn key(&self, k: &str) -> String {
        format!("{}{}", self.namespace, k)
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| GeoRankError::Store(format!("Redis connect error: {e}")))
    }

    /// Bounds one round trip, connection included
    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .map_err(|_| GeoRankError::Timeout(format!("Redis {op} exceeded {:?}", self.op_timeout)))?
    }
}

/// Redis score bound, mapping infinities to `-inf` / `+inf`
fn score_bound(value: f64) -> String {
    if value == f64::NEG_INFINITY {
        "-inf".to_string()
    } else if value == f64::INFINITY {
        "+inf".to_string()
    } else {
        value.to_string()
    }
}

fn ttl_secs(ttl: Duration) -> i64 {
    ttl.as_secs().max(1) as i64
}

#[async_trait]
impl KvStore for RedisStore {
    async fn append(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let k = self.key(key);
        self.bounded("ZADD", async {
            let mut conn = self.connection().await?;
            conn.zadd::<_, _, _, ()>(k, member, score)
                .await
                .map_err(|e| GeoRankError::Store(format!("Redis ZADD error: {e}")))
        })
        .await
    }

    async fn range_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
        let k = self.key(key);
        self.bounded("ZRANGEBYSCORE", async {
            let mut conn = self.connection().await?;
            conn.zrangebyscore::<_, _, _, Vec<String>>(k, score_bound(min), score_bound(max))
                .await
                .map_err(|e| GeoRankError::Store(format!("Redis ZRANGEBYSCORE error: {e}")))
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let k = self.key(key);
        self.bounded("GET", async {
            let mut conn = self.connection().await?;
            conn.get::<_, Option<String>>(k)
                .await
                .map_err(|e| GeoRankError::Store(format!("Redis GET error: {e}")))
        })
        .await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let k = self.key(key);
        self.bounded("SET/EXPIRE", async {
            let mut conn = self.connection().await?;
            redis::pipe()
                .set(&k, value)
                .ignore()
                .expire(&k, ttl_secs(ttl))
                .query_async::<_, ()>(&mut conn)
                .await
                .map_err(|e| GeoRankError::Store(format!("Redis SET/EXPIRE error: {e}")))
        })
        .await
    }

    async fn increment(&self, key: &str, member: &str, amount: f64) -> Result<f64> {
        let k = self.key(key);
        self.bounded("ZINCRBY", async {
            let mut conn = self.connection().await?;
            conn.zincr::<_, _, _, f64>(k, member, amount)
                .await
                .map_err(|e| GeoRankError::Store(format!("Redis ZINCRBY error: {e}")))
        })
        .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let k = self.key(key);
        self.bounded("EXPIRE", async {
            let mut conn = self.connection().await?;
            conn.expire::<_, ()>(k, ttl_secs(ttl))
                .await
                .map_err(|e| GeoRankError::Store(format!("Redis EXPIRE error: {e}")))
        })
        .await
    }

    async fn apply_batch(&self, ops: Vec<WriteOp>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in &ops {
            match op {
                WriteOp::Append { key, member, score } => {
                    pipe.zadd(self.key(key), member, *score).ignore();
                }
                WriteOp::Expire { key, ttl } => {
                    pipe.expire(self.key(key), ttl_secs(*ttl)).ignore();
                }
                WriteOp::Increment { key, member, amount } => {
                    pipe.zincr(self.key(key), member, *amount).ignore();
                }
                WriteOp::SetWithTtl { key, value, ttl } => {
                    let k = self.key(key);
                    pipe.set(&k, value).ignore().expire(&k, ttl_secs(*ttl)).ignore();
                }
            }
        }
        self.bounded("MULTI/EXEC", async {
            let mut conn = self.connection().await?;
            pipe.query_async::<_, ()>(&mut conn)
                .await
                .map_err(|e| GeoRankError::Store(format!("Redis MULTI/EXEC error: {e}")))
        })
        .await
    }

    async fn top_by_score(&self, key: &str, limit: usize) -> Result<Vec<(String, f64)>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let k = self.key(key);
        let stop = isize::try_from(limit - 1).unwrap_or(isize::MAX);
        self.bounded("ZREVRANGE", async {
            let mut conn = self.connection().await?;
            conn.zrevrange_withscores::<_, Vec<(String, f64)>>(k, 0, stop)
                .await
                .map_err(|e| GeoRankError::Store(format!("Redis ZREVRANGE error: {e}")))
        })
        .await
    }
}
