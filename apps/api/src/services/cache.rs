//! Redis cache for query embeddings
//!
//! Keys are `emb:{model}:{md5(lower(trim(query)))}`; values are the raw
//! little-endian f32 bytes of the vector. Every failure path degrades
//! to a cache bypass: the cache is an optimization, never a dependency.

use md5::{Digest, Md5};
use redis::aio::MultiplexedConnection;
use setlist_shared_config::RedisConfig;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Cache for query embeddings backed by Redis
#[derive(Clone)]
pub struct EmbeddingCache {
    config: RedisConfig,
    model: String,
    dimension: usize,
    connection: std::sync::Arc<OnceCell<Option<MultiplexedConnection>>>,
}

impl EmbeddingCache {
    /// Create a cache for the given model and dimension
    ///
    /// No connection is made until the first lookup.
    pub fn new(config: RedisConfig, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            config,
            model: model.into(),
            dimension,
            connection: std::sync::Arc::new(OnceCell::new()),
        }
    }

    /// Get or establish the shared connection; None when Redis is down
    async fn connection(&self) -> Option<MultiplexedConnection> {
        self.connection
            .get_or_init(|| async {
                let url = self.config.connection_url();
                let client = match redis::Client::open(url.as_str()) {
                    Ok(client) => client,
                    Err(e) => {
                        warn!(error = %e, "Invalid Redis URL, caching disabled");
                        return None;
                    }
                };
                match client.get_multiplexed_async_connection().await {
                    Ok(connection) => {
                        info!("Redis connection established for embedding cache");
                        Some(connection)
                    }
                    Err(e) => {
                        warn!(error = %e, "Redis connection failed, caching disabled");
                        None
                    }
                }
            })
            .await
            .clone()
    }

    fn cache_key(&self, query: &str) -> String {
        let mut hasher = Md5::new();
        hasher.update(query.trim().to_lowercase().as_bytes());
        format!("emb:{}:{:x}", self.model, hasher.finalize())
    }

    /// Get a cached embedding for a query
    ///
    /// A cached blob whose dimension no longer matches the configured
    /// dimension is evicted and treated as a miss.
    pub async fn get(&self, query: &str) -> Option<Vec<f32>> {
        let mut connection = self.connection().await?;
        let key = self.cache_key(query);

        let cached: Option<Vec<u8>> = match redis::cmd("GET")
            .arg(&key)
            .query_async(&mut connection)
            .await
        {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Cache get failed");
                return None;
            }
        };

        let bytes = cached?;
        let embedding = decode_f32_le(&bytes)?;

        if embedding.len() != self.dimension {
            debug!(
                expected = self.dimension,
                actual = embedding.len(),
                "Evicting cached embedding with stale dimension"
            );
            let _: Result<(), _> = redis::cmd("DEL").arg(&key).query_async(&mut connection).await;
            return None;
        }

        debug!(query = %truncate(query), "Embedding cache hit");
        Some(embedding)
    }

    /// Cache an embedding for a query
    pub async fn set(&self, query: &str, embedding: &[f32]) {
        let Some(mut connection) = self.connection().await else {
            return;
        };
        let key = self.cache_key(query);
        let bytes = encode_f32_le(embedding);

        let result: Result<(), _> = redis::cmd("SETEX")
            .arg(&key)
            .arg(self.config.embedding_ttl_secs)
            .arg(bytes)
            .query_async(&mut connection)
            .await;

        match result {
            Ok(()) => debug!(query = %truncate(query), "Cached embedding"),
            Err(e) => warn!(error = %e, "Cache set failed"),
        }
    }
}

fn encode_f32_le(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_f32_le(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

fn truncate(query: &str) -> &str {
    match query.char_indices().nth(30) {
        Some((i, _)) => &query[..i],
        None => query,
    }
}
