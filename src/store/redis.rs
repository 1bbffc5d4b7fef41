use std::collections::HashMap;

use ::redis::aio::ConnectionManager;
use ::redis::AsyncCommands;
use async_trait::async_trait;

use super::StagingStore;
use crate::error::StoreError;

/// Keys per `MGET` / `DEL` round-trip. Keeps Redis buffers comfortable.
const BATCH: usize = 500;

/// `SCAN` hint; Redis may return more or fewer per page.
const SCAN_COUNT: usize = 1_000;

/// Creates a `ConnectionManager` that auto-reconnects on failure.
///
/// `ConnectionManager` is cheaply cloneable; every clone shares the same
/// underlying multiplexed TCP connection, so capture callers and drain
/// tasks can each hold one.
pub async fn connect(url: &str) -> Result<ConnectionManager, StoreError> {
    let client = ::redis::Client::open(url)?;
    Ok(ConnectionManager::new(client).await?)
}

/// Staging store backed by plain Redis string keys under a namespace prefix.
///
/// Callers only ever see un-prefixed keys; the prefix keeps the analytics
/// namespace separate from whatever else lives in the same database.
#[derive(Clone)]
pub struct RedisStagingStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisStagingStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
        }
    }

    /// Another namespace on the same connection (used for dead letters).
    pub fn with_prefix(&self, prefix: impl Into<String>) -> Self {
        Self::new(self.conn.clone(), prefix)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Every key under the prefix. `*`, `?` and `[` in the prefix are
    /// escaped so they match literally.
    async fn scan_keys(&self) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", escape_glob(&self.prefix));

        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, page): (u64, Vec<String>) = ::redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;
            keys.extend(page);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may report a key more than once across pages
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }
}

#[async_trait]
impl StagingStore for RedisStagingStore {
    async fn put(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let full = self.full_key(key);
        if ttl_secs > 0 {
            let _: () = conn.set_ex(&full, value, ttl_secs).await?;
        } else {
            let _: () = conn.set(&full, value).await?;
        }
        Ok(())
    }

    async fn get_all(&self) -> Result<HashMap<String, Vec<u8>>, StoreError> {
        let keys = self.scan_keys().await?;
        let mut conn = self.conn.clone();
        let mut out = HashMap::with_capacity(keys.len());

        for chunk in keys.chunks(BATCH) {
            let values: Vec<Option<Vec<u8>>> = ::redis::cmd("MGET")
                .arg(chunk)
                .query_async(&mut conn)
                .await?;

            collect_values(&self.prefix, chunk, values, &mut out);
        }

        Ok(out)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        for full in prefixed_batches(&self.prefix, keys) {
            let _: () = conn.del(full).await?;
        }
        Ok(())
    }
}

/// Pairs one `MGET` page with its keys, stripping the namespace prefix.
/// A key that expired between SCAN and MGET comes back as nil and is
/// skipped.
fn collect_values(
    prefix: &str,
    full_keys: &[String],
    values: Vec<Option<Vec<u8>>>,
    out: &mut HashMap<String, Vec<u8>>,
) {
    for (full, value) in full_keys.iter().zip(values) {
        if let (Some(key), Some(value)) = (full.strip_prefix(prefix), value) {
            out.insert(key.to_owned(), value);
        }
    }
}

/// Namespaced keys in groups of at most `BATCH`.
fn prefixed_batches<'a>(
    prefix: &'a str,
    keys: &'a [String],
) -> impl Iterator<Item = Vec<String>> + 'a {
    keys.chunks(BATCH)
        .map(move |chunk| chunk.iter().map(|k| format!("{prefix}{k}")).collect())
}

fn escape_glob(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
