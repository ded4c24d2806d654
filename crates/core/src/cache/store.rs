//! Named stores and their entries.
//!
//! A store is the persistent request→response mapping for one generation.
//! Stores are created on first open and dropped as a unit; dropping a store
//! cascades to every entry it holds.

use super::connection::CacheDb;
use super::key::RequestKey;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A fully buffered, replayable response.
///
/// `opaque` marks a cross-origin response whose status and body the caller
/// was not allowed to inspect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub url: String,
    pub status: u16,
    pub status_text: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub opaque: bool,
}

impl CachedResponse {
    /// Only 2xx responses and opaque responses may be written to a store.
    pub fn is_cacheable(&self) -> bool {
        (200..300).contains(&self.status) || self.opaque
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Summary row for listing a store without loading bodies.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct StoredEntry {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub opaque: bool,
    pub size: u64,
    pub stored_at: String,
}

/// Handle to one named store.
#[derive(Clone, Debug)]
pub struct CacheStore {
    db: CacheDb,
    name: String,
}

impl CacheDb {
    /// Open the named store, creating it if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns `Error::StoreOpen` if the store row cannot be created or read.
    pub async fn open_store(&self, name: &str) -> Result<CacheStore, Error> {
        if name.is_empty() {
            return Err(Error::StoreOpen("store name must not be empty".into()));
        }

        let store_name = name.to_string();
        let created_at = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO stores (name, created_at) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING",
                    params![store_name, created_at],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| Error::StoreOpen(format!("{name}: {}", Error::from(e))))?;

        Ok(CacheStore { db: self.clone(), name: name.to_string() })
    }

    /// List store names in creation order.
    pub async fn store_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM stores ORDER BY rowid ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Check whether a store with this name exists.
    pub async fn has_store(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM stores WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Handle to a store only if it already exists. Never creates one.
    pub async fn existing_store(&self, name: &str) -> Result<Option<CacheStore>, Error> {
        let exists = self.has_store(name).await?;
        Ok(exists.then(|| CacheStore { db: self.clone(), name: name.to_string() }))
    }

    /// Delete a store and all of its entries.
    ///
    /// Returns false if no store had that name.
    pub async fn delete_store(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM stores WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }
}

impl CacheStore {
    /// Name of the generation this store belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a response by request key.
    ///
    /// Returns None if the key isn't in this store.
    pub async fn get(&self, key: &RequestKey) -> Result<Option<CachedResponse>, Error> {
        let name = self.name.clone();
        let hash = key.hash();
        let row = self
            .db
            .conn
            .call(move |conn| -> Result<Option<(String, u16, Option<String>, String, Vec<u8>, bool)>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT url, status, status_text, headers_json, body, opaque
                     FROM entries WHERE store_name = ?1 AND key_hash = ?2",
                )?;

                let result = stmt.query_row(params![name, hash], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get::<_, i32>(5)? == 1,
                    ))
                });

                match result {
                    Ok(r) => Ok(Some(r)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        let Some((url, status, status_text, headers_json, body, opaque)) = row else {
            return Ok(None);
        };

        let headers = serde_json::from_str(&headers_json)
            .map_err(|e| Error::InvalidInput(format!("corrupt headers for {key}: {e}")))?;

        Ok(Some(CachedResponse { url, status, status_text, headers, body, opaque }))
    }

    /// Insert or replace the response stored under `key`.
    ///
    /// Last completed write wins. Non-cacheable responses are refused.
    ///
    /// # Errors
    ///
    /// Every failure is reported as `Error::StoreWrite`.
    pub async fn put(&self, key: &RequestKey, response: &CachedResponse) -> Result<(), Error> {
        if !response.is_cacheable() {
            return Err(Error::StoreWrite(format!("refusing to store status {} for {key}", response.status)));
        }

        let headers_json = serde_json::to_string(&response.headers).map_err(|e| Error::StoreWrite(e.to_string()))?;
        let name = self.name.clone();
        let hash = key.hash();
        let method = key.method.clone();
        let url = key.url.clone();
        let response = response.clone();
        let stored_at = chrono::Utc::now().to_rfc3339();

        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO entries (
                        store_name, key_hash, method, url, status, status_text,
                        headers_json, body, opaque, stored_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                    ON CONFLICT(store_name, key_hash) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        status = excluded.status,
                        status_text = excluded.status_text,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        opaque = excluded.opaque,
                        stored_at = excluded.stored_at",
                    params![
                        name,
                        hash,
                        method,
                        url,
                        response.status,
                        response.status_text,
                        headers_json,
                        response.body,
                        response.opaque as i32,
                        stored_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| Error::StoreWrite(format!("{key}: {}", Error::from(e))))
    }

    /// Delete one entry. Returns false if it wasn't present.
    pub async fn delete(&self, key: &RequestKey) -> Result<bool, Error> {
        let name = self.name.clone();
        let hash = key.hash();
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute(
                    "DELETE FROM entries WHERE store_name = ?1 AND key_hash = ?2",
                    params![name, hash],
                )?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// List the request keys held by this store, oldest write first.
    pub async fn keys(&self) -> Result<Vec<RequestKey>, Error> {
        let name = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<RequestKey>, Error> {
                let mut stmt =
                    conn.prepare("SELECT method, url FROM entries WHERE store_name = ?1 ORDER BY stored_at, rowid")?;
                let keys = stmt
                    .query_map(params![name], |row| Ok(RequestKey { method: row.get(0)?, url: row.get(1)? }))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    /// List entry summaries without loading bodies.
    pub async fn entries(&self) -> Result<Vec<StoredEntry>, Error> {
        let name = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<StoredEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT method, url, status, opaque, LENGTH(body), stored_at
                     FROM entries WHERE store_name = ?1 ORDER BY stored_at, rowid",
                )?;
                let entries = stmt
                    .query_map(params![name], |row| {
                        Ok(StoredEntry {
                            method: row.get(0)?,
                            url: row.get(1)?,
                            status: row.get(2)?,
                            opaque: row.get::<_, i32>(3)? == 1,
                            size: row.get::<_, i64>(4)? as u64,
                            stored_at: row.get(5)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in this store.
    pub async fn len(&self) -> Result<u64, Error> {
        let name = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE store_name = ?1", params![name], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
