//! MongoDB backend for the document-store sink.

use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::{self, doc, Document};
use mongodb::error::{Error as MongoError, ErrorKind};
use mongodb::{Client, Collection};

use super::document::{
    AnalyticsDocument, DocumentCollection, DocumentConnector, DocumentStoreError, InsertSummary,
};

/// Server error code for a unique index violation.
const DUPLICATE_KEY: i32 = 11000;

pub struct MongoConnector {
    url: String,
    /// Used when the URL names no database.
    fallback_database: String,
    collection: String,
}

impl MongoConnector {
    pub fn new(
        url: impl Into<String>,
        fallback_database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            fallback_database: fallback_database.into(),
            collection: collection.into(),
        }
    }
}

#[async_trait]
impl DocumentConnector for MongoConnector {
    async fn connect(&self) -> Result<Arc<dyn DocumentCollection>, DocumentStoreError> {
        let client = Client::with_uri_str(&self.url)
            .await
            .map_err(|e| DocumentStoreError::Connection(e.to_string()))?;

        // The driver connects lazily; ping so a bad URL fails here
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| DocumentStoreError::Connection(e.to_string()))?;

        let db = client
            .default_database()
            .unwrap_or_else(|| client.database(&self.fallback_database));
        tracing::debug!(database = %db.name(), collection = %self.collection, "Using analytics collection");

        let collection: Arc<dyn DocumentCollection> = Arc::new(MongoCollection {
            inner: db.collection(&self.collection),
        });
        Ok(collection)
    }
}

pub struct MongoCollection {
    inner: Collection<Document>,
}

#[async_trait]
impl DocumentCollection for MongoCollection {
    async fn insert_many(
        &self,
        docs: Vec<AnalyticsDocument>,
    ) -> Result<InsertSummary, DocumentStoreError> {
        let total = docs.len();
        let docs = docs
            .iter()
            .map(to_bson)
            .collect::<Result<Vec<_>, _>>()?;
        match self.inner.insert_many(docs).ordered(false).await {
            Ok(result) => Ok(InsertSummary {
                inserted: result.inserted_ids.len(),
                duplicates: 0,
            }),
            Err(e) => match duplicates_only(&e) {
                Some(duplicates) => Ok(InsertSummary {
                    inserted: total - duplicates,
                    duplicates,
                }),
                None => Err(classify(e)),
            },
        }
    }
}

/// Stores `timestamp` as a native BSON date so the collection supports
/// time-range queries. BSON dates carry millisecond precision.
fn to_bson(doc: &AnalyticsDocument) -> Result<Document, DocumentStoreError> {
    let mut out =
        bson::to_document(doc).map_err(|e| DocumentStoreError::Insert(e.to_string()))?;
    out.insert(
        "timestamp",
        bson::DateTime::from_chrono(doc.record.timestamp),
    );
    Ok(out)
}

/// If every failure in an unordered insert is a duplicate `_id`, the
/// number of duplicates; those documents are already stored.
fn duplicates_only(e: &MongoError) -> Option<usize> {
    match e.kind.as_ref() {
        ErrorKind::InsertMany(failure) if failure.write_concern_error.is_none() => {
            let codes = failure.write_errors.as_ref()?.iter().map(|w| w.code);
            duplicate_count(codes)
        }
        _ => None,
    }
}

/// `Some(n)` when every code is a duplicate-key error.
fn duplicate_count(codes: impl IntoIterator<Item = i32>) -> Option<usize> {
    let mut n = 0;
    for code in codes {
        if code != DUPLICATE_KEY {
            return None;
        }
        n += 1;
    }
    Some(n)
}

fn classify(e: MongoError) -> DocumentStoreError {
    match e.kind.as_ref() {
        ErrorKind::Io(_)
        | ErrorKind::ServerSelection { .. }
        | ErrorKind::ConnectionPoolCleared { .. } => DocumentStoreError::Connection(e.to_string()),
        _ => DocumentStoreError::Insert(e.to_string()),
    }
}
