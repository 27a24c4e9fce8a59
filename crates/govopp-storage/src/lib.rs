//! Page fetching with retry + insert-if-absent document stores for GovOpp.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use govopp_core::OpportunityRecord;
use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "govopp-storage";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Snapshot of a navigated page, ready to be parsed into a document tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContent {
    pub requested_url: String,
    pub final_url: String,
    pub html: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("could not open page session: {0}")]
    Session(String),
}

/// One browsing session. All navigations of a run share it, so callers use it sequentially.
#[async_trait]
pub trait PageSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<PageContent, NavigationError>;

    async fn close(&mut self);
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn PageSession>, NavigationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(3),
        }
    }
}

/// Navigate to `url`, retrying with a fixed delay. The last failure is returned once
/// `policy.max_attempts` consecutive attempts have failed.
pub async fn fetch_with_retry(
    session: &mut dyn PageSession,
    url: &str,
    policy: &RetryPolicy,
) -> Result<PageContent, NavigationError> {
    let max_attempts = policy.max_attempts.max(1);
    let span = info_span!("page_fetch", url, max_attempts);

    async move {
        let mut attempt = 1;
        loop {
            match session.navigate(url).await {
                Ok(page) => return Ok(page),
                Err(err) => {
                    warn!(attempt, error = %err, "navigation attempt failed");
                    if attempt >= max_attempts {
                        return Err(err);
                    }
                }
            }
            attempt += 1;
            tokio::time::sleep(policy.delay).await;
        }
    }
    .instrument(span)
    .await
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
        }
    }
}

/// Plain HTTP implementation of the page-fetcher capability. It does not run
/// scripts, so client-rendered content is only visible if the server inlines it.
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn open_session(&self) -> Result<Box<dyn PageSession>, NavigationError> {
        Ok(Box::new(HttpSession {
            client: self.client.clone(),
            navigations: 0,
        }))
    }
}

#[derive(Debug)]
struct HttpSession {
    client: reqwest::Client,
    navigations: usize,
}

#[async_trait]
impl PageSession for HttpSession {
    async fn navigate(&mut self, url: &str) -> Result<PageContent, NavigationError> {
        self.navigations += 1;
        let request_error = |source| NavigationError::Request {
            url: url.to_string(),
            source,
        };

        let resp = self.client.get(url).send().await.map_err(request_error)?;
        let status = resp.status();
        let final_url = resp.url().to_string();
        if !status.is_success() {
            return Err(NavigationError::HttpStatus {
                status: status.as_u16(),
                url: final_url,
            });
        }

        let html = resp.text().await.map_err(request_error)?;
        Ok(PageContent {
            requested_url: url.to_string(),
            final_url,
            html,
            fetched_at: Utc::now(),
        })
    }

    async fn close(&mut self) {
        debug!(navigations = self.navigations, "closing http page session");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Skipped,
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("invalid document id {0:?}")]
    InvalidId(String),
    #[error("serializing document: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl PersistenceError {
    fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Key-value document store with write-once semantics: an existing document
/// under `(collection, id)` is never replaced.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn backend(&self) -> &'static str;

    async fn upsert_if_absent(
        &self,
        collection: &str,
        id: &str,
        record: &OpportunityRecord,
    ) -> Result<UpsertOutcome, PersistenceError>;
}

/// Ids become file names and primary keys; only slug characters are accepted.
pub fn validate_document_id(id: &str) -> Result<(), PersistenceError> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(PersistenceError::InvalidId(id.to_string()))
    }
}

const CREATE_DOCUMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS opportunity_documents (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    body JSONB NOT NULL,
    inserted_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (collection, id)
)
"#;

const INSERT_DOCUMENT_IF_ABSENT: &str = r#"
INSERT INTO opportunity_documents (collection, id, body)
VALUES ($1, $2, $3)
ON CONFLICT (collection, id) DO NOTHING
"#;

#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub async fn connect(database_url: &str) -> Result<Self, PersistenceError> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<(), PersistenceError> {
        sqlx::query(CREATE_DOCUMENTS_TABLE).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn upsert_if_absent(
        &self,
        collection: &str,
        id: &str,
        record: &OpportunityRecord,
    ) -> Result<UpsertOutcome, PersistenceError> {
        validate_document_id(id)?;
        let body = serde_json::to_value(record)?;
        let result = sqlx::query(INSERT_DOCUMENT_IF_ABSENT)
            .bind(collection)
            .bind(id)
            .bind(sqlx::types::Json(body))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            Ok(UpsertOutcome::Skipped)
        } else {
            Ok(UpsertOutcome::Inserted)
        }
    }
}

/// Documents stored as `<root>/<collection>/<id>.json`.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn document_path(&self, collection: &str, id: &str) -> PathBuf {
        self.root.join(collection).join(format!("{id}.json"))
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    fn backend(&self) -> &'static str {
        "filesystem"
    }

    /// Writes to a temp file, then hard-links it into place. The link fails if
    /// the target exists, so a concurrent writer can never overwrite a document.
    async fn upsert_if_absent(
        &self,
        collection: &str,
        id: &str,
        record: &OpportunityRecord,
    ) -> Result<UpsertOutcome, PersistenceError> {
        validate_document_id(id)?;
        validate_document_id(collection)?;

        let absolute_path = self.document_path(collection, id);
        let parent = self.root.join(collection);
        fs::create_dir_all(&parent).await.map_err(|e| {
            PersistenceError::io(format!("creating collection directory {}", parent.display()), e)
        })?;

        if fs::try_exists(&absolute_path).await.map_err(|e| {
            PersistenceError::io(format!("checking document path {}", absolute_path.display()), e)
        })? {
            return Ok(UpsertOutcome::Skipped);
        }

        let bytes = serde_json::to_vec_pretty(record)?;
        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));

        let _temp = write_temp_document(&temp_path, &bytes).await?;

        match fs::hard_link(&temp_path, &absolute_path).await {
            Ok(()) => Ok(UpsertOutcome::Inserted),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(UpsertOutcome::Skipped),
            Err(err) => Err(PersistenceError::io(
                format!(
                    "linking temp document {} -> {}",
                    temp_path.display(),
                    absolute_path.display()
                ),
                err,
            )),
        }
    }
}

/// Removes the temp file when dropped, whether or not it was linked into place.
struct TempDocument {
    path: PathBuf,
}

impl Drop for TempDocument {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

async fn write_temp_document(path: &Path, bytes: &[u8]) -> Result<TempDocument, PersistenceError> {
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(path)
        .await
        .map_err(|e| PersistenceError::io(format!("opening temp document {}", path.display()), e))?;
    let temp = TempDocument {
        path: path.to_path_buf(),
    };

    file.write_all(bytes)
        .await
        .map_err(|e| PersistenceError::io(format!("writing temp document {}", path.display()), e))?;
    file.flush()
        .await
        .map_err(|e| PersistenceError::io(format!("flushing temp document {}", path.display()), e))?;
    Ok(temp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use govopp_core::OpportunityKind;
    use tempfile::tempdir;

    struct ScriptedSession {
        failures_before_success: usize,
        calls: usize,
    }

    #[async_trait]
    impl PageSession for ScriptedSession {
        async fn navigate(&mut self, url: &str) -> Result<PageContent, NavigationError> {
            self.calls += 1;
            if self.calls <= self.failures_before_success {
                return Err(NavigationError::HttpStatus {
                    status: 503,
                    url: url.to_string(),
                });
            }
            Ok(PageContent {
                requested_url: url.to_string(),
                final_url: url.to_string(),
                html: "<html></html>".to_string(),
                fetched_at: Utc::now(),
            })
        }

        async fn close(&mut self) {}
    }

    fn no_delay(max_attempts: usize) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::ZERO,
        }
    }

    fn record(name: &str) -> OpportunityRecord {
        OpportunityRecord::new(
            OpportunityKind::Scholarship,
            name,
            "Ministry A",
            "https://example.gov.in/schemes",
        )
    }

    #[test]
    fn default_retry_policy_is_three_attempts_three_seconds_apart() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn fetch_recovers_after_transient_failures() {
        let mut session = ScriptedSession {
            failures_before_success: 2,
            calls: 0,
        };
        let page = fetch_with_retry(&mut session, "https://a.gov.in", &no_delay(3))
            .await
            .expect("third attempt succeeds");
        assert_eq!(page.final_url, "https://a.gov.in");
        assert_eq!(session.calls, 3);
    }

    #[tokio::test]
    async fn fetch_gives_up_after_max_attempts() {
        let mut session = ScriptedSession {
            failures_before_success: usize::MAX,
            calls: 0,
        };
        let err = fetch_with_retry(&mut session, "https://down.gov.in", &no_delay(3))
            .await
            .unwrap_err();
        assert!(matches!(err, NavigationError::HttpStatus { status: 503, .. }));
        assert_eq!(session.calls, 3);
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let mut session = ScriptedSession {
            failures_before_success: usize::MAX,
            calls: 0,
        };
        let _ = fetch_with_retry(&mut session, "https://down.gov.in", &no_delay(0)).await;
        assert_eq!(session.calls, 1);
    }

    #[tokio::test]
    async fn fs_store_inserts_once_then_skips() {
        let dir = tempdir().expect("tempdir");
        let store = FsDocumentStore::new(dir.path());
        let rec = record("Grant X");

        let first = store
            .upsert_if_absent("scholarships", &rec.id, &rec)
            .await
            .expect("first upsert");
        let second = store
            .upsert_if_absent("scholarships", &rec.id, &rec)
            .await
            .expect("second upsert");

        assert_eq!(first, UpsertOutcome::Inserted);
        assert_eq!(second, UpsertOutcome::Skipped);

        let collection_dir = dir.path().join("scholarships");
        let files = std::fs::read_dir(&collection_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .collect::<Vec<_>>();
        assert_eq!(files.len(), 1, "temp files must not linger");
    }

    #[tokio::test]
    async fn temp_document_is_removed_when_write_path_bails_out() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(".pending.tmp");

        async fn write_then_fail(path: &Path) -> Result<(), PersistenceError> {
            let _temp = write_temp_document(path, b"{}").await?;
            assert!(path.exists());
            Err(PersistenceError::io(
                "writing temp document",
                std::io::Error::other("no space left on device"),
            ))
        }

        assert!(write_then_fail(&path).await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn fs_store_never_overwrites_changed_record() {
        let dir = tempdir().expect("tempdir");
        let store = FsDocumentStore::new(dir.path());
        let original = record("Grant X").with_description("first seen");
        let changed = record("Grant X").with_description("edited upstream");

        store.upsert_if_absent("scholarships", "grant-x", &original).await.unwrap();
        let outcome = store.upsert_if_absent("scholarships", "grant-x", &changed).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Skipped);

        let text = std::fs::read_to_string(store.document_path("scholarships", "grant-x")).unwrap();
        let stored: OpportunityRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(stored.description, "first seen");
    }

    #[tokio::test]
    async fn fs_store_rejects_unsafe_ids() {
        let dir = tempdir().expect("tempdir");
        let store = FsDocumentStore::new(dir.path());
        let rec = record("Grant X");
        for id in ["", "../escape", "a/b"] {
            let err = store.upsert_if_absent("scholarships", id, &rec).await.unwrap_err();
            assert!(matches!(err, PersistenceError::InvalidId(_)));
        }
    }
}
