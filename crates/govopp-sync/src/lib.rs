//! Run orchestration, reconciliation and single-flight scheduling for GovOpp.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use govopp_adapters::{ExtractError, ExtractorKind, SiteDefaults};
use govopp_core::{OpportunityKind, OpportunityRecord, DEFAULT_AMOUNT, DEFAULT_DEADLINE};
use govopp_storage::{
    fetch_with_retry, DocumentStore, FsDocumentStore, HttpClientConfig, HttpPageFetcher,
    NavigationError, PageFetcher, PersistenceError, PgDocumentStore, RetryPolicy, UpsertOutcome,
    DEFAULT_USER_AGENT,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, info_span, warn, Instrument};
use url::Url;
use uuid::Uuid;

pub const CRATE_NAME: &str = "govopp-sync";

pub const DEFAULT_SCHEDULE_CRON: &str = "0 0 3 * * *";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database_url: Option<String>,
    pub store_dir: Option<PathBuf>,
    pub targets_file: Option<PathBuf>,
    pub schedule_cron: String,
    pub user_agent: String,
    pub nav_timeout_secs: u64,
    pub retry_attempts: usize,
    pub retry_delay_secs: u64,
    pub settle_delay_secs: u64,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str, default: u64| {
            var(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };

        Self {
            database_url: var("DATABASE_URL"),
            store_dir: var("GOVOPP_STORE_DIR").map(PathBuf::from),
            targets_file: var("GOVOPP_TARGETS_FILE").map(PathBuf::from),
            schedule_cron: var("GOVOPP_SCHEDULE_CRON")
                .unwrap_or_else(|| DEFAULT_SCHEDULE_CRON.to_string()),
            user_agent: var("GOVOPP_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            nav_timeout_secs: number("GOVOPP_NAV_TIMEOUT_SECS", 60),
            retry_attempts: number("GOVOPP_RETRY_ATTEMPTS", 3) as usize,
            retry_delay_secs: number("GOVOPP_RETRY_DELAY_SECS", 3),
            settle_delay_secs: number("GOVOPP_SETTLE_DELAY_SECS", 5),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts.max(1),
            delay: Duration::from_secs(self.retry_delay_secs),
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("no persistence configured (set DATABASE_URL or GOVOPP_STORE_DIR)")]
    MissingStore,
    #[error("persistence backend unavailable: {0}")]
    StoreUnavailable(#[from] PersistenceError),
}

/// Open the configured document store. `DATABASE_URL` wins over `GOVOPP_STORE_DIR`.
pub async fn open_document_store(
    config: &SyncConfig,
) -> Result<Arc<dyn DocumentStore>, ConfigurationError> {
    if let Some(database_url) = &config.database_url {
        let store = PgDocumentStore::connect(database_url).await?;
        return Ok(Arc::new(store));
    }
    if let Some(dir) = &config.store_dir {
        return Ok(Arc::new(FsDocumentStore::new(dir.clone())));
    }
    Err(ConfigurationError::MissingStore)
}

/// One page to crawl and the layout used to read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSite {
    pub name: String,
    pub url: String,
    pub extractor: ExtractorKind,
    #[serde(default)]
    pub defaults: SiteDefaults,
}

impl TargetSite {
    fn new(name: &str, url: &str, extractor: ExtractorKind, defaults: [&str; 4]) -> Self {
        let [category, amount, deadline, description] = defaults;
        Self {
            name: name.to_string(),
            url: url.to_string(),
            extractor,
            defaults: SiteDefaults {
                category: category.to_string(),
                amount: amount.to_string(),
                deadline: deadline.to_string(),
                description: description.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRegistry {
    pub targets: Vec<TargetSite>,
}

impl TargetRegistry {
    pub fn builtin() -> Self {
        Self {
            targets: vec![
                TargetSite::new(
                    "National Scholarship Portal",
                    "https://scholarships.gov.in/All-Scholarships",
                    ExtractorKind::Accordion,
                    [
                        "Central/State Scheme (NSP)",
                        "See Guidelines",
                        DEFAULT_DEADLINE,
                        "Please visit the portal for detailed eligibility.",
                    ],
                ),
                TargetSite::new(
                    "JK Social Welfare",
                    "https://jkdswd.nic.in/scholarships.html",
                    ExtractorKind::Tabular,
                    [
                        "J&K Social Welfare Department",
                        "Varies",
                        DEFAULT_DEADLINE,
                        "Social Welfare Scheme",
                    ],
                ),
                TargetSite::new(
                    "JK Tribal Affairs",
                    "https://tribalaffairs.jk.gov.in/scholarship",
                    ExtractorKind::HeadingScan,
                    [
                        "J&K Tribal Affairs",
                        DEFAULT_AMOUNT,
                        DEFAULT_DEADLINE,
                        "Tribal Scholarship Scheme",
                    ],
                ),
                TargetSite::new(
                    "JK Higher Education",
                    "https://highereducation.jk.gov.in/scholarships",
                    ExtractorKind::LinkScan,
                    [
                        "J&K Higher Education",
                        DEFAULT_AMOUNT,
                        DEFAULT_DEADLINE,
                        "Higher Education Scholarship",
                    ],
                ),
                TargetSite::new(
                    "JK Services Selection Board",
                    "https://jkssb.nic.in/",
                    ExtractorKind::JobBoard,
                    [
                        "J&K Services Selection Board",
                        DEFAULT_AMOUNT,
                        DEFAULT_DEADLINE,
                        "See notification for details",
                    ],
                ),
            ],
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let registry: Self = serde_yaml::from_str(text).context("parsing target registry")?;
        registry.validate()?;
        Ok(registry)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("loading {}", path.display()))
    }

    pub async fn from_config(config: &SyncConfig) -> Result<Self> {
        match &config.targets_file {
            Some(path) => Self::load(path).await,
            None => Ok(Self::builtin()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.targets.is_empty(), "target registry is empty");
        for target in &self.targets {
            anyhow::ensure!(!target.name.trim().is_empty(), "target with url {} has no name", target.url);
            Url::parse(&target.url)
                .with_context(|| format!("target {} has invalid url {}", target.name, target.url))?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SiteError {
    #[error("invalid target url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error(transparent)]
    Navigation(#[from] NavigationError),
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractError),
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteReport {
    pub site: String,
    pub url: String,
    pub records: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RunBatch {
    pub records: Vec<OpportunityRecord>,
    pub site_reports: Vec<SiteReport>,
}

impl RunBatch {
    pub fn failed_sites(&self) -> usize {
        self.site_reports.iter().filter(|s| s.error.is_some()).count()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PartitionReport {
    pub attempted: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub partitions: BTreeMap<OpportunityKind, PartitionReport>,
}

impl ReconcileReport {
    pub fn partition(&self, kind: OpportunityKind) -> PartitionReport {
        self.partitions.get(&kind).copied().unwrap_or_default()
    }

    pub fn total(&self) -> PartitionReport {
        self.partitions
            .values()
            .fold(PartitionReport::default(), |acc, p| PartitionReport {
                attempted: acc.attempted + p.attempted,
                inserted: acc.inserted + p.inserted,
                skipped: acc.skipped + p.skipped,
                failed: acc.failed + p.failed,
            })
    }
}

/// Hands each kind's records to the store's insert-if-absent operation.
#[derive(Clone)]
pub struct Reconciler {
    store: Option<Arc<dyn DocumentStore>>,
}

impl Reconciler {
    pub fn new(store: Option<Arc<dyn DocumentStore>>) -> Self {
        Self { store }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub async fn reconcile(&self, records: &[OpportunityRecord]) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        if records.is_empty() {
            info!("no records collected; skipping persistence");
            return report;
        }

        if self.store.is_none() {
            warn!(count = records.len(), "persistence unavailable; records not saved");
        }

        let mut partitions: BTreeMap<OpportunityKind, Vec<&OpportunityRecord>> = BTreeMap::new();
        for record in records {
            partitions.entry(record.kind).or_default().push(record);
        }

        for (kind, group) in partitions {
            let collection = kind.collection();
            let counts = match &self.store {
                Some(store) => Self::persist_partition(store.as_ref(), collection, &group).await,
                None => PartitionReport {
                    attempted: group.len(),
                    failed: group.len(),
                    ..PartitionReport::default()
                },
            };
            info!(
                collection,
                attempted = counts.attempted,
                inserted = counts.inserted,
                skipped = counts.skipped,
                failed = counts.failed,
                "collection sync complete"
            );
            report.partitions.insert(kind, counts);
        }
        report
    }

    async fn persist_partition(
        store: &dyn DocumentStore,
        collection: &str,
        group: &[&OpportunityRecord],
    ) -> PartitionReport {
        let mut counts = PartitionReport::default();
        info!(collection, backend = store.backend(), count = group.len(), "starting store sync");

        for record in group {
            counts.attempted += 1;
            if record.id.is_empty() {
                warn!(collection, name = %record.name, "skipping record without id");
                counts.failed += 1;
                continue;
            }
            if record.has_unstable_id() {
                warn!(collection, id = %record.id, "record has no name; id is not stable across runs");
            }

            match store.upsert_if_absent(collection, &record.id, record).await {
                Ok(UpsertOutcome::Inserted) => counts.inserted += 1,
                Ok(UpsertOutcome::Skipped) => counts.skipped += 1,
                Err(err) => {
                    error!(collection, id = %record.id, error = %err, "error persisting record");
                    counts.failed += 1;
                }
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sites: Vec<SiteReport>,
    pub extracted: usize,
    pub persistence_enabled: bool,
    pub reconcile: ReconcileReport,
}

impl SyncRunSummary {
    pub fn failed_sites(&self) -> usize {
        self.sites.iter().filter(|s| s.error.is_some()).count()
    }
}

pub struct SyncPipeline {
    targets: TargetRegistry,
    fetcher: Arc<dyn PageFetcher>,
    reconciler: Reconciler,
    retry: RetryPolicy,
    settle_delay: Duration,
}

impl SyncPipeline {
    pub fn new(
        targets: TargetRegistry,
        fetcher: Arc<dyn PageFetcher>,
        store: Option<Arc<dyn DocumentStore>>,
    ) -> Self {
        Self {
            targets,
            fetcher,
            reconciler: Reconciler::new(store),
            retry: RetryPolicy::default(),
            settle_delay: Duration::from_secs(5),
        }
    }

    pub fn with_timing(mut self, retry: RetryPolicy, settle_delay: Duration) -> Self {
        self.retry = retry;
        self.settle_delay = settle_delay;
        self
    }

    /// Wire the HTTP fetcher, target registry and document store from configuration.
    /// A store that cannot be opened disables persistence instead of failing.
    pub async fn from_config(config: &SyncConfig) -> Result<Self> {
        let targets = TargetRegistry::from_config(config).await?;
        let fetcher = HttpPageFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.nav_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
        })?;
        let store = match open_document_store(config).await {
            Ok(store) => {
                info!(backend = store.backend(), "document store ready");
                Some(store)
            }
            Err(err) => {
                warn!(error = %err, "persistence disabled; extraction results will only be logged");
                None
            }
        };

        Ok(Self::new(targets, Arc::new(fetcher), store)
            .with_timing(config.retry_policy(), config.settle_delay()))
    }

    pub fn targets(&self) -> &TargetRegistry {
        &self.targets
    }

    /// Visit every target in order on one session. A failing site is logged and
    /// contributes nothing; it never stops the remaining sites.
    pub async fn collect(&self) -> Result<RunBatch> {
        let mut session = self
            .fetcher
            .open_session()
            .await
            .context("opening page session")?;
        let mut batch = RunBatch::default();

        for target in &self.targets.targets {
            let span = info_span!("site", site = %target.name, extractor = target.extractor.as_str());
            let result = self
                .scrape_site(session.as_mut(), target)
                .instrument(span)
                .await;

            let report = match result {
                Ok(records) => {
                    if records.is_empty() {
                        warn!(site = %target.name, "no records found; check selectors or page structure");
                    } else {
                        info!(site = %target.name, count = records.len(), "extracted records");
                    }
                    let count = records.len();
                    batch.records.extend(records);
                    SiteReport {
                        site: target.name.clone(),
                        url: target.url.clone(),
                        records: count,
                        error: None,
                    }
                }
                Err(err) => {
                    error!(site = %target.name, url = %target.url, error = %err, "failed to scrape site");
                    SiteReport {
                        site: target.name.clone(),
                        url: target.url.clone(),
                        records: 0,
                        error: Some(err.to_string()),
                    }
                }
            };
            batch.site_reports.push(report);
        }

        session.close().await;
        info!(total = batch.records.len(), failed_sites = batch.failed_sites(), "collection finished");
        Ok(batch)
    }

    async fn scrape_site(
        &self,
        session: &mut dyn govopp_storage::PageSession,
        target: &TargetSite,
    ) -> Result<Vec<OpportunityRecord>, SiteError> {
        let source_url = Url::parse(&target.url)?;
        let page = fetch_with_retry(session, source_url.as_str(), &self.retry).await?;
        // client-side rendering gets a fixed grace period before the snapshot is read
        tokio::time::sleep(self.settle_delay).await;
        let records = target
            .extractor
            .extract_html(&page.html, &source_url, &target.defaults)?;
        Ok(records)
    }

    pub async fn run_once(&self) -> Result<SyncRunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        info!(%run_id, targets = self.targets.targets.len(), "starting scrape run");

        let batch = self.collect().await?;
        let reconcile = self.reconciler.reconcile(&batch.records).await;

        let summary = SyncRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            extracted: batch.records.len(),
            sites: batch.site_reports,
            persistence_enabled: self.reconciler.is_enabled(),
            reconcile,
        };
        let total = summary.reconcile.total();
        info!(
            %run_id,
            extracted = summary.extracted,
            inserted = total.inserted,
            skipped = total.skipped,
            failed = total.failed,
            "scrape run complete"
        );
        Ok(summary)
    }
}

/// Process-wide "a run is in flight" flag.
#[derive(Debug, Default)]
pub struct SingleFlight {
    running: AtomicBool,
}

/// Clears the flag when dropped, including while unwinding from a panic.
#[derive(Debug)]
pub struct FlightGuard<'a> {
    running: &'a AtomicBool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

impl SingleFlight {
    pub fn try_acquire(&self) -> Option<FlightGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard {
                running: &self.running,
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Completed,
    Failed,
    /// Another run held the flag; the trigger was dropped, not queued.
    Skipped,
}

#[derive(Debug, Default)]
pub struct SingleFlightScheduler {
    flight: SingleFlight,
}

impl SingleFlightScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.flight.is_running()
    }

    pub async fn trigger<F, Fut, T>(&self, source: &str, run: F) -> TriggerOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some(_guard) = self.flight.try_acquire() else {
            info!(trigger = source, "previous run still in progress, skipping this tick");
            return TriggerOutcome::Skipped;
        };

        let started = Utc::now();
        info!(trigger = source, started_at = %started.to_rfc3339(), "starting run");

        let outcome = match run().await {
            Ok(_) => TriggerOutcome::Completed,
            Err(err) => {
                error!(trigger = source, error = ?err, "run failed");
                TriggerOutcome::Failed
            }
        };

        let finished = Utc::now();
        let duration_secs = (finished - started).num_milliseconds() as f64 / 1000.0;
        info!(
            trigger = source,
            finished_at = %finished.to_rfc3339(),
            duration_secs,
            "finished run"
        );
        outcome
    }
}

/// Kick off one run immediately, then register the daily cron job.
/// `cron` is evaluated in UTC.
/// The returned scheduler is already started; keep it alive for the process lifetime.
pub async fn start_schedule(
    pipeline: Arc<SyncPipeline>,
    cron: &str,
) -> Result<(Arc<SingleFlightScheduler>, JobScheduler)> {
    let flights = Arc::new(SingleFlightScheduler::new());

    {
        let flights = flights.clone();
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            flights.trigger("startup", || pipeline.run_once()).await;
        });
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let job_flights = flights.clone();
    let job = Job::new_async(cron, move |_uuid, _l| {
        let flights = job_flights.clone();
        let pipeline = pipeline.clone();
        Box::pin(async move {
            flights.trigger("cron", || pipeline.run_once()).await;
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))?;
    sched.add(job).await.context("adding scheduler job")?;
    sched.start().await.context("starting scheduler")?;

    info!(cron, timezone = "UTC", "scheduler is active");
    Ok((flights, sched))
}

pub async fn run_sync_once_from_env() -> Result<SyncRunSummary> {
    let config = SyncConfig::from_env();
    let pipeline = SyncPipeline::from_config(&config).await?;
    pipeline.run_once().await
}
