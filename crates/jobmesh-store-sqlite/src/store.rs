// jobmesh-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Job Store
// Description: Durable job and tenant repositories backed by SQLite.
// Purpose: Persist jobs, upstream edges, run history, and tenant data.
// Dependencies: jobmesh-core, rusqlite, serde, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`SqliteJobStore`] keeps one `job` row per `(project_name, name)`. Scalar
//! spec fields (version, owner, schedule dates and flags, window triple, task
//! name) live in their own columns; structured fields (labels, retry, hooks,
//! alerts, task config, HTTP upstreams, assets, metadata) are JSON columns;
//! `sources` and `static_upstreams` are JSON string arrays. Sources are also
//! mirrored into `job_source` so resolution and downstream lookups stay in
//! SQL.
//!
//! Deletes are soft: the row stays with `deleted = 1` and its outgoing edges
//! are removed. Batch writes run in one transaction and skip conflicting
//! items individually.
//!
//! Database contents are untrusted; undecodable rows surface as
//! [`SqliteStoreError::Corrupt`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use jobmesh_core::Alert;
use jobmesh_core::ConfigMap;
use jobmesh_core::DomainError;
use jobmesh_core::Downstream;
use jobmesh_core::ErrorKind;
use jobmesh_core::FullName;
use jobmesh_core::Hook;
use jobmesh_core::HttpUpstream;
use jobmesh_core::Job;
use jobmesh_core::JobName;
use jobmesh_core::JobRepository;
use jobmesh_core::Metadata;
use jobmesh_core::Namespace;
use jobmesh_core::NamespaceName;
use jobmesh_core::OperationContext;
use jobmesh_core::Owner;
use jobmesh_core::Project;
use jobmesh_core::ProjectName;
use jobmesh_core::ResourceUrn;
use jobmesh_core::Retry;
use jobmesh_core::ScheduleBuilder;
use jobmesh_core::ScheduleDate;
use jobmesh_core::Secret;
use jobmesh_core::SecretName;
use jobmesh_core::SecretType;
use jobmesh_core::SpecBuilder;
use jobmesh_core::SpecUpstream;
use jobmesh_core::SpecUpstreamName;
use jobmesh_core::StringMap;
use jobmesh_core::Task;
use jobmesh_core::TaskName;
use jobmesh_core::Tenant;
use jobmesh_core::TenantRepository;
use jobmesh_core::Upstream;
use jobmesh_core::UpstreamState;
use jobmesh_core::UpstreamType;
use jobmesh_core::Version;
use jobmesh_core::WindowConfig;
use jobmesh_core::WithUpstream;
use jobmesh_core::WriteOutcome;
use jobmesh_core::errors::ENTITY_JOB;
use jobmesh_core::errors::ENTITY_NAMESPACE;
use jobmesh_core::errors::ENTITY_PROJECT;
use jobmesh_core::errors::ENTITY_SECRET;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::Transaction;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 2;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Entity label for store-level failures.
const ENTITY_STORE: &str = "store";
/// Job columns in [`JobRow::read`] order, qualified by the `j` alias.
const JOB_COLUMNS: &str = "j.project_name, j.name, j.namespace_name, j.version, j.owner, \
    j.description, j.labels, j.start_date, j.end_date, j.interval, j.depends_on_past, \
    j.catch_up, j.retry, j.window_size, j.window_offset, j.window_truncate_to, j.task_name, \
    j.task_config, j.hooks, j.alerts, j.static_upstreams, j.http_upstreams, j.assets, \
    j.metadata, j.destination, j.sources, j.deleted";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode.
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode.
    #[default]
    Full,
    /// Normal synchronous mode.
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` job store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a config with default pragmas for the path.
    #[must_use]
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding stored job payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored row could not be decoded.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store configuration or input.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for DomainError {
    fn from(error: SqliteStoreError) -> Self {
        let kind = match error {
            SqliteStoreError::Invalid(_) => ErrorKind::InvalidArgument,
            _ => ErrorKind::Internal,
        };
        Self::new(kind, ENTITY_STORE, error.to_string())
    }
}

/// Maps an engine error.
#[allow(clippy::needless_pass_by_value, reason = "Used directly as a map_err callback.")]
fn db(err: rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

/// Maps a domain validation failure on a stored row.
#[allow(clippy::needless_pass_by_value, reason = "Used directly as a map_err callback.")]
fn corrupt(err: DomainError) -> SqliteStoreError {
    SqliteStoreError::Corrupt(err.message)
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed job and tenant store.
///
/// # Invariants
/// - Connection access is serialized through a mutex.
/// - A job key is live for at most one row; soft-deleted rows are revived on
///   re-insert.
#[derive(Clone)]
pub struct SqliteJobStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    /// Opens an `SQLite`-backed store, creating the schema when absent.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        debug!(path = %config.path.display(), "opened sqlite job store");
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Records a run of a job.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the insert fails.
    pub fn record_run(
        &self,
        project: &ProjectName,
        name: &JobName,
    ) -> Result<(), SqliteStoreError> {
        self.lock()?
            .execute(
                "INSERT INTO job_run (project_name, job_name, recorded_at) VALUES (?1, ?2, ?3)",
                params![project.as_str(), name.as_str(), unix_millis()],
            )
            .map_err(db)?;
        Ok(())
    }

    /// Returns the number of recorded runs of a job.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn run_count(
        &self,
        project: &ProjectName,
        name: &JobName,
    ) -> Result<u64, SqliteStoreError> {
        let count: i64 = self
            .lock()?
            .query_row(
                "SELECT COUNT(1) FROM job_run WHERE project_name = ?1 AND job_name = ?2",
                params![project.as_str(), name.as_str()],
                |row| row.get(0),
            )
            .map_err(db)?;
        u64::try_from(count)
            .map_err(|_| SqliteStoreError::Corrupt("negative run count".to_string()))
    }

    /// Verifies the store can execute a simple SQL statement.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] if the mutex is poisoned or the query fails.
    pub fn readiness(&self) -> Result<(), SqliteStoreError> {
        self.lock()?.execute_batch("SELECT 1").map_err(db)
    }

    /// Locks the connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite mutex poisoned".to_string()))
    }
}

// ============================================================================
// SECTION: Job Repository
// ============================================================================

impl JobRepository for SqliteJobStore {
    fn add(&self, ctx: &OperationContext, jobs: Vec<Job>) -> Result<WriteOutcome, DomainError> {
        ctx.check()?;
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(db)?;
        let mut outcome = WriteOutcome::default();
        for job in jobs {
            let key = job.full_name();
            if fetch_job(&tx, job.project_name(), job.name(), true)?.is_some() {
                let error =
                    DomainError::already_exists(ENTITY_JOB, format!("job {key} already exists"));
                outcome.skip(job, error);
                continue;
            }
            write_job(&tx, &job)?;
            outcome.accept(job);
        }
        tx.commit().map_err(db)?;
        drop(guard);
        Ok(outcome)
    }

    fn update(
        &self,
        ctx: &OperationContext,
        jobs: Vec<Job>,
    ) -> Result<WriteOutcome, DomainError> {
        ctx.check()?;
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(db)?;
        let mut outcome = WriteOutcome::default();
        for job in jobs {
            let key = job.full_name();
            let Some(existing) = fetch_job(&tx, job.project_name(), job.name(), true)? else {
                let error = DomainError::not_found(ENTITY_JOB, format!("job {key} not found"));
                outcome.skip(job, error);
                continue;
            };
            let existing_namespace = existing.tenant().namespace_name();
            if existing_namespace != job.tenant().namespace_name() {
                let error = DomainError::invalid_argument(
                    ENTITY_JOB,
                    format!("job {key} already exists in namespace {existing_namespace}"),
                );
                outcome.skip(job, error);
                continue;
            }
            write_job(&tx, &job)?;
            outcome.accept(job);
        }
        tx.commit().map_err(db)?;
        drop(guard);
        Ok(outcome)
    }

    fn delete(
        &self,
        ctx: &OperationContext,
        project: &ProjectName,
        name: &JobName,
        clean_history: bool,
    ) -> Result<(), DomainError> {
        ctx.check()?;
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(db)?;
        let changed = tx
            .execute(
                "UPDATE job SET deleted = 1, updated_at = ?3 \
                 WHERE project_name = ?1 AND name = ?2 AND deleted = 0",
                params![project.as_str(), name.as_str(), unix_millis()],
            )
            .map_err(db)?;
        if changed == 0 {
            return Err(DomainError::not_found(
                ENTITY_JOB,
                format!("job {} not found", FullName::new(project, name)),
            ));
        }
        tx.execute(
            "DELETE FROM job_upstream WHERE project_name = ?1 AND job_name = ?2",
            params![project.as_str(), name.as_str()],
        )
        .map_err(db)?;
        if clean_history {
            tx.execute(
                "DELETE FROM job_run WHERE project_name = ?1 AND job_name = ?2",
                params![project.as_str(), name.as_str()],
            )
            .map_err(db)?;
        }
        tx.commit().map_err(db)?;
        drop(guard);
        Ok(())
    }

    fn replace_upstreams(
        &self,
        ctx: &OperationContext,
        jobs: &[WithUpstream],
    ) -> Result<(), DomainError> {
        ctx.check()?;
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(db)?;
        for with_upstream in jobs {
            let job = with_upstream.job();
            tx.execute(
                "DELETE FROM job_upstream WHERE project_name = ?1 AND job_name = ?2",
                params![job.project_name().as_str(), job.name().as_str()],
            )
            .map_err(db)?;
            for (position, upstream) in with_upstream.upstreams().iter().enumerate() {
                insert_upstream(&tx, job, position, upstream)?;
            }
        }
        tx.commit().map_err(db)?;
        drop(guard);
        Ok(())
    }

    fn get_by_job_name(
        &self,
        ctx: &OperationContext,
        project: &ProjectName,
        name: &JobName,
    ) -> Result<Job, DomainError> {
        ctx.check()?;
        let guard = self.lock()?;
        fetch_job(&guard, project, name, true)?.ok_or_else(|| {
            DomainError::not_found(
                ENTITY_JOB,
                format!("job {} not found", FullName::new(project, name)),
            )
        })
    }

    fn get_all_by_tenant(
        &self,
        ctx: &OperationContext,
        tenant: &Tenant,
    ) -> Result<Vec<Job>, DomainError> {
        ctx.check()?;
        let guard = self.lock()?;
        Ok(query_jobs(
            &guard,
            &format!(
                "SELECT {JOB_COLUMNS} FROM job j WHERE j.deleted = 0 AND j.project_name = ?1 \
                 AND j.namespace_name = ?2 ORDER BY j.name"
            ),
            params![tenant.project_name().as_str(), tenant.namespace_name().as_str()],
        )?)
    }

    fn get_all_by_project_name(
        &self,
        ctx: &OperationContext,
        project: &ProjectName,
    ) -> Result<Vec<Job>, DomainError> {
        ctx.check()?;
        let guard = self.lock()?;
        Ok(query_jobs(
            &guard,
            &format!(
                "SELECT {JOB_COLUMNS} FROM job j WHERE j.deleted = 0 AND j.project_name = ?1 \
                 ORDER BY j.name"
            ),
            params![project.as_str()],
        )?)
    }

    fn get_all_by_resource_destination(
        &self,
        ctx: &OperationContext,
        destination: &ResourceUrn,
    ) -> Result<Vec<Job>, DomainError> {
        ctx.check()?;
        let guard = self.lock()?;
        Ok(query_jobs(
            &guard,
            &format!(
                "SELECT {JOB_COLUMNS} FROM job j WHERE j.deleted = 0 AND j.destination = ?1 \
                 ORDER BY j.project_name, j.name"
            ),
            params![destination.as_str()],
        )?)
    }

    fn resolve_upstreams(
        &self,
        ctx: &OperationContext,
        project: &ProjectName,
        names: &[JobName],
    ) -> Result<BTreeMap<JobName, Vec<Upstream>>, DomainError> {
        ctx.check()?;
        let guard = self.lock()?;
        let producers_sql = format!(
            "SELECT {JOB_COLUMNS} FROM job j JOIN job_source s ON s.resource = j.destination \
             WHERE j.deleted = 0 AND s.project_name = ?1 AND s.job_name = ?2 \
             AND NOT (j.project_name = ?1 AND j.name = ?2) \
             ORDER BY s.position, j.project_name, j.name"
        );
        let mut resolved = BTreeMap::new();
        for name in names {
            let Some(consumer) = fetch_job(&guard, project, name, true)? else {
                continue;
            };
            let mut links = Vec::new();
            for declared in consumer.static_upstream_names() {
                let Ok((upstream_project, upstream_name)) = declared.parts() else {
                    continue;
                };
                let upstream_project = upstream_project.unwrap_or_else(|| project.clone());
                if let Some(producer) =
                    fetch_job(&guard, &upstream_project, &upstream_name, true)?
                {
                    links.push(Upstream::resolved_to_job(&producer, UpstreamType::Static));
                }
            }
            let producers = query_jobs(
                &guard,
                &producers_sql,
                params![project.as_str(), name.as_str()],
            )?;
            links.extend(
                producers
                    .iter()
                    .map(|producer| Upstream::resolved_to_job(producer, UpstreamType::Inferred)),
            );
            resolved.insert(name.clone(), links);
        }
        drop(guard);
        Ok(resolved)
    }

    fn get_downstream_by_destination(
        &self,
        ctx: &OperationContext,
        project: &ProjectName,
        destination: &ResourceUrn,
    ) -> Result<Vec<Downstream>, DomainError> {
        ctx.check()?;
        let guard = self.lock()?;
        let consumers = query_jobs(
            &guard,
            &format!(
                "SELECT {JOB_COLUMNS} FROM job j WHERE j.deleted = 0 AND j.project_name = ?1 \
                 AND EXISTS (SELECT 1 FROM job_source s WHERE s.project_name = j.project_name \
                 AND s.job_name = j.name AND s.resource = ?2) ORDER BY j.name"
            ),
            params![project.as_str(), destination.as_str()],
        )?;
        Ok(consumers.iter().map(Downstream::from_job).collect())
    }

    fn get_downstream_by_job_name(
        &self,
        ctx: &OperationContext,
        project: &ProjectName,
        name: &JobName,
    ) -> Result<Vec<Downstream>, DomainError> {
        ctx.check()?;
        let guard = self.lock()?;
        // A consumer qualifies through a local resolved edge, a declared static
        // name, or a source matching the target's destination.
        let consumers = query_jobs(
            &guard,
            &format!(
                "SELECT {JOB_COLUMNS} FROM job j WHERE j.deleted = 0 \
                 AND NOT (j.project_name = ?1 AND j.name = ?2) AND ( \
                 EXISTS (SELECT 1 FROM job_upstream e \
                   WHERE e.project_name = j.project_name AND e.job_name = j.name \
                   AND e.upstream_project_name = ?1 AND e.upstream_name = ?2 \
                   AND e.upstream_state = 'resolved' AND e.upstream_host = '') \
                 OR EXISTS (SELECT 1 FROM json_each(j.static_upstreams) u \
                   WHERE u.value = ?1 || '/' || ?2 \
                   OR (j.project_name = ?1 AND u.value = ?2)) \
                 OR EXISTS (SELECT 1 FROM job_source s JOIN job p ON p.destination = s.resource \
                   WHERE s.project_name = j.project_name AND s.job_name = j.name \
                   AND p.project_name = ?1 AND p.name = ?2 AND p.deleted = 0)) \
                 ORDER BY j.project_name, j.name"
            ),
            params![project.as_str(), name.as_str()],
        )?;
        drop(guard);
        Ok(consumers.iter().map(Downstream::from_job).collect())
    }

    fn get_upstreams(
        &self,
        ctx: &OperationContext,
        project: &ProjectName,
        name: &JobName,
    ) -> Result<Vec<Upstream>, DomainError> {
        ctx.check()?;
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(
                "SELECT upstream_name, upstream_host, upstream_resource, upstream_project_name, \
                 upstream_namespace_name, upstream_task_name, upstream_type, upstream_state, \
                 upstream_external FROM job_upstream WHERE project_name = ?1 AND job_name = ?2 \
                 ORDER BY position",
            )
            .map_err(db)?;
        let rows = statement
            .query_map(params![project.as_str(), name.as_str()], |row| {
                Ok(UpstreamRow {
                    name: row.get(0)?,
                    host: row.get(1)?,
                    resource: row.get(2)?,
                    project_name: row.get(3)?,
                    namespace_name: row.get(4)?,
                    task_name: row.get(5)?,
                    upstream_type: row.get(6)?,
                    state: row.get(7)?,
                    external: row.get(8)?,
                })
            })
            .map_err(db)?;
        let mut upstreams = Vec::new();
        for row in rows {
            upstreams.push(row.map_err(db)?.into_upstream()?);
        }
        Ok(upstreams)
    }
}

// ============================================================================
// SECTION: Tenant Repository
// ============================================================================

impl TenantRepository for SqliteJobStore {
    fn save_project(&self, project: &Project) -> Result<(), DomainError> {
        let config = encode_column(project.config())?;
        self.lock()?
            .execute(
                "INSERT INTO project (name, config_json, updated_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT (name) DO UPDATE SET config_json = excluded.config_json, \
                 updated_at = excluded.updated_at",
                params![project.name().as_str(), config, unix_millis()],
            )
            .map_err(db)?;
        Ok(())
    }

    fn get_project(&self, name: &ProjectName) -> Result<Project, DomainError> {
        let guard = self.lock()?;
        let config: Option<String> = guard
            .query_row(
                "SELECT config_json FROM project WHERE name = ?1",
                params![name.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db)?;
        drop(guard);
        let Some(config) = config else {
            return Err(DomainError::not_found(
                ENTITY_PROJECT,
                format!("project {name} not found"),
            ));
        };
        Project::new(name.clone(), decode_column::<ConfigMap>("config_json", &config)?)
    }

    fn get_all_projects(&self) -> Result<Vec<Project>, DomainError> {
        let guard = self.lock()?;
        let mut statement =
            guard.prepare("SELECT name, config_json FROM project ORDER BY name").map_err(db)?;
        let rows = statement
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(db)?;
        let mut projects = Vec::new();
        for row in rows {
            let (name, config) = row.map_err(db)?;
            let config = decode_column::<ConfigMap>("config_json", &config)?;
            projects.push(Project::new(ProjectName::new(name)?, config)?);
        }
        Ok(projects)
    }

    fn save_namespace(&self, namespace: &Namespace) -> Result<(), DomainError> {
        let config = encode_column(namespace.config())?;
        let guard = self.lock()?;
        let project_exists: Option<i64> = guard
            .query_row(
                "SELECT 1 FROM project WHERE name = ?1",
                params![namespace.project_name().as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db)?;
        if project_exists.is_none() {
            return Err(DomainError::not_found(
                ENTITY_PROJECT,
                format!("project {} not found", namespace.project_name()),
            ));
        }
        guard
            .execute(
                "INSERT INTO namespace (project_name, name, config_json, updated_at) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT (project_name, name) DO UPDATE SET \
                 config_json = excluded.config_json, updated_at = excluded.updated_at",
                params![
                    namespace.project_name().as_str(),
                    namespace.name().as_str(),
                    config,
                    unix_millis()
                ],
            )
            .map_err(db)?;
        drop(guard);
        Ok(())
    }

    fn get_namespace(
        &self,
        project: &ProjectName,
        name: &NamespaceName,
    ) -> Result<Namespace, DomainError> {
        let guard = self.lock()?;
        let config: Option<String> = guard
            .query_row(
                "SELECT config_json FROM namespace WHERE project_name = ?1 AND name = ?2",
                params![project.as_str(), name.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db)?;
        drop(guard);
        let Some(config) = config else {
            return Err(DomainError::not_found(
                ENTITY_NAMESPACE,
                format!("namespace {project}/{name} not found"),
            ));
        };
        let config = decode_column::<ConfigMap>("config_json", &config)?;
        Namespace::new(name.clone(), project.clone(), config)
    }

    fn get_all_namespaces(&self, project: &ProjectName) -> Result<Vec<Namespace>, DomainError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(
                "SELECT name, config_json FROM namespace WHERE project_name = ?1 ORDER BY name",
            )
            .map_err(db)?;
        let rows = statement
            .query_map(params![project.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(db)?;
        let mut namespaces = Vec::new();
        for row in rows {
            let (name, config) = row.map_err(db)?;
            let config = decode_column::<ConfigMap>("config_json", &config)?;
            namespaces.push(Namespace::new(NamespaceName::new(name)?, project.clone(), config)?);
        }
        Ok(namespaces)
    }

    fn save_secret(&self, secret: &Secret) -> Result<(), DomainError> {
        let guard = self.lock()?;
        let tenant = secret.tenant();
        if secret_exists(&guard, tenant, secret.name())? {
            return Err(DomainError::already_exists(
                ENTITY_SECRET,
                format!("secret {} already exists", secret.name()),
            ));
        }
        guard
            .execute(
                "INSERT INTO secret (project_name, namespace_name, name, secret_type, \
                 encoded_value, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    tenant.project_name().as_str(),
                    tenant.namespace_name().as_str(),
                    secret.name().as_str(),
                    secret.secret_type().as_str(),
                    secret.encoded_value(),
                    unix_millis()
                ],
            )
            .map_err(db)?;
        drop(guard);
        Ok(())
    }

    fn update_secret(&self, secret: &Secret) -> Result<(), DomainError> {
        let tenant = secret.tenant();
        let changed = self
            .lock()?
            .execute(
                "UPDATE secret SET secret_type = ?4, encoded_value = ?5, updated_at = ?6 \
                 WHERE project_name = ?1 AND namespace_name = ?2 AND name = ?3",
                params![
                    tenant.project_name().as_str(),
                    tenant.namespace_name().as_str(),
                    secret.name().as_str(),
                    secret.secret_type().as_str(),
                    secret.encoded_value(),
                    unix_millis()
                ],
            )
            .map_err(db)?;
        if changed == 0 {
            return Err(DomainError::not_found(
                ENTITY_SECRET,
                format!("secret {} not found", secret.name()),
            ));
        }
        Ok(())
    }

    fn get_secret(&self, tenant: &Tenant, name: &SecretName) -> Result<Secret, DomainError> {
        let guard = self.lock()?;
        let row: Option<(String, String)> = guard
            .query_row(
                "SELECT secret_type, encoded_value FROM secret \
                 WHERE project_name = ?1 AND namespace_name = ?2 AND name = ?3",
                params![
                    tenant.project_name().as_str(),
                    tenant.namespace_name().as_str(),
                    name.as_str()
                ],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db)?;
        drop(guard);
        let Some((secret_type, encoded)) = row else {
            return Err(DomainError::not_found(ENTITY_SECRET, format!("secret {name} not found")));
        };
        let secret_type = SecretType::parse(&secret_type)?;
        Secret::from_encoded(name.clone(), secret_type, encoded, tenant.clone())
    }

    fn get_secrets(&self, tenant: &Tenant) -> Result<Vec<Secret>, DomainError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(
                "SELECT namespace_name, name, secret_type, encoded_value FROM secret \
                 WHERE project_name = ?1 \
                 AND (?2 = '' OR namespace_name = '' OR namespace_name = ?2) \
                 ORDER BY namespace_name, name",
            )
            .map_err(db)?;
        let rows = statement
            .query_map(
                params![tenant.project_name().as_str(), tenant.namespace_name().as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .map_err(db)?;
        let mut secrets = Vec::new();
        for row in rows {
            let (namespace, name, secret_type, encoded) = row.map_err(db)?;
            let namespace = if namespace.is_empty() {
                NamespaceName::project_scope()
            } else {
                NamespaceName::new(namespace)?
            };
            secrets.push(Secret::from_encoded(
                SecretName::new(&name)?,
                SecretType::parse(&secret_type)?,
                encoded,
                Tenant::from_parts(tenant.project_name().clone(), namespace),
            )?);
        }
        Ok(secrets)
    }

    fn delete_secret(&self, tenant: &Tenant, name: &SecretName) -> Result<(), DomainError> {
        let changed = self
            .lock()?
            .execute(
                "DELETE FROM secret WHERE project_name = ?1 AND namespace_name = ?2 AND name = ?3",
                params![
                    tenant.project_name().as_str(),
                    tenant.namespace_name().as_str(),
                    name.as_str()
                ],
            )
            .map_err(db)?;
        if changed == 0 {
            return Err(DomainError::not_found(ENTITY_SECRET, format!("secret {name} not found")));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Rows
// ============================================================================

/// Raw `job` row as selected by [`JOB_COLUMNS`].
struct JobRow {
    /// Owning project.
    project_name: String,
    /// Job name.
    name: String,
    /// Owning namespace.
    namespace_name: String,
    /// Spec version.
    version: u32,
    /// Owner.
    owner: String,
    /// Description.
    description: String,
    /// Labels as a JSON object.
    labels: String,
    /// Schedule start date.
    start_date: String,
    /// Schedule end date.
    end_date: Option<String>,
    /// Schedule interval.
    interval: String,
    /// Depends-on-past flag.
    depends_on_past: bool,
    /// Catch-up flag.
    catch_up: bool,
    /// Retry policy as JSON.
    retry: Option<String>,
    /// Window size.
    window_size: String,
    /// Window offset.
    window_offset: String,
    /// Window truncation unit.
    window_truncate_to: String,
    /// Task plugin name.
    task_name: String,
    /// Task config as a JSON object.
    task_config: String,
    /// Hooks as a JSON array.
    hooks: String,
    /// Alerts as a JSON array.
    alerts: String,
    /// Static upstream names as a JSON string array.
    static_upstreams: String,
    /// HTTP upstreams as a JSON array.
    http_upstreams: String,
    /// Assets as a JSON object.
    assets: String,
    /// Metadata as JSON.
    metadata: Option<String>,
    /// Destination URN.
    destination: Option<String>,
    /// Source URNs as a JSON string array.
    sources: String,
    /// Soft-delete flag.
    deleted: bool,
}

impl JobRow {
    /// Reads a row selected with [`JOB_COLUMNS`].
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            project_name: row.get(0)?,
            name: row.get(1)?,
            namespace_name: row.get(2)?,
            version: row.get(3)?,
            owner: row.get(4)?,
            description: row.get(5)?,
            labels: row.get(6)?,
            start_date: row.get(7)?,
            end_date: row.get(8)?,
            interval: row.get(9)?,
            depends_on_past: row.get(10)?,
            catch_up: row.get(11)?,
            retry: row.get(12)?,
            window_size: row.get(13)?,
            window_offset: row.get(14)?,
            window_truncate_to: row.get(15)?,
            task_name: row.get(16)?,
            task_config: row.get(17)?,
            hooks: row.get(18)?,
            alerts: row.get(19)?,
            static_upstreams: row.get(20)?,
            http_upstreams: row.get(21)?,
            assets: row.get(22)?,
            metadata: row.get(23)?,
            destination: row.get(24)?,
            sources: row.get(25)?,
            deleted: row.get(26)?,
        })
    }

    /// Rebuilds the job, re-validating the spec.
    fn into_job(self) -> Result<Job, SqliteStoreError> {
        let project = ProjectName::new(self.project_name).map_err(corrupt)?;
        let namespace = if self.namespace_name.is_empty() {
            NamespaceName::project_scope()
        } else {
            NamespaceName::new(self.namespace_name).map_err(corrupt)?
        };

        let mut schedule =
            ScheduleBuilder::new(ScheduleDate::new(self.start_date).map_err(corrupt)?)
                .with_interval(self.interval)
                .with_depends_on_past(self.depends_on_past)
                .with_catch_up(self.catch_up);
        if let Some(end_date) = self.end_date {
            schedule = schedule.with_end_date(ScheduleDate::new(end_date).map_err(corrupt)?);
        }
        if let Some(retry) = self.retry {
            schedule = schedule.with_retry(decode_column::<Retry>("retry", &retry)?);
        }

        let task = Task::new(
            TaskName::new(self.task_name).map_err(corrupt)?,
            decode_column::<StringMap>("task_config", &self.task_config)?,
        );
        let upstream = SpecUpstream {
            upstream_names: decode_column::<Vec<SpecUpstreamName>>(
                "static_upstreams",
                &self.static_upstreams,
            )?,
            http_upstreams: decode_column::<Vec<HttpUpstream>>(
                "http_upstreams",
                &self.http_upstreams,
            )?,
        };
        let mut spec = SpecBuilder::new(
            Version::new(self.version).map_err(corrupt)?,
            JobName::new(self.name).map_err(corrupt)?,
            Owner::new(self.owner).map_err(corrupt)?,
            schedule.build().map_err(corrupt)?,
            WindowConfig::new(self.window_size, self.window_offset, self.window_truncate_to),
            task,
        )
        .with_description(self.description)
        .with_labels(decode_column::<StringMap>("labels", &self.labels)?)
        .with_hooks(decode_column::<Vec<Hook>>("hooks", &self.hooks)?)
        .with_alerts(decode_column::<Vec<Alert>>("alerts", &self.alerts)?)
        .with_upstream(upstream)
        .with_assets(decode_column::<StringMap>("assets", &self.assets)?);
        if let Some(metadata) = self.metadata {
            spec = spec.with_metadata(decode_column::<Metadata>("metadata", &metadata)?);
        }

        let destination = self.destination.map(ResourceUrn::new).transpose().map_err(corrupt)?;
        let sources = decode_column::<Vec<String>>("sources", &self.sources)?
            .into_iter()
            .map(ResourceUrn::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(corrupt)?;
        Ok(Job::new(
            Tenant::from_parts(project, namespace),
            spec.build().map_err(corrupt)?,
            destination,
            sources,
        ))
    }
}

/// Raw `job_upstream` row.
struct UpstreamRow {
    /// Producer job name.
    name: String,
    /// Peer host.
    host: String,
    /// Producer destination or consumed URN.
    resource: Option<String>,
    /// Producer project.
    project_name: Option<String>,
    /// Producer namespace.
    namespace_name: String,
    /// Producer task name.
    task_name: String,
    /// Link type label.
    upstream_type: String,
    /// Link state label.
    state: String,
    /// External flag.
    external: bool,
}

impl UpstreamRow {
    /// Converts a raw row; unknown labels are kept as unknown.
    fn into_upstream(self) -> Result<Upstream, SqliteStoreError> {
        let resource = self.resource.map(ResourceUrn::new).transpose().map_err(corrupt)?;
        let project_name = self.project_name.map(ProjectName::new).transpose().map_err(corrupt)?;
        let namespace_name = if self.namespace_name.is_empty() {
            NamespaceName::project_scope()
        } else {
            NamespaceName::new(self.namespace_name).map_err(corrupt)?
        };
        Ok(Upstream {
            name: self.name,
            host: self.host,
            resource,
            project_name,
            namespace_name,
            task_name: self.task_name,
            upstream_type: UpstreamType::parse_lenient(&self.upstream_type),
            state: UpstreamState::parse_lenient(&self.state),
            external: self.external,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    if path.display().to_string().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    if path.components().any(|component| component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH)
    {
        return Err(SqliteStoreError::Invalid(
            "store path contains an overlong component".to_string(),
        ));
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with the configured pragmas.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db)?;
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(db)?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db)?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(db)?;
    Ok(connection)
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(db)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(db)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(db)?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(db)?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS project (
                    name TEXT NOT NULL PRIMARY KEY,
                    config_json TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS namespace (
                    project_name TEXT NOT NULL REFERENCES project(name) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    config_json TEXT NOT NULL,
                    updated_at INTEGER NOT NULL,
                    PRIMARY KEY (project_name, name)
                );
                CREATE TABLE IF NOT EXISTS secret (
                    project_name TEXT NOT NULL,
                    namespace_name TEXT NOT NULL,
                    name TEXT NOT NULL,
                    secret_type TEXT NOT NULL,
                    encoded_value TEXT NOT NULL,
                    updated_at INTEGER NOT NULL,
                    PRIMARY KEY (project_name, namespace_name, name)
                );
                CREATE TABLE IF NOT EXISTS job (
                    project_name TEXT NOT NULL,
                    name TEXT NOT NULL,
                    namespace_name TEXT NOT NULL,
                    version INTEGER NOT NULL,
                    owner TEXT NOT NULL,
                    description TEXT NOT NULL,
                    labels TEXT NOT NULL,
                    start_date TEXT NOT NULL,
                    end_date TEXT,
                    interval TEXT NOT NULL,
                    depends_on_past INTEGER NOT NULL,
                    catch_up INTEGER NOT NULL,
                    retry TEXT,
                    window_size TEXT NOT NULL,
                    window_offset TEXT NOT NULL,
                    window_truncate_to TEXT NOT NULL,
                    task_name TEXT NOT NULL,
                    task_config TEXT NOT NULL,
                    hooks TEXT NOT NULL,
                    alerts TEXT NOT NULL,
                    static_upstreams TEXT NOT NULL,
                    http_upstreams TEXT NOT NULL,
                    assets TEXT NOT NULL,
                    metadata TEXT,
                    destination TEXT,
                    sources TEXT NOT NULL,
                    deleted INTEGER NOT NULL DEFAULT 0,
                    updated_at INTEGER NOT NULL,
                    PRIMARY KEY (project_name, name)
                );
                CREATE INDEX IF NOT EXISTS idx_job_destination ON job (destination);
                CREATE INDEX IF NOT EXISTS idx_job_tenant ON job (project_name, namespace_name);
                CREATE TABLE IF NOT EXISTS job_source (
                    project_name TEXT NOT NULL,
                    job_name TEXT NOT NULL,
                    position INTEGER NOT NULL,
                    resource TEXT NOT NULL,
                    PRIMARY KEY (project_name, job_name, position),
                    FOREIGN KEY (project_name, job_name)
                        REFERENCES job(project_name, name) ON DELETE CASCADE
                );
                CREATE INDEX IF NOT EXISTS idx_job_source_resource ON job_source (resource);
                CREATE TABLE IF NOT EXISTS job_upstream (
                    project_name TEXT NOT NULL,
                    job_name TEXT NOT NULL,
                    position INTEGER NOT NULL,
                    upstream_name TEXT NOT NULL,
                    upstream_host TEXT NOT NULL,
                    upstream_resource TEXT,
                    upstream_project_name TEXT,
                    upstream_namespace_name TEXT NOT NULL,
                    upstream_task_name TEXT NOT NULL,
                    upstream_type TEXT NOT NULL,
                    upstream_state TEXT NOT NULL,
                    upstream_external INTEGER NOT NULL,
                    PRIMARY KEY (project_name, job_name, position),
                    FOREIGN KEY (project_name, job_name)
                        REFERENCES job(project_name, name) ON DELETE CASCADE
                );
                CREATE INDEX IF NOT EXISTS idx_job_upstream_target
                    ON job_upstream (upstream_project_name, upstream_name);
                CREATE TABLE IF NOT EXISTS job_run (
                    project_name TEXT NOT NULL,
                    job_name TEXT NOT NULL,
                    recorded_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_job_run_job ON job_run (project_name, job_name);",
            )
            .map_err(db)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(db)?;
    Ok(())
}

/// Fetches one job, optionally only when live.
fn fetch_job(
    connection: &Connection,
    project: &ProjectName,
    name: &JobName,
    live_only: bool,
) -> Result<Option<Job>, SqliteStoreError> {
    let row = connection
        .query_row(
            &format!("SELECT {JOB_COLUMNS} FROM job j WHERE j.project_name = ?1 AND j.name = ?2"),
            params![project.as_str(), name.as_str()],
            JobRow::read,
        )
        .optional()
        .map_err(db)?;
    match row {
        Some(row) if live_only && row.deleted => Ok(None),
        Some(row) => row.into_job().map(Some),
        None => Ok(None),
    }
}

/// Inserts or revives a job and rewrites its sources.
fn write_job(tx: &Transaction<'_>, job: &Job) -> Result<(), SqliteStoreError> {
    let spec = job.spec();
    let schedule = spec.schedule();
    let window = spec.window();
    let project = job.project_name().as_str();
    let name = job.name().as_str();
    let sources: Vec<&str> = job.sources().iter().map(ResourceUrn::as_str).collect();
    let retry = schedule.retry().map(encode_column).transpose()?;
    let metadata = spec.metadata().map(encode_column).transpose()?;
    tx.execute(
        "INSERT INTO job (project_name, name, namespace_name, version, owner, description, \
         labels, start_date, end_date, interval, depends_on_past, catch_up, retry, \
         window_size, window_offset, window_truncate_to, task_name, task_config, hooks, \
         alerts, static_upstreams, http_upstreams, assets, metadata, destination, sources, \
         deleted, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, \
         ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, 0, ?27) \
         ON CONFLICT (project_name, name) DO UPDATE SET \
         namespace_name = excluded.namespace_name, version = excluded.version, \
         owner = excluded.owner, description = excluded.description, \
         labels = excluded.labels, start_date = excluded.start_date, \
         end_date = excluded.end_date, interval = excluded.interval, \
         depends_on_past = excluded.depends_on_past, catch_up = excluded.catch_up, \
         retry = excluded.retry, window_size = excluded.window_size, \
         window_offset = excluded.window_offset, \
         window_truncate_to = excluded.window_truncate_to, task_name = excluded.task_name, \
         task_config = excluded.task_config, hooks = excluded.hooks, \
         alerts = excluded.alerts, static_upstreams = excluded.static_upstreams, \
         http_upstreams = excluded.http_upstreams, assets = excluded.assets, \
         metadata = excluded.metadata, destination = excluded.destination, \
         sources = excluded.sources, deleted = 0, updated_at = excluded.updated_at",
        params![
            project,
            name,
            job.tenant().namespace_name().as_str(),
            i64::from(spec.version().get()),
            spec.owner().as_str(),
            spec.description(),
            encode_column(spec.labels())?,
            schedule.start_date().as_str(),
            schedule.end_date().map(ScheduleDate::as_str),
            schedule.interval(),
            schedule.depends_on_past(),
            schedule.catch_up(),
            retry,
            window.size,
            window.offset,
            window.truncate_to,
            spec.task().name.as_str(),
            encode_column(&spec.task().config)?,
            encode_column(spec.hooks())?,
            encode_column(spec.alerts())?,
            encode_column(&spec.upstream().upstream_names)?,
            encode_column(&spec.upstream().http_upstreams)?,
            encode_column(spec.assets())?,
            metadata,
            job.destination().map(ResourceUrn::as_str),
            encode_column(&sources)?,
            unix_millis()
        ],
    )
    .map_err(db)?;
    tx.execute(
        "DELETE FROM job_source WHERE project_name = ?1 AND job_name = ?2",
        params![project, name],
    )
    .map_err(db)?;
    for (position, source) in sources.iter().enumerate() {
        tx.execute(
            "INSERT INTO job_source (project_name, job_name, position, resource) \
             VALUES (?1, ?2, ?3, ?4)",
            params![project, name, position_value(position)?, source],
        )
        .map_err(db)?;
    }
    Ok(())
}

/// Inserts one edge row.
fn insert_upstream(
    tx: &Transaction<'_>,
    job: &Job,
    position: usize,
    upstream: &Upstream,
) -> Result<(), SqliteStoreError> {
    tx.execute(
        "INSERT INTO job_upstream (project_name, job_name, position, upstream_name, \
         upstream_host, upstream_resource, upstream_project_name, upstream_namespace_name, \
         upstream_task_name, upstream_type, upstream_state, upstream_external) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            job.project_name().as_str(),
            job.name().as_str(),
            position_value(position)?,
            upstream.name,
            upstream.host,
            upstream.resource.as_ref().map(ResourceUrn::as_str),
            upstream.project_name.as_ref().map(ProjectName::as_str),
            upstream.namespace_name.as_str(),
            upstream.task_name,
            upstream.upstream_type.as_str(),
            upstream.state.as_str(),
            upstream.external
        ],
    )
    .map_err(db)?;
    Ok(())
}

/// Runs a query selecting [`JOB_COLUMNS`] and rebuilds each job.
fn query_jobs(
    connection: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Job>, SqliteStoreError> {
    let mut statement = connection.prepare(sql).map_err(db)?;
    let rows = statement.query_map(params, JobRow::read).map_err(db)?;
    let mut jobs = Vec::new();
    for row in rows {
        jobs.push(row.map_err(db)?.into_job()?);
    }
    Ok(jobs)
}

/// Returns true when a secret exists in exactly the tenant scope.
fn secret_exists(
    connection: &Connection,
    tenant: &Tenant,
    name: &SecretName,
) -> Result<bool, SqliteStoreError> {
    let found: Option<i64> = connection
        .query_row(
            "SELECT 1 FROM secret WHERE project_name = ?1 AND namespace_name = ?2 AND name = ?3",
            params![
                tenant.project_name().as_str(),
                tenant.namespace_name().as_str(),
                name.as_str()
            ],
            |row| row.get(0),
        )
        .optional()
        .map_err(db)?;
    Ok(found.is_some())
}

/// Encodes a JSON column value.
fn encode_column<T: Serialize + ?Sized>(value: &T) -> Result<String, SqliteStoreError> {
    serde_json::to_string(value).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}

/// Decodes a JSON column value.
fn decode_column<T: DeserializeOwned>(column: &str, raw: &str) -> Result<T, SqliteStoreError> {
    serde_json::from_str(raw)
        .map_err(|err| SqliteStoreError::Corrupt(format!("invalid {column} column: {err}")))
}

/// Converts a list position into a column value.
fn position_value(position: usize) -> Result<i64, SqliteStoreError> {
    i64::try_from(position).map_err(|_| SqliteStoreError::Invalid("position too large".to_string()))
}

/// Returns the current unix epoch in milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
