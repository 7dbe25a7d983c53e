// jobmesh-core/src/core/spec.rs
// ============================================================================
// Module: Jobmesh Job Specification
// Description: Job spec value types, builders, and validation.
// Purpose: Define the declarative job description and its invariants.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! A [`Spec`] is the immutable, user-authored description of one job
//! revision. Sub-value constructors such as [`JobName::new`] and
//! [`ScheduleDate::new`] reject invalid input with an invalid argument error,
//! and [`SpecBuilder::build`] validates the assembled value.
//!
//! Deserialization is lenient: values read from storage or the wire are
//! accepted as-is and re-checked with [`Spec::validate`] before they are
//! written. Equality is structural; maps are ordered so label or config
//! ordering never affects comparison.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use time::Date;
use time::macros::format_description;

use crate::core::errors::DomainError;
use crate::core::errors::ENTITY_JOB;
use crate::core::errors::MultiError;
use crate::core::tenant::ProjectName;
use crate::core::window::WindowConfig;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Layout accepted for schedule dates.
pub const DATE_LAYOUT: &str = "YYYY-MM-DD";

/// String map used for labels and configs.
pub type StringMap = BTreeMap<String, String>;

// ============================================================================
// SECTION: Scalar Values
// ============================================================================

/// Non-empty job name, unique per project.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobName(String);

impl JobName {
    /// Creates a validated job name.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error when the name is empty.
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::invalid_argument(ENTITY_JOB, "name is empty"));
        }
        Ok(Self(name))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Non-empty job owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Owner(String);

impl Owner {
    /// Creates a validated owner.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error when the owner is empty.
    pub fn new(owner: impl Into<String>) -> Result<Self, DomainError> {
        let owner = owner.into();
        if owner.trim().is_empty() {
            return Err(DomainError::invalid_argument(ENTITY_JOB, "owner is empty"));
        }
        Ok(Self(owner))
    }

    /// Returns the owner as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Positive spec version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u32);

impl Version {
    /// Creates a validated version.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error when the version is zero.
    pub fn new(version: u32) -> Result<Self, DomainError> {
        if version == 0 {
            return Err(DomainError::invalid_argument(
                ENTITY_JOB,
                "version is less than or equal to zero",
            ));
        }
        Ok(Self(version))
    }

    /// Returns the numeric version.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

/// Schedule date in `YYYY-MM-DD` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleDate(String);

impl ScheduleDate {
    /// Creates a validated schedule date.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error when the date cannot be parsed.
    pub fn new(date: impl Into<String>) -> Result<Self, DomainError> {
        let date = Self(date.into());
        date.date()?;
        Ok(date)
    }

    /// Parses the calendar date.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error when the stored text is malformed.
    pub fn date(&self) -> Result<Date, DomainError> {
        Date::parse(&self.0, format_description!("[year]-[month]-[day]")).map_err(|err| {
            DomainError::invalid_argument(
                ENTITY_JOB,
                format!(
                    "error is encountered when validating date with layout [{DATE_LAYOUT}]: {err}"
                ),
            )
        })
    }

    /// Returns the date text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Task plugin name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskName(String);

impl TaskName {
    /// Creates a validated task name.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error when the name is empty.
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::invalid_argument(ENTITY_JOB, "task name is empty"));
        }
        Ok(Self(name))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Schedule
// ============================================================================

/// Retry policy for failed runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Retry {
    /// Retry count.
    pub count: u32,
    /// Delay between retries in nanoseconds.
    pub delay_ns: i64,
    /// Whether the delay grows exponentially.
    pub exponential_backoff: bool,
}

/// Job schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// First schedule date.
    start_date: ScheduleDate,
    /// Optional last schedule date.
    #[serde(default)]
    end_date: Option<ScheduleDate>,
    /// Cron-style interval.
    #[serde(default)]
    interval: String,
    /// Whether a run depends on its previous run.
    #[serde(default)]
    depends_on_past: bool,
    /// Whether missed runs are caught up.
    #[serde(default)]
    catch_up: bool,
    /// Optional retry policy.
    #[serde(default)]
    retry: Option<Retry>,
}

impl Schedule {
    /// Returns the start date.
    #[must_use]
    pub const fn start_date(&self) -> &ScheduleDate {
        &self.start_date
    }

    /// Returns the end date.
    #[must_use]
    pub const fn end_date(&self) -> Option<&ScheduleDate> {
        self.end_date.as_ref()
    }

    /// Returns the interval.
    #[must_use]
    pub fn interval(&self) -> &str {
        &self.interval
    }

    /// Returns the depends-on-past flag.
    #[must_use]
    pub const fn depends_on_past(&self) -> bool {
        self.depends_on_past
    }

    /// Returns the catch-up flag.
    #[must_use]
    pub const fn catch_up(&self) -> bool {
        self.catch_up
    }

    /// Returns the retry policy.
    #[must_use]
    pub const fn retry(&self) -> Option<&Retry> {
        self.retry.as_ref()
    }

    /// Validates date invariants.
    fn validate(&self, errors: &mut MultiError) {
        let start = errors.append_result(self.start_date.date());
        if let Some(end_date) = &self.end_date
            && let Some(end) = errors.append_result(end_date.date())
            && let Some(start) = start
            && end < start
        {
            errors.append(DomainError::invalid_argument(
                ENTITY_JOB,
                format!(
                    "end date {} is before start date {}",
                    end_date.as_str(),
                    self.start_date.as_str()
                ),
            ));
        }
    }
}

/// Incremental schedule construction.
#[derive(Debug, Clone)]
pub struct ScheduleBuilder {
    /// Schedule under construction.
    schedule: Schedule,
}

impl ScheduleBuilder {
    /// Starts a schedule with a start date.
    #[must_use]
    pub fn new(start_date: ScheduleDate) -> Self {
        Self {
            schedule: Schedule {
                start_date,
                end_date: None,
                interval: String::new(),
                depends_on_past: false,
                catch_up: false,
                retry: None,
            },
        }
    }

    /// Sets the end date.
    #[must_use]
    pub fn with_end_date(mut self, end_date: ScheduleDate) -> Self {
        self.schedule.end_date = Some(end_date);
        self
    }

    /// Sets the interval.
    #[must_use]
    pub fn with_interval(mut self, interval: impl Into<String>) -> Self {
        self.schedule.interval = interval.into();
        self
    }

    /// Sets the depends-on-past flag.
    #[must_use]
    pub const fn with_depends_on_past(mut self, depends_on_past: bool) -> Self {
        self.schedule.depends_on_past = depends_on_past;
        self
    }

    /// Sets the catch-up flag.
    #[must_use]
    pub const fn with_catch_up(mut self, catch_up: bool) -> Self {
        self.schedule.catch_up = catch_up;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: Retry) -> Self {
        self.schedule.retry = Some(retry);
        self
    }

    /// Builds the schedule.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error when the end date precedes the start
    /// date.
    pub fn build(self) -> Result<Schedule, DomainError> {
        let mut errors = MultiError::new("errors on schedule");
        self.schedule.validate(&mut errors);
        errors.into_result().map_err(DomainError::from)?;
        Ok(self.schedule)
    }
}

// ============================================================================
// SECTION: Task, Hooks, Alerts
// ============================================================================

/// Primary computation of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Plugin name.
    pub name: TaskName,
    /// Task configuration.
    #[serde(default)]
    pub config: StringMap,
}

impl Task {
    /// Creates a task.
    #[must_use]
    pub const fn new(name: TaskName, config: StringMap) -> Self {
        Self { name, config }
    }
}

/// Adjunct plugin run around the task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hook {
    /// Hook plugin name.
    pub name: String,
    /// Hook configuration.
    #[serde(default)]
    pub config: StringMap,
}

impl Hook {
    /// Creates a validated hook.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error when the name is empty.
    pub fn new(name: impl Into<String>, config: StringMap) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::invalid_argument(ENTITY_JOB, "hook name is empty"));
        }
        Ok(Self { name, config })
    }
}

/// Alert trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    /// SLA missed.
    SlaMiss,
    /// Job failure.
    Failure,
    /// Job started.
    JobStart,
    /// Job failed.
    JobFail,
    /// Job succeeded.
    JobSuccess,
    /// Run retried.
    Retry,
    /// Task started.
    TaskStart,
    /// Task retried.
    TaskRetry,
    /// Task failed.
    TaskFail,
    /// Task succeeded.
    TaskSuccess,
    /// Hook started.
    HookStart,
    /// Hook retried.
    HookRetry,
    /// Hook failed.
    HookFail,
    /// Hook succeeded.
    HookSuccess,
    /// Sensor started.
    SensorStart,
    /// Sensor retried.
    SensorRetry,
    /// Sensor failed.
    SensorFail,
    /// Sensor succeeded.
    SensorSuccess,
    /// Unrecognized persisted value.
    Unknown,
}

impl EventType {
    /// All recognized event types.
    pub const ALL: [Self; 18] = [
        Self::SlaMiss,
        Self::Failure,
        Self::JobStart,
        Self::JobFail,
        Self::JobSuccess,
        Self::Retry,
        Self::TaskStart,
        Self::TaskRetry,
        Self::TaskFail,
        Self::TaskSuccess,
        Self::HookStart,
        Self::HookRetry,
        Self::HookFail,
        Self::HookSuccess,
        Self::SensorStart,
        Self::SensorRetry,
        Self::SensorFail,
        Self::SensorSuccess,
    ];

    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SlaMiss => "sla_miss",
            Self::Failure => "failure",
            Self::JobStart => "job_start",
            Self::JobFail => "job_fail",
            Self::JobSuccess => "job_success",
            Self::Retry => "retry",
            Self::TaskStart => "task_start",
            Self::TaskRetry => "task_retry",
            Self::TaskFail => "task_fail",
            Self::TaskSuccess => "task_success",
            Self::HookStart => "hook_start",
            Self::HookRetry => "hook_retry",
            Self::HookFail => "hook_fail",
            Self::HookSuccess => "hook_success",
            Self::SensorStart => "sensor_start",
            Self::SensorRetry => "sensor_retry",
            Self::SensorFail => "sensor_fail",
            Self::SensorSuccess => "sensor_success",
            Self::Unknown => "unknown",
        }
    }

    /// Parses persisted state; unknown labels map to [`EventType::Unknown`].
    #[must_use]
    pub fn parse_lenient(value: &str) -> Self {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|kind| kind.as_str() == normalized).unwrap_or(Self::Unknown)
    }

    /// Parses external input.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error for unknown labels.
    pub fn parse_strict(value: &str) -> Result<Self, DomainError> {
        match Self::parse_lenient(value) {
            Self::Unknown => Err(DomainError::invalid_argument(
                ENTITY_JOB,
                format!("unknown alert event type {value}"),
            )),
            kind => Ok(kind),
        }
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        Self::parse_lenient(&value)
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.as_str().to_string()
    }
}

/// Alert channel binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Triggering event.
    pub on: EventType,
    /// Notification channels.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Alert configuration.
    #[serde(default)]
    pub config: StringMap,
}

impl Alert {
    /// Creates an alert.
    #[must_use]
    pub const fn new(on: EventType, channels: Vec<String>, config: StringMap) -> Self {
        Self {
            on,
            channels,
            config,
        }
    }
}

// ============================================================================
// SECTION: Upstream Declarations
// ============================================================================

/// Declared static upstream: `job` or `project/job`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecUpstreamName(String);

impl SpecUpstreamName {
    /// Creates a validated upstream name.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error when either part is empty.
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = Self(name.into());
        name.parts()?;
        Ok(name)
    }

    /// Splits into optional project and job name.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error for malformed names.
    pub fn parts(&self) -> Result<(Option<ProjectName>, JobName), DomainError> {
        let malformed = || {
            DomainError::invalid_argument(
                ENTITY_JOB,
                format!("upstream name \"{}\" is malformed", self.0),
            )
        };
        match self.0.split_once('/') {
            None => Ok((None, JobName::new(self.0.as_str()).map_err(|_| malformed())?)),
            Some((project, job)) => {
                if job.contains('/') {
                    return Err(malformed());
                }
                let project = ProjectName::new(project).map_err(|_| malformed())?;
                let job = JobName::new(job).map_err(|_| malformed())?;
                Ok((Some(project), job))
            }
        }
    }

    /// Returns true when the name carries a project prefix.
    #[must_use]
    pub fn has_project(&self) -> bool {
        self.0.contains('/')
    }

    /// Returns the declared text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpecUpstreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// HTTP sensor upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpUpstream {
    /// Upstream name.
    pub name: String,
    /// Target URL.
    pub url: String,
    /// Request headers.
    #[serde(default)]
    pub headers: StringMap,
    /// Query parameters.
    #[serde(default)]
    pub params: StringMap,
}

/// Upstream declarations of a spec.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpecUpstream {
    /// Static upstream names.
    #[serde(default)]
    pub upstream_names: Vec<SpecUpstreamName>,
    /// HTTP upstreams.
    #[serde(default)]
    pub http_upstreams: Vec<HttpUpstream>,
}

// ============================================================================
// SECTION: Metadata
// ============================================================================

/// CPU and memory quantities.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// CPU quantity.
    #[serde(default)]
    pub cpu: String,
    /// Memory quantity.
    #[serde(default)]
    pub memory: String,
}

/// Request and limit resource pair.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceMetadata {
    /// Requested resources.
    #[serde(default)]
    pub request: Option<ResourceConfig>,
    /// Resource limits.
    #[serde(default)]
    pub limit: Option<ResourceConfig>,
}

/// Job metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Optional resource pair.
    #[serde(default)]
    pub resource: Option<ResourceMetadata>,
    /// Scheduler-specific settings.
    #[serde(default)]
    pub scheduler: StringMap,
}

// ============================================================================
// SECTION: Spec
// ============================================================================

/// Immutable job specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spec {
    /// Spec version.
    version: Version,
    /// Job name.
    name: JobName,
    /// Job owner.
    owner: Owner,
    /// Free-form description.
    #[serde(default)]
    description: String,
    /// Labels.
    #[serde(default)]
    labels: StringMap,
    /// Schedule.
    schedule: Schedule,
    /// Execution window.
    window: WindowConfig,
    /// Task.
    task: Task,
    /// Hooks in execution order.
    #[serde(default)]
    hooks: Vec<Hook>,
    /// Alerts.
    #[serde(default)]
    alerts: Vec<Alert>,
    /// Upstream declarations.
    #[serde(default)]
    upstream: SpecUpstream,
    /// Assets keyed by template name.
    #[serde(default)]
    assets: StringMap,
    /// Metadata.
    #[serde(default)]
    metadata: Option<Metadata>,
}

impl Spec {
    /// Returns the version.
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Returns the job name.
    #[must_use]
    pub const fn name(&self) -> &JobName {
        &self.name
    }

    /// Returns the owner.
    #[must_use]
    pub const fn owner(&self) -> &Owner {
        &self.owner
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the labels.
    #[must_use]
    pub const fn labels(&self) -> &StringMap {
        &self.labels
    }

    /// Returns the schedule.
    #[must_use]
    pub const fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Returns the window config.
    #[must_use]
    pub const fn window(&self) -> &WindowConfig {
        &self.window
    }

    /// Returns the task.
    #[must_use]
    pub const fn task(&self) -> &Task {
        &self.task
    }

    /// Returns the hooks.
    #[must_use]
    pub fn hooks(&self) -> &[Hook] {
        &self.hooks
    }

    /// Returns the alerts.
    #[must_use]
    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    /// Returns the upstream declarations.
    #[must_use]
    pub const fn upstream(&self) -> &SpecUpstream {
        &self.upstream
    }

    /// Returns the assets.
    #[must_use]
    pub const fn assets(&self) -> &StringMap {
        &self.assets
    }

    /// Returns the metadata.
    #[must_use]
    pub const fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    /// Checks every invariant; used for values that bypassed the builder.
    ///
    /// # Errors
    ///
    /// Returns every violated invariant as a [`MultiError`].
    pub fn validate(&self) -> Result<(), MultiError> {
        let mut errors = MultiError::new(format!("errors on spec {}", self.name));
        errors.append_result(Version::new(self.version.get()));
        errors.append_result(JobName::new(self.name.as_str()));
        errors.append_result(Owner::new(self.owner.as_str()));
        self.schedule.validate(&mut errors);
        errors.append_result(self.window.for_version(self.version.get()));
        errors.append_result(TaskName::new(self.task.name.as_str()));
        validate_map("label", &self.labels, &mut errors);
        for hook in &self.hooks {
            if hook.name.trim().is_empty() {
                errors.append(DomainError::invalid_argument(ENTITY_JOB, "hook name is empty"));
            }
        }
        for alert in &self.alerts {
            if alert.on == EventType::Unknown {
                errors.append(DomainError::invalid_argument(
                    ENTITY_JOB,
                    "alert config is invalid: unknown event type",
                ));
            }
            validate_map("alert config", &alert.config, &mut errors);
        }
        for name in &self.upstream.upstream_names {
            errors.append_result(name.parts());
        }
        for http in &self.upstream.http_upstreams {
            if http.name.trim().is_empty() || http.url.trim().is_empty() {
                errors.append(DomainError::invalid_argument(
                    ENTITY_JOB,
                    "upstream config is invalid: http upstream requires name and url",
                ));
            }
        }
        if self.assets.keys().any(|key| key.trim().is_empty()) {
            errors.append(DomainError::invalid_argument(
                ENTITY_JOB,
                "asset is invalid: asset key is empty",
            ));
        }
        if let Some(metadata) = &self.metadata {
            validate_map("metadata scheduler", &metadata.scheduler, &mut errors);
        }
        errors.into_result()
    }
}

/// Incremental spec construction with validation on build.
#[derive(Debug, Clone)]
pub struct SpecBuilder {
    /// Spec under construction.
    spec: Spec,
}

impl SpecBuilder {
    /// Starts a spec from its mandatory parts.
    #[must_use]
    pub fn new(
        version: Version,
        name: JobName,
        owner: Owner,
        schedule: Schedule,
        window: WindowConfig,
        task: Task,
    ) -> Self {
        Self {
            spec: Spec {
                version,
                name,
                owner,
                description: String::new(),
                labels: StringMap::new(),
                schedule,
                window,
                task,
                hooks: Vec::new(),
                alerts: Vec::new(),
                upstream: SpecUpstream::default(),
                assets: StringMap::new(),
                metadata: None,
            },
        }
    }

    /// Starts from an existing spec.
    #[must_use]
    pub const fn from_spec(spec: Spec) -> Self {
        Self { spec }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.spec.description = description.into();
        self
    }

    /// Sets the labels.
    #[must_use]
    pub fn with_labels(mut self, labels: StringMap) -> Self {
        self.spec.labels = labels;
        self
    }

    /// Sets the hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Vec<Hook>) -> Self {
        self.spec.hooks = hooks;
        self
    }

    /// Sets the alerts.
    #[must_use]
    pub fn with_alerts(mut self, alerts: Vec<Alert>) -> Self {
        self.spec.alerts = alerts;
        self
    }

    /// Sets the upstream declarations.
    #[must_use]
    pub fn with_upstream(mut self, upstream: SpecUpstream) -> Self {
        self.spec.upstream = upstream;
        self
    }

    /// Sets the assets.
    #[must_use]
    pub fn with_assets(mut self, assets: StringMap) -> Self {
        self.spec.assets = assets;
        self
    }

    /// Sets the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.spec.metadata = Some(metadata);
        self
    }

    /// Validates and returns the spec.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error summarizing every violation.
    pub fn build(self) -> Result<Spec, DomainError> {
        self.spec.validate().map_err(DomainError::from)?;
        Ok(self.spec)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Rejects empty keys and empty values in a string map.
fn validate_map(label: &str, input: &StringMap, errors: &mut MultiError) {
    if input.keys().any(String::is_empty) {
        errors.append(DomainError::invalid_argument(
            ENTITY_JOB,
            format!("{label} is invalid: map contains empty key"),
        ));
    }
    let empty_values: Vec<&str> = input
        .iter()
        .filter(|(key, value)| !key.is_empty() && value.is_empty())
        .map(|(key, _)| key.as_str())
        .collect();
    if !empty_values.is_empty() {
        errors.append(DomainError::invalid_argument(
            ENTITY_JOB,
            format!("{label} is invalid: keys [{}] are empty", empty_values.join(", ")),
        ));
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::use_debug,
        reason = "Test assertions use unwrap/expect for clarity."
    )]

    use super::*;

    fn sample_builder() -> SpecBuilder {
        let schedule = ScheduleBuilder::new(ScheduleDate::new("2022-10-01").unwrap())
            .with_interval("0 2 * * *")
            .build()
            .unwrap();
        SpecBuilder::new(
            Version::new(1).unwrap(),
            JobName::new("job-a").unwrap(),
            Owner::new("data-eng").unwrap(),
            schedule,
            WindowConfig::new("24h", "0", "d"),
            Task::new(TaskName::new("bq2bq").unwrap(), StringMap::new()),
        )
    }

    #[test]
    fn scalar_constructors_reject_empty() {
        assert!(JobName::new("").is_err());
        assert!(Owner::new(" ").is_err());
        assert!(TaskName::new("").is_err());
        assert!(Version::new(0).is_err());
        assert!(ScheduleDate::new("2022/10/01").is_err());
    }

    #[test]
    fn end_date_before_start_is_rejected() {
        let err = ScheduleBuilder::new(ScheduleDate::new("2022-10-02").unwrap())
            .with_end_date(ScheduleDate::new("2022-10-01").unwrap())
            .build()
            .unwrap_err();
        assert!(err.message.contains("before start date"));
    }

    #[test]
    fn upstream_name_parts() {
        let bare = SpecUpstreamName::new("job-x").unwrap();
        assert_eq!(bare.parts().unwrap().0, None);
        let qualified = SpecUpstreamName::new("proj2/job-x").unwrap();
        let (project, job) = qualified.parts().unwrap();
        assert_eq!(project.unwrap().as_str(), "proj2");
        assert_eq!(job.as_str(), "job-x");
        assert!(SpecUpstreamName::new("proj2/").is_err());
        assert!(SpecUpstreamName::new("/job").is_err());
        assert!(SpecUpstreamName::new("a/b/c").is_err());
    }

    #[test]
    fn builder_rejects_empty_label_value() {
        let labels = StringMap::from([("team".to_string(), String::new())]);
        let err = sample_builder().with_labels(labels).build().unwrap_err();
        assert!(err.message.contains("keys [team] are empty"));
    }

    #[test]
    fn builder_rejects_invalid_window_for_version() {
        let schedule =
            ScheduleBuilder::new(ScheduleDate::new("2022-10-01").unwrap()).build().unwrap();
        let result = SpecBuilder::new(
            Version::new(1).unwrap(),
            JobName::new("job-a").unwrap(),
            Owner::new("owner").unwrap(),
            schedule,
            WindowConfig::new("24h", "0", ""),
            Task::new(TaskName::new("bq2bq").unwrap(), StringMap::new()),
        )
        .build();
        assert!(result.is_err());
    }

    #[test]
    fn event_type_parse_is_total() {
        assert_eq!(EventType::parse_lenient("SLA_MISS"), EventType::SlaMiss);
        assert_eq!(EventType::parse_lenient("bogus"), EventType::Unknown);
        assert!(EventType::parse_strict("bogus").is_err());
        for kind in EventType::ALL {
            assert_eq!(EventType::parse_strict(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn lenient_deserialization_is_caught_by_validate() {
        let spec = sample_builder().build().unwrap();
        let mut value = serde_json::to_value(&spec).unwrap();
        value["owner"] = serde_json::json!("");
        let decoded: Spec = serde_json::from_value(value).unwrap();
        let err = decoded.validate().unwrap_err();
        assert_eq!(err.errors()[0].message, "owner is empty");
    }

    #[test]
    fn equality_ignores_map_insertion_order() {
        let mut first = StringMap::new();
        first.insert("a".to_string(), "1".to_string());
        first.insert("b".to_string(), "2".to_string());
        let mut second = StringMap::new();
        second.insert("b".to_string(), "2".to_string());
        second.insert("a".to_string(), "1".to_string());
        let left = sample_builder().with_labels(first).build().unwrap();
        let right = sample_builder().with_labels(second).build().unwrap();
        assert_eq!(left, right);
    }
}
