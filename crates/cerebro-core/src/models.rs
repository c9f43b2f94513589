//! Core data models for the capture pipeline.
//!
//! These types are shared across all cerebro crates and represent the
//! captured input, the model's classification, the ledger that records every
//! decision, and the destination records filed from it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use crate::defaults;
use crate::error::{Error, Result};
use crate::uuid_utils::new_v7;

/// Deserialize `null` (or a missing field, with `#[serde(default)]`) as `T::default()`.
fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept `YYYY-MM-DD`, an RFC 3339 timestamp (date part kept), empty or null.
/// Anything else is an error, which fails the whole classification parse.
fn iso_date<'de, D>(deserializer: D) -> std::result::Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(Some(date));
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(Some(ts.date_naive()));
    }
    Err(serde::de::Error::custom(format!(
        "due_date is not an ISO date: {}",
        trimmed
    )))
}

/// Trimmed copy of `s`, or `None` when nothing remains.
fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// =============================================================================
// CATEGORY
// =============================================================================

/// The four destinations a capture can be filed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Person,
    Project,
    Idea,
    Task,
}

impl Category {
    /// All categories, in prompt order.
    pub const ALL: [Category; 4] = [
        Category::Person,
        Category::Project,
        Category::Idea,
        Category::Task,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Person => "person",
            Category::Project => "project",
            Category::Idea => "idea",
            Category::Task => "task",
        }
    }

    /// Destination table holding records of this category.
    pub fn table(&self) -> &'static str {
        match self {
            Category::Person => "people",
            Category::Project => "projects",
            Category::Idea => "ideas",
            Category::Task => "tasks",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "person" => Ok(Self::Person),
            "project" => Ok(Self::Project),
            "idea" => Ok(Self::Idea),
            "task" => Ok(Self::Task),
            _ => Err(format!("Invalid category: {}", s)),
        }
    }
}

// =============================================================================
// CAPTURE TYPES
// =============================================================================

/// Where a capture came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureSource {
    Voice,
    Text,
    Import,
    Email,
    Slack,
}

impl CaptureSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureSource::Voice => "voice",
            CaptureSource::Text => "text",
            CaptureSource::Import => "import",
            CaptureSource::Email => "email",
            CaptureSource::Slack => "slack",
        }
    }
}

impl std::fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CaptureSource {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "voice" => Ok(Self::Voice),
            "text" => Ok(Self::Text),
            "import" => Ok(Self::Import),
            "email" => Ok(Self::Email),
            "slack" => Ok(Self::Slack),
            _ => Err(format!("Invalid capture source: {}", s)),
        }
    }
}

/// A single piece of raw input awaiting (or done with) classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capture {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub raw_text: String,
    pub source: CaptureSource,
    pub audio_url: Option<String>,
    pub processed: bool,
    pub processing_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request for creating a new capture.
#[derive(Debug, Clone)]
pub struct CreateCaptureRequest {
    pub owner_id: Uuid,
    pub raw_text: String,
    pub source: CaptureSource,
    pub audio_url: Option<String>,
}

impl CreateCaptureRequest {
    /// Reject empty text and text longer than the ingestion cap.
    pub fn validate(&self) -> Result<()> {
        if self.raw_text.trim().is_empty() {
            return Err(Error::InvalidInput("raw_text must not be empty".into()));
        }
        let chars = self.raw_text.chars().count();
        if chars > defaults::CAPTURE_MAX_CHARS {
            return Err(Error::InvalidInput(format!(
                "raw_text is {} characters; the limit is {}",
                chars,
                defaults::CAPTURE_MAX_CHARS
            )));
        }
        Ok(())
    }
}

/// A capture together with the job that will classify it.
///
/// Returned only once both rows are durable, so callers can treat it as the
/// acknowledgement that classification has been scheduled.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledCapture {
    pub capture: Capture,
    pub job_id: Uuid,
}

// =============================================================================
// EXTRACTED FIELDS
// =============================================================================

/// Status of a filed project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Active,
    Waiting,
    Blocked,
    Someday,
    Done,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Waiting => "waiting",
            ProjectStatus::Blocked => "blocked",
            ProjectStatus::Someday => "someday",
            ProjectStatus::Done => "done",
        }
    }
}

impl std::str::FromStr for ProjectStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "waiting" => Ok(Self::Waiting),
            "blocked" => Ok(Self::Blocked),
            "someday" => Ok(Self::Someday),
            "done" => Ok(Self::Done),
            _ => Err(format!("Invalid project status: {}", s)),
        }
    }
}

/// Status of a filed task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            _ => Err(format!("Invalid task status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonFields {
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    /// Relationship or how the owner knows them.
    #[serde(default, deserialize_with = "nullable")]
    pub context: String,
    #[serde(default, deserialize_with = "nullable")]
    pub follow_ups: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectFields {
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub status: ProjectStatus,
    #[serde(default, deserialize_with = "nullable")]
    pub next_action: String,
    #[serde(default, deserialize_with = "nullable")]
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdeaFields {
    #[serde(default, deserialize_with = "nullable")]
    pub title: String,
    #[serde(default, deserialize_with = "nullable")]
    pub one_liner: String,
    #[serde(default, deserialize_with = "nullable")]
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskFields {
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "iso_date")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "nullable")]
    pub notes: String,
}

/// Structured fields extracted for one category.
///
/// The variant *is* the category: a result can never carry fields of one
/// shape under another category's name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExtractedFields {
    Person(PersonFields),
    Project(ProjectFields),
    Idea(IdeaFields),
    Task(TaskFields),
}

impl ExtractedFields {
    pub fn category(&self) -> Category {
        match self {
            ExtractedFields::Person(_) => Category::Person,
            ExtractedFields::Project(_) => Category::Project,
            ExtractedFields::Idea(_) => Category::Idea,
            ExtractedFields::Task(_) => Category::Task,
        }
    }

    /// Decode `value` as the field shape of `category`.
    ///
    /// Fails when `value` is not a JSON object or a field has the wrong type.
    /// Missing or null optional fields take their defaults; mandatory fields
    /// are checked separately by [`validate`](Self::validate).
    pub fn from_value(
        category: Category,
        value: &JsonValue,
    ) -> std::result::Result<Self, String> {
        if !value.is_object() {
            return Err(format!(
                "extracted fields for {} must be a JSON object",
                category
            ));
        }
        let shape_err = |e: serde_json::Error| format!("invalid {} fields: {}", category, e);
        let fields = match category {
            Category::Person => ExtractedFields::Person(
                serde_json::from_value(value.clone()).map_err(shape_err)?,
            ),
            Category::Project => ExtractedFields::Project(
                serde_json::from_value(value.clone()).map_err(shape_err)?,
            ),
            Category::Idea => {
                ExtractedFields::Idea(serde_json::from_value(value.clone()).map_err(shape_err)?)
            }
            Category::Task => {
                ExtractedFields::Task(serde_json::from_value(value.clone()).map_err(shape_err)?)
            }
        };
        Ok(fields.trimmed())
    }

    /// Check the attributes each category requires.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let (field, value) = match self {
            ExtractedFields::Person(p) => ("person.name", &p.name),
            ExtractedFields::Project(p) => ("project.name", &p.name),
            ExtractedFields::Idea(i) => ("idea.title", &i.title),
            ExtractedFields::Task(t) => ("task.name", &t.name),
        };
        if value.trim().is_empty() {
            return Err(format!("{} is required", field));
        }
        Ok(())
    }

    /// JSON form stored in the ledger's `extracted_fields` column.
    pub fn to_value(&self) -> JsonValue {
        match self {
            ExtractedFields::Person(p) => json!({
                "name": p.name,
                "context": p.context,
                "follow_ups": p.follow_ups,
            }),
            ExtractedFields::Project(p) => json!({
                "name": p.name,
                "status": p.status.as_str(),
                "next_action": p.next_action,
                "notes": p.notes,
            }),
            ExtractedFields::Idea(i) => json!({
                "title": i.title,
                "one_liner": i.one_liner,
                "notes": i.notes,
            }),
            ExtractedFields::Task(t) => json!({
                "name": t.name,
                "due_date": t.due_date.map(|d| d.format("%Y-%m-%d").to_string()),
                "notes": t.notes,
            }),
        }
    }

    /// The name or title identifying the record.
    pub fn primary_label(&self) -> &str {
        match self {
            ExtractedFields::Person(p) => &p.name,
            ExtractedFields::Project(p) => &p.name,
            ExtractedFields::Idea(i) => &i.title,
            ExtractedFields::Task(t) => &t.name,
        }
    }

    /// Free-form notes (a person's context counts as notes).
    pub fn notes(&self) -> &str {
        match self {
            ExtractedFields::Person(p) => &p.context,
            ExtractedFields::Project(p) => &p.notes,
            ExtractedFields::Idea(i) if i.notes.is_empty() => &i.one_liner,
            ExtractedFields::Idea(i) => &i.notes,
            ExtractedFields::Task(t) => &t.notes,
        }
    }

    /// Re-shape these fields for another category, carrying the primary
    /// label and notes across. Same-category conversion is a clone.
    pub fn convert_to(&self, target: Category) -> ExtractedFields {
        if self.category() == target {
            return self.clone();
        }
        Self::build(target, self.primary_label(), self.notes())
    }

    /// Minimal fields for `category` seeded from raw capture text.
    ///
    /// The first line becomes the label (truncated); the full text is kept
    /// as notes when the label had to be shortened.
    pub fn seed(category: Category, raw_text: &str) -> ExtractedFields {
        let trimmed = raw_text.trim();
        let first_line = trimmed.lines().next().unwrap_or_default().trim();
        let label: String = first_line
            .chars()
            .take(defaults::SEEDED_LABEL_MAX_CHARS)
            .collect();
        let notes = if label == trimmed { "" } else { trimmed };
        Self::build(category, &label, notes)
    }

    fn build(category: Category, label: &str, notes: &str) -> ExtractedFields {
        let label = label.trim().to_string();
        let notes = notes.trim().to_string();
        match category {
            Category::Person => ExtractedFields::Person(PersonFields {
                name: label,
                context: notes,
                follow_ups: Vec::new(),
            }),
            Category::Project => ExtractedFields::Project(ProjectFields {
                name: label,
                notes,
                ..Default::default()
            }),
            Category::Idea => ExtractedFields::Idea(IdeaFields {
                title: label,
                notes,
                ..Default::default()
            }),
            Category::Task => ExtractedFields::Task(TaskFields {
                name: label,
                due_date: None,
                notes,
            }),
        }
    }

    fn trimmed(self) -> Self {
        match self {
            ExtractedFields::Person(mut p) => {
                p.name = p.name.trim().to_string();
                p.follow_ups.retain(|f| !f.trim().is_empty());
                ExtractedFields::Person(p)
            }
            ExtractedFields::Project(mut p) => {
                p.name = p.name.trim().to_string();
                ExtractedFields::Project(p)
            }
            ExtractedFields::Idea(mut i) => {
                i.title = i.title.trim().to_string();
                ExtractedFields::Idea(i)
            }
            ExtractedFields::Task(mut t) => {
                t.name = t.name.trim().to_string();
                ExtractedFields::Task(t)
            }
        }
    }
}

// =============================================================================
// CLASSIFICATION RESULT (TRANSIENT)
// =============================================================================

/// Parsed, validated model output for one capture.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    /// Confidence after clamping into [0, 1].
    pub confidence: f64,
    pub extracted: ExtractedFields,
    /// Raw message content returned by the model.
    pub raw_response: String,
    /// Model that produced the response.
    pub model: Option<String>,
}

impl ClassificationResult {
    pub fn category(&self) -> Category {
        self.extracted.category()
    }
}

/// Why a classification attempt produced no usable result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationErrorKind {
    /// Response was not JSON or did not match the expected shape.
    ParseFailure,
    /// Shape was right but a category-mandated attribute is missing.
    ValidationFailure,
    /// Transport, timeout, 5xx, rate limit or auth failure at the provider.
    ProviderFailure,
}

impl std::fmt::Display for ClassificationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ClassificationErrorKind::ParseFailure => "parse_failure",
            ClassificationErrorKind::ValidationFailure => "validation_failure",
            ClassificationErrorKind::ProviderFailure => "provider_failure",
        };
        write!(f, "{}", s)
    }
}

/// A failed classification attempt, kept for the ledger rather than thrown.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ClassificationError {
    pub kind: ClassificationErrorKind,
    pub message: String,
    /// Model output, when one was received.
    pub raw_response: Option<String>,
    pub model: Option<String>,
}

impl ClassificationError {
    pub fn parse_failure(message: impl Into<String>, raw_response: impl Into<String>) -> Self {
        Self {
            kind: ClassificationErrorKind::ParseFailure,
            message: message.into(),
            raw_response: Some(raw_response.into()),
            model: None,
        }
    }

    pub fn validation_failure(message: impl Into<String>, raw_response: impl Into<String>) -> Self {
        Self {
            kind: ClassificationErrorKind::ValidationFailure,
            message: message.into(),
            raw_response: Some(raw_response.into()),
            model: None,
        }
    }

    pub fn provider_failure(message: impl Into<String>) -> Self {
        Self {
            kind: ClassificationErrorKind::ProviderFailure,
            message: message.into(),
            raw_response: None,
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Human-readable text for the capture's `processing_error`.
    pub fn summary(&self) -> String {
        match self.kind {
            ClassificationErrorKind::ParseFailure => {
                format!("Failed to parse classification: {}", self.message)
            }
            ClassificationErrorKind::ValidationFailure => {
                format!("Classification missing required fields: {}", self.message)
            }
            ClassificationErrorKind::ProviderFailure => {
                format!("Classification provider failed: {}", self.message)
            }
        }
    }
}

// =============================================================================
// CLASSIFICATION LEDGER
// =============================================================================

/// Lifecycle state of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationStatus {
    Pending,
    AutoFiled,
    NeedsReview,
    ManuallyFiled,
    ManuallyCorrected,
}

impl ClassificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationStatus::Pending => "pending",
            ClassificationStatus::AutoFiled => "auto_filed",
            ClassificationStatus::NeedsReview => "needs_review",
            ClassificationStatus::ManuallyFiled => "manually_filed",
            ClassificationStatus::ManuallyCorrected => "manually_corrected",
        }
    }

    /// Whether entries in this status must point at a destination record.
    pub fn requires_destination(&self) -> bool {
        matches!(
            self,
            ClassificationStatus::AutoFiled
                | ClassificationStatus::ManuallyFiled
                | ClassificationStatus::ManuallyCorrected
        )
    }
}

impl std::fmt::Display for ClassificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ClassificationStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "auto_filed" => Ok(Self::AutoFiled),
            "needs_review" => Ok(Self::NeedsReview),
            "manually_filed" => Ok(Self::ManuallyFiled),
            "manually_corrected" => Ok(Self::ManuallyCorrected),
            _ => Err(format!("Invalid classification status: {}", s)),
        }
    }
}

/// Permanent record of one classification decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub id: Uuid,
    pub capture_id: Uuid,
    pub owner_id: Uuid,
    pub category: Category,
    pub confidence: f64,
    pub extracted_fields: JsonValue,
    pub raw_llm_response: Option<String>,
    pub model: Option<String>,
    pub destination_id: Option<Uuid>,
    pub status: ClassificationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Classification {
    /// Decode the stored fields under the entry's category.
    pub fn extracted(&self) -> std::result::Result<ExtractedFields, String> {
        ExtractedFields::from_value(self.category, &self.extracted_fields)
    }
}

/// A `needs_review` entry joined with its capture, for the review queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewQueueItem {
    #[serde(flatten)]
    pub classification: Classification,
    pub raw_text: String,
    pub source: CaptureSource,
    pub capture_created_at: DateTime<Utc>,
}

/// How a reviewer resolved an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMode {
    /// The model's category was right.
    Confirm,
    /// The reviewer chose the category.
    Override,
}

impl ResolutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionMode::Confirm => "confirm",
            ResolutionMode::Override => "override",
        }
    }
}

impl std::str::FromStr for ResolutionMode {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "confirm" => Ok(Self::Confirm),
            "override" => Ok(Self::Override),
            _ => Err(format!("Invalid resolution mode: {}", s)),
        }
    }
}

/// Audit row appended for every human resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionRecord {
    pub id: Uuid,
    pub classification_id: Uuid,
    pub owner_id: Uuid,
    pub mode: ResolutionMode,
    pub previous_category: Category,
    pub previous_extracted_fields: JsonValue,
    pub previous_destination_id: Option<Uuid>,
    pub new_category: Category,
    pub new_extracted_fields: JsonValue,
    pub new_destination_id: Uuid,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// DESTINATION RECORDS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub context: Option<String>,
    pub follow_ups: Vec<String>,
    pub last_touched: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub status: ProjectStatus,
    pub next_action: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Idea {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub one_liner: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub due_date: Option<NaiveDate>,
    pub status: TaskStatus,
    pub notes: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A filed, user-facing entity in one of the four category tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum DestinationRecord {
    Person(Person),
    Project(Project),
    Idea(Idea),
    Task(Task),
}

impl DestinationRecord {
    /// Build a new record from extracted fields, applying category defaults:
    /// empty optional text becomes `None`, tasks start `pending`, people are
    /// touched now.
    pub fn from_fields(owner_id: Uuid, fields: &ExtractedFields, now: DateTime<Utc>) -> Self {
        let id = new_v7();
        match fields {
            ExtractedFields::Person(p) => DestinationRecord::Person(Person {
                id,
                owner_id,
                name: p.name.trim().to_string(),
                context: non_empty(&p.context),
                follow_ups: p.follow_ups.clone(),
                last_touched: now,
                created_at: now,
                updated_at: now,
            }),
            ExtractedFields::Project(p) => DestinationRecord::Project(Project {
                id,
                owner_id,
                name: p.name.trim().to_string(),
                status: p.status,
                next_action: non_empty(&p.next_action),
                notes: non_empty(&p.notes),
                created_at: now,
                updated_at: now,
            }),
            ExtractedFields::Idea(i) => DestinationRecord::Idea(Idea {
                id,
                owner_id,
                title: i.title.trim().to_string(),
                one_liner: non_empty(&i.one_liner),
                notes: non_empty(&i.notes),
                created_at: now,
                updated_at: now,
            }),
            ExtractedFields::Task(t) => DestinationRecord::Task(Task {
                id,
                owner_id,
                name: t.name.trim().to_string(),
                due_date: t.due_date,
                status: TaskStatus::Pending,
                notes: non_empty(&t.notes),
                completed_at: None,
                created_at: now,
                updated_at: now,
            }),
        }
    }

    /// Overwrite the extracted attributes in place, keeping identity,
    /// timestamps of creation and any lifecycle state (task status).
    ///
    /// Fails when `fields` belongs to a different category.
    pub fn apply_fields(&mut self, fields: &ExtractedFields, now: DateTime<Utc>) -> Result<()> {
        match (self, fields) {
            (DestinationRecord::Person(rec), ExtractedFields::Person(p)) => {
                rec.name = p.name.trim().to_string();
                rec.context = non_empty(&p.context);
                rec.follow_ups = p.follow_ups.clone();
                rec.last_touched = now;
                rec.updated_at = now;
            }
            (DestinationRecord::Project(rec), ExtractedFields::Project(p)) => {
                rec.name = p.name.trim().to_string();
                rec.status = p.status;
                rec.next_action = non_empty(&p.next_action);
                rec.notes = non_empty(&p.notes);
                rec.updated_at = now;
            }
            (DestinationRecord::Idea(rec), ExtractedFields::Idea(i)) => {
                rec.title = i.title.trim().to_string();
                rec.one_liner = non_empty(&i.one_liner);
                rec.notes = non_empty(&i.notes);
                rec.updated_at = now;
            }
            (DestinationRecord::Task(rec), ExtractedFields::Task(t)) => {
                rec.name = t.name.trim().to_string();
                rec.due_date = t.due_date;
                rec.notes = non_empty(&t.notes);
                rec.updated_at = now;
            }
            (rec, fields) => {
                return Err(Error::InvalidInput(format!(
                    "cannot apply {} fields to a {} record",
                    fields.category(),
                    rec.category()
                )))
            }
        }
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        match self {
            DestinationRecord::Person(p) => p.id,
            DestinationRecord::Project(p) => p.id,
            DestinationRecord::Idea(i) => i.id,
            DestinationRecord::Task(t) => t.id,
        }
    }

    pub fn owner_id(&self) -> Uuid {
        match self {
            DestinationRecord::Person(p) => p.owner_id,
            DestinationRecord::Project(p) => p.owner_id,
            DestinationRecord::Idea(i) => i.owner_id,
            DestinationRecord::Task(t) => t.owner_id,
        }
    }

    pub fn category(&self) -> Category {
        match self {
            DestinationRecord::Person(_) => Category::Person,
            DestinationRecord::Project(_) => Category::Project,
            DestinationRecord::Idea(_) => Category::Idea,
            DestinationRecord::Task(_) => Category::Task,
        }
    }
}

// =============================================================================
// FILING AND RESOLUTION PLANS
// =============================================================================

/// Everything one filing writes, committed atomically by a [`FilingStore`].
///
/// [`FilingStore`]: crate::FilingStore
#[derive(Debug, Clone)]
pub struct NewFiling {
    pub capture_id: Uuid,
    pub owner_id: Uuid,
    pub category: Category,
    pub confidence: f64,
    pub extracted_fields: JsonValue,
    pub raw_llm_response: Option<String>,
    pub model: Option<String>,
    pub status: ClassificationStatus,
    /// Destination to create; present exactly when `status` is `auto_filed`.
    pub destination: Option<DestinationRecord>,
    /// Set on the capture alongside `processed = true`.
    pub processing_error: Option<String>,
}

/// What a committed filing produced.
#[derive(Debug, Clone, Serialize)]
pub struct FilingReceipt {
    pub classification: Classification,
    pub destination: Option<DestinationRecord>,
}

/// Destination write performed by a resolution.
#[derive(Debug, Clone)]
pub enum ResolutionAction {
    /// Insert a new record (first filing, or a category migration).
    Create(DestinationRecord),
    /// Update the existing record of the same category in place.
    Update {
        destination_id: Uuid,
        fields: ExtractedFields,
    },
}

/// A reviewer resolution, committed atomically by a [`FilingStore`].
///
/// [`FilingStore`]: crate::FilingStore
#[derive(Debug, Clone)]
pub struct ResolutionPlan {
    pub classification_id: Uuid,
    pub owner_id: Uuid,
    pub mode: ResolutionMode,
    /// Destination the entry pointed at when the plan was made; the commit
    /// fails with `Conflict` if it changed since.
    pub expected_destination_id: Option<Uuid>,
    pub category: Category,
    pub extracted_fields: JsonValue,
    pub action: ResolutionAction,
    pub status: ClassificationStatus,
}

/// What a committed resolution produced.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionReceipt {
    pub classification: Classification,
    pub destination: DestinationRecord,
    pub correction: CorrectionRecord,
}

// =============================================================================
// JOB TYPES
// =============================================================================

/// Status of a job in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

/// Type of job to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Run the classification pipeline for one capture
    ClassifyCapture,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::ClassifyCapture => "classify_capture",
        }
    }

    /// Default queue priority (higher runs first).
    pub fn default_priority(&self) -> i32 {
        match self {
            JobType::ClassifyCapture => 5,
        }
    }
}

impl std::str::FromStr for JobType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "classify_capture" => Ok(Self::ClassifyCapture),
            _ => Err(format!("Invalid job type: {}", s)),
        }
    }
}

/// A job in the processing queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub capture_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i32,
    pub payload: Option<JsonValue>,
    pub result: Option<JsonValue>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}
