//! Domain model for tasks parsed out of Markdown.
//!
//! Tasks reference each other by id (`parent_id`, `children_ids`) and are resolved
//! through a lookup map by consumers; no record owns another.

use chrono::{Local, NaiveDateTime, NaiveTime, TimeZone};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt;

/* ------------------------------- IDs ------------------------------- */

/// Task ids are stable across re-parses of unchanged text: `"{path}-L{line}"`.
pub fn task_id(file_path: &str, line: usize) -> String {
    format!("{file_path}-L{line}")
}

/* ---------------------------- Metadata keys ---------------------------- */

/// Canonical metadata fields. Anything else lands in `Custom` with its literal key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MetaField {
    DueDate,
    StartDate,
    ScheduledDate,
    CompletedDate,
    CreatedDate,
    CancelledDate,
    Priority,
    Project,
    Context,
    Area,
    Recurrence,
    Id,
    DependsOn,
    OnCompletion,
    Comment,
    Custom(String),
}

impl MetaField {
    pub fn as_str(&self) -> &str {
        match self {
            MetaField::DueDate => "dueDate",
            MetaField::StartDate => "startDate",
            MetaField::ScheduledDate => "scheduledDate",
            MetaField::CompletedDate => "completedDate",
            MetaField::CreatedDate => "createdDate",
            MetaField::CancelledDate => "cancelledDate",
            MetaField::Priority => "priority",
            MetaField::Project => "project",
            MetaField::Context => "context",
            MetaField::Area => "area",
            MetaField::Recurrence => "recurrence",
            MetaField::Id => "id",
            MetaField::DependsOn => "dependsOn",
            MetaField::OnCompletion => "onCompletion",
            MetaField::Comment => "comment",
            MetaField::Custom(key) => key,
        }
    }

    /// Resolve a recognized key (canonical name or short alias such as `due`).
    pub fn known(key: &str) -> Option<Self> {
        let field = match key.trim().to_ascii_lowercase().as_str() {
            "due" | "duedate" => MetaField::DueDate,
            "start" | "startdate" => MetaField::StartDate,
            "scheduled" | "scheduleddate" => MetaField::ScheduledDate,
            "completion" | "completeddate" => MetaField::CompletedDate,
            "created" | "createddate" => MetaField::CreatedDate,
            "cancelled" | "cancelleddate" => MetaField::CancelledDate,
            "priority" => MetaField::Priority,
            "project" => MetaField::Project,
            "context" => MetaField::Context,
            "area" => MetaField::Area,
            "repeat" | "recurrence" => MetaField::Recurrence,
            "id" => MetaField::Id,
            "dependson" => MetaField::DependsOn,
            "oncompletion" => MetaField::OnCompletion,
            "comment" => MetaField::Comment,
            _ => return None,
        };
        Some(field)
    }

    /// Known field or a validated custom key. Empty keys are rejected.
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        Some(Self::known(key).unwrap_or_else(|| MetaField::Custom(key.to_string())))
    }

    pub fn is_date(&self) -> bool {
        matches!(
            self,
            MetaField::DueDate
                | MetaField::StartDate
                | MetaField::ScheduledDate
                | MetaField::CompletedDate
                | MetaField::CreatedDate
                | MetaField::CancelledDate
        )
    }
}

impl From<String> for MetaField {
    fn from(s: String) -> Self {
        Self::known(&s).unwrap_or(MetaField::Custom(s))
    }
}

impl From<MetaField> for String {
    fn from(f: MetaField) -> Self {
        f.as_str().to_string()
    }
}

impl fmt::Display for MetaField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/* ---------------------------- Metadata values ---------------------------- */

/// A metadata value. Dates are epoch milliseconds in local time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum MetaValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    List(Vec<String>),
    Timestamp(i64),
}

impl MetaValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetaValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            MetaValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<i64> {
        match self {
            MetaValue::Timestamp(ms) => Some(*ms),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            MetaValue::List(xs) => Some(xs),
            _ => None,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Text(s) => f.write_str(s),
            MetaValue::Integer(n) => write!(f, "{n}"),
            MetaValue::Float(x) => write!(f, "{x}"),
            MetaValue::Bool(b) => write!(f, "{b}"),
            MetaValue::List(xs) => f.write_str(&xs.join(", ")),
            MetaValue::Timestamp(ms) => match local_datetime_from_millis(*ms) {
                Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M")),
                None => write!(f, "{ms}"),
            },
        }
    }
}

impl TryFrom<&serde_json::Value> for MetaValue {
    type Error = ValueError;

    /// Frontmatter shapes we understand: scalars and flat arrays of scalars.
    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value;
        match value {
            Value::String(s) => Ok(MetaValue::Text(s.clone())),
            Value::Bool(b) => Ok(MetaValue::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(MetaValue::Integer(i)),
                None => n
                    .as_f64()
                    .map(MetaValue::Float)
                    .ok_or_else(|| ValueError::UnsupportedShape(n.to_string())),
            },
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    Value::Number(n) => Ok(n.to_string()),
                    Value::Bool(b) => Ok(b.to_string()),
                    other => Err(ValueError::UnsupportedShape(other.to_string())),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(MetaValue::List),
            Value::Null => Err(ValueError::UnsupportedShape("null".into())),
            Value::Object(_) => Err(ValueError::UnsupportedShape(value.to_string())),
        }
    }
}

/* ------------------------------ Metadata ------------------------------ */

/// Per-task metadata: an ordered field map plus an ordered `#tag` set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskMetadata {
    #[serde(default)]
    pub fields: IndexMap<MetaField, MetaValue>,
    #[serde(default)]
    pub tags: IndexSet<String>,
}

impl TaskMetadata {
    pub fn get(&self, field: &MetaField) -> Option<&MetaValue> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &MetaField) -> bool {
        self.fields.contains_key(field)
    }

    /// First writer wins. Returns `false` if the field was already present.
    pub fn set_if_absent(&mut self, field: MetaField, value: MetaValue) -> bool {
        if self.fields.contains_key(&field) {
            return false;
        }
        self.fields.insert(field, value);
        true
    }

    pub fn add_tag(&mut self, tag: &str) {
        let tag = normalize_tag(tag);
        if tag.len() > 1 {
            self.tags.insert(tag);
        }
    }

    pub fn timestamp(&self, field: &MetaField) -> Option<i64> {
        self.get(field).and_then(MetaValue::as_timestamp)
    }

    pub fn text(&self, field: &MetaField) -> Option<&str> {
        self.get(field).and_then(MetaValue::as_text)
    }

    pub fn priority(&self) -> Option<i64> {
        self.get(&MetaField::Priority).and_then(MetaValue::as_integer)
    }

    pub fn depends_on(&self) -> Vec<String> {
        match self.get(&MetaField::DependsOn) {
            Some(MetaValue::List(xs)) => xs.clone(),
            Some(MetaValue::Text(s)) => vec![s.clone()],
            _ => vec![],
        }
    }
}

/// Tags always carry their `#` prefix. `normalize_tag(normalize_tag(t)) == normalize_tag(t)`.
pub fn normalize_tag(tag: &str) -> String {
    let tag = tag.trim();
    if tag.is_empty() || tag.starts_with('#') {
        tag.to_string()
    } else {
        format!("#{tag}")
    }
}

/* ------------------------------ Time model ------------------------------ */

/// A clock time recovered from free text.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeComponent {
    pub hour: u32,
    pub minute: u32,
    pub second: Option<u32>,
    pub original_text: String,
    pub is_range: bool,
    /// The other half of a range. The copy stored here never carries its own partner.
    pub range_partner: Option<Box<TimeComponent>>,
}

impl TimeComponent {
    pub fn new(hour: u32, minute: u32, second: Option<u32>, original_text: &str) -> Option<Self> {
        if hour > 23 || minute > 59 || second.is_some_and(|s| s > 59) {
            return None;
        }
        Some(Self {
            hour,
            minute,
            second,
            original_text: original_text.to_string(),
            is_range: false,
            range_partner: None,
        })
    }

    /// Mark both halves as a range and cross-link them.
    pub fn link_range(mut start: Self, mut end: Self) -> (Self, Self) {
        start.is_range = true;
        end.is_range = true;
        start.range_partner = None;
        end.range_partner = None;
        let start_copy = start.clone();
        start.range_partner = Some(Box::new(end.clone()));
        end.range_partner = Some(Box::new(start_copy));
        (start, end)
    }

    pub fn to_naive_time(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(self.hour, self.minute, self.second.unwrap_or(0))
    }

    fn seconds_of_day(&self) -> u32 {
        self.hour * 3600 + self.minute * 60 + self.second.unwrap_or(0)
    }

    /// For the closing half of a range: true when the opening half is later on the clock.
    pub fn ends_after_midnight(&self) -> bool {
        self.range_partner
            .as_deref()
            .is_some_and(|p| p.seconds_of_day() > self.seconds_of_day())
    }
}

/// Role of a date or time found in free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimeRole {
    Start,
    Due,
    Scheduled,
}

/// Time components keyed by role.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeComponents {
    pub start_time: Option<TimeComponent>,
    pub due_time: Option<TimeComponent>,
    pub scheduled_time: Option<TimeComponent>,
    pub end_time: Option<TimeComponent>,
}

impl TimeComponents {
    pub fn is_empty(&self) -> bool {
        self.start_time.is_none()
            && self.due_time.is_none()
            && self.scheduled_time.is_none()
            && self.end_time.is_none()
    }

    pub fn slot_mut(&mut self, role: TimeRole) -> &mut Option<TimeComponent> {
        match role {
            TimeRole::Start => &mut self.start_time,
            TimeRole::Due => &mut self.due_time,
            TimeRole::Scheduled => &mut self.scheduled_time,
        }
    }
}

/// Calendar dates combined with their clock times.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedDates {
    pub start_date_time: Option<NaiveDateTime>,
    pub due_date_time: Option<NaiveDateTime>,
    pub scheduled_date_time: Option<NaiveDateTime>,
    pub completed_date_time: Option<NaiveDateTime>,
    pub end_date_time: Option<NaiveDateTime>,
}

impl EnhancedDates {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/* ------------------------------ Projects ------------------------------ */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProjectSource {
    Path,
    Metadata,
    Config,
}

/// A project assignment resolved outside the task text, with its provenance.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TgProject {
    #[serde(rename = "type")]
    pub kind: ProjectSource,
    pub name: String,
    /// Pattern, metadata key or config file the name came from.
    pub source: Option<String>,
    pub readonly: bool,
}

/* ------------------------------- Tasks ------------------------------- */

/// The enhanced task record.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    /// Body with metadata, tags and (optionally) time expressions stripped.
    pub content: String,
    pub file_path: String,
    /// Zero-based line index in the source document.
    pub line: usize,
    pub completed: bool,
    /// Logical status from the status table; `None` for unmapped characters.
    pub status: Option<String>,
    pub raw_status: String,
    pub indent_level: usize,
    pub actual_indent: usize,
    pub parent_id: Option<String>,
    #[serde(default)]
    pub children_ids: Vec<String>,
    #[serde(default)]
    pub metadata: TaskMetadata,
    pub time_components: Option<TimeComponents>,
    pub enhanced_dates: Option<EnhancedDates>,
    pub heading: Option<String>,
    pub heading_level: Option<u8>,
    pub list_marker: String,
    pub original_markdown: String,
    pub tg_project: Option<TgProject>,
}

/// Flat, backward-compatible task shape.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyTask {
    pub id: String,
    pub content: String,
    pub file_path: String,
    pub line: usize,
    pub completed: bool,
    /// The raw status character.
    pub status: String,
    pub original_markdown: String,
    #[serde(default)]
    pub children: Vec<String>,
    pub parent: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub priority: Option<i64>,
    pub start_date: Option<i64>,
    pub due_date: Option<i64>,
    pub scheduled_date: Option<i64>,
    pub completed_date: Option<i64>,
    pub created_date: Option<i64>,
    pub cancelled_date: Option<i64>,
    pub recurrence: Option<String>,
    pub project: Option<String>,
    pub context: Option<String>,
    pub heading: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub on_completion: Option<String>,
}

impl From<&Task> for LegacyTask {
    fn from(task: &Task) -> Self {
        let meta = &task.metadata;
        let text = |f: MetaField| meta.get(&f).map(|v| v.to_string());
        let project = text(MetaField::Project)
            .or_else(|| task.tg_project.as_ref().map(|p| p.name.clone()));
        Self {
            id: task.id.clone(),
            content: task.content.clone(),
            file_path: task.file_path.clone(),
            line: task.line,
            completed: task.completed,
            status: task.raw_status.clone(),
            original_markdown: task.original_markdown.clone(),
            children: task.children_ids.clone(),
            parent: task.parent_id.clone(),
            tags: meta.tags.iter().cloned().collect(),
            priority: meta.priority(),
            start_date: meta.timestamp(&MetaField::StartDate),
            due_date: meta.timestamp(&MetaField::DueDate),
            scheduled_date: meta.timestamp(&MetaField::ScheduledDate),
            completed_date: meta.timestamp(&MetaField::CompletedDate),
            created_date: meta.timestamp(&MetaField::CreatedDate),
            cancelled_date: meta.timestamp(&MetaField::CancelledDate),
            recurrence: text(MetaField::Recurrence),
            project,
            context: text(MetaField::Context),
            heading: task.heading.clone(),
            depends_on: meta.depends_on(),
            on_completion: text(MetaField::OnCompletion),
        }
    }
}

/* ---------------------------- Local time helpers ---------------------------- */

/// Epoch millis for a wall-clock time in the local zone (earliest on DST folds).
pub fn local_millis(dt: NaiveDateTime) -> Option<i64> {
    Local
        .from_local_datetime(&dt)
        .earliest()
        .map(|d| d.timestamp_millis())
}

pub fn local_datetime_from_millis(ms: i64) -> Option<NaiveDateTime> {
    Local.timestamp_millis_opt(ms).single().map(|d| d.naive_local())
}

/* ---------------------------- Errors (domain) ---------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeParseErrorKind {
    InvalidFormat,
}

/// Diagnostic for time text that looked like a clock time but did not resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{message} (at {position}: {original_text:?})")]
pub struct TimeParseError {
    pub kind: TimeParseErrorKind,
    pub original_text: String,
    pub position: usize,
    pub message: String,
    pub fallback_used: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    #[error("unsupported metadata shape: {0}")]
    UnsupportedShape(String),
    #[error("unresolvable date {0:?}")]
    UnresolvableDate(String),
    #[error("priority {0:?} is not in 1..=5")]
    InvalidPriority(String),
}
