//! Parser configuration.
//!
//! A [`TaskParserConfig`] is built once and never mutated during a parse. Variants
//! are derived with the `with_*` builders. Every field has a default, so partial
//! JSON documents deserialize cleanly.

use crate::core::MetaField;
use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/* ------------------------------ Modes ------------------------------ */

/// Which inline metadata syntaxes the extractor honours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetadataParseMode {
    DataviewOnly,
    EmojiOnly,
    #[default]
    Both,
    None,
}

impl MetadataParseMode {
    pub fn dataview(self) -> bool {
        matches!(self, Self::DataviewOnly | Self::Both)
    }

    pub fn emoji(self) -> bool {
        matches!(self, Self::EmojiOnly | Self::Both)
    }
}

/* --------------------------- Inheritance --------------------------- */

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FileMetadataInheritance {
    pub enabled: bool,
    pub inherit_to_top_level: bool,
    pub inherit_to_subtasks: bool,
}

impl Default for FileMetadataInheritance {
    fn default() -> Self {
        Self {
            enabled: true,
            inherit_to_top_level: true,
            inherit_to_subtasks: false,
        }
    }
}

impl FileMetadataInheritance {
    pub fn applies_to(&self, is_subtask: bool) -> bool {
        self.enabled
            && if is_subtask {
                self.inherit_to_subtasks
            } else {
                self.inherit_to_top_level
            }
    }
}

/* ----------------------------- Projects ----------------------------- */

/// Path pattern (glob with `*`/`**`, or plain substring) assigning a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathMapping {
    pub pattern: String,
    pub project_name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectMetadataConfig {
    pub metadata_key: String,
    pub enabled: bool,
}

impl Default for ProjectMetadataConfig {
    fn default() -> Self {
        Self {
            metadata_key: "project".into(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectConfigFile {
    pub file_name: String,
    pub search_recursively: bool,
    pub enabled: bool,
}

impl Default for ProjectConfigFile {
    fn default() -> Self {
        Self {
            file_name: "project.md".into(),
            search_recursively: false,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectConfig {
    pub enable_enhanced_project: bool,
    pub path_mappings: Vec<PathMapping>,
    pub metadata_config: ProjectMetadataConfig,
    pub config_file: ProjectConfigFile,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            enable_enhanced_project: true,
            path_mappings: Vec::new(),
            metadata_config: ProjectMetadataConfig::default(),
            config_file: ProjectConfigFile::default(),
        }
    }
}

/* ------------------------------ Limits ------------------------------ */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParseLimits {
    pub max_parse_iterations: usize,
    pub max_metadata_iterations: usize,
    pub max_stack_operations: usize,
    pub max_stack_size: usize,
    pub max_indent_size: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_parse_iterations: 100_000,
            max_metadata_iterations: 100,
            max_stack_operations: 4_000,
            max_stack_size: 1_000,
            max_indent_size: 100,
        }
    }
}

/* --------------------------- Time parsing --------------------------- */

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateKeywords {
    pub start: Vec<String>,
    pub due: Vec<String>,
    pub scheduled: Vec<String>,
}

fn words(xs: &[&str]) -> Vec<String> {
    xs.iter().map(|s| s.to_string()).collect()
}

impl Default for DateKeywords {
    fn default() -> Self {
        Self {
            start: words(&[
                "start", "begin", "from", "starting", "begins", "开始", "从", "起始", "起",
                "始于", "自",
            ]),
            due: words(&[
                "due", "deadline", "by", "until", "before", "expires", "ends", "截止", "到期",
                "之前", "期限", "最晚", "结束", "终止", "完成于",
            ]),
            scheduled: words(&[
                "scheduled", "on", "at", "planned", "set for", "arranged", "安排", "计划",
                "在", "定于", "预定", "约定", "设定",
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimeParsingConfig {
    pub enabled: bool,
    pub supported_languages: Vec<String>,
    pub date_keywords: DateKeywords,
    pub remove_original_text: bool,
    pub per_line_processing: bool,
}

impl Default for TimeParsingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            supported_languages: words(&["en", "zh"]),
            date_keywords: DateKeywords::default(),
            remove_original_text: true,
            per_line_processing: true,
        }
    }
}

impl TimeParsingConfig {
    pub fn supports(&self, lang: &str) -> bool {
        self.supported_languages
            .iter()
            .any(|l| l.eq_ignore_ascii_case(lang))
    }
}

/* ------------------------------ Parser ------------------------------ */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskParserConfig {
    pub parse_metadata: bool,
    pub parse_tags: bool,
    pub parse_comments: bool,
    pub parse_heading: bool,
    /// Checkbox character to logical status name.
    pub status_mapping: IndexMap<String, String>,
    /// Emoji marker to the field its value is written to.
    pub emoji_mapping: IndexMap<String, MetaField>,
    pub metadata_parse_mode: MetadataParseMode,
    /// Tag or dataview-key prefix to target field, matched case-insensitively.
    pub special_tag_prefixes: IndexMap<String, MetaField>,
    pub file_metadata_inheritance: FileMetadataInheritance,
    pub project_config: ProjectConfig,
    pub limits: ParseLimits,
    /// Extra chrono format strings tried when a date is not `YYYY-MM-DD[ HH:MM]`.
    pub custom_date_formats: Vec<String>,
    pub date_cache_capacity: usize,
    pub time_parsing: TimeParsingConfig,
}

pub fn default_status_mapping() -> IndexMap<String, String> {
    [
        (" ", "TODO"),
        ("x", "DONE"),
        ("X", "DONE"),
        ("/", "IN_PROGRESS"),
        (">", "IN_PROGRESS"),
        ("-", "CANCELLED"),
        ("?", "PLANNED"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

pub fn default_emoji_mapping() -> IndexMap<String, MetaField> {
    [
        ("📅", MetaField::DueDate),
        ("🛫", MetaField::StartDate),
        ("⏳", MetaField::ScheduledDate),
        ("✅", MetaField::CompletedDate),
        ("❌", MetaField::CancelledDate),
        ("➕", MetaField::CreatedDate),
        ("🔁", MetaField::Recurrence),
        ("🏁", MetaField::OnCompletion),
        ("⛔", MetaField::DependsOn),
        ("🆔", MetaField::Id),
        ("🔺", MetaField::Priority),
        ("⏫", MetaField::Priority),
        ("🔼", MetaField::Priority),
        ("🔽", MetaField::Priority),
        ("⏬", MetaField::Priority),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

pub fn default_special_tag_prefixes() -> IndexMap<String, MetaField> {
    [
        ("project", MetaField::Project),
        ("area", MetaField::Area),
        ("context", MetaField::Context),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

impl Default for TaskParserConfig {
    fn default() -> Self {
        Self {
            parse_metadata: true,
            parse_tags: true,
            parse_comments: true,
            parse_heading: true,
            status_mapping: default_status_mapping(),
            emoji_mapping: default_emoji_mapping(),
            metadata_parse_mode: MetadataParseMode::Both,
            special_tag_prefixes: default_special_tag_prefixes(),
            file_metadata_inheritance: FileMetadataInheritance::default(),
            project_config: ProjectConfig::default(),
            limits: ParseLimits::default(),
            custom_date_formats: Vec::new(),
            date_cache_capacity: 1_000,
            time_parsing: TimeParsingConfig::default(),
        }
    }
}

impl TaskParserConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).context("parsing parser config JSON")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("reading config {:?}", path))?;
        Self::from_json_str(&text).with_context(|| format!("in {:?}", path))
    }

    pub fn with_metadata_mode(self, metadata_parse_mode: MetadataParseMode) -> Self {
        Self {
            metadata_parse_mode,
            ..self
        }
    }

    pub fn with_time_parsing(self, time_parsing: TimeParsingConfig) -> Self {
        Self {
            time_parsing,
            ..self
        }
    }

    pub fn with_limits(self, limits: ParseLimits) -> Self {
        Self { limits, ..self }
    }

    pub fn with_project_config(self, project_config: ProjectConfig) -> Self {
        Self {
            project_config,
            ..self
        }
    }

    pub fn with_inheritance(self, file_metadata_inheritance: FileMetadataInheritance) -> Self {
        Self {
            file_metadata_inheritance,
            ..self
        }
    }

    pub fn with_custom_date_formats(self, custom_date_formats: Vec<String>) -> Self {
        Self {
            custom_date_formats,
            ..self
        }
    }

    pub fn with_status(mut self, ch: &str, status: &str) -> Self {
        self.status_mapping.insert(ch.to_string(), status.to_string());
        self
    }

    /// Logical status for a checkbox character, if mapped.
    pub fn status_for(&self, raw: &str) -> Option<&str> {
        self.status_mapping.get(raw).map(String::as_str)
    }

    pub fn special_prefix(&self, prefix: &str) -> Option<&MetaField> {
        self.special_tag_prefixes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(prefix))
            .map(|(_, v)| v)
    }
}
