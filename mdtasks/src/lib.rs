//! Markdown task parsing engine.
//!
//! Checklist lines become a hierarchy of task records enriched with metadata
//! (dates, priority, tags, project, context). A standalone time service recovers
//! clock times from free text and classifies each as start, due or scheduled.
//!
//! Entry points:
//! - [`parser::MarkdownTaskParser`] for documents.
//! - [`time::TimeParsingService`] for free text.

pub mod bounded;
pub mod cache;
pub mod classify;
pub mod combine;
pub mod config;
pub mod core;
pub mod dates;
pub mod hierarchy;
pub mod locale_zh;
pub mod metadata;
pub mod parser;
pub mod project;
pub mod time;

pub use crate::config::{MetadataParseMode, TaskParserConfig, TimeParsingConfig};
pub use crate::core::{
    EnhancedDates, LegacyTask, MetaField, MetaValue, Task, TaskMetadata, TgProject,
    TimeComponent, TimeComponents, TimeParseError, TimeRole, normalize_tag,
};
pub use crate::parser::{MarkdownTaskParser, ParseContext};
pub use crate::time::{ParsedTimeResult, TimeComponentsResult, TimeParsingService};
