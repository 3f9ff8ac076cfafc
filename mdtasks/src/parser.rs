//! Document-level driver: lines in, task records out.
//!
//! One pass over the document. Each task line goes through the classifier,
//! the metadata extractor, the indent stack and (when enabled) the time
//! service; the date combiner then overlays clock times on the metadata dates.

use crate::bounded::IterationGuard;
use crate::cache::DateParseCache;
use crate::classify::{LineClassifier, LineKind, TaskLine, is_completed};
use crate::combine::{DateInputs, combine};
use crate::config::TaskParserConfig;
use crate::core::{LegacyTask, MetaField, MetaValue, Task, TgProject, TimeRole, local_millis, task_id};
use crate::dates::DateExpressionParser;
use crate::hierarchy::IndentStack;
use crate::metadata::{MetadataExtractor, collapse_whitespace};
use crate::project::{ProjectInputs, resolve_tg_project};
use crate::time::TimeParsingService;
use chrono::{Local, NaiveDate, NaiveTime};
use indexmap::IndexMap;
use std::collections::HashMap;

/// File-level inputs for one parse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseContext {
    pub file_path: String,
    /// Frontmatter of the file, if any.
    pub file_metadata: Option<IndexMap<String, serde_json::Value>>,
    /// Key/values read from the project config file governing this path.
    pub project_config_data: Option<IndexMap<String, serde_json::Value>>,
    /// Project already resolved by the caller; wins over every other source.
    pub tg_project: Option<TgProject>,
    /// Reference day for relative dates; the local date when unset.
    pub today: Option<NaiveDate>,
}

impl ParseContext {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            ..Self::default()
        }
    }

    pub fn with_file_metadata(self, file_metadata: IndexMap<String, serde_json::Value>) -> Self {
        Self {
            file_metadata: Some(file_metadata),
            ..self
        }
    }

    pub fn with_project_config(self, data: IndexMap<String, serde_json::Value>) -> Self {
        Self {
            project_config_data: Some(data),
            ..self
        }
    }

    pub fn with_tg_project(self, tg_project: TgProject) -> Self {
        Self {
            tg_project: Some(tg_project),
            ..self
        }
    }

    pub fn with_today(self, today: NaiveDate) -> Self {
        Self {
            today: Some(today),
            ..self
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }
}

/// Parses Markdown checklists. Holds the date cache, so reuse one instance
/// across documents that share a configuration.
pub struct MarkdownTaskParser {
    config: TaskParserConfig,
    cache: DateParseCache,
    time: TimeParsingService,
}

impl MarkdownTaskParser {
    pub fn new(config: TaskParserConfig) -> Self {
        Self {
            cache: DateParseCache::new(config.date_cache_capacity),
            time: TimeParsingService::new(config.time_parsing.clone()),
            config,
        }
    }

    /// Swap the primary natural-language date parser used for task bodies.
    pub fn with_date_parser<P: DateExpressionParser + 'static>(self, parser: P) -> Self {
        Self {
            time: self.time.with_primary(parser),
            ..self
        }
    }

    pub fn config(&self) -> &TaskParserConfig {
        &self.config
    }

    pub fn cache(&self) -> &DateParseCache {
        &self.cache
    }

    pub fn time_service(&self) -> &TimeParsingService {
        &self.time
    }

    /// Every task in `text`, in document order.
    pub fn parse(&self, text: &str, ctx: &ParseContext) -> Vec<Task> {
        let today = ctx.today();
        let tg_project = resolve_tg_project(
            &self.config.project_config,
            ProjectInputs {
                file_path: &ctx.file_path,
                resolved: ctx.tg_project.as_ref(),
                frontmatter: ctx.file_metadata.as_ref(),
                config_data: ctx.project_config_data.as_ref(),
            },
        );

        let mut classifier = LineClassifier::new(self.config.parse_heading);
        let mut stack = IndentStack::new(&self.config.limits);
        let mut heading: Option<(String, u8)> = None;
        let mut tasks: Vec<Task> = Vec::new();
        let mut index_of: HashMap<String, usize> = HashMap::new();
        let mut guard = IterationGuard::new("line scan", self.config.limits.max_parse_iterations);

        for (line_no, line) in text.lines().enumerate() {
            if !guard.tick() {
                break;
            }
            match classifier.classify(line) {
                LineKind::Heading { level, text } => {
                    heading = Some((text.trim().to_string(), level));
                }
                LineKind::Task(task_line) => {
                    let mut task = self.build_task(ctx, line_no, line, &task_line, today);
                    let placement = stack.place(&task.id, task_line.actual_indent);
                    task.indent_level = placement.indent_level;
                    task.parent_id = placement.parent_id;
                    self.inherit(ctx, &mut task);
                    if let Some((text, level)) = &heading {
                        task.heading = Some(text.clone());
                        task.heading_level = Some(*level);
                    }
                    task.tg_project = tg_project.clone();

                    if let Some(&parent) = task.parent_id.as_ref().and_then(|p| index_of.get(p)) {
                        tasks[parent].children_ids.push(task.id.clone());
                    }
                    index_of.insert(task.id.clone(), tasks.len());
                    tasks.push(task);
                }
                LineKind::FenceToggle | LineKind::Code | LineKind::Text => {}
            }
        }

        // Inherited dates may have arrived after the body was read.
        for task in &mut tasks {
            let times = task.time_components.clone().unwrap_or_default();
            let enhanced = combine(&DateInputs::from_metadata(&task.metadata), &times);
            task.enhanced_dates = (!enhanced.is_empty()).then_some(enhanced);
        }

        log::debug!("{}: {} tasks", ctx.file_path, tasks.len());
        tasks
    }

    /// Same as [`Self::parse`], flattened to the legacy record shape.
    pub fn parse_legacy(&self, text: &str, ctx: &ParseContext) -> Vec<LegacyTask> {
        self.parse(text, ctx).iter().map(LegacyTask::from).collect()
    }

    /* ----------------------------- Per task ----------------------------- */

    fn build_task(
        &self,
        ctx: &ParseContext,
        line_no: usize,
        line: &str,
        task_line: &TaskLine<'_>,
        today: NaiveDate,
    ) -> Task {
        let raw_status = task_line.raw_status.to_string();
        let extracted = MetadataExtractor::new(&self.config, &self.cache).extract(task_line.body);
        let mut content = extracted.content;
        let mut metadata = extracted.metadata;
        let mut time_components = None;

        if self.time.config().enabled {
            let found = self.time.parse_time_components(task_line.body);
            for e in &found.errors {
                log::debug!("{}:{}: {e}", ctx.file_path, line_no + 1);
            }
            if !found.time_components.is_empty() {
                time_components = Some(found.time_components);
            }

            let parsed = self.time.parse_time_expressions(&content, today);
            for (role, field) in [
                (TimeRole::Start, MetaField::StartDate),
                (TimeRole::Due, MetaField::DueDate),
                (TimeRole::Scheduled, MetaField::ScheduledDate),
            ] {
                let millis = parsed
                    .date_for(role)
                    .and_then(|d| local_millis(d.and_time(NaiveTime::MIN)));
                if let Some(ms) = millis {
                    metadata.set_if_absent(field, MetaValue::Timestamp(ms));
                }
            }
            if self.time.config().remove_original_text {
                content = collapse_whitespace(&parsed.cleaned_text);
            }
        }

        Task {
            id: task_id(&ctx.file_path, line_no),
            content,
            file_path: ctx.file_path.clone(),
            line: line_no,
            completed: is_completed(task_line.raw_status),
            status: self.config.status_for(&raw_status).map(str::to_string),
            raw_status,
            indent_level: 0,
            actual_indent: task_line.actual_indent,
            parent_id: None,
            children_ids: Vec::new(),
            metadata,
            time_components,
            enhanced_dates: None,
            heading: None,
            heading_level: None,
            list_marker: task_line.list_marker.to_string(),
            original_markdown: line.to_string(),
            tg_project: None,
        }
    }

    /// Frontmatter first, then project config; values on the task itself win.
    fn inherit(&self, ctx: &ParseContext, task: &mut Task) {
        if !self
            .config
            .file_metadata_inheritance
            .applies_to(task.parent_id.is_some())
        {
            return;
        }
        let extractor = MetadataExtractor::new(&self.config, &self.cache);
        if let Some(fm) = &ctx.file_metadata {
            extractor.inherit(&mut task.metadata, fm, &ctx.file_path);
        }
        if let Some(data) = &ctx.project_config_data {
            extractor.inherit(&mut task.metadata, data, &ctx.file_path);
        }
    }
}

impl Default for MarkdownTaskParser {
    fn default() -> Self {
        Self::new(TaskParserConfig::default())
    }
}
