//! Project assignment from sources outside the task text.
//!
//! Tried in order, first hit wins:
//! 1. a value already resolved by the caller
//! 2. path mappings (glob, or substring)
//! 3. the configured frontmatter key
//! 4. the project config file's `project` value

use crate::config::ProjectConfig;
use crate::core::{ProjectSource, TgProject};
use indexmap::IndexMap;

/// File-level inputs to project resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectInputs<'a> {
    pub file_path: &'a str,
    pub resolved: Option<&'a TgProject>,
    pub frontmatter: Option<&'a IndexMap<String, serde_json::Value>>,
    pub config_data: Option<&'a IndexMap<String, serde_json::Value>>,
}

pub fn resolve_tg_project(config: &ProjectConfig, inputs: ProjectInputs<'_>) -> Option<TgProject> {
    if !config.enable_enhanced_project {
        return None;
    }
    if let Some(p) = inputs.resolved {
        return Some(p.clone());
    }

    let path = inputs.file_path.replace('\\', "/");
    for mapping in config.path_mappings.iter().filter(|m| m.enabled) {
        if path_matches(&mapping.pattern, &path) {
            return Some(TgProject {
                kind: ProjectSource::Path,
                name: mapping.project_name.clone(),
                source: Some(mapping.pattern.clone()),
                readonly: true,
            });
        }
    }

    let meta = &config.metadata_config;
    if meta.enabled {
        if let Some(name) = inputs
            .frontmatter
            .and_then(|fm| fm.get(&meta.metadata_key))
            .and_then(project_name)
        {
            return Some(TgProject {
                kind: ProjectSource::Metadata,
                name,
                source: Some(meta.metadata_key.clone()),
                readonly: true,
            });
        }
    }

    let file = &config.config_file;
    if file.enabled {
        if let Some(name) = inputs
            .config_data
            .and_then(|data| data.get("project"))
            .and_then(project_name)
        {
            return Some(TgProject {
                kind: ProjectSource::Config,
                name,
                source: Some(file.file_name.clone()),
                readonly: true,
            });
        }
    }

    None
}

fn project_name(value: &serde_json::Value) -> Option<String> {
    let name = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!name.is_empty()).then_some(name)
}

/// Glob patterns (`*` within a segment, `**` across segments, `?`, `[...]`) match the
/// whole path; anything else matches as a substring.
pub fn path_matches(pattern: &str, path: &str) -> bool {
    if !pattern.contains(['*', '?', '[']) {
        return path.contains(pattern);
    }
    match glob::Pattern::new(pattern) {
        Ok(compiled) => compiled.matches_with(path, SEGMENT_AWARE),
        Err(e) => {
            log::warn!("bad path pattern {pattern:?}: {e}");
            false
        }
    }
}

const SEGMENT_AWARE: glob::MatchOptions = glob::MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};
