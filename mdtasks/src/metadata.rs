//! Inline metadata and tag extraction.
//!
//! The body of a task line is reduced one annotation at a time. Each pass strips
//! the first match of, in order: a dataview field `[key:: value]`, the left-most
//! emoji field, an `@context`, a `#tag`. The loop stops when a pass finds nothing
//! or the iteration guard trips; whatever text is left is the display content.

use crate::bounded::IterationGuard;
use crate::cache::DateParseCache;
use crate::config::TaskParserConfig;
use crate::core::{MetaField, MetaValue, TaskMetadata, ValueError, normalize_tag};
use crate::dates::{resolve_date_string, strict_prefix_len};
use indexmap::IndexMap;
use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

/// Keys that describe the task itself and are never filled from file-level sources.
pub const INHERITANCE_BLACKLIST: &[&str] = &[
    "id",
    "content",
    "status",
    "rawStatus",
    "completed",
    "line",
    "lineNumber",
    "originalMarkdown",
    "filePath",
    "heading",
    "headingLevel",
    "parent",
    "parentId",
    "children",
    "childrenIds",
    "indentLevel",
    "actualIndent",
    "listMarker",
    "tgProject",
    "comment",
    "metadata",
];

static COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"%%(.*?)%%").unwrap());

static FILE_EXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\.(?:md|canvas|txt|pdf)(?:#\S*)?(?:\s|$)").unwrap());

const VARIATION_SELECTOR: char = '\u{FE0F}';

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Extracted {
    pub content: String,
    pub metadata: TaskMetadata,
}

#[derive(Debug, Clone, PartialEq)]
enum Finding {
    Field(MetaField, String),
    Tag(String),
}

pub struct MetadataExtractor<'a> {
    config: &'a TaskParserConfig,
    cache: &'a DateParseCache,
}

impl<'a> MetadataExtractor<'a> {
    pub fn new(config: &'a TaskParserConfig, cache: &'a DateParseCache) -> Self {
        Self { config, cache }
    }

    pub fn extract(&self, body: &str) -> Extracted {
        let mut metadata = TaskMetadata::default();
        let mut text = body.to_string();
        if self.config.parse_comments {
            text = strip_comments(&text, &mut metadata);
        }

        let mut guard = IterationGuard::new(
            "metadata strip",
            self.config.limits.max_metadata_iterations,
        );
        while guard.tick() {
            let Some((range, finding)) = self.next_strip(&text) else {
                break;
            };
            text.replace_range(range, " ");
            self.record(finding, &mut metadata);
        }

        Extracted {
            content: collapse_whitespace(&text),
            metadata,
        }
    }

    fn next_strip(&self, text: &str) -> Option<(Range<usize>, Finding)> {
        let mode = self.config.metadata_parse_mode;
        if self.config.parse_metadata {
            if mode.dataview() {
                if let Some(found) = self.find_dataview(text) {
                    return Some(found);
                }
            }
            if mode.emoji() {
                if let Some(found) = self.find_emoji(text) {
                    return Some(found);
                }
            }
            if let Some(found) = find_context(text) {
                return Some(found);
            }
        }
        if self.config.parse_tags {
            return self.find_tag(text);
        }
        None
    }

    fn record(&self, finding: Finding, metadata: &mut TaskMetadata) {
        match finding {
            Finding::Tag(tag) => metadata.add_tag(&tag),
            Finding::Field(field, raw) => {
                if raw.is_empty() {
                    return;
                }
                if metadata.contains(&field) {
                    log::debug!("{} already set, dropping {:?}", field, raw);
                    return;
                }
                let value = self.coerce(&field, &raw).unwrap_or_else(|e| {
                    log::warn!("{e}; keeping {field} as text");
                    MetaValue::Text(raw)
                });
                metadata.set_if_absent(field, value);
            }
        }
    }

    /// Typed value for a field read from text.
    pub fn coerce(&self, field: &MetaField, raw: &str) -> Result<MetaValue, ValueError> {
        let raw = raw.trim();
        if field.is_date() {
            return resolve_date_string(raw, &self.config.custom_date_formats, self.cache)
                .map(MetaValue::Timestamp)
                .ok_or_else(|| ValueError::UnresolvableDate(raw.to_string()));
        }
        match field {
            MetaField::Priority => priority_from_str(raw)
                .map(MetaValue::Integer)
                .ok_or_else(|| ValueError::InvalidPriority(raw.to_string())),
            MetaField::DependsOn => Ok(MetaValue::List(split_list(raw))),
            _ => Ok(MetaValue::Text(raw.to_string())),
        }
    }

    /* ------------------------------ Dataview ------------------------------ */

    fn find_dataview(&self, text: &str) -> Option<(Range<usize>, Finding)> {
        let mut from = 0;
        while let Some(rel) = text[from..].find('[') {
            let open = from + rel;
            from = open + 1;
            if backslashes_before(text, open) % 2 == 1 {
                continue;
            }
            let close = open + 1 + text[open + 1..].find(']')?;
            let inner = &text[open + 1..close];
            if inner.contains('[') {
                continue;
            }
            let Some((key, value)) = inner.split_once("::") else {
                continue;
            };
            if let Some(field) = self.dataview_field(key) {
                return Some((
                    open..close + 1,
                    Finding::Field(field, value.trim().to_string()),
                ));
            }
        }
        None
    }

    fn dataview_field(&self, key: &str) -> Option<MetaField> {
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        MetaField::known(key)
            .or_else(|| self.config.special_prefix(key).cloned())
            .or_else(|| MetaField::from_key(key))
    }

    /* ------------------------------- Emoji ------------------------------- */

    fn find_emoji(&self, text: &str) -> Option<(Range<usize>, Finding)> {
        let mut best: Option<(usize, &str, &MetaField)> = None;
        for (emoji, field) in &self.config.emoji_mapping {
            let Some(pos) = text.find(emoji.as_str()) else {
                continue;
            };
            let better = match best {
                None => true,
                Some((b, e, _)) => pos < b || (pos == b && emoji.len() > e.len()),
            };
            if better {
                best = Some((pos, emoji.as_str(), field));
            }
        }
        let (start, emoji, field) = best?;

        let mut cursor = start + emoji.len();
        if text[cursor..].starts_with(VARIATION_SELECTOR) {
            cursor += VARIATION_SELECTOR.len_utf8();
        }
        let after = &text[cursor..];
        let value_start = cursor + (after.len() - after.trim_start().len());
        let tail = &text[value_start..];

        if *field == MetaField::Priority {
            let token = tail.split_whitespace().next().unwrap_or("");
            if !token.is_empty() && priority_from_str(token).is_some() {
                return Some((
                    start..value_start + token.len(),
                    Finding::Field(MetaField::Priority, token.to_string()),
                ));
            }
            return Some((
                start..cursor,
                Finding::Field(MetaField::Priority, emoji.to_string()),
            ));
        }

        let mut value = tail[..self.emoji_value_len(tail)].trim_end();
        if field.is_date() {
            if let Some(n) = strict_prefix_len(value) {
                value = &value[..n];
            }
        }
        Some((
            start..value_start + value.len(),
            Finding::Field(field.clone(), value.to_string()),
        ))
    }

    /// Where an emoji value ends. File-extension endings stay part of the value.
    fn emoji_value_len(&self, s: &str) -> usize {
        for (i, c) in s.char_indices() {
            let rest = &s[i..];
            if self
                .config
                .emoji_mapping
                .keys()
                .any(|e| rest.starts_with(e.as_str()))
            {
                return i;
            }
            match c {
                '[' | '#' | '@' => return i,
                '.' => {
                    if let Some(m) = FILE_EXT.find(rest) {
                        return i + m.end();
                    }
                }
                _ => {}
            }
        }
        s.len()
    }

    /* -------------------------------- Tags -------------------------------- */

    fn find_tag(&self, text: &str) -> Option<(Range<usize>, Finding)> {
        for (i, _) in text.match_indices('#') {
            if backslashes_before(text, i) % 2 == 1 || !boundary_before(text, i) {
                continue;
            }
            let token = &text[i + 1..i + 1 + token_len(&text[i + 1..], true)];
            if token.chars().all(|c| c == '/') {
                continue;
            }
            let span = i..i + 1 + token.len();
            if let Some((prefix, rest)) = token.split_once('/') {
                if let Some(field) = self.config.special_prefix(prefix) {
                    if !rest.is_empty() {
                        return Some((span, Finding::Field(field.clone(), rest.to_string())));
                    }
                }
            }
            return Some((span, Finding::Tag(normalize_tag(token))));
        }
        None
    }

    /* ----------------------------- Inheritance ----------------------------- */

    /// Fill fields the task lacks from a file-level source. `tags` are merged.
    pub fn inherit(
        &self,
        metadata: &mut TaskMetadata,
        source: &IndexMap<String, serde_json::Value>,
        label: &str,
    ) {
        for (key, value) in source {
            if key == "tags" {
                for tag in tags_from_json(value) {
                    metadata.add_tag(&tag);
                }
                continue;
            }
            if INHERITANCE_BLACKLIST.contains(&key.as_str()) {
                continue;
            }
            let Some(field) = MetaField::from_key(key) else {
                continue;
            };
            if INHERITANCE_BLACKLIST.contains(&field.as_str()) || metadata.contains(&field) {
                continue;
            }
            let value = match MetaValue::try_from(value) {
                Ok(MetaValue::Text(raw)) => self.coerce(&field, &raw).unwrap_or_else(|e| {
                    log::warn!("{label}: {e}");
                    MetaValue::Text(raw)
                }),
                Ok(other) => other,
                Err(e) => {
                    log::warn!("{label}: skipping {key:?}: {e}");
                    continue;
                }
            };
            metadata.set_if_absent(field, value);
        }
    }
}

/* ------------------------------- Helpers ------------------------------- */

fn strip_comments(text: &str, metadata: &mut TaskMetadata) -> String {
    if let Some(caps) = COMMENT.captures(text) {
        let comment = caps.get(1).map_or("", |m| m.as_str()).trim();
        if !comment.is_empty() {
            metadata.set_if_absent(MetaField::Comment, MetaValue::Text(comment.to_string()));
        }
    }
    COMMENT.replace_all(text, " ").into_owned()
}

fn find_context(text: &str) -> Option<(Range<usize>, Finding)> {
    for (i, _) in text.match_indices('@') {
        if !boundary_before(text, i) {
            continue;
        }
        let len = token_len(&text[i + 1..], false);
        if len == 0 {
            continue;
        }
        let token = &text[i + 1..i + 1 + len];
        return Some((
            i..i + 1 + len,
            Finding::Field(MetaField::Context, token.to_string()),
        ));
    }
    None
}

fn backslashes_before(text: &str, pos: usize) -> usize {
    text[..pos].bytes().rev().take_while(|b| *b == b'\\').count()
}

fn is_cjk_punct(c: char) -> bool {
    matches!(
        c,
        '，' | '。' | '、' | '；' | '：' | '？' | '！' | '“' | '”' | '‘' | '’' | '（' | '）'
            | '【' | '】' | '《' | '》' | '「' | '」'
    )
}

/// Start of text, whitespace or punctuation.
fn boundary_before(text: &str, pos: usize) -> bool {
    match text[..pos].chars().next_back() {
        None => true,
        Some(c) => c.is_whitespace() || c.is_ascii_punctuation() || is_cjk_punct(c),
    }
}

fn token_len(s: &str, allow_slash: bool) -> usize {
    s.char_indices()
        .find(|&(_, c)| {
            !(c.is_alphanumeric() || c == '-' || c == '_' || (allow_slash && c == '/'))
        })
        .map_or(s.len(), |(i, _)| i)
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn tags_from_json(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::String(s) => s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Priority from a digit `1`–`5`, a word (`highest` … `lowest`) or a glyph.
pub fn priority_from_str(s: &str) -> Option<i64> {
    let p = match s.trim().to_lowercase().as_str() {
        "5" | "highest" | "🔺" => 5,
        "4" | "high" | "⏫" => 4,
        "3" | "medium" | "🔼" => 3,
        "2" | "low" | "🔽" => 2,
        "1" | "lowest" | "⏬" => 1,
        _ => return None,
    };
    Some(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetadataParseMode;
    use crate::core::local_millis;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn extract_with(cfg: &TaskParserConfig, body: &str) -> Extracted {
        let cache = DateParseCache::new(16);
        MetadataExtractor::new(cfg, &cache).extract(body)
    }

    fn extract(body: &str) -> Extracted {
        extract_with(&TaskParserConfig::default(), body)
    }

    fn millis(y: i32, m: u32, d: u32) -> i64 {
        local_millis(NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap())
            .unwrap()
    }

    #[test]
    fn tag_and_due_date() {
        let out = extract("Write report #urgent 📅 2025-08-15");
        assert_eq!(out.content, "Write report");
        assert_eq!(out.metadata.tags.iter().collect::<Vec<_>>(), vec!["#urgent"]);
        assert_eq!(
            out.metadata.timestamp(&MetaField::DueDate),
            Some(millis(2025, 8, 15))
        );
    }

    #[test]
    fn dataview_fields_are_remapped_and_typed() {
        let out = extract("[project:: Apollo] [priority:: 2] [due:: 2025-01-02] [estimate:: 3h]");
        let m = &out.metadata;
        assert_eq!(m.text(&MetaField::Project), Some("Apollo"));
        assert_eq!(m.priority(), Some(2));
        assert_eq!(m.timestamp(&MetaField::DueDate), Some(millis(2025, 1, 2)));
        assert_eq!(m.text(&MetaField::Custom("estimate".into())), Some("3h"));
        assert_eq!(out.content, "");
    }

    #[test]
    fn priority_words_map_to_integers() {
        let out = extract("Ship [priority:: high]");
        assert_eq!(out.metadata.priority(), Some(4));
    }

    #[test]
    fn earliest_emoji_binds_first() {
        let out = extract("Plan ⏳ 2025-03-01 📅 2025-03-05");
        assert_eq!(
            out.metadata.timestamp(&MetaField::ScheduledDate),
            Some(millis(2025, 3, 1))
        );
        assert_eq!(
            out.metadata.timestamp(&MetaField::DueDate),
            Some(millis(2025, 3, 5))
        );
        assert_eq!(out.content, "Plan");
    }

    #[test]
    fn first_writer_wins_for_repeated_fields() {
        let out = extract("x 📅 2025-03-01 📅 2025-04-01");
        assert_eq!(
            out.metadata.timestamp(&MetaField::DueDate),
            Some(millis(2025, 3, 1))
        );
        assert_eq!(out.content, "x");
    }

    #[test]
    fn text_after_a_sanitized_date_stays_in_content() {
        let out = extract("Call 📅 2025-08-15 after lunch");
        assert_eq!(out.content, "Call after lunch");
        assert!(out.metadata.timestamp(&MetaField::DueDate).is_some());
    }

    #[test]
    fn priority_emoji_defaults_to_glyph_value() {
        let out = extract("Urgent fix ⏫ today");
        assert_eq!(out.metadata.priority(), Some(4));
        assert_eq!(out.content, "Urgent fix today");

        let out = extract("Low 🔽 1");
        assert_eq!(out.metadata.priority(), Some(1));
        assert_eq!(out.content, "Low");
    }

    #[test]
    fn emoji_value_stops_at_tags_and_brackets() {
        let out = extract("Loop 🔁 every week #habit");
        assert_eq!(out.metadata.text(&MetaField::Recurrence), Some("every week"));
        assert!(out.metadata.tags.contains("#habit"));

        let out = extract("Go 🏁 delete[x:: y]");
        assert_eq!(out.metadata.text(&MetaField::OnCompletion), Some("delete"));
    }

    #[test]
    fn emoji_value_keeps_file_extensions() {
        let out = extract("Link 🏁 notes/next.md#Plan more");
        assert_eq!(
            out.metadata.text(&MetaField::OnCompletion),
            Some("notes/next.md#Plan")
        );
        assert_eq!(out.content, "Link more");
    }

    #[test]
    fn depends_on_splits_on_commas() {
        let out = extract("Wait ⛔ abc, def");
        assert_eq!(out.metadata.depends_on(), vec!["abc", "def"]);
    }

    #[test]
    fn escaped_tags_stay_literal() {
        let out = extract(r"Price \#notatag and \\#live");
        assert!(!out.metadata.tags.contains("#notatag"));
        assert!(out.metadata.tags.contains("#live"));
        assert!(out.content.contains(r"\#notatag"));
    }

    #[test]
    fn numeric_tags_follow_the_escape_rule() {
        let out = extract("Fix issue #123 and #2025");
        assert_eq!(
            out.metadata.tags.iter().collect::<Vec<_>>(),
            vec!["#123", "#2025"]
        );
        assert_eq!(out.content, "Fix issue and");

        let out = extract(r"Fix issue \#123");
        assert!(out.metadata.tags.is_empty());
        assert_eq!(out.content, r"Fix issue \#123");
    }

    #[test]
    fn tags_need_a_word_boundary() {
        let out = extract("see page#anchor and mail a@b.com #real");
        assert_eq!(out.metadata.tags.iter().collect::<Vec<_>>(), vec!["#real"]);
        assert!(out.metadata.get(&MetaField::Context).is_none());
        assert_eq!(out.content, "see page#anchor and mail a@b.com");
    }

    #[test]
    fn special_tag_prefix_becomes_a_field() {
        let out = extract("Task #Project/Apollo #area/home #work/deep");
        assert_eq!(out.metadata.text(&MetaField::Project), Some("Apollo"));
        assert_eq!(out.metadata.text(&MetaField::Area), Some("home"));
        assert!(out.metadata.tags.contains("#work/deep"));
    }

    #[test]
    fn context_marker() {
        let out = extract("Buy milk @store");
        assert_eq!(out.metadata.text(&MetaField::Context), Some("store"));
        assert_eq!(out.content, "Buy milk");
    }

    #[test]
    fn comments_are_captured() {
        let out = extract("Task %% remember this %% rest");
        assert_eq!(out.metadata.text(&MetaField::Comment), Some("remember this"));
        assert_eq!(out.content, "Task rest");
    }

    #[test]
    fn modes_gate_syntaxes() {
        let cfg = TaskParserConfig::default().with_metadata_mode(MetadataParseMode::EmojiOnly);
        let out = extract_with(&cfg, "[due:: 2025-01-01] 📅 2025-02-02");
        assert_eq!(
            out.metadata.timestamp(&MetaField::DueDate),
            Some(millis(2025, 2, 2))
        );
        assert_eq!(out.content, "[due:: 2025-01-01]");
    }

    #[test]
    fn mode_none_leaves_fields_but_still_reads_tags() {
        let cfg = TaskParserConfig::default().with_metadata_mode(MetadataParseMode::None);
        let out = extract_with(&cfg, "[due:: 2025-01-01] 📅 2025-02-02 #tag");
        assert!(out.metadata.get(&MetaField::DueDate).is_none());
        assert_eq!(out.metadata.tags.iter().collect::<Vec<_>>(), vec!["#tag"]);
        assert_eq!(out.content, "[due:: 2025-01-01] 📅 2025-02-02");
    }

    #[test]
    fn tags_can_be_switched_off() {
        let cfg = TaskParserConfig {
            parse_tags: false,
            ..TaskParserConfig::default()
        };
        let out = extract_with(&cfg, "Ship #release #project/Apollo [priority:: 2]");
        assert!(out.metadata.tags.is_empty());
        assert!(out.metadata.get(&MetaField::Project).is_none());
        assert_eq!(out.metadata.priority(), Some(2));
        assert_eq!(out.content, "Ship #release #project/Apollo");
    }

    #[test]
    fn unresolvable_dates_stay_as_text() {
        let out = extract("Later 📅 someday");
        assert_eq!(out.metadata.text(&MetaField::DueDate), Some("someday"));
    }

    #[test]
    fn guard_bounds_the_strip_loop() {
        let mut cfg = TaskParserConfig::default();
        cfg.limits.max_metadata_iterations = 2;
        let out = extract_with(&cfg, "a #one #two #three #four");
        assert_eq!(out.metadata.tags.len(), 2);
        assert_eq!(out.content, "a #three #four");
    }

    #[test]
    fn inheritance_respects_blacklist_and_existing_fields() {
        let cfg = TaskParserConfig::default();
        let cache = DateParseCache::new(4);
        let ex = MetadataExtractor::new(&cfg, &cache);
        let mut meta = extract("x [project:: Mine]").metadata;
        let fm: IndexMap<String, serde_json::Value> = serde_json::from_value(serde_json::json!({
            "project": "Theirs",
            "id": "nope",
            "due": "2025-05-05",
            "tags": ["fm", "#other"],
            "nested": { "a": 1 },
            "owner": "sam"
        }))
        .unwrap();
        ex.inherit(&mut meta, &fm, "frontmatter");
        assert_eq!(meta.text(&MetaField::Project), Some("Mine"));
        assert!(meta.get(&MetaField::Id).is_none());
        assert_eq!(meta.timestamp(&MetaField::DueDate), Some(millis(2025, 5, 5)));
        assert!(meta.tags.contains("#fm") && meta.tags.contains("#other"));
        assert!(meta.get(&MetaField::Custom("nested".into())).is_none());
        assert_eq!(meta.text(&MetaField::Custom("owner".into())), Some("sam"));
    }
}
