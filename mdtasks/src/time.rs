//! Clock-time extraction and role classification.
//!
//! Four regex families are scanned in precedence order (12h ranges, 24h ranges,
//! 12h singles, 24h singles). Every accepted match claims its span; a later match
//! overlapping a claim is dropped, so a 12h time is never also read as a bare
//! 24h time. Each match gets a role from the text around it:
//! - emoji markers (`🛫` start, `📅` due, `⏳` scheduled), nearest first;
//! - then keyword lists, start before scheduled before due;
//! - then `at`/`@` means scheduled, anything else due.

use crate::config::TimeParsingConfig;
use crate::core::{TimeComponent, TimeComponents, TimeParseError, TimeParseErrorKind, TimeRole};
use crate::dates::{ClaimedSpans, DateExpressionParser, DateMatch, EnglishDateParser};
use crate::locale_zh::{ChineseDateParser, contains_cjk};
use crate::metadata::collapse_whitespace;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::ops::RangeInclusive;
use std::sync::LazyLock;

/// Characters looked at before a match when classifying it.
pub const CONTEXT_BEFORE: usize = 200;
/// Characters looked at after a match when classifying it.
pub const CONTEXT_AFTER: usize = 20;

static RANGE_12H: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?-u:\b)([0-9]{1,2}):([0-9]{2})(?::([0-9]{2}))?(?:[ \t]*(am|pm))?[ \t]*[-~～][ \t]*([0-9]{1,2}):([0-9]{2})(?::([0-9]{2}))?[ \t]*(am|pm)(?-u:\b)",
    )
    .unwrap()
});

static RANGE_24H: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?-u:\b)([0-9]{1,2}):([0-9]{2})(?::([0-9]{2}))?[ \t]*[-~～][ \t]*([0-9]{1,2}):([0-9]{2})(?::([0-9]{2}))?(?-u:\b)")
        .unwrap()
});

static SINGLE_12H: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?-u:\b)([0-9]{1,2}):([0-9]{2})(?::([0-9]{2}))?[ \t]*(am|pm)(?-u:\b)").unwrap()
});

static SINGLE_24H: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?-u:\b)([0-9]{1,2}):([0-9]{2})(?::([0-9]{2}))?(?-u:\b)").unwrap());

static AT_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?-u:\b)at(?-u:\b)|@").unwrap());

static SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([,.;:!?，。；：！？])").unwrap());

const EMOJI_ROLES: [(&str, TimeRole); 3] = [
    ("🛫", TimeRole::Start),
    ("📅", TimeRole::Due),
    ("⏳", TimeRole::Scheduled),
];

/* ------------------------------- Results ------------------------------- */

/// Output of [`TimeParsingService::parse_time_components`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeComponentsResult {
    pub time_components: TimeComponents,
    pub errors: Vec<TimeParseError>,
    pub warnings: Vec<String>,
}

/// A recognized date or time expression. `index` and `length` are in bytes.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeExpression {
    pub text: String,
    pub date: NaiveDateTime,
    #[serde(rename = "type")]
    pub kind: TimeRole,
    pub index: usize,
    pub length: usize,
    pub time_component: Option<TimeComponent>,
    /// Closing half when the expression is a range; `time_component` holds the opening half.
    pub range_end: Option<TimeComponent>,
}

/// Output of [`TimeParsingService::parse_time_expressions`].
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTimeResult {
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub scheduled_date: Option<NaiveDate>,
    pub cleaned_text: String,
    pub expressions: Vec<TimeExpression>,
    pub time_components: Option<TimeComponents>,
    #[serde(default)]
    pub errors: Vec<TimeParseError>,
}

impl ParsedTimeResult {
    pub fn date_for(&self, role: TimeRole) -> Option<NaiveDate> {
        match role {
            TimeRole::Start => self.start_date,
            TimeRole::Due => self.due_date,
            TimeRole::Scheduled => self.scheduled_date,
        }
    }

    fn date_slot(&mut self, role: TimeRole) -> &mut Option<NaiveDate> {
        match role {
            TimeRole::Start => &mut self.start_date,
            TimeRole::Due => &mut self.due_date,
            TimeRole::Scheduled => &mut self.scheduled_date,
        }
    }
}

/* ------------------------------- Matches ------------------------------- */

#[derive(Debug, Clone, PartialEq)]
enum MatchKind {
    Single(TimeComponent),
    Range(TimeComponent, TimeComponent),
}

#[derive(Debug, Clone, PartialEq)]
struct TimeMatch {
    start: usize,
    end: usize,
    role: TimeRole,
    kind: MatchKind,
}

#[derive(Debug, Clone, Copy)]
enum Family {
    Range12,
    Range24,
    Single12,
    Single24,
}

impl Family {
    const ORDER: [Family; 4] = [
        Family::Range12,
        Family::Range24,
        Family::Single12,
        Family::Single24,
    ];

    fn regex(self) -> &'static Regex {
        match self {
            Family::Range12 => &RANGE_12H,
            Family::Range24 => &RANGE_24H,
            Family::Single12 => &SINGLE_12H,
            Family::Single24 => &SINGLE_24H,
        }
    }
}

/// Why a matched token did not yield a time as written.
struct Invalid {
    message: String,
    fallback: Option<MatchKind>,
}

/* ------------------------------- Keywords ------------------------------- */

/// ASCII keywords match on word boundaries, others by substring.
struct KeywordSet {
    ascii: Option<Regex>,
    other: Vec<String>,
}

impl KeywordSet {
    fn new(words: &[String]) -> Self {
        let (ascii, other): (Vec<String>, Vec<String>) = words
            .iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .partition(|w| w.is_ascii());
        let ascii = if ascii.is_empty() {
            None
        } else {
            let alternation = ascii
                .iter()
                .map(|w| regex::escape(w))
                .collect::<Vec<_>>()
                .join("|");
            Regex::new(&format!(r"(?-u:\b)(?:{alternation})(?-u:\b)"))
                .map_err(|e| log::warn!("ignoring keyword list: {e}"))
                .ok()
        };
        Self { ascii, other }
    }

    fn matches(&self, lowered: &str) -> bool {
        self.ascii.as_ref().is_some_and(|re| re.is_match(lowered))
            || self.other.iter().any(|w| lowered.contains(w.as_str()))
    }
}

/* ------------------------------- Service ------------------------------- */

pub struct TimeParsingService {
    config: TimeParsingConfig,
    start_keywords: KeywordSet,
    due_keywords: KeywordSet,
    scheduled_keywords: KeywordSet,
    primary: Box<dyn DateExpressionParser>,
    fallback: ChineseDateParser,
}

impl TimeParsingService {
    pub fn new(config: TimeParsingConfig) -> Self {
        let kw = &config.date_keywords;
        Self {
            start_keywords: KeywordSet::new(&kw.start),
            due_keywords: KeywordSet::new(&kw.due),
            scheduled_keywords: KeywordSet::new(&kw.scheduled),
            primary: Box::new(EnglishDateParser),
            fallback: ChineseDateParser,
            config,
        }
    }

    /// Replace the primary natural-language date parser.
    pub fn with_primary<P: DateExpressionParser + 'static>(mut self, parser: P) -> Self {
        self.primary = Box::new(parser);
        self
    }

    pub fn config(&self) -> &TimeParsingConfig {
        &self.config
    }

    /// Clock times in `text`, keyed by role.
    pub fn parse_time_components(&self, text: &str) -> TimeComponentsResult {
        let mut result = TimeComponentsResult::default();
        if !self.config.enabled {
            return result;
        }
        let (matches, errors) = self.scan_times(text);
        result.errors = errors;
        for m in &matches {
            assign(&mut result.time_components, &mut result.warnings, text, m);
        }
        finish_components(&mut result.time_components);
        result
    }

    /// Dates and times in `text` relative to `today`, plus the text with them removed
    /// when `remove_original_text` is set.
    pub fn parse_time_expressions(&self, text: &str, today: NaiveDate) -> ParsedTimeResult {
        let mut result = ParsedTimeResult {
            cleaned_text: text.to_string(),
            ..ParsedTimeResult::default()
        };
        if !self.config.enabled {
            return result;
        }

        let segments: Vec<(usize, &str)> = if self.config.per_line_processing {
            let mut offset = 0;
            text.split('\n')
                .map(|line| {
                    let seg = (offset, line);
                    offset += line.len() + 1;
                    seg
                })
                .collect()
        } else {
            vec![(0, text)]
        };

        let mut components = TimeComponents::default();
        let mut warnings = Vec::new();
        let mut cleaned = Vec::with_capacity(segments.len());

        for (offset, seg) in segments {
            let mut spans = Vec::new();

            for d in self.find_dates(seg, today) {
                let role = self.determine_time_context(seg, d.index, d.end());
                result.date_slot(role).get_or_insert(d.date);
                spans.push((with_leading_particle(seg, d.index), d.end()));
                result.expressions.push(TimeExpression {
                    date: d.date.and_time(NaiveTime::MIN),
                    kind: role,
                    index: offset + d.index,
                    length: d.text.len(),
                    text: d.text,
                    time_component: None,
                    range_end: None,
                });
            }

            let (times, errors) = self.scan_times(seg);
            result.errors.extend(errors.into_iter().map(|mut e| {
                e.position += offset;
                e
            }));
            for m in times {
                assign(&mut components, &mut warnings, seg, &m);
                spans.push((with_leading_particle(seg, m.start), m.end));
                let (first, range_end) = match m.kind {
                    MatchKind::Single(c) => (c, None),
                    MatchKind::Range(s, e) => (s, Some(e)),
                };
                let time = first.to_naive_time().unwrap_or(NaiveTime::MIN);
                let date = result.date_for(m.role).unwrap_or(today);
                result.expressions.push(TimeExpression {
                    text: seg[m.start..m.end].to_string(),
                    date: date.and_time(time),
                    kind: m.role,
                    index: offset + m.start,
                    length: m.end - m.start,
                    time_component: Some(first),
                    range_end,
                });
            }

            cleaned.push(if self.config.remove_original_text {
                remove_spans(seg, spans)
            } else {
                seg.to_string()
            });
        }

        for w in warnings {
            log::debug!("time parsing: {w}");
        }
        finish_components(&mut components);
        result.expressions.sort_by_key(|e| e.index);
        result.cleaned_text = cleaned.join("\n");
        result.time_components = (!components.is_empty()).then_some(components);
        result
    }

    fn find_dates(&self, text: &str, today: NaiveDate) -> Vec<DateMatch> {
        let found = self.primary.parse(text, today);
        if found.is_empty() && self.config.supports("zh") && contains_cjk(text) {
            return self.fallback.parse(text, today);
        }
        found
    }

    /// Role of the expression spanning `start..end` (byte offsets into `text`).
    pub fn determine_time_context(&self, text: &str, start: usize, end: usize) -> TimeRole {
        let back = text[..start]
            .char_indices()
            .rev()
            .nth(CONTEXT_BEFORE - 1)
            .map_or(0, |(i, _)| i);
        let fwd = text[end..]
            .char_indices()
            .nth(CONTEXT_AFTER)
            .map_or(text.len(), |(i, _)| end + i);

        if let Some(role) = emoji_role(&text[back..start], &text[end..fwd]) {
            return role;
        }

        let window = text[back..fwd].to_lowercase();
        if self.start_keywords.matches(&window) {
            TimeRole::Start
        } else if self.scheduled_keywords.matches(&window) {
            TimeRole::Scheduled
        } else if self.due_keywords.matches(&window) {
            TimeRole::Due
        } else if AT_MARKER.is_match(&window) {
            TimeRole::Scheduled
        } else {
            TimeRole::Due
        }
    }

    fn scan_times(&self, text: &str) -> (Vec<TimeMatch>, Vec<TimeParseError>) {
        let mut claimed = ClaimedSpans::default();
        let mut found = Vec::new();
        let mut errors = Vec::new();

        for family in Family::ORDER {
            for caps in family.regex().captures_iter(text) {
                let Some(m) = caps.get(0) else { continue };
                if rejected(text, m.start(), m.end()) || !claimed.try_claim(m.start(), m.end())
                {
                    continue;
                }
                let kind = match build(family, &caps) {
                    Ok(kind) => kind,
                    Err(invalid) => {
                        errors.push(TimeParseError {
                            kind: TimeParseErrorKind::InvalidFormat,
                            original_text: m.as_str().to_string(),
                            position: m.start(),
                            message: invalid.message,
                            fallback_used: invalid.fallback.is_some(),
                        });
                        match invalid.fallback {
                            Some(kind) => kind,
                            None => continue,
                        }
                    }
                };
                found.push(TimeMatch {
                    start: m.start(),
                    end: m.end(),
                    role: self.determine_time_context(text, m.start(), m.end()),
                    kind,
                });
            }
        }

        found.sort_by_key(|m| m.start);
        (found, errors)
    }
}

impl Default for TimeParsingService {
    fn default() -> Self {
        Self::new(TimeParsingConfig::default())
    }
}

/* ------------------------------- Helpers ------------------------------- */

/// A match followed by `:digit` is part of a longer token; one touching `--` is a separator.
fn rejected(text: &str, start: usize, end: usize) -> bool {
    let after = &text[end..];
    let mut chars = after.chars();
    if chars.next() == Some(':') && chars.next().is_some_and(|c| c.is_ascii_digit()) {
        return true;
    }
    text[..start].ends_with("--") || after.starts_with("--")
}

fn emoji_role(before: &str, after: &str) -> Option<TimeRole> {
    let nearest_before = EMOJI_ROLES
        .iter()
        .filter_map(|(e, role)| before.rfind(e).map(|pos| (pos, *role)))
        .max_by_key(|(pos, _)| *pos);
    if let Some((_, role)) = nearest_before {
        return Some(role);
    }
    EMOJI_ROLES
        .iter()
        .filter_map(|(e, role)| after.find(e).map(|pos| (pos, *role)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, role)| role)
}

fn num(caps: &Captures<'_>, i: usize) -> Option<u32> {
    caps.get(i).and_then(|m| m.as_str().parse().ok())
}

/// Text spanned by the capture groups in `groups`, first present to last present.
fn group_text<'t>(caps: &Captures<'t>, groups: RangeInclusive<usize>) -> &'t str {
    let Some(whole) = caps.get(0) else { return "" };
    let present: Vec<_> = groups.filter_map(|i| caps.get(i)).collect();
    match (present.first(), present.last()) {
        (Some(first), Some(last)) => {
            &whole.as_str()[first.start() - whole.start()..last.end() - whole.start()]
        }
        _ => whole.as_str(),
    }
}

fn build(family: Family, caps: &Captures<'_>) -> Result<MatchKind, Invalid> {
    let text = caps.get(0).map_or("", |m| m.as_str());
    match family {
        Family::Single24 => clock_24h(caps, 1, text).map(MatchKind::Single),
        Family::Single12 => clock_12h(caps, 1, is_pm(caps, 4), text).map(MatchKind::Single),
        Family::Range24 => {
            let start = clock_24h(caps, 1, group_text(caps, 1..=3))?;
            let end = clock_24h(caps, 4, group_text(caps, 4..=6))?;
            let (s, e) = TimeComponent::link_range(start, end);
            Ok(MatchKind::Range(s, e))
        }
        Family::Range12 => {
            // A half-valid range is not a time; never fall back to one of its halves.
            let strict = |mut invalid: Invalid| {
                invalid.fallback = None;
                invalid
            };
            let (start_text, end_text) = (group_text(caps, 1..=4), group_text(caps, 5..=8));
            let end_pm = is_pm(caps, 8);
            let end = clock_12h(caps, 5, end_pm, end_text).map_err(strict)?;
            let start = match caps.get(4) {
                Some(_) => clock_12h(caps, 1, is_pm(caps, 4), start_text).map_err(strict)?,
                None => {
                    // "9:00-11:00 am": the start shares the end's meridiem unless that
                    // would put it after the end ("11:00-1:00 pm").
                    let same = clock_12h(caps, 1, end_pm, start_text).map_err(strict)?;
                    if end_pm && same.hour > end.hour {
                        clock_12h(caps, 1, false, start_text).map_err(strict)?
                    } else {
                        same
                    }
                }
            };
            let (s, e) = TimeComponent::link_range(start, end);
            Ok(MatchKind::Range(s, e))
        }
    }
}

fn is_pm(caps: &Captures<'_>, i: usize) -> bool {
    caps.get(i)
        .is_some_and(|m| m.as_str().eq_ignore_ascii_case("pm"))
}

fn clock_24h(caps: &Captures<'_>, at: usize, text: &str) -> Result<TimeComponent, Invalid> {
    let (h, m) = (num(caps, at).unwrap_or(99), num(caps, at + 1).unwrap_or(99));
    let s = num(caps, at + 2);
    TimeComponent::new(h, m, s, text).ok_or_else(|| Invalid {
        message: format!("{h}:{m:02} is not a valid time of day"),
        fallback: None,
    })
}

/// An hour outside 1–12 that is still a valid 24-hour time is returned as the fallback.
fn clock_12h(caps: &Captures<'_>, at: usize, pm: bool, text: &str) -> Result<TimeComponent, Invalid> {
    let (h, m) = (num(caps, at).unwrap_or(99), num(caps, at + 1).unwrap_or(99));
    let s = num(caps, at + 2);
    if (1..=12).contains(&h) {
        let hour = if pm { h % 12 + 12 } else { h % 12 };
        if let Some(c) = TimeComponent::new(hour, m, s, text) {
            return Ok(c);
        }
    }
    match TimeComponent::new(h, m, s, text) {
        // "13:00 pm": read as a 24-hour time.
        Some(c) => Err(Invalid {
            message: format!("{h}:{m:02} is not a 12-hour time; read as 24-hour"),
            fallback: Some(MatchKind::Single(c)),
        }),
        None => Err(Invalid {
            message: format!("{h}:{m:02} is not a valid time of day"),
            fallback: None,
        }),
    }
}

fn assign(components: &mut TimeComponents, warnings: &mut Vec<String>, text: &str, m: &TimeMatch) {
    let original = &text[m.start..m.end];
    match &m.kind {
        MatchKind::Single(c) => {
            let slot = components.slot_mut(m.role);
            if slot.is_none() {
                *slot = Some(c.clone());
            } else {
                warnings.push(format!("ignored extra {:?} time {original:?}", m.role));
            }
        }
        MatchKind::Range(s, e) => {
            if components.start_time.is_some() || components.end_time.is_some() {
                warnings.push(format!("ignored extra range {original:?}"));
                return;
            }
            components.start_time = Some(s.clone());
            components.end_time = Some(e.clone());
            if m.role != TimeRole::Start {
                components.slot_mut(m.role).get_or_insert_with(|| s.clone());
            }
        }
    }
}

/// A start time with no scheduled time is also the scheduled time.
fn finish_components(components: &mut TimeComponents) {
    if components.scheduled_time.is_none() {
        components.scheduled_time = components.start_time.clone();
    }
}

/// Start of a removable span, widened over a directly preceding `at`, `on` or `@`.
fn with_leading_particle(text: &str, start: usize) -> usize {
    let before = text[..start].trim_end_matches([' ', '\t']);
    if let Some(rest) = before.strip_suffix('@') {
        return rest.len();
    }
    for word in ["at", "on"] {
        let Some(cut) = before.len().checked_sub(word.len()) else {
            continue;
        };
        let standalone = before
            .get(..cut)
            .is_some_and(|rest| rest.chars().next_back().is_none_or(char::is_whitespace));
        if standalone && before.get(cut..).is_some_and(|w| w.eq_ignore_ascii_case(word)) {
            return cut;
        }
    }
    start
}

fn remove_spans(text: &str, mut spans: Vec<(usize, usize)>) -> String {
    spans.sort_unstable();
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end) in spans {
        if end <= cursor {
            continue;
        }
        let start = start.max(cursor);
        out.push_str(&text[cursor..start]);
        out.push(' ');
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    let out = collapse_whitespace(&out);
    let out = SPACE_BEFORE_PUNCT.replace_all(&out, "$1");
    out.trim_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '，' | '；'))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn service() -> TimeParsingService {
        TimeParsingService::default()
    }

    fn hm(c: &Option<TimeComponent>) -> Option<(u32, u32)> {
        c.as_ref().map(|c| (c.hour, c.minute))
    }

    #[test]
    fn range_without_context_is_due() {
        let r = service().parse_time_components("Meeting 14:00-15:30");
        let tc = &r.time_components;
        assert_eq!(hm(&tc.start_time), Some((14, 0)));
        assert_eq!(hm(&tc.end_time), Some((15, 30)));
        assert_eq!(hm(&tc.due_time), Some((14, 0)));
        let start = tc.start_time.as_ref().unwrap();
        assert!(start.is_range);
        assert_eq!(start.range_partner.as_ref().unwrap().hour, 15);
        assert!(r.errors.is_empty());
    }

    #[rstest]
    #[case("Standup 🛫 9:30", TimeRole::Start)]
    #[case("📅 2025-08-15 17:00", TimeRole::Due)]
    #[case("Dentist ⏳ tomorrow 10:15", TimeRole::Scheduled)]
    #[case("Begin work 08:00", TimeRole::Start)]
    #[case("Submit before 18:00", TimeRole::Due)]
    #[case("Lunch at 12:30", TimeRole::Scheduled)]
    #[case("开始 09:00", TimeRole::Start)]
    #[case("Call 16:00", TimeRole::Due)]
    fn roles_from_context(#[case] text: &str, #[case] role: TimeRole) {
        let s = service();
        let r = s.parse_time_expressions(text, NaiveDate::from_ymd_opt(2025, 8, 13).unwrap());
        let time = r
            .expressions
            .iter()
            .find(|e| e.time_component.is_some())
            .unwrap();
        assert_eq!(time.kind, role, "{text}");
    }

    #[test]
    fn emoji_far_before_the_time_still_counts() {
        let padding = "x".repeat(150);
        let text = format!("🛫 {padding} 10:00");
        let r = service().parse_time_components(&text);
        assert_eq!(hm(&r.time_components.start_time), Some((10, 0)));
    }

    #[test]
    fn nearest_emoji_before_wins() {
        let r = service().parse_time_components("🛫 2025-01-01 📅 2025-01-02 18:00");
        assert_eq!(hm(&r.time_components.due_time), Some((18, 0)));
        assert!(r.time_components.start_time.is_none());
    }

    #[test]
    fn twelve_hour_times_are_not_double_counted() {
        let r = service().parse_time_components("Call at 3:30 PM");
        assert_eq!(hm(&r.time_components.scheduled_time), Some((15, 30)));
        assert!(r.time_components.due_time.is_none());
        let (matches, _) = service().scan_times("Call at 3:30 PM");
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn twelve_hour_range_shares_the_meridiem() {
        let r = service().parse_time_components("Workshop 9:00-11:30 am");
        assert_eq!(hm(&r.time_components.start_time), Some((9, 0)));
        assert_eq!(hm(&r.time_components.end_time), Some((11, 30)));

        let r = service().parse_time_components("Shift 11:00-1:00 pm");
        assert_eq!(hm(&r.time_components.start_time), Some((11, 0)));
        assert_eq!(hm(&r.time_components.end_time), Some((13, 0)));
    }

    #[test]
    fn seconds_and_full_width_tilde() {
        let r = service().parse_time_components("会议 10:00:30～11:00");
        let start = r.time_components.start_time.unwrap();
        assert_eq!((start.hour, start.second), (10, Some(30)));
    }

    #[rstest]
    #[case("build 1:30:45:12")]
    #[case("ratio 10:00--11:00")]
    fn rejected_tokens(#[case] text: &str) {
        let r = service().parse_time_components(text);
        assert!(r.time_components.is_empty(), "{text}");
    }

    #[test]
    fn invalid_times_produce_diagnostics() {
        let r = service().parse_time_components("at 25:61 maybe");
        assert!(r.time_components.is_empty());
        assert_eq!(r.errors.len(), 1);
        let e = &r.errors[0];
        assert_eq!(e.kind, TimeParseErrorKind::InvalidFormat);
        assert_eq!(e.original_text, "25:61");
        assert_eq!(e.position, 3);
        assert!(!e.fallback_used);
    }

    #[test]
    fn impossible_meridiem_falls_back_to_24h() {
        let r = service().parse_time_components("Call 15:00 pm");
        assert_eq!(hm(&r.time_components.due_time), Some((15, 0)));
        assert_eq!(r.errors.len(), 1);
        assert!(r.errors[0].fallback_used);
    }

    #[test]
    fn start_time_doubles_as_scheduled_time() {
        let r = service().parse_time_components("start 07:45");
        assert_eq!(hm(&r.time_components.scheduled_time), Some((7, 45)));
    }

    #[test]
    fn expressions_remove_original_text() {
        let today = NaiveDate::from_ymd_opt(2025, 8, 13).unwrap();
        let r = service().parse_time_expressions("Dentist tomorrow at 10:00, bring card", today);
        assert_eq!(r.scheduled_date, NaiveDate::from_ymd_opt(2025, 8, 14));
        assert_eq!(r.cleaned_text, "Dentist, bring card");
        assert_eq!(r.expressions.len(), 2);
        assert_eq!(r.expressions[1].date.to_string(), "2025-08-14 10:00:00");
    }

    #[test]
    fn per_line_offsets_are_document_relative() {
        let today = NaiveDate::from_ymd_opt(2025, 8, 13).unwrap();
        let r = service().parse_time_expressions("first line\ndue 09:00", today);
        assert_eq!(r.expressions.len(), 1);
        assert_eq!(r.expressions[0].index, 15);
        assert_eq!(r.cleaned_text, "first line\ndue");
    }

    #[test]
    fn chinese_fallback_only_when_primary_is_empty() {
        let today = NaiveDate::from_ymd_opt(2025, 8, 13).unwrap();
        let r = service().parse_time_expressions("下周三 截止", today);
        assert_eq!(r.due_date, NaiveDate::from_ymd_opt(2025, 8, 20));

        let mut cfg = TimeParsingConfig::default();
        cfg.supported_languages = vec!["en".into()];
        let r = TimeParsingService::new(cfg).parse_time_expressions("下周三 截止", today);
        assert!(r.expressions.is_empty());
    }

    #[test]
    fn disabled_service_returns_text_untouched() {
        let cfg = TimeParsingConfig {
            enabled: false,
            ..TimeParsingConfig::default()
        };
        let r = TimeParsingService::new(cfg).parse_time_expressions("at 10:00", NaiveDate::MIN);
        assert_eq!(r.cleaned_text, "at 10:00");
        assert!(r.expressions.is_empty());
    }

    struct Fixed;

    impl DateExpressionParser for Fixed {
        fn parse(&self, text: &str, today: NaiveDate) -> Vec<DateMatch> {
            text.find("someday")
                .map(|index| DateMatch {
                    text: "someday".into(),
                    index,
                    date: today,
                })
                .into_iter()
                .collect()
        }
    }

    #[test]
    fn primary_parser_is_pluggable() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let s = TimeParsingService::default().with_primary(Fixed);
        let r = s.parse_time_expressions("ship someday", today);
        assert_eq!(r.due_date, Some(today));
        assert_eq!(r.cleaned_text, "ship");
    }

    #[rstest]
    #[case("开始09:00", Some((9, 0)), None)]
    #[case("明天14:00开会", None, Some((14, 0)))]
    #[case("下午3:30pm开会", None, Some((15, 30)))]
    fn times_touching_cjk_text(
        #[case] text: &str,
        #[case] start: Option<(u32, u32)>,
        #[case] due: Option<(u32, u32)>,
    ) {
        let r = service().parse_time_components(text);
        assert_eq!(hm(&r.time_components.start_time), start, "{text}");
        assert_eq!(hm(&r.time_components.due_time), due, "{text}");
    }

    #[test]
    fn range_touching_cjk_text_keeps_both_halves() {
        let r = service().parse_time_components("会议14:00-15:30讨论");
        assert_eq!(hm(&r.time_components.start_time), Some((14, 0)));
        assert_eq!(hm(&r.time_components.end_time), Some((15, 30)));
        let (matches, _) = service().scan_times("会议14:00-15:30讨论");
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn range_halves_carry_their_own_text() {
        let r = service().parse_time_components("Shift 9:00 am - 5:30 pm");
        let tc = r.time_components;
        assert_eq!(tc.start_time.as_ref().unwrap().original_text, "9:00 am");
        assert_eq!(tc.end_time.as_ref().unwrap().original_text, "5:30 pm");

        let r = service().parse_time_components("Meeting 14:00-15:30:15");
        let tc = r.time_components;
        assert_eq!(tc.start_time.as_ref().unwrap().original_text, "14:00");
        assert_eq!(tc.end_time.as_ref().unwrap().original_text, "15:30:15");
    }

    #[test]
    fn leading_particles_go_with_the_removed_text() {
        let today = NaiveDate::from_ymd_opt(2025, 8, 13).unwrap();
        let r = service().parse_time_expressions("Read chapter at 10:00 today", today);
        assert_eq!(r.cleaned_text, "Read chapter");
        let r = service().parse_time_expressions("Sync @ 9:15 with Ann", today);
        assert_eq!(r.cleaned_text, "Sync with Ann");
        let r = service().parse_time_expressions("Chat 10:00", today);
        assert_eq!(r.cleaned_text, "Chat");
    }

    #[test]
    fn original_text_can_be_kept() {
        let cfg = TimeParsingConfig {
            remove_original_text: false,
            ..TimeParsingConfig::default()
        };
        let today = NaiveDate::from_ymd_opt(2025, 8, 13).unwrap();
        let r = TimeParsingService::new(cfg).parse_time_expressions("Lunch at 12:30 tomorrow", today);
        assert_eq!(r.cleaned_text, "Lunch at 12:30 tomorrow");
        assert_eq!(r.expressions.len(), 2);
        assert_eq!(r.scheduled_date, NaiveDate::from_ymd_opt(2025, 8, 14));
    }

    #[test]
    fn whole_text_context_spans_lines() {
        let today = NaiveDate::from_ymd_opt(2025, 8, 13).unwrap();
        let text = "start here\nmeeting 09:00";

        let r = service().parse_time_expressions(text, today);
        assert_eq!(r.expressions[0].kind, TimeRole::Due);
        assert_eq!(r.cleaned_text, "start here\nmeeting");

        let cfg = TimeParsingConfig {
            per_line_processing: false,
            ..TimeParsingConfig::default()
        };
        let r = TimeParsingService::new(cfg).parse_time_expressions(text, today);
        assert_eq!(r.expressions[0].kind, TimeRole::Start);
        assert_eq!(r.expressions[0].index, 19);
        assert_eq!(r.cleaned_text, "start here meeting");
    }
}
