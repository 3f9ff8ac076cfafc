//! Calendar date resolution.
//!
//! Two layers:
//! - a strict `YYYY-MM-DD[ HH:MM]` grammar (nom) plus user formats, memoized through
//!   [`DateParseCache`]; used for metadata values.
//! - natural-language expression scanners implementing [`DateExpressionParser`]; used
//!   on free text relative to a reference day.

use crate::cache::DateParseCache;
use crate::core::local_millis;
use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use nom::{
    IResult,
    bytes::complete::take_while_m_n,
    character::complete::{char, one_of},
    combinator::{map_res, opt},
    error::VerboseError,
    sequence::{preceded, tuple},
};
use regex::{Captures, Regex};
use std::sync::LazyLock;

type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/* --------------------------- Strict grammar --------------------------- */

fn digits(min: usize, max: usize) -> impl Fn(&str) -> PResult<'_, u32> {
    move |i: &str| {
        map_res(
            take_while_m_n(min, max, |c: char| c.is_ascii_digit()),
            str::parse::<u32>,
        )(i)
    }
}

pub fn strict_date(i: &str) -> PResult<'_, NaiveDate> {
    map_res(
        tuple((
            map_res(take_while_m_n(4, 4, |c: char| c.is_ascii_digit()), str::parse::<i32>),
            char('-'),
            digits(2, 2),
            char('-'),
            digits(2, 2),
        )),
        |(y, _, m, _, d)| NaiveDate::from_ymd_opt(y, m, d).ok_or("invalid date"),
    )(i)
}

pub fn strict_time(i: &str) -> PResult<'_, NaiveTime> {
    map_res(
        tuple((digits(1, 2), char(':'), digits(2, 2))),
        |(h, _, m)| NaiveTime::from_hms_opt(h, m, 0).ok_or("invalid time"),
    )(i)
}

/// Date with an optional ` HH:MM` (or `THH:MM`) suffix.
pub fn strict_date_time(i: &str) -> PResult<'_, (NaiveDate, Option<NaiveTime>)> {
    let (i, date) = strict_date(i)?;
    let (i, time) = opt(preceded(one_of(" T"), strict_time))(i)?;
    Ok((i, (date, time)))
}

/// Byte length of the strict date prefix of `s`, if it starts with one.
pub fn strict_prefix_len(s: &str) -> Option<usize> {
    strict_date_time(s).ok().map(|(rest, _)| s.len() - rest.len())
}

/// The whole (trimmed) string as a strict date or date-time.
pub fn parse_strict(s: &str) -> Option<(NaiveDate, Option<NaiveTime>)> {
    match strict_date_time(s.trim()) {
        Ok(("", parsed)) => Some(parsed),
        _ => None,
    }
}

/// Resolve a metadata date string to local epoch millis.
///
/// Only context-free forms are accepted here (strict grammar and `formats`), so a
/// cached answer never depends on the current day.
pub fn resolve_date_string(text: &str, formats: &[String], cache: &DateParseCache) -> Option<i64> {
    let text = text.trim();
    cache.get_or_resolve(text, formats, || {
        if let Some((date, time)) = parse_strict(text) {
            return local_millis(date.and_time(time.unwrap_or(NaiveTime::MIN)));
        }
        formats.iter().find_map(|fmt| {
            NaiveDateTime::parse_from_str(text, fmt)
                .ok()
                .or_else(|| {
                    NaiveDate::parse_from_str(text, fmt)
                        .ok()
                        .map(|d| d.and_time(NaiveTime::MIN))
                })
                .and_then(local_millis)
        })
    })
}

/* ------------------------- Expression scanning ------------------------- */

/// A date expression found in free text. `index` is a byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateMatch {
    pub text: String,
    pub index: usize,
    pub date: NaiveDate,
}

impl DateMatch {
    pub fn end(&self) -> usize {
        self.index + self.text.len()
    }
}

/// Anything that can find dated expressions in text relative to `today`.
pub trait DateExpressionParser: Send + Sync {
    fn parse(&self, text: &str, today: NaiveDate) -> Vec<DateMatch>;
}

/// Byte spans already consumed by a more specific pattern.
#[derive(Debug, Default, Clone)]
pub struct ClaimedSpans(Vec<(usize, usize)>);

impl ClaimedSpans {
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.0.iter().any(|&(s, e)| start < e && s < end)
    }

    pub fn claim(&mut self, start: usize, end: usize) {
        self.0.push((start, end));
    }

    /// Claim the span unless it overlaps an existing claim.
    pub fn try_claim(&mut self, start: usize, end: usize) -> bool {
        if self.overlaps(start, end) {
            return false;
        }
        self.claim(start, end);
        true
    }
}

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap());

static IN_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bin\s+(\d+|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve)\s+(days?|weeks?|months?|years?)\b",
    )
    .unwrap()
});

static NEXT_UNIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bnext\s+(week|month|year|monday|tuesday|wednesday|thursday|friday|saturday|sunday|mon|tue|wed|thu|fri|sat|sun)\b",
    )
    .unwrap()
});

static RELATIVE_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(today|tonight|tomorrow|yesterday)\b").unwrap());

static BARE_WEEKDAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b").unwrap()
});

type Resolver = fn(&Captures<'_>, NaiveDate) -> Option<NaiveDate>;

/// English relative and absolute dates: ISO dates, `today`/`tomorrow`/`yesterday`,
/// `next week|month|year|<weekday>`, `in N days|weeks|months|years`, bare weekdays.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnglishDateParser;

impl DateExpressionParser for EnglishDateParser {
    fn parse(&self, text: &str, today: NaiveDate) -> Vec<DateMatch> {
        let families: [(&Regex, Resolver); 5] = [
            (&*ISO_DATE, resolve_iso as Resolver),
            (&*IN_AMOUNT, resolve_in_amount),
            (&*NEXT_UNIT, resolve_next),
            (&*RELATIVE_DAY, resolve_relative_day),
            (&*BARE_WEEKDAY, resolve_bare_weekday),
        ];
        let mut claimed = ClaimedSpans::default();
        let mut out = Vec::new();
        for (re, resolve) in families {
            for caps in re.captures_iter(text) {
                let Some(m) = caps.get(0) else { continue };
                if claimed.overlaps(m.start(), m.end()) {
                    continue;
                }
                if let Some(date) = resolve(&caps, today) {
                    claimed.claim(m.start(), m.end());
                    out.push(DateMatch {
                        text: m.as_str().to_string(),
                        index: m.start(),
                        date,
                    });
                }
            }
        }
        out.sort_by_key(|m| m.index);
        out
    }
}

fn cap_u32(caps: &Captures<'_>, i: usize) -> Option<u32> {
    caps.get(i)?.as_str().parse().ok()
}

fn resolve_iso(caps: &Captures<'_>, _today: NaiveDate) -> Option<NaiveDate> {
    let year = caps.get(1)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, cap_u32(caps, 2)?, cap_u32(caps, 3)?)
}

fn resolve_in_amount(caps: &Captures<'_>, today: NaiveDate) -> Option<NaiveDate> {
    let amount = parse_english_number(caps.get(1)?.as_str())?;
    add_units(today, amount, caps.get(2)?.as_str())
}

fn resolve_next(caps: &Captures<'_>, today: NaiveDate) -> Option<NaiveDate> {
    let unit = caps.get(1)?.as_str().to_lowercase();
    match unit.as_str() {
        "week" => today.checked_add_signed(Duration::days(7)),
        "month" => today.checked_add_months(Months::new(1)),
        "year" => today.checked_add_months(Months::new(12)),
        other => parse_weekday(other).map(|wd| next_weekday(today, wd)),
    }
}

fn resolve_relative_day(caps: &Captures<'_>, today: NaiveDate) -> Option<NaiveDate> {
    let offset = match caps.get(1)?.as_str().to_lowercase().as_str() {
        "today" | "tonight" => 0,
        "tomorrow" => 1,
        "yesterday" => -1,
        _ => return None,
    };
    today.checked_add_signed(Duration::days(offset))
}

fn resolve_bare_weekday(caps: &Captures<'_>, today: NaiveDate) -> Option<NaiveDate> {
    parse_weekday(caps.get(1)?.as_str()).map(|wd| next_weekday(today, wd))
}

pub fn parse_english_number(s: &str) -> Option<u32> {
    match s.to_lowercase().as_str() {
        "one" => Some(1),
        "two" => Some(2),
        "three" => Some(3),
        "four" => Some(4),
        "five" => Some(5),
        "six" => Some(6),
        "seven" => Some(7),
        "eight" => Some(8),
        "nine" => Some(9),
        "ten" => Some(10),
        "eleven" => Some(11),
        "twelve" => Some(12),
        _ => s.parse::<u32>().ok(),
    }
}

fn parse_weekday(s: &str) -> Option<Weekday> {
    match s.to_lowercase().as_str() {
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tuesday" => Some(Weekday::Tue),
        "wed" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// `amount` units after `from`. Months and years keep the day of month where possible.
pub fn add_units(from: NaiveDate, amount: u32, unit: &str) -> Option<NaiveDate> {
    let unit = unit.to_lowercase();
    match unit.trim_end_matches('s') {
        "day" => from.checked_add_signed(Duration::days(amount.into())),
        "week" => from.checked_add_signed(Duration::days(i64::from(amount) * 7)),
        "month" => from.checked_add_months(Months::new(amount)),
        "year" => from.checked_add_months(Months::new(amount.checked_mul(12)?)),
        _ => None,
    }
}

/// The first `target` strictly after `from`.
pub fn next_weekday(from: NaiveDate, target: Weekday) -> NaiveDate {
    let current = from.weekday().num_days_from_monday() as i64;
    let wanted = target.num_days_from_monday() as i64;
    let mut delta = (wanted - current).rem_euclid(7);
    if delta == 0 {
        delta = 7;
    }
    from + Duration::days(delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn strict_prefix_stops_before_trailing_text() {
        assert_eq!(strict_prefix_len("2025-08-15 extra"), Some(10));
        assert_eq!(strict_prefix_len("2025-08-15 14:30 extra"), Some(16));
        assert_eq!(strict_prefix_len("2025-08-15 99:99"), Some(10));
        assert_eq!(strict_prefix_len("2025-13-40"), None);
        assert_eq!(strict_prefix_len("tomorrow"), None);
    }

    #[test]
    fn strict_whole_string() {
        assert_eq!(parse_strict(" 2025-08-15 "), Some((d(2025, 8, 15), None)));
        assert!(parse_strict("2025-08-15 junk").is_none());
        let (_, t) = parse_strict("2025-08-15 9:05").unwrap();
        assert_eq!(t, NaiveTime::from_hms_opt(9, 5, 0));
    }

    #[test]
    fn resolution_is_memoized_including_custom_formats() {
        let cache = DateParseCache::new(8);
        let fmts = vec!["%d/%m/%Y".to_string()];
        let a = resolve_date_string("15/08/2025", &fmts, &cache);
        let b = resolve_date_string("2025-08-15", &[], &cache);
        assert!(a.is_some());
        assert_eq!(a, b);
        assert_eq!(resolve_date_string("15/08/2025", &[], &cache), None);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn english_relative_expressions() {
        // 2025-08-13 is a Wednesday.
        let today = d(2025, 8, 13);
        let found = EnglishDateParser.parse("start tomorrow, due next friday", today);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].text, "tomorrow");
        assert_eq!(found[0].date, d(2025, 8, 14));
        assert_eq!(found[1].date, d(2025, 8, 15));

        let found = EnglishDateParser.parse("in 2 weeks or in one month", today);
        assert_eq!(found[0].date, d(2025, 8, 27));
        assert_eq!(found[1].date, d(2025, 9, 13));
    }

    #[test]
    fn bare_weekday_is_strictly_in_the_future() {
        let today = d(2025, 8, 13);
        let found = EnglishDateParser.parse("review on Wednesday", today);
        assert_eq!(found[0].date, d(2025, 8, 20));
    }

    #[test]
    fn next_weekday_does_not_rematch_bare_weekday() {
        let found = EnglishDateParser.parse("next monday", d(2025, 8, 13));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "next monday");
    }

    #[test]
    fn month_arithmetic_clamps_to_month_end() {
        assert_eq!(add_units(d(2025, 1, 31), 1, "months"), Some(d(2025, 2, 28)));
        assert_eq!(add_units(d(2024, 2, 29), 1, "year"), Some(d(2025, 2, 28)));
    }
}
