//! Chinese relative-date grammar, used when the primary parser finds nothing in
//! text that contains CJK ideographs.
//!
//! Patterns run from most to least specific; each match claims its byte span so a
//! prefixed weekday (`下周三`) is never re-read as a bare week (`下周`).

use crate::dates::{ClaimedSpans, DateExpressionParser, DateMatch, add_units};
use chrono::{Datelike, Duration, Months, NaiveDate};
use regex::{Captures, Regex};
use std::sync::LazyLock;

static PREFIXED_WEEKDAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(下|上|这|本)个?(周|星期|礼拜)([一二三四五六日天1-7])").unwrap()
});

static BARE_WEEKDAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(周|星期|礼拜)([一二三四五六日天1-7])").unwrap());

static RELATIVE_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"大后天|后天|明天|今天|昨天|前天").unwrap());

static RELATIVE_PERIOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"下个?周|上个?周|本周|这个?周|下个月|上个月|这个月|本月|明年|去年|今年").unwrap()
});

static AMOUNT_LATER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"([0-9]+|[零一二两三四五六七八九十百]+)\s*(天|周|星期|个月|月|年)(以后|之后|后|以内|之内|内)",
    )
    .unwrap()
});

type Resolver = fn(&Captures<'_>, NaiveDate) -> Option<NaiveDate>;

#[derive(Debug, Default, Clone, Copy)]
pub struct ChineseDateParser;

impl DateExpressionParser for ChineseDateParser {
    fn parse(&self, text: &str, today: NaiveDate) -> Vec<DateMatch> {
        let families: [(&Regex, Resolver); 5] = [
            (&*PREFIXED_WEEKDAY, resolve_prefixed_weekday as Resolver),
            (&*BARE_WEEKDAY, resolve_bare_weekday),
            (&*RELATIVE_DAY, resolve_relative_day),
            (&*RELATIVE_PERIOD, resolve_relative_period),
            (&*AMOUNT_LATER, resolve_amount_later),
        ];
        let mut claimed = ClaimedSpans::default();
        let mut out = Vec::new();
        for (re, resolve) in families {
            for caps in re.captures_iter(text) {
                let Some(m) = caps.get(0) else { continue };
                if claimed.overlaps(m.start(), m.end()) {
                    continue;
                }
                match resolve(&caps, today) {
                    Some(date) => {
                        claimed.claim(m.start(), m.end());
                        out.push(DateMatch {
                            text: m.as_str().to_string(),
                            index: m.start(),
                            date,
                        });
                    }
                    None => log::debug!("unresolved chinese date expression {:?}", m.as_str()),
                }
            }
        }
        out.sort_by_key(|m| m.index);
        out
    }
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars()
        .any(|c| matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}'))
}

/// Sunday-based weekday index: 日/天/7 → 0, 一 → 1 … 六 → 6.
fn weekday_index(s: &str) -> Option<i64> {
    let idx = match s {
        "日" | "天" | "7" => 0,
        "一" | "1" => 1,
        "二" | "2" => 2,
        "三" | "3" => 3,
        "四" | "4" => 4,
        "五" | "5" => 5,
        "六" | "6" => 6,
        _ => return None,
    };
    Some(idx)
}

/// `today + (target − current) + 7·offset`.
pub fn weekday_with_offset(today: NaiveDate, target: i64, week_offset: i64) -> Option<NaiveDate> {
    let current = i64::from(today.weekday().num_days_from_sunday());
    today.checked_add_signed(Duration::days(target - current + 7 * week_offset))
}

fn resolve_prefixed_weekday(caps: &Captures<'_>, today: NaiveDate) -> Option<NaiveDate> {
    let offset = match caps.get(1)?.as_str() {
        "下" => 1,
        "上" => -1,
        _ => 0,
    };
    weekday_with_offset(today, weekday_index(caps.get(3)?.as_str())?, offset)
}

/// Unprefixed weekdays pick today or the next occurrence.
fn resolve_bare_weekday(caps: &Captures<'_>, today: NaiveDate) -> Option<NaiveDate> {
    let target = weekday_index(caps.get(2)?.as_str())?;
    let current = i64::from(today.weekday().num_days_from_sunday());
    let offset = if target < current { 1 } else { 0 };
    weekday_with_offset(today, target, offset)
}

fn resolve_relative_day(caps: &Captures<'_>, today: NaiveDate) -> Option<NaiveDate> {
    let days = match caps.get(0)?.as_str() {
        "大后天" => 3,
        "后天" => 2,
        "明天" => 1,
        "今天" => 0,
        "昨天" => -1,
        "前天" => -2,
        _ => return None,
    };
    today.checked_add_signed(Duration::days(days))
}

fn resolve_relative_period(caps: &Captures<'_>, today: NaiveDate) -> Option<NaiveDate> {
    let word = caps.get(0)?.as_str().replace('个', "");
    match word.as_str() {
        "下周" => today.checked_add_signed(Duration::days(7)),
        "上周" => today.checked_sub_signed(Duration::days(7)),
        "本周" | "这周" | "这月" | "本月" | "今年" => Some(today),
        "下月" => today.checked_add_months(Months::new(1)),
        "上月" => today.checked_sub_months(Months::new(1)),
        "明年" => today.checked_add_months(Months::new(12)),
        "去年" => today.checked_sub_months(Months::new(12)),
        _ => None,
    }
}

fn resolve_amount_later(caps: &Captures<'_>, today: NaiveDate) -> Option<NaiveDate> {
    let amount = parse_chinese_number(caps.get(1)?.as_str())?;
    let unit = match caps.get(2)?.as_str() {
        "天" => "days",
        "周" | "星期" => "weeks",
        "个月" | "月" => "months",
        "年" => "years",
        _ => return None,
    };
    add_units(today, amount, unit)
}

/// Arabic digits or simple Chinese numerals up to the hundreds (`十五`, `二十三`, `两`).
pub fn parse_chinese_number(s: &str) -> Option<u32> {
    if let Ok(n) = s.parse::<u32>() {
        return Some(n);
    }
    let digit = |c: char| -> Option<u32> {
        Some(match c {
            '零' => 0,
            '一' => 1,
            '二' | '两' => 2,
            '三' => 3,
            '四' => 4,
            '五' => 5,
            '六' => 6,
            '七' => 7,
            '八' => 8,
            '九' => 9,
            _ => return None,
        })
    };
    let mut total = 0;
    let mut pending = None;
    for c in s.chars() {
        match c {
            '百' => {
                total += pending.take().unwrap_or(1) * 100;
            }
            '十' => {
                total += pending.take().unwrap_or(1) * 10;
            }
            other => pending = Some(digit(other)?),
        }
    }
    let value = total + pending.unwrap_or(0);
    (!s.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    // 2025-08-13 is a Wednesday (Sunday-based index 3).
    const WED: (i32, u32, u32) = (2025, 8, 13);

    fn today() -> NaiveDate {
        d(WED.0, WED.1, WED.2)
    }

    #[test]
    fn next_wednesday_adds_a_full_week() {
        let found = ChineseDateParser.parse("下周三开会", today());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "下周三");
        assert_eq!(found[0].date, d(2025, 8, 20));
    }

    #[rstest]
    #[case("上周一", d(2025, 8, 4))]
    #[case("这周五", d(2025, 8, 15))]
    #[case("本星期日", d(2025, 8, 10))]
    #[case("周三", d(2025, 8, 13))]
    #[case("星期一", d(2025, 8, 18))]
    #[case("礼拜六", d(2025, 8, 16))]
    #[case("大后天", d(2025, 8, 16))]
    #[case("前天", d(2025, 8, 11))]
    #[case("下个月", d(2025, 9, 13))]
    #[case("去年", d(2024, 8, 13))]
    #[case("3天后", d(2025, 8, 16))]
    #[case("两周之后", d(2025, 8, 27))]
    #[case("十个月内", d(2026, 6, 13))]
    fn expressions(#[case] text: &str, #[case] expected: NaiveDate) {
        let found = ChineseDateParser.parse(text, today());
        assert_eq!(found.len(), 1, "{text}");
        assert_eq!(found[0].date, expected, "{text}");
    }

    #[test]
    fn bare_week_is_not_rematched_inside_prefixed_weekday() {
        let found = ChineseDateParser.parse("下周三和下周", today());
        let texts: Vec<_> = found.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["下周三", "下周"]);
    }

    #[test]
    fn chinese_numerals() {
        assert_eq!(parse_chinese_number("十"), Some(10));
        assert_eq!(parse_chinese_number("十五"), Some(15));
        assert_eq!(parse_chinese_number("二十三"), Some(23));
        assert_eq!(parse_chinese_number("一百零五"), Some(105));
        assert_eq!(parse_chinese_number("12"), Some(12));
        assert_eq!(parse_chinese_number("abc"), None);
    }

    #[test]
    fn cjk_detection() {
        assert!(contains_cjk("meet 下周三"));
        assert!(!contains_cjk("meet next wednesday"));
    }
}
