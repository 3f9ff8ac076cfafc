//! Line classification: code fences, ATX headings and checklist task lines.
//!
//! Each grammar is anchored at the start of the line and built from `nom`
//! combinators; anything that does not parse is plain text.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::take_while,
    character::complete::{anychar, char, digit1, one_of, space0, space1},
    combinator::{eof, map, recognize, rest, verify},
    error::{VerboseError, VerboseErrorKind},
    sequence::{pair, preceded},
};

type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// A checklist line split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLine<'a> {
    /// Leading whitespace in columns; a tab counts as one.
    pub actual_indent: usize,
    pub list_marker: &'a str,
    pub raw_status: char,
    pub body: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind<'a> {
    FenceToggle,
    /// Any line inside a fenced code block.
    Code,
    Heading { level: u8, text: &'a str },
    Task(TaskLine<'a>),
    Text,
}

/// Stateful line classifier; remembers whether we are inside a fence.
#[derive(Debug, Clone)]
pub struct LineClassifier {
    in_fence: bool,
    parse_heading: bool,
}

impl LineClassifier {
    pub fn new(parse_heading: bool) -> Self {
        Self {
            in_fence: false,
            parse_heading,
        }
    }

    pub fn in_fence(&self) -> bool {
        self.in_fence
    }

    pub fn classify<'a>(&mut self, line: &'a str) -> LineKind<'a> {
        if is_fence(line) {
            self.in_fence = !self.in_fence;
            return LineKind::FenceToggle;
        }
        if self.in_fence {
            return LineKind::Code;
        }
        if self.parse_heading {
            if let Ok((_, (level, text))) = heading(line) {
                return LineKind::Heading { level, text };
            }
        }
        match task_line(line) {
            Ok((_, task)) => LineKind::Task(task),
            Err(_) => LineKind::Text,
        }
    }
}

pub fn is_fence(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("```") || t.starts_with("~~~")
}

/* ------------------------------ Headings ------------------------------ */

/// `#`×1–6, whitespace, then non-empty text.
pub fn heading(i: &str) -> PResult<'_, (u8, &str)> {
    let (i, hashes) = take_while_m_n(1, 6, |c| c == '#')(i)?;
    let (i, _) = space1(i)?;
    let (i, text) = verify(rest, |s: &str| !s.trim().is_empty())(i)?;
    Ok((i, (hashes.len() as u8, text.trim())))
}

/* ------------------------------ Task lines ------------------------------ */

/// `- [ ] body`, `* [x] body`, `1. [/] body`, `2) [-] body`. An empty body is allowed.
pub fn task_line(i: &str) -> PResult<'_, TaskLine<'_>> {
    let (i, indent) = space0(i)?;
    let (i, list_marker) = list_marker(i)?;
    let (i, _) = space1(i)?;
    let (i, raw_status) = checkbox(i)?;
    let (i, body) = alt((map(eof, |_| ""), preceded(space1, rest)))(i)?;
    Ok((
        i,
        TaskLine {
            actual_indent: indent.chars().count(),
            list_marker,
            raw_status,
            body: body.trim_end(),
        },
    ))
}

fn list_marker(i: &str) -> PResult<'_, &str> {
    alt((
        recognize(one_of("-*+")),
        recognize(pair(digit1, one_of(".)"))),
    ))(i)
}

fn checkbox(i: &str) -> PResult<'_, char> {
    let (i, _) = char('[')(i)?;
    let (i, c) = verify(anychar, |c: &char| {
        !matches!(c, '[' | ']') && !c.is_control()
    })(i)?;
    let (i, _) = char(']')(i)?;
    Ok((i, c))
}

fn take_while_m_n<F>(m: usize, n: usize, cond: F) -> impl Fn(&str) -> PResult<'_, &str>
where
    F: Fn(char) -> bool + Copy,
{
    move |i: &str| {
        let (rest, out) = take_while(cond)(i)?;
        if out.len() < m || out.len() > n {
            Err(nom::Err::Error(VerboseError {
                errors: vec![(i, VerboseErrorKind::Context("m_n"))],
            }))
        } else {
            Ok((rest, out))
        }
    }
}

/* ------------------------------ Status ------------------------------ */

/// `completed` is `x`/`X` only, whatever the status table says.
pub fn is_completed(raw_status: char) -> bool {
    raw_status.eq_ignore_ascii_case(&'x')
}
