//! Interactive line commands of the host console.

use chrono::{NaiveDate, NaiveDateTime};
use powerstrip::SECONDS_PER_DAY;

/// Trailing window of an `e<N><unit>` query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Span {
    Hour,
    Day,
    Week,
    /// 30 days.
    Month,
    /// 365 days.
    Year,
}

impl Span {
    fn from_char(c: char) -> Option<Self> {
        Some(match c {
            'h' => Span::Hour,
            'd' => Span::Day,
            'w' => Span::Week,
            'm' => Span::Month,
            'y' => Span::Year,
            _ => return None,
        })
    }

    pub fn secs(&self) -> i64 {
        const HOUR: i64 = 3600;
        const DAY: i64 = SECONDS_PER_DAY;
        match self {
            Span::Hour => HOUR,
            Span::Day => DAY,
            Span::Week => 7 * DAY,
            Span::Month => 30 * DAY,
            Span::Year => 365 * DAY,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Span::Hour => "hour",
            Span::Day => "day",
            Span::Week => "week",
            Span::Month => "month",
            Span::Year => "year",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Quit,
    /// `s<1-3><0|1>`, socket is 0 based here.
    Toggle { socket: u8, on: bool },
    Status,
    AllOn,
    AllOff,
    SetTime,
    /// `e<N><h|d|w|m|y>`
    Trailing { count: u32, span: Span },
    /// `e<N>` followed by something that is not a unit.
    UnknownSpan(String),
    /// `eq` with two local timestamps.
    Between {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    Flush,
    Usage,
}

pub const USAGE: &str = "
usage:
s[1,2,3][0,1]:      toggle socket. s10 turns socket 1 off, s21 turns socket 2 on, etc.
a1:                 turn on all sockets
a0:                 turn off all sockets
ss:                 get socket status
e#[h,d,w,m,y]:      get energy usage for the past # hour/day/week/month/year
eq YYYY MM DD HH MM SS YYYY MM DD HH MM SS:
                    get energy query between two timestamps
st:                 set power strip's RTC
f:                  flush pending bytes from the power strip
q:                  quit
";

pub const SPAN_HINT: &str =
    "e#[h,d,w,m,y]: get energy usage for the last # hour/day/week/month/year";

pub fn parse(line: &str) -> Input {
    let line = line.trim_end_matches(['\r', '\n']);
    match line {
        "q" => return Input::Quit,
        "ss" => return Input::Status,
        "a1" => return Input::AllOn,
        "a0" => return Input::AllOff,
        "st" => return Input::SetTime,
        "f" => return Input::Flush,
        _ => {}
    }
    if let Some(rest) = line.strip_prefix("eq ") {
        return parse_between(rest).unwrap_or(Input::Usage);
    }
    let mut chars = line.chars();
    match (chars.next(), chars.next()) {
        (Some('s'), Some(n @ '1'..='3')) => {
            let socket = n as u8 - b'1';
            match chars.as_str() {
                "1" => Input::Toggle { socket, on: true },
                "0" => Input::Toggle { socket, on: false },
                _ => Input::Usage,
            }
        }
        (Some('e'), Some(d)) if d.is_ascii_digit() => parse_trailing(&line[1..]),
        _ => Input::Usage,
    }
}

fn parse_trailing(rest: &str) -> Input {
    let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    let count = match rest[..digits].parse::<u32>() {
        Ok(count) if count > 0 => count,
        _ => return Input::Usage,
    };
    let unit = &rest[digits..];
    match unit.chars().next().and_then(Span::from_char) {
        Some(span) => Input::Trailing { count, span },
        None => Input::UnknownSpan(unit.to_string()),
    }
}

fn parse_between(rest: &str) -> Option<Input> {
    let fields: Vec<i64> = rest
        .split_whitespace()
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    if fields.len() < 12 {
        return None;
    }
    Some(Input::Between {
        start: datetime(&fields[0..6])?,
        end: datetime(&fields[6..12])?,
    })
}

fn datetime(f: &[i64]) -> Option<NaiveDateTime> {
    let part = |i: usize| u32::try_from(f[i]).ok();
    NaiveDate::from_ymd_opt(i32::try_from(f[0]).ok()?, part(1)?, part(2)?)?
        .and_hms_opt(part(3)?, part(4)?, part(5)?)
}
