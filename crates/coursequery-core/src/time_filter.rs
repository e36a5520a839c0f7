//! Time-scoped questions: turn "last week" or "last 3 assignments" into a
//! [`TimeScope`], then filter candidate segments by their timestamps.
//!
//! Everything is relative to the `now` a [`TimeFilter`] is built with, so the
//! same question always resolves the same way in tests.

use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

use crate::chunks::Segment;
use crate::content::section_hint;

/// Temporal constraint parsed from a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeScope {
    /// No temporal language.
    None,
    /// Closed interval `[start, end]`.
    AbsoluteRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// `[now - duration, now]`.
    RelativeWindow(TimeDelta),
    /// The N most recent items by timestamp.
    LastN(usize),
}

impl TimeScope {
    pub fn is_none(&self) -> bool {
        matches!(self, TimeScope::None)
    }

    /// True for the variants that drop everything outside an interval.
    pub fn is_interval(&self) -> bool {
        matches!(
            self,
            TimeScope::AbsoluteRange { .. } | TimeScope::RelativeWindow(_)
        )
    }
}

impl fmt::Display for TimeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeScope::None => f.write_str("any time"),
            TimeScope::AbsoluteRange { start, end } => write!(
                f,
                "between {} and {}",
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d")
            ),
            TimeScope::RelativeWindow(d) if d.num_days() > 0 && d.num_hours() % 24 == 0 => {
                write!(f, "the last {} day(s)", d.num_days())
            }
            TimeScope::RelativeWindow(d) => write!(f, "the last {} hour(s)", d.num_hours()),
            TimeScope::LastN(n) => write!(f, "the {n} most recent item(s)"),
        }
    }
}

/// Result of [`TimeFilter::apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct Filtered<T> {
    pub segments: Vec<T>,
    /// For `LastN(n)`: how many of the n requested dated items were missing.
    pub shortfall: Option<usize>,
}

/// Resolves and applies time scopes against a fixed reference time.
#[derive(Debug, Clone, Copy)]
pub struct TimeFilter {
    now: DateTime<Utc>,
}

const WEEK_DAYS: i64 = 7;
const MONTH_DAYS: i64 = 30;
const RECENT_DAYS: i64 = 7;

impl TimeFilter {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Parses the temporal constraint in `query`. The first phrase found wins.
    pub fn resolve(&self, query: &str) -> TimeScope {
        let words = words(query);
        let w = |i: usize| words.get(i).map(String::as_str).unwrap_or("");

        for i in 0..words.len() {
            match w(i) {
                "between" => {
                    let range = (parse_date(w(i + 1)), w(i + 2), parse_date(w(i + 3)));
                    if let (Some(a), "and", Some(b)) = range {
                        return TimeScope::AbsoluteRange {
                            start: start_of_day(a),
                            end: end_of_day(b),
                        };
                    }
                }
                "since" => {
                    if let Some(d) = parse_date(w(i + 1)) {
                        return TimeScope::AbsoluteRange {
                            start: start_of_day(d),
                            end: self.now,
                        };
                    }
                }
                "yesterday" => {
                    let day = self.now.date_naive().pred_opt().unwrap_or(self.now.date_naive());
                    return TimeScope::AbsoluteRange {
                        start: start_of_day(day),
                        end: end_of_day(day),
                    };
                }
                "today" => return TimeScope::RelativeWindow(TimeDelta::days(1)),
                "last" | "past" | "previous" => {
                    if let Some(scope) = counted(w(i + 1), w(i + 2)) {
                        return scope;
                    }
                    match w(i + 1) {
                        "week" => return TimeScope::RelativeWindow(TimeDelta::days(WEEK_DAYS)),
                        "month" => return TimeScope::RelativeWindow(TimeDelta::days(MONTH_DAYS)),
                        "day" if w(i) == "past" => {
                            return TimeScope::RelativeWindow(TimeDelta::days(1))
                        }
                        next if section_hint(next).is_some() => return TimeScope::LastN(1),
                        _ => {}
                    }
                }
                "this" => match w(i + 1) {
                    "week" => return TimeScope::RelativeWindow(TimeDelta::days(WEEK_DAYS)),
                    "month" => return TimeScope::RelativeWindow(TimeDelta::days(MONTH_DAYS)),
                    _ => {}
                },
                "latest" | "newest" => return self.most_recent(&words, i, i + 1),
                "most" if w(i + 1) == "recent" => return self.most_recent(&words, i, i + 2),
                "recent" | "recently" | "lately" => {
                    return TimeScope::RelativeWindow(TimeDelta::days(RECENT_DAYS))
                }
                _ => {}
            }
        }
        TimeScope::None
    }

    /// "latest 3", "3 most recent", or a bare "latest" (one item).
    fn most_recent(&self, words: &[String], start: usize, after: usize) -> TimeScope {
        let after = words.get(after).and_then(|w| parse_count(w));
        let before = start
            .checked_sub(1)
            .and_then(|i| words.get(i))
            .and_then(|w| parse_count(w));
        TimeScope::LastN(after.or(before).unwrap_or(1))
    }

    /// Filters `candidates` by `scope`. Order is preserved except for `LastN`,
    /// which sorts newest first (undated last, ties stable).
    pub fn apply<T: Borrow<Segment>>(&self, scope: &TimeScope, candidates: Vec<T>) -> Filtered<T> {
        match *scope {
            TimeScope::None => Filtered {
                segments: candidates,
                shortfall: None,
            },
            TimeScope::AbsoluteRange { start, end } => self.within(candidates, start, end),
            TimeScope::RelativeWindow(d) => {
                let start = self.now.checked_sub_signed(d).unwrap_or(DateTime::<Utc>::MIN_UTC);
                self.within(candidates, start, self.now)
            }
            TimeScope::LastN(n) => last_n(candidates, n),
        }
    }

    fn within<T: Borrow<Segment>>(
        &self,
        candidates: Vec<T>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Filtered<T> {
        let before = candidates.len();
        let segments: Vec<T> = candidates
            .into_iter()
            .filter(|c| {
                c.borrow()
                    .timestamp
                    .is_some_and(|t| start <= t && t <= end)
            })
            .collect();
        tracing::debug!(before, after = segments.len(), %start, %end, "interval filter");
        Filtered {
            segments,
            shortfall: None,
        }
    }
}

/// Newest-first, keeping every segment of the first `n` distinct items.
fn last_n<T: Borrow<Segment>>(mut candidates: Vec<T>, n: usize) -> Filtered<T> {
    sort_newest_first(&mut candidates);
    let mut taken: HashSet<String> = HashSet::new();
    let mut dated = 0;
    let mut segments = Vec::new();
    for c in candidates {
        let seg = c.borrow();
        if !taken.contains(&seg.source_id) {
            if taken.len() == n {
                continue;
            }
            taken.insert(seg.source_id.clone());
            if seg.timestamp.is_some() {
                dated += 1;
            }
        }
        segments.push(c);
    }
    Filtered {
        segments,
        shortfall: (dated < n).then_some(n - dated),
    }
}

/// Stable sort by timestamp descending; undated segments go last.
pub fn sort_newest_first<T: Borrow<Segment>>(candidates: &mut [T]) {
    candidates.sort_by(|a, b| {
        let (a, b) = (a.borrow().timestamp, b.borrow().timestamp);
        match (a, b) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
    });
}

/// "3 days", "2 weeks", "3 assignments" after last/past.
fn counted(count: &str, unit: &str) -> Option<TimeScope> {
    let n = parse_count(count)?;
    Some(match unit {
        "hour" | "hours" => window(n, 1),
        "day" | "days" => window(n, 24),
        "week" | "weeks" => window(n, WEEK_DAYS * 24),
        "month" | "months" => window(n, MONTH_DAYS * 24),
        _ => TimeScope::LastN(n),
    })
}

/// `n` units of `unit_hours` each. Counts past chrono's range clamp to the widest window.
fn window(n: usize, unit_hours: i64) -> TimeScope {
    let d = i64::try_from(n)
        .ok()
        .and_then(|n| n.checked_mul(unit_hours))
        .and_then(TimeDelta::try_hours)
        .unwrap_or(TimeDelta::MAX);
    TimeScope::RelativeWindow(d)
}

fn parse_count(word: &str) -> Option<usize> {
    if let Ok(n) = word.parse::<usize>() {
        return Some(n);
    }
    const WORDS: [&str; 20] = [
        "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten", "eleven",
        "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
        "nineteen", "twenty",
    ];
    WORDS.iter().position(|w| *w == word).map(|i| i + 1)
}

fn parse_date(word: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(word, "%Y-%m-%d").ok()
}

fn start_of_day(d: NaiveDate) -> DateTime<Utc> {
    d.and_time(chrono::NaiveTime::MIN).and_utc()
}

fn end_of_day(d: NaiveDate) -> DateTime<Utc> {
    start_of_day(d) + TimeDelta::days(1) - TimeDelta::nanoseconds(1)
}

/// Lowercased words; keeps `-` so ISO dates survive.
fn words(query: &str) -> Vec<String> {
    query
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .map(|w| w.trim_matches('-').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::content::SectionType;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn seg(id: &str, ts: Option<DateTime<Utc>>) -> Segment {
        Segment {
            source_id: id.to_string(),
            section: SectionType::Assignment,
            title: None,
            timestamp: ts,
            index: 0,
            text: id.to_string(),
        }
    }

    fn january() -> Vec<Segment> {
        vec![
            seg("jan01", Some(at(2024, 1, 1))),
            seg("jan05", Some(at(2024, 1, 5))),
            seg("jan10", Some(at(2024, 1, 10))),
            seg("jan15", Some(at(2024, 1, 15))),
        ]
    }

    fn ids<T: Borrow<Segment>>(f: &Filtered<T>) -> Vec<String> {
        f.segments.iter().map(|s| s.borrow().source_id.clone()).collect()
    }

    #[test]
    fn resolve_phrases() {
        let tf = TimeFilter::new(at(2024, 1, 20));
        assert_eq!(tf.resolve("what are the last 2 assignments"), TimeScope::LastN(2));
        assert_eq!(tf.resolve("show the last three announcements"), TimeScope::LastN(3));
        assert_eq!(tf.resolve("the 3 most recent announcements"), TimeScope::LastN(3));
        assert_eq!(tf.resolve("latest announcement?"), TimeScope::LastN(1));
        assert_eq!(tf.resolve("what was the last assignment"), TimeScope::LastN(1));
        assert_eq!(
            tf.resolve("What happened last week?"),
            TimeScope::RelativeWindow(TimeDelta::days(7))
        );
        assert_eq!(
            tf.resolve("anything due this week"),
            TimeScope::RelativeWindow(TimeDelta::days(7))
        );
        assert_eq!(
            tf.resolve("recent announcements"),
            TimeScope::RelativeWindow(TimeDelta::days(7))
        );
        assert_eq!(
            tf.resolve("posts from the past 3 days"),
            TimeScope::RelativeWindow(TimeDelta::days(3))
        );
        assert_eq!(
            tf.resolve("in the last 2 weeks"),
            TimeScope::RelativeWindow(TimeDelta::days(14))
        );
        assert_eq!(tf.resolve("When are office hours?"), TimeScope::None);
        assert_eq!(tf.resolve("when is the last day to drop"), TimeScope::None);
    }

    #[test]
    fn resolve_absolute_ranges() {
        let now = Utc.with_ymd_and_hms(2024, 1, 20, 15, 30, 0).unwrap();
        let tf = TimeFilter::new(now);
        assert_eq!(
            tf.resolve("announcements since 2024-01-10"),
            TimeScope::AbsoluteRange { start: at(2024, 1, 10), end: now }
        );
        assert_eq!(
            tf.resolve("between 2024-01-01 and 2024-01-05"),
            TimeScope::AbsoluteRange {
                start: at(2024, 1, 1),
                end: at(2024, 1, 6) - TimeDelta::nanoseconds(1),
            }
        );
        assert_eq!(
            tf.resolve("what was posted yesterday"),
            TimeScope::AbsoluteRange {
                start: at(2024, 1, 19),
                end: at(2024, 1, 20) - TimeDelta::nanoseconds(1),
            }
        );
    }

    #[test]
    fn none_is_identity() {
        let tf = TimeFilter::new(at(2024, 1, 20));
        let mut c = january();
        c.push(seg("undated", None));
        let f = tf.apply(&TimeScope::None, c.clone());
        assert_eq!(f.segments, c);
        assert_eq!(f.shortfall, None);
    }

    #[test]
    fn last_n_newest_first() {
        let tf = TimeFilter::new(at(2024, 1, 20));
        let f = tf.apply(&TimeScope::LastN(3), january());
        assert_eq!(ids(&f), ["jan15", "jan10", "jan05"]);
        assert_eq!(f.shortfall, None);
    }

    #[test]
    fn last_n_reports_shortfall_and_puts_undated_last() {
        let tf = TimeFilter::new(at(2024, 1, 20));
        let c = vec![
            seg("undated", None),
            seg("jan05", Some(at(2024, 1, 5))),
            seg("jan10", Some(at(2024, 1, 10))),
        ];
        let f = tf.apply(&TimeScope::LastN(5), c);
        assert_eq!(ids(&f), ["jan10", "jan05", "undated"]);
        assert_eq!(f.shortfall, Some(3));
    }

    #[test]
    fn last_n_counts_items_not_segments() {
        let tf = TimeFilter::new(at(2024, 1, 20));
        let mut second = seg("jan15", Some(at(2024, 1, 15)));
        second.index = 1;
        let mut c = january();
        c.push(second);
        let f = tf.apply(&TimeScope::LastN(2), c.iter().collect::<Vec<&Segment>>());
        assert_eq!(ids(&f), ["jan15", "jan15", "jan10"]);
    }

    #[test]
    fn relative_window_is_inclusive() {
        let tf = TimeFilter::new(at(2024, 1, 20));
        let f = tf.apply(&TimeScope::RelativeWindow(TimeDelta::days(7)), january());
        assert_eq!(ids(&f), ["jan15"]);

        let mut c = january();
        c.push(seg("jan13", Some(at(2024, 1, 13))));
        let f = tf.apply(&TimeScope::RelativeWindow(TimeDelta::days(7)), c);
        assert_eq!(ids(&f), ["jan15", "jan13"]);
    }

    #[test]
    fn huge_counts_clamp_instead_of_overflowing() {
        let tf = TimeFilter::new(at(2024, 1, 20));
        let mut c = january();
        c.push(seg("undated", None));

        let scope = tf.resolve("anything posted in the last 1000000000 days");
        assert_eq!(scope, TimeScope::RelativeWindow(TimeDelta::days(1_000_000_000)));
        let f = tf.apply(&scope, c.clone());
        assert_eq!(ids(&f), ["jan01", "jan05", "jan10", "jan15"]);

        let scope = tf.resolve("the past 9999999999999999 weeks");
        assert_eq!(scope, TimeScope::RelativeWindow(TimeDelta::MAX));
        let f = tf.apply(&scope, c);
        assert_eq!(f.segments.len(), 4);
        assert!(!scope.to_string().is_empty());

        let scope = tf.resolve(&format!("last {} hours", usize::MAX));
        assert_eq!(scope, TimeScope::RelativeWindow(TimeDelta::MAX));
    }

    #[test]
    fn empty_window_and_undated_excluded() {
        let tf = TimeFilter::new(at(2024, 3, 1));
        let mut c = january();
        c.push(seg("undated", None));
        let f = tf.apply(&TimeScope::RelativeWindow(TimeDelta::days(7)), c);
        assert!(f.segments.is_empty());

        let f = tf.apply(
            &TimeScope::AbsoluteRange { start: at(2024, 1, 5), end: at(2024, 1, 10) },
            january(),
        );
        assert_eq!(ids(&f), ["jan05", "jan10"]);
    }
}
