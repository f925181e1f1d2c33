use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, SecondsFormat, TimeZone, Utc};

use crate::FilterError;

/// NamedRange is the vocabulary of relative date ranges accepted by
/// `add_date_range`. Boundaries are computed in local time: a range starts
/// at midnight on its first day and ends at the following boundary minus
/// one millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedRange {
    Today,
    Yesterday,
    Last7Days,
    Last30Days,
    ThisMonth,
    LastMonth,
    ThisQuarter,
    YearToDate,
}

impl std::str::FromStr for NamedRange {
    type Err = FilterError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "today" => Ok(NamedRange::Today),
            "yesterday" => Ok(NamedRange::Yesterday),
            "last_7_days" => Ok(NamedRange::Last7Days),
            "last_30_days" => Ok(NamedRange::Last30Days),
            "this_month" => Ok(NamedRange::ThisMonth),
            "last_month" => Ok(NamedRange::LastMonth),
            "this_quarter" => Ok(NamedRange::ThisQuarter),
            "year_to_date" => Ok(NamedRange::YearToDate),
            other => Err(FilterError::UnknownRange(other.to_string())),
        }
    }
}

impl NamedRange {
    /// Resolve to inclusive `[start, end]` instants around `now`.
    pub fn resolve(&self, now: DateTime<Local>) -> (DateTime<Local>, DateTime<Local>) {
        let today = now.date_naive();

        let (start_day, end_boundary) = match self {
            NamedRange::Today => (today, today + Duration::days(1)),
            NamedRange::Yesterday => (today - Duration::days(1), today),
            NamedRange::Last7Days => (today - Duration::days(6), today + Duration::days(1)),
            NamedRange::Last30Days => (today - Duration::days(29), today + Duration::days(1)),
            NamedRange::ThisMonth => {
                let first = first_of_month(today);
                (first, add_months(first, 1))
            }
            NamedRange::LastMonth => {
                let first = first_of_month(today);
                (add_months(first, -1), first)
            }
            NamedRange::ThisQuarter => {
                let quarter_month = ((today.month0() / 3) * 3) + 1;
                let first = NaiveDate::from_ymd_opt(today.year(), quarter_month, 1)
                    .expect("quarter start is a valid date");
                (first, add_months(first, 3))
            }
            NamedRange::YearToDate => {
                let first = NaiveDate::from_ymd_opt(today.year(), 1, 1)
                    .expect("January 1st is a valid date");
                (first, today + Duration::days(1))
            }
        };

        (midnight(start_day), midnight(end_boundary) - Duration::milliseconds(1))
    }
}

/// Shift `[start, end]` back by one year. A February 29th that doesn't
/// exist in the prior year rolls forward to March 1st.
pub fn year_over_year(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    (shift_year(start, -1), shift_year(end, -1))
}

/// The immediately preceding window of identical duration: for an
/// inclusive window of N milliseconds ending at `start - 1ms`.
pub fn comparison_period(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let length = end - start + Duration::milliseconds(1);
    (start - length, end - length)
}

/// Canonical ISO-8601 text for a stored date value.
pub fn to_iso(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a date value in any of the accepted spellings: RFC 3339, a bare
/// date, or a `YYYY-MM-DD HH:MM:SS` timestamp. Bare forms are read as UTC.
pub fn parse_date(text: &str) -> Result<DateTime<Utc>, FilterError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&parsed));
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&parsed.and_hms_opt(0, 0, 0).unwrap()));
    }
    Err(FilterError::InvalidDate(text.to_string()))
}

fn midnight(day: NaiveDate) -> DateTime<Local> {
    // Fall back to the earliest representable instant on DST gap days.
    Local
        .from_local_datetime(&day.and_hms_opt(0, 0, 0).unwrap())
        .earliest()
        .unwrap_or_else(|| Local.from_utc_datetime(&day.and_hms_opt(0, 0, 0).unwrap()))
}

fn first_of_month(day: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(day.year(), day.month(), 1).expect("first of month is valid")
}

fn add_months(day: NaiveDate, months: i32) -> NaiveDate {
    let total = day.year() * 12 + day.month0() as i32 + months;
    let (year, month0) = (total.div_euclid(12), total.rem_euclid(12));
    NaiveDate::from_ymd_opt(year, month0 as u32 + 1, day.day())
        .expect("month arithmetic starts from day 1")
}

fn shift_year(instant: DateTime<Utc>, years: i32) -> DateTime<Utc> {
    let date = instant.date_naive();
    let shifted = NaiveDate::from_ymd_opt(date.year() + years, date.month(), date.day())
        // Only Feb 29 can fail to exist; roll forward to Mar 1.
        .unwrap_or_else(|| {
            NaiveDate::from_ymd_opt(date.year() + years, 3, 1).expect("March 1st is valid")
        });
    Utc.from_utc_datetime(&shifted.and_time(instant.time()))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    fn local(y: i32, m: u32, d: u32, h: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(y, m, d, h, 30, 0)
            .single()
            .expect("fixture instant exists")
    }

    #[test]
    fn this_month_spans_whole_month() {
        let (start, end) = NamedRange::ThisMonth.resolve(local(2024, 2, 15, 9));
        assert_eq!(start, midnight(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()));
        // Leap-year February runs through the 29th.
        assert_eq!(
            end,
            midnight(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()) - Duration::milliseconds(1)
        );
    }

    #[test]
    fn quarter_and_year_to_date() {
        let now = local(2024, 5, 20, 12);
        let (start, _) = NamedRange::ThisQuarter.resolve(now);
        assert_eq!(start.date_naive(), NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());

        let (start, end) = NamedRange::YearToDate.resolve(now);
        assert_eq!(start.date_naive(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(end.date_naive(), NaiveDate::from_ymd_opt(2024, 5, 20).unwrap());
    }

    #[test]
    fn unknown_range_is_a_named_error() {
        assert!(matches!(
            NamedRange::from_str("fortnight"),
            Err(FilterError::UnknownRange(name)) if name == "fortnight"
        ));
    }

    #[test]
    fn leap_day_rolls_forward_year_over_year() {
        let feb29 = parse_date("2024-02-29").unwrap();
        let (start, end) = year_over_year(feb29, feb29);
        assert_eq!(to_iso(start), "2023-03-01T00:00:00.000Z");
        assert_eq!(to_iso(end), "2023-03-01T00:00:00.000Z");
    }

    #[test]
    fn comparison_period_precedes_without_overlap() {
        let start = parse_date("2024-03-08").unwrap();
        let end = parse_date("2024-03-14T23:59:59.999Z").unwrap();
        let (prev_start, prev_end) = comparison_period(start, end);
        assert_eq!(to_iso(prev_start), "2024-03-01T00:00:00.000Z");
        assert_eq!(to_iso(prev_end), "2024-03-07T23:59:59.999Z");
    }
}
