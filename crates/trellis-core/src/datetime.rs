use chrono::{
  DateTime,
  Datelike,
  Duration,
  NaiveDate,
  Utc,
  Weekday
};
use chrono_tz::Tz;

pub const TIMEZONE_ENV_VAR: &str =
  "TRELLIS_TIMEZONE";

/// Timezone that defines "today" for
/// due-date categories and the
/// calendar. The environment wins over
/// the configured value; UTC is the
/// last resort.
pub fn resolve_timezone(
  configured: Option<&str>
) -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(&raw, TIMEZONE_ENV_VAR)
  {
    return tz;
  }

  if let Some(raw) = configured
    && let Some(tz) =
      parse_timezone(raw, "config")
  {
    return tz;
  }

  chrono_tz::UTC
}

pub fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::debug!(
        source,
        timezone = %trimmed,
        "configured timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

#[must_use]
pub fn today_in(tz: Tz) -> NaiveDate {
  local_date(Utc::now(), tz)
}

#[must_use]
pub fn local_date(
  dt: DateTime<Utc>,
  tz: Tz
) -> NaiveDate {
  dt.with_timezone(&tz).date_naive()
}

pub fn parse_weekday_name(
  raw: &str
) -> Option<Weekday> {
  match raw
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" => {
      Some(Weekday::Thu)
    }
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

pub fn add_days(
  date: NaiveDate,
  days: i64
) -> NaiveDate {
  date
    .checked_add_signed(Duration::days(
      days
    ))
    .unwrap_or(date)
}

pub fn first_day_of_month(
  year: i32,
  month: u32
) -> Option<NaiveDate> {
  NaiveDate::from_ymd_opt(year, month, 1)
}

pub fn days_in_month(
  year: i32,
  month: u32
) -> Option<u32> {
  let (next_year, next_month) =
    if month >= 12 {
      (year.checked_add(1)?, 1_u32)
    } else {
      (year, month + 1)
    };
  first_day_of_month(year, month)?;
  let next_first = first_day_of_month(
    next_year, next_month
  )?;
  Some(add_days(next_first, -1).day())
}

pub fn start_of_week(
  day: NaiveDate,
  week_start: Weekday
) -> NaiveDate {
  let day_idx = day
    .weekday()
    .num_days_from_monday()
    as i64;
  let start_idx = week_start
    .num_days_from_monday()
    as i64;
  let diff =
    (7 + day_idx - start_idx) % 7;
  add_days(day, -diff)
}

/// Move a (year, 1-based month) pair by
/// `months`, wrapping across years.
pub fn shift_months(
  year: i32,
  month: u32,
  months: i32
) -> (i32, u32) {
  let zero_based = year as i64 * 12
    + (month as i64 - 1)
    + months as i64;
  let new_year =
    zero_based.div_euclid(12) as i32;
  let new_month =
    zero_based.rem_euclid(12) as u32 + 1;
  (new_year, new_month)
}

/// Short human label for a due date:
/// "Today", "Tomorrow", "Mar 5", or
/// "Mar 5, 2027" outside the current
/// year.
pub fn relative_day_label(
  day: NaiveDate,
  today: NaiveDate
) -> String {
  if day == today {
    return "Today".to_string();
  }
  if day == add_days(today, 1) {
    return "Tomorrow".to_string();
  }
  if day.year() == today.year() {
    day.format("%b %-d").to_string()
  } else {
    day.format("%b %-d, %Y").to_string()
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn day(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn local_date_follows_the_zone() {
    let instant = Utc
      .with_ymd_and_hms(2026, 10, 18, 20, 30, 0)
      .unwrap();
    assert_eq!(
      local_date(instant, chrono_tz::UTC),
      day(2026, 10, 18)
    );
    assert_eq!(
      local_date(
        instant,
        chrono_tz::Asia::Tokyo
      ),
      day(2026, 10, 19)
    );
    assert_eq!(
      local_date(
        instant,
        chrono_tz::America::Los_Angeles
      ),
      day(2026, 10, 18)
    );
  }

  #[test]
  fn month_lengths_follow_leap_years() {
    assert_eq!(
      days_in_month(2024, 2),
      Some(29)
    );
    assert_eq!(
      days_in_month(2026, 2),
      Some(28)
    );
    assert_eq!(
      days_in_month(2026, 12),
      Some(31)
    );
    assert_eq!(days_in_month(2026, 13), None);
  }

  #[test]
  fn shift_months_wraps_years() {
    assert_eq!(
      shift_months(2026, 12, 1),
      (2027, 1)
    );
    assert_eq!(
      shift_months(2026, 1, -1),
      (2025, 12)
    );
    assert_eq!(
      shift_months(2026, 5, -17),
      (2024, 12)
    );
  }

  #[test]
  fn start_of_week_respects_week_start() {
    // 2026-10-18 is a Sunday.
    let sunday = day(2026, 10, 18);
    assert_eq!(
      start_of_week(sunday, Weekday::Sun),
      sunday
    );
    assert_eq!(
      start_of_week(sunday, Weekday::Mon),
      day(2026, 10, 12)
    );
  }

  #[test]
  fn relative_labels() {
    let today = day(2026, 10, 18);
    assert_eq!(
      relative_day_label(today, today),
      "Today"
    );
    assert_eq!(
      relative_day_label(
        day(2026, 10, 19),
        today
      ),
      "Tomorrow"
    );
    assert_eq!(
      relative_day_label(
        day(2026, 3, 5),
        today
      ),
      "Mar 5"
    );
    assert_eq!(
      relative_day_label(
        day(2027, 3, 5),
        today
      ),
      "Mar 5, 2027"
    );
  }

  #[test]
  fn weekday_names_parse() {
    assert_eq!(
      parse_weekday_name(" Sunday "),
      Some(Weekday::Sun)
    );
    assert_eq!(
      parse_weekday_name("mon"),
      Some(Weekday::Mon)
    );
    assert_eq!(parse_weekday_name("x"), None);
  }
}
