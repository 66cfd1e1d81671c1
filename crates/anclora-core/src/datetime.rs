use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  TimeZone,
  Utc
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "anclora-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "ANCLORA_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "ANCLORA_TIME_CONFIG";
const DEFAULT_PROJECT_TIMEZONE: &str =
  "Europe/Madrid";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

pub fn project_timezone() -> Tz {
  static PROJECT_TZ: OnceLock<Tz> =
    OnceLock::new();
  *PROJECT_TZ.get_or_init(
    resolve_project_timezone
  )
}

fn resolve_project_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(&raw, TIMEZONE_ENV_VAR)
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  parse_timezone(
    DEFAULT_PROJECT_TIMEZONE,
    "DEFAULT_PROJECT_TIMEZONE"
  )
  .unwrap_or_else(|| {
    tracing::error!(
      "failed to parse fallback \
       timezone; using UTC"
    );
    chrono_tz::UTC
  })
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
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
        "configured project timezone"
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

/// Maps a wall-clock time in `tz` to
/// UTC. Ambiguous times resolve to the
/// earliest instant; times inside a DST
/// gap move forward by an hour.
pub fn local_to_utc(
  tz: Tz,
  local_naive: NaiveDateTime,
  context: &str
) -> anyhow::Result<DateTime<Utc>> {
  match tz.from_local_datetime(
    &local_naive
  ) {
    | LocalResult::Single(local_dt) => {
      Ok(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::warn!(
        context,
        first = %first,
        second = %second,
        "ambiguous local datetime; using earliest"
      );
      let chosen = if first <= second {
        first
      } else {
        second
      };
      Ok(chosen.with_timezone(&Utc))
    }
    | LocalResult::None => {
      let shifted =
        local_naive + Duration::hours(1);
      tz.from_local_datetime(&shifted)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| {
          anyhow!(
            "local datetime does not \
             exist in configured \
             timezone: {context}"
          )
        })
    }
  }
}

/// Parses `HH:MM` (optionally `HH:MM:SS`)
/// into a time of day.
pub fn parse_time_of_day(
  raw: &str
) -> anyhow::Result<NaiveTime> {
  let trimmed = raw.trim();
  let clock_re = Regex::new(
    r"^(?P<hour>\d{1,2}):(?P<minute>\d{2})(?::(?P<second>\d{2}))?$",
  )
  .map_err(|e| {
    anyhow!(
      "internal regex compile \
       failure: {e}"
    )
  })?;
  let caps = clock_re
    .captures(trimmed)
    .ok_or_else(|| {
      anyhow!(
        "expected HH:MM time of day, \
         got: {trimmed}"
      )
    })?;

  let hour: u32 = caps["hour"]
    .parse()
    .context("invalid hour")?;
  let minute: u32 = caps["minute"]
    .parse()
    .context("invalid minute")?;
  let second: u32 = caps
    .name("second")
    .map(|m| m.as_str().parse())
    .transpose()
    .context("invalid second")?
    .unwrap_or(0);

  NaiveTime::from_hms_opt(
    hour, minute, second
  )
  .ok_or_else(|| {
    anyhow!(
      "time of day out of range: \
       {trimmed}"
    )
  })
}

/// Next instant at which the wall clock
/// in `tz` reads `time`: today when that
/// is strictly after `now`, otherwise
/// tomorrow.
#[tracing::instrument(skip(now, tz))]
pub fn next_occurrence(
  time: NaiveTime,
  now: DateTime<Utc>,
  tz: Tz
) -> anyhow::Result<DateTime<Utc>> {
  let local_now = now.with_timezone(&tz);
  let today = local_now.date_naive();
  let candidate = local_to_utc(
    tz,
    today.and_time(time),
    "time-of-day-today"
  )?;
  if candidate > now {
    return Ok(candidate);
  }

  let tomorrow = today
    .succ_opt()
    .ok_or_else(|| {
      anyhow!(
        "failed to advance to next day"
      )
    })?;
  local_to_utc(
    tz,
    tomorrow.and_time(time),
    "time-of-day-tomorrow"
  )
}

/// Parses a backend timestamp. Values
/// carrying an offset are taken as-is;
/// naive values are wall-clock times in
/// `tz`; bare dates mean local midnight.
pub fn parse_backend_datetime(
  raw: &str,
  tz: Tz
) -> anyhow::Result<DateTime<Utc>> {
  let trimmed = raw.trim();
  if let Ok(dt) =
    DateTime::parse_from_rfc3339(trimmed)
  {
    return Ok(dt.with_timezone(&Utc));
  }

  for format in [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S"
  ] {
    if let Ok(naive) =
      NaiveDateTime::parse_from_str(
        trimmed, format
      )
    {
      return local_to_utc(
        tz, naive, trimmed
      );
    }
  }

  let date = parse_backend_date(trimmed)?;
  local_to_utc(
    tz,
    date.and_time(NaiveTime::MIN),
    trimmed
  )
}

pub fn parse_backend_date(
  raw: &str
) -> anyhow::Result<NaiveDate> {
  let trimmed = raw.trim();
  let date_part = trimmed
    .split_once('T')
    .map(|(date, _)| date)
    .unwrap_or(trimmed);
  NaiveDate::parse_from_str(
    date_part, "%Y-%m-%d"
  )
  .with_context(|| {
    format!(
      "invalid backend date: {trimmed}"
    )
  })
}

/// Parses an alert lead such as `"10
/// minutos antes"`, `"1 hora antes"` or
/// `"1 día antes"` into minutes. A bare
/// integer is taken as minutes.
pub fn parse_lead_label(
  raw: &str
) -> anyhow::Result<u32> {
  let trimmed = raw.trim();
  if let Ok(minutes) = trimmed.parse::<u32>()
  {
    return Ok(minutes);
  }

  let lead_re = Regex::new(
    r"(?i)^(?P<count>\d+)\s*(?P<unit>minutos?|min|horas?|d[ií]as?)\b",
  )
  .map_err(|e| {
    anyhow!(
      "internal regex compile \
       failure: {e}"
    )
  })?;
  let caps = lead_re
    .captures(trimmed)
    .ok_or_else(|| {
      anyhow!(
        "expected a lead like \
         \"30 minutos antes\", got: \
         {trimmed}"
      )
    })?;

  let count: u32 = caps["count"]
    .parse()
    .context("invalid lead count")?;
  let unit = caps["unit"].to_lowercase();
  let per_unit = if unit.starts_with("min") {
    1
  } else if unit.starts_with("hora") {
    60
  } else {
    24 * 60
  };
  count.checked_mul(per_unit).ok_or_else(
    || anyhow!("lead out of range: {trimmed}")
  )
}

#[must_use]
pub fn format_local(
  dt: DateTime<Utc>,
  tz: Tz
) -> String {
  dt.with_timezone(&tz)
    .format("%Y-%m-%d %H:%M")
    .to_string()
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveTime,
    TimeZone,
    Utc
  };

  use super::{
    next_occurrence,
    parse_backend_datetime,
    parse_lead_label,
    parse_time_of_day
  };

  #[test]
  fn lead_labels_become_minutes() {
    for (label, minutes) in [
      ("10 minutos antes", 10),
      ("30 minutos antes", 30),
      ("1 hora antes", 60),
      ("2 horas antes", 120),
      ("1 día antes", 1440),
      ("1 dia antes", 1440),
      ("45", 45)
    ] {
      assert_eq!(
        parse_lead_label(label)
          .expect("parse"),
        minutes,
        "{label}"
      );
    }
    assert!(
      parse_lead_label("pronto").is_err()
    );
  }

  #[test]
  fn parses_clock_times() {
    assert_eq!(
      parse_time_of_day("09:00")
        .expect("parse"),
      NaiveTime::from_hms_opt(9, 0, 0)
        .expect("valid time")
    );
    assert_eq!(
      parse_time_of_day("7:05:30")
        .expect("parse"),
      NaiveTime::from_hms_opt(7, 5, 30)
        .expect("valid time")
    );
    assert!(
      parse_time_of_day("25:00").is_err()
    );
    assert!(
      parse_time_of_day("nine").is_err()
    );
  }

  #[test]
  fn next_occurrence_prefers_today_when_still_ahead()
   {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 17, 7, 0, 0
      )
      .single()
      .expect("valid now");
    let time =
      NaiveTime::from_hms_opt(9, 0, 0)
        .expect("valid time");
    let next = next_occurrence(
      time,
      now,
      chrono_tz::UTC
    )
    .expect("next occurrence");
    assert_eq!(
      next - now,
      chrono::Duration::hours(2)
    );
  }

  #[test]
  fn next_occurrence_rolls_to_tomorrow_when_passed()
   {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 17, 9, 0, 0
      )
      .single()
      .expect("valid now");
    let time =
      NaiveTime::from_hms_opt(9, 0, 0)
        .expect("valid time");
    let next = next_occurrence(
      time,
      now,
      chrono_tz::UTC
    )
    .expect("next occurrence");
    assert_eq!(
      next - now,
      chrono::Duration::hours(24)
    );
  }

  #[test]
  fn next_occurrence_respects_timezone()
  {
    // 08:30 UTC is 09:30 in Madrid
    // during winter.
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 17, 8, 30, 0
      )
      .single()
      .expect("valid now");
    let time =
      NaiveTime::from_hms_opt(10, 0, 0)
        .expect("valid time");
    let next = next_occurrence(
      time,
      now,
      chrono_tz::Europe::Madrid
    )
    .expect("next occurrence");
    assert_eq!(
      next - now,
      chrono::Duration::minutes(30)
    );
  }

  #[test]
  fn parses_backend_timestamps() {
    let naive = parse_backend_datetime(
      "2026-02-17T10:00:00",
      chrono_tz::Europe::Madrid
    )
    .expect("naive timestamp");
    assert_eq!(
      naive,
      Utc
        .with_ymd_and_hms(
          2026, 2, 17, 9, 0, 0
        )
        .single()
        .expect("valid")
    );

    let offset = parse_backend_datetime(
      "2026-02-17T10:00:00Z",
      chrono_tz::Europe::Madrid
    )
    .expect("rfc3339 timestamp");
    assert_eq!(
      offset,
      Utc
        .with_ymd_and_hms(
          2026, 2, 17, 10, 0, 0
        )
        .single()
        .expect("valid")
    );

    let date_only =
      parse_backend_datetime(
        "2026-02-17",
        chrono_tz::UTC
      )
      .expect("date only");
    assert_eq!(
      date_only,
      Utc
        .with_ymd_and_hms(
          2026, 2, 17, 0, 0, 0
        )
        .single()
        .expect("valid")
    );
  }
}
