use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anclora_shared::NotificationSettingsDto;
use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::api::DEFAULT_API_URL;
use crate::controller::clamp_lead_minutes;

pub const DEFAULT_APP_ORIGIN: &str =
  "http://localhost:3000";

const DEFAULTS: [(&str, &str); 12] = [
  ("data.location", "~/.anclora"),
  ("api.url", DEFAULT_API_URL),
  ("app.origin", DEFAULT_APP_ORIGIN),
  ("color", "on"),
  ("worker.enabled", "on"),
  ("watch.refresh_seconds", "300"),
  ("notifications.enabled", "on"),
  ("notifications.budget", "on"),
  ("notifications.anclas", "on"),
  ("notifications.habits", "on"),
  ("notifications.savings", "on"),
  ("notifications.lead_minutes", "30")
];

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Config {
  pub fn defaults() -> Self {
    let mut map: HashMap<String, String> =
      DEFAULTS
        .iter()
        .map(|(k, v)| {
          (k.to_string(), v.to_string())
        })
        .collect();
    map.insert(
      "notifications.habit_time"
        .to_string(),
      NotificationSettingsDto::default()
        .habit_reminder_time
    );
    Config {
      map,
      loaded_files: vec![]
    }
  }

  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Self::defaults();

    let rc = resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading anclorarc");
      cfg.load_file(&path)?;
    } else {
      warn!(
        "no anclorarc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn get_u32(
    &self,
    key: &str
  ) -> anyhow::Result<Option<u32>> {
    self
      .map
      .get(key)
      .map(|v| {
        v.trim().parse::<u32>().with_context(
          || {
            format!(
              "config key {key} expects a \
               non-negative integer, got \
               {v}"
            )
          }
        )
      })
      .transpose()
  }

  /// Notification settings as the rc
  /// file describes them. The lead time
  /// is clamped to `1..=43200` minutes.
  pub fn notification_settings(
    &self
  ) -> anyhow::Result<NotificationSettingsDto>
  {
    let defaults =
      NotificationSettingsDto::default();
    let flag = |key: &str, default: bool| {
      self.get_bool(key).unwrap_or(default)
    };
    Ok(NotificationSettingsDto {
      enabled:             flag(
        "notifications.enabled",
        defaults.enabled
      ),
      budget_alerts:       flag(
        "notifications.budget",
        defaults.budget_alerts
      ),
      ancla_reminders:     flag(
        "notifications.anclas",
        defaults.ancla_reminders
      ),
      habit_reminders:     flag(
        "notifications.habits",
        defaults.habit_reminders
      ),
      savings_goals:       flag(
        "notifications.savings",
        defaults.savings_goals
      ),
      lead_minutes:        clamp_lead_minutes(
        self
          .get_u32(
            "notifications.lead_minutes"
          )?
          .unwrap_or(defaults.lead_minutes)
      ),
      habit_reminder_time: self
        .get("notifications.habit_time")
        .unwrap_or(
          defaults.habit_reminder_time
        )
    })
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if line.is_empty()
        || line.starts_with('#')
      {
        continue;
      }

      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var("ANCLORARC")
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(rc_env)));
  }

  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  let candidate = home.join(".anclorarc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".anclora"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::Config;

  #[test]
  fn rc_file_include_and_overrides() {
    let dir =
      tempfile::tempdir().expect("tempdir");
    let extra = dir.path().join("extra.rc");
    fs::write(
      &extra,
      "notifications.habits = off\n"
    )
    .expect("write include");
    let rc = dir.path().join("anclorarc");
    fs::write(
      &rc,
      "# local overrides\n\
       api.url = http://api.test/api\n\
       notifications.lead_minutes = 15 \
       # short\n\
       include extra.rc\n"
    )
    .expect("write rc");

    let mut cfg =
      Config::load(Some(&rc)).expect("load");
    cfg.apply_overrides(vec![(
      "rc.notifications.budget".to_string(),
      "no".to_string()
    )]);

    assert_eq!(
      cfg.get("api.url").as_deref(),
      Some("http://api.test/api")
    );
    assert_eq!(cfg.loaded_files.len(), 2);
    let settings = cfg
      .notification_settings()
      .expect("settings");
    assert_eq!(settings.lead_minutes, 15);
    assert!(!settings.habit_reminders);
    assert!(!settings.budget_alerts);
    assert!(settings.ancla_reminders);
    assert_eq!(
      settings.habit_reminder_time,
      "09:00"
    );
  }

  #[test]
  fn lead_minutes_are_clamped_and_validated()
  {
    let mut cfg = Config::defaults();
    cfg.apply_overrides(vec![(
      "notifications.lead_minutes"
        .to_string(),
      "0".to_string()
    )]);
    assert_eq!(
      cfg
        .notification_settings()
        .expect("settings")
        .lead_minutes,
      1
    );

    cfg.apply_overrides(vec![(
      "notifications.lead_minutes"
        .to_string(),
      "soon".to_string()
    )]);
    assert!(
      cfg.notification_settings().is_err()
    );
  }

  #[test]
  fn malformed_line_is_rejected() {
    let dir =
      tempfile::tempdir().expect("tempdir");
    let rc = dir.path().join("anclorarc");
    fs::write(&rc, "just words\n")
      .expect("write");
    assert!(Config::load(Some(&rc)).is_err());
  }
}
