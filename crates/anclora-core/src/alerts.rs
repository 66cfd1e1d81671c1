//! Alert sources consulted by the
//! background worker's sync checks.
//!
//! [`LiveAlerts`] derives alerts from a
//! real dashboard snapshot.
//! [`SampleAlerts`] is a stub that
//! returns fixed sample alerts and reads
//! no application state at all.

use anclora_shared::{
  DashboardSnapshot,
  NotificationSettingsDto,
  SavingsGoalDto
};
use async_trait::async_trait;
use chrono::{
  DateTime,
  NaiveDate,
  Utc
};
use chrono_tz::Tz;
use tracing::{
  debug,
  warn
};

use crate::datetime::parse_backend_date;
use crate::scheduler::{
  BUDGET_ALERT_THRESHOLD,
  ReminderPayload,
  SavingsMilestone,
  ancla_payload,
  ancla_start,
  budget_payload,
  savings_payload,
  savings_progress_percentage
};

/// Days before a savings goal's target
/// date at which a deadline alert fires.
pub const SAVINGS_DEADLINE_DAYS: i64 = 7;

/// Width of the progress bands that
/// trigger savings progress alerts.
pub const SAVINGS_PROGRESS_BAND: u32 = 25;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum SyncCheck {
  BudgetAlerts,
  AnclaReminders,
  SavingsGoals
}

impl SyncCheck {
  pub const ALL: [SyncCheck; 3] = [
    SyncCheck::BudgetAlerts,
    SyncCheck::AnclaReminders,
    SyncCheck::SavingsGoals
  ];

  pub fn tag(self) -> &'static str {
    match self {
      | Self::BudgetAlerts => {
        "check-budget-alerts"
      }
      | Self::AnclaReminders => {
        "check-ancla-reminders"
      }
      | Self::SavingsGoals => {
        "check-savings-goals"
      }
    }
  }

  pub fn from_tag(
    tag: &str
  ) -> Option<Self> {
    Self::ALL
      .into_iter()
      .find(|check| check.tag() == tag)
  }
}

#[async_trait]
pub trait AlertSource: Send + Sync {
  fn label(&self) -> &'static str;

  async fn alerts(
    &self,
    check: SyncCheck,
    now: DateTime<Utc>
  ) -> Vec<ReminderPayload>;
}

/// Placeholder source. Every check
/// yields one canned sample alert; none
/// of it reflects the user's data.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleAlerts;

#[async_trait]
impl AlertSource for SampleAlerts {
  fn label(&self) -> &'static str {
    "sample"
  }

  async fn alerts(
    &self,
    check: SyncCheck,
    _now: DateTime<Utc>
  ) -> Vec<ReminderPayload> {
    let (title, body, url) = match check
    {
      | SyncCheck::BudgetAlerts => {
        (
          "⚠️ Alerta de Presupuesto",
          "Has superado el 90% de tu \
           límite de gastos en \
           \"Alimentación\"",
          "/advanced-budget"
        )
      }
      | SyncCheck::AnclaReminders => {
        (
          "⚓ Recordatorio de Ancla",
          "Tienes una tarea pendiente \
           que vence en 30 minutos",
          "/dashboard"
        )
      }
      | SyncCheck::SavingsGoals => {
        (
          "🏦 Meta de Ahorro",
          "¡Felicidades! Has alcanzado \
           el 75% de tu meta \
           \"Vacaciones de verano\"",
          "/advanced-budget"
        )
      }
    };

    debug!(
      check = check.tag(),
      "serving placeholder sample alert"
    );
    vec![ReminderPayload {
      title:   title.to_string(),
      body:    body.to_string(),
      url:     url.to_string(),
      actions: Vec::new()
    }]
  }
}

/// Alerts derived from a dashboard
/// snapshot and the user's notification
/// settings.
#[derive(Debug, Clone)]
pub struct LiveAlerts {
  snapshot: DashboardSnapshot,
  settings: NotificationSettingsDto,
  timezone: Tz
}

impl LiveAlerts {
  pub fn new(
    snapshot: DashboardSnapshot,
    settings: NotificationSettingsDto,
    timezone: Tz
  ) -> Self {
    Self {
      snapshot,
      settings,
      timezone
    }
  }
}

#[async_trait]
impl AlertSource for LiveAlerts {
  fn label(&self) -> &'static str {
    "live"
  }

  async fn alerts(
    &self,
    check: SyncCheck,
    now: DateTime<Utc>
  ) -> Vec<ReminderPayload> {
    if !self.settings.enabled {
      return Vec::new();
    }

    match check {
      | SyncCheck::BudgetAlerts => {
        if !self.settings.budget_alerts {
          return Vec::new();
        }
        self
          .snapshot
          .budget_analytics
          .iter()
          .flat_map(|a| a.budget_alerts.iter())
          .filter(|alert| {
            alert.percentage
              >= BUDGET_ALERT_THRESHOLD
          })
          .map(|alert| {
            budget_payload(
              &alert.category,
              alert.percentage,
              alert.limit,
              alert.spent
            )
          })
          .collect()
      }
      | SyncCheck::AnclaReminders => {
        if !self.settings.ancla_reminders
        {
          return Vec::new();
        }
        let window = chrono::Duration::minutes(
          i64::from(
            self.settings.lead_minutes
          )
        );
        let mut out = Vec::new();
        for ancla in
          &self.snapshot.anclas.active
        {
          let start = match ancla_start(
            ancla,
            self.timezone
          ) {
            | Ok(start) => start,
            | Err(err) => {
              warn!(
                ancla = %ancla.id,
                error = %err,
                "skipping ancla with \
                 unreadable start"
              );
              continue;
            }
          };
          if start <= now
            || start - now > window
          {
            continue;
          }
          let remaining =
            (start - now).num_seconds();
          let minutes =
            u32::try_from((remaining + 59) / 60)
              .unwrap_or(u32::MAX);
          out.push(ancla_payload(
            &ancla.title,
            minutes
          ));
        }
        out
      }
      | SyncCheck::SavingsGoals => {
        if !self.settings.savings_goals {
          return Vec::new();
        }
        let today = now
          .with_timezone(&self.timezone)
          .date_naive();
        self
          .snapshot
          .savings_goals
          .iter()
          .filter_map(|goal| {
            savings_milestone(goal, today)
              .map(|(milestone, _)| {
                savings_payload(
                  goal, milestone
                )
              })
          })
          .collect()
      }
    }
  }
}

/// Milestone a savings goal has reached,
/// with the progress band it sits in.
/// Completion wins over an approaching
/// deadline, which wins over progress.
pub fn savings_milestone(
  goal: &SavingsGoalDto,
  today: NaiveDate
) -> Option<(SavingsMilestone, u32)> {
  let progress =
    savings_progress_percentage(goal);
  if progress >= 100.0 {
    return Some((
      SavingsMilestone::Completed,
      100
    ));
  }

  if let Ok(target) =
    parse_backend_date(&goal.target_date)
  {
    let days_left =
      (target - today).num_days();
    if (0..=SAVINGS_DEADLINE_DAYS)
      .contains(&days_left)
    {
      return Some((
        SavingsMilestone::Deadline,
        0
      ));
    }
  }

  let band = (progress.max(0.0) as u32
    / SAVINGS_PROGRESS_BAND)
    * SAVINGS_PROGRESS_BAND;
  if band >= SAVINGS_PROGRESS_BAND {
    return Some((
      SavingsMilestone::Progress,
      band
    ));
  }
  None
}

#[cfg(test)]
mod tests {
  use anclora_shared::{
    AnclaDto,
    AnclaGroups,
    AnclaStatus,
    AnclaType,
    BudgetAlertDto,
    BudgetAnalyticsDto,
    DashboardSnapshot,
    NotificationSettingsDto,
    Priority,
    SavingsGoalDto,
    UserDto,
    UserProfile
  };
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::{
    AlertSource,
    LiveAlerts,
    SampleAlerts,
    SyncCheck,
    savings_milestone
  };
  use crate::scheduler::SavingsMilestone;

  fn goal(
    current: f64,
    target_date: &str
  ) -> SavingsGoalDto {
    SavingsGoalDto {
      id:             "g-1".to_string(),
      title:          "Coche".to_string(),
      target_amount:  1000.0,
      current_amount: current,
      target_date:    target_date
        .to_string(),
      description:    String::new()
    }
  }

  fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, 17)
      .expect("valid date")
  }

  #[test]
  fn savings_milestones_follow_priority()
  {
    assert_eq!(
      savings_milestone(
        &goal(1000.0, "2026-02-18"),
        today()
      ),
      Some((
        SavingsMilestone::Completed,
        100
      ))
    );
    assert_eq!(
      savings_milestone(
        &goal(100.0, "2026-02-20"),
        today()
      ),
      Some((
        SavingsMilestone::Deadline,
        0
      ))
    );
    assert_eq!(
      savings_milestone(
        &goal(760.0, "2026-12-31"),
        today()
      ),
      Some((
        SavingsMilestone::Progress,
        75
      ))
    );
    assert_eq!(
      savings_milestone(
        &goal(100.0, "2026-12-31"),
        today()
      ),
      None
    );
  }

  #[test]
  fn sync_tags_round_trip() {
    assert_eq!(
      SyncCheck::from_tag(
        "check-ancla-reminders"
      ),
      Some(SyncCheck::AnclaReminders)
    );
    assert_eq!(
      SyncCheck::from_tag("check-other"),
      None
    );
  }

  #[tokio::test]
  async fn sample_source_serves_one_canned_alert_per_check()
   {
    let now = Utc::now();
    for check in SyncCheck::ALL {
      let alerts =
        SampleAlerts.alerts(check, now).await;
      assert_eq!(alerts.len(), 1);
    }
  }

  #[tokio::test]
  async fn live_source_reads_the_snapshot()
  {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 17, 8, 0, 0
      )
      .single()
      .expect("valid now");
    let soon = AnclaDto {
      id:            "a-1".to_string(),
      user_id:       "u-1".to_string(),
      title:         "Entrega".to_string(),
      description:   String::new(),
      kind:          AnclaType::Task,
      priority:      Priority::Urgent,
      category_id:   String::new(),
      status:        AnclaStatus::Active,
      all_day:       false,
      start_date:    "2026-02-17T08:20:00Z"
        .to_string(),
      end_date:      None,
      start_time:    None,
      end_time:      None,
      alert_enabled: false,
      alert_time:    None,
      emoji:         String::new()
    };
    let mut later = soon.clone();
    later.id = "a-2".to_string();
    later.start_date =
      "2026-02-17T12:00:00Z".to_string();

    let snapshot = DashboardSnapshot {
      user:              UserDto {
        id:              "u-1".to_string(),
        email:           "a@b.c".to_string(),
        name:            "Ana".to_string(),
        profile:         UserProfile::Student,
        rank:            String::new(),
        total_completed: 0,
        current_streak:  0,
        best_streak:     0
      },
      anclas:            AnclaGroups {
        active: vec![soon, later],
        total: 2,
        ..AnclaGroups::default()
      },
      habits:            vec![],
      objectives:        vec![],
      transactions:      vec![],
      diary_entries:     vec![],
      budget_categories:
        serde_json::Value::Null,
      budget_analytics:  Some(
        BudgetAnalyticsDto {
          budget_alerts: vec![
            BudgetAlertDto {
              category:   "Ocio".to_string(),
              percentage: 95.0,
              spent:      95.0,
              limit:      100.0,
              severity:   "medium"
                .to_string()
            },
          ],
          ..BudgetAnalyticsDto::default()
        }
      ),
      savings_goals:     vec![]
    };
    let live = LiveAlerts::new(
      snapshot,
      NotificationSettingsDto::default(),
      chrono_tz::UTC
    );

    let anclas = live
      .alerts(SyncCheck::AnclaReminders, now)
      .await;
    assert_eq!(anclas.len(), 1);
    assert_eq!(
      anclas[0].body,
      "\"Entrega\" comienza en 20 minutos"
    );

    let budget = live
      .alerts(SyncCheck::BudgetAlerts, now)
      .await;
    assert_eq!(budget.len(), 1);
    assert!(budget[0].body.contains("Ocio"));

    assert!(
      live
        .alerts(SyncCheck::SavingsGoals, now)
        .await
        .is_empty()
    );
  }
}
