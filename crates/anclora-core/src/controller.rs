//! View controller.
//!
//! Owns the signed-in user, the current
//! dashboard snapshot and the current
//! view. Every mutation goes to the
//! backend first and is followed by a
//! full refetch; the snapshot is only
//! ever replaced whole.

use std::collections::{
  BTreeSet,
  HashSet
};
use std::sync::Arc;

use anclora_shared::{
  AnclaDto,
  DashboardSnapshot,
  HabitDto,
  NotificationSettingsDto,
  SavingsGoalDto,
  UserCreate
};
use chrono::{
  DateTime,
  NaiveDate,
  NaiveTime,
  Utc
};
use chrono_tz::Tz;
use serde_json::Value;
use tracing::{
  debug,
  info,
  warn
};

use crate::alerts::savings_milestone;
use crate::api::{
  Backend,
  Mutation
};
use crate::datetime::{
  next_occurrence,
  parse_lead_label,
  parse_time_of_day
};
use crate::dispatch::{
  NotificationRecord,
  actions
};
use crate::error::NotifyError;
use crate::permission::{
  Permission,
  PermissionGate
};
use crate::scheduler::{
  BUDGET_ALERT_THRESHOLD,
  ReminderKey,
  ReminderKind,
  ReminderScheduler,
  SavingsMilestone,
  ScheduleOutcome,
  ancla_start
};

/// Upper bound on any reminder lead
/// time: thirty days.
pub const MAX_LEAD_MINUTES: u32 = 43_200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
  ProfileSelection,
  Dashboard,
  Timeline,
  AdvancedBudget,
  CreateAncla {
    selected_date: Option<NaiveDate>
  },
  CreateHabit,
  CreateObjective,
  CreateTransaction,
  CreateDiary,
  CreateBudgetLimit,
  CreateSavingsGoal,
  AddMoney {
    goal_id:    String,
    goal_title: String
  },
  NotificationSettings
}

impl View {
  pub fn slug(&self) -> &'static str {
    match self {
      | Self::ProfileSelection => {
        "profile-selection"
      }
      | Self::Dashboard => "dashboard",
      | Self::Timeline => "timeline",
      | Self::AdvancedBudget => {
        "advanced-budget"
      }
      | Self::CreateAncla {
        ..
      } => "create-ancla",
      | Self::CreateHabit => "create-habit",
      | Self::CreateObjective => {
        "create-objective"
      }
      | Self::CreateTransaction => {
        "create-transaction"
      }
      | Self::CreateDiary => "create-diary",
      | Self::CreateBudgetLimit => {
        "create-budget-limit"
      }
      | Self::CreateSavingsGoal => {
        "create-savings-goal"
      }
      | Self::AddMoney {
        ..
      } => "add-money",
      | Self::NotificationSettings => {
        "notification-settings"
      }
    }
  }

  /// Maps a notification deep link to a
  /// view. Only views reachable without a
  /// payload have links.
  pub fn from_deep_link(
    link: &str
  ) -> Option<Self> {
    let path = link
      .split(['?', '#'])
      .next()
      .unwrap_or_default()
      .trim_end_matches('/');
    match path {
      | "" | "/dashboard" => {
        Some(Self::Dashboard)
      }
      | "/timeline" => Some(Self::Timeline),
      | "/advanced-budget" => {
        Some(Self::AdvancedBudget)
      }
      | "/notification-settings" => {
        Some(Self::NotificationSettings)
      }
      | _ => None
    }
  }
}

impl std::fmt::Display for View {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>
  ) -> std::fmt::Result {
    f.write_str(self.slug())
  }
}

/// One qualifying event found in a
/// snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedReminder {
  Ancla {
    ancla:        AnclaDto,
    lead_minutes: u32,
    fire_at:      DateTime<Utc>
  },
  Habit {
    habit:   HabitDto,
    time:    NaiveTime,
    fire_at: DateTime<Utc>
  },
  BudgetAlert {
    category:   String,
    percentage: f64,
    limit:      f64,
    spent:      f64
  },
  SavingsGoal {
    goal:      SavingsGoalDto,
    milestone: SavingsMilestone,
    band:      u32
  }
}

impl PlannedReminder {
  pub fn key(&self) -> ReminderKey {
    match self {
      | Self::Ancla {
        ancla, ..
      } => {
        ReminderKey::new(
          ancla.id.clone(),
          ReminderKind::Ancla
        )
      }
      | Self::Habit {
        habit, ..
      } => {
        ReminderKey::new(
          habit.id.clone(),
          ReminderKind::Habit
        )
      }
      | Self::BudgetAlert {
        category,
        ..
      } => {
        ReminderKey::new(
          category.clone(),
          ReminderKind::BudgetAlert
        )
      }
      | Self::SavingsGoal {
        goal, ..
      } => {
        ReminderKey::new(
          goal.id.clone(),
          ReminderKind::SavingsGoal
        )
      }
    }
  }

  /// Fire time of timed reminders;
  /// `None` for immediate alerts.
  pub fn fire_at(
    &self
  ) -> Option<DateTime<Utc>> {
    match self {
      | Self::Ancla {
        fire_at, ..
      }
      | Self::Habit {
        fire_at, ..
      } => Some(*fire_at),
      | Self::BudgetAlert {
        ..
      }
      | Self::SavingsGoal {
        ..
      } => None
    }
  }

  pub fn subject_label(&self) -> &str {
    match self {
      | Self::Ancla {
        ancla, ..
      } => &ancla.title,
      | Self::Habit {
        habit, ..
      } => &habit.name,
      | Self::BudgetAlert {
        category,
        ..
      } => category,
      | Self::SavingsGoal {
        goal, ..
      } => &goal.title
    }
  }

  /// Ledger key for immediate alerts:
  /// `<subject>:<kind>:<band>`. The band
  /// changes when an alert escalates, so
  /// escalations are shown again.
  pub fn ledger_key(
    &self
  ) -> Option<String> {
    let band = match self {
      | Self::Ancla {
        ..
      }
      | Self::Habit {
        ..
      } => return None,
      | Self::BudgetAlert {
        percentage,
        ..
      } => {
        if *percentage >= 100.0 {
          "100".to_string()
        } else {
          "90".to_string()
        }
      }
      | Self::SavingsGoal {
        milestone,
        band,
        ..
      } => {
        match milestone {
          | SavingsMilestone::Deadline => {
            "deadline".to_string()
          }
          | SavingsMilestone::Completed
          | SavingsMilestone::Progress => {
            band.to_string()
          }
        }
      }
    };
    let key = self.key();
    Some(format!(
      "{}:{}:{band}",
      key.subject,
      key.kind.tag()
    ))
  }
}

/// Clamps a lead time into
/// `1..=MAX_LEAD_MINUTES`.
pub fn clamp_lead_minutes(
  minutes: u32
) -> u32 {
  minutes.clamp(1, MAX_LEAD_MINUTES)
}

fn ancla_lead_minutes(
  ancla: &AnclaDto,
  default_lead: u32
) -> u32 {
  if !ancla.alert_enabled {
    return default_lead;
  }
  match ancla
    .alert_time
    .as_deref()
    .map(str::trim)
    .filter(|raw| !raw.is_empty())
    .map(parse_lead_label)
  {
    | Some(Ok(minutes)) => {
      clamp_lead_minutes(minutes)
    }
    | Some(Err(err)) => {
      warn!(
        ancla = %ancla.id,
        error = %err,
        "ignoring unreadable alert_time"
      );
      default_lead
    }
    | None => default_lead
  }
}

/// Finds every event in `snapshot` that
/// deserves a notification under
/// `settings`. Pure: arms nothing.
pub fn plan_reminders(
  snapshot: &DashboardSnapshot,
  settings: &NotificationSettingsDto,
  now: DateTime<Utc>,
  tz: Tz
) -> Vec<PlannedReminder> {
  let mut plan = Vec::new();
  if !settings.enabled {
    return plan;
  }
  let lead =
    clamp_lead_minutes(settings.lead_minutes);

  if settings.ancla_reminders {
    for ancla in &snapshot.anclas.active {
      let start = match ancla_start(ancla, tz)
      {
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
      if start <= now {
        continue;
      }
      let lead_minutes =
        ancla_lead_minutes(ancla, lead);
      plan.push(PlannedReminder::Ancla {
        ancla: ancla.clone(),
        lead_minutes,
        fire_at: start
          - chrono::Duration::minutes(
            i64::from(lead_minutes)
          )
      });
    }
  }

  if settings.habit_reminders
    && !snapshot.habits.is_empty()
  {
    match parse_time_of_day(
      &settings.habit_reminder_time
    )
    .and_then(|time| {
      Ok((time, next_occurrence(time, now, tz)?))
    }) {
      | Ok((time, fire_at)) => {
        for habit in &snapshot.habits {
          plan.push(PlannedReminder::Habit {
            habit: habit.clone(),
            time,
            fire_at
          });
        }
      }
      | Err(err) => {
        warn!(
          time = %settings.habit_reminder_time,
          error = %err,
          "skipping habit reminders"
        );
      }
    }
  }

  if settings.budget_alerts {
    for alert in snapshot
      .budget_analytics
      .iter()
      .flat_map(|a| a.budget_alerts.iter())
      .filter(|a| {
        a.percentage >= BUDGET_ALERT_THRESHOLD
      })
    {
      plan.push(
        PlannedReminder::BudgetAlert {
          category:   alert.category.clone(),
          percentage: alert.percentage,
          limit:      alert.limit,
          spent:      alert.spent
        }
      );
    }
  }

  if settings.savings_goals {
    let today =
      now.with_timezone(&tz).date_naive();
    for goal in &snapshot.savings_goals {
      if let Some((milestone, band)) =
        savings_milestone(goal, today)
      {
        plan.push(
          PlannedReminder::SavingsGoal {
            goal: goal.clone(),
            milestone,
            band
          }
        );
      }
    }
  }

  plan
}

/// What one pass of
/// [`ViewController::apply_notification_settings`]
/// did.
#[derive(
  Debug, Clone, Copy, Default, PartialEq,
  Eq,
)]
pub struct ApplyReport {
  pub armed:      usize,
  pub dropped:    usize,
  pub dispatched: usize,
  pub duplicates: usize,
  pub failed:     usize,
  pub cancelled:  usize,
  pub snoozed:    usize
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
  Snoozed(ScheduleOutcome),
  Navigated(View),
  HabitTracked(String),
  Dismissed,
  Ignored
}

pub struct ViewController {
  backend:  Arc<dyn Backend>,
  gate:     Arc<PermissionGate>,
  timezone: Tz,
  user_id:  Option<String>,
  snapshot: Option<DashboardSnapshot>,
  settings: NotificationSettingsDto,
  view:     View,
  sent:     BTreeSet<String>
}

impl std::fmt::Debug for ViewController {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>
  ) -> std::fmt::Result {
    f.debug_struct("ViewController")
      .field("user_id", &self.user_id)
      .field("view", &self.view)
      .field(
        "has_snapshot",
        &self.snapshot.is_some()
      )
      .field("sent", &self.sent.len())
      .finish()
  }
}

impl ViewController {
  pub fn new(
    backend: Arc<dyn Backend>,
    gate: Arc<PermissionGate>,
    settings: NotificationSettingsDto,
    timezone: Tz
  ) -> Self {
    Self {
      backend,
      gate,
      timezone,
      user_id: None,
      snapshot: None,
      settings,
      view: View::ProfileSelection,
      sent: BTreeSet::new()
    }
  }

  /// Restores the ledger of immediate
  /// alerts already shown.
  pub fn with_sent_ledger(
    mut self,
    sent: BTreeSet<String>
  ) -> Self {
    self.sent = sent;
    self
  }

  /// Signs `user_id` in without loading
  /// its dashboard.
  pub fn with_user(
    mut self,
    user_id: impl Into<String>
  ) -> Self {
    self.user_id = Some(user_id.into());
    self
  }

  pub fn sent_ledger(
    &self
  ) -> &BTreeSet<String> {
    &self.sent
  }

  pub fn user_id(&self) -> Option<&str> {
    self.user_id.as_deref()
  }

  pub fn view(&self) -> &View {
    &self.view
  }

  pub fn snapshot(
    &self
  ) -> Option<&DashboardSnapshot> {
    self.snapshot.as_ref()
  }

  pub fn settings(
    &self
  ) -> &NotificationSettingsDto {
    &self.settings
  }

  pub fn navigate(&mut self, view: View) {
    if self.user_id.is_none()
      && view != View::ProfileSelection
    {
      debug!(
        view = %view,
        "no user signed in; staying on \
         profile selection"
      );
      self.view = View::ProfileSelection;
      return;
    }
    debug!(from = %self.view, to = %view, "navigate");
    self.view = view;
  }

  /// Follows a deep link; unknown links
  /// land on the dashboard.
  pub fn navigate_link(
    &mut self,
    link: &str
  ) -> View {
    let view = View::from_deep_link(link)
      .unwrap_or_else(|| {
        warn!(link = %link, "unknown deep link");
        View::Dashboard
      });
    self.navigate(view);
    self.view.clone()
  }

  /// Seeds a snapshot without a backend
  /// round trip, e.g. from a cache.
  pub fn set_snapshot(
    &mut self,
    snapshot: DashboardSnapshot
  ) {
    if self.user_id.is_none() {
      self.user_id =
        Some(snapshot.user.id.clone());
    }
    self.snapshot = Some(snapshot);
  }

  pub async fn sign_in(
    &mut self,
    user_id: &str
  ) -> Result<(), NotifyError> {
    self.user_id = Some(user_id.to_string());
    self.refresh().await?;
    self.navigate(View::Dashboard);
    Ok(())
  }

  /// Creates a profile, signs it in and
  /// loads its dashboard.
  #[tracing::instrument(skip(self, user), fields(email = %user.email))]
  pub async fn select_profile(
    &mut self,
    user: &UserCreate
  ) -> Result<(), NotifyError> {
    let created =
      self.backend.create_user(user).await?;
    info!(user = %created.id, "profile created");
    self.sign_in(&created.id).await
  }

  /// Refetches the dashboard plus budget
  /// analytics and savings goals. On a
  /// failed dashboard fetch the previous
  /// snapshot stays in place.
  #[tracing::instrument(skip(self))]
  pub async fn refresh(
    &mut self
  ) -> Result<(), NotifyError> {
    let Some(user_id) = self.user_id.clone()
    else {
      return Ok(());
    };

    let mut snapshot = match self
      .backend
      .dashboard(&user_id)
      .await
    {
      | Ok(snapshot) => snapshot,
      | Err(err) => {
        warn!(
          user = %user_id,
          error = %err,
          "dashboard refresh failed; \
           keeping previous snapshot"
        );
        return Err(err);
      }
    };

    match self
      .backend
      .budget_analytics(&user_id)
      .await
    {
      | Ok(analytics) => {
        snapshot.budget_analytics =
          Some(analytics);
      }
      | Err(err) => {
        warn!(
          error = %err,
          "budget analytics unavailable"
        );
      }
    }
    match self
      .backend
      .savings_goals(&user_id)
      .await
    {
      | Ok(goals) => {
        snapshot.savings_goals = goals;
      }
      | Err(err) => {
        warn!(
          error = %err,
          "savings goals unavailable"
        );
      }
    }

    info!(
      user = %user_id,
      active = snapshot.anclas.active.len(),
      habits = snapshot.habits.len(),
      "dashboard refreshed"
    );
    self.snapshot = Some(snapshot);
    Ok(())
  }

  /// Sends a mutation, refetches and
  /// returns to the dashboard.
  #[tracing::instrument(skip(self, mutation), fields(mutation = mutation.name()))]
  pub async fn mutate(
    &mut self,
    mutation: Mutation
  ) -> Result<(), NotifyError> {
    let user_id = self
      .user_id
      .clone()
      .ok_or(NotifyError::NotSignedIn)?;
    self
      .backend
      .mutate(&user_id, &mutation)
      .await?;
    if let Err(err) = self.refresh().await {
      debug!(error = %err, "refetch after mutation failed");
    }
    self.navigate(View::Dashboard);
    Ok(())
  }

  /// Stores new settings locally and
  /// publishes them to the backend.
  pub async fn update_settings(
    &mut self,
    mut settings: NotificationSettingsDto
  ) -> Result<(), NotifyError> {
    settings.lead_minutes =
      clamp_lead_minutes(settings.lead_minutes);
    self.settings = settings;
    if let Some(user_id) = &self.user_id {
      self
        .backend
        .update_notification_settings(
          user_id,
          &self.settings
        )
        .await?;
    }
    Ok(())
  }

  pub async fn ai_recommendations(
    &self
  ) -> Result<Value, NotifyError> {
    let user_id = self.require_user()?;
    self
      .backend
      .ai_recommendations(user_id)
      .await
  }

  pub async fn ai_chat(
    &self,
    message: &str
  ) -> Result<Value, NotifyError> {
    let user_id = self.require_user()?;
    self.backend.ai_chat(user_id, message).await
  }

  pub fn plan(
    &self,
    now: DateTime<Utc>
  ) -> Vec<PlannedReminder> {
    match &self.snapshot {
      | Some(snapshot) => {
        plan_reminders(
          snapshot,
          &self.settings,
          now,
          self.timezone
        )
      }
      | None => Vec::new()
    }
  }

  /// Hands every planned reminder to the
  /// scheduler. Timed reminders replace
  /// their keyed predecessor unless it is
  /// an earlier snooze; immediate alerts
  /// already in the ledger are skipped.
  /// Unsnoozed timers whose subject left
  /// the plan are cancelled.
  #[tracing::instrument(skip(self, scheduler, now))]
  pub fn apply_notification_settings(
    &mut self,
    scheduler: &ReminderScheduler,
    now: DateTime<Utc>
  ) -> ApplyReport {
    let mut report = ApplyReport::default();

    let permission =
      self.gate.current_permission();
    if !self.settings.enabled
      || permission != Permission::Granted
    {
      report.cancelled = scheduler.cancel_all();
      info!(
        enabled = self.settings.enabled,
        permission = permission.as_str(),
        cancelled = report.cancelled,
        "notifications inactive; \
         nothing scheduled"
      );
      return report;
    }

    let plan = self.plan(now);
    let planned: HashSet<ReminderKey> =
      plan.iter().map(|p| p.key()).collect();
    for pending in scheduler.pending() {
      if !pending.snoozed
        && !planned.contains(&pending.key)
        && scheduler.cancel(&pending.key)
      {
        report.cancelled += 1;
      }
    }

    let mut live_ledger = BTreeSet::new();
    for reminder in &plan {
      if let Some(ledger_key) =
        reminder.ledger_key()
      {
        live_ledger.insert(ledger_key.clone());
        if self.sent.contains(&ledger_key) {
          report.duplicates += 1;
          continue;
        }
        let shown = match reminder {
          | PlannedReminder::BudgetAlert {
            category,
            percentage,
            limit,
            spent
          } => {
            scheduler.schedule_budget_alert(
              category,
              *percentage,
              *limit,
              *spent
            )
          }
          | PlannedReminder::SavingsGoal {
            goal,
            milestone,
            ..
          } => {
            scheduler
              .schedule_savings_goal_update(
                goal, *milestone
              )
          }
          | PlannedReminder::Ancla {
            ..
          }
          | PlannedReminder::Habit {
            ..
          } => continue
        };
        match shown {
          | Ok(_) => {
            report.dispatched += 1;
            self.sent.insert(ledger_key);
          }
          | Err(err) => {
            report.failed += 1;
            warn!(
              alert = %ledger_key,
              error = %err,
              "immediate alert not shown"
            );
          }
        }
        continue;
      }

      let outcome = match reminder {
        | PlannedReminder::Ancla {
          ancla,
          lead_minutes,
          ..
        } => {
          scheduler.schedule_ancla_reminder(
            ancla,
            *lead_minutes,
            now
          )
        }
        | PlannedReminder::Habit {
          habit,
          time,
          ..
        } => {
          scheduler.schedule_habit_reminder(
            habit, *time, now
          )
        }
        | PlannedReminder::BudgetAlert {
          ..
        }
        | PlannedReminder::SavingsGoal {
          ..
        } => continue
      };
      match outcome {
        | Ok(ScheduleOutcome::Armed {
          ..
        }) => report.armed += 1,
        | Ok(ScheduleOutcome::Dropped {
          ..
        }) => report.dropped += 1,
        | Ok(ScheduleOutcome::SnoozeKept {
          ..
        }) => report.snoozed += 1,
        | Err(err) => {
          report.failed += 1;
          warn!(
            key = %reminder.key(),
            error = %err,
            "reminder not armed"
          );
        }
      }
    }

    self
      .sent
      .retain(|key| live_ledger.contains(key));

    info!(
      armed = report.armed,
      dropped = report.dropped,
      dispatched = report.dispatched,
      duplicates = report.duplicates,
      failed = report.failed,
      cancelled = report.cancelled,
      snoozed = report.snoozed,
      "notification settings applied"
    );
    report
  }

  /// Routes a notification action taken
  /// in the page context.
  #[tracing::instrument(skip(self, record, scheduler, now), fields(id = %record.id))]
  pub async fn handle_action(
    &mut self,
    record: &NotificationRecord,
    action: &str,
    scheduler: &ReminderScheduler,
    now: DateTime<Utc>
  ) -> anyhow::Result<ActionOutcome> {
    let outcome = match action {
      | actions::SNOOZE => {
        ActionOutcome::Snoozed(
          scheduler.snooze(record, now)?
        )
      }
      | actions::VIEW
      | actions::VIEW_ANCLA
      | actions::VIEW_BUDGET
      | actions::VIEW_SAVINGS => {
        ActionOutcome::Navigated(
          self.navigate_link(&record.data.url)
        )
      }
      | actions::ADD_MONEY => {
        let goal = record
          .data
          .subject
          .as_deref()
          .and_then(|id| self.find_goal(id));
        let view = match goal {
          | Some(goal) => {
            View::AddMoney {
              goal_id:    goal.id.clone(),
              goal_title: goal.title.clone()
            }
          }
          | None => View::AdvancedBudget
        };
        self.navigate(view);
        ActionOutcome::Navigated(
          self.view.clone()
        )
      }
      | actions::MARK_DONE => {
        let habit_id = record
          .data
          .subject
          .clone()
          .ok_or_else(|| {
            anyhow::anyhow!(
              "notification {} names no \
               habit",
              record.id
            )
          })?;
        self
          .mutate(Mutation::TrackHabit {
            id: habit_id.clone()
          })
          .await?;
        ActionOutcome::HabitTracked(habit_id)
      }
      | actions::DISMISS => {
        ActionOutcome::Dismissed
      }
      | other => {
        warn!(action = %other, "unknown notification action");
        ActionOutcome::Ignored
      }
    };
    debug!(?outcome, "handled notification action");
    Ok(outcome)
  }

  fn find_goal(
    &self,
    id: &str
  ) -> Option<&SavingsGoalDto> {
    self
      .snapshot
      .as_ref()?
      .savings_goals
      .iter()
      .find(|goal| goal.id == id)
  }

  fn require_user(
    &self
  ) -> Result<&str, NotifyError> {
    self
      .user_id
      .as_deref()
      .ok_or(NotifyError::NotSignedIn)
  }
}

#[cfg(test)]
pub(crate) mod testing {
  use anclora_shared::{
    AnclaDto,
    AnclaGroups,
    AnclaStatus,
    AnclaType,
    BudgetAnalyticsDto,
    DashboardSnapshot,
    HabitDto,
    NotificationSettingsDto,
    Priority,
    SavingsGoalDto,
    UserCreate,
    UserDto,
    UserProfile
  };
  use async_trait::async_trait;
  use parking_lot::Mutex;
  use serde_json::{
    Value,
    json
  };

  use crate::api::{
    Backend,
    Mutation
  };
  use crate::error::NotifyError;

  pub fn ancla(
    id: &str,
    start_date: &str
  ) -> AnclaDto {
    AnclaDto {
      id:            id.to_string(),
      user_id:       "u-1".to_string(),
      title:         format!("Ancla {id}"),
      description:   String::new(),
      kind:          AnclaType::Task,
      priority:      Priority::Important,
      category_id:   String::new(),
      status:        AnclaStatus::Active,
      all_day:       false,
      start_date:    start_date.to_string(),
      end_date:      None,
      start_time:    None,
      end_time:      None,
      alert_enabled: false,
      alert_time:    None,
      emoji:         String::new()
    }
  }

  pub fn snapshot() -> DashboardSnapshot {
    DashboardSnapshot {
      user:              UserDto {
        id:              "u-1".to_string(),
        email:           "ana@example.com"
          .to_string(),
        name:            "Ana".to_string(),
        profile:         UserProfile::Professional,
        rank:            String::new(),
        total_completed: 0,
        current_streak:  0,
        best_streak:     0
      },
      anclas:            AnclaGroups::default(),
      habits:            vec![HabitDto {
        id:                    "h-1".to_string(),
        name:                  "Meditar"
          .to_string(),
        frequency:             7,
        current_week_count:    2,
        completion_percentage: 28.0
      }],
      objectives:        vec![],
      transactions:      vec![],
      diary_entries:     vec![],
      budget_categories: Value::Null,
      budget_analytics:  None,
      savings_goals:     vec![]
    }
  }

  /// In-memory backend. `fail_dashboard`
  /// makes dashboard fetches fail.
  #[derive(Default)]
  pub struct FakeBackend {
    pub dashboard:      Mutex<Option<DashboardSnapshot>>,
    pub analytics:      Mutex<Option<BudgetAnalyticsDto>>,
    pub goals:          Mutex<Vec<SavingsGoalDto>>,
    pub fail_dashboard: Mutex<bool>,
    pub mutations:      Mutex<Vec<Mutation>>,
    pub settings:       Mutex<Vec<NotificationSettingsDto>>,
    pub fetches:        Mutex<usize>
  }

  #[async_trait]
  impl Backend for FakeBackend {
    async fn create_user(
      &self,
      user: &UserCreate
    ) -> Result<UserDto, NotifyError> {
      Ok(UserDto {
        id:              "u-new".to_string(),
        email:           user.email.clone(),
        name:            user.name.clone(),
        profile:         user.profile,
        rank:            String::new(),
        total_completed: 0,
        current_streak:  0,
        best_streak:     0
      })
    }

    async fn dashboard(
      &self,
      _user_id: &str
    ) -> Result<DashboardSnapshot, NotifyError>
    {
      *self.fetches.lock() += 1;
      if *self.fail_dashboard.lock() {
        return Err(
          NotifyError::NetworkFailure(
            "connection refused".to_string()
          )
        );
      }
      self.dashboard.lock().clone().ok_or_else(
        || {
          NotifyError::NetworkFailure(
            "404".to_string()
          )
        }
      )
    }

    async fn budget_analytics(
      &self,
      _user_id: &str
    ) -> Result<BudgetAnalyticsDto, NotifyError>
    {
      self.analytics.lock().clone().ok_or_else(
        || {
          NotifyError::NetworkFailure(
            "no analytics".to_string()
          )
        }
      )
    }

    async fn savings_goals(
      &self,
      _user_id: &str
    ) -> Result<Vec<SavingsGoalDto>, NotifyError>
    {
      Ok(self.goals.lock().clone())
    }

    async fn mutate(
      &self,
      _user_id: &str,
      mutation: &Mutation
    ) -> Result<(), NotifyError> {
      self
        .mutations
        .lock()
        .push(mutation.clone());
      Ok(())
    }

    async fn update_notification_settings(
      &self,
      _user_id: &str,
      settings: &NotificationSettingsDto
    ) -> Result<(), NotifyError> {
      self
        .settings
        .lock()
        .push(settings.clone());
      Ok(())
    }

    async fn ai_recommendations(
      &self,
      _user_id: &str
    ) -> Result<Value, NotifyError> {
      Ok(json!({ "recommendations": [] }))
    }

    async fn ai_chat(
      &self,
      _user_id: &str,
      message: &str
    ) -> Result<Value, NotifyError> {
      Ok(json!({ "response": message }))
    }
  }
}
