//! Reminder scheduler.
//!
//! Timed reminders are single-shot tokio
//! timers indexed by [`ReminderKey`];
//! arming a key that already has a
//! pending timer aborts the old one.
//! Nothing is persisted: dropping the
//! scheduler drops every pending timer.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{
  AtomicU64,
  Ordering
};

use anclora_shared::{
  AnclaDto,
  HabitDto,
  SavingsGoalDto
};
use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Duration,
  NaiveTime,
  Utc
};
use chrono_tz::Tz;
use parking_lot::Mutex;
use serde::{
  Deserialize,
  Serialize
};
use tokio::task::JoinHandle;
use tracing::{
  debug,
  error,
  info
};

use crate::datetime::{
  local_to_utc,
  next_occurrence,
  parse_backend_datetime,
  parse_time_of_day
};
use crate::dispatch::{
  Dispatcher,
  NotificationAction,
  NotificationData,
  NotificationOptions,
  NotificationRecord,
  actions
};
use crate::error::NotifyError;

pub const SNOOZE_MINUTES: i64 = 10;

/// Share of a budget limit at which an
/// alert is raised.
pub const BUDGET_ALERT_THRESHOLD: f64 =
  90.0;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
)]
pub enum ReminderKind {
  Ancla,
  Habit,
  BudgetAlert,
  SavingsGoal
}

impl ReminderKind {
  pub fn tag(self) -> &'static str {
    match self {
      | Self::Ancla => "ancla-reminder",
      | Self::Habit => "habit-reminder",
      | Self::BudgetAlert => {
        "budget-alert"
      }
      | Self::SavingsGoal => {
        "savings-goal"
      }
    }
  }

  pub fn from_tag(
    tag: &str
  ) -> Option<Self> {
    match tag {
      | "ancla-reminder" => {
        Some(Self::Ancla)
      }
      | "habit-reminder" => {
        Some(Self::Habit)
      }
      | "budget-alert" => {
        Some(Self::BudgetAlert)
      }
      | "savings-goal" => {
        Some(Self::SavingsGoal)
      }
      | _ => None
    }
  }
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
)]
pub struct ReminderKey {
  pub subject: String,
  pub kind:    ReminderKind
}

impl ReminderKey {
  pub fn new(
    subject: impl Into<String>,
    kind: ReminderKind
  ) -> Self {
    Self {
      subject: subject.into(),
      kind
    }
  }

  /// Recovers the key a fired reminder
  /// was armed under.
  pub fn from_record(
    record: &NotificationRecord
  ) -> Option<Self> {
    let kind = ReminderKind::from_tag(
      record.data.kind.as_deref()?
    )?;
    let subject =
      record.data.subject.clone()?;
    Some(Self { subject, kind })
  }
}

impl std::fmt::Display for ReminderKey {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>
  ) -> std::fmt::Result {
    write!(
      f,
      "{}:{}",
      self.kind.tag(),
      self.subject
    )
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReminderPayload {
  pub title:   String,
  pub body:    String,
  pub url:     String,
  pub actions: Vec<NotificationAction>
}

impl ReminderPayload {
  pub fn options(
    &self,
    key: &ReminderKey
  ) -> NotificationOptions {
    NotificationOptions {
      actions: self.actions.clone(),
      data: Some(NotificationData {
        url:     self.url.clone(),
        kind:    Some(
          key.kind.tag().to_string()
        ),
        subject: Some(key.subject.clone())
      }),
      ..NotificationOptions::default()
    }
  }

  fn from_record(
    record: &NotificationRecord
  ) -> Self {
    Self {
      title:   record.title.clone(),
      body:    record.body.clone(),
      url:     record.data.url.clone(),
      actions: record.actions.clone()
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SavingsMilestone {
  Completed,
  Progress,
  Deadline
}

pub fn ancla_payload(
  title: &str,
  lead_minutes: u32
) -> ReminderPayload {
  ReminderPayload {
    title:   "⚓ Recordatorio de Ancla"
      .to_string(),
    body:    format!(
      "\"{title}\" comienza en \
       {lead_minutes} minutos"
    ),
    url:     "/dashboard".to_string(),
    actions: vec![
      NotificationAction::new(
        actions::VIEW_ANCLA,
        "Ver Ancla"
      ),
      NotificationAction::new(
        actions::SNOOZE,
        "Recordar en 10 min"
      ),
      NotificationAction::new(
        actions::DISMISS,
        "Descartar"
      ),
    ]
  }
}

pub fn habit_payload(
  name: &str
) -> ReminderPayload {
  ReminderPayload {
    title:   "📊 Recordatorio de Hábito"
      .to_string(),
    body:    format!(
      "Es hora de \"{name}\". ¡Mantén \
       tu racha!"
    ),
    url:     "/dashboard".to_string(),
    actions: vec![
      NotificationAction::new(
        actions::MARK_DONE,
        "Marcar Hecho"
      ),
      NotificationAction::new(
        actions::SNOOZE,
        "Recordar más tarde"
      ),
      NotificationAction::new(
        actions::DISMISS,
        "Descartar"
      ),
    ]
  }
}

pub fn budget_payload(
  category: &str,
  percentage: f64,
  limit: f64,
  spent: f64
) -> ReminderPayload {
  ReminderPayload {
    title:   "⚠️ Alerta de Presupuesto"
      .to_string(),
    body:    format!(
      "Has gastado ${spent:.2} de \
       ${limit:.2} en \"{category}\" \
       ({percentage:.1}%)"
    ),
    url:     "/advanced-budget"
      .to_string(),
    actions: vec![
      NotificationAction::new(
        actions::VIEW_BUDGET,
        "Ver Presupuesto"
      ),
      NotificationAction::new(
        actions::DISMISS,
        "Descartar"
      ),
    ]
  }
}

pub fn savings_progress_percentage(
  goal: &SavingsGoalDto
) -> f64 {
  if goal.target_amount <= 0.0 {
    return 0.0;
  }
  goal.current_amount
    / goal.target_amount
    * 100.0
}

pub fn savings_payload(
  goal: &SavingsGoalDto,
  milestone: SavingsMilestone
) -> ReminderPayload {
  let title = goal.title.as_str();
  let body = match milestone {
    | SavingsMilestone::Completed => {
      format!(
        "¡Felicidades! Has completado \
         tu meta \"{title}\""
      )
    }
    | SavingsMilestone::Progress => {
      let percentage =
        savings_progress_percentage(goal);
      format!(
        "Has alcanzado el \
         {percentage:.1}% de tu meta \
         \"{title}\""
      )
    }
    | SavingsMilestone::Deadline => {
      format!(
        "Tu meta \"{title}\" vence \
         pronto. ¡Sigue ahorrando!"
      )
    }
  };

  ReminderPayload {
    title: "🏦 Meta de Ahorro".to_string(),
    body,
    url: "/advanced-budget".to_string(),
    actions: vec![
      NotificationAction::new(
        actions::VIEW_SAVINGS,
        "Ver Ahorros"
      ),
      NotificationAction::new(
        actions::ADD_MONEY,
        "Añadir Dinero"
      ),
      NotificationAction::new(
        actions::DISMISS,
        "Descartar"
      ),
    ]
  }
}

/// Start instant of an ancla. A separate
/// `start_time` overrides the clock part
/// of `start_date` unless the ancla is
/// all-day.
pub fn ancla_start(
  ancla: &AnclaDto,
  tz: Tz
) -> anyhow::Result<DateTime<Utc>> {
  let start = parse_backend_datetime(
    &ancla.start_date,
    tz
  )
  .with_context(|| {
    format!(
      "ancla {} has invalid start_date",
      ancla.id
    )
  })?;

  let Some(raw_time) = ancla
    .start_time
    .as_deref()
    .filter(|t| !t.trim().is_empty())
  else {
    return Ok(start);
  };
  if ancla.all_day {
    return Ok(start);
  }

  let time = parse_time_of_day(raw_time)
    .with_context(|| {
      format!(
        "ancla {} has invalid \
         start_time",
        ancla.id
      )
    })?;
  let day =
    start.with_timezone(&tz).date_naive();
  local_to_utc(
    tz,
    day.and_time(time),
    "ancla-start-time"
  )
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleOutcome {
  Armed {
    fire_at:  DateTime<Utc>,
    delay:    std::time::Duration,
    replaced: bool
  },
  /// Fire time already passed; no
  /// catch-up firing.
  Dropped { fire_at: DateTime<Utc> },
  /// An earlier snoozed timer holds the
  /// key and was left in place.
  SnoozeKept {
    snoozed_until: DateTime<Utc>
  }
}

impl ScheduleOutcome {
  pub fn is_armed(&self) -> bool {
    matches!(self, Self::Armed { .. })
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingReminder {
  pub key:     ReminderKey,
  pub fire_at: DateTime<Utc>,
  pub lead:    Duration,
  pub title:   String,
  pub snoozed: bool
}

struct ArmedTimer {
  generation: u64,
  pending:    PendingReminder,
  handle:     JoinHandle<()>
}

type TimerMap =
  Arc<Mutex<HashMap<ReminderKey, ArmedTimer>>>;

pub struct ReminderScheduler {
  dispatcher:      Dispatcher,
  timezone:        Tz,
  timers:          TimerMap,
  next_generation: AtomicU64
}

impl std::fmt::Debug for ReminderScheduler {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>
  ) -> std::fmt::Result {
    f.debug_struct("ReminderScheduler")
      .field("timezone", &self.timezone)
      .field(
        "pending",
        &self.timers.lock().len()
      )
      .finish()
  }
}

impl ReminderScheduler {
  pub fn new(
    dispatcher: Dispatcher,
    timezone: Tz
  ) -> Self {
    Self {
      dispatcher,
      timezone,
      timers: Arc::new(Mutex::new(
        HashMap::new()
      )),
      next_generation: AtomicU64::new(0)
    }
  }

  #[tracing::instrument(skip(self, ancla, now), fields(ancla = %ancla.id))]
  pub fn schedule_ancla_reminder(
    &self,
    ancla: &AnclaDto,
    lead_minutes: u32,
    now: DateTime<Utc>
  ) -> anyhow::Result<ScheduleOutcome> {
    let start =
      ancla_start(ancla, self.timezone)?;
    let lead = Duration::minutes(
      i64::from(lead_minutes)
    );
    Ok(self.schedule_at(
      ReminderKey::new(
        ancla.id.clone(),
        ReminderKind::Ancla
      ),
      start - lead,
      lead,
      ancla_payload(
        &ancla.title,
        lead_minutes
      ),
      now
    ))
  }

  #[tracing::instrument(skip(self, habit, now), fields(habit = %habit.id))]
  pub fn schedule_habit_reminder(
    &self,
    habit: &HabitDto,
    time_of_day: NaiveTime,
    now: DateTime<Utc>
  ) -> anyhow::Result<ScheduleOutcome> {
    let fire_at = next_occurrence(
      time_of_day,
      now,
      self.timezone
    )?;
    Ok(self.schedule_at(
      ReminderKey::new(
        habit.id.clone(),
        ReminderKind::Habit
      ),
      fire_at,
      Duration::zero(),
      habit_payload(&habit.name),
      now
    ))
  }

  /// Shows a budget alert right away.
  #[tracing::instrument(skip(self))]
  pub fn schedule_budget_alert(
    &self,
    category: &str,
    percentage: f64,
    limit: f64,
    spent: f64
  ) -> Result<NotificationRecord, NotifyError>
  {
    self.dispatch_now(
      &ReminderKey::new(
        category,
        ReminderKind::BudgetAlert
      ),
      budget_payload(
        category, percentage, limit,
        spent
      )
    )
  }

  /// Shows a savings goal update right
  /// away.
  #[tracing::instrument(skip(self, goal), fields(goal = %goal.id))]
  pub fn schedule_savings_goal_update(
    &self,
    goal: &SavingsGoalDto,
    milestone: SavingsMilestone
  ) -> Result<NotificationRecord, NotifyError>
  {
    self.dispatch_now(
      &ReminderKey::new(
        goal.id.clone(),
        ReminderKind::SavingsGoal
      ),
      savings_payload(goal, milestone)
    )
  }

  /// Re-arms the reminder behind a fired
  /// notification for ten minutes after
  /// `now`, under its original key.
  #[tracing::instrument(skip(self, record, now), fields(id = %record.id))]
  pub fn snooze(
    &self,
    record: &NotificationRecord,
    now: DateTime<Utc>
  ) -> anyhow::Result<ScheduleOutcome> {
    let key = ReminderKey::from_record(
      record
    )
    .ok_or_else(|| {
      anyhow!(
        "notification {} carries no \
         reminder key",
        record.id
      )
    })?;

    Ok(self.arm(
      key,
      now
        + Duration::minutes(
          SNOOZE_MINUTES
        ),
      Duration::zero(),
      ReminderPayload::from_record(record),
      now,
      true
    ))
  }

  /// Arms a single-shot timer for
  /// `fire_at`, replacing any pending
  /// timer under the same key. A snoozed
  /// timer that fires before `fire_at` is
  /// kept instead.
  pub fn schedule_at(
    &self,
    key: ReminderKey,
    fire_at: DateTime<Utc>,
    lead: Duration,
    payload: ReminderPayload,
    now: DateTime<Utc>
  ) -> ScheduleOutcome {
    self.arm(
      key, fire_at, lead, payload, now,
      false
    )
  }

  fn arm(
    &self,
    key: ReminderKey,
    fire_at: DateTime<Utc>,
    lead: Duration,
    payload: ReminderPayload,
    now: DateTime<Utc>,
    snoozed: bool
  ) -> ScheduleOutcome {
    if fire_at <= now {
      debug!(
        key = %key,
        fire_at = %fire_at,
        "reminder time already passed; \
         dropping"
      );
      return ScheduleOutcome::Dropped {
        fire_at
      };
    }

    let delay = (fire_at - now)
      .to_std()
      .unwrap_or_default();
    let generation = self
      .next_generation
      .fetch_add(1, Ordering::SeqCst);

    let mut timers = self.timers.lock();
    if !snoozed
      && let Some(existing) = timers.get(&key)
      && existing.pending.snoozed
      && existing.pending.fire_at < fire_at
    {
      debug!(
        key = %key,
        snoozed_until = %existing.pending.fire_at,
        "keeping snoozed reminder"
      );
      return ScheduleOutcome::SnoozeKept {
        snoozed_until: existing
          .pending
          .fire_at
      };
    }
    let replaced = match timers.remove(&key)
    {
      | Some(previous) => {
        previous.handle.abort();
        debug!(
          key = %key,
          previous_fire_at = %previous.pending.fire_at,
          "replacing pending reminder"
        );
        true
      }
      | None => false
    };

    let pending = PendingReminder {
      key: key.clone(),
      fire_at,
      lead,
      title: payload.title.clone(),
      snoozed
    };
    let deadline =
      tokio::time::Instant::now() + delay;
    let handle = tokio::spawn(fire_after(
      deadline,
      generation,
      key.clone(),
      payload,
      self.dispatcher.clone(),
      Arc::clone(&self.timers)
    ));
    timers.insert(
      key.clone(),
      ArmedTimer {
        generation,
        pending,
        handle
      }
    );

    info!(
      key = %key,
      fire_at = %fire_at,
      delay_secs = delay.as_secs(),
      replaced,
      snoozed,
      "armed reminder"
    );
    ScheduleOutcome::Armed {
      fire_at,
      delay,
      replaced
    }
  }

  pub fn cancel(
    &self,
    key: &ReminderKey
  ) -> bool {
    match self.timers.lock().remove(key) {
      | Some(timer) => {
        timer.handle.abort();
        debug!(key = %key, "cancelled reminder");
        true
      }
      | None => false
    }
  }

  pub fn cancel_all(&self) -> usize {
    let mut timers = self.timers.lock();
    let count = timers.len();
    for (_, timer) in timers.drain() {
      timer.handle.abort();
    }
    count
  }

  /// Pending reminders ordered by fire
  /// time.
  pub fn pending(
    &self
  ) -> Vec<PendingReminder> {
    let mut out: Vec<PendingReminder> =
      self
        .timers
        .lock()
        .values()
        .map(|timer| timer.pending.clone())
        .collect();
    out.sort_by(|a, b| {
      a.fire_at
        .cmp(&b.fire_at)
        .then_with(|| a.key.cmp(&b.key))
    });
    out
  }

  fn dispatch_now(
    &self,
    key: &ReminderKey,
    payload: ReminderPayload
  ) -> Result<NotificationRecord, NotifyError>
  {
    self.dispatcher.show(
      &payload.title,
      &payload.body,
      payload.options(key)
    )
  }
}

impl Drop for ReminderScheduler {
  fn drop(&mut self) {
    self.cancel_all();
  }
}

async fn fire_after(
  deadline: tokio::time::Instant,
  generation: u64,
  key: ReminderKey,
  payload: ReminderPayload,
  dispatcher: Dispatcher,
  timers: TimerMap
) {
  tokio::time::sleep_until(deadline)
    .await;

  {
    let mut timers = timers.lock();
    if !timers
      .get(&key)
      .is_some_and(|t| {
        t.generation == generation
      })
    {
      debug!(
        key = %key,
        generation,
        "timer superseded or cancelled; \
         not firing"
      );
      return;
    }
    timers.remove(&key);
  }

  if let Err(err) = dispatcher.show(
    &payload.title,
    &payload.body,
    payload.options(&key)
  ) {
    error!(
      key = %key,
      error = %err,
      "failed to show reminder"
    );
  }
}
