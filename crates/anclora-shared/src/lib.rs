use std::collections::BTreeMap;

use serde::{
  Deserialize,
  Serialize
};
use serde_json::Value;

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "snake_case")]
pub enum UserProfile {
  ContentCreator,
  Freelancer,
  Student,
  Professional
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "lowercase")]
pub enum AnclaType {
  Task,
  Event
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
  Urgent,
  Important,
  Informative
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
#[serde(rename_all = "lowercase")]
pub enum AnclaStatus {
  #[default]
  Active,
  Completed,
  Overdue
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
  Income,
  Expense
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
  Happy,
  Neutral,
  Sad,
  Excited,
  Stressed
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct UserDto {
  pub id:              String,
  pub email:           String,
  pub name:            String,
  pub profile:         UserProfile,
  #[serde(default)]
  pub rank:            String,
  #[serde(default)]
  pub total_completed: u64,
  #[serde(default)]
  pub current_streak:  u64,
  #[serde(default)]
  pub best_streak:     u64
}

#[derive(
  Debug, Clone, Serialize, Deserialize, PartialEq,
)]
pub struct UserCreate {
  pub email:   String,
  pub name:    String,
  pub profile: UserProfile
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct AnclaDto {
  pub id:            String,
  #[serde(default)]
  pub user_id:       String,
  pub title:         String,
  #[serde(default)]
  pub description:   String,
  #[serde(rename = "type")]
  pub kind:          AnclaType,
  pub priority:      Priority,
  #[serde(default)]
  pub category_id:   String,
  #[serde(default)]
  pub status:        AnclaStatus,
  #[serde(default)]
  pub all_day:       bool,
  pub start_date:    String,
  pub end_date:      Option<String>,
  pub start_time:    Option<String>,
  pub end_time:      Option<String>,
  #[serde(default)]
  pub alert_enabled: bool,
  pub alert_time:    Option<String>,
  #[serde(default)]
  pub emoji:         String
}

#[derive(
  Debug, Clone, Serialize, Deserialize, PartialEq,
)]
pub struct AnclaCreate {
  pub title:         String,
  pub description:   String,
  #[serde(rename = "type")]
  pub kind:          AnclaType,
  pub priority:      Priority,
  pub category_id:   String,
  pub all_day:       bool,
  pub start_date:    String,
  pub end_date:      Option<String>,
  pub start_time:    Option<String>,
  pub end_time:      Option<String>,
  pub alert_enabled: bool,
  pub alert_time:    Option<String>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Default,
)]
pub struct AnclaGroups {
  #[serde(default)]
  pub active:    Vec<AnclaDto>,
  #[serde(default)]
  pub completed: Vec<AnclaDto>,
  #[serde(default)]
  pub overdue:   Vec<AnclaDto>,
  #[serde(default)]
  pub total:     usize
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct HabitDto {
  pub id:                    String,
  pub name:                  String,
  #[serde(default)]
  pub frequency:             u32,
  #[serde(default)]
  pub current_week_count:    u32,
  #[serde(default)]
  pub completion_percentage: f64
}

#[derive(
  Debug, Clone, Serialize, Deserialize, PartialEq,
)]
pub struct HabitCreate {
  pub name:      String,
  pub frequency: u32
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct ObjectiveDto {
  pub id:                    String,
  pub title:                 String,
  #[serde(default)]
  pub description:           String,
  #[serde(default)]
  pub completion_percentage: f64,
  #[serde(default)]
  pub subtasks:              Vec<Value>
}

#[derive(
  Debug, Clone, Serialize, Deserialize, PartialEq,
)]
pub struct ObjectiveCreate {
  pub title:       String,
  pub description: String,
  #[serde(default)]
  pub subtasks:    Vec<Value>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct TransactionDto {
  pub id:          String,
  #[serde(rename = "type")]
  pub kind:        TransactionType,
  pub category:    String,
  #[serde(default)]
  pub description: String,
  pub amount:      f64,
  pub date:        String
}

#[derive(
  Debug, Clone, Serialize, Deserialize, PartialEq,
)]
pub struct TransactionCreate {
  #[serde(rename = "type")]
  pub kind:        TransactionType,
  pub category:    String,
  pub description: String,
  pub amount:      f64,
  pub date:        String
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct DiaryEntryDto {
  pub id:      String,
  pub content: String,
  pub mood:    Mood,
  pub date:    String
}

#[derive(
  Debug, Clone, Serialize, Deserialize, PartialEq,
)]
pub struct DiaryEntryCreate {
  pub content: String,
  pub mood:    Mood
}

#[derive(
  Debug, Clone, Serialize, Deserialize, PartialEq,
)]
pub struct BudgetLimitCreate {
  pub category:     String,
  pub limit_amount: f64,
  pub period:       String
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct SavingsGoalDto {
  pub id:             String,
  pub title:          String,
  pub target_amount:  f64,
  #[serde(default)]
  pub current_amount: f64,
  pub target_date:    String,
  #[serde(default)]
  pub description:    String
}

#[derive(
  Debug, Clone, Serialize, Deserialize, PartialEq,
)]
pub struct SavingsGoalCreate {
  pub title:         String,
  pub target_amount: f64,
  pub target_date:   String,
  #[serde(default)]
  pub description:   String
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct BudgetAlertDto {
  pub category:   String,
  pub percentage: f64,
  pub spent:      f64,
  pub limit:      f64,
  #[serde(default)]
  pub severity:   String
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct SavingsProgressDto {
  pub id:             String,
  pub title:          String,
  pub progress:       f64,
  #[serde(default)]
  pub current_amount: f64,
  #[serde(default)]
  pub target_amount:  f64
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Default,
)]
pub struct BudgetAnalyticsDto {
  #[serde(default)]
  pub total_income:       f64,
  #[serde(default)]
  pub total_expenses:     f64,
  #[serde(default)]
  pub net_balance:        f64,
  #[serde(default)]
  pub category_breakdown: BTreeMap<String, f64>,
  #[serde(default)]
  pub expense_trends:     Vec<Value>,
  #[serde(default)]
  pub budget_alerts:      Vec<BudgetAlertDto>,
  #[serde(default)]
  pub savings_progress:   Vec<SavingsProgressDto>,
  #[serde(default)]
  pub predictions:        Value
}

/// Aggregate read model returned by
/// `GET /users/{id}/dashboard`, with the
/// budget analytics and savings goals
/// merged in by the client after the
/// dashboard fetch.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct DashboardSnapshot {
  pub user:              UserDto,
  #[serde(default)]
  pub anclas:            AnclaGroups,
  #[serde(default)]
  pub habits:            Vec<HabitDto>,
  #[serde(default)]
  pub objectives:        Vec<ObjectiveDto>,
  #[serde(default)]
  pub transactions:      Vec<TransactionDto>,
  #[serde(default)]
  pub diary_entries:     Vec<DiaryEntryDto>,
  #[serde(default)]
  pub budget_categories: Value,
  #[serde(default)]
  pub budget_analytics:
    Option<BudgetAnalyticsDto>,
  #[serde(default)]
  pub savings_goals:     Vec<SavingsGoalDto>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct NotificationSettingsDto {
  pub enabled:             bool,
  pub budget_alerts:       bool,
  pub ancla_reminders:     bool,
  pub habit_reminders:     bool,
  pub savings_goals:       bool,
  pub lead_minutes:        u32,
  pub habit_reminder_time: String
}

impl Default for NotificationSettingsDto {
  fn default() -> Self {
    Self {
      enabled:             true,
      budget_alerts:       true,
      ancla_reminders:     true,
      habit_reminders:     true,
      savings_goals:       true,
      lead_minutes:        30,
      habit_reminder_time: "09:00"
        .to_string()
    }
  }
}

/// Body of an externally delivered push
/// message. Every field is optional.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
pub struct PushPayload {
  #[serde(default)]
  pub title: Option<String>,
  #[serde(default)]
  pub body:  Option<String>,
  #[serde(default)]
  pub url:   Option<String>
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct AiChatRequest {
  pub message: String
}
