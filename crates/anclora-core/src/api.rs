//! REST backend client.
//!
//! The backend owns every record and
//! every analytic; this client only
//! issues the calls and decodes the
//! JSON it gets back.

use std::time::Duration;

use anclora_shared::{
  AiChatRequest,
  AnclaCreate,
  BudgetAnalyticsDto,
  BudgetLimitCreate,
  DashboardSnapshot,
  DiaryEntryCreate,
  HabitCreate,
  NotificationSettingsDto,
  ObjectiveCreate,
  SavingsGoalCreate,
  SavingsGoalDto,
  TransactionCreate,
  UserCreate,
  UserDto
};
use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{
  debug,
  warn
};

use crate::error::NotifyError;

pub const DEFAULT_API_URL: &str =
  "http://localhost:8001/api";

const REQUEST_TIMEOUT: Duration =
  Duration::from_secs(30);

/// A state-changing call. Every variant
/// is followed by a dashboard refetch.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
  CreateAncla(AnclaCreate),
  UpdateAncla {
    id:    String,
    ancla: AnclaCreate
  },
  CompleteAncla {
    id: String
  },
  CreateHabit(HabitCreate),
  TrackHabit {
    id: String
  },
  CreateObjective(ObjectiveCreate),
  CreateTransaction(TransactionCreate),
  CreateDiaryEntry(DiaryEntryCreate),
  CreateBudgetLimit(BudgetLimitCreate),
  CreateSavingsGoal(SavingsGoalCreate),
  AddMoney {
    goal_id: String,
    amount:  f64
  }
}

/// Method, path and query of one call,
/// relative to the API base url.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
  pub method: Method,
  pub path:   String,
  pub query:  Vec<(&'static str, String)>,
  pub body:   Option<Value>
}

impl Route {
  fn new(
    method: Method,
    path: impl Into<String>
  ) -> Self {
    Self {
      method,
      path: path.into(),
      query: Vec::new(),
      body: None
    }
  }

  fn query(
    mut self,
    key: &'static str,
    value: impl ToString
  ) -> Self {
    self
      .query
      .push((key, value.to_string()));
    self
  }

  fn json(
    mut self,
    body: &impl Serialize
  ) -> Result<Self, NotifyError> {
    self.body = Some(
      serde_json::to_value(body).map_err(
        |e| {
          NotifyError::NetworkFailure(
            format!(
              "failed encoding request \
               body: {e}"
            )
          )
        }
      )?
    );
    Ok(self)
  }
}

impl Mutation {
  pub fn name(&self) -> &'static str {
    match self {
      | Self::CreateAncla(_) => {
        "create-ancla"
      }
      | Self::UpdateAncla {
        ..
      } => "update-ancla",
      | Self::CompleteAncla {
        ..
      } => "complete-ancla",
      | Self::CreateHabit(_) => {
        "create-habit"
      }
      | Self::TrackHabit {
        ..
      } => "track-habit",
      | Self::CreateObjective(_) => {
        "create-objective"
      }
      | Self::CreateTransaction(_) => {
        "create-transaction"
      }
      | Self::CreateDiaryEntry(_) => {
        "create-diary"
      }
      | Self::CreateBudgetLimit(_) => {
        "create-budget-limit"
      }
      | Self::CreateSavingsGoal(_) => {
        "create-savings-goal"
      }
      | Self::AddMoney {
        ..
      } => "add-money"
    }
  }

  /// Create calls are scoped to the
  /// signed-in user through `user_id`.
  pub fn route(
    &self,
    user_id: &str
  ) -> Result<Route, NotifyError> {
    match self {
      | Self::CreateAncla(body) => {
        Route::new(Method::POST, "/anclas")
          .query("user_id", user_id)
          .json(body)
      }
      | Self::UpdateAncla {
        id,
        ancla
      } => {
        Route::new(
          Method::PUT,
          format!("/anclas/{id}")
        )
        .json(ancla)
      }
      | Self::CompleteAncla {
        id
      } => {
        Ok(Route::new(
          Method::POST,
          format!("/anclas/{id}/complete")
        ))
      }
      | Self::CreateHabit(body) => {
        Route::new(Method::POST, "/habits")
          .query("user_id", user_id)
          .json(body)
      }
      | Self::TrackHabit {
        id
      } => {
        Ok(Route::new(
          Method::POST,
          format!("/habits/{id}/track")
        ))
      }
      | Self::CreateObjective(body) => {
        Route::new(
          Method::POST,
          "/objectives"
        )
        .query("user_id", user_id)
        .json(body)
      }
      | Self::CreateTransaction(body) => {
        Route::new(
          Method::POST,
          "/transactions"
        )
        .query("user_id", user_id)
        .json(body)
      }
      | Self::CreateDiaryEntry(body) => {
        Route::new(Method::POST, "/diary")
          .query("user_id", user_id)
          .json(body)
      }
      | Self::CreateBudgetLimit(body) => {
        Route::new(
          Method::POST,
          "/budget-limits"
        )
        .query("user_id", user_id)
        .json(body)
      }
      | Self::CreateSavingsGoal(body) => {
        Route::new(
          Method::POST,
          "/savings-goals"
        )
        .query("user_id", user_id)
        .json(body)
      }
      | Self::AddMoney {
        goal_id,
        amount
      } => {
        Ok(Route::new(
          Method::PUT,
          format!(
            "/savings-goals/{goal_id}/\
             add-money"
          )
        )
        .query("amount", amount))
      }
    }
  }
}

/// The calls the view controller makes
/// against the backend.
#[async_trait]
pub trait Backend: Send + Sync {
  async fn create_user(
    &self,
    user: &UserCreate
  ) -> Result<UserDto, NotifyError>;

  async fn dashboard(
    &self,
    user_id: &str
  ) -> Result<DashboardSnapshot, NotifyError>;

  async fn budget_analytics(
    &self,
    user_id: &str
  ) -> Result<BudgetAnalyticsDto, NotifyError>;

  async fn savings_goals(
    &self,
    user_id: &str
  ) -> Result<Vec<SavingsGoalDto>, NotifyError>;

  async fn mutate(
    &self,
    user_id: &str,
    mutation: &Mutation
  ) -> Result<(), NotifyError>;

  async fn update_notification_settings(
    &self,
    user_id: &str,
    settings: &NotificationSettingsDto
  ) -> Result<(), NotifyError>;

  async fn ai_recommendations(
    &self,
    user_id: &str
  ) -> Result<Value, NotifyError>;

  async fn ai_chat(
    &self,
    user_id: &str,
    message: &str
  ) -> Result<Value, NotifyError>;
}

#[derive(Debug, Clone)]
pub struct ApiClient {
  base_url: String,
  http:     reqwest::Client
}

impl ApiClient {
  pub fn new(
    base_url: &str
  ) -> anyhow::Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(REQUEST_TIMEOUT)
      .build()
      .map_err(|e| {
        anyhow::anyhow!(
          "failed building HTTP client \
           for backend: {e}"
        )
      })?;
    Ok(Self {
      base_url: base_url
        .trim_end_matches('/')
        .to_string(),
      http
    })
  }

  pub fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url, path)
  }

  async fn send(
    &self,
    route: Route
  ) -> Result<reqwest::Response, NotifyError>
  {
    let url = reqwest::Url::parse_with_params(
      &self.url(&route.path),
      &route.query
    )
    .map_err(|e| {
      NotifyError::NetworkFailure(format!(
        "invalid backend url {}: {e}",
        self.url(&route.path)
      ))
    })?;
    debug!(
      method = %route.method,
      url = %url,
      "backend request"
    );
    let mut request = self
      .http
      .request(route.method.clone(), url.clone())
      .header(
        reqwest::header::ACCEPT,
        "application/json"
      );
    if let Some(body) = &route.body {
      request = request.json(body);
    }

    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }

    let body =
      response.text().await.unwrap_or_default();
    warn!(
      method = %route.method,
      url = %url,
      status = %status,
      "backend returned non-success \
       status"
    );
    Err(NotifyError::NetworkFailure(
      format!(
        "{} {} returned HTTP {}: {}",
        route.method,
        route.path,
        status,
        body.trim()
      )
    ))
  }

  async fn fetch<T: DeserializeOwned>(
    &self,
    route: Route
  ) -> Result<T, NotifyError> {
    let path = route.path.clone();
    self
      .send(route)
      .await?
      .json::<T>()
      .await
      .map_err(|e| {
        NotifyError::NetworkFailure(
          format!(
            "failed decoding {path}: {e}"
          )
        )
      })
  }
}

#[async_trait]
impl Backend for ApiClient {
  async fn create_user(
    &self,
    user: &UserCreate
  ) -> Result<UserDto, NotifyError> {
    self
      .fetch(
        Route::new(Method::POST, "/users")
          .json(user)?
      )
      .await
  }

  async fn dashboard(
    &self,
    user_id: &str
  ) -> Result<DashboardSnapshot, NotifyError>
  {
    self
      .fetch(Route::new(
        Method::GET,
        format!("/users/{user_id}/dashboard")
      ))
      .await
  }

  async fn budget_analytics(
    &self,
    user_id: &str
  ) -> Result<BudgetAnalyticsDto, NotifyError>
  {
    self
      .fetch(Route::new(
        Method::GET,
        format!("/budget-analytics/{user_id}")
      ))
      .await
  }

  async fn savings_goals(
    &self,
    user_id: &str
  ) -> Result<Vec<SavingsGoalDto>, NotifyError>
  {
    self
      .fetch(Route::new(
        Method::GET,
        format!("/savings-goals/{user_id}")
      ))
      .await
  }

  #[tracing::instrument(skip(self, mutation), fields(mutation = mutation.name()))]
  async fn mutate(
    &self,
    user_id: &str,
    mutation: &Mutation
  ) -> Result<(), NotifyError> {
    self
      .send(mutation.route(user_id)?)
      .await?;
    Ok(())
  }

  async fn update_notification_settings(
    &self,
    user_id: &str,
    settings: &NotificationSettingsDto
  ) -> Result<(), NotifyError> {
    self
      .send(
        Route::new(
          Method::PUT,
          format!(
            "/notification-settings/\
             {user_id}"
          )
        )
        .json(settings)?
      )
      .await?;
    Ok(())
  }

  async fn ai_recommendations(
    &self,
    user_id: &str
  ) -> Result<Value, NotifyError> {
    self
      .fetch(Route::new(
        Method::GET,
        format!(
          "/ai-recommendations/{user_id}"
        )
      ))
      .await
  }

  async fn ai_chat(
    &self,
    user_id: &str,
    message: &str
  ) -> Result<Value, NotifyError> {
    self
      .fetch(
        Route::new(
          Method::POST,
          format!("/ai-chat/{user_id}")
        )
        .json(&AiChatRequest {
          message: message.to_string()
        })?
      )
      .await
  }
}

#[cfg(test)]
mod tests {
  use anclora_shared::{
    HabitCreate,
    SavingsGoalCreate
  };
  use reqwest::Method;

  use super::{
    ApiClient,
    Mutation
  };

  #[test]
  fn create_calls_carry_the_user_id() {
    let route = Mutation::CreateHabit(
      HabitCreate {
        name:      "Leer".to_string(),
        frequency: 5
      }
    )
    .route("u-1")
    .expect("route");
    assert_eq!(route.method, Method::POST);
    assert_eq!(route.path, "/habits");
    assert_eq!(
      route.query,
      vec![("user_id", "u-1".to_string())]
    );
    assert_eq!(
      route.body.expect("body")["name"],
      "Leer"
    );

    let goal = Mutation::CreateSavingsGoal(
      SavingsGoalCreate {
        title:         "Coche".to_string(),
        target_amount: 5000.0,
        target_date:   "2026-12-31"
          .to_string(),
        description:   String::new()
      }
    )
    .route("u-1")
    .expect("route");
    assert_eq!(goal.path, "/savings-goals");
  }

  #[test]
  fn add_money_passes_amount_in_query() {
    let route = Mutation::AddMoney {
      goal_id: "g-9".to_string(),
      amount:  25.5
    }
    .route("u-1")
    .expect("route");
    assert_eq!(route.method, Method::PUT);
    assert_eq!(
      route.path,
      "/savings-goals/g-9/add-money"
    );
    assert_eq!(
      route.query,
      vec![("amount", "25.5".to_string())]
    );
    assert!(route.body.is_none());
  }

  #[test]
  fn track_and_complete_have_no_body() {
    for (mutation, path) in [
      (
        Mutation::TrackHabit {
          id: "h-1".to_string()
        },
        "/habits/h-1/track"
      ),
      (
        Mutation::CompleteAncla {
          id: "a-1".to_string()
        },
        "/anclas/a-1/complete"
      )
    ] {
      let route =
        mutation.route("u-1").expect("route");
      assert_eq!(route.path, path);
      assert!(route.query.is_empty());
      assert!(route.body.is_none());
    }
  }

  #[test]
  fn base_url_drops_trailing_slash() {
    let client = ApiClient::new(
      "http://localhost:8001/api/"
    )
    .expect("client");
    assert_eq!(
      client.url("/users"),
      "http://localhost:8001/api/users"
    );
  }
}
