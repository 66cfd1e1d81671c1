//! Background worker shell.
//!
//! Runs outside any page: shows pushed
//! notifications, routes notification
//! clicks to an open client or a new
//! one, and answers sync checks from its
//! [`AlertSource`]. It shares no state
//! with the page context.

use std::sync::Arc;

use anclora_shared::PushPayload;
use async_trait::async_trait;
use chrono::{
  DateTime,
  Utc
};
use tracing::{
  debug,
  error,
  info,
  warn
};

use crate::alerts::{
  AlertSource,
  SyncCheck
};
use crate::dispatch::{
  DEFAULT_ICON,
  NotificationAction,
  NotificationData,
  NotificationOptions,
  NotificationRecord,
  NotificationSurface,
  actions
};
use crate::error::NotifyError;
use crate::scheduler::ReminderPayload;

pub const DEFAULT_PUSH_TITLE: &str =
  "⚓ Anclora";
pub const DEFAULT_PUSH_BODY: &str =
  "Tienes una nueva notificación de \
   Anclora";
pub const DEFAULT_CLICK_URL: &str = "/";

/// Periodic sync tag that runs every
/// check.
pub const PERIODIC_CHECK_TAG: &str =
  "check-notifications";

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum WorkerState {
  Installing,
  Activating,
  Activated
}

#[derive(
  Debug, Clone, PartialEq, Eq,
)]
pub struct WindowClient {
  pub id:  String,
  pub url: String
}

/// Open application windows the worker
/// can focus, and the facility to open a
/// new one.
#[async_trait]
pub trait ClientDirectory: Send + Sync {
  async fn match_all(
    &self
  ) -> Vec<WindowClient>;

  async fn focus(
    &self,
    client: &WindowClient
  ) -> Result<(), NotifyError>;

  fn can_open_window(&self) -> bool;

  async fn open_window(
    &self,
    url: &str
  ) -> Result<(), NotifyError>;

  /// Takes control of every open client
  /// without waiting for a reload.
  async fn claim(&self);
}

#[derive(Debug, Clone)]
pub enum WorkerEvent {
  Install,
  Activate,
  Push(Option<Vec<u8>>),
  NotificationClick {
    record: NotificationRecord,
    action: Option<String>
  },
  Sync(String),
  PeriodicSync(String)
}

impl WorkerEvent {
  fn name(&self) -> &'static str {
    match self {
      | Self::Install => "install",
      | Self::Activate => "activate",
      | Self::Push(_) => "push",
      | Self::NotificationClick {
        ..
      } => "notificationclick",
      | Self::Sync(_) => "sync",
      | Self::PeriodicSync(_) => {
        "periodicsync"
      }
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutcome {
  Installed,
  Activated,
  Shown(Vec<NotificationRecord>),
  Dismissed,
  Focused(String),
  Opened(String),
  NoClient,
  Ignored
}

pub struct WorkerShell {
  state:   WorkerState,
  origin:  String,
  surface: Arc<dyn NotificationSurface>,
  clients: Arc<dyn ClientDirectory>,
  alerts:  Arc<dyn AlertSource>
}

impl std::fmt::Debug for WorkerShell {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>
  ) -> std::fmt::Result {
    f.debug_struct("WorkerShell")
      .field("state", &self.state)
      .field("origin", &self.origin)
      .field("surface", &self.surface.label())
      .field("alerts", &self.alerts.label())
      .finish()
  }
}

impl WorkerShell {
  pub fn new(
    origin: impl Into<String>,
    surface: Arc<dyn NotificationSurface>,
    clients: Arc<dyn ClientDirectory>,
    alerts: Arc<dyn AlertSource>
  ) -> Self {
    Self {
      state: WorkerState::Installing,
      origin: origin.into(),
      surface,
      clients,
      alerts
    }
  }

  pub fn state(&self) -> WorkerState {
    self.state
  }

  /// Runs install and activate back to
  /// back.
  pub async fn start(
    &mut self,
    now: DateTime<Utc>
  ) -> Result<(), NotifyError> {
    self
      .handle(WorkerEvent::Install, now)
      .await?;
    self
      .handle(WorkerEvent::Activate, now)
      .await?;
    Ok(())
  }

  #[tracing::instrument(skip(self, event, now), fields(event = event.name()))]
  pub async fn handle(
    &mut self,
    event: WorkerEvent,
    now: DateTime<Utc>
  ) -> Result<WorkerOutcome, NotifyError> {
    match event {
      | WorkerEvent::Install => {
        info!(
          "worker installed; skipping \
           waiting"
        );
        self.state =
          WorkerState::Activating;
        Ok(WorkerOutcome::Installed)
      }
      | WorkerEvent::Activate => {
        self.clients.claim().await;
        self.state =
          WorkerState::Activated;
        info!(
          "worker activated; claimed \
           open clients"
        );
        Ok(WorkerOutcome::Activated)
      }
      | other
        if self.state
          != WorkerState::Activated =>
      {
        warn!(
          event = other.name(),
          state = ?self.state,
          "ignoring event before \
           activation"
        );
        Ok(WorkerOutcome::Ignored)
      }
      | WorkerEvent::Push(data) => {
        self.on_push(data.as_deref(), now)
      }
      | WorkerEvent::NotificationClick {
        record,
        action
      } => {
        self
          .on_click(
            &record,
            action.as_deref()
          )
          .await
      }
      | WorkerEvent::Sync(tag) => {
        match SyncCheck::from_tag(&tag) {
          | Some(check) => {
            Ok(WorkerOutcome::Shown(
              self.run_check(check, now).await
            ))
          }
          | None => {
            debug!(tag = %tag, "unknown sync tag");
            Ok(WorkerOutcome::Ignored)
          }
        }
      }
      | WorkerEvent::PeriodicSync(tag) => {
        if tag != PERIODIC_CHECK_TAG {
          debug!(tag = %tag, "unknown periodic sync tag");
          return Ok(WorkerOutcome::Ignored);
        }
        let mut shown = Vec::new();
        for check in SyncCheck::ALL {
          shown.extend(
            self.run_check(check, now).await
          );
        }
        Ok(WorkerOutcome::Shown(shown))
      }
    }
  }

  fn on_push(
    &self,
    data: Option<&[u8]>,
    now: DateTime<Utc>
  ) -> Result<WorkerOutcome, NotifyError> {
    let payload = match data {
      | Some(bytes) => {
        serde_json::from_slice::<PushPayload>(
          bytes
        )
        .unwrap_or_else(|err| {
          warn!(
            error = %err,
            "push payload is not valid \
             JSON; using defaults"
          );
          PushPayload::default()
        })
      }
      | None => PushPayload::default()
    };

    let record = self.show(
      payload
        .title
        .as_deref()
        .unwrap_or(DEFAULT_PUSH_TITLE),
      payload
        .body
        .as_deref()
        .unwrap_or(DEFAULT_PUSH_BODY),
      payload
        .url
        .as_deref()
        .unwrap_or(DEFAULT_CLICK_URL),
      now
    )?;
    Ok(WorkerOutcome::Shown(vec![record]))
  }

  async fn on_click(
    &self,
    record: &NotificationRecord,
    action: Option<&str>
  ) -> Result<WorkerOutcome, NotifyError> {
    self.surface.close(record.id);

    if action == Some(actions::DISMISS) {
      debug!(id = %record.id, "notification dismissed");
      return Ok(WorkerOutcome::Dismissed);
    }

    let open = self.clients.match_all().await;
    if let Some(client) = open
      .iter()
      .find(|c| c.url.starts_with(&self.origin))
    {
      self.clients.focus(client).await?;
      info!(client = %client.id, "focused open client");
      return Ok(WorkerOutcome::Focused(
        client.id.clone()
      ));
    }

    if !self.clients.can_open_window() {
      return Ok(WorkerOutcome::NoClient);
    }

    let target = if record.data.url.is_empty()
    {
      DEFAULT_CLICK_URL
    } else {
      record.data.url.as_str()
    };
    self.clients.open_window(target).await?;
    info!(url = %target, "opened new client");
    Ok(WorkerOutcome::Opened(
      target.to_string()
    ))
  }

  async fn run_check(
    &self,
    check: SyncCheck,
    now: DateTime<Utc>
  ) -> Vec<NotificationRecord> {
    let alerts =
      self.alerts.alerts(check, now).await;
    let mut shown = Vec::new();
    for ReminderPayload {
      title,
      body,
      url,
      ..
    } in alerts
    {
      match self.show(&title, &body, &url, now)
      {
        | Ok(record) => shown.push(record),
        | Err(err) => {
          error!(
            check = check.tag(),
            error = %err,
            "error checking alerts"
          );
        }
      }
    }
    shown
  }

  fn show(
    &self,
    title: &str,
    body: &str,
    url: &str,
    now: DateTime<Utc>
  ) -> Result<NotificationRecord, NotifyError>
  {
    let record = NotificationRecord::build(
      title,
      body,
      NotificationOptions {
        actions: vec![
          NotificationAction::new(
            actions::VIEW,
            "Ver"
          )
          .with_icon(DEFAULT_ICON),
          NotificationAction::new(
            actions::DISMISS,
            "Descartar"
          ),
        ],
        data: Some(NotificationData {
          url: url.to_string(),
          ..NotificationData::default()
        }),
        ..NotificationOptions::default()
      },
      now
    );
    self.surface.display(&record)?;
    Ok(record)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use async_trait::async_trait;
  use chrono::Utc;
  use parking_lot::Mutex;

  use super::{
    ClientDirectory,
    WindowClient,
    WorkerEvent,
    WorkerOutcome,
    WorkerShell,
    WorkerState
  };
  use crate::alerts::SampleAlerts;
  use crate::dispatch::MemorySurface;
  use crate::error::NotifyError;

  #[derive(Default)]
  struct FakeClients {
    open:    Vec<WindowClient>,
    focused: Mutex<Vec<String>>,
    opened:  Mutex<Vec<String>>
  }

  #[async_trait]
  impl ClientDirectory for FakeClients {
    async fn match_all(
      &self
    ) -> Vec<WindowClient> {
      self.open.clone()
    }

    async fn focus(
      &self,
      client: &WindowClient
    ) -> Result<(), NotifyError> {
      self
        .focused
        .lock()
        .push(client.id.clone());
      Ok(())
    }

    fn can_open_window(&self) -> bool {
      true
    }

    async fn open_window(
      &self,
      url: &str
    ) -> Result<(), NotifyError> {
      self
        .opened
        .lock()
        .push(url.to_string());
      Ok(())
    }

    async fn claim(&self) {}
  }

  async fn started_shell(
    clients: Arc<FakeClients>
  ) -> (WorkerShell, Arc<MemorySurface>) {
    let surface =
      Arc::new(MemorySurface::new("worker"));
    let mut shell = WorkerShell::new(
      "http://localhost:3000",
      surface.clone(),
      clients,
      Arc::new(SampleAlerts)
    );
    shell
      .start(Utc::now())
      .await
      .expect("start");
    (shell, surface)
  }

  #[tokio::test]
  async fn lifecycle_reaches_activated() {
    let (shell, _) =
      started_shell(Arc::new(FakeClients::default()))
        .await;
    assert_eq!(
      shell.state(),
      WorkerState::Activated
    );
  }

  #[tokio::test]
  async fn ignores_events_before_activation()
   {
    let surface =
      Arc::new(MemorySurface::new("worker"));
    let mut shell = WorkerShell::new(
      "http://localhost:3000",
      surface.clone(),
      Arc::new(FakeClients::default()),
      Arc::new(SampleAlerts)
    );
    let outcome = shell
      .handle(
        WorkerEvent::Push(None),
        Utc::now()
      )
      .await
      .expect("handled");
    assert_eq!(outcome, WorkerOutcome::Ignored);
    assert!(surface.shown().is_empty());
  }

  #[tokio::test]
  async fn push_payload_drives_the_notification()
   {
    let (mut shell, surface) =
      started_shell(Arc::new(FakeClients::default()))
        .await;
    shell
      .handle(
        WorkerEvent::Push(Some(
          br#"{"title": "X", "body": "Y", "url": "/z"}"#
            .to_vec()
        )),
        Utc::now()
      )
      .await
      .expect("push");

    let shown = surface.shown();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].title, "X");
    assert_eq!(shown[0].body, "Y");
    assert_eq!(shown[0].data.url, "/z");
    assert!(shown[0].has_action("view"));
    assert!(shown[0].has_action("dismiss"));
  }

  #[tokio::test]
  async fn empty_or_broken_push_uses_canned_text()
   {
    let (mut shell, surface) =
      started_shell(Arc::new(FakeClients::default()))
        .await;
    for data in [
      None,
      Some(b"not json".to_vec())
    ] {
      shell
        .handle(
          WorkerEvent::Push(data),
          Utc::now()
        )
        .await
        .expect("push");
    }

    for record in surface.shown() {
      assert_eq!(record.title, "⚓ Anclora");
      assert_eq!(
        record.body,
        "Tienes una nueva notificación de Anclora"
      );
      assert_eq!(record.data.url, "/");
    }
  }

  #[tokio::test]
  async fn dismiss_click_closes_without_navigation()
   {
    let clients =
      Arc::new(FakeClients::default());
    let (mut shell, surface) =
      started_shell(clients.clone()).await;
    let WorkerOutcome::Shown(records) = shell
      .handle(
        WorkerEvent::Push(None),
        Utc::now()
      )
      .await
      .expect("push")
    else {
      panic!("expected shown records");
    };

    let outcome = shell
      .handle(
        WorkerEvent::NotificationClick {
          record: records[0].clone(),
          action: Some("dismiss".to_string())
        },
        Utc::now()
      )
      .await
      .expect("click");

    assert_eq!(outcome, WorkerOutcome::Dismissed);
    assert_eq!(
      surface.closed(),
      vec![records[0].id]
    );
    assert!(clients.focused.lock().is_empty());
    assert!(clients.opened.lock().is_empty());
  }

  #[tokio::test]
  async fn click_focuses_open_client_or_opens_one()
   {
    let with_open = Arc::new(FakeClients {
      open: vec![
        WindowClient {
          id:  "other".to_string(),
          url: "https://example.com/"
            .to_string()
        },
        WindowClient {
          id:  "app".to_string(),
          url: "http://localhost:3000/dashboard"
            .to_string()
        },
      ],
      ..FakeClients::default()
    });
    let (mut shell, _) =
      started_shell(with_open.clone()).await;
    let WorkerOutcome::Shown(records) = shell
      .handle(
        WorkerEvent::Push(Some(
          br#"{"url": "/advanced-budget"}"#
            .to_vec()
        )),
        Utc::now()
      )
      .await
      .expect("push")
    else {
      panic!("expected shown records");
    };
    let outcome = shell
      .handle(
        WorkerEvent::NotificationClick {
          record: records[0].clone(),
          action: None
        },
        Utc::now()
      )
      .await
      .expect("click");
    assert_eq!(
      outcome,
      WorkerOutcome::Focused("app".to_string())
    );

    let none_open =
      Arc::new(FakeClients::default());
    let (mut shell, _) =
      started_shell(none_open.clone()).await;
    let outcome = shell
      .handle(
        WorkerEvent::NotificationClick {
          record: records[0].clone(),
          action: Some("view".to_string())
        },
        Utc::now()
      )
      .await
      .expect("click");
    assert_eq!(
      outcome,
      WorkerOutcome::Opened(
        "/advanced-budget".to_string()
      )
    );
    assert_eq!(
      *none_open.opened.lock(),
      vec!["/advanced-budget".to_string()]
    );
  }

  #[tokio::test]
  async fn sync_tags_show_sample_alerts() {
    let (mut shell, surface) =
      started_shell(Arc::new(FakeClients::default()))
        .await;
    let single = shell
      .handle(
        WorkerEvent::Sync(
          "check-budget-alerts".to_string()
        ),
        Utc::now()
      )
      .await
      .expect("sync");
    assert!(matches!(
      single,
      WorkerOutcome::Shown(ref r) if r.len() == 1
    ));

    let periodic = shell
      .handle(
        WorkerEvent::PeriodicSync(
          "check-notifications".to_string()
        ),
        Utc::now()
      )
      .await
      .expect("periodic");
    assert!(matches!(
      periodic,
      WorkerOutcome::Shown(ref r) if r.len() == 3
    ));

    let unknown = shell
      .handle(
        WorkerEvent::Sync(
          "check-unknown".to_string()
        ),
        Utc::now()
      )
      .await
      .expect("unknown");
    assert_eq!(unknown, WorkerOutcome::Ignored);
    assert_eq!(surface.shown().len(), 4);
  }
}
