//! Notification dispatcher.
//!
//! Builds [`NotificationRecord`]s from a
//! title, body and options, and hands
//! each one to exactly one display
//! surface: the background worker's when
//! one is registered, else the in-page
//! surface.

use std::sync::Arc;

use chrono::{
  DateTime,
  Utc
};
use parking_lot::Mutex;
use serde::{
  Deserialize,
  Serialize
};
use tracing::{
  debug,
  info
};
use uuid::Uuid;

use crate::error::NotifyError;
use crate::permission::{
  Permission,
  PermissionGate
};

pub const DEFAULT_ICON: &str =
  "/favicon.ico";
pub const DEFAULT_BADGE: &str =
  "/favicon.ico";
pub const DEFAULT_VIBRATE: [u32; 3] =
  [200, 100, 200];

/// Action identifiers understood by the
/// click and action handlers.
pub mod actions {
  pub const VIEW: &str = "view";
  pub const DISMISS: &str = "dismiss";
  pub const VIEW_BUDGET: &str =
    "view-budget";
  pub const VIEW_ANCLA: &str =
    "view-ancla";
  pub const SNOOZE: &str = "snooze";
  pub const VIEW_SAVINGS: &str =
    "view-savings";
  pub const ADD_MONEY: &str =
    "add-money";
  pub const MARK_DONE: &str =
    "mark-done";
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct NotificationAction {
  pub action: String,
  pub title:  String,
  #[serde(default)]
  pub icon:   Option<String>
}

impl NotificationAction {
  pub fn new(
    action: &str,
    title: &str
  ) -> Self {
    Self {
      action: action.to_string(),
      title:  title.to_string(),
      icon:   None
    }
  }

  pub fn with_icon(
    mut self,
    icon: &str
  ) -> Self {
    self.icon = Some(icon.to_string());
    self
  }
}

/// Data carried by a notification back
/// to whoever handles its click.
#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct NotificationData {
  pub url:     String,
  #[serde(default)]
  pub kind:    Option<String>,
  #[serde(default)]
  pub subject: Option<String>
}

impl Default for NotificationData {
  fn default() -> Self {
    Self {
      url:     "/".to_string(),
      kind:    None,
      subject: None
    }
  }
}

/// Caller-supplied options. `None`
/// fields take the dispatcher defaults.
#[derive(Debug, Clone, Default)]
pub struct NotificationOptions {
  pub icon:                Option<String>,
  pub badge:               Option<String>,
  pub vibrate:             Option<Vec<u32>>,
  pub actions:             Vec<NotificationAction>,
  pub data:                Option<NotificationData>,
  pub require_interaction: Option<bool>,
  pub silent:              Option<bool>
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct NotificationRecord {
  pub id:                  Uuid,
  pub title:               String,
  pub body:                String,
  pub icon:                String,
  pub badge:               String,
  pub vibrate:             Vec<u32>,
  pub actions:             Vec<NotificationAction>,
  pub data:                NotificationData,
  pub timestamp:           DateTime<Utc>,
  pub require_interaction: bool,
  pub silent:              bool
}

impl NotificationRecord {
  /// Merges `options` over the default
  /// icon, badge and vibration pattern
  /// and stamps a fresh id and
  /// timestamp.
  pub fn build(
    title: &str,
    body: &str,
    options: NotificationOptions,
    now: DateTime<Utc>
  ) -> Self {
    Self {
      id: Uuid::new_v4(),
      title: title.to_string(),
      body: body.to_string(),
      icon: options
        .icon
        .unwrap_or_else(|| {
          DEFAULT_ICON.to_string()
        }),
      badge: options
        .badge
        .unwrap_or_else(|| {
          DEFAULT_BADGE.to_string()
        }),
      vibrate: options
        .vibrate
        .unwrap_or_else(|| {
          DEFAULT_VIBRATE.to_vec()
        }),
      actions: options.actions,
      data: options.data.unwrap_or_default(),
      timestamp: now,
      require_interaction: options
        .require_interaction
        .unwrap_or(false),
      silent: options
        .silent
        .unwrap_or(false)
    }
  }

  pub fn has_action(
    &self,
    action: &str
  ) -> bool {
    self
      .actions
      .iter()
      .any(|a| a.action == action)
  }
}

/// A place notifications appear: the
/// background worker's surface, an
/// in-page surface, or a test recorder.
pub trait NotificationSurface:
  Send + Sync
{
  fn label(&self) -> &'static str;

  fn display(
    &self,
    record: &NotificationRecord
  ) -> Result<(), NotifyError>;

  fn close(&self, id: Uuid);
}

/// Surface that keeps every displayed
/// record in memory.
#[derive(Debug)]
pub struct MemorySurface {
  label:   &'static str,
  shown:   Mutex<Vec<NotificationRecord>>,
  closed:  Mutex<Vec<Uuid>>
}

impl MemorySurface {
  pub fn new(
    label: &'static str
  ) -> Self {
    Self {
      label,
      shown: Mutex::new(Vec::new()),
      closed: Mutex::new(Vec::new())
    }
  }

  pub fn shown(
    &self
  ) -> Vec<NotificationRecord> {
    self.shown.lock().clone()
  }

  pub fn closed(&self) -> Vec<Uuid> {
    self.closed.lock().clone()
  }
}

impl NotificationSurface
  for MemorySurface
{
  fn label(&self) -> &'static str {
    self.label
  }

  fn display(
    &self,
    record: &NotificationRecord
  ) -> Result<(), NotifyError> {
    self
      .shown
      .lock()
      .push(record.clone());
    Ok(())
  }

  fn close(&self, id: Uuid) {
    self.closed.lock().push(id);
  }
}

#[derive(Clone)]
pub struct Dispatcher {
  gate: Arc<PermissionGate>,
  page: Arc<dyn NotificationSurface>
}

impl std::fmt::Debug for Dispatcher {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>
  ) -> std::fmt::Result {
    f.debug_struct("Dispatcher")
      .field("gate", &self.gate)
      .field("page", &self.page.label())
      .finish()
  }
}

impl Dispatcher {
  pub fn new(
    gate: Arc<PermissionGate>,
    page: Arc<dyn NotificationSurface>
  ) -> Self {
    Self { gate, page }
  }

  /// Shows one notification. Fails with
  /// `PermissionDenied` unless permission
  /// is granted; never prompts.
  #[tracing::instrument(skip(self, body, options), fields(title = title))]
  pub fn show(
    &self,
    title: &str,
    body: &str,
    options: NotificationOptions
  ) -> Result<NotificationRecord, NotifyError>
  {
    let permission =
      self.gate.current_permission();
    if permission != Permission::Granted {
      debug!(
        permission = permission.as_str(),
        "refusing to show notification \
         without granted permission"
      );
      return Err(
        NotifyError::PermissionDenied
      );
    }

    let record = NotificationRecord::build(
      title,
      body,
      options,
      Utc::now()
    );
    let surface = self
      .gate
      .registration()
      .unwrap_or_else(|| {
        Arc::clone(&self.page)
      });
    surface.display(&record)?;

    info!(
      id = %record.id,
      surface = surface.label(),
      "displayed notification"
    );
    Ok(record)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;
  use std::sync::atomic::AtomicUsize;

  use super::{
    Dispatcher,
    MemorySurface,
    NotificationData,
    NotificationOptions
  };
  use crate::error::NotifyError;
  use crate::permission::testing::{
    FakePlatform,
    FakeRegistrar
  };
  use crate::permission::{
    Permission,
    PermissionGate
  };

  fn dispatcher_with(
    state: Permission
  ) -> (
    Dispatcher,
    Arc<PermissionGate>,
    Arc<MemorySurface>
  ) {
    let gate = Arc::new(
      PermissionGate::new(Arc::new(
        FakePlatform::new(
          state,
          Permission::Denied
        )
      ))
    );
    let page =
      Arc::new(MemorySurface::new("page"));
    (
      Dispatcher::new(
        gate.clone(),
        page.clone()
      ),
      gate,
      page
    )
  }

  #[test]
  fn refuses_without_granted_permission()
  {
    for state in [
      Permission::Default,
      Permission::Denied
    ] {
      let (dispatcher, _, page) =
        dispatcher_with(state);
      let err = dispatcher
        .show(
          "Hola",
          "cuerpo",
          NotificationOptions::default()
        )
        .expect_err("must refuse");
      assert!(matches!(
        err,
        NotifyError::PermissionDenied
      ));
      assert!(page.shown().is_empty());
    }
  }

  #[test]
  fn merges_defaults_and_stamps_timestamp()
  {
    let (dispatcher, _, page) =
      dispatcher_with(Permission::Granted);
    let record = dispatcher
      .show(
        "Hola",
        "cuerpo",
        NotificationOptions {
          icon: Some(
            "/custom.png".to_string()
          ),
          data: Some(NotificationData {
            url:     "/dashboard"
              .to_string(),
            kind:    None,
            subject: None
          }),
          ..NotificationOptions::default()
        }
      )
      .expect("shown");

    assert_eq!(record.icon, "/custom.png");
    assert_eq!(record.badge, "/favicon.ico");
    assert_eq!(
      record.vibrate,
      vec![200, 100, 200]
    );
    assert_eq!(record.data.url, "/dashboard");
    assert_eq!(page.shown().len(), 1);
  }

  #[test]
  fn identical_calls_produce_two_records()
  {
    let (dispatcher, _, page) =
      dispatcher_with(Permission::Granted);
    let first = dispatcher
      .show(
        "Igual",
        "igual",
        NotificationOptions::default()
      )
      .expect("first");
    let second = dispatcher
      .show(
        "Igual",
        "igual",
        NotificationOptions::default()
      )
      .expect("second");

    assert_ne!(first.id, second.id);
    assert_eq!(page.shown().len(), 2);
  }

  #[tokio::test]
  async fn prefers_worker_registration()
  {
    let (dispatcher, gate, page) =
      dispatcher_with(Permission::Granted);
    let worker =
      Arc::new(MemorySurface::new("worker"));
    gate
      .initialize(Arc::new(FakeRegistrar {
        surface: Some(worker.clone()),
        calls:   AtomicUsize::new(0)
      }))
      .expect("spawned")
      .await
      .expect("join");

    dispatcher
      .show(
        "Hola",
        "cuerpo",
        NotificationOptions::default()
      )
      .expect("shown");
    assert!(page.shown().is_empty());
    assert_eq!(worker.shown().len(), 1);
  }
}
