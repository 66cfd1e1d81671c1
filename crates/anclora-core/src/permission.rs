//! Notification permission gate.
//!
//! A [`PermissionGate`] is created once
//! at startup and shared by `Arc` with
//! the dispatcher and the view
//! controller. It never caches the
//! platform's answer: the platform may
//! change permission outside the app.

use std::sync::atomic::{
  AtomicBool,
  Ordering
};
use std::sync::{
  Arc,
  OnceLock
};

use async_trait::async_trait;
use serde::{
  Deserialize,
  Serialize
};
use tokio::task::JoinHandle;
use tracing::{
  debug,
  error,
  info,
  warn
};

use crate::dispatch::NotificationSurface;
use crate::error::NotifyError;

/// Script path the background worker is
/// registered under.
pub const WORKER_SCRIPT_URL: &str =
  "/sw.js";

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
pub enum Permission {
  Unsupported,
  Default,
  Granted,
  Denied
}

impl Permission {
  pub fn as_label(
    self
  ) -> &'static str {
    match self {
      | Self::Default => {
        "Permission not requested"
      }
      | Self::Granted => {
        "Permission granted"
      }
      | Self::Denied => {
        "Permission denied"
      }
      | Self::Unsupported => {
        "Notifications unsupported"
      }
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      | Self::Unsupported => {
        "unsupported"
      }
      | Self::Default => "default",
      | Self::Granted => "granted",
      | Self::Denied => "denied"
    }
  }

  pub fn parse(
    raw: &str
  ) -> Option<Self> {
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "default" | "" => {
        Some(Self::Default)
      }
      | "granted" => Some(Self::Granted),
      | "denied" => Some(Self::Denied),
      | "unsupported" => {
        Some(Self::Unsupported)
      }
      | _ => None
    }
  }
}

/// Runtime capabilities and the
/// platform's own permission prompt.
#[async_trait]
pub trait PermissionPlatform:
  Send + Sync
{
  fn has_notification_display(
    &self
  ) -> bool;

  fn has_background_worker(
    &self
  ) -> bool;

  /// Platform-level permission, one of
  /// default/granted/denied.
  fn permission(&self) -> Permission;

  /// Shows the platform prompt once and
  /// resolves with the user's answer.
  /// An already decided permission is
  /// returned without prompting.
  async fn prompt(
    &self
  ) -> Result<Permission, NotifyError>;
}

/// Registers the background worker and
/// hands back the surface it displays
/// notifications on.
#[async_trait]
pub trait WorkerRegistrar:
  Send + Sync
{
  async fn register(
    &self,
    script_url: &str
  ) -> Result<
    Arc<dyn NotificationSurface>,
    NotifyError
  >;
}

pub struct PermissionGate {
  platform:     Arc<dyn PermissionPlatform>,
  registration:
    OnceLock<Arc<dyn NotificationSurface>>,
  init_started: AtomicBool
}

impl std::fmt::Debug for PermissionGate {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>
  ) -> std::fmt::Result {
    f.debug_struct("PermissionGate")
      .field(
        "registered",
        &self.registration.get().is_some()
      )
      .field(
        "init_started",
        &self
          .init_started
          .load(Ordering::SeqCst)
      )
      .finish()
  }
}

impl PermissionGate {
  pub fn new(
    platform: Arc<dyn PermissionPlatform>
  ) -> Self {
    Self {
      platform,
      registration: OnceLock::new(),
      init_started: AtomicBool::new(
        false
      )
    }
  }

  pub fn check_support(&self) -> bool {
    self
      .platform
      .has_notification_display()
      && self
        .platform
        .has_background_worker()
  }

  pub fn current_permission(
    &self
  ) -> Permission {
    if !self
      .platform
      .has_notification_display()
    {
      return Permission::Unsupported;
    }
    self.platform.permission()
  }

  #[tracing::instrument(skip(self))]
  pub async fn request_permission(
    &self
  ) -> Result<Permission, NotifyError> {
    if !self.check_support() {
      warn!(
        "notification API unsupported \
         in this runtime"
      );
      return Err(
        NotifyError::PermissionUnsupported
      );
    }

    match self.platform.prompt().await {
      | Ok(result) => {
        info!(
          permission = result.as_str(),
          "notification permission \
           request completed"
        );
        Ok(result)
      }
      | Err(err) => {
        error!(
          error = %err,
          "notification permission \
           request failed"
        );
        Err(err)
      }
    }
  }

  /// Starts background worker
  /// registration. Only the first call
  /// does anything; it returns the
  /// spawned task so callers may await
  /// it, later calls return `None`.
  /// Failure is logged and never
  /// retried.
  pub fn initialize(
    self: &Arc<Self>,
    registrar: Arc<dyn WorkerRegistrar>
  ) -> Option<JoinHandle<()>> {
    if self
      .init_started
      .swap(true, Ordering::SeqCst)
    {
      debug!(
        "background worker \
         registration already started"
      );
      return None;
    }

    let gate = Arc::clone(self);
    Some(tokio::spawn(async move {
      match registrar
        .register(WORKER_SCRIPT_URL)
        .await
      {
        | Ok(surface) => {
          info!(
            script = WORKER_SCRIPT_URL,
            surface = surface.label(),
            "background worker registered"
          );
          let _ =
            gate.registration.set(surface);
        }
        | Err(err) => {
          error!(
            script = WORKER_SCRIPT_URL,
            error = %err,
            "background worker \
             registration failed"
          );
        }
      }
    }))
  }

  pub fn registration(
    &self
  ) -> Option<Arc<dyn NotificationSurface>>
  {
    self.registration.get().cloned()
  }
}

#[cfg(test)]
pub(crate) mod testing {
  use std::sync::Arc;
  use std::sync::atomic::{
    AtomicUsize,
    Ordering
  };

  use async_trait::async_trait;
  use parking_lot::Mutex;

  use super::{
    Permission,
    PermissionPlatform,
    WorkerRegistrar
  };
  use crate::dispatch::NotificationSurface;
  use crate::dispatch::MemorySurface;
  use crate::error::NotifyError;

  pub struct FakePlatform {
    pub display:   bool,
    pub worker:    bool,
    pub state:     Mutex<Permission>,
    pub answer:    Permission,
    pub prompts:   AtomicUsize
  }

  impl FakePlatform {
    pub fn new(
      state: Permission,
      answer: Permission
    ) -> Self {
      Self {
        display: true,
        worker: true,
        state: Mutex::new(state),
        answer,
        prompts: AtomicUsize::new(0)
      }
    }
  }

  #[async_trait]
  impl PermissionPlatform for FakePlatform {
    fn has_notification_display(
      &self
    ) -> bool {
      self.display
    }

    fn has_background_worker(
      &self
    ) -> bool {
      self.worker
    }

    fn permission(&self) -> Permission {
      *self.state.lock()
    }

    async fn prompt(
      &self
    ) -> Result<Permission, NotifyError>
    {
      let mut state = self.state.lock();
      if *state != Permission::Default {
        return Ok(*state);
      }
      self
        .prompts
        .fetch_add(1, Ordering::SeqCst);
      *state = self.answer;
      Ok(*state)
    }
  }

  pub struct FakeRegistrar {
    pub surface: Option<Arc<MemorySurface>>,
    pub calls:   AtomicUsize
  }

  #[async_trait]
  impl WorkerRegistrar for FakeRegistrar {
    async fn register(
      &self,
      _script_url: &str
    ) -> Result<
      Arc<dyn NotificationSurface>,
      NotifyError
    > {
      self
        .calls
        .fetch_add(1, Ordering::SeqCst);
      match &self.surface {
        | Some(surface) => {
          Ok(Arc::clone(surface)
            as Arc<dyn NotificationSurface>)
        }
        | None => {
          Err(
            NotifyError::RegistrationFailure(
              "script not found".to_string()
            )
          )
        }
      }
    }
  }
}
