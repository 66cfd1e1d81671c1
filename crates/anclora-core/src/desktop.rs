//! Terminal implementations of the
//! platform traits: permission kept in
//! the data directory and asked for on
//! stdin, notifications printed to
//! stdout.

use std::io::{
  self,
  BufRead,
  IsTerminal,
  Write
};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{
  debug,
  info,
  warn
};
use uuid::Uuid;

use crate::datastore::DataStore;
use crate::dispatch::{
  NotificationRecord,
  NotificationSurface
};
use crate::error::NotifyError;
use crate::permission::{
  Permission,
  PermissionPlatform,
  WorkerRegistrar
};
use crate::render::Renderer;
use crate::worker::{
  ClientDirectory,
  WindowClient
};

pub struct TerminalPlatform {
  store:       Arc<DataStore>,
  interactive: bool
}

impl TerminalPlatform {
  /// `interactive` defaults to whether
  /// stdin is a terminal.
  pub fn new(
    store: Arc<DataStore>,
    interactive: Option<bool>
  ) -> Self {
    Self {
      store,
      interactive: interactive.unwrap_or_else(
        || io::stdin().is_terminal()
      )
    }
  }
}

#[async_trait]
impl PermissionPlatform for TerminalPlatform {
  fn has_notification_display(
    &self
  ) -> bool {
    true
  }

  fn has_background_worker(&self) -> bool {
    true
  }

  fn permission(&self) -> Permission {
    match self.store.load_permission() {
      | Ok(permission) => permission,
      | Err(err) => {
        warn!(
          error = %err,
          "unreadable stored permission; \
           treating as not requested"
        );
        Permission::Default
      }
    }
  }

  async fn prompt(
    &self
  ) -> Result<Permission, NotifyError> {
    let current = self.permission();
    if current != Permission::Default {
      return Ok(current);
    }
    if !self.interactive {
      info!(
        "stdin is not a terminal; \
         permission prompt dismissed"
      );
      return Ok(Permission::Default);
    }

    let answer =
      tokio::task::spawn_blocking(|| {
        let mut out = io::stderr().lock();
        write!(
          out,
          "Allow Anclora to show \
           notifications? [y/N] "
        )?;
        out.flush()?;
        let mut line = String::new();
        io::stdin()
          .lock()
          .read_line(&mut line)?;
        Ok::<_, io::Error>(line)
      })
      .await
      .map_err(|e| {
        NotifyError::Surface(format!(
          "permission prompt aborted: {e}"
        ))
      })?
      .map_err(|e| {
        NotifyError::Surface(format!(
          "failed reading permission \
           answer: {e}"
        ))
      })?;

    let decided = match answer
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "y" | "yes" | "s" | "si" | "sí" => {
        Permission::Granted
      }
      | _ => Permission::Denied
    };
    self
      .store
      .save_permission(decided)
      .map_err(|e| {
        NotifyError::Surface(format!("{e:#}"))
      })?;
    Ok(decided)
  }
}

/// Prints notifications through the
/// renderer.
pub struct ConsoleSurface {
  label:    &'static str,
  renderer: Renderer
}

impl ConsoleSurface {
  pub fn new(
    label: &'static str,
    renderer: Renderer
  ) -> Self {
    Self { label, renderer }
  }
}

impl NotificationSurface for ConsoleSurface {
  fn label(&self) -> &'static str {
    self.label
  }

  fn display(
    &self,
    record: &NotificationRecord
  ) -> Result<(), NotifyError> {
    self
      .renderer
      .print_notification(
        io::stdout().lock(),
        self.label,
        record
      )
      .map_err(|e| {
        NotifyError::Surface(format!("{e:#}"))
      })
  }

  fn close(&self, id: Uuid) {
    debug!(surface = self.label, id = %id, "closed notification");
  }
}

/// Registers the in-process worker.
/// Fails when `worker.enabled` is off so
/// the in-page surface takes over.
pub struct LocalWorkerRegistrar {
  enabled:  bool,
  renderer: Renderer
}

impl LocalWorkerRegistrar {
  pub fn new(
    enabled: bool,
    renderer: Renderer
  ) -> Self {
    Self { enabled, renderer }
  }
}

#[async_trait]
impl WorkerRegistrar for LocalWorkerRegistrar {
  async fn register(
    &self,
    script_url: &str
  ) -> Result<
    Arc<dyn NotificationSurface>,
    NotifyError
  > {
    if !self.enabled {
      return Err(
        NotifyError::RegistrationFailure(
          format!(
            "worker disabled by \
             worker.enabled; {script_url} \
             not registered"
          )
        )
      );
    }
    Ok(Arc::new(ConsoleSurface::new(
      "worker",
      self.renderer.clone()
    )))
  }
}

/// Window directory for the terminal:
/// "opening" a client records it and
/// prints the full url.
pub struct ConsoleClients {
  origin:  String,
  windows: Mutex<Vec<WindowClient>>
}

impl ConsoleClients {
  pub fn new(
    origin: impl Into<String>,
    windows: Vec<WindowClient>
  ) -> Self {
    Self {
      origin:  origin.into(),
      windows: Mutex::new(windows)
    }
  }
}

#[async_trait]
impl ClientDirectory for ConsoleClients {
  async fn match_all(
    &self
  ) -> Vec<WindowClient> {
    self.windows.lock().clone()
  }

  async fn focus(
    &self,
    client: &WindowClient
  ) -> Result<(), NotifyError> {
    info!(client = %client.id, url = %client.url, "focus client");
    Ok(())
  }

  fn can_open_window(&self) -> bool {
    true
  }

  async fn open_window(
    &self,
    url: &str
  ) -> Result<(), NotifyError> {
    let full = if url.starts_with("http") {
      url.to_string()
    } else {
      format!(
        "{}{}",
        self.origin.trim_end_matches('/'),
        url
      )
    };
    let mut windows = self.windows.lock();
    let id = format!("window-{}", windows.len() + 1);
    info!(client = %id, url = %full, "open client");
    windows.push(WindowClient {
      id,
      url: full
    });
    Ok(())
  }

  async fn claim(&self) {
    debug!(
      clients = self.windows.lock().len(),
      "claimed clients"
    );
  }
}
