use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::Utc;
use chrono_tz::Tz;
use tracing::{debug, error, info, instrument, warn};

use crate::alerts::{AlertSource, LiveAlerts, SampleAlerts};
use crate::api::ApiClient;
use crate::cli::Command;
use crate::config::{Config, DEFAULT_APP_ORIGIN};
use crate::controller::ViewController;
use crate::datastore::{DataStore, load_snapshot_file};
use crate::desktop::{ConsoleClients, ConsoleSurface, LocalWorkerRegistrar, TerminalPlatform};
use crate::dispatch::{
    Dispatcher, NotificationAction, NotificationData, NotificationOptions, NotificationRecord,
    actions,
};
use crate::permission::{Permission, PermissionGate};
use crate::render::Renderer;
use crate::scheduler::ReminderScheduler;
use crate::worker::{DEFAULT_PUSH_BODY, DEFAULT_PUSH_TITLE, WorkerEvent, WorkerShell};

/// Everything a subcommand needs, resolved once from flags and config.
#[derive(Debug)]
pub struct Session {
    pub cfg: Config,
    pub store: Arc<DataStore>,
    pub renderer: Renderer,
    pub timezone: Tz,
    pub snapshot_file: Option<PathBuf>,
    pub user: Option<String>,
}

impl Session {
    fn user_id(&self) -> Option<String> {
        self.user
            .clone()
            .or_else(|| self.cfg.get("user.id"))
            .filter(|id| !id.trim().is_empty())
    }

    fn origin(&self) -> String {
        self.cfg
            .get("app.origin")
            .unwrap_or_else(|| DEFAULT_APP_ORIGIN.to_string())
    }

    fn gate(&self) -> Arc<PermissionGate> {
        Arc::new(PermissionGate::new(Arc::new(TerminalPlatform::new(
            Arc::clone(&self.store),
            None,
        ))))
    }

    fn controller(&self, gate: Arc<PermissionGate>) -> anyhow::Result<ViewController> {
        let api_url = self
            .cfg
            .get("api.url")
            .ok_or_else(|| anyhow!("api.url is not configured"))?;
        let backend = Arc::new(ApiClient::new(&api_url)?);
        let settings = self.cfg.notification_settings()?;
        let sent = self.store.load_sent().context("failed to load sent.data")?;
        Ok(ViewController::new(backend, gate, settings, self.timezone).with_sent_ledger(sent))
    }

    /// Loads the dashboard from `--snapshot`, else the backend, else the
    /// cached copy of the last successful fetch.
    #[instrument(skip(self, controller))]
    async fn load_dashboard(&self, controller: &mut ViewController) -> anyhow::Result<()> {
        if let Some(path) = &self.snapshot_file {
            controller.set_snapshot(load_snapshot_file(path)?);
            return Ok(());
        }

        if let Some(user_id) = self.user_id() {
            let fetched = if controller.user_id() == Some(user_id.as_str()) {
                controller.refresh().await
            } else {
                controller.sign_in(&user_id).await
            };
            match fetched {
                Ok(()) => {
                    if let Some(snapshot) = controller.snapshot() {
                        self.store.save_snapshot(snapshot)?;
                    }
                    return Ok(());
                }
                Err(err) if controller.snapshot().is_some() => {
                    warn!(error = %err, "keeping previous dashboard");
                    return Ok(());
                }
                Err(err) => {
                    warn!(error = %err, "backend unavailable; trying cached dashboard");
                }
            }
        }

        match self.store.load_snapshot()? {
            Some(snapshot) => {
                info!(user = %snapshot.user.id, "using cached dashboard");
                controller.set_snapshot(snapshot);
                Ok(())
            }
            None => Err(anyhow!(
                "no dashboard available: set user.id, pass --user, or pass --snapshot FILE"
            )),
        }
    }

    fn worker(&self, alerts: Arc<dyn AlertSource>) -> WorkerShell {
        WorkerShell::new(
            self.origin(),
            Arc::new(ConsoleSurface::new("worker", self.renderer.clone())),
            Arc::new(ConsoleClients::new(self.origin(), Vec::new())),
            alerts,
        )
    }
}

#[instrument(skip(session, command), fields(command = command.name()))]
pub async fn dispatch(session: Session, command: Command) -> anyhow::Result<()> {
    debug!(command = command.name(), "dispatching");
    match command {
        Command::Watch { refresh } => cmd_watch(&session, refresh).await,
        Command::Plan => cmd_plan(&session).await,
        Command::Permission { request } => cmd_permission(&session, request).await,
        Command::Push { payload } => cmd_push(&session, payload).await,
        Command::Sync {
            tag,
            periodic,
            live,
        } => cmd_sync(&session, tag, periodic, live).await,
        Command::Click { action, url } => cmd_click(&session, action, url).await,
        Command::Settings { publish } => cmd_settings(&session, publish).await,
        Command::Insights { ask } => cmd_insights(&session, ask).await,
    }
}

async fn cmd_plan(session: &Session) -> anyhow::Result<()> {
    let mut controller = session.controller(session.gate())?;
    session.load_dashboard(&mut controller).await?;
    let now = Utc::now();
    session.renderer.print_plan(&controller.plan(now), now)
}

async fn cmd_permission(session: &Session, request: bool) -> anyhow::Result<()> {
    let gate = session.gate();
    if request {
        let result = gate.request_permission().await?;
        info!(permission = result.as_str(), "permission request finished");
    }
    session
        .renderer
        .print_permission(gate.current_permission(), gate.check_support())
}

async fn cmd_push(session: &Session, payload: Option<String>) -> anyhow::Result<()> {
    let mut worker = session.worker(Arc::new(SampleAlerts));
    let now = Utc::now();
    worker.start(now).await?;
    let outcome = worker
        .handle(WorkerEvent::Push(payload.map(String::into_bytes)), now)
        .await?;
    session.renderer.print_worker_outcome(&outcome)
}

async fn cmd_sync(session: &Session, tag: String, periodic: bool, live: bool) -> anyhow::Result<()> {
    let alerts: Arc<dyn AlertSource> = if live {
        let mut controller = session.controller(session.gate())?;
        session.load_dashboard(&mut controller).await?;
        let snapshot = controller
            .snapshot()
            .cloned()
            .ok_or_else(|| anyhow!("no dashboard loaded"))?;
        Arc::new(LiveAlerts::new(
            snapshot,
            controller.settings().clone(),
            session.timezone,
        ))
    } else {
        Arc::new(SampleAlerts)
    };

    let mut worker = session.worker(alerts);
    let now = Utc::now();
    worker.start(now).await?;
    let event = if periodic {
        WorkerEvent::PeriodicSync(tag)
    } else {
        WorkerEvent::Sync(tag)
    };
    let outcome = worker.handle(event, now).await?;
    session.renderer.print_worker_outcome(&outcome)
}

async fn cmd_click(session: &Session, action: Option<String>, url: String) -> anyhow::Result<()> {
    let mut worker = session.worker(Arc::new(SampleAlerts));
    let now = Utc::now();
    worker.start(now).await?;

    let record = NotificationRecord::build(
        DEFAULT_PUSH_TITLE,
        DEFAULT_PUSH_BODY,
        NotificationOptions {
            actions: vec![
                NotificationAction::new(actions::VIEW, "Ver"),
                NotificationAction::new(actions::DISMISS, "Descartar"),
            ],
            data: Some(NotificationData {
                url,
                ..NotificationData::default()
            }),
            ..NotificationOptions::default()
        },
        now,
    );
    let outcome = worker
        .handle(WorkerEvent::NotificationClick { record, action }, now)
        .await?;
    session.renderer.print_worker_outcome(&outcome)
}

async fn cmd_settings(session: &Session, publish: bool) -> anyhow::Result<()> {
    let settings = session.cfg.notification_settings()?;
    session.renderer.print_settings(&settings)?;
    if !publish {
        return Ok(());
    }

    let user_id = session
        .user_id()
        .ok_or_else(|| anyhow!("publishing settings needs user.id or --user"))?;
    let mut controller = session.controller(session.gate())?.with_user(user_id);
    controller.update_settings(settings).await?;
    info!("notification settings published");
    Ok(())
}

async fn cmd_insights(session: &Session, ask: Option<String>) -> anyhow::Result<()> {
    let user_id = session
        .user_id()
        .ok_or_else(|| anyhow!("insights need user.id or --user"))?;
    let controller = session.controller(session.gate())?.with_user(user_id);
    let reply = match ask {
        Some(message) => controller.ai_chat(&message).await?,
        None => controller.ai_recommendations().await?,
    };
    session.renderer.print_json(&reply)
}

#[instrument(skip(session))]
async fn cmd_watch(session: &Session, refresh: Option<u64>) -> anyhow::Result<()> {
    let refresh_secs = match refresh {
        Some(secs) => secs,
        None => session
            .cfg
            .get_u32("watch.refresh_seconds")?
            .map(u64::from)
            .unwrap_or(300),
    }
    .max(1);

    let gate = session.gate();
    let registrar = Arc::new(LocalWorkerRegistrar::new(
        session.cfg.get_bool("worker.enabled").unwrap_or(true),
        session.renderer.clone(),
    ));
    if let Some(registration) = gate.initialize(registrar)
        && let Err(err) = registration.await
    {
        warn!(error = %err, "worker registration task did not finish");
    }

    if gate.current_permission() == Permission::Default
        && std::io::stdin().is_terminal()
        && let Err(err) = gate.request_permission().await
    {
        warn!(error = %err, "could not request notification permission");
    }

    let dispatcher = Dispatcher::new(
        Arc::clone(&gate),
        Arc::new(ConsoleSurface::new("page", session.renderer.clone())),
    );
    let scheduler = ReminderScheduler::new(dispatcher, session.timezone);
    let mut controller = session.controller(Arc::clone(&gate))?;

    info!(refresh_secs, "watching for reminders");
    let mut ticker = tokio::time::interval(Duration::from_secs(refresh_secs));
    let shutdown = wait_for_shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                warn!("received shutdown signal; stopping watch");
                break;
            }
            _ = ticker.tick() => {
                if let Err(err) = session.load_dashboard(&mut controller).await {
                    error!(error = %format!("{err:#}"), "dashboard refresh failed");
                    continue;
                }
                let report = controller.apply_notification_settings(&scheduler, Utc::now());
                session.store.save_sent(controller.sent_ledger())?;
                session.renderer.print_apply_report(&report)?;
                session.renderer.print_pending(&scheduler.pending())?;
            }
        }
    }

    let cancelled = scheduler.cancel_all();
    info!(cancelled, "watch stopped; pending reminders dropped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(stream) => stream,
        Err(error) => {
            error!(%error, "failed to register SIGINT handler; falling back to ctrl_c");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(error) => {
            error!(%error, "failed to register SIGTERM handler; falling back to ctrl_c");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed waiting for ctrl_c signal");
    }
}
