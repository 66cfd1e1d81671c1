use std::io::{self, IsTerminal, Write};

use anclora_shared::NotificationSettingsDto;
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::controller::{ApplyReport, PlannedReminder};
use crate::datetime::format_local;
use crate::dispatch::NotificationRecord;
use crate::permission::Permission;
use crate::scheduler::PendingReminder;
use crate::worker::WorkerOutcome;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    timezone: Tz,
}

impl Renderer {
    pub fn new(cfg: &Config, timezone: Tz) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color, timezone })
    }

    #[tracing::instrument(skip(self, plan, now))]
    pub fn print_plan(&self, plan: &[PlannedReminder], now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if plan.is_empty() {
            writeln!(out, "No reminders to schedule.")?;
            return Ok(());
        }

        let headers = vec![
            "Kind".to_string(),
            "Subject".to_string(),
            "Fires".to_string(),
            "Detail".to_string(),
        ];

        let mut rows = Vec::with_capacity(plan.len());
        for reminder in plan {
            let key = reminder.key();
            let fires = match reminder.fire_at() {
                Some(at) if at <= now => self.paint(&format_local(at, self.timezone), "31"),
                Some(at) => format_local(at, self.timezone),
                None => self.paint("now", "33"),
            };
            let detail = match reminder {
                PlannedReminder::Ancla { lead_minutes, .. } => {
                    format!("{lead_minutes} min before start")
                }
                PlannedReminder::Habit { time, .. } => format!("daily at {}", time.format("%H:%M")),
                PlannedReminder::BudgetAlert {
                    percentage,
                    spent,
                    limit,
                    ..
                } => format!("{percentage:.1}% (${spent:.2} / ${limit:.2})"),
                PlannedReminder::SavingsGoal { milestone, band, .. } => {
                    format!("{milestone:?} {band}%")
                }
            };
            rows.push(vec![
                key.kind.tag().to_string(),
                reminder.subject_label().to_string(),
                fires,
                detail,
            ]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, pending))]
    pub fn print_pending(&self, pending: &[PendingReminder]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = vec!["Key".to_string(), "Fires".to_string(), "Title".to_string()];
        let rows = pending
            .iter()
            .map(|p| {
                vec![
                    self.paint(&p.key.to_string(), "33"),
                    format_local(p.fire_at, self.timezone),
                    p.title.clone(),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    /// Writes one notification as a framed block.
    pub fn print_notification<W: Write>(
        &self,
        mut out: W,
        surface: &str,
        record: &NotificationRecord,
    ) -> anyhow::Result<()> {
        let title = self.paint(&record.title, "1");
        writeln!(
            out,
            "[{surface}] {title}  ({})",
            format_local(record.timestamp, self.timezone)
        )?;
        writeln!(out, "  {}", record.body)?;
        if !record.actions.is_empty() {
            let actions = record
                .actions
                .iter()
                .map(|a| format!("{} [{}]", a.title, a.action))
                .collect::<Vec<_>>()
                .join("  ");
            writeln!(out, "  {}", self.paint(&actions, "36"))?;
        }
        writeln!(out, "  -> {}  id={}", record.data.url, record.id)?;
        Ok(())
    }

    pub fn print_permission(&self, permission: Permission, supported: bool) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let code = match permission {
            Permission::Granted => "32",
            Permission::Denied => "31",
            Permission::Default | Permission::Unsupported => "33",
        };
        writeln!(out, "permission  {}", self.paint(permission.as_str(), code))?;
        writeln!(out, "status      {}", permission.as_label())?;
        writeln!(out, "supported   {}", if supported { "yes" } else { "no" })?;
        Ok(())
    }

    pub fn print_settings(&self, settings: &NotificationSettingsDto) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let flag = |on: bool| if on { "on" } else { "off" };
        writeln!(out, "enabled        {}", flag(settings.enabled))?;
        writeln!(out, "budget         {}", flag(settings.budget_alerts))?;
        writeln!(out, "anclas         {}", flag(settings.ancla_reminders))?;
        writeln!(out, "habits         {}", flag(settings.habit_reminders))?;
        writeln!(out, "savings        {}", flag(settings.savings_goals))?;
        writeln!(out, "lead_minutes   {}", settings.lead_minutes)?;
        writeln!(out, "habit_time     {}", settings.habit_reminder_time)?;
        Ok(())
    }

    pub fn print_apply_report(&self, report: &ApplyReport) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(
            out,
            "armed {}  dropped {}  snoozed {}  shown {}  already-shown {}  failed {}  cancelled {}",
            report.armed,
            report.dropped,
            report.snoozed,
            report.dispatched,
            report.duplicates,
            report.failed,
            report.cancelled
        )?;
        Ok(())
    }

    pub fn print_worker_outcome(&self, outcome: &WorkerOutcome) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        match outcome {
            WorkerOutcome::Shown(records) => {
                for record in records {
                    self.print_notification(&mut out, "worker", record)?;
                }
                if records.is_empty() {
                    writeln!(out, "No notifications shown.")?;
                }
            }
            WorkerOutcome::Focused(client) => writeln!(out, "focused client {client}")?,
            WorkerOutcome::Opened(url) => writeln!(out, "opened {url}")?,
            WorkerOutcome::Dismissed => writeln!(out, "dismissed")?,
            WorkerOutcome::NoClient => writeln!(out, "no client to open")?,
            WorkerOutcome::Installed | WorkerOutcome::Activated | WorkerOutcome::Ignored => {
                writeln!(out, "{outcome:?}")?
            }
        }
        Ok(())
    }

    pub fn print_json(&self, value: &Value) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", serde_json::to_string_pretty(value)?)?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::{strip_ansi, write_table};

    #[test]
    fn table_pads_by_display_width() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["Kind".to_string(), "Subject".to_string()],
            vec![
                vec!["budget-alert".to_string(), "Alimentación".to_string()],
                vec!["\x1b[33mancla\x1b[0m".to_string(), "⚓".to_string()],
            ],
        )
        .expect("table");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Kind         Subject      ");
        assert_eq!(lines[1], "------------ ------------ ");
        assert!(lines[3].starts_with("\x1b[33mancla\x1b[0m        ⚓"));
    }

    #[test]
    fn strips_color_codes() {
        assert_eq!(strip_ansi("\x1b[31mlate\x1b[0m"), "late");
    }
}
