use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Local, Timelike};
use snafu::{ensure, Location, OptionExt, ResultExt, Snafu};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::instrument;

/// Registers commands with the host so they run once at a given local time,
/// with no parent process alive.
#[async_trait]
pub trait DeferredTaskRegistry: Send + Sync {
    /// Registers `command` to run once at `when`, replacing any earlier
    /// registration under the same name.
    async fn upsert(&self, name: &str, command: &str, when: DateTime<Local>)
        -> Result<(), TaskError>;
}

/// Registry for the operating system this binary is running on.
pub fn host_registry() -> Box<dyn DeferredTaskRegistry> {
    match std::env::consts::OS {
        "windows" => Box::new(SchtasksRegistry),
        _ => Box::new(CrontabRegistry),
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TaskError {
    #[snafu(display("could not query the scheduler for task `{name}`"))]
    InspectTasks {
        name: String,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("could not replace scheduled task `{name}`"))]
    ReplaceTask {
        name: String,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("could not register scheduled task `{name}`"))]
    RegisterTask {
        name: String,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("task scheduler rejected `{name}`: {detail}"))]
    RegistrationDenied { name: String, detail: String },

    /// could not read the current crontab
    ReadCrontab {
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// could not write the new crontab
    WriteCrontab {
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// crontab did not expose a stdin pipe
    CrontabStdin,

    #[snafu(display("crontab rejected the new table: {detail}"))]
    CrontabDenied { detail: String },
}

/// `schtasks.exe`-backed registry for Windows hosts.
pub struct SchtasksRegistry;

impl SchtasksRegistry {
    async fn exists(&self, name: &str) -> Result<bool, TaskError> {
        // querying a missing task exits nonzero, which is an answer, not an error
        let status = Command::new("schtasks")
            .args(["/query", "/tn", name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .context(InspectTasksSnafu { name })?;

        Ok(status.success())
    }

    async fn delete(&self, name: &str) -> Result<(), TaskError> {
        let output = Command::new("schtasks")
            .args(["/delete", "/tn", name, "/f"])
            .output()
            .await
            .context(ReplaceTaskSnafu { name })?;

        ensure!(
            output.status.success(),
            RegistrationDeniedSnafu {
                name,
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
        );

        Ok(())
    }
}

#[async_trait]
impl DeferredTaskRegistry for SchtasksRegistry {
    #[instrument(skip(self))]
    async fn upsert(
        &self,
        name: &str,
        command: &str,
        when: DateTime<Local>,
    ) -> Result<(), TaskError> {
        if self.exists(name).await? {
            tracing::debug!(task = name, "replacing existing task");
            self.delete(name).await?;
        }

        let output = Command::new("schtasks")
            .args(schtasks_create_args(name, command, when))
            .output()
            .await
            .context(RegisterTaskSnafu { name })?;

        ensure!(
            output.status.success(),
            RegistrationDeniedSnafu {
                name,
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
        );

        tracing::info!(task = name, at = %when.format("%H:%M"), "task registered");

        Ok(())
    }
}

/// Arguments for a one-shot task firing at the calendar date and wall-clock
/// time of `when`. Without `/sd`, schtasks assumes today and an end time past
/// midnight lands on the wrong day.
fn schtasks_create_args(name: &str, command: &str, when: DateTime<Local>) -> Vec<String> {
    vec![
        "/create".to_string(),
        "/tn".to_string(),
        name.to_string(),
        "/tr".to_string(),
        command.to_string(),
        "/sc".to_string(),
        "once".to_string(),
        "/st".to_string(),
        when.format("%H:%M").to_string(),
        "/sd".to_string(),
        // schtasks reads /sd in the host's short-date format; en-US assumed
        when.format("%m/%d/%Y").to_string(),
        "/f".to_string(),
    ]
}

/// crontab(1)-backed registry for Unix hosts.
///
/// Entries are tagged with a `# TASK:<name>` marker so replacement can drop
/// the old line without touching anything else in the table.
pub struct CrontabRegistry;

impl CrontabRegistry {
    async fn current_table(&self) -> Result<String, TaskError> {
        let output = Command::new("crontab")
            .arg("-l")
            .output()
            .await
            .context(ReadCrontabSnafu)?;

        // no crontab for this user yet; start from an empty table
        if !output.status.success() {
            return Ok(String::new());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn install_table(&self, table: &str) -> Result<(), TaskError> {
        let mut child = Command::new("crontab")
            .arg("-")
            .stdin(Stdio::piped())
            .spawn()
            .context(WriteCrontabSnafu)?;

        {
            let mut stdin = child.stdin.take().context(CrontabStdinSnafu)?;
            stdin
                .write_all(table.as_bytes())
                .await
                .context(WriteCrontabSnafu)?;
        }

        let status = child.wait().await.context(WriteCrontabSnafu)?;
        ensure!(status.success(), CrontabDeniedSnafu { detail: status.to_string() });

        Ok(())
    }
}

#[async_trait]
impl DeferredTaskRegistry for CrontabRegistry {
    #[instrument(skip(self))]
    async fn upsert(
        &self,
        name: &str,
        command: &str,
        when: DateTime<Local>,
    ) -> Result<(), TaskError> {
        let current = self.current_table().await?;
        let table = merge_entry(&current, &cron_entry(name, command, when), name);
        self.install_table(&table).await?;

        tracing::info!(task = name, at = %when.format("%H:%M"), "cron entry installed");

        Ok(())
    }
}

/// One-shot cron line: exact minute, hour, day and month, any weekday.
fn cron_entry(name: &str, command: &str, when: DateTime<Local>) -> String {
    format!(
        "{} {} {} {} * {command} # TASK:{name}",
        when.minute(),
        when.hour(),
        when.day(),
        when.month(),
    )
}

/// Replaces any line tagged for `name` with `entry`, keeping the rest of the
/// table untouched.
fn merge_entry(current: &str, entry: &str, name: &str) -> String {
    let marker = format!("# TASK:{name}");
    let mut lines: Vec<&str> = current
        .lines()
        .filter(|line| !line.contains(&marker) && !line.trim().is_empty())
        .collect();
    lines.push(entry);

    // crontab refuses a table that does not end with a newline
    let mut table = lines.join("\n");
    table.push('\n');

    table
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn seven_march_morning() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 7, 6, 5, 0).unwrap()
    }

    #[test]
    fn cron_entries_pin_the_exact_calendar_slot() {
        let entry = cron_entry(
            "HeliocastStreamStart",
            r#""/opt/heliocast" stream start"#,
            seven_march_morning(),
        );

        assert_eq!(
            entry,
            r#"5 6 7 3 * "/opt/heliocast" stream start # TASK:HeliocastStreamStart"#
        );
    }

    #[test]
    fn merging_replaces_only_the_tagged_line() {
        let current = "0 12 * * * /usr/bin/backup\n30 5 1 1 * old-command # TASK:Start\n";

        let table = merge_entry(current, "5 6 7 3 * new-command # TASK:Start", "Start");

        assert!(table.contains("0 12 * * * /usr/bin/backup"));
        assert!(table.contains("new-command"));
        assert!(!table.contains("old-command"));
    }

    #[test]
    fn merging_into_an_empty_table_leaves_just_the_entry() {
        let table = merge_entry("", "5 6 7 3 * run # TASK:Start", "Start");

        assert_eq!(table, "5 6 7 3 * run # TASK:Start\n");
    }

    #[test]
    fn merged_tables_drop_blank_lines_and_end_with_a_newline() {
        let current = "0 12 * * * /usr/bin/backup\n\n\n";

        let table = merge_entry(current, "5 6 7 3 * run # TASK:End", "End");

        assert_eq!(table, "0 12 * * * /usr/bin/backup\n5 6 7 3 * run # TASK:End\n");
    }

    #[test]
    fn schtasks_runs_once_at_the_wall_clock_time() {
        let args = schtasks_create_args("HeliocastStreamStart", "heliocast stream start", seven_march_morning());

        let sc = args.iter().position(|arg| arg == "/sc").unwrap();
        assert_eq!(args[sc + 1], "once");

        let st = args.iter().position(|arg| arg == "/st").unwrap();
        assert_eq!(args[st + 1], "06:05");

        assert!(args.contains(&"/f".to_string()));
        assert!(args.contains(&"heliocast stream start".to_string()));
    }

    #[test]
    fn schtasks_pins_the_calendar_date() {
        let args = schtasks_create_args("HeliocastStreamEnd", "heliocast stream end", seven_march_morning());

        let sd = args.iter().position(|arg| arg == "/sd").unwrap();
        assert_eq!(args[sd + 1], "03/07/2026");
    }

    #[test]
    fn a_missing_crontab_pipe_maps_to_its_own_error() {
        let stdin: Option<tokio::process::ChildStdin> = None;

        let error = stdin.context(CrontabStdinSnafu).unwrap_err();

        assert_eq!(error.to_string(), "crontab did not expose a stdin pipe");
    }
}
