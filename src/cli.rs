use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::model::{BroadcastId, Privacy};
use crate::resolver::TimeSpec;

/// Schedules YouTube live broadcasts around sunrise and sunset.
#[derive(Debug, Parser)]
#[command(name = "heliocast", version, about)]
pub struct Cli {
    /// Directory holding the OAuth credential files
    #[arg(long, global = true)]
    pub credentials_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print today's sunrise time
    Sunrise(SunArgs),

    /// Print today's sunset time
    Sunset(SunArgs),

    /// Manage the broadcast lifecycle
    Stream {
        #[command(subcommand)]
        command: StreamCommand,
    },

    /// Replace this binary with the latest release
    Update,
}

#[derive(Debug, Subcommand)]
pub enum StreamCommand {
    /// Create a broadcast, bind its ingest endpoint, and schedule the go-live
    Schedule(ScheduleArgs),

    /// Launch OBS and take the scheduled broadcast live
    Start(StartArgs),

    /// End the running broadcast
    End(EndArgs),
}

#[derive(Debug, Args)]
pub struct SunArgs {
    /// City to look sun times up for; defaults to the machine's location
    #[arg(long)]
    pub city: Option<String>,

    /// Minutes added to the sun event (negative moves earlier)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub offset: i64,

    /// Output style
    #[arg(long, value_enum, default_value_t = SunFormat::Human)]
    pub format: SunFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SunFormat {
    /// Location, event time, and the applied offset
    Human,
    /// Bare HH:MM
    Time,
    /// Full local timestamp
    Datetime,
}

#[derive(Debug, Args)]
pub struct ScheduleArgs {
    /// When to go live: SUNRISE, SUNSET, or a local timestamp like 2026-03-07T06:30:00
    #[arg(long, default_value = "SUNRISE")]
    pub time: TimeSpec,

    /// Minutes relative to the start anchor (ignored for explicit times)
    #[arg(long, default_value_t = -30, allow_negative_numbers = true)]
    pub start_offset: i64,

    /// Minutes relative to sunset at which the stream ends
    #[arg(long, default_value_t = 30, allow_negative_numbers = true)]
    pub end_offset: i64,

    /// City sun times are looked up for; defaults to the machine's location
    #[arg(long)]
    pub city: Option<String>,

    /// Broadcast title; defaults to the configured template
    #[arg(long)]
    pub title: Option<String>,

    /// Broadcast description; defaults to the configured one
    #[arg(long)]
    pub description: Option<String>,

    /// Broadcast visibility
    #[arg(long, value_enum, default_value_t = Privacy::Public)]
    pub privacy: Privacy,

    /// Stay attached and go live from this process instead of registering host tasks
    #[arg(long)]
    pub wait: bool,
}

#[derive(Debug, Args)]
pub struct StartArgs {
    /// Broadcast to start; defaults to the last scheduled one
    #[arg(long)]
    pub id: Option<BroadcastId>,

    /// Do not launch OBS before going live
    #[arg(long)]
    pub skip_obs: bool,

    /// OBS executable to launch
    #[arg(long)]
    pub obs_path: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct EndArgs {
    /// Broadcast to end; defaults to the last scheduled one
    #[arg(long)]
    pub id: Option<BroadcastId>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_declaration_is_internally_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn schedule_defaults_follow_the_sun() {
        let cli = Cli::parse_from(["heliocast", "stream", "schedule"]);

        let Command::Stream {
            command: StreamCommand::Schedule(args),
        } = cli.command
        else {
            panic!("expected a schedule command");
        };

        assert_eq!(args.time, TimeSpec::Sunrise);
        assert_eq!(args.start_offset, -30);
        assert_eq!(args.end_offset, 30);
        assert_eq!(args.privacy, Privacy::Public);
        assert!(!args.wait);
        assert_eq!(args.city, None);
    }

    #[test]
    fn explicit_times_and_wait_mode_parse() {
        let cli = Cli::parse_from([
            "heliocast",
            "stream",
            "schedule",
            "--time",
            "2026-03-07T06:30:00",
            "--wait",
        ]);

        let Command::Stream {
            command: StreamCommand::Schedule(args),
        } = cli.command
        else {
            panic!("expected a schedule command");
        };

        assert!(matches!(args.time, TimeSpec::Explicit(_)));
        assert!(args.wait);
    }

    #[test]
    fn garbage_times_are_rejected_at_parse_time() {
        let outcome = Cli::try_parse_from(["heliocast", "stream", "schedule", "--time", "noon"]);

        assert!(outcome.is_err());
    }

    #[test]
    fn negative_offsets_parse_without_equals_signs() {
        let cli = Cli::parse_from(["heliocast", "sunset", "--offset", "-45"]);

        let Command::Sunset(args) = cli.command else {
            panic!("expected a sunset command");
        };

        assert_eq!(args.offset, -45);
    }

    #[test]
    fn the_credentials_dir_applies_from_any_subcommand() {
        let cli = Cli::parse_from([
            "heliocast",
            "stream",
            "end",
            "--credentials-dir",
            "/etc/heliocast",
        ]);

        assert_eq!(cli.credentials_dir, Some(PathBuf::from("/etc/heliocast")));
    }

    #[test]
    fn start_accepts_an_explicit_broadcast_id() {
        let cli = Cli::parse_from(["heliocast", "stream", "start", "--id", "bcast-9", "--skip-obs"]);

        let Command::Stream {
            command: StreamCommand::Start(args),
        } = cli.command
        else {
            panic!("expected a start command");
        };

        assert_eq!(args.id.unwrap().as_str(), "bcast-9");
        assert!(args.skip_obs);
    }
}
