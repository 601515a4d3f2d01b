use chrono::{Duration, Local};
use snafu::ResultExt;

use crate::cli::{EndArgs, ScheduleArgs, StartArgs};
use crate::config::Config;
use crate::countdown;
use crate::error::{LauncherError, LocateExecutableSnafu};
use crate::handoff::HandoffStore;
use crate::model::{default_title, BroadcastId, BroadcastSpec};
use crate::obs::ObsLauncher;
use crate::resolver::{ResolvedTime, TimeSpec};
use crate::tasks;
use crate::youtube;

/// Schedules today's broadcast end to end: resolve the anchors, create and
/// bind the broadcast, then either wait here or hand off to host tasks.
pub async fn schedule(config: &Config, args: &ScheduleArgs) -> Result<(), LauncherError> {
    println!("=== Stream Scheduler ===");
    println!();

    let resolver = super::resolver(config)?;
    // explicit times are taken literally; offsets only shift sun anchors
    let start_offset = match args.time {
        TimeSpec::Explicit(_) => 0,
        _ => args.start_offset,
    };
    let city = args.city.as_deref();
    let start = resolver.resolve(args.time, city, start_offset).await?;
    let end = resolver.resolve(TimeSpec::Sunset, city, args.end_offset).await?;

    describe_plan(args, &start, &end, start_offset);

    let title = args
        .title
        .clone()
        .unwrap_or_else(|| default_title(&config.title_template, Local::now().date_naive()));
    let description = args
        .description
        .clone()
        .unwrap_or_else(|| config.description.clone());
    let spec = BroadcastSpec::new(title, description, args.privacy, start.at);

    println!("Title:   {}", spec.title);
    println!("Privacy: {}", spec.privacy);
    println!();

    let controller = super::controller(config).await?;
    let (broadcast, endpoint) = controller.schedule(&spec).await?;

    println!("Broadcast created: {}", broadcast.id);
    println!("  Watch:  {}", youtube::watch_url(&broadcast.id));
    println!("  Studio: {}", youtube::studio_url(&broadcast.id));
    println!("  RTMP:   {}", endpoint.ingestion_address);
    println!("  Key:    {}", endpoint.stream_key);
    println!("  Push:   {}", endpoint.rtmp_url());
    println!();

    let handoff = HandoffStore::new(config.handoff_path());
    match handoff.write(&broadcast.id).await {
        Ok(()) => println!("Broadcast id saved to {}", handoff.path().display()),
        // the deferred runs can still be pointed at the broadcast with --id
        Err(error) => tracing::warn!(%error, "could not save the broadcast id"),
    }

    if args.wait {
        countdown::wait_until(start.at).await;
        controller.go_live(&broadcast.id).await?;

        println!();
        println!("=== Stream is live ===");
        println!("Run `heliocast stream end` after the show.");
    } else {
        register_host_tasks(config, &broadcast.id, &start, &end).await?;

        println!();
        println!("=== Schedule complete ===");
        println!("The stream will start and end at the registered times.");
    }

    Ok(())
}

/// Takes the scheduled broadcast live, launching OBS first unless told not to.
pub async fn start(config: &Config, args: &StartArgs) -> Result<(), LauncherError> {
    println!("=== Stream Start ===");
    println!();

    let id = broadcast_id(config, args.id.clone()).await?;
    println!("Broadcast: {id}");

    if !args.skip_obs {
        let launcher = ObsLauncher::new(args.obs_path.clone().or_else(|| config.obs_path.clone()));
        println!("Launching OBS ({})...", launcher.path().display());
        match launcher.launch() {
            Ok(()) => {
                println!(
                    "OBS launched, giving it {}s to settle...",
                    config.obs_startup_delay_secs
                );
                tokio::time::sleep(config.obs_startup_delay()).await;
            }
            Err(error) => {
                // the show can still go on from an encoder started by hand
                tracing::warn!(%error, "could not launch OBS, start the encoder manually");
            }
        }
    }

    let controller = super::controller(config).await?;
    controller.go_live(&id).await?;

    println!();
    println!("=== Stream is live ===");
    println!("Watch: {}", youtube::watch_url(&id));

    Ok(())
}

/// Ends the broadcast and lets the platform archive it.
pub async fn end(config: &Config, args: &EndArgs) -> Result<(), LauncherError> {
    println!("=== Stream End ===");
    println!();

    let id = broadcast_id(config, args.id.clone()).await?;
    println!("Broadcast: {id}");

    let controller = super::controller(config).await?;
    controller.end(&id).await?;

    println!();
    println!("=== Stream ended ===");

    Ok(())
}

fn describe_plan(args: &ScheduleArgs, start: &ResolvedTime, end: &ResolvedTime, start_offset: i64) {
    if let Some(place) = start.place.as_ref().or(end.place.as_ref()) {
        println!("Location: {place}");
    }

    // raw events fall out of the resolved anchors by undoing the offsets
    let sunset = end.at - Duration::minutes(args.end_offset);
    match args.time {
        TimeSpec::Sunrise => {
            let sunrise = start.at - Duration::minutes(start_offset);
            println!("Sunrise:  {}", sunrise.format("%H:%M:%S"));
            println!("Sunset:   {}", sunset.format("%H:%M:%S"));
        }
        TimeSpec::Sunset | TimeSpec::Explicit(_) => {
            println!("Sunset:   {}", sunset.format("%H:%M:%S"));
        }
    }

    println!();
    println!("Stream start: {}", start.at.format("%Y-%m-%d %H:%M:%S"));
    println!("Stream end:   {}", end.at.format("%Y-%m-%d %H:%M:%S"));
    println!();
}

/// Registers the deferred go-live and end commands with the host scheduler.
///
/// Deferred runs start with an arbitrary working directory, so the command
/// lines carry the binary's absolute path and the broadcast id; the handoff
/// file is only a fallback for runs the operator starts by hand.
async fn register_host_tasks(
    config: &Config,
    id: &BroadcastId,
    start: &ResolvedTime,
    end: &ResolvedTime,
) -> Result<(), LauncherError> {
    let exe = std::env::current_exe().context(LocateExecutableSnafu)?;
    let registry = tasks::host_registry();

    let start_command = format!(r#""{}" stream start --id "{id}""#, exe.display());
    registry
        .upsert(&config.start_task_name, &start_command, start.at)
        .await?;
    println!("Start task registered for {}", start.at.format("%H:%M"));

    let end_command = format!(r#""{}" stream end --id "{id}""#, exe.display());
    registry
        .upsert(&config.end_task_name, &end_command, end.at)
        .await?;
    println!("End task registered for {}", end.at.format("%H:%M"));

    Ok(())
}

/// The explicitly given id, or the one the scheduling run left behind.
async fn broadcast_id(config: &Config, given: Option<BroadcastId>) -> Result<BroadcastId, LauncherError> {
    match given {
        Some(id) => Ok(id),
        None => Ok(HandoffStore::new(config.handoff_path()).read().await?),
    }
}
