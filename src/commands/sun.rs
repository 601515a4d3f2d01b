use chrono::Duration;

use crate::cli::{SunArgs, SunFormat};
use crate::config::Config;
use crate::error::LauncherError;
use crate::resolver::{ResolvedTime, TimeSpec, TIME_FORMAT};

/// Prints today's sunrise or sunset, shifted by the requested offset.
pub async fn run(config: &Config, event: TimeSpec, args: &SunArgs) -> Result<(), LauncherError> {
    let resolver = super::resolver(config)?;
    let resolved = resolver
        .resolve(event, args.city.as_deref(), args.offset)
        .await?;

    for line in report_lines(&resolved, event, args.format, args.offset) {
        println!("{line}");
    }

    Ok(())
}

fn report_lines(
    resolved: &ResolvedTime,
    event: TimeSpec,
    format: SunFormat,
    offset: i64,
) -> Vec<String> {
    match format {
        SunFormat::Datetime => vec![resolved.at.format(TIME_FORMAT).to_string()],
        SunFormat::Time => vec![resolved.at.format("%H:%M").to_string()],
        SunFormat::Human => human_lines(resolved, event, offset),
    }
}

fn human_lines(resolved: &ResolvedTime, event: TimeSpec, offset: i64) -> Vec<String> {
    let label = match event {
        TimeSpec::Sunset => "Sunset:   ",
        _ => "Sunrise:  ",
    };
    // the raw event falls out of the resolved anchor by undoing the offset
    let raw = resolved.at - Duration::minutes(offset);

    let mut lines = Vec::new();
    if let Some(place) = &resolved.place {
        lines.push(format!("Location: {place}"));
    }
    lines.push(format!("{label}{}", raw.format("%H:%M:%S")));

    if offset != 0 {
        lines.push(format!("Offset:   {offset:+} minutes"));
        lines.push(format!("Result:   {}", resolved.at.format("%H:%M:%S")));
    }

    lines
}

#[cfg(test)]
mod tests {
    use chrono::{Local, TimeZone};

    use super::*;

    fn march_seventh_sunrise() -> ResolvedTime {
        ResolvedTime::new(
            Local.with_ymd_and_hms(2026, 3, 7, 6, 35, 0).unwrap(),
            Some("Marshall, North Carolina".to_string()),
        )
    }

    #[test]
    fn the_time_format_is_bare_hours_and_minutes() {
        let lines = report_lines(&march_seventh_sunrise(), TimeSpec::Sunrise, SunFormat::Time, 0);

        assert_eq!(lines, vec!["06:35"]);
    }

    #[test]
    fn the_datetime_format_prints_a_full_local_timestamp() {
        let lines =
            report_lines(&march_seventh_sunrise(), TimeSpec::Sunrise, SunFormat::Datetime, 0);

        assert_eq!(lines, vec!["2026-03-07T06:35:00"]);
    }

    #[test]
    fn the_human_report_aligns_labels_and_undoes_the_offset() {
        let lines = report_lines(&march_seventh_sunrise(), TimeSpec::Sunrise, SunFormat::Human, 30);

        assert_eq!(
            lines,
            vec![
                "Location: Marshall, North Carolina",
                "Sunrise:  06:05:00",
                "Offset:   +30 minutes",
                "Result:   06:35:00",
            ]
        );
    }

    #[test]
    fn a_zero_offset_keeps_the_report_to_the_event_itself() {
        let lines = report_lines(&march_seventh_sunrise(), TimeSpec::Sunset, SunFormat::Human, 0);

        assert_eq!(
            lines,
            vec!["Location: Marshall, North Carolina", "Sunset:   06:35:00"]
        );
    }
}
