use std::{
    fmt::Display,
    io::{IsTerminal, Write},
    path::Path,
};

use ansi_term::Colour;
use anyhow::Result;
use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use clap::{CommandFactory, Parser, ValueEnum};
use tracing::{debug, instrument};

use crate::{
    daemon::storage::{chunk_storage::ChunkDirectory, entities::Batch},
    utils::dir::measurements_dir,
};

use super::{
    manual::injected_measurements,
    output::{
        collect_measurements, merge_measurements,
        segmentation::{segment_days, DaySegment},
    },
    Args,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct ReportCommand {
    #[arg(
        long = "idle",
        default_value_t = 10,
        help = "Gaps between measurements of at least this many minutes don't count as work"
    )]
    idle_minutes: u32,
    #[arg(
        long = "stop",
        help = "Stop counting work at this time for the rest of its day. Examples are \"17:30\", \"2025-03-15 17:30\", \"1 hour ago\""
    )]
    stops: Vec<String>,
    #[arg(
        long = "mark",
        help = "Record that work happened at this time, for example before the computer was started. Examples are \"07:45\", \"2025-03-15T07:45\""
    )]
    marks: Vec<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used when parsing natural language times. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(
        long = "no-files",
        help = "Only use times given with --stop and --mark, ignoring recorded measurements"
    )]
    no_files: bool,
    #[arg(long, help = "Separate weeks with an empty line")]
    weeks: bool,
}

/// Processes the `report` command. Prints one line per day with the time work started, ended and
/// how long was spent working in between.
#[instrument(skip_all)]
pub async fn process_report_command(
    ReportCommand {
        idle_minutes,
        stops,
        marks,
        date_style,
        no_files,
        weeks,
    }: ReportCommand,
    app_dir: &Path,
) -> Result<()> {
    // Corrections are validated before touching any chunk.
    let injected = match injected_measurements(&stops, &marks, &Local::now(), date_style.into()) {
        Ok(v) => v,
        Err(e) => {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate correction {e}"),
                )
                .into());
        }
    };
    debug!("Injecting {} corrections", injected.len());

    let measurements = if no_files {
        merge_measurements(Vec::<Batch>::new(), injected)
    } else {
        collect_measurements(ChunkDirectory::new(measurements_dir(app_dir)), injected).await?
    };

    let segments = segment_days(
        &measurements,
        Duration::minutes(idle_minutes as i64),
        &Local,
    );

    if segments.is_empty() {
        eprintln!("No activity recorded yet");
        return Ok(());
    }

    let stdout = std::io::stdout();
    let colored = stdout.is_terminal();
    print_report(&segments, &Local, weeks, colored, &mut stdout.lock())?;
    Ok(())
}

fn print_report<Tz: TimeZone>(
    segments: &[DaySegment],
    timezone: &Tz,
    weeks: bool,
    colored: bool,
    out: &mut impl Write,
) -> Result<()>
where
    Tz::Offset: Display,
{
    for segment in segments {
        if weeks && segment.new_week {
            writeln!(out)?;
        }
        writeln!(out, "{}", format_day(segment, timezone, colored))?;
    }
    Ok(())
}

fn format_day<Tz: TimeZone>(segment: &DaySegment, timezone: &Tz, colored: bool) -> String
where
    Tz::Offset: Display,
{
    let time = |moment: DateTime<Utc>, highlighted: bool| {
        let formatted = moment.with_timezone(timezone).format("%H:%M").to_string();
        if colored && highlighted {
            Colour::Yellow.bold().paint(formatted).to_string()
        } else {
            formatted
        }
    };

    format!(
        "{} {} {} {}",
        segment.date.format("%Y-%m-%d %a"),
        time(segment.start, segment.highlights.start),
        time(segment.end, segment.highlights.end),
        format_duration(segment.work)
    )
}

fn format_duration(v: Duration) -> String {
    format!("{}:{:02}", v.num_hours(), v.num_minutes() % 60)
}
