use std::{path::Path, str::FromStr};

use ansi_term::{Colour, Style};
use anyhow::{Context, Result};
use chrono::Days;

use crate::{
    daemon::storage::{
        entities::{DayCounts, DayKey, History},
        history_storage::{HistoryStorageImpl, HISTORY_FILE_NAME},
    },
    utils::{clock::DefaultClock, time::today},
};

#[derive(Debug, clap::Args)]
pub struct StatsCommand {
    #[arg(
        long,
        value_parser = DayKey::from_str,
        conflicts_with = "last",
        help = "Show a single day, e.g. 2025-03-15. Defaults to today"
    )]
    date: Option<DayKey>,
    #[arg(
        long,
        value_parser = clap::value_parser!(u32).range(1..=366),
        help = "Show the last N days ending today, days without input included"
    )]
    last: Option<u32>,
}

/// Reads the history the daemon keeps without touching it. A damaged file is reported, the daemon
/// moves it aside on its next start.
pub async fn read_history(app_dir: &Path) -> Result<History> {
    let storage = HistoryStorageImpl::new(app_dir.join(HISTORY_FILE_NAME), Box::new(DefaultClock))?;
    storage
        .read()
        .await
        .with_context(|| format!("Failed to read history from {:?}", storage.path()))
}

pub async fn process_stats_command(app_dir: &Path, command: StatsCommand) -> Result<()> {
    let history = read_history(app_dir).await?;
    let today = DayKey::new(today());

    let lines = match (command.date, command.last) {
        (Some(day), _) => vec![render_day(day, history.get(day))],
        (None, Some(last)) => render_table(&history, today, last),
        (None, None) => vec![render_day(today, history.get(today))],
    };
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

/// Days from `last - 1` days ago up to `today`, oldest first.
fn recent_days(today: DayKey, last: u32) -> impl Iterator<Item = DayKey> {
    (0..last).rev().filter_map(move |ago| {
        today
            .date()
            .checked_sub_days(Days::new(ago.into()))
            .map(DayKey::new)
    })
}

fn render_day(day: DayKey, counts: DayCounts) -> String {
    format!(
        "{}\t{} keystrokes\t{} clicks",
        Style::new().bold().paint(day.to_string()),
        Colour::Green.paint(counts.keystrokes.to_string()),
        Colour::Cyan.paint(counts.clicks.to_string()),
    )
}

fn render_table(history: &History, today: DayKey, last: u32) -> Vec<String> {
    let mut total = DayCounts::default();
    let mut lines = recent_days(today, last)
        .map(|day| {
            let counts = history.get(day);
            total.keystrokes = total.keystrokes.saturating_add(counts.keystrokes);
            total.clicks = total.clicks.saturating_add(counts.clicks);
            render_day(day, counts)
        })
        .collect::<Vec<_>>();
    lines.push(format!(
        "{}\t{} keystrokes\t{} clicks",
        Style::new().bold().paint("total"),
        total.keystrokes,
        total.clicks
    ));
    lines
}

#[cfg(test)]
mod tests {
    use std::fs;

    use anyhow::Result;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    use crate::daemon::storage::{
        entities::{DayCounts, DayKey, History},
        history_storage::HISTORY_FILE_NAME,
    };

    use super::{read_history, recent_days, render_table};

    fn day(d: u32) -> DayKey {
        DayKey::new(NaiveDate::from_ymd_opt(2025, 3, d).unwrap())
    }

    #[test]
    fn test_recent_days_cross_month() {
        let days = recent_days(day(2), 3).collect::<Vec<_>>();
        assert_eq!(
            days,
            vec![
                DayKey::new(NaiveDate::from_ymd_opt(2025, 2, 28).unwrap()),
                day(1),
                day(2)
            ]
        );
    }

    #[test]
    fn test_table_includes_empty_days_and_total() {
        let history = History::from_iter([(day(1), DayCounts::new(10, 2)), (day(3), DayCounts::new(5, 1))]);

        let lines = render_table(&history, day(3), 3);

        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("2025-03-01"));
        assert!(lines[1].contains("2025-03-02"));
        assert!(lines[1].contains("\u{1b}[32m0\u{1b}[0m keystrokes"));
        assert!(lines[3].contains("15 keystrokes\t3 clicks"));
    }

    #[test]
    fn test_table_total_saturates() {
        let history = History::from_iter([
            (day(1), DayCounts::new(u64::MAX, 0)),
            (day(2), DayCounts::new(1, 0)),
        ]);

        let lines = render_table(&history, day(2), 2);

        assert!(lines[2].contains(&format!("{} keystrokes\t0 clicks", u64::MAX)));
    }

    #[tokio::test]
    async fn test_read_history_leaves_damaged_file_alone() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join(HISTORY_FILE_NAME);
        fs::write(&path, b"{ not json")?;

        assert!(read_history(dir.path()).await.is_err());
        assert_eq!(fs::read(&path)?, b"{ not json");
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_read_history_without_file() -> Result<()> {
        let dir = tempdir()?;
        assert!(read_history(dir.path()).await?.is_empty());
        Ok(())
    }
}
