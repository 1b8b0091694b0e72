use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, TimeZone};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    daemon::collection::event::EventClass,
    utils::time::{format_day, parse_day},
};

/// Calendar day used as the aggregation and storage granularity. Always spelled `YYYY-MM-DD`, so
/// the derived ordering matches the ordering of the strings on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayKey(NaiveDate);

impl DayKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// The calendar day `moment` falls on in its own time zone. Events are stamped with local time,
    /// which makes this the local calendar day.
    pub fn of<Tz: TimeZone>(moment: &DateTime<Tz>) -> Self {
        Self(moment.date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl Display for DayKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_day(self.0))
    }
}

impl FromStr for DayKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_day(s)
            .map(DayKey)
            .ok_or_else(|| anyhow!("{s:?} is not a YYYY-MM-DD day"))
    }
}

impl Serialize for DayKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DayKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Counts for a single day. Field names match the history files written by earlier versions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCounts {
    #[serde(rename = "keystrokesCount", default)]
    pub keystrokes: u64,
    #[serde(rename = "mouseClicksCount", default)]
    pub clicks: u64,
}

impl DayCounts {
    pub fn new(keystrokes: u64, clicks: u64) -> Self {
        Self { keystrokes, clicks }
    }

    pub fn record(&mut self, class: EventClass) {
        match class {
            EventClass::Keystroke => self.keystrokes = self.keystrokes.saturating_add(1),
            EventClass::Click => self.clicks = self.clicks.saturating_add(1),
        }
    }

    pub fn total(&self) -> u64 {
        self.keystrokes.saturating_add(self.clicks)
    }
}

/// Every day that has ever been counted. A missing day reads as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History(BTreeMap<DayKey, DayCounts>);

impl History {
    pub fn get(&self, day: DayKey) -> DayCounts {
        self.0.get(&day).copied().unwrap_or_default()
    }

    /// Stores the working copy of `day`. The working copy always starts from the stored entry and
    /// only grows, so replacing the entry is the merge.
    pub fn merge(&mut self, day: DayKey, counts: DayCounts) {
        self.0.insert(day, counts);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (DayKey, DayCounts)> + '_ {
        self.0.iter().map(|(day, counts)| (*day, *counts))
    }
}

impl FromIterator<(DayKey, DayCounts)> for History {
    fn from_iter<T: IntoIterator<Item = (DayKey, DayCounts)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
