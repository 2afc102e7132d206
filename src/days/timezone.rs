//! Timezone reconciliation for media and days.
//!
//! A media item's offset comes from, in order: the camera's recorded offset,
//! the geocoder's named zone, the home offset. A day's zone is the plurality
//! vote over its members.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::DaySummary;
use crate::home::Home;
use crate::media::Media;

/// A resolved zone: an IANA zone, or a fixed offset when no name was observed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocalZone {
    Named(Tz),
    Fixed(FixedOffset),
}

impl LocalZone {
    pub fn utc() -> Self {
        LocalZone::Fixed(Utc.fix())
    }

    pub fn offset_minutes_at(&self, at: DateTime<Utc>) -> i32 {
        match self {
            LocalZone::Named(tz) => tz.offset_from_utc_datetime(&at.naive_utc()).fix().local_minus_utc() / 60,
            LocalZone::Fixed(offset) => offset.local_minus_utc() / 60,
        }
    }

    pub fn to_local(&self, at: DateTime<Utc>) -> NaiveDateTime {
        at.naive_utc() + chrono::Duration::minutes(self.offset_minutes_at(at) as i64)
    }

    pub fn identifier(&self) -> String {
        match self {
            LocalZone::Named(tz) => tz.name().to_string(),
            LocalZone::Fixed(offset) => offset_identifier(offset.local_minus_utc() / 60),
        }
    }
}

/// Observed zone names and offsets on one day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimezoneVotes {
    pub identifiers: BTreeMap<String, usize>,
    pub offsets: BTreeMap<i32, usize>,
}

impl TimezoneVotes {
    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty() && self.offsets.is_empty()
    }

    /// Plurality named zone; ties go to the lexicographically smallest name.
    pub fn winning_identifier(&self) -> Option<&str> {
        self.identifiers
            .iter()
            .max_by(|(na, ca), (nb, cb)| ca.cmp(cb).then_with(|| nb.cmp(na)))
            .map(|(name, _)| name.as_str())
    }

    /// Plurality offset; ties go to the smallest absolute offset, then the
    /// western one.
    pub fn winning_offset(&self) -> Option<i32> {
        self.offsets
            .iter()
            .max_by(|(oa, ca), (ob, cb)| {
                ca.cmp(cb)
                    .then_with(|| ob.abs().cmp(&oa.abs()))
                    .then_with(|| ob.cmp(oa))
            })
            .map(|(offset, _)| *offset)
    }
}

/// Format a minute offset as `+HH:MM` / `-HH:MM`.
pub fn offset_identifier(minutes: i32) -> String {
    let sign = if minutes < 0 { '-' } else { '+' };
    let abs = minutes.abs();
    format!("{}{:02}:{:02}", sign, abs / 60, abs % 60)
}

fn parse_offset_identifier(identifier: &str) -> Option<i32> {
    let (sign, rest) = match identifier.as_bytes().first()? {
        b'+' => (1, &identifier[1..]),
        b'-' => (-1, &identifier[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if !(0..60).contains(&minutes) || hours > 18 {
        return None;
    }
    Some(sign * (hours * 60 + minutes))
}

fn fixed(minutes: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(minutes * 60)
}

pub struct TimezoneResolver {
    home_offset_minutes: Option<i32>,
}

impl TimezoneResolver {
    pub fn new(home: &Home) -> Self {
        Self {
            home_offset_minutes: home.timezone_offset_minutes,
        }
    }

    fn home_zone(&self) -> LocalZone {
        self.home_offset_minutes
            .and_then(fixed)
            .map(LocalZone::Fixed)
            .unwrap_or_else(LocalZone::utc)
    }

    /// Offset for a single media item at its capture time.
    pub fn media_offset_minutes(&self, media: &Media) -> i32 {
        if let Some(offset) = media.tz_offset_minutes.filter(|o| fixed(*o).is_some()) {
            return offset;
        }

        if let (Some(tz), Some(at)) = (named_zone(media), media.taken_at) {
            return LocalZone::Named(tz).offset_minutes_at(at);
        }

        self.home_offset_minutes.unwrap_or(0)
    }

    pub fn local_datetime(&self, media: &Media) -> Option<NaiveDateTime> {
        let at = media.taken_at?;
        Some(at.naive_utc() + chrono::Duration::minutes(self.media_offset_minutes(media) as i64))
    }

    pub fn local_date(&self, media: &Media) -> Option<NaiveDate> {
        self.local_datetime(media).map(|dt| dt.date())
    }

    /// Record one member's vote.
    pub fn vote(&self, votes: &mut TimezoneVotes, media: &Media) {
        if media.taken_at.is_none() {
            return;
        }
        *votes.offsets.entry(self.media_offset_minutes(media)).or_default() += 1;
        if let Some(tz) = named_zone(media) {
            *votes.identifiers.entry(tz.name().to_string()).or_default() += 1;
        }
    }

    /// Named zone if one was voted for, else a synthetic fixed-offset identifier.
    pub fn determine_local_timezone_identifier(&self, votes: &TimezoneVotes) -> String {
        if let Some(name) = votes.winning_identifier() {
            return name.to_string();
        }
        let minutes = votes
            .winning_offset()
            .or(self.home_offset_minutes)
            .unwrap_or(0);
        offset_identifier(minutes)
    }

    /// Zone for an identifier produced by [`Self::determine_local_timezone_identifier`].
    pub fn zone_for_identifier(&self, identifier: &str) -> LocalZone {
        if let Ok(tz) = identifier.parse::<Tz>() {
            return LocalZone::Named(tz);
        }
        parse_offset_identifier(identifier)
            .and_then(fixed)
            .map(LocalZone::Fixed)
            .unwrap_or_else(|| self.home_zone())
    }

    pub fn resolve_summary_timezone(&self, summary: &DaySummary) -> LocalZone {
        self.zone_for_identifier(&summary.timezone_identifier)
    }
}

fn named_zone(media: &Media) -> Option<Tz> {
    media
        .tz_identifier
        .as_deref()
        .and_then(|name| name.parse::<Tz>().ok())
}
