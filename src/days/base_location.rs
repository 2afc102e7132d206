//! Where did the traveller sleep? Infers a day's away base (hotel, rental).

use chrono::Timelike;
use serde::{Deserialize, Serialize};

use super::{DaySummary, GpsFix, LocalZone, Staypoint};
use crate::config::BaseLocationConfig;
use crate::geo::{self, haversine_km};
use crate::home::Home;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseLocationSource {
    Staypoint,
    SleepProxyPair,
}

impl BaseLocationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BaseLocationSource::Staypoint => "staypoint",
            BaseLocationSource::SleepProxyPair => "sleep_proxy_pair",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaseLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub source: BaseLocationSource,
    /// Distance from the nearest home center.
    pub distance_km: f64,
}

pub struct BaseLocationResolver {
    config: BaseLocationConfig,
}

impl BaseLocationResolver {
    pub fn new(config: BaseLocationConfig) -> Self {
        Self { config }
    }

    /// Resolve the base for `day`. `next_day` is only used when it is the
    /// following calendar day.
    pub fn resolve(
        &self,
        day: &DaySummary,
        next_day: Option<&DaySummary>,
        home: &Home,
        zone: &LocalZone,
    ) -> Option<BaseLocation> {
        let next_day = next_day.filter(|n| Some(n.date) == day.date.succ_opt());

        self.from_evening_staypoint(day, home, zone)
            .or_else(|| self.from_morning_continuation(day, next_day?, home, zone))
            .or_else(|| self.from_sleep_proxy_pair(day, next_day?, home))
    }

    /// Runs into the night: ends after midnight or at/after `evening_hour`.
    fn reaches_night(&self, day: &DaySummary, staypoint: &Staypoint, zone: &LocalZone) -> bool {
        let end = zone.to_local(staypoint.end);
        end.date() > day.date || end.hour() >= self.config.evening_hour
    }

    fn from_evening_staypoint(
        &self,
        day: &DaySummary,
        home: &Home,
        zone: &LocalZone,
    ) -> Option<BaseLocation> {
        longest_away(
            day.dominant_staypoints
                .iter()
                .filter(|s| self.reaches_night(day, s, zone)),
            home,
        )
    }

    /// A next-morning staypoint counts for tonight when the day's last fix
    /// was taken in the evening close to it.
    fn from_morning_continuation(
        &self,
        day: &DaySummary,
        next_day: &DaySummary,
        home: &Home,
        zone: &LocalZone,
    ) -> Option<BaseLocation> {
        let evening = day.last_gps_fix?;
        if evening.local.date() != day.date || evening.local.hour() < self.config.evening_hour {
            return None;
        }

        longest_away(
            next_day.dominant_staypoints.iter().filter(|s| {
                let start = zone.to_local(s.start);
                start.date() == next_day.date
                    && start.hour() < self.config.morning_hour
                    && haversine_km(evening.latitude, evening.longitude, s.latitude, s.longitude)
                        <= self.config.max_pair_distance_km
            }),
            home,
        )
    }

    fn from_sleep_proxy_pair(
        &self,
        day: &DaySummary,
        next_day: &DaySummary,
        home: &Home,
    ) -> Option<BaseLocation> {
        let evening = day.last_gps_fix?;
        let morning = next_day.first_gps_fix?;

        if evening.local.date() != day.date || evening.local.hour() < self.config.evening_hour {
            return None;
        }
        if morning.local.date() != next_day.date || morning.local.hour() >= self.config.morning_hour {
            return None;
        }
        if !is_far(home, &evening) || !is_far(home, &morning) {
            return None;
        }

        let apart = haversine_km(evening.latitude, evening.longitude, morning.latitude, morning.longitude);
        if apart > self.config.max_pair_distance_km {
            return None;
        }

        let (latitude, longitude) = geo::midpoint(
            (evening.latitude, evening.longitude),
            (morning.latitude, morning.longitude),
        );

        Some(BaseLocation {
            latitude,
            longitude,
            source: BaseLocationSource::SleepProxyPair,
            distance_km: home.distance_km(latitude, longitude, evening.at),
        })
    }
}

fn longest_away<'s>(
    staypoints: impl Iterator<Item = &'s Staypoint>,
    home: &Home,
) -> Option<BaseLocation> {
    staypoints
        .filter(|s| home.is_away(s.latitude, s.longitude, s.start))
        .fold(None, |best: Option<&Staypoint>, s| match best {
            Some(b) if b.dwell_seconds >= s.dwell_seconds => Some(b),
            _ => Some(s),
        })
        .map(|s| BaseLocation {
            latitude: s.latitude,
            longitude: s.longitude,
            source: BaseLocationSource::Staypoint,
            distance_km: home.distance_km(s.latitude, s.longitude, s.start),
        })
}

fn is_far(home: &Home, fix: &GpsFix) -> bool {
    home.is_away(fix.latitude, fix.longitude, fix.at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 9, day).unwrap()
    }

    fn home() -> Home {
        Home::new(52.52, 13.405, 10.0)
    }

    fn fix(id: i64, day: u32, hour: u32, minute: u32, lat: f64, lon: f64) -> GpsFix {
        let at = Utc.with_ymd_and_hms(2023, 9, day, hour, minute, 0).unwrap();
        GpsFix {
            id,
            latitude: lat,
            longitude: lon,
            at,
            local: at.naive_utc(),
        }
    }

    fn resolver() -> BaseLocationResolver {
        BaseLocationResolver::new(BaseLocationConfig::default())
    }

    #[test]
    fn test_overnight_staypoint() {
        let mut day = DaySummary::empty(date(5), "+00:00");
        let start = Utc.with_ymd_and_hms(2023, 9, 5, 21, 30, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2023, 9, 6, 7, 15, 0).unwrap();
        day.dominant_staypoints.push(Staypoint {
            key: "hotel".to_string(),
            latitude: 41.9028,
            longitude: 12.4964,
            start,
            end,
            dwell_seconds: (end - start).num_seconds(),
            member_ids: vec![1, 2, 3],
        });

        let base = resolver().resolve(&day, None, &home(), &LocalZone::utc()).unwrap();
        assert_eq!(base.source, BaseLocationSource::Staypoint);
        assert_eq!(base.source.as_str(), "staypoint");
        assert_eq!(base.latitude, 41.9028);
        assert!(base.distance_km > 1000.0);
    }

    fn staypoint(key: &str, lat: f64, lon: f64, start: DateTime<Utc>, end: DateTime<Utc>) -> Staypoint {
        Staypoint {
            key: key.to_string(),
            latitude: lat,
            longitude: lon,
            start,
            end,
            dwell_seconds: (end - start).num_seconds(),
            member_ids: vec![1, 2],
        }
    }

    fn hm(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 9, day, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_daytime_visit_loses_to_evening_stay() {
        let mut day = DaySummary::empty(date(5), "+00:00");
        // Longer dwell, but over by lunch.
        day.dominant_staypoints
            .push(staypoint("museum", 41.8986, 12.4769, hm(5, 8, 0), hm(5, 13, 0)));
        day.dominant_staypoints
            .push(staypoint("hotel", 41.9028, 12.4964, hm(5, 21, 0), hm(5, 23, 30)));

        let base = resolver().resolve(&day, None, &home(), &LocalZone::utc()).unwrap();
        assert_eq!(base.source, BaseLocationSource::Staypoint);
        assert_eq!(base.latitude, 41.9028);
    }

    #[test]
    fn test_morning_staypoint_alone_is_not_a_base() {
        let mut day = DaySummary::empty(date(5), "+00:00");
        day.dominant_staypoints
            .push(staypoint("breakfast", 41.8986, 12.4769, hm(5, 6, 30), hm(5, 9, 0)));
        assert!(resolver().resolve(&day, None, &home(), &LocalZone::utc()).is_none());
    }

    #[test]
    fn test_next_morning_staypoint_continues_the_night() {
        let mut day = DaySummary::empty(date(5), "+00:00");
        day.last_gps_fix = Some(fix(1, 5, 22, 40, 41.9030, 12.4960));
        let mut next = DaySummary::empty(date(6), "+00:00");
        next.dominant_staypoints
            .push(staypoint("hotel", 41.9028, 12.4964, hm(6, 6, 45), hm(6, 9, 15)));

        let base = resolver()
            .resolve(&day, Some(&next), &home(), &LocalZone::utc())
            .unwrap();
        assert_eq!(base.source, BaseLocationSource::Staypoint);
        assert_eq!(base.latitude, 41.9028);

        // Without an evening fix on the day itself it does not count.
        day.last_gps_fix = Some(fix(1, 5, 16, 0, 41.9030, 12.4960));
        assert!(resolver()
            .resolve(&day, Some(&next), &home(), &LocalZone::utc())
            .is_none());
    }

    #[test]
    fn test_staypoint_near_home_is_ignored() {
        let mut day = DaySummary::empty(date(5), "+00:00");
        let start = Utc.with_ymd_and_hms(2023, 9, 5, 21, 30, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2023, 9, 5, 23, 0, 0).unwrap();
        day.dominant_staypoints.push(Staypoint {
            key: "home".to_string(),
            latitude: 52.52,
            longitude: 13.40,
            start,
            end,
            dwell_seconds: (end - start).num_seconds(),
            member_ids: vec![1],
        });
        assert!(resolver().resolve(&day, None, &home(), &LocalZone::utc()).is_none());
    }

    #[test]
    fn test_sleep_proxy_pair() {
        let mut day = DaySummary::empty(date(5), "+00:00");
        day.last_gps_fix = Some(fix(1, 5, 22, 10, 41.90, 12.49));
        let mut next = DaySummary::empty(date(6), "+00:00");
        next.first_gps_fix = Some(fix(2, 6, 8, 5, 41.92, 12.51));

        let base = resolver()
            .resolve(&day, Some(&next), &home(), &LocalZone::utc())
            .unwrap();
        assert_eq!(base.source, BaseLocationSource::SleepProxyPair);
        assert!((base.latitude - 41.91).abs() < 1e-9);
        assert!((base.longitude - 12.50).abs() < 1e-9);
    }

    #[test]
    fn test_sleep_proxy_requires_night_fixes() {
        let mut day = DaySummary::empty(date(5), "+00:00");
        day.last_gps_fix = Some(fix(1, 5, 15, 0, 41.90, 12.49));
        let mut next = DaySummary::empty(date(6), "+00:00");
        next.first_gps_fix = Some(fix(2, 6, 8, 5, 41.92, 12.51));
        assert!(resolver()
            .resolve(&day, Some(&next), &home(), &LocalZone::utc())
            .is_none());
    }

    #[test]
    fn test_sleep_proxy_requires_adjacent_day() {
        let mut day = DaySummary::empty(date(5), "+00:00");
        day.last_gps_fix = Some(fix(1, 5, 22, 10, 41.90, 12.49));
        let mut later = DaySummary::empty(date(7), "+00:00");
        later.first_gps_fix = Some(fix(2, 7, 8, 5, 41.92, 12.51));
        assert!(resolver()
            .resolve(&day, Some(&later), &home(), &LocalZone::utc())
            .is_none());
    }

    #[test]
    fn test_no_data_yields_none() {
        let day = DaySummary::empty(date(5), "+00:00");
        assert!(resolver().resolve(&day, None, &home(), &LocalZone::utc()).is_none());
    }
}
