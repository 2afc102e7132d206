//! Bridges lean travel days onto the ends of a run.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::VacationConfig;
use crate::days::DaySummary;
use crate::geo::haversine_km;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Before,
    After,
}

pub struct TransportDayExtender<'a> {
    config: &'a VacationConfig,
}

impl<'a> TransportDayExtender<'a> {
    pub fn new(config: &'a VacationConfig) -> Self {
        Self { config }
    }

    /// Extend `run` by up to `max_transit_days` adjacent transit days per side.
    pub fn extend(&self, run: &[NaiveDate], days: &BTreeMap<NaiveDate, DaySummary>) -> Vec<NaiveDate> {
        let mut extended = run.to_vec();
        if extended.is_empty() {
            return extended;
        }

        for side in [Side::Before, Side::After] {
            for _ in 0..self.config.max_transit_days {
                let anchor = match side {
                    Side::Before => extended[0],
                    Side::After => extended[extended.len() - 1],
                };
                let next = match side {
                    Side::Before => anchor.pred_opt(),
                    Side::After => anchor.succ_opt(),
                };
                let Some((date, day)) = next.and_then(|d| days.get(&d).map(|day| (d, day))) else {
                    break;
                };
                if !self.admits(day, days.get(&anchor)) {
                    break;
                }

                debug!(%date, ?side, "Bridging transit day");
                match side {
                    Side::Before => extended.insert(0, date),
                    Side::After => extended.push(date),
                }
            }
        }

        extended
    }

    fn admits(&self, day: &DaySummary, anchor: Option<&DaySummary>) -> bool {
        let lean = day.members.len() <= self.config.lean_max_members
            && day.base_location.is_none()
            && !day.is_away;
        if !lean {
            return false;
        }

        let far_from_anchor = match (day.location(), anchor.and_then(DaySummary::location)) {
            (Some((lat, lon)), Some((alat, alon))) => {
                haversine_km(lat, lon, alat, alon) >= self.config.transit_min_distance_km
            }
            _ => false,
        };

        far_from_anchor || day.in_transit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::Media;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    fn day(d: u32, away: bool, members: usize, location: Option<(f64, f64)>) -> DaySummary {
        let mut summary = DaySummary::empty(date(d), "+00:00");
        summary.is_away = away;
        summary.members = (0..members)
            .map(|i| Media {
                id: (d * 100) as i64 + i as i64,
                gps_latitude: location.map(|l| l.0),
                gps_longitude: location.map(|l| l.1),
                ..Default::default()
            })
            .collect();
        summary.gps_members = summary
            .members
            .iter()
            .filter(|m| m.has_gps())
            .cloned()
            .collect();
        summary
    }

    const HOME: (f64, f64) = (52.52, 13.40);
    const ROME: (f64, f64) = (41.90, 12.49);

    #[test]
    fn test_bridges_lean_days_far_from_anchor() {
        let mut days = BTreeMap::new();
        days.insert(date(1), day(1, false, 2, Some(HOME)));
        days.insert(date(2), day(2, true, 20, Some(ROME)));
        days.insert(date(3), day(3, true, 20, Some(ROME)));
        days.insert(date(4), day(4, false, 3, Some(HOME)));
        days.insert(date(5), day(5, false, 3, Some(HOME)));

        let config = VacationConfig::default();
        let run = TransportDayExtender::new(&config).extend(&[date(2), date(3)], &days);
        assert_eq!(run, vec![date(1), date(2), date(3), date(4)]);
    }

    #[test]
    fn test_busy_or_near_days_are_not_bridged() {
        let mut days = BTreeMap::new();
        days.insert(date(1), day(1, false, 40, Some(HOME)));
        days.insert(date(2), day(2, true, 20, Some(ROME)));
        days.insert(date(3), day(3, false, 2, Some(ROME)));
        days.insert(date(4), day(4, false, 2, None));

        let config = VacationConfig::default();
        let run = TransportDayExtender::new(&config).extend(&[date(2)], &days);
        assert_eq!(run, vec![date(2)]);
    }

    #[test]
    fn test_high_transit_day_without_location() {
        let mut days = BTreeMap::new();
        days.insert(date(2), day(2, true, 20, Some(ROME)));
        let mut travel = day(3, false, 2, None);
        travel.in_transit = true;
        days.insert(date(3), travel);

        let config = VacationConfig::default();
        let run = TransportDayExtender::new(&config).extend(&[date(2)], &days);
        assert_eq!(run, vec![date(2), date(3)]);
    }

    #[test]
    fn test_anchor_transit_alone_does_not_bridge() {
        // The run's last day is the travel day; the lean day after it
        // shows no movement of its own and sits next to the anchor.
        let mut days = BTreeMap::new();
        days.insert(date(2), day(2, true, 20, Some(ROME)));
        let mut anchor = day(3, true, 12, Some(ROME));
        anchor.high_speed_transit = true;
        anchor.transit_ratio = 0.9;
        anchor.in_transit = true;
        days.insert(date(3), anchor);
        days.insert(date(4), day(4, false, 2, Some(ROME)));

        let config = VacationConfig::default();
        let run = TransportDayExtender::new(&config).extend(&[date(2), date(3)], &days);
        assert_eq!(run, vec![date(2), date(3)]);

        // Same picture without any location on the lean day.
        days.insert(date(4), day(4, false, 2, None));
        let run = TransportDayExtender::new(&config).extend(&[date(2), date(3)], &days);
        assert_eq!(run, vec![date(2), date(3)]);
    }
}
