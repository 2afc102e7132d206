use chrono::{Duration, NaiveDate, TimeZone, Utc};
use std::collections::BTreeSet;
use std::sync::{mpsc, Arc};

use memories::media::PoiInfo;
use memories::monitor::ChannelMonitor;
use memories::{Config, Media, Pipeline, PipelineUpdate};

const BERLIN: (f64, f64) = (52.520, 13.400);
const LISBON: (f64, f64) = (38.7223, -9.1393);
const HOTEL: (f64, f64) = (38.7100, -9.1450);

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 7, day).unwrap()
}

fn capture(id: i64, day: u32, local_minutes: i64, offset: i32, at: (f64, f64)) -> Media {
    let midnight = Utc.with_ymd_and_hms(2024, 7, day, 0, 0, 0).unwrap();
    Media {
        id,
        path: format!("/photos/2024-07-{:02}/{}.jpg", day, id),
        taken_at: Some(midnight + Duration::minutes(local_minutes - offset as i64)),
        tz_offset_minutes: Some(offset),
        gps_latitude: Some(at.0),
        gps_longitude: Some(at.1),
        ..Default::default()
    }
}

/// Quiet days in Berlin around six days in Lisbon.
fn library() -> Vec<Media> {
    let mut media = Vec::new();

    for day in (1..=9).chain(16..=20) {
        for (k, hour) in [10, 14, 18].into_iter().enumerate() {
            let mut m = capture(
                day as i64 * 100 + k as i64,
                day,
                hour * 60,
                120,
                (BERLIN.0 + k as f64 * 0.001, BERLIN.1),
            );
            m.country_code = Some("DE".to_string());
            m.quality_score = Some(0.6);
            media.push(m);
        }
    }

    for day in 10..=15 {
        for i in 0..12 {
            let mut m = capture(
                day as i64 * 100 + i,
                day,
                (9 + i) * 60,
                60,
                (LISBON.0 + i as f64 * 0.003, LISBON.1),
            );
            m.country_code = Some("PT".to_string());
            m.quality_score = Some(0.45 + (i % 5) as f64 * 0.1);
            m.is_video = i == 7;
            if i % 2 == 0 {
                m.poi = Some(PoiInfo {
                    class: Some("tourism".to_string()),
                    kind: Some("attraction".to_string()),
                    name: None,
                    tags: Vec::new(),
                });
            }
            if i % 4 == 1 {
                m.person_ids = vec![1, 2];
                m.face_count = 2;
            }
            media.push(m);
        }
        for (k, minutes) in [0, 30, 60, 90].into_iter().enumerate() {
            let mut m = capture(
                day as i64 * 100 + 50 + k as i64,
                day,
                21 * 60 + minutes,
                60,
                HOTEL,
            );
            m.country_code = Some("PT".to_string());
            m.quality_score = Some(0.5);
            media.push(m);
        }
    }

    media
}

fn configured() -> Config {
    let mut config = Config::default();
    config.home.latitude = Some(BERLIN.0);
    config.home.longitude = Some(BERLIN.1);
    config.home.country = Some("de".to_string());
    config.home.timezone_offset_minutes = Some(120);
    config
}

#[test]
fn test_detects_and_curates_lisbon_trip() {
    let (monitor_tx, monitor_rx) = mpsc::channel();
    let pipeline = Pipeline::with_monitor(configured(), Arc::new(ChannelMonitor::new(monitor_tx)));
    let (tx, rx) = mpsc::channel();

    let media = library();
    let result = pipeline.run(&media, Some(tx)).unwrap();

    // Every trip day is away and has a hotel base
    for day in 10..=15 {
        let summary = &result.days[&date(day)];
        assert!(summary.is_away, "day {} should be away", day);
        assert!(summary.is_core, "day {} should be core", day);
        let base = summary.base_location.expect("hotel base");
        assert_eq!(base.source.as_str(), "staypoint");
    }
    assert!(!result.days[&date(5)].is_away);

    assert_eq!(result.drafts.len(), 1);
    let draft = &result.drafts[0];
    let meta = &draft.params.meta;

    // The quiet days on either side are bridged as travel days
    assert_eq!(meta.start_date, date(9));
    assert_eq!(meta.end_date, date(16));
    assert_eq!(meta.classification, "vacation");
    assert_eq!(meta.metrics.away_days, 6);
    assert!(meta.metrics.foreign);
    assert!(meta.metrics.countries.contains("pt"));
    assert!(draft.params.score > 6.0);

    let selected = draft.selected_ids();
    let policy = &draft.params.member_selection.policy;
    assert!(selected.len() <= policy.target_total);
    assert!(selected.len() >= policy.minimum_total);

    let member_ids: BTreeSet<i64> = draft.members.iter().map(|m| m.id).collect();
    assert!(selected.iter().all(|id| member_ids.contains(id)));
    let unique: BTreeSet<i64> = selected.iter().copied().collect();
    assert_eq!(unique.len(), selected.len());

    // Every trip day contributes
    let per_day = &draft.params.member_selection.telemetry.per_day;
    for day in 10..=15 {
        assert!(per_day.get(&date(day)).copied().unwrap_or(0) > 0);
    }

    let updates: Vec<PipelineUpdate> = rx.try_iter().collect();
    assert_eq!(updates.first(), Some(&PipelineUpdate::Started { media: media.len() }));
    assert_eq!(updates.last(), Some(&PipelineUpdate::Completed { drafts: 1 }));

    let events: Vec<_> = monitor_rx.try_iter().collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].job, "vacation_curation");
    assert_eq!(events[0].status, "selected");
}

#[test]
fn test_inferred_home_matches_configured() {
    let media = library();
    let pipeline = Pipeline::with_monitor(Config::default(), Arc::new(memories::monitor::NullMonitor));
    let result = pipeline.run(&media, None).unwrap();

    assert!((result.home.latitude - 52.521).abs() < 0.01);
    assert_eq!(result.home.country.as_deref(), Some("de"));
    assert_eq!(result.home.timezone_offset_minutes, Some(120));
    assert_eq!(result.drafts.len(), 1);
}

#[test]
fn test_selection_is_deterministic() {
    let media = library();
    let first = Pipeline::with_monitor(configured(), Arc::new(memories::monitor::NullMonitor))
        .run(&media, None)
        .unwrap();
    let second = Pipeline::with_monitor(configured(), Arc::new(memories::monitor::NullMonitor))
        .run(&media, None)
        .unwrap();

    assert_eq!(first.drafts, second.drafts);
}

#[test]
fn test_home_only_library_yields_no_drafts() {
    let media: Vec<Media> = library()
        .into_iter()
        .filter(|m| m.country_code.as_deref() == Some("DE"))
        .collect();
    let result = Pipeline::with_monitor(configured(), Arc::new(memories::monitor::NullMonitor))
        .run(&media, None)
        .unwrap();

    assert!(result.runs.is_empty());
    assert!(result.drafts.is_empty());
}
