//! Tourism / transport heuristics over geocoder POI tags.

use crate::media::PoiInfo;

const TOURISM_CLASSES: &[&str] = &["tourism", "historic", "natural"];

const TOURISM_KINDS: &[&str] = &[
    "attraction",
    "museum",
    "gallery",
    "viewpoint",
    "zoo",
    "aquarium",
    "theme_park",
    "beach",
    "beach_resort",
    "castle",
    "monument",
    "memorial",
    "ruins",
    "archaeological_site",
    "national_park",
    "nature_reserve",
    "peak",
    "waterfall",
    "marina",
    "water_park",
    "hotel",
    "hostel",
    "camp_site",
    "resort",
];

const TRANSPORT_CLASSES: &[&str] = &["aeroway", "railway", "public_transport"];

const TRANSPORT_KINDS: &[&str] = &[
    "aerodrome",
    "terminal",
    "station",
    "halt",
    "bus_station",
    "ferry_terminal",
    "platform",
    "stop_position",
    "fuel",
    "services",
    "rest_area",
    "motorway",
    "motorway_junction",
];

/// Stateless classifier; checks class, kind and free-form tags.
#[derive(Debug, Default, Clone, Copy)]
pub struct PoiClassifier;

impl PoiClassifier {
    pub fn is_tourism(&self, poi: &PoiInfo) -> bool {
        matches_any(poi, TOURISM_CLASSES, TOURISM_KINDS)
    }

    pub fn is_transport(&self, poi: &PoiInfo) -> bool {
        matches_any(poi, TRANSPORT_CLASSES, TRANSPORT_KINDS)
    }
}

fn matches_any(poi: &PoiInfo, classes: &[&str], kinds: &[&str]) -> bool {
    let norm = |s: &str| s.trim().to_lowercase();

    if let Some(class) = poi.class.as_deref().map(norm) {
        if classes.contains(&class.as_str()) {
            return true;
        }
    }

    if let Some(kind) = poi.kind.as_deref().map(norm) {
        if kinds.contains(&kind.as_str()) {
            return true;
        }
    }

    poi.tags.iter().any(|tag| {
        let (key, value) = tag.split_once('=').unwrap_or((tag.as_str(), ""));
        let (key, value) = (norm(key), norm(value));
        classes.contains(&key.as_str()) || kinds.contains(&value.as_str())
    })
}
