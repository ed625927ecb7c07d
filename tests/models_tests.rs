// Model tests: source parsing and response serialization

use statdash::models::{Source, StatsResponse};
use std::str::FromStr;

#[test]
fn source_parse_is_case_insensitive() {
    assert_eq!(Source::from_str("twitter").unwrap(), Source::Twitter);
    assert_eq!(Source::from_str("TWITTER").unwrap(), Source::Twitter);
    assert_eq!(Source::from_str("Weather").unwrap(), Source::Weather);
    assert!(Source::from_str("myspace").is_err());
}

#[test]
fn source_round_trips_through_as_str() {
    for source in Source::ALL {
        assert_eq!(Source::from_str(source.as_str()).unwrap(), source);
    }
}

#[test]
fn source_serializes_lowercase() {
    assert_eq!(
        serde_json::to_string(&Source::Tscraper).unwrap(),
        "\"tscraper\""
    );
}

#[test]
fn empty_response_shape() {
    let json = serde_json::to_value(StatsResponse::empty()).unwrap();
    assert_eq!(json, serde_json::json!({ "stats": [], "series": {} }));
}
