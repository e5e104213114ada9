//! Built-in fixture sources for the `nimbus` binary and tests.
//!
//! Three in-memory providers ("nws", "wttr", "mcp") with slightly
//! disagreeing readings for a handful of cities. "nws" has no coverage
//! outside the United States, as in the real service.

use nimbus_common::ConditionCode;
use nimbus_fusion::{SourceSet, StaticSource};
use std::sync::Arc;
use std::time::Duration;

/// (city, °F, condition, wind mph, humidity %, inside the US)
const CITIES: &[(&str, f64, ConditionCode, f64, f64, bool)] = &[
    ("New York", 78.0, ConditionCode::PartlyCloudy, 9.0, 62.0, true),
    ("Chicago", 91.0, ConditionCode::Clear, 14.0, 40.0, true),
    ("Denver", 33.0, ConditionCode::Snow, 22.0, 70.0, true),
    ("Miami", 88.0, ConditionCode::Thunderstorm, 28.0, 85.0, true),
    ("Seattle", 58.0, ConditionCode::Rain, 11.0, 88.0, true),
    ("San Francisco", 64.0, ConditionCode::Fog, 12.0, 80.0, true),
    ("London", 61.0, ConditionCode::Cloudy, 10.0, 77.0, false),
    ("Paris", 68.0, ConditionCode::Clear, 6.0, 55.0, false),
    ("Tokyo", 72.0, ConditionCode::Rain, 8.0, 84.0, false),
    ("Sydney", 66.0, ConditionCode::PartlyCloudy, 15.0, 60.0, false),
];

/// Offsets applied per source so the fixtures disagree a little.
const SOURCE_OFFSETS: &[(&str, f64, f64, f64)] = &[
    ("nws", 0.0, 0.0, 0.0),
    ("wttr", 1.5, 2.0, -3.0),
    ("mcp", -1.0, -1.0, 2.0),
];

pub fn demo_sources(timeout: Duration) -> SourceSet {
    let mut set = SourceSet::new(timeout);
    for (id, temp_offset, wind_offset, humidity_offset) in SOURCE_OFFSETS {
        let mut source = StaticSource::new(*id);
        for (city, temperature, condition, wind, humidity, domestic) in CITIES {
            if *id == "nws" && !domestic {
                continue;
            }
            source = source.with_reading(
                city,
                temperature + temp_offset,
                *condition,
                (wind + wind_offset).max(0.0),
                (humidity + humidity_offset).clamp(0.0, 100.0),
            );
        }
        set = set.with_source(Arc::new(source));
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_common::{Location, ObservationSource};

    #[tokio::test]
    async fn test_nws_only_covers_us_cities() {
        let sources = demo_sources(Duration::from_secs(1));
        assert_eq!(sources.sources().len(), 3);

        let nws = &sources.sources()[0];
        assert!(nws.fetch(&Location::named("Chicago"), None).await.is_ok());
        assert!(nws.fetch(&Location::named("Tokyo"), None).await.is_err());
    }
}
