//! Activity-aware advice for a reading.

use nimbus_common::{Activity, ConditionCode, ConsensusReading};

const WINDY_MPH: f64 = 20.0;
const HOT_F: f64 = 85.0;
const COLD_F: f64 = 35.0;
const LOW_CONFIDENCE: f64 = 0.5;

/// Advice for the planned activities given current conditions.
///
/// Never empty: with nothing to flag it says so.
pub fn activity_recommendations<'a>(
    reading: &ConsensusReading,
    activities: impl IntoIterator<Item = &'a Activity>,
) -> Vec<String> {
    let condition = reading.condition;
    let mut advice = Vec::new();

    for activity in activities {
        match activity {
            Activity::Outdoor | Activity::Hiking => {
                if condition.is_wet() || condition.is_severe() {
                    advice.push(format!(
                        "Consider indoor alternatives in {}: {} is not suited to outdoor plans",
                        reading.location,
                        condition.label().to_lowercase()
                    ));
                } else if condition == ConditionCode::Clear {
                    advice.push("Good weather for being outside; bring sunscreen".to_string());
                }
            }
            Activity::Travel | Activity::Commute => {
                if condition.is_wintry() {
                    advice.push("Allow extra travel time for winter conditions".to_string());
                } else if condition == ConditionCode::Fog {
                    advice.push("Reduced visibility expected; drive carefully".to_string());
                } else if condition.disrupts_travel() {
                    advice.push("Expect delays; check routes before leaving".to_string());
                }
            }
            Activity::Events => {
                if reading.wind_speed >= WINDY_MPH {
                    advice.push(format!(
                        "Winds near {:.0} mph; secure tents, decorations and equipment",
                        reading.wind_speed
                    ));
                }
                if condition.is_wet() {
                    advice.push("Have a covered fallback for outdoor events".to_string());
                }
            }
        }
    }

    if reading.temperature >= HOT_F {
        advice.push("Hot conditions; stay hydrated and avoid midday exertion".to_string());
    } else if reading.temperature <= COLD_F {
        advice.push("Cold conditions; dress in layers and watch for ice".to_string());
    }

    if reading.confidence_score < LOW_CONFIDENCE {
        advice.push("Sources disagree on current conditions; check again before you go".to_string());
    }

    advice.dedup();
    if advice.is_empty() {
        advice.push("No specific weather concerns for your plans".to_string());
    }
    advice
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nimbus_common::{Location, ReadingStatus};

    fn reading(temp: f64, condition: ConditionCode, wind: f64) -> ConsensusReading {
        let mut r = ConsensusReading::unknown(Location::named("Austin"), Utc::now());
        r.temperature = temp;
        r.condition = condition;
        r.wind_speed = wind;
        r.confidence_score = 0.9;
        r.status = ReadingStatus::Consensus;
        r
    }

    #[test]
    fn rain_moves_hikes_indoors() {
        let advice = activity_recommendations(&reading(65.0, ConditionCode::Rain, 5.0), &[Activity::Hiking]);
        assert!(advice[0].contains("indoor"));
    }

    #[test]
    fn fog_and_snow_affect_commutes() {
        let fog = activity_recommendations(&reading(50.0, ConditionCode::Fog, 3.0), &[Activity::Commute]);
        assert!(fog[0].contains("visibility"));
        let snow = activity_recommendations(&reading(28.0, ConditionCode::Snow, 3.0), &[Activity::Travel]);
        assert!(snow.iter().any(|a| a.contains("extra travel time")));
        assert!(snow.iter().any(|a| a.contains("Cold")));
    }

    #[test]
    fn wind_matters_for_events() {
        let advice = activity_recommendations(&reading(70.0, ConditionCode::Cloudy, 28.0), &[Activity::Events]);
        assert!(advice[0].contains("secure"));
    }

    #[test]
    fn never_empty() {
        let advice = activity_recommendations(&reading(70.0, ConditionCode::Cloudy, 5.0), &[]);
        assert_eq!(advice, vec!["No specific weather concerns for your plans".to_string()]);
    }

    #[test]
    fn low_confidence_is_flagged() {
        let mut r = reading(70.0, ConditionCode::Cloudy, 5.0);
        r.confidence_score = 0.3;
        let advice = activity_recommendations(&r, &[Activity::Outdoor]);
        assert!(advice.iter().any(|a| a.contains("disagree")));
    }
}
