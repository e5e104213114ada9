//! Query routers.
//!
//! Turn free text into a classified [`Query`]: intent tags, locations,
//! thresholds, activity context and trip length.
//!
//! - [`KeywordRouter`]: fixed trigger vocabulary, gazetteer plus capitalized
//!   spans after a locative preposition, unit-aware threshold phrases
//! - [`LlmRouter`]: asks the model for JSON, parses it defensively and falls
//!   back to the keyword router on any failure

use crate::config::{RouterConfig, RouterKind};
use async_trait::async_trait;
use nimbus_common::{Activity, IntentTag, Location, Metric, NimbusError, Query, Result};
use nimbus_llm::{complete_prompt, extract_json_object, LlmClient};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Classifies raw text into a [`Query`].
///
/// Classification never fails: no match yields the fallback tag and no
/// location is not an error.
#[async_trait]
pub trait QueryRouter: Send + Sync {
    fn name(&self) -> &str;

    async fn classify(&self, raw_text: &str) -> Query;
}

/// Build the router the configuration asks for.
pub fn build_router(config: &RouterConfig, llm: Option<Arc<dyn LlmClient>>) -> Result<Arc<dyn QueryRouter>> {
    let keywords = KeywordRouter::new().with_known_locations(&config.known_locations)?;
    match (config.kind, llm) {
        (RouterKind::Model, Some(client)) => Ok(Arc::new(LlmRouter::new(
            client,
            keywords,
            config.model_timeout(),
        ))),
        (RouterKind::Model, None) => {
            warn!("Model router requested but no LLM configured, using keywords");
            Ok(Arc::new(keywords))
        }
        (RouterKind::Keyword, _) => Ok(Arc::new(keywords)),
    }
}

// ============================================================================
// Trigger Vocabulary
// ============================================================================

static WEATHER_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(weather|temperature|temp|forecast|conditions?|rain\w*|snow\w*|wind\w*|humid\w*|sunny|cloudy|hot|cold|storms?|degrees?)\b").unwrap()
});

static ALERT_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(alerts?|monitor\w*|notify|notification\w*|warn\w*|track\w*)\b").unwrap()
});

static INTELLIGENCE_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(accurate|accuracy|reliable|reliability|consensus|multiple\s+sources|compare\s+sources|cross[-\s]?check\w*)\b").unwrap()
});

static TRAVEL_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(travel\w*|trips?|vacation\w*|visit\w*|itinerar\w*)\b").unwrap()
});

fn intent_vocabulary() -> [(IntentTag, &'static LazyLock<Regex>); 4] {
    [
        (IntentTag::Weather, &WEATHER_TERMS),
        (IntentTag::Alerts, &ALERT_TERMS),
        (IntentTag::Intelligence, &INTELLIGENCE_TERMS),
        (IntentTag::Travel, &TRAVEL_TERMS),
    ]
}

static ACTIVITY_TERMS: LazyLock<[(Activity, Regex); 5]> = LazyLock::new(|| {
    [
        (
            Activity::Outdoor,
            Regex::new(r"(?i)\b(outdoors?|outside|picnic\w*|park|bbq|barbecue|running|jog\w*|cycling|bike\w*|beach)\b").unwrap(),
        ),
        (
            Activity::Hiking,
            Regex::new(r"(?i)\b(hik\w*|trail\w*|camping|climb\w*)\b").unwrap(),
        ),
        (
            Activity::Travel,
            Regex::new(r"(?i)\b(travel\w*|trips?|flights?|flying|vacation\w*|road\s+trip)\b").unwrap(),
        ),
        (
            Activity::Commute,
            Regex::new(r"(?i)\b(commut\w*|drive\s+to\s+work|to\s+the\s+office)\b").unwrap(),
        ),
        (
            Activity::Events,
            Regex::new(r"(?i)\b(events?|wedding\w*|concerts?|festival\w*|game\s+day|party|parties)\b").unwrap(),
        ),
    ]
});

// ============================================================================
// Locations
// ============================================================================

const KNOWN_CITIES: &[&str] = &[
    "london", "paris", "new york", "tokyo", "sydney", "berlin", "rome", "madrid",
    "amsterdam", "barcelona", "vienna", "prague", "moscow", "beijing", "mumbai",
    "delhi", "bangkok", "singapore", "los angeles", "chicago", "houston", "phoenix",
    "philadelphia", "san francisco", "seattle", "boston", "atlanta", "miami",
    "denver", "portland",
];

const KNOWN_STATES: &[&str] = &[
    "california", "texas", "florida", "pennsylvania", "illinois", "ohio", "georgia",
    "north carolina", "michigan", "colorado", "washington state",
];

/// Words that start with a capital but are not places.
const SPAN_STOPWORDS: &[&str] = &[
    "i", "the", "my", "our", "this", "that", "next", "tomorrow", "today", "tonight",
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
    "january", "february", "march", "april", "may", "june", "july", "august",
    "september", "october", "november", "december", "weekend", "week", "days",
    "weather", "plan", "trip", "travel", "please", "me", "celsius", "fahrenheit",
];

fn gazetteer_pattern<'a>(places: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let mut places: Vec<String> = places
        .into_iter()
        .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|p| !p.is_empty())
        .collect();
    if places.is_empty() {
        return None;
    }
    // Longest first so "new york" wins over a shorter overlapping entry.
    places.sort_by_key(|p| std::cmp::Reverse(p.len()));
    let alternatives: Vec<String> = places
        .iter()
        .map(|p| regex::escape(p).replace(' ', r"\s+"))
        .collect();
    Some(format!(r"(?i)\b(?:{})\b", alternatives.join("|")))
}

static BUILTIN_GAZETTEER: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = gazetteer_pattern(KNOWN_CITIES.iter().chain(KNOWN_STATES).copied()).unwrap();
    Regex::new(&pattern).unwrap()
});

/// A list of capitalized spans introduced by a locative preposition:
/// "in Salt Lake City", "to Lyon and Nantes", "for Kyoto, Osaka".
static LOCATIVE_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?i:in|for|at|to|near|from|around|visiting)\s+([A-Z][\p{L}'.-]*(?:\s+[A-Z][\p{L}'.-]*)*(?:\s*(?:,|\band\b|&)\s*[A-Z][\p{L}'.-]*(?:\s+[A-Z][\p{L}'.-]*)*)*)",
    )
    .unwrap()
});

static CAPITALIZED_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z][\p{L}'.-]*(?:\s+[A-Z][\p{L}'.-]*)*").unwrap());

/// A state or country code trailing a place, as in "San Jose, CA".
fn is_region_code(span: &str) -> bool {
    let span = span.trim();
    (1..=2).contains(&span.len()) && span.chars().all(|c| c.is_ascii_uppercase())
}

/// Drop leading stopwords, then keep words up to the next stopword.
fn clean_span(span: &str) -> Option<String> {
    let is_stopword = |w: &str| SPAN_STOPWORDS.contains(&w.to_lowercase().as_str());
    let words: Vec<&str> = span
        .split_whitespace()
        .map(|w| w.trim_matches(|c| c == '.' || c == '\'' || c == '-'))
        .filter(|w| !w.is_empty())
        .skip_while(|w| is_stopword(*w))
        .take_while(|w| !is_stopword(*w))
        .collect();
    (!words.is_empty()).then(|| words.join(" "))
}

// ============================================================================
// Thresholds
// ============================================================================

static THRESHOLD_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?P<cmp>above|over|exceeds?|exceeding|more\s+than|greater\s+than|higher\s+than|hotter\s+than|warmer\s+than|below|under|less\s+than|lower\s+than|colder\s+than|cooler\s+than)\s+(?P<value>-?\d+(?:\.\d+)?)\s*(?P<unit>°\s*(?:celsius|fahrenheit|[cf])\b|°|degrees?(?:\s+(?:celsius|fahrenheit|c|f)\b)?|deg\b|mph\b|km/?h\b|kph\b|%|percent\b)?",
    )
    .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quantity {
    Temperature,
    Wind,
    Humidity,
}

fn quantity_from_unit(unit: &str) -> Option<(Quantity, bool)> {
    let unit = unit.to_lowercase().replace(char::is_whitespace, "");
    if unit.starts_with("km") || unit == "kph" {
        Some((Quantity::Wind, true))
    } else if unit == "mph" {
        Some((Quantity::Wind, false))
    } else if unit == "%" || unit == "percent" {
        Some((Quantity::Humidity, false))
    } else if unit.ends_with('c') || unit.ends_with("celsius") {
        Some((Quantity::Temperature, true))
    } else if unit.starts_with('°') || unit.starts_with("deg") {
        Some((Quantity::Temperature, false))
    } else {
        None
    }
}

/// The metric word nearest before the comparison, within the same clause.
fn quantity_from_context(prefix: &str, comparison: &str) -> Option<Quantity> {
    if ["hotter", "warmer", "colder", "cooler"]
        .iter()
        .any(|w| comparison.contains(w))
    {
        return Some(Quantity::Temperature);
    }
    for word in prefix.split_whitespace().rev().take(4) {
        let word = word.trim_matches(|c: char| !c.is_alphanumeric());
        if word.starts_with("temp") || word == "hot" || word == "cold" || word == "heat" {
            return Some(Quantity::Temperature);
        }
        if word.starts_with("wind") || word.starts_with("gust") {
            return Some(Quantity::Wind);
        }
        if word.starts_with("humid") {
            return Some(Quantity::Humidity);
        }
    }
    None
}

fn is_upper_bound(comparison: &str) -> bool {
    ["below", "under", "less", "lower", "colder", "cooler"]
        .iter()
        .any(|w| comparison.contains(w))
}

/// Extract thresholds in canonical units. Phrases that cannot be bound to a
/// metric are dropped.
pub fn extract_thresholds(text: &str) -> BTreeMap<Metric, f64> {
    let mut thresholds = BTreeMap::new();
    for caps in THRESHOLD_PHRASE.captures_iter(text) {
        let (Some(whole), Some(cmp), Some(value)) = (caps.get(0), caps.name("cmp"), caps.name("value")) else {
            continue;
        };
        let Ok(mut value) = value.as_str().parse::<f64>() else {
            continue;
        };
        let comparison = cmp.as_str().to_lowercase();
        let prefix = text[..whole.start()].to_lowercase();

        let bound = match caps.name("unit").and_then(|u| quantity_from_unit(u.as_str())) {
            Some(bound) => Some(bound),
            None => quantity_from_context(&prefix, &comparison).map(|q| (q, false)),
        };
        let Some((quantity, metric_units)) = bound else {
            debug!(phrase = %whole.as_str(), "Unbound threshold phrase dropped");
            continue;
        };

        let below = is_upper_bound(&comparison);
        let metric = match (quantity, below) {
            (Quantity::Temperature, false) => Metric::TemperatureHigh,
            (Quantity::Temperature, true) => Metric::TemperatureLow,
            (Quantity::Wind, false) => Metric::WindSpeed,
            (Quantity::Humidity, false) => Metric::HumidityHigh,
            (Quantity::Humidity, true) => Metric::HumidityLow,
            (Quantity::Wind, true) => {
                debug!(phrase = %whole.as_str(), "Lower wind bound has no metric, dropped");
                continue;
            }
        };

        if metric_units {
            value = match quantity {
                Quantity::Temperature => value * 9.0 / 5.0 + 32.0,
                Quantity::Wind => value * 0.621_371,
                Quantity::Humidity => value,
            };
        }
        thresholds.insert(metric, (value * 10.0).round() / 10.0);
    }
    thresholds
}

// ============================================================================
// Trip Duration
// ============================================================================

static TRIP_DAYS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,3})[\s-]*days?\b").unwrap());
static WEEKEND: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bweekend\b").unwrap());
static WEEK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bweek\b").unwrap());

pub fn extract_trip_days(text: &str) -> Option<u32> {
    if WEEKEND.is_match(text) {
        return Some(3);
    }
    if let Some(days) = TRIP_DAYS
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .filter(|d| *d > 0)
    {
        return Some(days);
    }
    WEEK.is_match(text).then_some(7)
}

// ============================================================================
// Keyword Router
// ============================================================================

/// Deterministic router over a fixed vocabulary.
#[derive(Debug, Clone, Default)]
pub struct KeywordRouter {
    extra_places: Option<Regex>,
}

impl KeywordRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the built-in gazetteer.
    pub fn with_known_locations(mut self, places: &[String]) -> Result<Self> {
        if let Some(pattern) = gazetteer_pattern(places.iter().map(String::as_str)) {
            let regex = Regex::new(&pattern)
                .map_err(|e| NimbusError::Config(format!("invalid known_locations: {e}")))?;
            self.extra_places = Some(regex);
        }
        Ok(self)
    }

    pub fn extract_locations(&self, text: &str) -> Vec<Location> {
        let mut found: Vec<(usize, Location)> = Vec::new();

        let gazetteers = std::iter::once(&*BUILTIN_GAZETTEER).chain(self.extra_places.as_ref());
        for gazetteer in gazetteers {
            found.extend(
                gazetteer
                    .find_iter(text)
                    .map(|m| (m.start(), Location::named(m.as_str()))),
            );
        }

        for caps in LOCATIVE_LIST.captures_iter(text) {
            let Some(list) = caps.get(1) else { continue };
            for (i, span) in CAPITALIZED_SPAN.find_iter(list.as_str()).enumerate() {
                if i > 0 && is_region_code(span.as_str()) {
                    continue;
                }
                if let Some(name) = clean_span(span.as_str()) {
                    found.push((list.start() + span.start(), Location::named(&name)));
                }
            }
        }

        found.sort_by_key(|(position, _)| *position);
        let mut locations: Vec<Location> = Vec::with_capacity(found.len());
        for (_, location) in found {
            if !locations.contains(&location) {
                locations.push(location);
            }
        }
        locations
    }

    fn classify_sync(&self, raw_text: &str) -> Query {
        let mut query = Query::new(raw_text);
        for (tag, vocabulary) in intent_vocabulary() {
            if vocabulary.is_match(raw_text) {
                query.intent_tags.insert(tag);
            }
        }
        query.ensure_fallback();

        query.extracted_locations = self.extract_locations(raw_text);
        query.extracted_thresholds = extract_thresholds(raw_text);
        query.activities = ACTIVITY_TERMS
            .iter()
            .filter(|(_, pattern)| pattern.is_match(raw_text))
            .map(|(activity, _)| *activity)
            .collect();
        if query.has_tag(IntentTag::Travel) || query.activities.contains(&Activity::Travel) {
            query.trip_days = extract_trip_days(raw_text);
        }

        debug!(
            tags = ?query.intent_tags,
            locations = query.extracted_locations.len(),
            thresholds = query.extracted_thresholds.len(),
            ambiguous = query.ambiguous,
            "Keyword classification"
        );
        query
    }
}

#[async_trait]
impl QueryRouter for KeywordRouter {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn classify(&self, raw_text: &str) -> Query {
        self.classify_sync(raw_text)
    }
}

// ============================================================================
// Model Router
// ============================================================================

/// Maximum query length sent to the model. Longer input goes to keywords.
const MAX_INPUT_CONTENT_LENGTH: usize = 4_000;

const ROUTER_SYSTEM_PROMPT: &str = r#"You classify weather requests. Respond with ONLY a JSON object, no other text.

Schema:
{"tags": [...], "locations": [...], "thresholds": {...}, "activities": [...], "trip_days": null}

- tags: any of "weather", "intelligence", "alerts", "travel". Several may apply.
  weather = current conditions; intelligence = accurate, multi-source or reliability requests;
  alerts = monitoring, notifications, warnings; travel = trips, vacations, itineraries.
- locations: place names in the order they appear.
- thresholds: keys from "temperature_high", "temperature_low", "wind_speed", "humidity_high",
  "humidity_low". Values in °F, mph and percent; convert Celsius and km/h.
- activities: any of "outdoor", "hiking", "travel", "commute", "events".
- trip_days: trip length in days when stated ("weekend" is 3, "a week" is 7), else null.

Examples:
"What's the weather in London?" -> {"tags": ["weather"], "locations": ["London"], "thresholds": {}, "activities": [], "trip_days": null}
"Alert me if Denver goes above 30°C" -> {"tags": ["alerts"], "locations": ["Denver"], "thresholds": {"temperature_high": 86}, "activities": [], "trip_days": null}
"Plan a weekend hiking trip to Seattle" -> {"tags": ["travel"], "locations": ["Seattle"], "thresholds": {}, "activities": ["hiking", "travel"], "trip_days": 3}"#;

/// Model-backed router. Any failure falls back to keyword classification.
pub struct LlmRouter {
    client: Arc<dyn LlmClient>,
    fallback: KeywordRouter,
    timeout: Duration,
}

impl LlmRouter {
    pub fn new(client: Arc<dyn LlmClient>, fallback: KeywordRouter, timeout: Duration) -> Self {
        Self {
            client,
            fallback,
            timeout,
        }
    }

    async fn classify_with_model(&self, raw_text: &str) -> Result<Query> {
        if raw_text.len() > MAX_INPUT_CONTENT_LENGTH {
            return Err(NimbusError::Llm(format!(
                "query exceeds {MAX_INPUT_CONTENT_LENGTH} characters"
            )));
        }
        let response = complete_prompt(
            self.client.as_ref(),
            Some(ROUTER_SYSTEM_PROMPT),
            raw_text,
            self.timeout,
        )
        .await?;
        parse_response(raw_text, &response)
    }
}

/// Parse the model's classification.
///
/// Unknown tags, metrics and activities are dropped. A response without a
/// `tags` array is rejected.
pub fn parse_response(raw_text: &str, response: &str) -> Result<Query> {
    let json = extract_json_object(response)
        .ok_or_else(|| NimbusError::Llm("no JSON object in router response".into()))?;

    let tags = json
        .get("tags")
        .and_then(Value::as_array)
        .ok_or_else(|| NimbusError::Llm("router response has no tags array".into()))?;

    let mut query = Query::new(raw_text);
    for tag in tags.iter().filter_map(Value::as_str) {
        match tag.parse::<IntentTag>() {
            Ok(tag) => {
                query.intent_tags.insert(tag);
            }
            Err(_) => warn!(tag = %tag, "Dropping unknown intent tag from model"),
        }
    }
    query.ensure_fallback();

    if let Some(locations) = json.get("locations").and_then(Value::as_array) {
        for name in locations.iter().filter_map(Value::as_str) {
            let location = Location::named(name);
            if !location.is_empty() && !query.extracted_locations.contains(&location) {
                query.extracted_locations.push(location);
            }
        }
    }

    if let Some(thresholds) = json.get("thresholds").and_then(Value::as_object) {
        for (key, value) in thresholds {
            match (key.parse::<Metric>(), value.as_f64()) {
                (Ok(metric), Some(value)) if value.is_finite() => {
                    query.extracted_thresholds.insert(metric, value);
                }
                _ => debug!(key = %key, "Dropping unusable threshold from model"),
            }
        }
    }

    if let Some(activities) = json.get("activities").and_then(Value::as_array) {
        query.activities = activities
            .iter()
            .filter_map(|a| serde_json::from_value::<Activity>(a.clone()).ok())
            .collect();
    }

    query.trip_days = json
        .get("trip_days")
        .and_then(Value::as_u64)
        .filter(|d| *d > 0)
        .and_then(|d| u32::try_from(d).ok());

    info!(
        tags = ?query.intent_tags,
        locations = query.extracted_locations.len(),
        ambiguous = query.ambiguous,
        "Model classification"
    );
    Ok(query)
}

#[async_trait]
impl QueryRouter for LlmRouter {
    fn name(&self) -> &str {
        "model"
    }

    async fn classify(&self, raw_text: &str) -> Query {
        match self.classify_with_model(raw_text).await {
            Ok(query) => query,
            Err(e) => {
                warn!(error = %e, "Model classification failed, falling back to keywords");
                self.fallback.classify_sync(raw_text)
            }
        }
    }
}
