//! Elements and their attestation results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

/// Result code the engine uses for an accepted attestation.
pub const CODE_RESULT_OK: i64 = 0;

/// A point on the map, decoded from the engine's `[lat, long]` string pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// One historical attestation outcome for an element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementResult {
    pub itemid: String,
    #[serde(rename = "elementID")]
    pub element_id: String,
    pub result: i64,
    #[serde(rename = "verifiedAt", with = "epoch_seconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "claimID", default, skip_serializing_if = "Option::is_none")]
    pub claim_id: Option<String>,
    #[serde(rename = "policyID", default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
    #[serde(rename = "ruleName", default, skip_serializing_if = "Option::is_none")]
    pub rule_name: Option<String>,
}

impl ElementResult {
    pub fn new(
        itemid: impl Into<String>,
        element_id: impl Into<String>,
        result: i64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            itemid: itemid.into(),
            element_id: element_id.into(),
            result,
            timestamp,
            claim_id: None,
            policy_id: None,
            rule_name: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result == CODE_RESULT_OK
    }
}

/// A remote attestable device tracked by the engine.
///
/// Identity and display fields come from the engine and are never edited;
/// `results` and `location` are only ever swapped out wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub itemid: String,
    pub name: String,
    pub endpoint: String,
    #[serde(rename = "type", default)]
    pub types: Vec<String>,
    pub protocol: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_location",
        serialize_with = "serialize_location"
    )]
    pub location: Option<GeoPoint>,
    #[serde(skip)]
    results: Vec<ElementResult>,
}

impl Element {
    pub fn new(
        itemid: impl Into<String>,
        name: impl Into<String>,
        endpoint: impl Into<String>,
        protocol: impl Into<String>,
    ) -> Self {
        Self {
            itemid: itemid.into(),
            name: name.into(),
            endpoint: endpoint.into(),
            types: Vec::new(),
            protocol: protocol.into(),
            description: None,
            location: None,
            results: Vec::new(),
        }
    }

    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Replaces the result history. Results belonging to another element
    /// are dropped.
    pub fn with_results(mut self, results: Vec<ElementResult>) -> Self {
        self.set_results(results);
        self
    }

    /// Clone of this element carrying a new location.
    pub fn with_location(&self, point: GeoPoint) -> Self {
        let mut moved = self.clone();
        moved.location = Some(point);
        moved
    }

    pub fn results(&self) -> &[ElementResult] {
        &self.results
    }

    pub(crate) fn set_results(&mut self, results: Vec<ElementResult>) {
        let before = results.len();
        self.results = results
            .into_iter()
            .filter(|r| r.element_id == self.itemid)
            .collect();
        if self.results.len() != before {
            debug!(
                "Dropped {} foreign results while attaching to element {}",
                before - self.results.len(),
                self.itemid
            );
        }
    }

    pub(crate) fn take_results(&mut self) -> Vec<ElementResult> {
        std::mem::take(&mut self.results)
    }

    /// Most recent result by timestamp
    pub fn latest_result(&self) -> Option<&ElementResult> {
        self.results.iter().max_by_key(|r| r.timestamp)
    }

    /// Fields consulted by keyword search, in match order.
    pub fn searchable_fields(&self) -> impl Iterator<Item = &str> {
        [
            self.itemid.as_str(),
            self.name.as_str(),
            self.endpoint.as_str(),
            self.protocol.as_str(),
        ]
        .into_iter()
        .chain(self.description.as_deref())
        .chain(self.types.iter().map(String::as_str))
    }

    /// True when `keyword` (already lowercase) occurs in any searched field.
    pub fn matches_keyword(&self, keyword: &str) -> bool {
        self.searchable_fields()
            .any(|field| field.to_lowercase().contains(keyword))
    }
}

fn deserialize_location<'de, D>(deserializer: D) -> Result<Option<GeoPoint>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Coordinate {
        Text(String),
        Number(f64),
    }

    impl Coordinate {
        fn value(&self) -> Option<f64> {
            match self {
                Coordinate::Text(s) => s.trim().parse().ok(),
                Coordinate::Number(n) => Some(*n),
            }
        }
    }

    let raw: Option<Vec<Coordinate>> = Option::deserialize(deserializer)?;
    let point = raw.and_then(|pair| {
        let lat = pair.first()?.value()?;
        let long = pair.get(1)?.value()?;
        Some(GeoPoint::new(lat, long))
    });
    Ok(point)
}

fn serialize_location<S>(location: &Option<GeoPoint>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match location {
        Some(p) => [p.latitude.to_string(), p.longitude.to_string()].serialize(serializer),
        None => serializer.serialize_none(),
    }
}

/// `verifiedAt` arrives as epoch seconds, sometimes quoted, sometimes not.
pub(crate) mod epoch_seconds {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    pub fn from_secs_f64(secs: f64) -> Option<DateTime<Utc>> {
        if !secs.is_finite() {
            return None;
        }
        let whole = secs.floor();
        let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
        DateTime::from_timestamp(whole as i64, nanos)
    }

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let secs = ts.timestamp() as f64 + f64::from(ts.timestamp_subsec_micros()) / 1e6;
        serializer.serialize_str(&secs.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = match Raw::deserialize(deserializer)? {
            Raw::Number(n) => n,
            Raw::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| de::Error::custom(format!("invalid timestamp '{}'", s)))?,
        };
        from_secs_f64(secs).ok_or_else(|| de::Error::custom("timestamp out of range"))
    }
}
