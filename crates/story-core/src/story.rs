use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// One entry of the `lastStories` list returned by the listing API.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StoryRecord {
    #[serde(default, deserialize_with = "opaque_id")]
    pub id: Option<String>,
    /// Base64 image URL or CDN path suffix, depending on `kind`.
    #[serde(default, deserialize_with = "non_empty")]
    pub url: Option<String>,
    /// Only the string `"video"` matters; anything else means image.
    #[serde(default, rename = "type", deserialize_with = "loose_kind")]
    pub kind: Option<String>,
    /// Capture time in Unix seconds. Zero counts as missing.
    #[serde(default, deserialize_with = "unix_seconds")]
    pub taken_at: Option<i64>,
    /// Set when the listing entry could not be read as a story.
    #[serde(skip)]
    pub malformed: Option<String>,
}

impl StoryRecord {
    /// Convert one raw listing entry. Entries that do not fit the record
    /// shape come back flagged as malformed instead of failing the listing.
    pub fn from_value(value: Value) -> Self {
        let id = match value.get("id") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        match serde_json::from_value::<StoryRecord>(value) {
            Ok(record) => record,
            Err(e) => StoryRecord {
                id,
                malformed: Some(e.to_string()),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    pub fn of(record: &StoryRecord) -> Self {
        match record.kind.as_deref() {
            Some("video") => MediaKind::Video,
            _ => MediaKind::Image,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            MediaKind::Video => "mp4",
            MediaKind::Image => "jpg",
        }
    }
}

fn opaque_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn non_empty<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<String>::deserialize(d)?.filter(|s| !s.is_empty()))
}

fn loose_kind<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

fn unix_seconds<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    let secs = match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Some(other) => {
            return Err(D::Error::custom(format!("taken_at is not a number: {}", other)))
        }
    };
    Ok(secs.filter(|&s| s != 0))
}
