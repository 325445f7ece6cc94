use {
    crate::utils::parse_timestamp_ms,
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

/// A flat backend row (fund or execution) kept as loose JSON.
///
/// All accessors are lenient: missing keys, nulls and odd types read as `None`/`false`
/// rather than failing. Each accessor takes a list of key spellings and uses the first
/// one that carries a non-null value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Map<String, Value>);

pub type RawFundRecord = RawRecord;
pub type RawExecutionRecord = RawRecord;

impl RawRecord {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// `Null` means "no record". Any other non-object value degrades to an empty record.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Object(map) => Some(Self(map)),
            other => {
                log::warn!("Raw record is not an object ({}), using empty record", other);
                Some(Self::new())
            }
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn get_any(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter()
            .filter_map(|k| self.0.get(*k))
            .find(|v| !v.is_null())
    }

    /// Trimmed non-empty text. Numbers and booleans are rendered as text.
    pub fn text(&self, keys: &[&str]) -> Option<String> {
        let s = match self.get_any(keys)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => number_to_text(n),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        (!s.is_empty()).then_some(s)
    }

    pub fn integer(&self, keys: &[&str]) -> Option<i64> {
        match self.get_any(keys)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
            Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
            _ => None,
        }
    }

    /// Truthy reading of SQL-ish flag columns (`true`, `1`, `"S"`, `"true"`, ...).
    pub fn flag(&self, keys: &[&str]) -> bool {
        match self.get_any(keys) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(Value::String(s)) => matches!(
                s.trim().to_uppercase().as_str(),
                "1" | "TRUE" | "S" | "SI" | "Y" | "YES"
            ),
            _ => false,
        }
    }

    pub fn timestamp_ms(&self, keys: &[&str]) -> Option<i64> {
        self.get_any(keys).and_then(parse_timestamp_ms)
    }

    /// Shallow merge: every key of `partial` overwrites, everything else is preserved.
    pub fn merge(&mut self, partial: &RawRecord) {
        for (k, v) in &partial.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// Shallow merge restricted to `allowed` keys. Returns how many keys were applied.
    pub fn merge_keys(&mut self, partial: &RawRecord, allowed: &[&str]) -> usize {
        let mut applied = 0;
        for key in allowed {
            if let Some(v) = partial.0.get(*key) {
                self.0.insert(key.to_string(), v.clone());
                applied += 1;
            }
        }
        applied
    }
}

impl From<Map<String, Value>> for RawRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn number_to_text(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        _ => n.to_string(),
    }
}
