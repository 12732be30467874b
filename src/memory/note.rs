//! Memory notes: short, dated, keyword-tagged statements about the traveller.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum number of keywords kept on a note
pub const MAX_KEYWORDS: usize = 3;

/// A single memory note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryNote {
    pub text: String,
    /// `YYYY-MM-DD`, UTC
    pub last_update_date: String,
    pub keywords: Vec<String>,
}

impl MemoryNote {
    /// Build a note dated today from raw model input.
    ///
    /// Returns `None` when the text is blank after trimming.
    pub fn capture<'a>(text: &str, keywords: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            text: text.to_string(),
            last_update_date: today_utc(),
            keywords: normalize_keywords(keywords),
        })
    }

    pub fn dated(text: impl Into<String>, date: impl Into<String>, keywords: &[&str]) -> Self {
        Self {
            text: text.into(),
            last_update_date: date.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Read a note from loosely-shaped JSON, defaulting missing fields.
    ///
    /// Non-object values and notes without text yield `None`.
    pub fn from_value_lenient(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let text = obj.get("text").and_then(Value::as_str).unwrap_or("").trim();
        if text.is_empty() {
            return None;
        }
        let last_update_date = obj
            .get("last_update_date")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let keywords = obj
            .get("keywords")
            .and_then(Value::as_array)
            .map(|ks| {
                ks.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Some(Self {
            text: text.to_string(),
            last_update_date,
            keywords,
        })
    }
}

/// Strip, lowercase and drop blank keywords, keeping the first three.
///
/// Duplicates are preserved.
pub fn normalize_keywords<'a>(keywords: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    keywords
        .into_iter()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_lowercase)
        .take(MAX_KEYWORDS)
        .collect()
}

/// Today's date in UTC as `YYYY-MM-DD`
pub fn today_utc() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// An ordered list of notes (one per memory tier)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteCollection {
    #[serde(default)]
    pub notes: Vec<MemoryNote>,
}

impl NoteCollection {
    pub fn new(notes: Vec<MemoryNote>) -> Self {
        Self { notes }
    }

    pub fn push(&mut self, note: MemoryNote) {
        self.notes.push(note);
    }

    /// Remove the note at `index`, if present
    pub fn remove(&mut self, index: usize) -> Option<MemoryNote> {
        if index < self.notes.len() {
            Some(self.notes.remove(index))
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.notes.clear();
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn as_slice(&self) -> &[MemoryNote] {
        &self.notes
    }

    /// Read `{ "notes": [...] }` leniently; anything malformed becomes empty.
    pub fn from_value_lenient(value: Option<&Value>) -> Self {
        let notes = value
            .and_then(|v| v.get("notes"))
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(MemoryNote::from_value_lenient).collect())
            .unwrap_or_default();
        Self { notes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keyword_normalization_keeps_duplicates() {
        let note = MemoryNote::capture(
            "  Prefers window seats ",
            ["Seat", "  ", "SEAT", "extra", "more"],
        )
        .unwrap();
        assert_eq!(note.text, "Prefers window seats");
        assert_eq!(note.keywords, vec!["seat", "seat", "extra"]);
    }

    #[test]
    fn test_capture_rejects_blank_text() {
        assert!(MemoryNote::capture("   ", ["seat"]).is_none());
    }

    #[test]
    fn test_today_is_date_only() {
        let today = today_utc();
        assert_eq!(today.len(), 10);
        assert!(chrono::NaiveDate::parse_from_str(&today, "%Y-%m-%d").is_ok());
    }

    #[test]
    fn test_lenient_collection() {
        let value = json!({
            "notes": [
                {"text": "Likes aisle seats", "last_update_date": "2024-06-25"},
                "not a note",
                {"last_update_date": "2024-01-01"},
                {"text": "Vegetarian", "keywords": ["meal", 3, "diet"]}
            ]
        });
        let collection = NoteCollection::from_value_lenient(Some(&value));
        assert_eq!(collection.len(), 2);
        assert!(collection.notes[0].keywords.is_empty());
        assert_eq!(collection.notes[1].keywords, vec!["meal", "diet"]);
        assert_eq!(collection.notes[1].last_update_date, "");

        assert!(NoteCollection::from_value_lenient(Some(&json!({"notes": 5}))).is_empty());
        assert!(NoteCollection::from_value_lenient(None).is_empty());
    }

    #[test]
    fn test_remove_out_of_range() {
        let mut collection = NoteCollection::new(vec![MemoryNote::dated("a", "2024-01-01", &[])]);
        assert!(collection.remove(3).is_none());
        assert_eq!(collection.remove(0).unwrap().text, "a");
        assert!(collection.is_empty());
    }
}
