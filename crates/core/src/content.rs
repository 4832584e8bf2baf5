//! The day's payload delivered to every recipient.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub body: String,
    pub attribution: String,
    pub date: NaiveDate,
}

impl Content {
    /// Leading characters of the body, for log lines.
    pub fn preview(&self, max_chars: usize) -> String {
        let mut preview: String = self.body.chars().take(max_chars).collect();
        if self.body.chars().count() > max_chars {
            preview.push_str("...");
        }
        preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_on_char_boundaries() {
        let content = Content {
            body: "Ça va très bien".to_string(),
            attribution: "Anon".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 3, 4).unwrap(),
        };
        assert_eq!(content.preview(4), "Ça v...");
        assert_eq!(content.preview(100), "Ça va très bien");
    }
}
