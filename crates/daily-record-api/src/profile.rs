use daily_record_core::{DailyRecord, Region};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubjectProfile {
    #[serde(default)]
    pub requester_id: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    /// Compound (cusp) label; preferred over `subject` when present.
    #[serde(default)]
    pub compound_subject: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

impl SubjectProfile {
    #[must_use]
    pub fn preferred_subject(&self) -> Option<&str> {
        fn non_blank(value: &Option<String>) -> Option<&str> {
            value.as_deref().map(str::trim).filter(|value| !value.is_empty())
        }

        non_blank(&self.compound_subject).or_else(|| non_blank(&self.subject))
    }
}

/// Display projection of a resolved record. Empty optional sections become `None`.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyView {
    pub title: String,
    pub region: Region,
    pub date: String,
    pub body: String,
    pub affirmation: Option<String>,
    pub deeper_insight: Option<String>,
    pub source: String,
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

impl From<DailyRecord> for DailyView {
    fn from(record: DailyRecord) -> Self {
        Self {
            title: record.subject,
            region: record.region,
            date: record.day,
            body: record.primary_text,
            affirmation: non_empty(record.affirmation),
            deeper_insight: non_empty(record.deeper_insight),
            source: record.source_tag,
        }
    }
}
