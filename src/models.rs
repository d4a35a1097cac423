use chrono::NaiveDateTime;
use serde::Serialize;

/// One sondagem result: a student placed at a hypothesis at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssessmentEvent {
    pub student_id: i64,
    pub student_name: String,
    pub hypothesis: String,
    pub occurred_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEvent {
    pub event: AssessmentEvent,
    /// 1-based position of the event in the student's history.
    pub rank: u32,
    pub ordinal: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentProgress {
    pub student_id: i64,
    pub student_name: String,
    pub min_ordinal: u8,
    pub max_ordinal: u8,
    pub event_count: usize,
}

impl StudentProgress {
    pub fn improved(&self) -> bool {
        self.min_ordinal < self.max_ordinal
    }
}

/// Platform-wide totals, computed without any filtering.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HeadlineMetrics {
    pub logins: i64,
    pub onboardings: i64,
    pub active_students: i64,
    pub diagnostics: i64,
    pub classes: i64,
    pub classes_with_multiple_assessments: i64,
    pub students_with_evolution: i64,
    pub teachers_with_multiple_classes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub label: String,
    pub value: String,
}

impl Metric {
    pub fn new(label: &str, value: impl ToString) -> Self {
        Self {
            label: label.to_string(),
            value: value.to_string(),
        }
    }
}

/// A labelled two-column series, the tabular form of one dashboard chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub title: String,
    pub key_label: String,
    pub value_label: String,
    pub points: Vec<(String, String)>,
}
