use std::collections::BTreeMap;

use log::warn;
use serde::Serialize;

use crate::models::{AssessmentEvent, RankedEvent, StudentProgress};

/// Literacy stages in developmental order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Hypothesis {
    NotApplicable,
    PreSyllabic,
    SyllabicWithoutValue,
    SyllabicWithValue,
    SyllabicAlphabetic,
    Alphabetic,
}

impl Hypothesis {
    pub const ALL: [Hypothesis; 6] = [
        Hypothesis::NotApplicable,
        Hypothesis::PreSyllabic,
        Hypothesis::SyllabicWithoutValue,
        Hypothesis::SyllabicWithValue,
        Hypothesis::SyllabicAlphabetic,
        Hypothesis::Alphabetic,
    ];

    /// Label as stored in `diagnostic_assessment_type_hypothesis.name`.
    pub fn label(self) -> &'static str {
        match self {
            Hypothesis::NotApplicable => "Não se aplica",
            Hypothesis::PreSyllabic => "Pré-silábica",
            Hypothesis::SyllabicWithoutValue => "Silábica s/ valor",
            Hypothesis::SyllabicWithValue => "Silábica c/ valor",
            Hypothesis::SyllabicAlphabetic => "Silábico-alfabética",
            Hypothesis::Alphabetic => "Alfabética",
        }
    }

    pub fn ordinal(self) -> u8 {
        match self {
            Hypothesis::NotApplicable => 1,
            Hypothesis::PreSyllabic => 2,
            Hypothesis::SyllabicWithoutValue => 3,
            Hypothesis::SyllabicWithValue => 4,
            Hypothesis::SyllabicAlphabetic => 5,
            Hypothesis::Alphabetic => 6,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL.into_iter().find(|stage| stage.label() == label)
    }
}

/// Assigns each student's events a 1-based rank by ascending timestamp.
/// Events sharing a timestamp keep their input order.
pub fn rank_events(events: &[AssessmentEvent]) -> Vec<RankedEvent> {
    let mut order: Vec<usize> = (0..events.len()).collect();
    order.sort_by(|left, right| {
        let (left, right) = (&events[*left], &events[*right]);
        left.student_id
            .cmp(&right.student_id)
            .then(left.occurred_at.cmp(&right.occurred_at))
    });

    let mut ranked = Vec::with_capacity(events.len());
    let mut current: Option<(i64, u32)> = None;
    for index in order {
        let event = &events[index];
        let rank = match current {
            Some((student, rank)) if student == event.student_id => rank + 1,
            _ => 1,
        };
        current = Some((event.student_id, rank));
        ranked.push(RankedEvent {
            event: event.clone(),
            rank,
            ordinal: Hypothesis::from_label(&event.hypothesis).map(Hypothesis::ordinal),
        });
    }
    ranked
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressionSummary {
    pub students: Vec<StudentProgress>,
    /// Labels outside the fixed taxonomy, with how often each was seen.
    pub unknown_labels: BTreeMap<String, usize>,
}

impl ProgressionSummary {
    pub fn improved(&self) -> impl Iterator<Item = &StudentProgress> {
        self.students.iter().filter(|student| student.improved())
    }

    pub fn improved_count(&self) -> usize {
        self.improved().count()
    }
}

/// Reduces every student's events to the lowest and highest stage observed.
/// Events with an unknown label do not take part in the reduction.
pub fn summarize(events: &[AssessmentEvent]) -> ProgressionSummary {
    let mut students: BTreeMap<i64, StudentProgress> = BTreeMap::new();
    let mut unknown_labels: BTreeMap<String, usize> = BTreeMap::new();

    for event in events {
        let Some(stage) = Hypothesis::from_label(&event.hypothesis) else {
            *unknown_labels.entry(event.hypothesis.clone()).or_insert(0) += 1;
            continue;
        };
        let ordinal = stage.ordinal();
        let entry = students
            .entry(event.student_id)
            .or_insert_with(|| StudentProgress {
                student_id: event.student_id,
                student_name: event.student_name.clone(),
                min_ordinal: ordinal,
                max_ordinal: ordinal,
                event_count: 0,
            });
        entry.min_ordinal = entry.min_ordinal.min(ordinal);
        entry.max_ordinal = entry.max_ordinal.max(ordinal);
        entry.event_count += 1;
    }

    for (label, count) in unknown_labels.iter() {
        warn!("ignored {count} assessment events with unknown hypothesis `{label}`");
    }

    ProgressionSummary {
        students: students.into_values().collect(),
        unknown_labels,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunnelStage {
    pub stage: Hypothesis,
    /// Students whose lowest stage is below this one and whose highest stage
    /// is at or above it.
    pub covered: usize,
    /// Improved students whose highest stage is at or above this one.
    pub reached: usize,
}

pub fn funnel(students: &[StudentProgress]) -> Vec<FunnelStage> {
    Hypothesis::ALL
        .into_iter()
        .map(|stage| {
            let ordinal = stage.ordinal();
            FunnelStage {
                stage,
                covered: students
                    .iter()
                    .filter(|student| student.min_ordinal < ordinal && ordinal <= student.max_ordinal)
                    .count(),
                reached: students
                    .iter()
                    .filter(|student| student.improved() && student.max_ordinal >= ordinal)
                    .count(),
            }
        })
        .collect()
}

/// Full ranked history of the students that improved, ordered by student then rank.
pub fn improved_evolution(events: &[AssessmentEvent]) -> Vec<RankedEvent> {
    let summary = summarize(events);
    let improved: Vec<i64> = summary.improved().map(|student| student.student_id).collect();
    rank_events(events)
        .into_iter()
        .filter(|ranked| improved.binary_search(&ranked.event.student_id).is_ok())
        .collect()
}

/// Event count per hypothesis label, most frequent first.
pub fn distribution(events: &[AssessmentEvent]) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for event in events {
        *counts.entry(event.hypothesis.trim().to_string()).or_insert(0) += 1;
    }
    let mut counts: Vec<(String, usize)> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}
