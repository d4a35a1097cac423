//! Column-type driven table filtering.
//!
//! Each column is classified once, up front, into a [`ColumnKind`] that picks
//! the control describing it. Whether a [`ColumnConstraint`] may be applied
//! depends only on the types of the values the column holds, never on its
//! cardinality.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::table::{distinct_values, parse_temporal, Table, Value};

/// Columns with fewer distinct values than this are offered as a multiselect.
pub const CATEGORICAL_THRESHOLD: usize = 10;

/// Number of slider steps spanning a numeric column.
const SLIDER_STEPS: f64 = 100.0;

pub type Result<T, E = FilterError> = std::result::Result<T, E>;

#[derive(Debug, Error, PartialEq)]
pub enum FilterError {
    #[error("filter names unknown column `{0}`")]
    UnknownColumn(String),
    #[error("column `{column}` is {kind} and cannot take a {constraint} filter")]
    ConstraintMismatch {
        column: String,
        kind: ColumnKind,
        constraint: &'static str,
    },
    #[error("range filter on `{column}` has lower bound {lo} above upper bound {hi}")]
    InvertedRange { column: String, lo: f64, hi: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Categorical,
    Numeric,
    Datetime,
    Text,
}

impl std::fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ColumnKind::Categorical => "categorical",
            ColumnKind::Numeric => "numeric",
            ColumnKind::Datetime => "datetime",
            ColumnKind::Text => "text",
        };
        f.write_str(label)
    }
}

/// A per-column constraint as it would come out of the matching control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnConstraint {
    Values(Vec<Value>),
    Range {
        lo: f64,
        hi: f64,
    },
    Dates {
        #[serde(default)]
        start: Option<NaiveDate>,
        #[serde(default)]
        end: Option<NaiveDate>,
    },
    Contains(String),
}

impl ColumnConstraint {
    fn name(&self) -> &'static str {
        match self {
            ColumnConstraint::Values(_) => "values",
            ColumnConstraint::Range { .. } => "range",
            ColumnConstraint::Dates { .. } => "dates",
            ColumnConstraint::Contains(_) => "contains",
        }
    }

    /// Range and date constraints need every non-null cell to be a number or
    /// a timestamp. Value sets and text searches fit any column.
    fn accepts<'a>(&self, mut values: impl Iterator<Item = &'a Value>) -> bool {
        match self {
            ColumnConstraint::Range { .. } => {
                values.all(|value| value.is_null() || value.is_numeric())
            }
            ColumnConstraint::Dates { .. } => {
                values.all(|value| value.is_null() || value.is_temporal())
            }
            ColumnConstraint::Values(_) | ColumnConstraint::Contains(_) => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnFilter {
    pub column: String,
    #[serde(flatten)]
    pub constraint: ColumnConstraint,
}

/// The whole filter state for one table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub columns: Vec<ColumnFilter>,
}

impl FilterConfig {
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Every column at its default control state: all values selected, the
    /// full numeric or date span, and an empty text search.
    pub fn identity(table: &Table) -> Self {
        let columns = describe_controls(table)
            .into_iter()
            .map(|control| ColumnFilter {
                constraint: control.default_constraint(),
                column: control.column,
            })
            .collect();
        Self {
            enabled: true,
            columns,
        }
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn with(mut self, column: &str, constraint: ColumnConstraint) -> Self {
        self.enabled = true;
        self.columns.push(ColumnFilter {
            column: column.to_string(),
            constraint,
        });
        self
    }
}

/// Classifies every non-null value of a column.
pub fn classify<'a>(values: impl Iterator<Item = &'a Value> + Clone) -> ColumnKind {
    let distinct = distinct_values(values.clone().filter(|value| !value.is_null()));
    if distinct.len() < CATEGORICAL_THRESHOLD {
        return ColumnKind::Categorical;
    }
    value_kind(values)
}

/// The kind a column's non-null values share, ignoring cardinality.
fn value_kind<'a>(values: impl Iterator<Item = &'a Value> + Clone) -> ColumnKind {
    let mut present = values.filter(|value| !value.is_null());
    if present.clone().all(Value::is_numeric) {
        ColumnKind::Numeric
    } else if present.all(Value::is_temporal) {
        ColumnKind::Datetime
    } else {
        ColumnKind::Text
    }
}

pub fn classify_columns(table: &Table) -> Vec<ColumnKind> {
    (0..table.columns().len())
        .map(|index| classify(table.column_values(index)))
        .collect()
}

/// The control the filter builder shows for one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnControl {
    pub column: String,
    pub kind: ColumnKind,
    pub widget: Widget,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Widget {
    MultiSelect { options: Vec<Value> },
    Slider { min: f64, max: f64, step: f64 },
    DateRange { start: Option<NaiveDate>, end: Option<NaiveDate> },
    TextSearch,
}

impl ColumnControl {
    pub fn default_constraint(&self) -> ColumnConstraint {
        match &self.widget {
            Widget::MultiSelect { options } => ColumnConstraint::Values(options.clone()),
            Widget::Slider { min, max, .. } => ColumnConstraint::Range { lo: *min, hi: *max },
            Widget::DateRange { start, end } => ColumnConstraint::Dates {
                start: *start,
                end: *end,
            },
            Widget::TextSearch => ColumnConstraint::Contains(String::new()),
        }
    }
}

pub fn describe_controls(table: &Table) -> Vec<ColumnControl> {
    table
        .columns()
        .iter()
        .zip(classify_columns(table))
        .enumerate()
        .map(|(index, (column, kind))| {
            let values = table.column_values(index);
            let widget = match kind {
                ColumnKind::Categorical => Widget::MultiSelect {
                    options: distinct_values(values),
                },
                ColumnKind::Numeric => {
                    let numbers: Vec<f64> = values.filter_map(Value::as_f64).collect();
                    let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
                    let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    Widget::Slider {
                        min,
                        max,
                        step: (max - min) / SLIDER_STEPS,
                    }
                }
                ColumnKind::Datetime => {
                    let stamps: Vec<NaiveDateTime> =
                        values.filter_map(Value::as_timestamp).collect();
                    Widget::DateRange {
                        start: stamps.iter().min().map(NaiveDateTime::date),
                        end: stamps.iter().max().map(NaiveDateTime::date),
                    }
                }
                ColumnKind::Text => Widget::TextSearch,
            };
            ColumnControl {
                column: column.clone(),
                kind,
                widget,
            }
        })
        .collect()
}

/// Normalizes a freshly loaded table before classification: slash-formatted
/// date text becomes datetimes and integral floats become integers.
pub fn prepare(table: &Table) -> Table {
    let mut prepared = table.clone();
    for (index, column) in table.columns().iter().enumerate() {
        let values: Vec<&Value> = table.column_values(index).collect();
        let present: Vec<&&Value> = values.iter().filter(|value| !value.is_null()).collect();
        if present.is_empty() {
            continue;
        }

        let converted: Option<Vec<Value>> = if present
            .iter()
            .all(|value| value.as_str().is_some_and(looks_like_slash_date))
        {
            values
                .iter()
                .map(|value| match value {
                    Value::Text(raw) => parse_temporal(raw).map(Value::DateTime),
                    other => Some((*other).clone()),
                })
                .collect()
        } else if present
            .iter()
            .all(|value| matches!(value, Value::Float(number) if number.fract() == 0.0) || matches!(value, Value::Int(_)))
            && present.iter().any(|value| matches!(value, Value::Float(_)))
        {
            Some(
                values
                    .iter()
                    .map(|value| match value {
                        Value::Float(number) => Value::Int(*number as i64),
                        other => (*other).clone(),
                    })
                    .collect(),
            )
        } else {
            None
        };

        if let Some(converted) = converted {
            debug!("normalized column `{column}` while preparing filters");
            if let Ok(next) = prepared.with_column_values(index, converted) {
                prepared = next;
            }
        }
    }
    prepared
}

fn looks_like_slash_date(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.windows(7).any(|window| {
        window[..4].iter().all(u8::is_ascii_digit)
            && window[4] == b'/'
            && window[5..].iter().all(u8::is_ascii_digit)
    })
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Applies `config` to `table`, returning a new table.
pub fn apply_filters(table: &Table, config: &FilterConfig) -> Result<Table> {
    if !config.enabled {
        return Ok(table.clone());
    }

    let mut filtered = table.clone();

    for filter in config.columns.iter() {
        let index = table
            .column_index(&filter.column)
            .ok_or_else(|| FilterError::UnknownColumn(filter.column.clone()))?;
        if !filter.constraint.accepts(table.column_values(index)) {
            return Err(FilterError::ConstraintMismatch {
                column: filter.column.clone(),
                kind: value_kind(table.column_values(index)),
                constraint: filter.constraint.name(),
            });
        }

        filtered = match &filter.constraint {
            ColumnConstraint::Values(selected) => filtered.retain_rows(|row| {
                selected.iter().any(|value| value.loosely_eq(&row[index]))
            }),
            ColumnConstraint::Range { lo, hi } => {
                if lo > hi {
                    return Err(FilterError::InvertedRange {
                        column: filter.column.clone(),
                        lo: *lo,
                        hi: *hi,
                    });
                }
                filtered.retain_rows(|row| match row[index].as_f64() {
                    Some(number) => *lo <= number && number <= *hi,
                    None => row[index].is_null(),
                })
            }
            ColumnConstraint::Dates {
                start: Some(start),
                end: Some(end),
            } => {
                // The end date covers its whole day.
                let (start, end) = (midnight(*start), midnight(*end) + Duration::days(1));
                filtered.retain_rows(|row| match row[index].as_timestamp() {
                    Some(stamp) => start <= stamp && stamp < end,
                    None => row[index].is_null(),
                })
            }
            ColumnConstraint::Dates { .. } => filtered,
            ColumnConstraint::Contains(needle) if needle.is_empty() => filtered,
            ColumnConstraint::Contains(needle) => filtered.retain_rows(|row| {
                !row[index].is_null() && row[index].to_string().contains(needle.as_str())
            }),
        };
        debug!(
            "filter on `{}` left {} of {} rows",
            filter.column,
            filtered.len(),
            table.len()
        );
    }

    Ok(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    /// Twelve classes: enough distinct ids, counts and dates to leave the
    /// categorical threshold, plus a low-cardinality state column.
    fn classes() -> Table {
        let mut table = Table::new([
            "id_turma",
            "estado_escola",
            "total_alunos",
            "data_cadastro_turma",
            "nome_turma",
        ]);
        for id in 1..=12i64 {
            let state = if id % 3 == 0 { "RJ" } else { "SP" };
            table
                .push_row(vec![
                    Value::Int(id),
                    state.into(),
                    Value::Float(10.0 + id as f64 * 1.5),
                    Value::DateTime(date(id as u32).and_hms_opt(9, 30, 0).unwrap()),
                    format!("Turma {id}").into(),
                ])
                .unwrap();
        }
        table
    }

    #[test]
    fn classifies_by_cardinality_then_type() {
        let kinds = classify_columns(&classes());
        assert_eq!(
            kinds,
            vec![
                ColumnKind::Numeric,
                ColumnKind::Categorical,
                ColumnKind::Numeric,
                ColumnKind::Datetime,
                ColumnKind::Text,
            ]
        );
    }

    #[test]
    fn low_cardinality_numbers_are_categorical() {
        let values = [Value::Int(1), Value::Int(2), Value::Null, Value::Int(1)];
        assert_eq!(classify(values.iter()), ColumnKind::Categorical);
    }

    #[test]
    fn disabled_config_is_identity_even_with_bad_columns() {
        let table = classes();
        let config = FilterConfig {
            enabled: false,
            columns: vec![ColumnFilter {
                column: "missing".to_string(),
                constraint: ColumnConstraint::Contains("x".to_string()),
            }],
        };
        assert_eq!(apply_filters(&table, &config).unwrap(), table);
    }

    #[test]
    fn identity_config_preserves_rows_and_order() {
        let mut table = classes();
        table
            .push_row(vec![
                Value::Int(99),
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Null,
            ])
            .unwrap();
        let config = FilterConfig::identity(&table);
        assert_eq!(apply_filters(&table, &config).unwrap(), table);
    }

    #[test]
    fn numeric_range_is_inclusive_and_idempotent() {
        let table = classes();
        let config = FilterConfig::default().with(
            "id_turma",
            ColumnConstraint::Range { lo: 3.0, hi: 6.0 },
        );
        let once = apply_filters(&table, &config).unwrap();
        let ids: Vec<_> = once.column_values(0).cloned().collect();
        assert_eq!(ids, (3..=6).map(Value::Int).collect::<Vec<_>>());

        let twice = apply_filters(&once, &config).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn categorical_full_set_is_noop_and_empty_set_drops_everything() {
        let table = classes();
        let all = table.distinct("estado_escola").unwrap();
        let full = FilterConfig::default().with("estado_escola", ColumnConstraint::Values(all));
        assert_eq!(apply_filters(&table, &full).unwrap(), table);

        let none =
            FilterConfig::default().with("estado_escola", ColumnConstraint::Values(Vec::new()));
        assert!(apply_filters(&table, &none).unwrap().is_empty());
    }

    #[test]
    fn date_range_needs_both_endpoints() {
        let table = classes();
        let open = FilterConfig::default().with(
            "data_cadastro_turma",
            ColumnConstraint::Dates {
                start: Some(date(5)),
                end: None,
            },
        );
        assert_eq!(apply_filters(&table, &open).unwrap().len(), table.len());

        let closed = FilterConfig::default().with(
            "data_cadastro_turma",
            ColumnConstraint::Dates {
                start: Some(date(4)),
                end: Some(date(8)),
            },
        );
        assert_eq!(apply_filters(&table, &closed).unwrap().len(), 5);
    }

    #[test]
    fn text_search_is_case_sensitive_substring() {
        let table = classes();
        let hit = FilterConfig::default().with("nome_turma", ColumnConstraint::Contains("a 1".into()));
        assert_eq!(apply_filters(&table, &hit).unwrap().len(), 4);

        let miss = FilterConfig::default().with("nome_turma", ColumnConstraint::Contains("turma".into()));
        assert!(apply_filters(&table, &miss).unwrap().is_empty());
    }

    #[test]
    fn identity_from_full_table_keeps_any_subset_intact() {
        let table = classes();
        let template = FilterConfig::identity(&table);

        let subset = table.retain_rows(|row| matches!(row[0], Value::Int(3..=6)));
        assert_eq!(
            classify_columns(&subset)[0],
            ColumnKind::Categorical,
            "four ids fall under the multiselect threshold"
        );
        assert_eq!(apply_filters(&subset, &template).unwrap(), subset);

        let empty = table.retain_rows(|_| false);
        assert_eq!(apply_filters(&empty, &template).unwrap(), empty);
    }

    #[test]
    fn value_sets_and_text_search_fit_any_column() {
        let table = classes();
        let search = FilterConfig::default().with("estado_escola", ColumnConstraint::Contains("R".into()));
        assert_eq!(apply_filters(&table, &search).unwrap().len(), 4);

        let picked = FilterConfig::default().with(
            "id_turma",
            ColumnConstraint::Values(vec![Value::Int(2), Value::Float(7.0)]),
        );
        assert_eq!(apply_filters(&table, &picked).unwrap().len(), 2);
    }

    #[test]
    fn mismatched_constraint_is_rejected() {
        let table = classes();
        let range = FilterConfig::default().with("nome_turma", ColumnConstraint::Range { lo: 0.0, hi: 1.0 });
        assert!(matches!(
            apply_filters(&table, &range),
            Err(FilterError::ConstraintMismatch { kind: ColumnKind::Text, constraint: "range", .. })
        ));

        let dates = FilterConfig::default().with(
            "total_alunos",
            ColumnConstraint::Dates {
                start: Some(date(1)),
                end: Some(date(2)),
            },
        );
        assert!(matches!(
            apply_filters(&table, &dates),
            Err(FilterError::ConstraintMismatch { kind: ColumnKind::Numeric, constraint: "dates", .. })
        ));
    }

    #[test]
    fn slider_spans_column_with_hundred_steps() {
        let controls = describe_controls(&classes());
        assert_eq!(
            controls[0].widget,
            Widget::Slider {
                min: 1.0,
                max: 12.0,
                step: 0.11
            }
        );
    }

    #[test]
    fn parses_filter_sets_from_json() {
        let config = FilterConfig::from_json(
            r#"{
                "enabled": true,
                "columns": [
                    {"column": "estado_escola", "values": ["SP", null]},
                    {"column": "total_alunos", "range": {"lo": 10, "hi": 20.5}},
                    {"column": "data_cadastro_turma", "dates": {"start": "2024-03-01"}},
                    {"column": "nome_turma", "contains": "Turma"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.columns.len(), 4);
        assert_eq!(
            config.columns[0].constraint,
            ColumnConstraint::Values(vec!["SP".into(), Value::Null])
        );
        assert_eq!(
            config.columns[2].constraint,
            ColumnConstraint::Dates {
                start: Some(date(1)),
                end: None
            }
        );
    }

    #[test]
    fn prepare_converts_slash_dates_and_integral_floats() {
        let mut table = Table::new(["mes", "ano_turma"]);
        table
            .push_row(vec!["2024/03".into(), Value::Float(2024.0)])
            .unwrap();
        table.push_row(vec![Value::Null, Value::Float(2023.0)]).unwrap();

        let prepared = prepare(&table);
        assert!(prepared.rows()[0][0].is_temporal());
        assert_eq!(prepared.rows()[1][1], Value::Int(2023));
        assert_eq!(table.rows()[0][1], Value::Float(2024.0));
    }
}
