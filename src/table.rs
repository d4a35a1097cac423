use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use anyhow::{bail, ensure};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// A single scalar cell loaded from a query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Text(String),
}

const TEMPORAL_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Parses the textual date forms the platform emits into a naive timestamp.
pub fn parse_temporal(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    for format in TEMPORAL_FORMATS {
        if let Ok(value) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(value);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(value) = NaiveDate::parse_from_str(raw, format) {
            return Some(value.and_time(NaiveTime::MIN));
        }
    }
    // Month-only values such as "2024/03".
    NaiveDate::parse_from_str(&format!("{raw}/01"), "%Y/%m/%d")
        .ok()
        .map(|value| value.and_time(NaiveTime::MIN))
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, Value::Date(_) | Value::DateTime(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            Value::Float(value) if value.fract() == 0.0 => Some(*value as i64),
            Value::Text(value) => value.trim().parse().ok(),
            _ => None,
        }
    }

    /// Timezone-naive timestamp; plain dates sit at midnight.
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(value) => Some(*value),
            Value::Date(value) => Some(value.and_time(NaiveTime::MIN)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Timestamp of a temporal value, or of text in one of the platform's
    /// date formats.
    fn loose_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Text(raw) => parse_temporal(raw),
            other => other.as_timestamp(),
        }
    }

    /// Equality used for membership tests: integers and floats compare by
    /// magnitude, and date-like text compares as the timestamp it parses to.
    /// Agrees with the grouping key, so equal values always share a group.
    pub fn loosely_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (left, right) if left.is_numeric() && right.is_numeric() => {
                left.as_f64() == right.as_f64()
            }
            (left, right) => match (left.loose_timestamp(), right.loose_timestamp()) {
                (Some(left), Some(right)) => left == right,
                (None, None) => matches!((left, right), (Value::Text(a), Value::Text(b)) if a == b),
                _ => false,
            },
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Int(_) | Value::Float(_) => 1,
            Value::Date(_) | Value::DateTime(_) => 2,
            Value::Text(_) => 3,
        }
    }

    /// Total order used for sorting and grouping keys.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match self.type_rank().cmp(&other.type_rank()) {
            Ordering::Equal => {}
            unequal => return unequal,
        }
        match (self, other) {
            (Value::Text(left), Value::Text(right)) => left.cmp(right),
            (left, right) if left.is_numeric() => {
                let left = left.as_f64().unwrap_or(f64::NAN);
                let right = right.as_f64().unwrap_or(f64::NAN);
                left.total_cmp(&right)
            }
            (left, right) if left.is_temporal() => left.as_timestamp().cmp(&right.as_timestamp()),
            _ => Ordering::Equal,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::DateTime(value) => write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S")),
            Value::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            Value::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::DateTime(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Ordered rows sharing one column set. Every operation returns a new table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

/// Counts of `row_key × column_key` pairs, with keys in sorted order.
#[derive(Debug, Clone, PartialEq)]
pub struct Crosstab {
    pub row_keys: Vec<Value>,
    pub column_keys: Vec<Value>,
    pub counts: Vec<Vec<usize>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> anyhow::Result<()> {
        ensure!(
            row.len() == self.columns.len(),
            "row has {} cells but the table has {} columns",
            row.len(),
            self.columns.len()
        );
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    fn require_column(&self, name: &str) -> anyhow::Result<usize> {
        match self.column_index(name) {
            Some(index) => Ok(index),
            None => bail!("column `{name}` not found"),
        }
    }

    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Value> + Clone {
        self.rows.iter().map(move |row| &row[index])
    }

    /// Keeps the rows accepted by `keep`, preserving their order.
    pub fn retain_rows(&self, mut keep: impl FnMut(&[Value]) -> bool) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| keep(row))
                .cloned()
                .collect(),
        }
    }

    /// Replaces one column's cells.
    pub fn with_column_values(&self, index: usize, values: Vec<Value>) -> anyhow::Result<Table> {
        ensure!(
            values.len() == self.rows.len(),
            "replacement column has {} cells for {} rows",
            values.len(),
            self.rows.len()
        );
        let mut table = self.clone();
        for (row, value) in table.rows.iter_mut().zip(values) {
            row[index] = value;
        }
        Ok(table)
    }

    /// Appends a column computed from an existing one.
    pub fn derive_column(
        &self,
        name: &str,
        source: &str,
        derive: impl Fn(&Value) -> Value,
    ) -> anyhow::Result<Table> {
        let index = self.require_column(source)?;
        let mut table = self.clone();
        table.columns.push(name.to_string());
        for row in table.rows.iter_mut() {
            let derived = derive(&row[index]);
            row.push(derived);
        }
        Ok(table)
    }

    /// Distinct values in first-seen order, null included.
    pub fn distinct(&self, name: &str) -> anyhow::Result<Vec<Value>> {
        let index = self.require_column(name)?;
        Ok(distinct_values(self.column_values(index)))
    }

    /// Number of distinct non-null values.
    pub fn distinct_count(&self, name: &str) -> anyhow::Result<usize> {
        Ok(self
            .distinct(name)?
            .iter()
            .filter(|value| !value.is_null())
            .count())
    }

    pub fn sum(&self, name: &str) -> anyhow::Result<f64> {
        let index = self.require_column(name)?;
        Ok(self.column_values(index).filter_map(Value::as_f64).sum())
    }

    /// Row counts per key tuple, sorted by key. Rows with a null key cell are dropped.
    pub fn group_count(&self, keys: &[&str]) -> anyhow::Result<Vec<(Vec<Value>, usize)>> {
        let indexes = keys
            .iter()
            .map(|name| self.require_column(name))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let mut groups: Vec<(Vec<Value>, usize)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for row in self.rows.iter() {
            let key: Vec<Value> = indexes.iter().map(|index| row[*index].clone()).collect();
            if key.iter().any(Value::is_null) {
                continue;
            }
            let position = *positions.entry(group_key(&key)).or_insert_with(|| {
                groups.push((key, 0));
                groups.len() - 1
            });
            groups[position].1 += 1;
        }

        groups.sort_by(|left, right| compare_keys(&left.0, &right.0));
        Ok(groups)
    }

    /// Distinct non-null `value` count per `key`, sorted by key.
    pub fn group_distinct(&self, key: &str, value: &str) -> anyhow::Result<Vec<(Value, usize)>> {
        let key_index = self.require_column(key)?;
        let value_index = self.require_column(value)?;
        let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for row in self.rows.iter() {
            let group = &row[key_index];
            if group.is_null() {
                continue;
            }
            let position = *positions
                .entry(group_key(std::slice::from_ref(group)))
                .or_insert_with(|| {
                    groups.push((group.clone(), Vec::new()));
                    groups.len() - 1
                });
            let cell = &row[value_index];
            let seen = &mut groups[position].1;
            if !cell.is_null() && !seen.iter().any(|value| value.loosely_eq(cell)) {
                seen.push(cell.clone());
            }
        }

        let mut counts: Vec<(Value, usize)> = groups
            .into_iter()
            .map(|(group, values)| (group, values.len()))
            .collect();
        counts.sort_by(|left, right| left.0.total_cmp(&right.0));
        Ok(counts)
    }

    /// Mean of the numeric `value` cells per `key`, sorted by key.
    pub fn group_mean(&self, key: &str, value: &str) -> anyhow::Result<Vec<(Value, f64)>> {
        let key_index = self.require_column(key)?;
        let value_index = self.require_column(value)?;
        let mut groups: Vec<(Value, f64, usize)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for row in self.rows.iter() {
            let group = &row[key_index];
            let Some(number) = row[value_index].as_f64() else {
                continue;
            };
            if group.is_null() {
                continue;
            }
            let position = *positions
                .entry(group_key(std::slice::from_ref(group)))
                .or_insert_with(|| {
                    groups.push((group.clone(), 0.0, 0));
                    groups.len() - 1
                });
            groups[position].1 += number;
            groups[position].2 += 1;
        }

        let mut means: Vec<(Value, f64)> = groups
            .into_iter()
            .map(|(group, total, count)| (group, total / count as f64))
            .collect();
        means.sort_by(|left, right| left.0.total_cmp(&right.0));
        Ok(means)
    }

    /// Spread between the latest and earliest timestamp in `value` per `key`,
    /// sorted by key.
    pub fn group_time_span(&self, key: &str, value: &str) -> anyhow::Result<Vec<(Value, Duration)>> {
        let key_index = self.require_column(key)?;
        let value_index = self.require_column(value)?;
        let mut groups: Vec<(Value, NaiveDateTime, NaiveDateTime)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for row in self.rows.iter() {
            let group = &row[key_index];
            let Some(stamp) = row[value_index].as_timestamp() else {
                continue;
            };
            if group.is_null() {
                continue;
            }
            let position = *positions
                .entry(group_key(std::slice::from_ref(group)))
                .or_insert_with(|| {
                    groups.push((group.clone(), stamp, stamp));
                    groups.len() - 1
                });
            let (_, earliest, latest) = &mut groups[position];
            *earliest = (*earliest).min(stamp);
            *latest = (*latest).max(stamp);
        }

        let mut spans: Vec<(Value, Duration)> = groups
            .into_iter()
            .map(|(group, earliest, latest)| (group, latest - earliest))
            .collect();
        spans.sort_by(|left, right| left.0.total_cmp(&right.0));
        Ok(spans)
    }

    pub fn crosstab(&self, row_key: &str, column_key: &str) -> anyhow::Result<Crosstab> {
        let pairs = self.group_count(&[row_key, column_key])?;
        let mut row_keys: Vec<Value> = Vec::new();
        let mut column_keys: Vec<Value> = Vec::new();

        for (key, _) in pairs.iter() {
            if !row_keys.iter().any(|value| value.loosely_eq(&key[0])) {
                row_keys.push(key[0].clone());
            }
            if !column_keys.iter().any(|value| value.loosely_eq(&key[1])) {
                column_keys.push(key[1].clone());
            }
        }
        row_keys.sort_by(Value::total_cmp);
        column_keys.sort_by(Value::total_cmp);

        let mut counts = vec![vec![0usize; column_keys.len()]; row_keys.len()];
        for (key, count) in pairs {
            let row = row_keys.iter().position(|value| value.loosely_eq(&key[0]));
            let column = column_keys.iter().position(|value| value.loosely_eq(&key[1]));
            if let (Some(row), Some(column)) = (row, column) {
                counts[row][column] = count;
            }
        }

        Ok(Crosstab {
            row_keys,
            column_keys,
            counts,
        })
    }
}

pub fn distinct_values<'a>(values: impl Iterator<Item = &'a Value>) -> Vec<Value> {
    let mut distinct: Vec<Value> = Vec::new();
    let mut seen: HashMap<String, Vec<usize>> = HashMap::new();
    for value in values {
        let bucket = seen.entry(group_key(std::slice::from_ref(value))).or_default();
        if bucket.iter().any(|index| distinct[*index].loosely_eq(value)) {
            continue;
        }
        bucket.push(distinct.len());
        distinct.push(value.clone());
    }
    distinct
}

fn group_key(values: &[Value]) -> String {
    values
        .iter()
        .map(|value| match (value, value.loose_timestamp()) {
            (Value::Null, _) => "\u{0}null".to_string(),
            (Value::Int(_) | Value::Float(_), _) => {
                format!("n:{}", value.as_f64().unwrap_or_default())
            }
            (_, Some(stamp)) => format!("t:{stamp:?}"),
            (_, None) => format!("s:{value}"),
        })
        .collect::<Vec<_>>()
        .join("\u{1f}")
}

fn compare_keys(left: &[Value], right: &[Value]) -> Ordering {
    left.iter()
        .zip(right.iter())
        .map(|(left, right)| left.total_cmp(right))
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}
