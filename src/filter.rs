use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use tracing::{debug, trace};

use crate::columns::ColumnKind;
use crate::domain::RVError;
use crate::record::{FieldValue, Record, parse_timestamp};

/// A filter on a single column. Each kind carries the semantics of one column type.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Case-insensitive substring of the displayed value.
    Text(String),
    /// Displayed value must be one of the set. An empty set does not constrain.
    Set(BTreeSet<String>),
    /// Inclusive numeric range. A missing bound is the observed extreme of the rows being filtered.
    Range { min: Option<f64>, max: Option<f64> },
    /// Inclusive timestamp range, open ended where a bound is missing.
    DateRange {
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
}

/// Active filters keyed by column id. A column without an entry is not constrained.
pub type FilterSpec = BTreeMap<String, FilterValue>;

enum Condition<'a> {
    Contains(String),
    OneOf(&'a BTreeSet<String>),
    Between(f64, f64),
    Within(Option<DateTime<Utc>>, Option<DateTime<Utc>>),
}

impl Condition<'_> {
    fn test(&self, value: FieldValue) -> bool {
        match (self, value) {
            (Condition::Contains(query), v) => v.display().to_lowercase().contains(query.as_str()),
            (Condition::OneOf(allowed), v) => allowed.contains(&v.display()),
            (Condition::Between(min, max), FieldValue::Number(n)) => *min <= n && n <= *max,
            (Condition::Within(start, end), FieldValue::Timestamp(ts)) => {
                start.is_none_or(|s| s <= ts) && end.is_none_or(|e| ts <= e)
            }
            // Resolution never pairs a range with a field of another type.
            _ => true,
        }
    }
}

/// Keeps the rows passing every filter in `spec`, in their input order.
pub fn apply(records: &[Record], rows: &[usize], spec: &FilterSpec) -> Vec<usize> {
    let Some(&probe) = rows.first() else {
        return Vec::new();
    };

    let mut conditions: Vec<(&str, Condition)> = Vec::with_capacity(spec.len());
    for (column, filter) in spec.iter() {
        let Some(sample) = records[probe].value(column) else {
            debug!("Ignoring filter on unknown column \"{column}\"");
            continue;
        };
        if let Some(condition) = resolve(records, rows, column, filter, sample) {
            conditions.push((column.as_str(), condition));
        }
    }

    if conditions.is_empty() {
        return rows.to_vec();
    }

    let filtered: Vec<usize> = rows
        .iter()
        .copied()
        .filter(|&ridx| {
            let record = &records[ridx];
            conditions.iter().all(|(column, condition)| {
                record.value(column).is_none_or(|v| condition.test(v))
            })
        })
        .collect();
    trace!(
        "Filtering {} columns kept {}/{} rows",
        conditions.len(),
        filtered.len(),
        rows.len()
    );
    filtered
}

// Turns a filter into a row test, or None when it does not constrain anything.
fn resolve<'a>(
    records: &[Record],
    rows: &[usize],
    column: &str,
    filter: &'a FilterValue,
    sample: FieldValue,
) -> Option<Condition<'a>> {
    match (filter, sample) {
        (FilterValue::Text(query), _) => {
            let query = query.trim().to_lowercase();
            (!query.is_empty()).then_some(Condition::Contains(query))
        }
        (FilterValue::Set(allowed), _) => {
            (!allowed.is_empty()).then_some(Condition::OneOf(allowed))
        }
        (FilterValue::Range { min, max }, FieldValue::Number(_)) => {
            let (observed_min, observed_max) =
                numeric_bounds(records, rows, column).unwrap_or((f64::NAN, f64::NAN));
            Some(Condition::Between(
                min.unwrap_or(observed_min),
                max.unwrap_or(observed_max),
            ))
        }
        (FilterValue::DateRange { start, end }, FieldValue::Timestamp(_)) => {
            (start.is_some() || end.is_some()).then_some(Condition::Within(*start, *end))
        }
        (filter, _) => {
            debug!("Ignoring filter {filter:?} on column \"{column}\" of another type");
            None
        }
    }
}

/// Smallest and largest numeric value of `column` over `rows`.
pub fn numeric_bounds(records: &[Record], rows: &[usize], column: &str) -> Option<(f64, f64)> {
    rows.iter()
        .filter_map(|&ridx| match records[ridx].value(column) {
            Some(FieldValue::Number(n)) if !n.is_nan() => Some(n),
            _ => None,
        })
        .fold(None, |acc, n| match acc {
            None => Some((n, n)),
            Some((lo, hi)) => Some((lo.min(n), hi.max(n))),
        })
}

/// Earliest and latest timestamp of `column` over `rows`.
pub fn timestamp_bounds(
    records: &[Record],
    rows: &[usize],
    column: &str,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    rows.iter()
        .filter_map(|&ridx| match records[ridx].value(column) {
            Some(FieldValue::Timestamp(ts)) => Some(ts),
            _ => None,
        })
        .fold(None, |acc, ts| match acc {
            None => Some((ts, ts)),
            Some((lo, hi)) => Some((lo.min(ts), hi.max(ts))),
        })
}

/// Displayed values of `column` over `rows`, without repeats, in order of first appearance.
pub fn distinct_values(records: &[Record], rows: &[usize], column: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|&ridx| records[ridx].display(column))
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

/// Reads a filter typed into the filter prompt. An empty line means "no filter".
///
/// Text columns take the line as substring, categorical columns a comma separated
/// list, numeric and date columns a `from..to` range where either side may be
/// left out. A single number or date stands for itself (a date for the whole day).
pub fn parse_filter(kind: ColumnKind, input: &str) -> Result<Option<FilterValue>, RVError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    let value = match kind {
        ColumnKind::Text => FilterValue::Text(input.to_string()),
        ColumnKind::Categorical => FilterValue::Set(split_values(input)?.into_iter().collect()),
        ColumnKind::NumericRange => {
            let (min, max) = match input.split_once("..") {
                Some((lo, hi)) => (number_bound(lo)?, number_bound(hi)?),
                None => (number_bound(input)?, number_bound(input)?),
            };
            FilterValue::Range { min, max }
        }
        ColumnKind::DateRange => {
            let (start, end) = match input.split_once("..") {
                Some((lo, hi)) => (date_bound(lo, false)?, date_bound(hi, true)?),
                None => (date_bound(input, false)?, date_bound(input, true)?),
            };
            FilterValue::DateRange { start, end }
        }
    };
    Ok(Some(value))
}

// Values holding a comma are written in double quotes, a quote inside them doubled.
fn split_values(input: &str) -> Result<Vec<String>, RVError> {
    let mut values = Vec::new();
    let mut current = String::new();
    // `verbatim` marks a value that was quoted, `quoted` that the quote is still open.
    let (mut verbatim, mut quoted) = (false, false);
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            }
            '"' if quoted => quoted = false,
            '"' if !verbatim && current.trim().is_empty() => {
                current.clear();
                verbatim = true;
                quoted = true;
            }
            ',' if !quoted => {
                push_value(&mut values, std::mem::take(&mut current), verbatim);
                verbatim = false;
            }
            c if verbatim && !quoted && c.is_whitespace() => {}
            c => current.push(c),
        }
    }
    if quoted {
        return Err(RVError::InvalidFilter("missing closing quote".to_string()));
    }
    push_value(&mut values, current, verbatim);
    Ok(values)
}

fn push_value(values: &mut Vec<String>, value: String, verbatim: bool) {
    if verbatim {
        values.push(value);
    } else if !value.trim().is_empty() {
        values.push(value.trim().to_string());
    }
}

fn number_bound(s: &str) -> Result<Option<f64>, RVError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    match s.parse::<f64>() {
        Ok(n) if !n.is_nan() => Ok(Some(n)),
        _ => Err(RVError::InvalidFilter(format!("\"{s}\" is not a number"))),
    }
}

fn date_bound(s: &str, end_of_day: bool) -> Result<Option<DateTime<Utc>>, RVError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    if let Ok(day) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let time = if end_of_day {
            NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999)
        } else {
            NaiveTime::from_hms_opt(0, 0, 0)
        };
        return Ok(time.map(|t| day.and_time(t).and_utc()));
    }
    parse_timestamp(s)
        .map(Some)
        .ok_or_else(|| RVError::InvalidFilter(format!("\"{s}\" is not a date")))
}

/// The prompt text [`parse_filter`] reads back into `value`.
pub fn describe(value: &FilterValue) -> String {
    fn bound<T: ToString>(v: &Option<T>) -> String {
        v.as_ref().map(T::to_string).unwrap_or_default()
    }
    fn day(ts: &Option<DateTime<Utc>>, end_of_day: bool) -> String {
        let Some(ts) = ts else {
            return String::new();
        };
        let time = (ts.hour(), ts.minute(), ts.second(), ts.nanosecond());
        let whole_day = if end_of_day {
            time == (23, 59, 59, 999_999_999)
        } else {
            time == (0, 0, 0, 0)
        };
        if whole_day {
            ts.format("%Y-%m-%d").to_string()
        } else {
            ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
        }
    }
    fn quote(v: &str) -> String {
        if v.is_empty() || v.contains([',', '"']) || v.trim() != v {
            format!("\"{}\"", v.replace('"', "\"\""))
        } else {
            v.to_string()
        }
    }

    match value {
        FilterValue::Text(query) => query.clone(),
        FilterValue::Set(values) => values.iter().map(|v| quote(v)).collect::<Vec<_>>().join(", "),
        FilterValue::Range { min, max } => format!("{}..{}", bound(min), bound(max)),
        FilterValue::DateRange { start, end } => {
            format!("{}..{}", day(start, false), day(end, true))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::{record, ts};

    fn store() -> Vec<Record> {
        let mut records = vec![
            record("1", "Desk Lamp", "Home", "Lighting", 25.0),
            record("2", "Office Chair", "Furniture", "Seating", 150.0),
            record("3", "Lamp Shade", "Home", "Lighting", 12.0),
            record("4", "Standing Desk", "Furniture", "Desks", 420.0),
        ];
        records[0].created_at = ts("2024-01-10T10:00:00Z");
        records[1].created_at = ts("2024-02-10T10:00:00Z");
        records[2].created_at = ts("2024-03-10T10:00:00Z");
        records[3].created_at = ts("2024-04-10T10:00:00Z");
        records
    }

    fn all(records: &[Record]) -> Vec<usize> {
        (0..records.len()).collect()
    }

    fn spec(entries: Vec<(&str, FilterValue)>) -> FilterSpec {
        entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    fn set(values: &[&str]) -> FilterValue {
        FilterValue::Set(values.iter().map(|v| v.to_string()).collect())
    }

    #[test]
    fn empty_spec_keeps_everything() {
        let records = store();
        assert_eq!(apply(&records, &[3, 1, 0], &FilterSpec::new()), vec![3, 1, 0]);
    }

    #[test]
    fn empty_rows_stay_empty() {
        let records = store();
        let spec = spec(vec![("price", FilterValue::Range { min: None, max: None })]);
        assert!(apply(&records, &[], &spec).is_empty());
    }

    #[test]
    fn text_filter_is_case_insensitive_substring() {
        let records = store();
        let spec = spec(vec![("name", FilterValue::Text("LAMP".to_string()))]);
        assert_eq!(apply(&records, &all(&records), &spec), vec![0, 2]);

        let blank = self::spec(vec![("name", FilterValue::Text("  ".to_string()))]);
        assert_eq!(apply(&records, &all(&records), &blank), vec![0, 1, 2, 3]);
    }

    #[test]
    fn empty_set_does_not_constrain() {
        let records = store();
        let spec = spec(vec![("category", set(&[]))]);
        assert_eq!(apply(&records, &all(&records), &spec), vec![0, 1, 2, 3]);
    }

    #[test]
    fn set_filter_is_membership() {
        let records = store();
        let spec = spec(vec![("subcategory", set(&["Seating", "Desks"]))]);
        assert_eq!(apply(&records, &all(&records), &spec), vec![1, 3]);
    }

    #[test]
    fn range_is_inclusive() {
        let records = store();
        let spec = spec(vec![(
            "price",
            FilterValue::Range {
                min: Some(25.0),
                max: Some(150.0),
            },
        )]);
        assert_eq!(apply(&records, &all(&records), &spec), vec![0, 1]);
    }

    #[test]
    fn inverted_range_passes_nothing() {
        let records = store();
        let spec = spec(vec![(
            "price",
            FilterValue::Range {
                min: Some(10.0),
                max: Some(5.0),
            },
        )]);
        assert!(apply(&records, &all(&records), &spec).is_empty());
    }

    #[test]
    fn open_range_bounds_follow_the_input_rows() {
        let records = store();
        let spec = spec(vec![(
            "price",
            FilterValue::Range {
                min: Some(20.0),
                max: None,
            },
        )]);
        assert_eq!(apply(&records, &all(&records), &spec), vec![0, 1, 3]);

        let unbounded = self::spec(vec![("price", FilterValue::Range { min: None, max: None })]);
        assert_eq!(apply(&records, &[2, 0], &unbounded), vec![2, 0]);
    }

    #[test]
    fn date_range() {
        let records = store();
        let start_only = spec(vec![(
            "createdAt",
            FilterValue::DateRange {
                start: Some(ts("2024-02-10T10:00:00Z")),
                end: None,
            },
        )]);
        assert_eq!(apply(&records, &all(&records), &start_only), vec![1, 2, 3]);

        let bounded = spec(vec![(
            "createdAt",
            FilterValue::DateRange {
                start: Some(ts("2024-02-01")),
                end: Some(ts("2024-03-31")),
            },
        )]);
        assert_eq!(apply(&records, &all(&records), &bounded), vec![1, 2]);

        let open = spec(vec![("createdAt", FilterValue::DateRange { start: None, end: None })]);
        assert_eq!(apply(&records, &all(&records), &open), vec![0, 1, 2, 3]);

        let inverted = spec(vec![(
            "createdAt",
            FilterValue::DateRange {
                start: Some(ts("2024-03-31")),
                end: Some(ts("2024-02-01")),
            },
        )]);
        assert!(apply(&records, &all(&records), &inverted).is_empty());
    }

    #[test]
    fn filters_combine_with_and() {
        let records = store();
        let spec = spec(vec![
            ("category", set(&["Home"])),
            (
                "price",
                FilterValue::Range {
                    min: Some(20.0),
                    max: None,
                },
            ),
        ]);
        assert_eq!(apply(&records, &all(&records), &spec), vec![0]);
    }

    #[test]
    fn unknown_columns_and_mismatched_kinds_are_ignored() {
        let records = store();
        let spec = spec(vec![
            ("colour", set(&["red"])),
            (
                "name",
                FilterValue::Range {
                    min: Some(1.0),
                    max: Some(2.0),
                },
            ),
        ]);
        assert_eq!(apply(&records, &all(&records), &spec), vec![0, 1, 2, 3]);
    }

    #[test]
    fn preserves_input_order() {
        let records = store();
        let spec = spec(vec![("category", set(&["Home"]))]);
        assert_eq!(apply(&records, &[2, 1, 0], &spec), vec![2, 0]);
    }

    #[test]
    fn bounds_and_distinct_values() {
        let records = store();
        assert_eq!(numeric_bounds(&records, &[0, 1, 2], "price"), Some((12.0, 150.0)));
        assert_eq!(numeric_bounds(&records, &[], "price"), None);
        assert_eq!(numeric_bounds(&records, &[0], "name"), None);
        assert_eq!(
            timestamp_bounds(&records, &[2, 0, 1], "createdAt"),
            Some((ts("2024-01-10T10:00:00Z"), ts("2024-03-10T10:00:00Z")))
        );
        assert_eq!(
            distinct_values(&records, &[1, 0, 3, 2], "category"),
            vec!["Furniture".to_string(), "Home".to_string()]
        );
    }

    #[test]
    fn nan_bounds_match_nothing() {
        let records = store();
        let spec = spec(vec![(
            "price",
            FilterValue::Range {
                min: Some(f64::NAN),
                max: None,
            },
        )]);
        assert!(apply(&records, &all(&records), &spec).is_empty());
    }

    #[test]
    fn date_only_end_covers_the_whole_day() {
        let mut records = store();
        records[1].created_at = ts("2024-02-01T23:59:59.500Z");
        let value = parse_filter(ColumnKind::DateRange, "2024-01-15..2024-02-01")
            .unwrap()
            .unwrap();
        let spec = spec(vec![("createdAt", value)]);
        assert_eq!(apply(&records, &all(&records), &spec), vec![1]);
    }

    fn parsed(kind: ColumnKind, input: &str) -> Option<FilterValue> {
        parse_filter(kind, input).unwrap()
    }

    #[test]
    fn parses_prompt_input_per_column_kind() {
        assert_eq!(parsed(ColumnKind::Text, "  "), None);
        assert_eq!(
            parsed(ColumnKind::Text, " lamp "),
            Some(FilterValue::Text("lamp".to_string()))
        );
        assert_eq!(
            parsed(ColumnKind::Categorical, "Home, Furniture,,"),
            Some(set(&["Home", "Furniture"]))
        );
        assert_eq!(
            parsed(ColumnKind::NumericRange, "10..250.5"),
            Some(FilterValue::Range {
                min: Some(10.0),
                max: Some(250.5)
            })
        );
        assert_eq!(
            parsed(ColumnKind::NumericRange, "..99"),
            Some(FilterValue::Range {
                min: None,
                max: Some(99.0)
            })
        );
        assert_eq!(
            parsed(ColumnKind::NumericRange, "42"),
            Some(FilterValue::Range {
                min: Some(42.0),
                max: Some(42.0)
            })
        );
        assert_eq!(
            parsed(ColumnKind::DateRange, "2024-02-01.."),
            Some(FilterValue::DateRange {
                start: Some(ts("2024-02-01T00:00:00Z")),
                end: None
            })
        );
        assert_eq!(
            parsed(ColumnKind::DateRange, "2024-02-01"),
            Some(FilterValue::DateRange {
                start: Some(ts("2024-02-01T00:00:00Z")),
                end: Some(ts("2024-02-01T23:59:59.999999999Z"))
            })
        );
    }

    #[test]
    fn rejects_malformed_prompt_input() {
        for (kind, input) in [
            (ColumnKind::NumericRange, "cheap.."),
            (ColumnKind::NumericRange, "NaN"),
            (ColumnKind::DateRange, "soon.."),
            (ColumnKind::Categorical, "\"Tables, Desks"),
        ] {
            assert!(
                matches!(parse_filter(kind, input), Err(RVError::InvalidFilter(_))),
                "{input}"
            );
        }
    }

    #[test]
    fn quoted_values_keep_their_commas() {
        assert_eq!(
            parsed(ColumnKind::Categorical, "\"Tables, Desks\", Home"),
            Some(set(&["Tables, Desks", "Home"]))
        );
        assert_eq!(
            parsed(ColumnKind::Categorical, "\"12\"\" Lamp\""),
            Some(set(&["12\" Lamp"]))
        );
    }

    #[test]
    fn describe_reads_back() {
        let cases = [
            (ColumnKind::Text, "lamp"),
            (ColumnKind::Categorical, "Furniture, Home"),
            (ColumnKind::Categorical, "Home, \"Tables, Desks\""),
            (ColumnKind::NumericRange, "10..250.5"),
            (ColumnKind::NumericRange, "..99"),
            (ColumnKind::DateRange, "2024-02-01..2024-03-01"),
            (ColumnKind::DateRange, "2024-02-01T10:30:00.."),
            (ColumnKind::DateRange, "..2024-02-01T23:59:59"),
        ];
        for (kind, input) in cases {
            let value = parsed(kind, input).unwrap();
            assert_eq!(describe(&value), input);
        }
    }
}
