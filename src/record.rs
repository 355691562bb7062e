use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

pub const TIMESTAMP_FORMAT: &str = "%d-%b-%Y %H:%M";

/// One row of the record store. Records never change after loading.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub name: String,
    pub category: String,
    pub subcategory: String,
    pub price: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A borrowed view on a single field of a [`Record`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Number(f64),
    Timestamp(DateTime<Utc>),
}

impl FieldValue<'_> {
    pub fn display(&self) -> String {
        match self {
            FieldValue::Text(s) => s.to_string(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Timestamp(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

impl Record {
    /// Field lookup by column id. Unknown ids yield `None`.
    pub fn value(&self, column_id: &str) -> Option<FieldValue<'_>> {
        match column_id {
            "id" => Some(FieldValue::Text(&self.id)),
            "name" => Some(FieldValue::Text(&self.name)),
            "category" => Some(FieldValue::Text(&self.category)),
            "subcategory" => Some(FieldValue::Text(&self.subcategory)),
            "price" => Some(FieldValue::Number(self.price)),
            "createdAt" => Some(FieldValue::Timestamp(self.created_at)),
            "updatedAt" => Some(FieldValue::Timestamp(self.updated_at)),
            _ => None,
        }
    }

    pub fn display(&self, column_id: &str) -> Option<String> {
        self.value(column_id).map(|v| v.display())
    }

    /// Tab separated rendering of all fields, used when copying a row.
    pub fn as_tsv(&self) -> String {
        [
            self.id.clone(),
            self.name.clone(),
            self.category.clone(),
            self.subcategory.clone(),
            self.price.to_string(),
            self.created_at.to_rfc3339(),
            self.updated_at.to_rfc3339(),
        ]
        .join("\t")
    }
}

/// Parses the timestamp layouts found in exported data. Values without an
/// offset are taken as UTC, bare dates as midnight.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    for layout in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, layout) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
