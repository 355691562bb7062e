#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Categorical,
    NumericRange,
    DateRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub id: &'static str,
    pub header: &'static str,
    pub kind: ColumnKind,
    pub visible: bool,
}

impl ColumnDescriptor {
    const fn new(id: &'static str, header: &'static str, kind: ColumnKind) -> Self {
        Self {
            id,
            header,
            kind,
            visible: true,
        }
    }
}

/// The static column catalogue, in display order.
pub fn default_columns() -> Vec<ColumnDescriptor> {
    vec![
        ColumnDescriptor::new("id", "ID", ColumnKind::Text),
        ColumnDescriptor::new("name", "Name", ColumnKind::Text),
        ColumnDescriptor::new("category", "Category", ColumnKind::Categorical),
        ColumnDescriptor::new("subcategory", "Subcategory", ColumnKind::Categorical),
        ColumnDescriptor::new("price", "Price", ColumnKind::NumericRange),
        ColumnDescriptor::new("createdAt", "Created At", ColumnKind::DateRange),
        ColumnDescriptor::new("updatedAt", "Updated At", ColumnKind::DateRange),
    ]
}

pub fn find<'a>(columns: &'a [ColumnDescriptor], id: &str) -> Option<&'a ColumnDescriptor> {
    columns.iter().find(|c| c.id == id)
}
