use std::collections::HashMap;

use tracing::debug;

use crate::record::Record;

/// Ordered column ids to group by, outermost first.
pub type GroupSpec = Vec<String>;

#[derive(Debug, Clone, PartialEq)]
pub enum GroupContent {
    Groups(Vec<Group>),
    Rows(Vec<usize>),
}

/// A node of the grouping tree. The root has neither column nor key.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub column: Option<String>,
    pub key: Option<String>,
    pub content: GroupContent,
}

/// A line of the grouped table as the UI lays it out.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayRow {
    Header {
        depth: usize,
        column: String,
        key: String,
        count: usize,
    },
    Record {
        depth: usize,
        index: usize,
    },
}

impl Group {
    fn root(content: GroupContent) -> Self {
        Self {
            column: None,
            key: None,
            content,
        }
    }

    /// All record indices below this node, depth first.
    #[cfg(test)]
    pub fn leaf_rows(&self) -> Vec<usize> {
        let mut rows = Vec::new();
        self.collect_rows(&mut rows);
        rows
    }

    #[cfg(test)]
    fn collect_rows(&self, out: &mut Vec<usize>) {
        match &self.content {
            GroupContent::Rows(rows) => out.extend_from_slice(rows),
            GroupContent::Groups(groups) => groups.iter().for_each(|g| g.collect_rows(out)),
        }
    }

    pub fn row_count(&self) -> usize {
        match &self.content {
            GroupContent::Rows(rows) => rows.len(),
            GroupContent::Groups(groups) => groups.iter().map(Group::row_count).sum(),
        }
    }

    pub fn children(&self) -> &[Group] {
        match &self.content {
            GroupContent::Groups(groups) => groups,
            GroupContent::Rows(_) => &[],
        }
    }

    /// Group headers followed by their records, depth first. The root itself has no header.
    pub fn flatten(&self) -> Vec<DisplayRow> {
        let mut lines = Vec::new();
        self.flatten_into(0, &mut lines);
        lines
    }

    fn flatten_into(&self, depth: usize, out: &mut Vec<DisplayRow>) {
        let depth = match (&self.column, &self.key) {
            (Some(column), Some(key)) => {
                out.push(DisplayRow::Header {
                    depth,
                    column: column.clone(),
                    key: key.clone(),
                    count: self.row_count(),
                });
                depth + 1
            }
            _ => depth,
        };
        match &self.content {
            GroupContent::Rows(rows) => {
                out.extend(rows.iter().map(|&index| DisplayRow::Record { depth, index }))
            }
            GroupContent::Groups(groups) => groups.iter().for_each(|g| g.flatten_into(depth, out)),
        }
    }
}

/// Partitions `rows` by the columns of `spec`. Groups appear in the order their
/// key is first seen and rows inside a group keep their input order.
pub fn group(records: &[Record], rows: &[usize], spec: &[String]) -> Group {
    let levels: Vec<&str> = spec
        .iter()
        .map(String::as_str)
        .filter(|column| {
            let known = records.first().is_none_or(|r| r.value(column).is_some());
            if !known {
                debug!("Ignoring grouping on unknown column \"{column}\"");
            }
            known
        })
        .collect();
    Group::root(partition(records, rows.to_vec(), &levels))
}

fn partition(records: &[Record], rows: Vec<usize>, levels: &[&str]) -> GroupContent {
    let Some((&column, rest)) = levels.split_first() else {
        return GroupContent::Rows(rows);
    };

    let mut buckets: Vec<(String, Vec<usize>)> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();
    for ridx in rows {
        let key = records[ridx].display(column).unwrap_or_default();
        match position.get(&key) {
            Some(&pos) => buckets[pos].1.push(ridx),
            None => {
                position.insert(key.clone(), buckets.len());
                buckets.push((key, vec![ridx]));
            }
        }
    }

    GroupContent::Groups(
        buckets
            .into_iter()
            .map(|(key, members)| Group {
                column: Some(column.to_string()),
                key: Some(key),
                content: partition(records, members, rest),
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::record;

    fn store() -> Vec<Record> {
        vec![
            record("1", "Desk Lamp", "A", "x", 25.0),
            record("2", "Office Chair", "B", "y", 150.0),
            record("3", "Lamp Shade", "A", "y", 12.0),
            record("4", "Standing Desk", "B", "y", 420.0),
            record("5", "Floor Lamp", "A", "x", 60.0),
        ]
    }

    fn spec(columns: &[&str]) -> GroupSpec {
        columns.iter().map(|c| c.to_string()).collect()
    }

    fn keys(groups: &[Group]) -> Vec<&str> {
        groups.iter().filter_map(|g| g.key.as_deref()).collect()
    }

    #[test]
    fn empty_spec_is_one_root_group() {
        let records = store();
        let root = group(&records, &[4, 0, 2], &[]);
        assert_eq!(root.key, None);
        assert_eq!(root.content, GroupContent::Rows(vec![4, 0, 2]));
    }

    #[test]
    fn groups_in_first_appearance_order() {
        let records = vec![
            record("1", "one", "A", "", 0.0),
            record("2", "two", "B", "", 0.0),
            record("3", "three", "A", "", 0.0),
        ];
        let root = group(&records, &[0, 1, 2], &spec(&["category"]));
        let groups = root.children();
        assert_eq!(keys(groups), vec!["A", "B"]);
        assert_eq!(groups[0].content, GroupContent::Rows(vec![0, 2]));
        assert_eq!(groups[1].content, GroupContent::Rows(vec![1]));
    }

    #[test]
    fn order_follows_the_input_not_the_alphabet() {
        let records = store();
        let root = group(&records, &[3, 0, 1], &spec(&["category"]));
        assert_eq!(keys(root.children()), vec!["B", "A"]);
    }

    #[test]
    fn nested_groups() {
        let records = store();
        let rows = vec![0, 1, 2, 3, 4];
        let root = group(&records, &rows, &spec(&["category", "subcategory"]));

        let outer = root.children();
        assert_eq!(keys(outer), vec!["A", "B"]);
        assert_eq!(keys(outer[0].children()), vec!["x", "y"]);
        assert_eq!(keys(outer[1].children()), vec!["y"]);
        assert_eq!(outer[0].children()[0].content, GroupContent::Rows(vec![0, 4]));
        assert_eq!(outer[0].row_count(), 3);

        // Depth first leaves follow the group order, and each group keeps input order.
        assert_eq!(root.leaf_rows(), vec![0, 4, 2, 1, 3]);
    }

    #[test]
    fn leaf_rows_reproduce_input_when_already_clustered() {
        let records = store();
        let rows = vec![0, 4, 2, 1, 3];
        let root = group(&records, &rows, &spec(&["category", "subcategory"]));
        assert_eq!(root.leaf_rows(), rows);
    }

    #[test]
    fn unknown_columns_are_skipped() {
        let records = store();
        let root = group(&records, &[0, 1], &spec(&["colour", "category"]));
        assert_eq!(keys(root.children()), vec!["A", "B"]);
        assert_eq!(root.children()[0].column.as_deref(), Some("category"));
    }

    #[test]
    fn flatten_emits_headers_before_records() {
        let records = store();
        let root = group(&records, &[0, 1, 2], &spec(&["category"]));
        assert_eq!(
            root.flatten(),
            vec![
                DisplayRow::Header {
                    depth: 0,
                    column: "category".to_string(),
                    key: "A".to_string(),
                    count: 2
                },
                DisplayRow::Record { depth: 1, index: 0 },
                DisplayRow::Record { depth: 1, index: 2 },
                DisplayRow::Header {
                    depth: 0,
                    column: "category".to_string(),
                    key: "B".to_string(),
                    count: 1
                },
                DisplayRow::Record { depth: 1, index: 1 },
            ]
        );

        let flat = group(&records, &[1, 0], &[]);
        assert_eq!(
            flat.flatten(),
            vec![
                DisplayRow::Record { depth: 0, index: 1 },
                DisplayRow::Record { depth: 0, index: 0 },
            ]
        );
    }
}
