use std::time::Instant;

use tracing::trace;

use crate::columns::ColumnDescriptor;
use crate::filter::{self, FilterSpec};
use crate::group::{self, Group, GroupSpec};
use crate::record::Record;
use crate::search::SearchIndex;
use crate::view_state::{ViewState, ViewStateController};

/// Everything the presentation layer needs after a recomputation.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    /// Rows entering the filter stage, in search relevance order.
    pub searched: Vec<usize>,
    pub root: Group,
    /// Rows left after search and filters.
    pub matched: usize,
    pub visible_columns: Vec<ColumnDescriptor>,
    pub filters: FilterSpec,
    pub grouping: GroupSpec,
}

/// search → filter → group over the immutable store.
pub fn run(
    records: &[Record],
    index: &SearchIndex,
    state: &ViewState,
    visible_columns: Vec<ColumnDescriptor>,
) -> PipelineOutput {
    let start_time = Instant::now();
    let searched = index.search(&state.search_text);
    let filtered = filter::apply(records, &searched, &state.filters);
    let root = group::group(records, &filtered, &state.grouping);
    trace!(
        "Pipeline: {} records, {} after search, {} after filters, {} groups in {}µs",
        records.len(),
        searched.len(),
        filtered.len(),
        root.children().len(),
        start_time.elapsed().as_micros()
    );
    PipelineOutput {
        searched,
        root,
        matched: filtered.len(),
        visible_columns,
        filters: state.filters.clone(),
        grouping: state.grouping.clone(),
    }
}

/// Recomputes the whole view from the controller's committed state.
pub fn compute(
    records: &[Record],
    index: &SearchIndex,
    view: &ViewStateController,
) -> PipelineOutput {
    run(records, index, view.state(), view.visible_columns())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::default_columns;
    use crate::filter::FilterValue;
    use crate::record::tests::record;
    use crate::search::SearchOptions;
    use crate::view_state::{DraftEdit, Panel};

    fn store() -> Vec<Record> {
        vec![
            record("1", "Desk Lamp", "Home", "Lighting", 25.0),
            record("2", "Office Chair", "Furniture", "Seating", 150.0),
            record("3", "Lamp Shade", "Home", "Lighting", 12.0),
            record("4", "Standing Desk", "Furniture", "Desks", 420.0),
            record("5", "Floor Lamp", "Home", "Lighting", 80.0),
        ]
    }

    #[test]
    fn default_state_shows_the_whole_store() {
        let records = store();
        let index = SearchIndex::new(&records, SearchOptions::default());
        let view = ViewStateController::new(default_columns());
        let out = compute(&records, &index, &view);
        assert_eq!(out.matched, 5);
        assert_eq!(out.root.leaf_rows(), vec![0, 1, 2, 3, 4]);
        assert_eq!(out.visible_columns.len(), 7);
    }

    #[test]
    fn search_filter_and_group_compose() {
        let records = store();
        let index = SearchIndex::new(&records, SearchOptions::default());
        let mut view = ViewStateController::new(default_columns());
        view.set_search_text("lamp");

        view.open(Panel::Filters);
        view.edit_draft(DraftEdit::SetFilter(
            "price".to_string(),
            FilterValue::Range {
                min: Some(20.0),
                max: None,
            },
        ));
        view.apply();

        view.open(Panel::Grouping);
        view.edit_draft(DraftEdit::ToggleGroupColumn("subcategory".to_string()));
        view.apply();

        let out = compute(&records, &index, &view);
        // Search ranks "Lamp Shade" first, the price filter drops it.
        assert_eq!(out.searched, vec![2, 0, 4]);
        assert_eq!(out.matched, 2);
        assert_eq!(out.root.children().len(), 1);
        assert_eq!(out.root.children()[0].key.as_deref(), Some("Lighting"));
        assert_eq!(out.root.leaf_rows(), vec![0, 4]);
        assert_eq!(out.grouping, vec!["subcategory".to_string()]);
        assert_eq!(out.filters.len(), 1);
    }

    #[test]
    fn pending_drafts_do_not_reach_the_output() {
        let records = store();
        let index = SearchIndex::new(&records, SearchOptions::default());
        let mut view = ViewStateController::new(default_columns());
        view.open(Panel::Visibility);
        view.edit_draft(DraftEdit::ToggleColumn("name".to_string()));
        let out = compute(&records, &index, &view);
        assert_eq!(out.visible_columns.len(), 7);
    }
}
