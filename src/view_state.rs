use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::columns::{self, ColumnDescriptor};
use crate::filter::{FilterSpec, FilterValue};
use crate::group::GroupSpec;

pub type Visibility = BTreeMap<String, bool>;

/// The committed configuration the pipeline runs on.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewState {
    pub search_text: String,
    pub column_visibility: Visibility,
    pub filters: FilterSpec,
    pub grouping: GroupSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Visibility,
    Filters,
    Grouping,
}

/// Scratch copy of the slice of [`ViewState`] an open panel edits.
#[derive(Debug, Clone, PartialEq)]
pub enum Draft {
    Visibility(Visibility),
    Filters(FilterSpec),
    Grouping(GroupSpec),
}

impl Draft {
    pub fn panel(&self) -> Panel {
        match self {
            Draft::Visibility(_) => Panel::Visibility,
            Draft::Filters(_) => Panel::Filters,
            Draft::Grouping(_) => Panel::Grouping,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PanelState {
    Closed,
    Open(Draft),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DraftEdit {
    ToggleColumn(String),
    SetColumnVisible(String, bool),
    /// Resets the visibility draft to every column shown.
    ShowAllColumns,
    SetFilter(String, FilterValue),
    ClearFilter(String),
    ClearAllFilters,
    SetGrouping(GroupSpec),
    /// Appends the column as innermost level, or removes it if already grouped on.
    ToggleGroupColumn(String),
}

/// Sole owner of the committed [`ViewState`] and of the draft of the open panel.
pub struct ViewStateController {
    columns: Vec<ColumnDescriptor>,
    committed: ViewState,
    panel: PanelState,
}

impl ViewStateController {
    pub fn new(columns: Vec<ColumnDescriptor>) -> Self {
        let committed = ViewState {
            column_visibility: Self::default_visibility(&columns),
            ..ViewState::default()
        };
        Self {
            columns,
            committed,
            panel: PanelState::Closed,
        }
    }

    fn default_visibility(columns: &[ColumnDescriptor]) -> Visibility {
        columns.iter().map(|c| (c.id.to_string(), c.visible)).collect()
    }

    fn all_visible(&self) -> Visibility {
        self.columns.iter().map(|c| (c.id.to_string(), true)).collect()
    }

    pub fn state(&self) -> &ViewState {
        &self.committed
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    #[cfg(test)]
    pub fn panel(&self) -> &PanelState {
        &self.panel
    }

    pub fn open_panel(&self) -> Option<Panel> {
        self.draft().map(Draft::panel)
    }

    pub fn draft(&self) -> Option<&Draft> {
        match &self.panel {
            PanelState::Open(draft) => Some(draft),
            PanelState::Closed => None,
        }
    }

    /// Committed visible columns in catalogue order.
    pub fn visible_columns(&self) -> Vec<ColumnDescriptor> {
        self.columns
            .iter()
            .filter(|c| self.committed.column_visibility.get(c.id).copied().unwrap_or(true))
            .map(|c| ColumnDescriptor {
                visible: true,
                ..c.clone()
            })
            .collect()
    }

    /// The search box writes straight through; it has no draft.
    pub fn set_search_text(&mut self, text: &str) -> bool {
        if self.committed.search_text == text {
            return false;
        }
        self.committed.search_text = text.to_string();
        true
    }

    /// Opens `panel` with a draft of the committed value. Any other open panel is
    /// cancelled; opening the panel that is already open closes it.
    pub fn open(&mut self, panel: Panel) {
        let current = self.open_panel();
        if current.is_some() {
            self.cancel();
        }
        if current == Some(panel) {
            return;
        }
        let draft = match panel {
            Panel::Visibility => Draft::Visibility(self.committed.column_visibility.clone()),
            Panel::Filters => Draft::Filters(self.committed.filters.clone()),
            Panel::Grouping => Draft::Grouping(self.committed.grouping.clone()),
        };
        debug!("Opened {panel:?} panel");
        self.panel = PanelState::Open(draft);
    }

    /// Changes the open draft. Returns false if the edit was ignored.
    pub fn edit_draft(&mut self, edit: DraftEdit) -> bool {
        if let Some(column) = Self::edit_column(&edit)
            && columns::find(&self.columns, column).is_none()
        {
            debug!("Ignoring draft edit on unknown column: {edit:?}");
            return false;
        }
        let all_visible = self.all_visible();

        let PanelState::Open(draft) = &mut self.panel else {
            debug!("Ignoring draft edit without open panel: {edit:?}");
            return false;
        };

        match (draft, edit) {
            (Draft::Visibility(visibility), DraftEdit::ToggleColumn(column)) => {
                let entry = visibility.entry(column).or_insert(true);
                *entry = !*entry;
            }
            (Draft::Visibility(visibility), DraftEdit::SetColumnVisible(column, visible)) => {
                visibility.insert(column, visible);
            }
            (Draft::Visibility(visibility), DraftEdit::ShowAllColumns) => {
                *visibility = all_visible;
            }
            (Draft::Filters(filters), DraftEdit::SetFilter(column, value)) => {
                filters.insert(column, value);
            }
            (Draft::Filters(filters), DraftEdit::ClearFilter(column)) => {
                filters.remove(&column);
            }
            (Draft::Filters(filters), DraftEdit::ClearAllFilters) => filters.clear(),
            (Draft::Grouping(grouping), DraftEdit::SetGrouping(spec)) => {
                if let Some(unknown) = spec
                    .iter()
                    .find(|c| columns::find(&self.columns, c).is_none())
                {
                    debug!("Ignoring grouping with unknown column \"{unknown}\"");
                    return false;
                }
                let mut deduped = GroupSpec::with_capacity(spec.len());
                for column in spec {
                    if !deduped.contains(&column) {
                        deduped.push(column);
                    }
                }
                *grouping = deduped;
            }
            (Draft::Grouping(grouping), DraftEdit::ToggleGroupColumn(column)) => {
                match grouping.iter().position(|c| *c == column) {
                    Some(pos) => {
                        grouping.remove(pos);
                    }
                    None => grouping.push(column),
                }
            }
            (draft, edit) => {
                debug!("Ignoring draft edit {edit:?} on {:?} panel", draft.panel());
                return false;
            }
        }
        true
    }

    fn edit_column(edit: &DraftEdit) -> Option<&str> {
        match edit {
            DraftEdit::ToggleColumn(c)
            | DraftEdit::SetColumnVisible(c, _)
            | DraftEdit::SetFilter(c, _)
            | DraftEdit::ClearFilter(c)
            | DraftEdit::ToggleGroupColumn(c) => Some(c),
            DraftEdit::ShowAllColumns | DraftEdit::ClearAllFilters | DraftEdit::SetGrouping(_) => {
                None
            }
        }
    }

    /// Commits the open draft and closes the panel. Returns whether the committed
    /// state changed; without an open panel nothing happens.
    pub fn apply(&mut self) -> bool {
        let PanelState::Open(draft) = std::mem::replace(&mut self.panel, PanelState::Closed) else {
            return false;
        };
        let panel = draft.panel();
        let changed = match draft {
            Draft::Visibility(visibility) => {
                Self::commit(&mut self.committed.column_visibility, visibility)
            }
            Draft::Filters(filters) => Self::commit(&mut self.committed.filters, filters),
            Draft::Grouping(grouping) => Self::commit(&mut self.committed.grouping, grouping),
        };
        info!("Applied {panel:?} panel, changed: {changed}");
        changed
    }

    fn commit<T: PartialEq>(slot: &mut T, value: T) -> bool {
        if *slot == value {
            return false;
        }
        *slot = value;
        true
    }

    /// Discards the open draft. The committed state is left untouched.
    pub fn cancel(&mut self) {
        if let PanelState::Open(draft) = std::mem::replace(&mut self.panel, PanelState::Closed) {
            debug!("Cancelled {:?} panel", draft.panel());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::default_columns;

    fn controller() -> ViewStateController {
        ViewStateController::new(default_columns())
    }

    fn col(id: &str) -> String {
        id.to_string()
    }

    #[test]
    fn starts_with_every_column_visible() {
        let c = controller();
        assert_eq!(c.state().column_visibility.len(), 7);
        assert!(c.state().column_visibility.values().all(|&v| v));
        assert_eq!(c.visible_columns().len(), 7);
        assert_eq!(c.panel(), &PanelState::Closed);
        assert!(c.state().filters.is_empty());
        assert!(c.state().grouping.is_empty());
    }

    #[test]
    fn draft_is_invisible_until_applied() {
        let mut c = controller();
        c.open(Panel::Visibility);
        assert!(c.edit_draft(DraftEdit::ToggleColumn(col("price"))));
        assert_eq!(c.state().column_visibility["price"], true);

        assert!(c.apply());
        assert_eq!(c.state().column_visibility["price"], false);
        assert_eq!(c.open_panel(), None);
        assert!(!c.visible_columns().iter().any(|d| d.id == "price"));
    }

    #[test]
    fn cancel_restores_pre_open_state() {
        let mut c = controller();
        c.set_search_text("lamp");
        let before = c.state().clone();

        c.open(Panel::Filters);
        c.edit_draft(DraftEdit::SetFilter(col("name"), FilterValue::Text("x".into())));
        c.edit_draft(DraftEdit::SetFilter(
            col("price"),
            FilterValue::Range {
                min: Some(1.0),
                max: None,
            },
        ));
        c.edit_draft(DraftEdit::ClearFilter(col("name")));
        c.cancel();
        assert_eq!(c.state(), &before);

        c.open(Panel::Grouping);
        c.edit_draft(DraftEdit::ToggleGroupColumn(col("category")));
        c.cancel();
        assert_eq!(c.state(), &before);
        assert_eq!(c.panel(), &PanelState::Closed);
    }

    #[test]
    fn second_apply_is_a_no_op() {
        let mut c = controller();
        c.open(Panel::Grouping);
        c.edit_draft(DraftEdit::SetGrouping(vec![col("category"), col("subcategory")]));
        assert!(c.apply());
        let after = c.state().clone();
        assert!(!c.apply());
        assert_eq!(c.state(), &after);
        assert_eq!(after.grouping, vec![col("category"), col("subcategory")]);
    }

    #[test]
    fn apply_without_edits_changes_nothing() {
        let mut c = controller();
        c.open(Panel::Filters);
        assert!(!c.apply());
    }

    #[test]
    fn show_all_columns_edits_the_draft_only() {
        let mut c = controller();
        c.open(Panel::Visibility);
        c.edit_draft(DraftEdit::SetColumnVisible(col("name"), false));
        c.edit_draft(DraftEdit::SetColumnVisible(col("id"), false));
        c.apply();

        c.open(Panel::Visibility);
        assert!(c.edit_draft(DraftEdit::ShowAllColumns));
        assert_eq!(c.state().column_visibility["name"], false);
        match c.draft() {
            Some(Draft::Visibility(v)) => assert!(v.values().all(|&visible| visible)),
            other => panic!("unexpected draft {other:?}"),
        }
        c.apply();
        assert!(c.state().column_visibility.values().all(|&v| v));
    }

    #[test]
    fn opening_another_panel_cancels_the_current_one() {
        let mut c = controller();
        c.open(Panel::Visibility);
        c.edit_draft(DraftEdit::ToggleColumn(col("id")));
        c.open(Panel::Grouping);
        assert_eq!(c.open_panel(), Some(Panel::Grouping));
        assert_eq!(c.draft(), Some(&Draft::Grouping(Vec::new())));
        assert_eq!(c.state().column_visibility["id"], true);
    }

    #[test]
    fn opening_the_open_panel_toggles_it_closed() {
        let mut c = controller();
        c.open(Panel::Filters);
        c.open(Panel::Filters);
        assert_eq!(c.open_panel(), None);
    }

    #[test]
    fn edits_outside_the_open_panel_are_ignored() {
        let mut c = controller();
        assert!(!c.edit_draft(DraftEdit::ToggleColumn(col("id"))));

        c.open(Panel::Grouping);
        assert!(!c.edit_draft(DraftEdit::ToggleColumn(col("id"))));
        assert!(!c.edit_draft(DraftEdit::ToggleGroupColumn(col("colour"))));
        assert!(!c.edit_draft(DraftEdit::SetGrouping(vec![col("colour")])));
        assert_eq!(c.draft(), Some(&Draft::Grouping(Vec::new())));
    }

    #[test]
    fn toggle_group_column_appends_and_removes() {
        let mut c = controller();
        c.open(Panel::Grouping);
        c.edit_draft(DraftEdit::ToggleGroupColumn(col("subcategory")));
        c.edit_draft(DraftEdit::ToggleGroupColumn(col("category")));
        assert_eq!(
            c.draft(),
            Some(&Draft::Grouping(vec![col("subcategory"), col("category")]))
        );
        c.edit_draft(DraftEdit::ToggleGroupColumn(col("subcategory")));
        assert_eq!(c.draft(), Some(&Draft::Grouping(vec![col("category")])));
    }

    #[test]
    fn search_text_is_committed_directly() {
        let mut c = controller();
        assert!(c.set_search_text("desk"));
        assert!(!c.set_search_text("desk"));
        assert_eq!(c.state().search_text, "desk");
    }
}
