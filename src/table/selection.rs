use std::collections::BTreeSet;

use crate::tree::RowId;

/// Selected rows, tracked by id and independent of what is loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    rows: BTreeSet<RowId>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip exactly this row. Selecting a group does not touch its children.
    pub fn toggle(&mut self, row_id: &RowId) -> bool {
        if self.rows.remove(row_id) {
            false
        } else {
            self.rows.insert(row_id.clone());
            true
        }
    }

    pub fn is_selected(&self, row_id: &RowId) -> bool {
        self.rows.contains(row_id)
    }

    /// Newly loaded children of a selected group start out selected.
    pub fn on_rows_merged<'a>(&mut self, parent: &RowId, children: impl IntoIterator<Item = &'a RowId>) {
        if !self.rows.contains(parent) {
            return;
        }
        let before = self.rows.len();
        self.rows.extend(children.into_iter().cloned());
        tracing::debug!(
            parent = %parent,
            added = self.rows.len() - before,
            "Propagated selection to new children"
        );
    }

    /// Job ids of the selected leaf rows. Group rows contribute nothing until
    /// their leaves are loaded and selected.
    pub fn selected_jobs(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row_id| row_id.job_id().map(str::to_string))
            .collect()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RowId> {
        self.rows.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_flips_membership() {
        let mut selection = Selection::new();
        let row = RowId::for_job("1", None);
        assert!(selection.toggle(&row));
        assert!(selection.is_selected(&row));
        assert!(!selection.toggle(&row));
        assert!(selection.is_empty());
    }

    #[test]
    fn merged_children_inherit_parent_selection() {
        let parent = RowId::new("queue", "queue-1", None);
        let children = vec![RowId::for_job("1", Some(&parent)), RowId::for_job("3", Some(&parent))];

        let mut selection = Selection::new();
        selection.on_rows_merged(&parent, &children);
        assert!(selection.is_empty());

        selection.toggle(&parent);
        selection.on_rows_merged(&parent, &children);
        assert_eq!(selection.len(), 3);
        assert_eq!(selection.selected_jobs(), vec!["1".to_string(), "3".to_string()]);
    }

    #[test]
    fn groups_do_not_count_as_selected_jobs() {
        let mut selection = Selection::new();
        selection.toggle(&RowId::new("queue", "queue-1", None));
        assert!(selection.selected_jobs().is_empty());
    }
}
