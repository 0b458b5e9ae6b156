//! Owned store for the loaded dataset and its provisional working copy.
//!
//! The store is the single source of truth. Consumers receive clones from the
//! accessors and hand back whole replacement frames; nothing outside this
//! module mutates the frames in place.

use polars::prelude::*;

/// Holds the last-applied dataset and the working copy being edited by
/// cleaning operations. `apply` promotes the working copy; `reset` discards
/// uncommitted edits.
pub struct DataStore {
    original: DataFrame,
    working: DataFrame,
}

impl DataStore {
    pub fn new(df: DataFrame) -> Self {
        Self {
            working: df.clone(),
            original: df,
        }
    }

    /// The last-applied (or originally loaded) dataset.
    pub fn original(&self) -> DataFrame {
        self.original.clone()
    }

    /// The current working copy.
    pub fn working(&self) -> DataFrame {
        self.working.clone()
    }

    /// Replace the working copy with the result of a cleaning operation.
    pub fn set_working(&mut self, df: DataFrame) {
        self.working = df;
    }

    /// Promote the working copy to be the new original. Pre-apply history is
    /// discarded.
    pub fn apply(&mut self) {
        self.original = self.working.clone();
    }

    /// Restore the working copy to the last-applied dataset, discarding
    /// uncommitted operations.
    pub fn reset(&mut self) {
        self.working = self.original.clone();
    }

    /// Replace both frames with a freshly loaded dataset.
    pub fn load(&mut self, df: DataFrame) {
        self.working = df.clone();
        self.original = df;
    }

    /// True when the working copy differs from the last-applied dataset.
    pub fn is_dirty(&self) -> bool {
        !self.working.equals_missing(&self.original)
    }

    pub fn height(&self) -> usize {
        self.working.height()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.working
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataFrame {
        df!("a" => &[1i64, 2, 3], "b" => &["x", "y", "z"]).unwrap()
    }

    #[test]
    fn accessors_clone() {
        let store = DataStore::new(sample());
        let mut w = store.working();
        w = w.drop("a").unwrap();
        assert_eq!(w.width(), 1);
        // The store is untouched by edits to the clone.
        assert_eq!(store.working().width(), 2);
    }

    #[test]
    fn reset_restores_last_applied() {
        let mut store = DataStore::new(sample());
        let edited = store.working().drop("b").unwrap();
        store.set_working(edited);
        assert!(store.is_dirty());
        store.reset();
        assert!(!store.is_dirty());
        assert!(store.working().equals_missing(&sample()));
    }

    #[test]
    fn apply_promotes_working_copy() {
        let mut store = DataStore::new(sample());
        let edited = store.working().drop("b").unwrap();
        store.set_working(edited.clone());
        store.apply();
        // Reset after apply returns to the applied frame, not the load.
        store.reset();
        assert!(store.working().equals_missing(&edited));
        assert!(store.original().equals_missing(&edited));
    }

    #[test]
    fn load_replaces_both_frames() {
        let mut store = DataStore::new(sample());
        store.set_working(store.working().drop("b").unwrap());
        let fresh = df!("c" => &[9i64]).unwrap();
        store.load(fresh.clone());
        assert!(store.working().equals_missing(&fresh));
        assert!(!store.is_dirty());
    }
}
