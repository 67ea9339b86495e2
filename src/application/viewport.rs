use std::sync::RwLock;

/// Answers which list rows the presentation layer currently has on screen.
pub trait ViewportQuery: Send + Sync {
    fn is_materialized(&self, index: usize) -> bool;

    /// Drops any drag/reorder state held for the old list contents.
    fn reset_reorder_tracking(&self) {}
}

/// Viewport backed by a single contiguous window of rendered rows.
#[derive(Debug, Default)]
pub struct MaterializedWindow {
    window: RwLock<Option<(usize, usize)>>,
    resets: RwLock<usize>,
}

impl MaterializedWindow {
    pub fn new(first: usize, last: usize) -> Self {
        let window = Self::default();
        window.set(Some((first, last)));
        window
    }

    /// Sets the inclusive rendered range, or `None` when nothing is on screen.
    pub fn set(&self, window: Option<(usize, usize)>) {
        if let Ok(mut guard) = self.window.write() {
            *guard = window.filter(|(first, last)| first <= last);
        }
    }

    pub fn get(&self) -> Option<(usize, usize)> {
        self.window.read().ok().and_then(|guard| *guard)
    }

    pub fn reset_count(&self) -> usize {
        self.resets.read().map(|guard| *guard).unwrap_or_default()
    }
}

impl ViewportQuery for MaterializedWindow {
    fn is_materialized(&self, index: usize) -> bool {
        self.get()
            .is_some_and(|(first, last)| (first..=last).contains(&index))
    }

    fn reset_reorder_tracking(&self) {
        if let Ok(mut guard) = self.resets.write() {
            *guard += 1;
        }
    }
}

/// Smallest span of materialized rows that contains `position`, computed
/// before the row at `position` is removed from a list of `len` rows.
pub fn materialized_range_around(
    viewport: &dyn ViewportQuery,
    position: usize,
    len: usize,
) -> Option<(usize, usize)> {
    let first = (0..position)
        .rev()
        .find(|index| !viewport.is_materialized(*index))
        .map_or(0, |index| index + 1);
    let last = match (position..len).find(|index| !viewport.is_materialized(*index)) {
        Some(0) => return None,
        Some(index) => index - 1,
        None => len.checked_sub(1)?,
    };
    (first <= last).then_some((first, last))
}
