use crate::domain::models::{AlarmId, MAX_ALARM_ID};
use std::collections::HashSet;

pub const FIRST_ALARM_ID: AlarmId = 1;
/// Spacing between candidate ids. Persisted ids were handed out on this grid.
pub const ALARM_ID_STRIDE: usize = 7;

/// Returns the first id on the `1, 8, 15, ...` grid that is not in `used`,
/// or `None` once every candidate up to [`MAX_ALARM_ID`] is taken.
pub fn allocate(used: &HashSet<AlarmId>) -> Option<AlarmId> {
    allocate_up_to(used, MAX_ALARM_ID)
}

pub(crate) fn allocate_up_to(used: &HashSet<AlarmId>, limit: AlarmId) -> Option<AlarmId> {
    (FIRST_ALARM_ID..=limit)
        .step_by(ALARM_ID_STRIDE)
        .find(|candidate| !used.contains(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn allocates_on_the_stride_grid() {
        assert_eq!(allocate(&HashSet::new()), Some(1));
        assert_eq!(allocate(&HashSet::from([1])), Some(8));
        assert_eq!(allocate(&HashSet::from([1, 8])), Some(15));
    }

    #[test]
    fn reuses_freed_gaps_first() {
        assert_eq!(allocate(&HashSet::from([1, 15, 22])), Some(8));
    }

    #[test]
    fn ids_off_the_grid_do_not_block_candidates() {
        assert_eq!(allocate(&HashSet::from([2, 3, 4])), Some(1));
    }

    #[test]
    fn exhaustion_is_reported() {
        let used = HashSet::from([1, 8, 15]);
        assert_eq!(allocate_up_to(&used, 20), None);
        assert_eq!(allocate_up_to(&used, 22), Some(22));
    }

    proptest! {
        #[test]
        fn allocated_id_is_fresh_and_on_grid(used in proptest::collection::hash_set(1u32..200u32, 0..40)) {
            let id = allocate(&used).expect("grid is far from exhausted");
            prop_assert!(!used.contains(&id));
            prop_assert_eq!((id - 1) % 7, 0);
            prop_assert!((FIRST_ALARM_ID..id)
                .step_by(ALARM_ID_STRIDE)
                .all(|candidate| used.contains(&candidate)));
        }
    }
}
