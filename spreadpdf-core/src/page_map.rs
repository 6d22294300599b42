use std::collections::BTreeSet;

/// Maps the virtual pages a reader navigates onto the underlying document's
/// pages. A `None` slot is a synthetic blank page used to fix spread parity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMap {
    slots: Vec<Option<usize>>,
    page_count: usize,
}

impl PageMap {
    pub fn new(page_count: usize) -> Self {
        Self {
            slots: (0..page_count).map(Some).collect(),
            page_count,
        }
    }

    pub fn total_pages(&self) -> usize {
        self.slots.len()
    }

    pub fn actual_page(&self, virtual_index: usize) -> Option<usize> {
        self.slots.get(virtual_index).copied().flatten()
    }

    pub fn is_blank(&self, virtual_index: usize) -> bool {
        matches!(self.slots.get(virtual_index), Some(None))
    }

    /// Inserts a blank at `virtual_index`, shifting later slots by one.
    /// Positions past the end are ignored and leave the map untouched.
    pub fn insert_blank_at(&mut self, virtual_index: usize) -> bool {
        if virtual_index > self.slots.len() {
            return false;
        }
        self.slots.insert(virtual_index, None);
        true
    }

    pub fn insert_blank_before(&mut self, virtual_index: usize) -> bool {
        self.insert_blank_at(virtual_index)
    }

    pub fn toggle_first_blank(&mut self) {
        if self.is_blank(0) {
            self.slots.remove(0);
        } else {
            self.slots.insert(0, None);
        }
    }

    pub fn blank_indices(&self) -> BTreeSet<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(index, _)| index)
            .collect()
    }

    /// Rebuilds the identity map and re-inserts blanks in ascending order, which
    /// reproduces the layout `blank_indices` was taken from.
    pub fn replay_blanks<'a, I>(&mut self, indices: I)
    where
        I: IntoIterator<Item = &'a usize>,
    {
        *self = Self::new(self.page_count);
        let ordered: BTreeSet<usize> = indices.into_iter().copied().collect();
        for index in ordered {
            self.insert_blank_at(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_map_is_identity() {
        let map = PageMap::new(3);
        assert_eq!(map.total_pages(), 3);
        assert_eq!(map.actual_page(0), Some(0));
        assert_eq!(map.actual_page(2), Some(2));
        assert_eq!(map.actual_page(3), None);
        assert!(map.blank_indices().is_empty());
    }

    #[test]
    fn insert_shifts_later_slots() {
        let mut map = PageMap::new(10);
        assert!(map.insert_blank_at(4));
        assert_eq!(map.total_pages(), 11);
        assert_eq!(map.actual_page(3), Some(3));
        assert_eq!(map.actual_page(4), None);
        assert_eq!(map.actual_page(5), Some(4));
        assert_eq!(map.actual_page(10), Some(9));
    }

    #[test]
    fn insert_at_every_valid_position_preserves_page_order() {
        for position in 0..=5 {
            let mut map = PageMap::new(5);
            assert!(map.insert_blank_before(position));
            assert_eq!(map.total_pages(), 6);
            let pages: Vec<usize> = (0..6).filter_map(|i| map.actual_page(i)).collect();
            assert_eq!(pages, vec![0, 1, 2, 3, 4]);
            assert!(map.is_blank(position));
        }
    }

    #[test]
    fn insert_past_end_is_ignored() {
        let mut map = PageMap::new(2);
        assert!(!map.insert_blank_at(3));
        assert_eq!(map, PageMap::new(2));
    }

    #[test]
    fn toggle_first_blank_twice_restores_map() {
        let mut map = PageMap::new(4);
        map.insert_blank_at(2);
        let before = map.clone();

        map.toggle_first_blank();
        assert_eq!(map.total_pages(), 6);
        assert_eq!(map.actual_page(0), None);
        assert_eq!(map.actual_page(1), Some(0));

        map.toggle_first_blank();
        assert_eq!(map, before);
    }

    #[test]
    fn blanks_replay_to_same_layout() {
        let mut map = PageMap::new(6);
        map.insert_blank_at(0);
        map.insert_blank_at(3);
        map.insert_blank_at(8);
        let blanks = map.blank_indices();
        assert_eq!(blanks.iter().copied().collect::<Vec<_>>(), vec![0, 3, 8]);

        let mut restored = PageMap::new(6);
        restored.replay_blanks(&blanks);
        assert_eq!(restored, map);
    }
}
