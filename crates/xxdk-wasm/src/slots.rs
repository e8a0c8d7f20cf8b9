//! Index-addressed table whose freed slots are reused

#[derive(Debug)]
pub(crate) struct SlotTable<T> {
    slots: Vec<Option<T>>,
    free: Vec<usize>,
}

impl<T> SlotTable<T> {
    pub(crate) const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Store `value`, preferring the most recently freed slot
    pub(crate) fn insert(&mut self, value: T) -> usize {
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(value);
                slot
            }
            None => {
                self.slots.push(Some(value));
                self.slots.len() - 1
            }
        }
    }

    pub(crate) fn get(&self, slot: usize) -> Option<&T> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub(crate) fn remove(&mut self, slot: usize) -> Option<T> {
        let value = self.slots.get_mut(slot)?.take()?;
        self.free.push(slot);
        Some(value)
    }

    /// Number of occupied slots
    pub(crate) fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Slots allocated so far, occupied or free
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freed_slot_is_reused() {
        let mut table = SlotTable::new();
        let a = table.insert("a");
        let b = table.insert("b");
        assert_ne!(a, b);

        assert_eq!(table.remove(a), Some("a"));
        assert_eq!(table.get(a), None);
        assert_eq!(table.insert("c"), a);
        assert_eq!(table.get(a), Some(&"c"));
        assert_eq!(table.get(b), Some(&"b"));
    }

    #[test]
    fn test_churn_does_not_grow_table() {
        let mut table = SlotTable::new();
        for i in 0..1000 {
            let slot = table.insert(i);
            assert_eq!(table.remove(slot), Some(i));
        }
        assert_eq!(table.capacity(), 1);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_double_remove_frees_once() {
        let mut table = SlotTable::new();
        let slot = table.insert(1);
        assert_eq!(table.remove(slot), Some(1));
        assert_eq!(table.remove(slot), None);
        assert_eq!(table.remove(99), None);

        // Only one free entry, so two inserts need two distinct slots.
        let first = table.insert(2);
        let second = table.insert(3);
        assert_ne!(first, second);
        assert_eq!(table.len(), 2);
    }
}
