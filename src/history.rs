//! Time-ordered history of accepted time points.
//!
//! An arena of slots linked newest-to-oldest. Retired slots go onto a
//! free list and are reused by later insertions together with their
//! payload allocation, so steady-state transient runs do not allocate.
//! Handles carry a generation counter and go stale when their slot is
//! recycled.

/// Generation-checked reference to a node of a [`TimeList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRef {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone)]
struct Slot<T> {
    time: f64,
    value: T,
    /// Next older node.
    older: Option<u32>,
    /// Next newer node.
    newer: Option<u32>,
    generation: u32,
    live: bool,
}

#[derive(Debug, Clone)]
pub struct TimeList<T> {
    slots: Vec<Slot<T>>,
    head: Option<u32>,
    tail: Option<u32>,
    free: Vec<u32>,
    len: usize,
}

impl<T: Default> Default for TimeList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default> TimeList<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            head: None,
            tail: None,
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Link a new head at `time`.
    ///
    /// Returns `None` when `time` does not exceed the current head time.
    /// The payload of a recycled slot keeps its previous contents and
    /// capacity; callers overwrite it.
    pub fn link_new(&mut self, time: f64) -> Option<(NodeRef, &mut T)> {
        if let Some(h) = self.head {
            if !(time > self.slots[h as usize].time) {
                return None;
            }
        }
        let index = match self.free.pop() {
            Some(i) => {
                let slot = &mut self.slots[i as usize];
                slot.time = time;
                slot.older = self.head;
                slot.newer = None;
                slot.live = true;
                i
            }
            None => {
                self.slots.push(Slot {
                    time,
                    value: T::default(),
                    older: self.head,
                    newer: None,
                    generation: 0,
                    live: true,
                });
                (self.slots.len() - 1) as u32
            }
        };
        match self.head {
            Some(h) => self.slots[h as usize].newer = Some(index),
            None => self.tail = Some(index),
        }
        self.head = Some(index);
        self.len += 1;
        let slot = &mut self.slots[index as usize];
        Some((
            NodeRef {
                index,
                generation: slot.generation,
            },
            &mut slot.value,
        ))
    }

    /// Recycle every node strictly older than `horizon`.
    pub fn free_tail(&mut self, horizon: f64) -> usize {
        let mut freed = 0;
        while let Some(t) = self.tail {
            let slot = &mut self.slots[t as usize];
            if !(slot.time < horizon) {
                break;
            }
            slot.live = false;
            slot.generation = slot.generation.wrapping_add(1);
            let newer = slot.newer.take();
            slot.older = None;
            self.free.push(t);
            self.tail = newer;
            match newer {
                Some(n) => self.slots[n as usize].older = None,
                None => self.head = None,
            }
            self.len -= 1;
            freed += 1;
        }
        freed
    }

    /// Keep only the `keep` newest nodes.
    pub fn retain_newest(&mut self, keep: usize) {
        if self.len <= keep {
            return;
        }
        if keep == 0 {
            self.clear();
            return;
        }
        // Time of the oldest node to keep.
        if let Some(horizon) = self.iter().nth(keep - 1).map(|(t, _)| t) {
            self.free_tail(horizon);
        }
    }

    /// Recycle all nodes.
    pub fn clear(&mut self) {
        self.free_tail(f64::INFINITY);
    }

    pub fn head(&self) -> Option<(f64, &T)> {
        self.head.map(|h| {
            let s = &self.slots[h as usize];
            (s.time, &s.value)
        })
    }

    pub fn head_mut(&mut self) -> Option<&mut T> {
        self.head.map(move |h| &mut self.slots[h as usize].value)
    }

    pub fn tail(&self) -> Option<(f64, &T)> {
        self.tail.map(|t| {
            let s = &self.slots[t as usize];
            (s.time, &s.value)
        })
    }

    /// Resolve a handle; `None` once its node has been recycled.
    pub fn get(&self, node: NodeRef) -> Option<(f64, &T)> {
        let s = self.slots.get(node.index as usize)?;
        (s.live && s.generation == node.generation).then_some((s.time, &s.value))
    }

    /// The `k`-th newest node, `0` being the head.
    pub fn nth(&self, k: usize) -> Option<(f64, &T)> {
        self.iter().nth(k)
    }

    /// Nodes from newest to oldest.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }
}

pub struct Iter<'a, T> {
    list: &'a TimeList<T>,
    cursor: Option<u32>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (f64, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let i = self.cursor?;
        let s = &self.list.slots[i as usize];
        self.cursor = s.older;
        Some((s.time, &s.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn times(list: &TimeList<Vec<f64>>) -> Vec<f64> {
        list.iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn rejects_non_increasing_time() {
        let mut list: TimeList<Vec<f64>> = TimeList::new();
        assert!(list.link_new(1.0).is_some());
        assert!(list.link_new(1.0).is_none());
        assert!(list.link_new(0.5).is_none());
        assert!(list.link_new(f64::NAN).is_none());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn increasing_sequence_always_links() {
        let mut list: TimeList<Vec<f64>> = TimeList::new();
        for i in 0..100 {
            let t = i as f64 * 1e-9;
            let (_, payload) = list.link_new(t).expect("strictly increasing time");
            payload.clear();
            payload.push(t);
        }
        assert_eq!(list.len(), 100);
        assert_eq!(list.head().map(|(t, _)| t), Some(99.0 * 1e-9));
        assert_eq!(list.tail().map(|(t, _)| t), Some(0.0));
    }

    #[test]
    fn free_tail_keeps_times_at_or_after_horizon() {
        let mut list: TimeList<Vec<f64>> = TimeList::new();
        for t in [0.0, 1.0, 2.0, 3.0, 4.0] {
            list.link_new(t).unwrap();
        }
        assert_eq!(list.free_tail(2.0), 2);
        assert_eq!(times(&list), vec![4.0, 3.0, 2.0]);
        assert_eq!(list.tail().map(|(t, _)| t), Some(2.0));

        assert_eq!(list.free_tail(10.0), 3);
        assert!(list.is_empty());
        assert!(list.head().is_none());
        // An emptied list accepts any time again.
        assert!(list.link_new(-1.0).is_some());
    }

    #[test]
    fn recycled_slots_reuse_payload_and_stale_handles() {
        let mut list: TimeList<Vec<f64>> = TimeList::new();
        let (first, payload) = list.link_new(0.0).unwrap();
        payload.extend_from_slice(&[1.0, 2.0, 3.0]);
        list.link_new(1.0).unwrap();
        assert!(list.get(first).is_some());

        list.free_tail(0.5);
        assert!(list.get(first).is_none());

        let (second, payload) = list.link_new(2.0).unwrap();
        assert!(payload.capacity() >= 3);
        assert_eq!(payload.as_slice(), &[1.0, 2.0, 3.0]);
        assert_ne!(first, second);
        assert_eq!(times(&list), vec![2.0, 1.0]);
    }

    #[test]
    fn retain_newest() {
        let mut list: TimeList<Vec<f64>> = TimeList::new();
        for t in 0..6 {
            list.link_new(t as f64).unwrap();
        }
        list.retain_newest(3);
        assert_eq!(times(&list), vec![5.0, 4.0, 3.0]);
        assert_eq!(list.nth(1).map(|(t, _)| t), Some(4.0));
    }
}
