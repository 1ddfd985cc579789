use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::marker::PhantomData;

/// Ordering policy for [`FixedSizePq`].
pub trait Comparator<T> {
    fn compare(a: &T, b: &T) -> Ordering;
}

/// Natural ascending order. A queue with this comparator retains the k
/// smallest values seen.
pub struct Less;

/// Reversed order. A queue with this comparator retains the k largest.
pub struct Greater;

impl<T: PartialOrd> Comparator<T> for Less {
    fn compare(a: &T, b: &T) -> Ordering {
        a.partial_cmp(b).unwrap_or(Ordering::Equal)
    }
}

impl<T: PartialOrd> Comparator<T> for Greater {
    fn compare(a: &T, b: &T) -> Ordering {
        b.partial_cmp(a).unwrap_or(Ordering::Equal)
    }
}

struct Entry<T, C: Comparator<T>> {
    value: T,
    _order: PhantomData<C>,
}

impl<T, C: Comparator<T>> PartialEq for Entry<T, C> {
    fn eq(&self, other: &Self) -> bool {
        C::compare(&self.value, &other.value) == Ordering::Equal
    }
}

impl<T, C: Comparator<T>> Eq for Entry<T, C> {}

impl<T, C: Comparator<T>> PartialOrd for Entry<T, C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T, C: Comparator<T>> Ord for Entry<T, C> {
    fn cmp(&self, other: &Self) -> Ordering {
        C::compare(&self.value, &other.value)
    }
}

/// Priority queue holding at most `limit` elements: the k extreme-most of the
/// stream under the comparator. `top`/`pop` expose the worst retained element
/// first, so draining the queue visits the retained set.
pub struct FixedSizePq<T, C: Comparator<T>> {
    heap: BinaryHeap<Entry<T, C>>,
    limit: usize,
}

impl<T, C: Comparator<T>> FixedSizePq<T, C> {
    pub fn new(limit: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(limit.min(4096)),
            limit,
        }
    }

    pub fn push(&mut self, value: T) {
        if self.limit == 0 {
            return;
        }
        if self.heap.len() < self.limit {
            self.heap.push(Entry {
                value,
                _order: PhantomData,
            });
            return;
        }
        // Full: replace the current extreme if the new value ranks below it.
        let replaces = match self.heap.peek() {
            Some(top) => C::compare(&value, &top.value) == Ordering::Less,
            None => false,
        };
        if replaces {
            self.heap.pop();
            self.heap.push(Entry {
                value,
                _order: PhantomData,
            });
        }
    }

    pub fn top(&self) -> Option<&T> {
        self.heap.peek().map(|e| &e.value)
    }

    pub fn pop(&mut self) -> Option<T> {
        self.heap.pop().map(|e| e.value)
    }

    pub fn size(&self) -> usize {
        self.heap.len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}
