/*
 *  Copyright (C) 2025  Markus Elias Gerber
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::{collections::VecDeque, ops::Range};

/// Resident pages in the order they became resident.
///
/// The front is always the page that was loaded first and will be evicted next.
/// Access recency is not tracked.
pub(crate) struct ResidentQueue {
    pages: VecDeque<usize>,
}

impl ResidentQueue {
    pub(crate) fn new() -> Self {
        Self {
            pages: VecDeque::new(),
        }
    }

    /// Makes sure that `additional` more pages can be pushed without reallocating.
    ///
    /// Pushes happen inside the fault handler, where allocating is best avoided.
    pub(crate) fn reserve(&mut self, additional: usize) {
        self.pages.reserve(additional);
    }

    pub(crate) fn push_back(&mut self, page: usize) {
        debug_assert!(!self.pages.contains(&page), "page is already resident");
        self.pages.push_back(page);
    }

    /// Removes the oldest resident page
    pub(crate) fn pop_front(&mut self) -> Option<usize> {
        self.pages.pop_front()
    }

    /// Removes all pages inside `range` and keeps the order of the remaining ones.
    ///
    /// Returns the number of removed pages.
    pub(crate) fn remove_range(&mut self, range: Range<usize>) -> usize {
        let prev_len = self.pages.len();
        self.pages.retain(|page| !range.contains(page));
        prev_len - self.pages.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.pages.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &usize> {
        self.pages.iter()
    }
}

#[cfg(test)]
mod test {
    use super::ResidentQueue;

    #[test]
    fn test_fifo_order() {
        let mut queue = ResidentQueue::new();
        queue.reserve(3);

        queue.push_back(0x1000);
        queue.push_back(0x2000);
        queue.push_back(0x3000);
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.pop_front(), Some(0x1000));
        queue.push_back(0x1000);

        let order: Vec<usize> = queue.iter().copied().collect();
        assert_eq!(order, vec![0x2000, 0x3000, 0x1000]);
    }

    #[test]
    fn test_remove_range() {
        let mut queue = ResidentQueue::new();
        queue.push_back(0x5000);
        queue.push_back(0x1000);
        queue.push_back(0x3000);
        queue.push_back(0x2000);
        queue.push_back(0x4000);

        assert_eq!(queue.remove_range(0x2000..0x4000), 2);
        assert_eq!(queue.remove_range(0x2000..0x4000), 0);

        assert_eq!(queue.pop_front(), Some(0x5000));
        assert_eq!(queue.pop_front(), Some(0x1000));
        assert_eq!(queue.pop_front(), Some(0x4000));
        assert_eq!(queue.pop_front(), None);
        assert!(queue.is_empty());
    }
}
