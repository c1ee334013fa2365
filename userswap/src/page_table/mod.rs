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

//! Software page table: a 4-level radix trie over the virtual page number.
//!
//! Every level consumes 9 bits of the page number (after dropping the 12 offset bits),
//! so together with the page offset this covers 48 bit virtual addresses.
//! Nodes live in an arena and are addressed by [`NodeId`]. Every node counts its populated
//! slots, so empty nodes can be freed again once the last entry below them is removed.

mod entry;

pub use entry::{Backing, PageState};
pub(crate) use entry::PageTableEntry;

use static_assertions::const_assert;

use crate::util::{page_base, PAGE_SHIFT};

const LEVEL_BITS: u32 = 9;
const ENTRIES_PER_NODE: usize = 1 << LEVEL_BITS;
pub(crate) const LEVELS: usize = 4;

const_assert!(ENTRIES_PER_NODE == 512);
const_assert!(LEVELS as u32 * LEVEL_BITS + PAGE_SHIFT == 48);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NodeId(usize);

enum NodeSlots {
    /// Arena slot is currently unused
    Free,
    Inner(Box<[Option<NodeId>; ENTRIES_PER_NODE]>),
    Leaf(Box<[Option<PageTableEntry>; ENTRIES_PER_NODE]>),
}

struct PageTableNode {
    /// number of populated slots
    filled: usize,
    slots: NodeSlots,
}

/// Returns the slot index of `address` at `level` (4 is the root, 1 the leaf level)
fn index_of(address: usize, level: usize) -> usize {
    let page_number = address >> PAGE_SHIFT;
    (page_number >> (LEVEL_BITS as usize * (level - 1))) & (ENTRIES_PER_NODE - 1)
}

pub(crate) struct PageTable {
    nodes: Vec<PageTableNode>,
    free_nodes: Vec<usize>,
    root: NodeId,
}

impl PageTable {
    pub(crate) fn new() -> Self {
        let mut table = Self {
            nodes: Vec::new(),
            free_nodes: Vec::new(),
            root: NodeId(0),
        };
        table.root = table.alloc_node(LEVELS);
        table
    }

    /// Returns the entry of the page containing `address`, creating it
    /// (and all intermediate nodes) if it does not exist yet.
    pub(crate) fn get_or_insert(&mut self, address: usize) -> &mut PageTableEntry {
        let mut node = self.root;

        for level in (2..=LEVELS).rev() {
            let index = index_of(address, level);
            let existing = self.children(node)[index];

            node = match existing {
                Some(child) => child,
                None => {
                    let child = self.alloc_node(level - 1);
                    let parent = &mut self.nodes[node.0];
                    let NodeSlots::Inner(children) = &mut parent.slots else {
                        unreachable!("upper levels only contain inner nodes");
                    };
                    children[index] = Some(child);
                    parent.filled += 1;
                    child
                }
            };
        }

        let PageTableNode { filled, slots } = &mut self.nodes[node.0];
        let NodeSlots::Leaf(entries) = slots else {
            unreachable!("level 1 only contains leaf nodes");
        };

        let slot = &mut entries[index_of(address, 1)];
        if slot.is_none() {
            *filled += 1;
        }
        slot.get_or_insert_with(|| PageTableEntry::new(page_base(address)))
    }

    pub(crate) fn get(&self, address: usize) -> Option<&PageTableEntry> {
        let leaf = self.find_leaf(address)?;
        match &self.nodes[leaf.0].slots {
            NodeSlots::Leaf(entries) => entries[index_of(address, 1)].as_ref(),
            _ => None,
        }
    }

    /// Same as [`Self::get`] but never allocates, so it can be used while handling a fault
    pub(crate) fn get_mut(&mut self, address: usize) -> Option<&mut PageTableEntry> {
        let leaf = self.find_leaf(address)?;
        match &mut self.nodes[leaf.0].slots {
            NodeSlots::Leaf(entries) => entries[index_of(address, 1)].as_mut(),
            _ => None,
        }
    }

    /// Removes the entry of `address` and frees every ancestor node that became empty.
    pub(crate) fn remove(&mut self, address: usize) -> Option<PageTableEntry> {
        // path[depth] = (node, slot index inside node), depth 0 is the root
        let mut path = [(self.root, 0usize); LEVELS];
        let mut node = self.root;

        for (depth, level) in (1..=LEVELS).rev().enumerate() {
            let index = index_of(address, level);
            path[depth] = (node, index);

            if level > 1 {
                node = self.children(node)[index]?;
            }
        }

        let (leaf, index) = path[LEVELS - 1];
        let removed = {
            let PageTableNode { filled, slots } = &mut self.nodes[leaf.0];
            let NodeSlots::Leaf(entries) = slots else {
                unreachable!("level 1 only contains leaf nodes");
            };
            let removed = entries[index].take()?;
            *filled -= 1;
            removed
        };

        // invariant: path[depth].0 just lost one populated slot
        let mut depth = LEVELS - 1;
        while depth > 0 && self.nodes[path[depth].0 .0].filled == 0 {
            self.free_node(path[depth].0);
            depth -= 1;

            let (parent, index) = path[depth];
            let PageTableNode { filled, slots } = &mut self.nodes[parent.0];
            if let NodeSlots::Inner(children) = slots {
                children[index] = None;
            }
            *filled -= 1;
        }

        Some(removed)
    }

    /// Number of currently allocated trie nodes (including the root)
    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len() - self.free_nodes.len()
    }

    fn find_leaf(&self, address: usize) -> Option<NodeId> {
        let mut node = self.root;
        for level in (2..=LEVELS).rev() {
            node = self.children(node)[index_of(address, level)]?;
        }
        Some(node)
    }

    fn children(&self, node: NodeId) -> &[Option<NodeId>; ENTRIES_PER_NODE] {
        match &self.nodes[node.0].slots {
            NodeSlots::Inner(children) => children,
            _ => unreachable!("expected an inner node"),
        }
    }

    fn alloc_node(&mut self, level: usize) -> NodeId {
        let slots = if level == 1 {
            NodeSlots::Leaf(Box::new([None; ENTRIES_PER_NODE]))
        } else {
            NodeSlots::Inner(Box::new([None; ENTRIES_PER_NODE]))
        };
        let node = PageTableNode { filled: 0, slots };

        match self.free_nodes.pop() {
            Some(index) => {
                self.nodes[index] = node;
                NodeId(index)
            }
            None => {
                self.nodes.push(node);
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    fn free_node(&mut self, node: NodeId) {
        debug_assert!(node != self.root, "the root node is never freed");
        debug_assert_eq!(self.nodes[node.0].filled, 0);

        // dropping the slot array releases its memory
        self.nodes[node.0].slots = NodeSlots::Free;
        self.free_nodes.push(node.0);
    }
}

#[cfg(test)]
mod test {
    use super::{index_of, PageTable, LEVELS};
    use crate::{page_table::Backing, PAGE_SIZE};

    #[test]
    fn test_index_of() {
        let address = (3 << 39) | (5 << 30) | (7 << 21) | (11 << 12) | 0x123;

        assert_eq!(index_of(address, 4), 3);
        assert_eq!(index_of(address, 3), 5);
        assert_eq!(index_of(address, 2), 7);
        assert_eq!(index_of(address, 1), 11);
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut table = PageTable::new();
        assert_eq!(table.node_count(), 1);
        assert!(table.get(0x7000_1000).is_none());

        let entry = table.get_or_insert(0x7000_1234);
        assert_eq!(entry.address, 0x7000_1000);
        assert!(!entry.resident);
        assert!(!entry.dirty);
        assert_eq!(entry.backing, Backing::None);

        // one new node per level below the root
        assert_eq!(table.node_count(), LEVELS);

        table.get_or_insert(0x7000_1000).dirty = true;
        assert!(table.get(0x7000_1fff).unwrap().dirty);
        assert!(table.get_mut(0x7000_2000).is_none());

        // neighbour page shares all nodes
        table.get_or_insert(0x7000_2000);
        assert_eq!(table.node_count(), LEVELS);
    }

    #[test]
    fn test_remove_prunes_empty_nodes() {
        let mut table = PageTable::new();
        let first = 0x7f00_0000_0000usize;
        // differs in the top level index
        let second = 0x0000_4000_0000usize;

        for i in 0..4 {
            table.get_or_insert(first + i * PAGE_SIZE);
        }
        table.get_or_insert(second);
        assert_eq!(table.node_count(), 1 + 2 * (LEVELS - 1));

        for i in 0..3 {
            let removed = table.remove(first + i * PAGE_SIZE).unwrap();
            assert_eq!(removed.address, first + i * PAGE_SIZE);

            // leaf still holds the last page
            assert_eq!(table.node_count(), 1 + 2 * (LEVELS - 1));
        }

        table.remove(first + 3 * PAGE_SIZE).unwrap();
        assert_eq!(table.node_count(), 1 + (LEVELS - 1));
        assert!(table.get(first).is_none());
        assert!(table.remove(first).is_none());

        table.remove(second).unwrap();
        assert_eq!(table.node_count(), 1);

        // freed nodes are reused
        table.get_or_insert(first);
        assert_eq!(table.node_count(), LEVELS);
    }

    #[test]
    fn test_remove_missing_entry_keeps_nodes() {
        let mut table = PageTable::new();
        table.get_or_insert(0x1000);

        assert!(table.remove(0x2000).is_none());
        assert_eq!(table.node_count(), LEVELS);
        assert!(table.get(0x1000).is_some());
    }
}
