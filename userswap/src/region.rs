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

use std::os::fd::RawFd;

use crate::util::round_up_to_page;

/// What a managed region is backed by while its pages are not resident
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RegionKind {
    /// Private, zero-filled memory that spills to the swap store
    Anonymous,

    /// Pages are loaded from and written back to `fd`
    FileBacked { fd: RawFd },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MemoryRegion {
    pub(crate) base: usize,

    /// Always a multiple of the page size
    pub(crate) size: usize,

    pub(crate) kind: RegionKind,
}

impl MemoryRegion {
    pub(crate) fn contains(&self, address: usize) -> bool {
        address >= self.base && address < self.base + self.size
    }

    /// Iterates over the base addresses of all pages of this region
    pub(crate) fn pages(&self) -> impl Iterator<Item = usize> {
        (self.base..self.base + self.size).step_by(crate::PAGE_SIZE)
    }
}

/// Stable identifier of a region inside a [`RegionTracker`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RegionId(usize);

/// Keeps track of all address ranges that are currently managed.
///
/// Regions are stored in a slot arena, so a [`RegionId`] stays valid until its region is unregistered.
pub(crate) struct RegionTracker {
    slots: Vec<Option<MemoryRegion>>,
    free_slots: Vec<usize>,
}

impl RegionTracker {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
        }
    }

    /// Registers `[base, base + size)`. `size` is rounded up to whole pages.
    pub(crate) fn register(&mut self, base: usize, size: usize, kind: RegionKind) -> RegionId {
        let region = MemoryRegion {
            base,
            size: round_up_to_page(size),
            kind,
        };

        debug_assert!(
            self.iter().all(|other| other.base + other.size <= region.base
                || region.base + region.size <= other.base),
            "regions should never overlap"
        );

        match self.free_slots.pop() {
            Some(index) => {
                self.slots[index] = Some(region);
                RegionId(index)
            }
            None => {
                self.slots.push(Some(region));
                RegionId(self.slots.len() - 1)
            }
        }
    }

    /// Returns the region which contains `address`.
    ///
    /// This is a linear scan, which is fine as long as only a few regions exist.
    pub(crate) fn region_of(&self, address: usize) -> Option<RegionId> {
        self.slots
            .iter()
            .position(|slot| slot.is_some_and(|region| region.contains(address)))
            .map(RegionId)
    }

    pub(crate) fn get(&self, id: RegionId) -> Option<&MemoryRegion> {
        self.slots.get(id.0).and_then(|slot| slot.as_ref())
    }

    /// Returns the region that starts exactly at `base`
    pub(crate) fn find_by_base(&self, base: usize) -> Option<&MemoryRegion> {
        self.iter().find(|region| region.base == base)
    }

    /// Removes the region starting at `base` and returns it
    pub(crate) fn unregister(&mut self, base: usize) -> Option<MemoryRegion> {
        let index = self
            .slots
            .iter()
            .position(|slot| slot.is_some_and(|region| region.base == base))?;

        self.free_slots.push(index);
        self.slots[index].take()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &MemoryRegion> {
        self.slots.iter().filter_map(|slot| slot.as_ref())
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len() - self.free_slots.len()
    }
}
