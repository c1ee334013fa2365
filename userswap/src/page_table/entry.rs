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

/// Where the content of a page lives while it is not resident
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backing {
    /// Never written back, will be zero-filled on the next page-in
    None,

    /// Stored in the private swap store at `offset`
    Swap { offset: usize },

    /// Stored in the mapped file descriptor `fd` at `offset`
    File { fd: RawFd, offset: usize },
}

/// Life cycle state of a single managed page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// Access is revoked, content (if any) is in the backing store
    Unbacked,

    /// Readable, not modified since it was loaded
    ResidentClean,

    /// Readable and writable, has to be flushed before eviction
    ResidentDirty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PageTableEntry {
    /// base address of the page
    pub(crate) address: usize,
    pub(crate) resident: bool,
    pub(crate) dirty: bool,
    pub(crate) backing: Backing,
}

impl PageTableEntry {
    pub(crate) fn new(address: usize) -> Self {
        Self {
            address,
            resident: false,
            dirty: false,
            backing: Backing::None,
        }
    }

    pub(crate) fn state(&self) -> PageState {
        debug_assert!(!self.dirty || self.resident, "dirty pages have to be resident");

        match (self.resident, self.dirty) {
            (false, _) => PageState::Unbacked,
            (true, false) => PageState::ResidentClean,
            (true, true) => PageState::ResidentDirty,
        }
    }
}
