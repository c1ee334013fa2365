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

use std::{
    alloc::{alloc_zeroed, dealloc, Layout},
    collections::BTreeMap,
    ptr::write_bytes,
};

use super::{PlatformModule, Protection};
use crate::util::{page_base, PAGE_SIZE};

/// Platform module that only emulates access rights.
///
/// Memory always stays readable and writable, protections are just recorded per page,
/// so the paging logic can be driven through fault injection without any real traps.
pub struct EmulatedPlatformModule {
    /// base address -> size of every reserved block
    blocks: BTreeMap<usize, usize>,

    /// page address -> current protection
    protections: BTreeMap<usize, Protection>,

    discarded_pages: usize,
}

impl EmulatedPlatformModule {
    pub fn new() -> Self {
        Self {
            blocks: BTreeMap::new(),
            protections: BTreeMap::new(),
            discarded_pages: 0,
        }
    }

    /// Returns the recorded protection of the page containing `address`
    /// or `None` if the address was never reserved
    pub fn protection_of(&self, address: usize) -> Option<Protection> {
        self.protections.get(&page_base(address)).copied()
    }

    /// Total amount of pages that were discarded so far
    pub fn discarded_pages(&self) -> usize {
        self.discarded_pages
    }

    /// Number of currently reserved blocks
    pub fn reserved_blocks(&self) -> usize {
        self.blocks.len()
    }
}

impl Default for EmulatedPlatformModule {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformModule for EmulatedPlatformModule {
    fn reserve(&mut self, size: usize) -> Result<*mut u8, ()> {
        if size == 0 {
            return Err(());
        }

        let layout = Layout::from_size_align(size, PAGE_SIZE).map_err(|_| ())?;
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(());
        }

        self.blocks.insert(ptr as usize, size);
        for page in (ptr as usize..ptr as usize + size).step_by(PAGE_SIZE) {
            self.protections.insert(page, Protection::None);
        }

        Ok(ptr)
    }

    unsafe fn unreserve(&mut self, ptr: *mut u8, size: usize) {
        match self.blocks.remove(&(ptr as usize)) {
            Some(reserved) => {
                debug_assert_eq!(reserved, size, "block has to be unreserved as a whole");
            }
            None => {
                log::error!("unreserve: unknown block {:p}", ptr);
                return;
            }
        }

        for page in (ptr as usize..ptr as usize + size).step_by(PAGE_SIZE) {
            self.protections.remove(&page);
        }

        if let Ok(layout) = Layout::from_size_align(size, PAGE_SIZE) {
            unsafe { dealloc(ptr, layout) };
        }
    }

    unsafe fn protect(&mut self, ptr: *mut u8, size: usize, protection: Protection) {
        for page in (ptr as usize..ptr as usize + size).step_by(PAGE_SIZE) {
            match self.protections.get_mut(&page) {
                Some(curr) => *curr = protection,
                None => log::error!("protect: page {:#x} is not reserved", page),
            }
        }
    }

    unsafe fn discard(&mut self, ptr: *mut u8, size: usize) {
        unsafe { write_bytes(ptr, 0, size) };
        self.discarded_pages += size / PAGE_SIZE;
    }
}

impl Drop for EmulatedPlatformModule {
    fn drop(&mut self) {
        for (base, size) in core::mem::take(&mut self.blocks) {
            if let Ok(layout) = Layout::from_size_align(size, PAGE_SIZE) {
                unsafe { dealloc(base as *mut u8, layout) };
            }
        }
    }
}
