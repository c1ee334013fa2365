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

mod emulated;
mod mmap;

pub use emulated::EmulatedPlatformModule;
pub use mmap::MMapPlatformModule;

/// Access rights of a managed page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    None,
    Read,
    ReadWrite,
}

/// A module that provides the OS primitives the pager is built on
/// (e.g. through `mmap`, `mprotect` and `madvise`)
///
/// All sizes passed to these functions are multiples of [`crate::PAGE_SIZE`]
/// and all pointers are page aligned.
pub trait PlatformModule {
    /// Reserves `size` bytes of address space without any access rights.
    ///
    /// Memory is zero-filled once it becomes accessible.
    fn reserve(&mut self, size: usize) -> Result<*mut u8, ()>;

    /// Gives a region that was returned by [`PlatformModule::reserve`] back.
    unsafe fn unreserve(&mut self, ptr: *mut u8, size: usize);

    /// Changes the access rights of `[ptr, ptr + size)`.
    unsafe fn protect(&mut self, ptr: *mut u8, size: usize, protection: Protection);

    /// Drops the physical memory behind `[ptr, ptr + size)`.
    ///
    /// The content does not need to be preserved, the next access sees zeroes.
    unsafe fn discard(&mut self, ptr: *mut u8, size: usize);
}
