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

use std::ptr::null_mut;

use libc::{
    c_void, madvise, mmap, mprotect, munmap, MADV_DONTNEED, MAP_ANONYMOUS, MAP_FAILED,
    MAP_NORESERVE, MAP_PRIVATE, PROT_NONE, PROT_READ, PROT_WRITE,
};

use super::{PlatformModule, Protection};
use crate::util::check_os_result;

/// Platform module on top of the real virtual memory primitives of the OS
pub struct MMapPlatformModule;

impl MMapPlatformModule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MMapPlatformModule {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformModule for MMapPlatformModule {
    fn reserve(&mut self, size: usize) -> Result<*mut u8, ()> {
        let base_ptr = unsafe {
            mmap(
                null_mut(),
                size,
                PROT_NONE,
                MAP_PRIVATE | MAP_ANONYMOUS | MAP_NORESERVE,
                -1,
                0,
            )
        };

        if base_ptr == MAP_FAILED {
            check_os_result(-1, "reserve: mmap error");
            return Err(());
        }

        Ok(base_ptr as *mut u8)
    }

    unsafe fn unreserve(&mut self, ptr: *mut u8, size: usize) {
        let code = unsafe { munmap(ptr as *mut c_void, size) };
        check_os_result(code, "unreserve: munmap error");
    }

    unsafe fn protect(&mut self, ptr: *mut u8, size: usize, protection: Protection) {
        let prot = match protection {
            Protection::None => PROT_NONE,
            Protection::Read => PROT_READ,
            Protection::ReadWrite => PROT_READ | PROT_WRITE,
        };

        let code = unsafe { mprotect(ptr as *mut c_void, size, prot) };
        check_os_result(code, "protect: mprotect error");
    }

    unsafe fn discard(&mut self, ptr: *mut u8, size: usize) {
        let code = unsafe { madvise(ptr as *mut c_void, size, MADV_DONTNEED) };
        check_os_result(code, "discard: madvise error");
    }
}

#[cfg(test)]
mod test {
    use core::ptr::slice_from_raw_parts_mut;

    use super::MMapPlatformModule;
    use crate::{
        modules::platform::{PlatformModule, Protection},
        PAGE_SIZE,
    };

    #[test]
    fn test_reserve_protect_discard() {
        let mut platform = MMapPlatformModule::new();
        let ptr = platform.reserve(2 * PAGE_SIZE).unwrap();
        assert_eq!(ptr as usize % PAGE_SIZE, 0);

        unsafe {
            platform.protect(ptr, PAGE_SIZE, Protection::ReadWrite);

            let page = slice_from_raw_parts_mut(ptr, PAGE_SIZE).as_mut().unwrap();
            assert!(page.iter().all(|x| *x == 0));
            page.fill(0x5a);

            platform.protect(ptr, PAGE_SIZE, Protection::Read);
            assert_eq!(*ptr.add(100), 0x5a);

            // content is gone after discarding
            platform.discard(ptr, PAGE_SIZE);
            assert_eq!(*ptr.add(100), 0);

            platform.unreserve(ptr, 2 * PAGE_SIZE);
        }
    }

    #[test]
    fn test_reserve_failure() {
        let mut platform = MMapPlatformModule::new();
        assert!(platform.reserve(0).is_err());
    }
}
