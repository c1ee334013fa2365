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

use std::io;

use static_assertions::const_assert;

/// Size of a single managed page in bytes
pub const PAGE_SIZE: usize = 4096;

/// Number of low address bits that make up the offset inside a page
pub(crate) const PAGE_SHIFT: u32 = 12;

const_assert!(PAGE_SIZE == 1 << PAGE_SHIFT);

/// Resident limit that is used if nothing else is configured (2106 pages)
pub const DEFAULT_RESIDENT_LIMIT: usize = 2106 * PAGE_SIZE;

/// efficient way to calculate: ceil(x / y)
pub(crate) fn ceil_div(x: usize, y: usize) -> usize {
    (x + y - 1) / y
}

/// Rounds `size` up to the next multiple of [`PAGE_SIZE`].
pub fn round_up_to_page(size: usize) -> usize {
    ceil_div(size, PAGE_SIZE) * PAGE_SIZE
}

/// Like [`round_up_to_page`], but returns `None` if the rounded size does not fit into `usize`.
pub fn checked_round_up_to_page(size: usize) -> Option<usize> {
    size.checked_add(PAGE_SIZE - 1).map(page_base)
}

/// Returns the base address of the page that contains `address`.
pub(crate) fn page_base(address: usize) -> usize {
    address & !(PAGE_SIZE - 1)
}

/// Reports a failed OS call, but does not stop execution.
///
/// `value` is returned unchanged, so this can wrap calls inline.
pub(crate) fn check_os_result(value: libc::c_int, error_msg: &str) -> libc::c_int {
    if value < 0 {
        log::error!("{}: {}", error_msg, io::Error::last_os_error());
    }

    value
}

#[cfg(test)]
mod test {
    use crate::util::{ceil_div, checked_round_up_to_page, page_base, round_up_to_page, PAGE_SIZE};

    #[test]
    fn test_ceil_div() {
        // just test a bunch of different values
        for y in 1..100 {
            for x in 0..y * 3 {
                let expected_value = if x % y == 0 { x / y } else { (x / y) + 1 };

                assert_eq!(ceil_div(x, y), expected_value);
            }
        }
    }

    #[test]
    fn test_round_up_to_page() {
        assert_eq!(round_up_to_page(0), 0);
        assert_eq!(round_up_to_page(1), PAGE_SIZE);
        assert_eq!(round_up_to_page(PAGE_SIZE - 1), PAGE_SIZE);
        assert_eq!(round_up_to_page(PAGE_SIZE), PAGE_SIZE);
        assert_eq!(round_up_to_page(PAGE_SIZE + 1), 2 * PAGE_SIZE);

        for size in (1..20 * PAGE_SIZE).step_by(997) {
            let rounded = round_up_to_page(size);
            assert_eq!(rounded % PAGE_SIZE, 0);
            assert!(rounded >= size);
            assert!(rounded - size < PAGE_SIZE);
        }
    }

    #[test]
    fn test_checked_round_up_to_page() {
        assert_eq!(checked_round_up_to_page(0), Some(0));
        assert_eq!(checked_round_up_to_page(1), Some(PAGE_SIZE));
        assert_eq!(checked_round_up_to_page(PAGE_SIZE + 1), Some(2 * PAGE_SIZE));

        let last_page = usize::MAX - (PAGE_SIZE - 1);
        assert_eq!(checked_round_up_to_page(last_page), Some(last_page));
        assert_eq!(checked_round_up_to_page(last_page + 1), None);
        assert_eq!(checked_round_up_to_page(usize::MAX), None);
    }

    #[test]
    fn test_page_base() {
        assert_eq!(page_base(0x1000), 0x1000);
        assert_eq!(page_base(0x1fff), 0x1000);
        assert_eq!(page_base(0x2000), 0x2000);
        assert_eq!(page_base(0x2001), 0x2000);
    }
}
