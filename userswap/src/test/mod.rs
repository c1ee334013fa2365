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
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    path::PathBuf,
};

use crate::{
    modules::platform::EmulatedPlatformModule, FaultOutcome, PageState, UserSwap,
    UserSwapConfig, PAGE_SIZE,
};


pub(crate) fn init_test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a pager on top of the emulated platform, faults have to be injected
pub(crate) fn get_test_swap(resident_pages: usize) -> UserSwap<EmulatedPlatformModule> {
    init_test_logger();

    UserSwap::with_platform(
        EmulatedPlatformModule::new(),
        UserSwapConfig {
            resident_limit: resident_pages * PAGE_SIZE,
            swap_dir: PathBuf::from("/tmp"),
            unlink_swap_file: false,
        },
    )
}

/// Creates a file with `content` that is removed from the file system right away
pub(crate) fn get_test_file(test_name: &str, content: &[u8]) -> File {
    let path = format!("/tmp/{}.tmp", test_name);
    let mut file = File::options()
        .read(true)
        .write(true)
        .truncate(true)
        .create(true)
        .open(&path)
        .unwrap();

    file.write_all(content).unwrap();
    let _ = std::fs::remove_file(&path);
    file
}

pub(crate) fn read_file_at(file: &mut File, offset: usize, len: usize) -> Vec<u8> {
    let mut buffer = vec![0u8; len];
    file.seek(SeekFrom::Start(offset as u64)).unwrap();
    file.read_exact(&mut buffer).unwrap();
    buffer
}

/// Reads a byte the way a program would, injecting the fault the access would cause
pub(crate) fn read_byte(swap: &mut UserSwap<EmulatedPlatformModule>, address: usize) -> u8 {
    if swap.page_state(address) == Some(PageState::Unbacked) {
        assert_eq!(swap.simulate_fault(address), FaultOutcome::PagedIn);
    }

    unsafe { *(address as *const u8) }
}

/// Writes a byte the way a program would, injecting the faults the access would cause
pub(crate) fn write_byte(swap: &mut UserSwap<EmulatedPlatformModule>, address: usize, value: u8) {
    if swap.page_state(address) == Some(PageState::Unbacked) {
        assert_eq!(swap.simulate_fault(address), FaultOutcome::PagedIn);
    }
    if swap.page_state(address) == Some(PageState::ResidentClean) {
        assert_eq!(swap.simulate_fault(address), FaultOutcome::Upgraded);
    }

    unsafe { *(address as *mut u8) = value };
}
