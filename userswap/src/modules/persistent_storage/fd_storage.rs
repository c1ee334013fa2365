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

use std::{io, os::fd::RawFd};

use libc::{c_void, off_t};

use super::PersistentStorageModule;
use crate::util::PAGE_SIZE;

/// Storage module on top of a file descriptor that is owned by someone else.
///
/// The descriptor is never closed by this module.
pub struct FdPersistentStorageModule {
    fd: RawFd,
}

impl FdPersistentStorageModule {
    pub fn new(fd: RawFd) -> Self {
        Self { fd }
    }

    /// Transfers the first `size` bytes through the descriptor in both directions:
    /// everything is read and written back again, missing bytes at the end of the file
    /// are written as zeroes.
    ///
    /// Afterwards the descriptor holds content for every page of `[0, size)`.
    pub fn prime(&mut self, size: usize) -> Result<(), ()> {
        let mut buffer = [0u8; PAGE_SIZE];

        for offset in (0..size).step_by(PAGE_SIZE) {
            let len = PAGE_SIZE.min(size - offset);
            let chunk = &mut buffer[..len];

            let read = self.read_partial(offset, chunk)?;
            chunk[read..].fill(0);

            self.write(offset, chunk)?;
        }

        Ok(())
    }

    /// Reads as many bytes as available (until `dest` is full or EOF is reached)
    fn read_partial(&mut self, offset: usize, dest: &mut [u8]) -> Result<usize, ()> {
        let mut done = 0;

        while done < dest.len() {
            let res = unsafe {
                libc::pread(
                    self.fd,
                    dest[done..].as_mut_ptr() as *mut c_void,
                    dest.len() - done,
                    (offset + done) as off_t,
                )
            };

            if res < 0 {
                if io::Error::last_os_error().kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(());
            }

            if res == 0 {
                // end of file
                break;
            }

            done += res as usize;
        }

        Ok(done)
    }
}

impl PersistentStorageModule for FdPersistentStorageModule {
    fn read(&mut self, offset: usize, dest: &mut [u8]) -> Result<(), ()> {
        if self.read_partial(offset, dest)? != dest.len() {
            // descriptor is shorter than expected
            return Err(());
        }

        Ok(())
    }

    fn write(&mut self, offset: usize, src: &[u8]) -> Result<(), ()> {
        let mut done = 0;

        while done < src.len() {
            let res = unsafe {
                libc::pwrite(
                    self.fd,
                    src[done..].as_ptr() as *const c_void,
                    src.len() - done,
                    (offset + done) as off_t,
                )
            };

            if res < 0 {
                if io::Error::last_os_error().kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(());
            }

            done += res as usize;
        }

        Ok(())
    }

    fn get_max_size(&self) -> usize {
        let mut stat: libc::stat = unsafe { core::mem::zeroed() };
        if unsafe { libc::fstat(self.fd, &mut stat) } != 0 {
            return 0;
        }

        stat.st_size as usize
    }
}
