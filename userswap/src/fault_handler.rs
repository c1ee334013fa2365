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

use std::{mem, ptr::null_mut, sync::Once};

use libc::{c_int, c_void, siginfo_t, SA_SIGINFO, SIGBUS, SIGSEGV, SIG_DFL};

use crate::{fault_access_point::FaultAccessPoint, util::check_os_result};

/// What happened while resolving a fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
    /// Address is not managed, default fault behaviour applies
    Unmanaged,

    /// Page was not resident and got loaded with read access
    PagedIn,

    /// Page was resident and read-only and is now writable and dirty
    Upgraded,
}

pub(crate) static FAULT_ACCESS_POINT: FaultAccessPoint = FaultAccessPoint::empty();

static INSTALL: Once = Once::new();

/// Installs the signal handler for `SIGSEGV` and `SIGBUS`.
///
/// Can be called multiple times, the handler is only installed once per process.
pub(crate) fn install() {
    INSTALL.call_once(|| {
        for sig in [SIGSEGV, SIGBUS] {
            let mut action: libc::sigaction = unsafe { mem::zeroed() };
            action.sa_sigaction = handle_signal as usize;
            action.sa_flags = SA_SIGINFO;

            unsafe {
                libc::sigemptyset(&mut action.sa_mask);
                check_os_result(
                    libc::sigaction(sig, &action, null_mut()),
                    "install: sigaction error",
                );
            }
        }

        log::debug!("fault handler installed");
    });
}

extern "C" fn handle_signal(sig: c_int, info: *mut siginfo_t, _context: *mut c_void) {
    let address = unsafe { (*info).si_addr() } as usize;

    if FAULT_ACCESS_POINT.dispatch(address) == FaultOutcome::Unmanaged {
        // not ours: crash like there was no handler at all
        unsafe {
            libc::signal(sig, SIG_DFL);
            libc::raise(sig);
        }
    }
}
