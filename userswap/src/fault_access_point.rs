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

use try_lock::TryLock;

use crate::fault_handler::FaultOutcome;

/// Something that can resolve access violations inside the memory it manages
pub(crate) trait FaultTarget {
    fn handle_fault(&mut self, address: usize) -> FaultOutcome;
}

/// Connects the process wide signal handler with a single pager instance.
///
/// We need this as the signal handler cannot get any arguments, so we store a pointer
/// to the pager that should handle faults once it is bound.
pub(crate) struct FaultAccessPoint {
    inner: TryLock<Option<FaultAccessPointInner>>,
}

struct FaultAccessPointInner {
    target: *mut dyn FaultTarget,

    /// held by the pager while it executes an API call
    busy: *const TryLock<()>,
}

impl FaultAccessPoint {
    pub(crate) const fn empty() -> Self {
        Self {
            inner: TryLock::new(None),
        }
    }

    /// ### Safety
    ///
    /// You need to make sure that `target` and `busy` remain valid until `unset` is called
    ///
    /// If not, this will result in **Undefined Behavior**!
    pub(crate) unsafe fn set(
        &self,
        target: *mut dyn FaultTarget,
        busy: *const TryLock<()>,
    ) -> Result<(), ()> {
        let mut lock_guard = self.inner.try_lock().ok_or(())?;

        if lock_guard.is_some() {
            // already in use
            return Err(());
        }

        *lock_guard = Some(FaultAccessPointInner { target, busy });

        Ok(())
    }

    pub(crate) fn unset(&self) -> Result<(), ()> {
        // only fails if a fault is handled on another thread right now
        let mut lock_guard = self.inner.try_lock().ok_or(())?;
        *lock_guard = None;

        Ok(())
    }

    /// Forwards a fault at `address` to the bound pager.
    ///
    /// Returns [`FaultOutcome::Unmanaged`] if no pager is bound or the pager is busy.
    /// The latter means the pager itself faulted on memory it manages.
    pub(crate) fn dispatch(&self, address: usize) -> FaultOutcome {
        let lock_guard = match self.inner.try_lock() {
            Some(guard) => guard,
            None => return FaultOutcome::Unmanaged,
        };

        let inner = match lock_guard.as_ref() {
            Some(inner) => inner,
            None => return FaultOutcome::Unmanaged,
        };

        // safe as long as `set` was called correctly
        let busy = unsafe { &*inner.busy };
        let _busy_guard = match busy.try_lock() {
            Some(guard) => guard,
            None => return FaultOutcome::Unmanaged,
        };

        unsafe { (*inner.target).handle_fault(address) }
    }
}

unsafe impl Send for FaultAccessPoint {}
unsafe impl Sync for FaultAccessPoint {}
