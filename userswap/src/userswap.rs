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
    os::fd::RawFd,
    path::Path,
    slice,
    sync::atomic::{AtomicUsize, Ordering},
};

use log::{debug, error, trace, warn};
use try_lock::TryLock;

use crate::{
    fault_access_point::FaultTarget,
    fault_handler::{self, FaultOutcome, FAULT_ACCESS_POINT},
    modules::{
        persistent_storage::{FdPersistentStorageModule, PersistentStorageModule},
        platform::{MMapPlatformModule, PlatformModule, Protection},
    },
    page_table::{Backing, PageState, PageTable, PageTableEntry},
    region::{RegionKind, RegionTracker},
    resident_queue::ResidentQueue,
    swap_store::SwapStore,
    util::{checked_round_up_to_page, page_base, PAGE_SIZE},
    UserSwapConfig,
};

/// Used to give every swap file of this process its own name
static INSTANCE_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Tests that bind the real signal handler have to wait for each other
#[cfg(test)]
static FAULT_HANDLER_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// A demand pager for a set of memory regions.
///
/// Memory returned by [`UserSwap::allocate`] and [`UserSwap::map`] starts without any access rights.
/// Pages only get backed by real memory once they are touched and at most
/// `resident_limit` bytes are resident at the same time. Pages that exceed this limit are evicted
/// in the order they became resident, modified content is written to a swap file
/// (or back to the mapped file descriptor).
///
/// Touching managed memory only works after [`UserSwap::install_fault_handler`] was called.
/// Without it, faults can still be injected with [`UserSwap::simulate_fault`].
pub struct UserSwap<P: PlatformModule + 'static = MMapPlatformModule> {
    /// boxed, so the fault handler can keep a pointer to it even if `UserSwap` is moved
    inner: Box<UserSwapInner<P>>,

    /// held while an API call is executed
    busy: Box<TryLock<()>>,

    handler_bound: bool,

    /// For test environment we want to wait until the signal handler is free again
    #[cfg(test)]
    _mutex_guard: Option<std::sync::MutexGuard<'static, ()>>,
}

impl UserSwap<MMapPlatformModule> {
    pub fn new(config: UserSwapConfig) -> Self {
        Self::with_platform(MMapPlatformModule::new(), config)
    }
}

impl<P: PlatformModule + 'static> UserSwap<P> {
    pub fn with_platform(platform: P, config: UserSwapConfig) -> Self {
        let instance = INSTANCE_COUNTER.fetch_add(1, Ordering::SeqCst);
        let swap_path = config
            .swap_dir
            .join(format!("userswap-{}-{}.swap", std::process::id(), instance));

        debug!(
            "new pager with resident limit of {} bytes, swap file {}",
            config.resident_limit,
            swap_path.display()
        );

        Self {
            inner: Box::new(UserSwapInner {
                platform,
                regions: RegionTracker::new(),
                page_table: PageTable::new(),
                resident: ResidentQueue::new(),
                swap: SwapStore::new(swap_path, config.unlink_swap_file),
                resident_limit: config.resident_limit,
                resident_bytes: 0,
            }),
            busy: Box::new(TryLock::new(())),
            handler_bound: false,

            #[cfg(test)]
            _mutex_guard: None,
        }
    }

    /// Binds this pager to the process wide `SIGSEGV`/`SIGBUS` handler.
    ///
    /// Only one pager can be bound at the same time, this fails if another one is bound already.
    /// Calling this multiple times for the same pager has no effect.
    pub fn install_fault_handler(&mut self) -> Result<(), ()> {
        if self.handler_bound {
            return Ok(());
        }

        // for test environment wait until no other pager is bound anymore
        #[cfg(test)]
        let mutex_guard = FAULT_HANDLER_MUTEX
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let target: *mut UserSwapInner<P> = &mut *self.inner;
        let busy: *const TryLock<()> = &*self.busy;
        unsafe { FAULT_ACCESS_POINT.set(target as *mut dyn FaultTarget, busy) }.map_err(|_| {
            warn!("another pager is bound to the fault handler already");
        })?;

        fault_handler::install();
        self.handler_bound = true;

        #[cfg(test)]
        {
            self._mutex_guard = Some(mutex_guard);
        }

        Ok(())
    }

    /// Changes the resident limit and evicts pages until it is not exceeded anymore.
    pub fn set_resident_limit(&mut self, bytes: usize) {
        let Some(_busy) = self.busy.try_lock() else {
            error!("set_resident_limit: pager is busy");
            return;
        };

        self.inner.set_resident_limit(bytes);
    }

    /// Reserves a private, zero-filled region of at least `size` bytes.
    ///
    /// Returns `Err(())` if no address space could be reserved.
    pub fn allocate(&mut self, size: usize) -> Result<*mut u8, ()> {
        let _busy = self.busy.try_lock().ok_or(())?;
        self.inner.allocate(size)
    }

    /// Releases a region previously returned by [`UserSwap::allocate`] or [`UserSwap::map`].
    ///
    /// Modified pages of mapped regions are written back to their file descriptor first.
    pub fn release(&mut self, ptr: *mut u8) {
        let Some(_busy) = self.busy.try_lock() else {
            error!("release: pager is busy");
            return;
        };

        self.inner.release(ptr as usize);
    }

    /// Creates a region of at least `size` bytes whose pages are backed by `fd`.
    ///
    /// Page `i` of the region corresponds to offset `i * PAGE_SIZE` of the descriptor.
    /// The descriptor is not closed by the pager and has to stay open until the region is released.
    pub fn map(&mut self, fd: RawFd, size: usize) -> Result<*mut u8, ()> {
        let _busy = self.busy.try_lock().ok_or(())?;
        self.inner.map(fd, size)
    }

    /// Resolves a fault at `address` exactly like the signal handler would.
    pub fn simulate_fault(&mut self, address: usize) -> FaultOutcome {
        let Some(_busy) = self.busy.try_lock() else {
            return FaultOutcome::Unmanaged;
        };

        self.inner.handle_fault(address)
    }

    pub fn resident_limit(&self) -> usize {
        self.inner.resident_limit
    }

    /// Amount of bytes that are currently resident
    pub fn resident_bytes(&self) -> usize {
        self.inner.resident_bytes
    }

    /// Returns the state of the page containing `address` or `None` if it is not managed
    pub fn page_state(&self, address: usize) -> Option<PageState> {
        self.inner
            .page_table
            .get(address)
            .map(|entry| entry.state())
    }

    /// Returns the backing of the page containing `address` or `None` if it is not managed
    pub fn page_backing(&self, address: usize) -> Option<Backing> {
        self.inner
            .page_table
            .get(address)
            .map(|entry| entry.backing)
    }

    /// Base addresses of all resident pages, oldest first
    pub fn resident_pages(&self) -> Vec<usize> {
        self.inner.resident.iter().copied().collect()
    }

    /// Usable size of the region starting at `ptr`
    pub fn region_size(&self, ptr: *const u8) -> Option<usize> {
        self.inner
            .regions
            .find_by_base(ptr as usize)
            .map(|region| region.size)
    }

    /// Current size of the swap file in bytes
    pub fn swap_store_size(&self) -> usize {
        self.inner.swap.size()
    }

    /// Number of swap file offsets that were reclaimed and wait for reuse
    pub fn free_swap_offsets(&self) -> usize {
        self.inner.swap.free_offset_count()
    }

    /// Path the swap file is (or will be) created at
    pub fn swap_file_path(&self) -> &Path {
        self.inner.swap.path()
    }

    /// Number of nodes the page table currently consists of
    pub fn page_table_node_count(&self) -> usize {
        self.inner.page_table.node_count()
    }

    pub fn platform(&self) -> &P {
        &self.inner.platform
    }
}

impl<P: PlatformModule + 'static> Drop for UserSwap<P> {
    fn drop(&mut self) {
        if self.handler_bound && FAULT_ACCESS_POINT.unset().is_err() {
            error!("could not unbind pager from fault handler");
        }

        self.inner.release_all();
    }
}

pub(crate) struct UserSwapInner<P: PlatformModule> {
    platform: P,
    regions: RegionTracker,
    page_table: PageTable,
    resident: ResidentQueue,
    swap: SwapStore,
    resident_limit: usize,
    resident_bytes: usize,
}

impl<P: PlatformModule> UserSwapInner<P> {
    fn set_resident_limit(&mut self, bytes: usize) {
        debug!("set resident limit to {} bytes", bytes);
        self.resident_limit = bytes;

        while self.resident_bytes > self.resident_limit && !self.resident.is_empty() {
            self.evict();
        }
    }

    fn allocate(&mut self, size: usize) -> Result<*mut u8, ()> {
        let size = checked_round_up_to_page(size).ok_or_else(|| {
            warn!("allocate: {} bytes exceed the address space", size);
        })?;
        let ptr = self.platform.reserve(size).map_err(|_| {
            warn!("allocate: could not reserve {} bytes", size);
        })?;

        self.register_region(ptr as usize, size, RegionKind::Anonymous);
        debug!("allocated {} bytes at {:p}", size, ptr);

        Ok(ptr)
    }

    fn map(&mut self, fd: RawFd, size: usize) -> Result<*mut u8, ()> {
        let size = checked_round_up_to_page(size).ok_or_else(|| {
            warn!("map: {} bytes exceed the address space", size);
        })?;

        FdPersistentStorageModule::new(fd).prime(size).map_err(|_| {
            warn!("map: could not transfer {} bytes through fd {}", size, fd);
        })?;

        let ptr = self.platform.reserve(size).map_err(|_| {
            warn!("map: could not reserve {} bytes", size);
        })?;

        self.register_region(ptr as usize, size, RegionKind::FileBacked { fd });
        debug!("mapped {} bytes of fd {} at {:p}", size, fd, ptr);

        Ok(ptr)
    }

    fn register_region(&mut self, base: usize, size: usize, kind: RegionKind) {
        let id = self.regions.register(base, size, kind);
        let Some(region) = self.regions.get(id).copied() else {
            return;
        };

        for page in region.pages() {
            let entry = self.page_table.get_or_insert(page);
            entry.backing = match kind {
                RegionKind::Anonymous => Backing::None,
                RegionKind::FileBacked { fd } => Backing::File {
                    fd,
                    offset: page - base,
                },
            };
        }

        // the fault handler should never have to grow the queue
        let managed_pages: usize = self.regions.iter().map(|region| region.size / PAGE_SIZE).sum();
        self.resident
            .reserve(managed_pages.saturating_sub(self.resident.len()));
    }

    fn release(&mut self, base: usize) {
        let Some(region) = self.regions.unregister(base) else {
            warn!("release: {:#x} is not the start of a managed region", base);
            return;
        };

        let removed = self.resident.remove_range(region.base..region.base + region.size);
        trace!("release: {} resident pages dropped from queue", removed);

        // anonymous content is not needed anymore
        let flush = matches!(region.kind, RegionKind::FileBacked { .. });

        for page in region.pages() {
            let Some(entry) = self.page_table.get(page).copied() else {
                continue;
            };

            if entry.resident {
                self.evict_page(page, flush);
            }

            if let Some(PageTableEntry {
                backing: Backing::Swap { offset },
                ..
            }) = self.page_table.remove(page)
            {
                self.swap.release_offset(offset);
            }
        }

        unsafe { self.platform.unreserve(base as *mut u8, region.size) };
        debug!(
            "released {} bytes at {:#x}, {} regions left",
            region.size,
            base,
            self.regions.len()
        );
    }

    fn release_all(&mut self) {
        let bases: Vec<usize> = self.regions.iter().map(|region| region.base).collect();
        for base in bases {
            self.release(base);
        }
    }

    /// Evicts the page that became resident first
    fn evict(&mut self) {
        if let Some(page) = self.resident.pop_front() {
            self.evict_page(page, true);
        }
    }

    /// Evicts `page`, which was already removed from the resident queue.
    ///
    /// If `flush` is set, modified content is written to the backing store first.
    fn evict_page(&mut self, page: usize, flush: bool) {
        let Self {
            platform,
            page_table,
            swap,
            resident_bytes,
            ..
        } = self;

        let Some(entry) = page_table.get_mut(page) else {
            error!("evict: page {:#x} has no page table entry", page);
            return;
        };
        debug_assert!(entry.resident, "only resident pages can be evicted");

        if entry.dirty && flush && flush_page(entry, swap).is_err() {
            error!("evict: could not write back page {:#x}", page);
        }

        unsafe {
            platform.discard(page as *mut u8, PAGE_SIZE);
            platform.protect(page as *mut u8, PAGE_SIZE, Protection::None);
        }

        entry.resident = false;
        entry.dirty = false;
        *resident_bytes -= PAGE_SIZE;

        trace!("evicted page {:#x}", page);
    }

    fn handle_fault(&mut self, address: usize) -> FaultOutcome {
        if self.regions.region_of(address).is_none() {
            return FaultOutcome::Unmanaged;
        }

        let page = page_base(address);
        let Some(entry) = self.page_table.get(page).copied() else {
            return FaultOutcome::Unmanaged;
        };

        if entry.resident {
            // only happens on write access to a read-only page
            unsafe {
                self.platform
                    .protect(page as *mut u8, PAGE_SIZE, Protection::ReadWrite)
            };
            if let Some(entry) = self.page_table.get_mut(page) {
                entry.dirty = true;
            }

            trace!("page {:#x} is dirty now", page);
            return FaultOutcome::Upgraded;
        }

        while self.resident_bytes + PAGE_SIZE > self.resident_limit && !self.resident.is_empty() {
            self.evict();
        }

        self.load_page(page, entry.backing);

        if let Some(entry) = self.page_table.get_mut(page) {
            entry.resident = true;
        }
        self.resident.push_back(page);
        self.resident_bytes += PAGE_SIZE;

        trace!("paged in {:#x}, {} pages resident", page, self.resident.len());
        FaultOutcome::PagedIn
    }

    /// Fills `page` with its content from `backing` and makes it readable
    fn load_page(&mut self, page: usize, backing: Backing) {
        let ptr = page as *mut u8;

        unsafe { self.platform.protect(ptr, PAGE_SIZE, Protection::ReadWrite) };

        let dest = unsafe { slice::from_raw_parts_mut(ptr, PAGE_SIZE) };
        let res = match backing {
            // fresh or discarded memory is zero-filled already
            Backing::None => Ok(()),
            Backing::Swap { offset } => self.swap.read_page(offset, dest),
            Backing::File { fd, offset } => FdPersistentStorageModule::new(fd).read(offset, dest),
        };

        if res.is_err() {
            error!("page in: could not read page {:#x} from {:?}", page, backing);
        }

        unsafe { self.platform.protect(ptr, PAGE_SIZE, Protection::Read) };
    }
}

/// Writes the content of the resident page `entry` to its backing store,
/// a swap offset is assigned first if the page has no backing yet.
fn flush_page(entry: &mut PageTableEntry, swap: &mut SwapStore) -> Result<(), ()> {
    let content = unsafe { slice::from_raw_parts(entry.address as *const u8, PAGE_SIZE) };

    match entry.backing {
        Backing::None => {
            let offset = swap.allocate_offset()?;
            entry.backing = Backing::Swap { offset };
            swap.write_page(offset, content)
        }
        Backing::Swap { offset } => swap.write_page(offset, content),
        Backing::File { fd, offset } => FdPersistentStorageModule::new(fd).write(offset, content),
    }
}

impl<P: PlatformModule> FaultTarget for UserSwapInner<P> {
    fn handle_fault(&mut self, address: usize) -> FaultOutcome {
        UserSwapInner::handle_fault(self, address)
    }
}
