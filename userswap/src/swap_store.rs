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

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::{
    modules::persistent_storage::{FilePersistentStorageModule, PersistentStorageModule},
    util::PAGE_SIZE,
};

/// Private backing store for evicted anonymous pages.
///
/// The backing file is only created once the first page has to be written.
/// Every page that got an offset keeps it until its region is released,
/// released offsets are reused before the file grows any further.
pub(crate) struct SwapStore {
    path: PathBuf,

    /// remove the directory entry right after creating the file
    unlink: bool,

    storage: Option<FilePersistentStorageModule>,

    free_offsets: Vec<usize>,
}

impl SwapStore {
    pub(crate) fn new(path: PathBuf, unlink: bool) -> Self {
        Self {
            path,
            unlink,
            storage: None,
            free_offsets: Vec::new(),
        }
    }

    /// Returns an offset for a page, either a reclaimed one or a newly added one at the end of the file.
    pub(crate) fn allocate_offset(&mut self) -> Result<usize, ()> {
        if let Some(offset) = self.free_offsets.pop() {
            return Ok(offset);
        }

        self.storage()?.add_new_region(PAGE_SIZE)
    }

    /// Makes `offset` available for other pages again
    pub(crate) fn release_offset(&mut self, offset: usize) {
        debug_assert!(offset % PAGE_SIZE == 0);
        debug_assert!(offset < self.size(), "offset was never handed out");
        debug_assert!(!self.free_offsets.contains(&offset), "offset released twice");

        self.free_offsets.push(offset);
    }

    pub(crate) fn read_page(&mut self, offset: usize, dest: &mut [u8]) -> Result<(), ()> {
        self.storage()?.read(offset, dest)
    }

    pub(crate) fn write_page(&mut self, offset: usize, src: &[u8]) -> Result<(), ()> {
        self.storage()?.write(offset, src)
    }

    /// Current size of the backing file in bytes (0 if it was not created yet)
    pub(crate) fn size(&self) -> usize {
        self.storage
            .as_ref()
            .map(|storage| storage.get_max_size())
            .unwrap_or(0)
    }

    pub(crate) fn free_offset_count(&self) -> usize {
        self.free_offsets.len()
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    fn storage(&mut self) -> Result<&mut FilePersistentStorageModule, ()> {
        if self.storage.is_none() {
            let mut storage = FilePersistentStorageModule::new(self.path.clone(), 0).map_err(|err| {
                warn!("could not create swap file {}: {}", self.path.display(), err);
            })?;

            if self.unlink {
                if let Err(err) = storage.unlink() {
                    warn!("could not unlink swap file {}: {}", self.path.display(), err);
                }
            }

            info!("created swap file {}", self.path.display());
            self.storage = Some(storage);
        }

        self.storage.as_mut().ok_or(())
    }
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use super::SwapStore;
    use crate::PAGE_SIZE;

    fn test_path(name: &str) -> PathBuf {
        PathBuf::from(format!("/tmp/{}.swap", name))
    }

    #[test]
    fn test_swap_store_is_created_lazily() {
        let path = test_path("test_swap_store_is_created_lazily");
        let _ = std::fs::remove_file(&path);

        let mut store = SwapStore::new(path.clone(), false);
        assert_eq!(store.size(), 0);
        assert!(!path.exists());

        assert_eq!(store.allocate_offset(), Ok(0));
        assert!(path.exists());
        assert_eq!(store.size(), PAGE_SIZE);

        drop(store);
        assert!(!path.exists());
    }

    #[test]
    fn test_swap_store_reuses_offsets() {
        let mut store = SwapStore::new(test_path("test_swap_store_reuses_offsets"), false);

        let offsets: Vec<usize> = (0..4).map(|_| store.allocate_offset().unwrap()).collect();
        assert_eq!(offsets, vec![0, PAGE_SIZE, 2 * PAGE_SIZE, 3 * PAGE_SIZE]);

        store.release_offset(PAGE_SIZE);
        store.release_offset(3 * PAGE_SIZE);
        assert_eq!(store.free_offset_count(), 2);

        // reclaimed offsets first, file does not grow
        let a = store.allocate_offset().unwrap();
        let b = store.allocate_offset().unwrap();
        let mut reused = vec![a, b];
        reused.sort();
        assert_eq!(reused, vec![PAGE_SIZE, 3 * PAGE_SIZE]);
        assert_eq!(store.size(), 4 * PAGE_SIZE);

        assert_eq!(store.allocate_offset(), Ok(4 * PAGE_SIZE));
        assert_eq!(store.size(), 5 * PAGE_SIZE);
    }

    #[test]
    fn test_swap_store_page_content() {
        let mut store = SwapStore::new(test_path("test_swap_store_page_content"), true);
        let first = store.allocate_offset().unwrap();
        let second = store.allocate_offset().unwrap();
        assert!(!store.path().exists());

        store.write_page(first, &[1u8; PAGE_SIZE]).unwrap();
        store.write_page(second, &[2u8; PAGE_SIZE]).unwrap();

        let mut page = [0u8; PAGE_SIZE];
        store.read_page(first, &mut page).unwrap();
        assert!(page.iter().all(|x| *x == 1));
        store.read_page(second, &mut page).unwrap();
        assert!(page.iter().all(|x| *x == 2));
    }
}
