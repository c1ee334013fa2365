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
    fs::{remove_file, File},
    io::{Read, Seek, SeekFrom, Write},
    mem::ManuallyDrop,
    path::{Path, PathBuf},
};

use super::PersistentStorageModule;

/// Storage module backed by a private file that can grow over time
pub struct FilePersistentStorageModule {
    /// underlying file
    file: ManuallyDrop<File>,

    /// path of file, save for deleting file later
    file_path: PathBuf,

    /// cached file size, so no `metadata` call necessary
    file_size: usize,
}

impl FilePersistentStorageModule {
    /// Creates (or truncates) the file at `filepath` and sets its size to `size` bytes
    pub fn new<P: Into<PathBuf>>(filepath: P, size: usize) -> std::io::Result<Self> {
        let file_path = filepath.into();
        let file = File::options()
            .read(true)
            .write(true)
            .truncate(true)
            .create(true)
            .open(&file_path)?;

        file.set_len(size as u64)?;

        Ok(Self {
            file: ManuallyDrop::new(file),
            file_path,
            file_size: size,
        })
    }

    /// Appends `size` bytes to the end of the file and returns the offset of the new region
    pub fn add_new_region(&mut self, size: usize) -> Result<usize, ()> {
        let new_size = self.file_size + size;
        self.file.set_len(new_size as u64).map_err(|_| ())?;

        // memorize previous file size for returning offset
        let prev_size = self.file_size;

        // just increase cached size as file was successfully resized
        self.file_size = new_size;

        Ok(prev_size)
    }

    /// Removes the directory entry of the file right away.
    ///
    /// The file stays usable through the open handle and its storage is freed by the OS
    /// once the handle is closed, even if the process crashes.
    pub fn unlink(&mut self) -> std::io::Result<()> {
        remove_file(&self.file_path)
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

impl PersistentStorageModule for FilePersistentStorageModule {
    fn read(&mut self, offset: usize, dest: &mut [u8]) -> Result<(), ()> {
        debug_assert!(
            offset + dest.len() <= self.file_size,
            "illegal access, offset: {}, len: {}, file_size: {}",
            offset,
            dest.len(),
            self.file_size
        );

        self.file
            .seek(SeekFrom::Start(offset as u64))
            .map_err(|_| ())?;
        self.file.read_exact(dest).map_err(|_| ())?;

        Ok(())
    }

    fn write(&mut self, offset: usize, src: &[u8]) -> Result<(), ()> {
        debug_assert!(
            offset + src.len() <= self.file_size,
            "illegal access, offset: {}, len: {}, file_size: {}",
            offset,
            src.len(),
            self.file_size
        );

        self.file
            .seek(SeekFrom::Start(offset as u64))
            .map_err(|_| ())?;
        self.file.write_all(src).map_err(|_| ())?;

        Ok(())
    }

    fn get_max_size(&self) -> usize {
        self.file_size
    }
}

impl Drop for FilePersistentStorageModule {
    fn drop(&mut self) {
        // drop and close file before removing
        // note that after this call, file should never be accessed again...
        unsafe {
            ManuallyDrop::drop(&mut self.file);
        }

        if self.file_path.exists() {
            let _ = remove_file(&self.file_path);
        }
    }
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use crate::modules::persistent_storage::{
        test::{get_test_storage, test_persistent_storage_normal, PERSISTENT_STORAGE_NORMAL_TEST_SIZE},
        PersistentStorageModule,
    };

    #[test]
    fn test_file_storage_module_normal() {
        let storage = get_test_storage(
            "test_file_storage_module_normal",
            PERSISTENT_STORAGE_NORMAL_TEST_SIZE,
        );
        test_persistent_storage_normal(storage);
    }

    #[test]
    fn test_file_storage_module_grow() {
        let mut storage = get_test_storage("test_file_storage_module_grow", 0);
        assert_eq!(storage.get_max_size(), 0);

        assert_eq!(storage.add_new_region(4096), Ok(0));
        assert_eq!(storage.add_new_region(4096), Ok(4096));
        assert_eq!(storage.get_max_size(), 8192);

        storage.write(4096, &[7u8; 4096]).unwrap();

        // newly added regions start zeroed
        let mut buffer = [1u8; 4096];
        storage.read(0, &mut buffer).unwrap();
        assert!(buffer.iter().all(|x| *x == 0));

        storage.read(4096, &mut buffer).unwrap();
        assert!(buffer.iter().all(|x| *x == 7));
    }

    #[test]
    fn test_file_storage_module_removes_file() {
        let path = "/tmp/test_file_storage_module_removes_file.tmp";
        let storage = get_test_storage("test_file_storage_module_removes_file", 16);
        assert!(Path::new(path).exists());

        drop(storage);
        assert!(!Path::new(path).exists());
    }

    #[test]
    fn test_file_storage_module_unlink() {
        let mut storage = get_test_storage("test_file_storage_module_unlink", 4096);
        storage.unlink().unwrap();
        assert!(!storage.path().exists());

        // still usable through the open handle
        storage.write(100, &[42u8; 10]).unwrap();
        let mut buffer = [0u8; 10];
        storage.read(100, &mut buffer).unwrap();
        assert_eq!(buffer, [42u8; 10]);
    }
}
