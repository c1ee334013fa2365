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

use std::path::PathBuf;

use crate::util::DEFAULT_RESIDENT_LIMIT;

pub struct UserSwapConfig {
    /// Maximum amount of bytes of managed memory that may be resident at the same time
    pub resident_limit: usize,

    /// Directory in which the swap file will be created
    pub swap_dir: PathBuf,

    /// Remove the swap file from `swap_dir` right after it was created,
    /// so its storage is freed even if the process crashes
    pub unlink_swap_file: bool,
}

impl Default for UserSwapConfig {
    fn default() -> Self {
        Self {
            resident_limit: DEFAULT_RESIDENT_LIMIT,
            swap_dir: std::env::temp_dir(),
            unlink_swap_file: false,
        }
    }
}
