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

mod fault_access_point;
mod fault_handler;
mod page_table;
mod region;
mod resident_queue;
mod swap_store;
mod userswap;
mod userswap_config;
mod util;

#[cfg(test)]
mod test;

pub use crate::fault_handler::FaultOutcome;
pub use crate::page_table::{Backing, PageState};
pub use crate::userswap::UserSwap;
pub use crate::util::{
    checked_round_up_to_page, round_up_to_page, DEFAULT_RESIDENT_LIMIT, PAGE_SIZE,
};
pub use userswap_config::UserSwapConfig;
pub mod modules;
