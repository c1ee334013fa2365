use std::{
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    os::fd::AsRawFd,
    ptr,
};

use env_logger::{Builder, Env};
use rand::{rngs::SmallRng, RngCore, SeedableRng};
use userswap::{UserSwap, UserSwapConfig, PAGE_SIZE};

const SEED: u64 = 5446535461589659585;
const PAGES: usize = 64;
const RESIDENT_PAGES: usize = 8;

fn main() {
    Builder::from_env(Env::default())
        .filter_level(log::LevelFilter::Info)
        .format_module_path(false)
        .init();

    let mut swap = UserSwap::new(UserSwapConfig {
        resident_limit: RESIDENT_PAGES * PAGE_SIZE,
        ..Default::default()
    });
    swap.install_fault_handler()
        .expect("no other pager should be bound");

    // anonymous memory: far bigger than the resident limit
    let base = swap.allocate(PAGES * PAGE_SIZE).expect("could not allocate") as usize;
    let mut rand = SmallRng::seed_from_u64(SEED);
    let mut check_states = vec![0u8; PAGES];

    for _ in 0..10_000 {
        let page = rand.next_u32() as usize % PAGES;
        let address = base + page * PAGE_SIZE + (rand.next_u32() as usize % PAGE_SIZE);

        if rand.next_u32() % 4 == 0 {
            let value = rand.next_u32() as u8;
            unsafe { ptr::write_volatile((base + page * PAGE_SIZE) as *mut u8, value) };
            check_states[page] = value;
        } else {
            // touch somewhere else in the page, first byte has to match
            unsafe { ptr::read_volatile(address as *const u8) };
            let value = unsafe { ptr::read_volatile((base + page * PAGE_SIZE) as *const u8) };
            assert_eq!(value, check_states[page]);
        }

        assert!(swap.resident_bytes() <= swap.resident_limit());
    }

    println!(
        "anonymous: {} pages, {} resident, swap file has {} bytes",
        PAGES,
        swap.resident_bytes() / PAGE_SIZE,
        swap.swap_store_size()
    );

    swap.set_resident_limit(2 * PAGE_SIZE);
    println!(
        "after lowering the limit: {} pages resident",
        swap.resident_bytes() / PAGE_SIZE
    );
    swap.release(base as *mut u8);

    // file backed memory
    let path = std::env::temp_dir().join(format!("swap_demo-{}.data", std::process::id()));
    let mut file = File::options()
        .read(true)
        .write(true)
        .truncate(true)
        .create(true)
        .open(&path)
        .expect("could not create demo file");
    file.write_all(b"hello from the file\n").unwrap();

    let mapped = swap.map(file.as_raw_fd(), 4 * PAGE_SIZE).expect("could not map") as usize;
    let first = unsafe { ptr::read_volatile(mapped as *const u8) };
    println!("first mapped byte: {:?}", first as char);

    unsafe {
        for (i, byte) in b"HELLO".iter().enumerate() {
            ptr::write_volatile((mapped + i) as *mut u8, *byte);
        }
    }
    swap.release(mapped as *mut u8);

    let mut content = String::new();
    file.seek(SeekFrom::Start(0)).unwrap();
    file.read_to_string(&mut content).unwrap();
    println!(
        "file after release: {:?}",
        content.trim_end_matches('\0').trim_end()
    );

    drop(file);
    let _ = std::fs::remove_file(&path);
}
