use std::{env, io::Read};

use rfreelist::{AllocError, Config, FreeList, Payload, SbrkSegment, UNIT};

/// Waits until the user presses ENTER when running with `--step`.
/// Useful to inspect the process with `pmap` or `gdb` between steps.
fn block_until_enter_pressed(step: bool) {
  if !step {
    return;
  }
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break, the upper boundary of the data segment.
fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    SbrkSegment::program_break(),
  );
}

fn print_alloc(
  list: &FreeList<SbrkSegment>,
  bytes: usize,
  payload: Payload,
) {
  println!(
    "Allocated {} bytes at unit {} ({} usable), {} free blocks, program break = {:?}",
    bytes,
    payload.unit(),
    list.payload_len(payload).unwrap_or(0),
    list.stats().free_blocks,
    SbrkSegment::program_break(),
  );
}

fn allocate(
  list: &mut FreeList<SbrkSegment>,
  bytes: usize,
) -> Result<Payload, AllocError> {
  let payload = list.allocate(bytes)?;
  print_alloc(list, bytes, payload);
  Ok(payload)
}

fn run(step: bool) -> Result<(), AllocError> {
  let mut list = FreeList::with_config(SbrkSegment::new(), Config::default());

  print_program_break("start");
  block_until_enter_pressed(step);

  // 1) A u64: one header unit plus one payload unit, carved from a fresh growth.
  println!("\n[1] Allocate 8 bytes");
  let first = allocate(&mut list, 8)?;
  list.payload_mut(first)?[..8].copy_from_slice(&0x1122334455667788u64.to_ne_bytes());
  block_until_enter_pressed(step);

  // 2) Odd sized request, rounded up to whole units.
  println!("\n[2] Allocate 12 bytes");
  let second = allocate(&mut list, 12)?;
  list.payload_mut(second)?.fill(0xAB);
  block_until_enter_pressed(step);

  // 3) Free the first block and ask for the same size: exact fit, same unit.
  list.deallocate(first)?;
  println!("\n[3] Deallocated unit {}, allocate 8 bytes again", first.unit());
  let third = allocate(&mut list, 8)?;
  println!(
    "[3] third == first? {}",
    if third == first { "Yes, the freed block was reused" } else { "No" }
  );
  block_until_enter_pressed(step);

  // 4) Free a large block, then take a small piece of it: split from its end.
  println!("\n[4] Allocate 1 KiB, free it, allocate 100 bytes");
  let large = allocate(&mut list, 1024)?;
  list.deallocate(large)?;
  let small = allocate(&mut list, 100)?;
  println!(
    "[4] small block ends at unit {}, large block ended at unit {}",
    small.unit() + list.payload_len(small)? / UNIT,
    large.unit() + 1024 / UNIT,
  );
  block_until_enter_pressed(step);

  // 5) Larger than anything free: the data segment grows.
  print_program_break("before large alloc");
  println!("\n[5] Allocate 64 KiB");
  allocate(&mut list, 64 * 1024)?;
  print_program_break("after large alloc");
  println!("[5] {:?}", list.stats());
  block_until_enter_pressed(step);

  println!("\n[6] End of demo. The operating system reclaims the data segment at exit.");
  Ok(())
}

fn main() {
  let filter = env_logger::Env::default().default_filter_or("rfreelist=trace");
  env_logger::Builder::from_env(filter).init();

  let step = env::args().any(|arg| arg == "--step");

  if let Err(error) = run(step) {
    eprintln!("demo failed: {error}");
    std::process::exit(1);
  }
}
