//! End-to-end scenarios against a live target: the test process itself.
//!
//! Opening our own pid gives a real `OpenProcess` handle, so the whole
//! pipeline (resolution through the target, remote allocation, stub
//! execution on a fresh thread, read-back) runs for real while the callees
//! stay under the test's control.

#![cfg(windows)]

use farcall::{call, CallConv, MultiCall, RemoteProcess, WindowsProcess};

fn own_process() -> WindowsProcess {
    WindowsProcess::open(std::process::id()).expect("open own process")
}

#[test]
fn get_current_process_id_round_trips() {
    let process = own_process();
    let address = process
        .resolve("kernel32.dll", "GetCurrentProcessId")
        .expect("resolve GetCurrentProcessId");

    let result = call::<fn() -> u32, _, _>(&process, address, CallConv::WinApi, ()).unwrap();
    assert_eq!(result.value, std::process::id());
    assert_eq!(result.last_error, 0);
}

#[test]
fn lstrlen_counts_a_remote_string() {
    let process = own_process();
    let address = process
        .resolve("kernel32.dll", "lstrlenA")
        .expect("resolve lstrlenA");

    let buffer = process
        .alloc(16, farcall::Protection::ReadWrite)
        .expect("remote buffer");
    process.write(buffer, b"hello\0").expect("write string");

    let result = call::<fn(*const u8) -> i32, _, _>(
        &process,
        address,
        CallConv::WinApi,
        (buffer as *const u8,),
    )
    .unwrap();
    assert_eq!(result.value, 5);

    process.free(buffer).expect("free remote buffer");
}

#[test]
fn last_error_is_zeroed_and_captured_per_call() {
    let process = own_process();
    let set_last_error = process
        .resolve("kernel32.dll", "SetLastError")
        .expect("resolve SetLastError");
    let get_last_error = process
        .resolve("kernel32.dll", "GetLastError")
        .expect("resolve GetLastError");

    let mut batch = MultiCall::new(&process);
    batch
        .add::<fn(u32), _>(set_last_error, CallConv::WinApi, (1234u32,))
        .add::<fn() -> u32, _>(get_last_error, CallConv::WinApi, ())
        .add::<fn(u32), _>(set_last_error, CallConv::WinApi, (0u32,));
    let records = batch.call().unwrap();

    // Call 0 sets 1234 and that value is captured right after it returns.
    assert_eq!(records[0].last_error, 1234);
    // The slot is re-zeroed before every callee, so the middle call reads 0.
    assert_eq!(records[1].int32, 0);
    assert_eq!(records[1].last_error, 0);
    assert_eq!(records[2].last_error, 0);
}

#[test]
fn arguments_cross_the_process_boundary() {
    extern "system" fn sum3(a: u32, b: u32, c: u32) -> u32 {
        a.wrapping_add(b).wrapping_add(c)
    }

    let process = own_process();
    let result = call::<fn(u32, u32, u32) -> u32, _, _>(
        &process,
        sum3 as usize,
        CallConv::WinApi,
        (1u32, 2u32, 3u32),
    )
    .unwrap();
    assert_eq!(result.value, 6);
}

#[cfg(target_arch = "x86_64")]
#[test]
fn doubles_ride_xmm_registers_and_the_stack() {
    extern "system" fn addd(a: f64, b: f64, c: f64, d: f64, e: f64) -> f64 {
        a + b + c + d + e
    }

    let process = own_process();
    let result = call::<fn(f64, f64, f64, f64, f64) -> f64, _, _>(
        &process,
        addd as usize,
        CallConv::X64,
        (1.0, 2.0, 4.0, 8.0, 16.0),
    )
    .unwrap();
    assert_eq!(result.value, 31.0);
}

#[cfg(target_arch = "x86")]
#[test]
fn widening_multiply_returns_in_edx_eax() {
    extern "cdecl" fn mul(a: i32, b: i32) -> i64 {
        i64::from(a) * i64::from(b)
    }

    let process = own_process();
    let result = call::<fn(i32, i32) -> i64, _, _>(
        &process,
        mul as usize,
        CallConv::Cdecl,
        (1_000_000i32, 1_000_000i32),
    )
    .unwrap();
    assert_eq!(result.value, 1_000_000_000_000);
}

#[cfg(target_arch = "x86")]
#[test]
fn stdcall_and_fastcall_sums_agree() {
    extern "stdcall" fn sum_std(a: u32, b: u32, c: u32, d: u32) -> u32 {
        a + b + c + d
    }
    extern "fastcall" fn sum_fast(a: u32, b: u32, c: u32) -> u32 {
        a + b + c
    }

    let process = own_process();
    let std_result = call::<fn(u32, u32, u32, u32) -> u32, _, _>(
        &process,
        sum_std as usize,
        CallConv::StdCall,
        (1u32, 2u32, 3u32, 4u32),
    )
    .unwrap();
    assert_eq!(std_result.value, 10);

    let fast_result = call::<fn(u32, u32, u32) -> u32, _, _>(
        &process,
        sum_fast as usize,
        CallConv::FastCall,
        (10u32, 20u32, 30u32),
    )
    .unwrap();
    assert_eq!(fast_result.value, 60);
}

#[test]
fn raw_and_typed_paths_see_the_same_callee() {
    let process = own_process();
    let address = process
        .resolve("kernel32.dll", "GetCurrentProcessId")
        .expect("resolve GetCurrentProcessId");

    let raw = farcall::call_raw(&process, address, CallConv::WinApi, &[]).unwrap();
    assert_eq!(raw.int32, std::process::id());

    let typed = call::<fn() -> u32, _, _>(&process, address, CallConv::WinApi, ()).unwrap();
    assert_eq!(typed.value, raw.int32);
}
