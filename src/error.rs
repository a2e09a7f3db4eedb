//! Errors surfaced while preparing or executing a remote call batch.

use snafu::Snafu;

use crate::call::{CallArg, CallConv};

/// Everything that can go wrong between submitting a batch and getting its
/// records back. OS-backed variants carry the Win32 last-error code reported
/// by the failing primitive.
#[derive(Debug, Snafu)]
pub enum CallError {
    #[snafu(display(
        "batch shape mismatch: {addresses} addresses, {conventions} conventions, {arg_lists} argument lists"
    ))]
    BatchShapeMismatch {
        addresses: usize,
        conventions: usize,
        arg_lists: usize,
    },

    #[snafu(display("calling convention {convention:?} is not supported on this architecture"))]
    UnsupportedConvention { convention: CallConv },

    #[snafu(display(
        "thiscall needs a 4-byte integer first argument for ECX, got {argument:?}"
    ))]
    InvalidThisArgument { argument: CallArg },

    #[snafu(display("failed to allocate {size} bytes in the target (os error {code})"))]
    RemoteAllocation { size: usize, code: u32 },

    #[snafu(display("failed to write {size} bytes at {address:#x} in the target (os error {code})"))]
    RemoteWrite {
        address: usize,
        size: usize,
        code: u32,
    },

    #[snafu(display("failed to read {size} bytes at {address:#x} from the target (os error {code})"))]
    RemoteRead {
        address: usize,
        size: usize,
        code: u32,
    },

    #[snafu(display("failed to free the region at {address:#x} in the target (os error {code})"))]
    RemoteFree { address: usize, code: u32 },

    #[snafu(display(
        "failed to flush the instruction cache at {address:#x} in the target (os error {code})"
    ))]
    CacheFlush { address: usize, code: u32 },

    #[snafu(display("failed to create the remote thread (os error {code})"))]
    ThreadCreation { code: u32 },

    #[snafu(display("failed to wait for the remote thread (os error {code})"))]
    ThreadWait { code: u32 },

    #[snafu(display("failed to resolve {module}!{symbol} in the target (os error {code})"))]
    Resolve {
        module: String,
        symbol: String,
        code: u32,
    },

    #[snafu(display("failed to encode the call stub"))]
    StubEncoding { source: iced_x86::IcedError },
}
