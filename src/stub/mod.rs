//! Machine-code stub generation.
//!
//! A stub is a position-independent byte sequence written into the target; a
//! fresh remote thread runs it once to execute a whole batch. The only
//! addresses baked into the bytes are each callee's entry point, the target's
//! `GetLastError` / `SetLastError`, and the return-table base, all as absolute
//! immediates. Both back-ends build `iced_x86` instructions and encode them in
//! one block; they are pure functions of the batch and the resolved addresses.

// Both back-ends always compile so either can be unit-tested on any host;
// only the native one is reachable from the executor.
#[cfg_attr(target_pointer_width = "32", allow(dead_code))]
pub(crate) mod x64;
#[cfg_attr(target_pointer_width = "64", allow(dead_code))]
pub(crate) mod x86;

use iced_x86::{BlockEncoder, BlockEncoderOptions, Instruction, InstructionBlock};

use crate::call::{CallArg, CallConv};
use crate::error::CallError;

/// One call of a batch, in emitter form.
pub(crate) struct CallSpec<'a> {
    pub address: usize,
    pub convention: CallConv,
    pub args: &'a [CallArg],
}

/// Remote addresses baked into the stub.
pub(crate) struct StubContext {
    /// Base of the remote return table; call `i` writes its record at
    /// `return_table + i * record size`.
    pub return_table: usize,
    /// The target's `kernel32!GetLastError`.
    pub get_last_error: usize,
    /// The target's `kernel32!SetLastError`.
    pub set_last_error: usize,
}

cfg_if::cfg_if! {
    if #[cfg(target_pointer_width = "64")] {
        pub(crate) use x64::emit;
    } else {
        pub(crate) use x86::emit;
    }
}

// The native emitter's record offsets must agree with the struct the host
// reads back.
mod layout {
    use core::mem::{offset_of, size_of};
    use static_assertions::const_assert_eq;

    use crate::call::ReturnRecord;

    #[cfg(target_pointer_width = "64")]
    use super::x64 as native;
    #[cfg(target_pointer_width = "32")]
    use super::x86 as native;

    const_assert_eq!(native::RECORD_SIZE, size_of::<ReturnRecord>());
    const_assert_eq!(native::OFF_INT_PTR, offset_of!(ReturnRecord, int_ptr));
    const_assert_eq!(native::OFF_INT32, offset_of!(ReturnRecord, int32));
    const_assert_eq!(native::OFF_INT64, offset_of!(ReturnRecord, int64));
    const_assert_eq!(native::OFF_FLOAT, offset_of!(ReturnRecord, float));
    const_assert_eq!(native::OFF_DOUBLE, offset_of!(ReturnRecord, double));
    const_assert_eq!(native::OFF_LAST_ERROR, offset_of!(ReturnRecord, last_error));
}

/// Encodes an instruction block at the given bitness. The stub contains no
/// IP-relative references, so the block can be encoded at base 0 and run at
/// whatever address the target allocation landed on.
fn encode(bitness: u32, instructions: &[Instruction]) -> Result<Vec<u8>, CallError> {
    let block = InstructionBlock::new(instructions, 0);
    BlockEncoder::encode(bitness, block, BlockEncoderOptions::NONE)
        .map(|encoded| encoded.code_buffer)
        .map_err(|source| CallError::StubEncoding { source })
}
