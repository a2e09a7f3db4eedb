//! Stub emission for 64-bit targets.
//!
//! Every convention tag except `ThisCall` collapses to the single Microsoft
//! x64 ABI: the first four arguments ride in `RCX`/`RDX`/`R8`/`R9` or
//! `XMM0..XMM3` (the slot index follows the position, not the kind), the rest
//! live in 8-byte stack slots above 32 bytes of shadow space, and RSP is
//! 16-byte aligned at every `call`.

use iced_x86::{Code, Instruction, MemoryOperand, Register};

use super::{encode, CallSpec, StubContext};
use crate::call::{CallArg, CallConv};
use crate::error::CallError;

pub(crate) const RECORD_SIZE: usize = 40;
pub(crate) const OFF_INT_PTR: usize = 0;
pub(crate) const OFF_INT32: usize = 8;
pub(crate) const OFF_INT64: usize = 16;
pub(crate) const OFF_FLOAT: usize = 24;
pub(crate) const OFF_DOUBLE: usize = 28;
pub(crate) const OFF_LAST_ERROR: usize = 36;

const SHADOW_SPACE: usize = 0x20;
const INT_REGS: [Register; 4] = [Register::RCX, Register::RDX, Register::R8, Register::R9];
const XMM_REGS: [Register; 4] = [Register::XMM0, Register::XMM1, Register::XMM2, Register::XMM3];

pub(crate) fn emit(calls: &[CallSpec], ctx: &StubContext) -> Result<Vec<u8>, CallError> {
    let mut code = Vec::new();

    // One frame serves the whole batch. The thread entry leaves RSP 8 short
    // of 16-byte alignment; after the two saves the frame re-biases by 8 so
    // RSP is aligned at every call below.
    let frame = frame_size(calls);
    code.push(Instruction::with1(Code::Push_r64, Register::RBP).unwrap());
    code.push(Instruction::with2(Code::Mov_r64_rm64, Register::RBP, Register::RSP).unwrap());
    code.push(Instruction::with1(Code::Push_r64, Register::RBX).unwrap());
    code.push(Instruction::with2(Code::Sub_rm64_imm32, Register::RSP, frame).unwrap());

    for (index, call) in calls.iter().enumerate() {
        if call.convention == CallConv::ThisCall {
            return Err(CallError::UnsupportedConvention {
                convention: call.convention,
            });
        }
        emit_call(&mut code, call, ctx, ctx.return_table + index * RECORD_SIZE);
    }

    code.push(Instruction::with2(Code::Add_rm64_imm32, Register::RSP, frame).unwrap());
    code.push(Instruction::with1(Code::Pop_r64, Register::RBX).unwrap());
    code.push(Instruction::with1(Code::Pop_r64, Register::RBP).unwrap());
    code.push(Instruction::with(Code::Retnq));

    encode(64, &code)
}

fn frame_size(calls: &[CallSpec]) -> i32 {
    let spill_slots = calls
        .iter()
        .map(|call| call.args.len().saturating_sub(INT_REGS.len()))
        .max()
        .unwrap_or(0);
    let frame = (SHADOW_SPACE + 8 * spill_slots + 15) & !15;
    (frame + 8) as i32
}

fn emit_call(code: &mut Vec<Instruction>, call: &CallSpec, ctx: &StubContext, record: usize) {
    // RBX holds this call's record slot; it is non-volatile, so it survives
    // the callee and the error-slot calls.
    code.push(Instruction::with2(Code::Mov_r64_imm64, Register::RBX, record as u64).unwrap());

    // SetLastError(0), so an untouched error slot reads back as zero.
    code.push(Instruction::with2(Code::Xor_r32_rm32, Register::ECX, Register::ECX).unwrap());
    code.push(
        Instruction::with2(Code::Mov_r64_imm64, Register::RAX, ctx.set_last_error as u64).unwrap(),
    );
    code.push(Instruction::with1(Code::Call_rm64, Register::RAX).unwrap());

    // Spill slots first; RAX stays free as scratch for the register loads.
    for (position, arg) in call.args.iter().enumerate().skip(INT_REGS.len()) {
        let slot = (SHADOW_SPACE + 8 * (position - INT_REGS.len())) as i64;
        code.push(Instruction::with2(Code::Mov_r64_imm64, Register::RAX, arg.bits64()).unwrap());
        code.push(
            Instruction::with2(
                Code::Mov_rm64_r64,
                MemoryOperand::with_base_displ(Register::RSP, slot),
                Register::RAX,
            )
            .unwrap(),
        );
    }

    // Register bank selection is positional; the parallel register in the
    // other bank is left as-is.
    for (position, arg) in call.args.iter().take(INT_REGS.len()).enumerate() {
        match *arg {
            CallArg::I32(value) => code.push(
                Instruction::with2(Code::Mov_r64_imm64, INT_REGS[position], u64::from(value))
                    .unwrap(),
            ),
            CallArg::I64(value) => code
                .push(Instruction::with2(Code::Mov_r64_imm64, INT_REGS[position], value).unwrap()),
            CallArg::F32(value) => {
                code.push(
                    Instruction::with2(Code::Mov_r32_imm32, Register::EAX, value.to_bits())
                        .unwrap(),
                );
                code.push(
                    Instruction::with2(Code::Movd_xmm_rm32, XMM_REGS[position], Register::EAX)
                        .unwrap(),
                );
            }
            CallArg::F64(value) => {
                code.push(
                    Instruction::with2(Code::Mov_r64_imm64, Register::RAX, value.to_bits())
                        .unwrap(),
                );
                code.push(
                    Instruction::with2(Code::Movq_xmm_rm64, XMM_REGS[position], Register::RAX)
                        .unwrap(),
                );
            }
        }
    }

    code.push(Instruction::with2(Code::Mov_r64_imm64, Register::RAX, call.address as u64).unwrap());
    code.push(Instruction::with1(Code::Call_rm64, Register::RAX).unwrap());

    // Harvest every return channel before anything can disturb RAX or XMM0.
    code.push(store64(OFF_INT_PTR, Register::RAX));
    code.push(store32(OFF_INT32, Register::EAX));
    code.push(store64(OFF_INT64, Register::RAX));
    code.push(
        Instruction::with2(
            Code::Movss_xmmm32_xmm,
            MemoryOperand::with_base_displ(Register::RBX, OFF_FLOAT as i64),
            Register::XMM0,
        )
        .unwrap(),
    );
    code.push(
        Instruction::with2(
            Code::Movsd_xmmm64_xmm,
            MemoryOperand::with_base_displ(Register::RBX, OFF_DOUBLE as i64),
            Register::XMM0,
        )
        .unwrap(),
    );

    code.push(
        Instruction::with2(Code::Mov_r64_imm64, Register::RAX, ctx.get_last_error as u64).unwrap(),
    );
    code.push(Instruction::with1(Code::Call_rm64, Register::RAX).unwrap());
    code.push(store32(OFF_LAST_ERROR, Register::EAX));
}

fn store64(offset: usize, register: Register) -> Instruction {
    Instruction::with2(
        Code::Mov_rm64_r64,
        MemoryOperand::with_base_displ(Register::RBX, offset as i64),
        register,
    )
    .unwrap()
}

fn store32(offset: usize, register: Register) -> Instruction {
    Instruction::with2(
        Code::Mov_rm32_r32,
        MemoryOperand::with_base_displ(Register::RBX, offset as i64),
        register,
    )
    .unwrap()
}
