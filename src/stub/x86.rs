//! Stub emission for 32-bit targets.
//!
//! Five conventions share one argument pipeline: arguments that are not
//! routed to `ECX`/`EDX` are pushed right-to-left as 4-byte slots, with
//! 8-byte operands split high-then-low so the low word sits at the lower
//! address. Cleanup responsibility is tracked per convention; only cdecl (and
//! the `Default` tag, which binds to it) gets a post-call `add esp`.

use iced_x86::{Code, Instruction, MemoryOperand, Register};

use super::{encode, CallSpec, StubContext};
use crate::call::{CallArg, CallConv};
use crate::error::CallError;

pub(crate) const RECORD_SIZE: usize = 32;
pub(crate) const OFF_INT_PTR: usize = 0;
pub(crate) const OFF_INT32: usize = 4;
pub(crate) const OFF_INT64: usize = 8;
pub(crate) const OFF_FLOAT: usize = 16;
pub(crate) const OFF_DOUBLE: usize = 20;
pub(crate) const OFF_LAST_ERROR: usize = 28;

pub(crate) fn emit(calls: &[CallSpec], ctx: &StubContext) -> Result<Vec<u8>, CallError> {
    let mut code = Vec::new();

    code.push(Instruction::with1(Code::Push_r32, Register::EBP).unwrap());
    code.push(Instruction::with2(Code::Mov_r32_rm32, Register::EBP, Register::ESP).unwrap());
    code.push(Instruction::with1(Code::Push_r32, Register::EBX).unwrap());

    for (index, call) in calls.iter().enumerate() {
        emit_call(&mut code, call, ctx, ctx.return_table + index * RECORD_SIZE)?;
    }

    code.push(Instruction::with1(Code::Pop_r32, Register::EBX).unwrap());
    code.push(Instruction::with1(Code::Pop_r32, Register::EBP).unwrap());
    // The thread-start trampoline is stdcall with one unused parameter.
    code.push(Instruction::with1(Code::Retnd_imm16, 4).unwrap());

    encode(32, &code)
}

fn emit_call(
    code: &mut Vec<Instruction>,
    call: &CallSpec,
    ctx: &StubContext,
    record: usize,
) -> Result<(), CallError> {
    // EBX holds this call's record slot across the callee.
    code.push(Instruction::with2(Code::Mov_r32_imm32, Register::EBX, record as u32).unwrap());

    // SetLastError(0); stdcall, the callee pops its own argument.
    code.push(Instruction::with1(Code::Pushd_imm32, 0).unwrap());
    code.push(
        Instruction::with2(Code::Mov_r32_imm32, Register::EAX, ctx.set_last_error as u32).unwrap(),
    );
    code.push(Instruction::with1(Code::Call_rm32, Register::EAX).unwrap());

    let route = route_arguments(call)?;

    // Stack operands, right-to-left.
    let mut pushed = 0u32;
    for arg in route.stack.iter().rev() {
        match **arg {
            CallArg::I32(value) => {
                code.push(Instruction::with1(Code::Pushd_imm32, value as i32).unwrap());
                pushed += 4;
            }
            CallArg::F32(value) => {
                code.push(Instruction::with1(Code::Pushd_imm32, value.to_bits() as i32).unwrap());
                pushed += 4;
            }
            CallArg::I64(value) => {
                code.push(
                    Instruction::with1(Code::Pushd_imm32, (value >> 32) as u32 as i32).unwrap(),
                );
                code.push(Instruction::with1(Code::Pushd_imm32, value as u32 as i32).unwrap());
                pushed += 8;
            }
            CallArg::F64(value) => {
                let bits = value.to_bits();
                code.push(
                    Instruction::with1(Code::Pushd_imm32, (bits >> 32) as u32 as i32).unwrap(),
                );
                code.push(Instruction::with1(Code::Pushd_imm32, bits as u32 as i32).unwrap());
                pushed += 8;
            }
        }
    }

    if let Some(value) = route.ecx {
        code.push(Instruction::with2(Code::Mov_r32_imm32, Register::ECX, value).unwrap());
    }
    if let Some(value) = route.edx {
        code.push(Instruction::with2(Code::Mov_r32_imm32, Register::EDX, value).unwrap());
    }

    code.push(Instruction::with2(Code::Mov_r32_imm32, Register::EAX, call.address as u32).unwrap());
    code.push(Instruction::with1(Code::Call_rm32, Register::EAX).unwrap());

    if route.caller_cleans && pushed > 0 {
        code.push(Instruction::with2(Code::Add_rm32_imm32, Register::ESP, pushed as i32).unwrap());
    }

    // EAX feeds the pointer and 32-bit channels, EDX:EAX the 64-bit one.
    code.push(store32(OFF_INT_PTR, Register::EAX));
    code.push(store32(OFF_INT32, Register::EAX));
    code.push(store32(OFF_INT64, Register::EAX));
    code.push(store32(OFF_INT64 + 4, Register::EDX));

    // ST(0) is stored truncated, then popped wide. For a callee that returns
    // no float the masked x87 underflow leaves an indefinite QNaN here.
    code.push(
        Instruction::with1(
            Code::Fst_m32fp,
            MemoryOperand::with_base_displ(Register::EBX, OFF_FLOAT as i64),
        )
        .unwrap(),
    );
    code.push(
        Instruction::with1(
            Code::Fstp_m64fp,
            MemoryOperand::with_base_displ(Register::EBX, OFF_DOUBLE as i64),
        )
        .unwrap(),
    );

    code.push(
        Instruction::with2(Code::Mov_r32_imm32, Register::EAX, ctx.get_last_error as u32).unwrap(),
    );
    code.push(Instruction::with1(Code::Call_rm32, Register::EAX).unwrap());
    code.push(store32(OFF_LAST_ERROR, Register::EAX));

    Ok(())
}

struct Route<'a> {
    ecx: Option<u32>,
    edx: Option<u32>,
    stack: Vec<&'a CallArg>,
    caller_cleans: bool,
}

/// Splits the argument list into register-routed values and stack operands.
///
/// `thiscall` takes the first argument in `ECX` unconditionally; it is the
/// `this` pointer, so anything but a 4-byte integer slot there is rejected
/// rather than quietly handing the callee a different argument. `fastcall`
/// scans left-to-right and routes the first two 4-byte integer slots into
/// `ECX` then `EDX`; 8-byte integers and both float widths always travel on
/// the stack regardless of position.
fn route_arguments<'a>(call: &'a CallSpec) -> Result<Route<'a>, CallError> {
    let caller_cleans = matches!(call.convention, CallConv::Default | CallConv::Cdecl);
    let mut route = Route {
        ecx: None,
        edx: None,
        stack: Vec::with_capacity(call.args.len()),
        caller_cleans,
    };

    match call.convention {
        CallConv::Default | CallConv::Cdecl | CallConv::WinApi | CallConv::StdCall => {
            route.stack.extend(call.args);
        }
        CallConv::ThisCall => {
            let mut args = call.args.iter();
            if let Some(first) = args.next() {
                match *first {
                    CallArg::I32(value) => route.ecx = Some(value),
                    argument => return Err(CallError::InvalidThisArgument { argument }),
                }
            }
            route.stack.extend(args);
        }
        CallConv::FastCall => {
            let mut routed = 0;
            for arg in call.args {
                match arg {
                    CallArg::I32(value) if routed < 2 => {
                        if routed == 0 {
                            route.ecx = Some(*value);
                        } else {
                            route.edx = Some(*value);
                        }
                        routed += 1;
                    }
                    other => route.stack.push(other),
                }
            }
        }
        CallConv::X64 => {
            return Err(CallError::UnsupportedConvention {
                convention: call.convention,
            })
        }
    }
    Ok(route)
}

fn store32(offset: usize, register: Register) -> Instruction {
    Instruction::with2(
        Code::Mov_rm32_r32,
        MemoryOperand::with_base_displ(Register::EBX, offset as i64),
        register,
    )
    .unwrap()
}
