//! Batch orchestration: allocate, write, launch, wait, read back, free.

use core::mem::size_of;

use crate::call::{CallArg, CallConv, ReturnRecord};
use crate::error::CallError;
use crate::process::{Protection, RemoteProcess, RemoteRegion, RemoteThread};
use crate::stub::{self, CallSpec, StubContext};

const KERNEL32: &str = "kernel32.dll";

/// Runs one batch in the target and returns its records in input order.
///
/// Either the whole batch completes and every record is returned, or an error
/// is raised and no records are; partial progress is not observable. All
/// remote regions are released on every exit path.
pub(crate) fn execute<P: RemoteProcess>(
    process: &P,
    addresses: &[usize],
    conventions: &[CallConv],
    arg_lists: &[Vec<CallArg>],
) -> Result<Vec<ReturnRecord>, CallError> {
    if addresses.len() != conventions.len() || addresses.len() != arg_lists.len() {
        return Err(CallError::BatchShapeMismatch {
            addresses: addresses.len(),
            conventions: conventions.len(),
            arg_lists: arg_lists.len(),
        });
    }
    if addresses.is_empty() {
        return Ok(Vec::new());
    }

    // The error-slot entry points are looked up through the target, not the
    // host, so the baked addresses stay correct under ASLR.
    let get_last_error = resolve(process, "GetLastError")?;
    let set_last_error = resolve(process, "SetLastError")?;

    let count = addresses.len();
    let table_size = count * size_of::<ReturnRecord>();
    let table = RemoteRegion::alloc(process, table_size, Protection::ReadWrite)?;

    let calls: Vec<CallSpec> = addresses
        .iter()
        .zip(conventions)
        .zip(arg_lists)
        .map(|((address, convention), args)| CallSpec {
            address: *address,
            convention: *convention,
            args,
        })
        .collect();

    let stub = stub::emit(
        &calls,
        &StubContext {
            return_table: table.base(),
            get_last_error,
            set_last_error,
        },
    )?;
    log::debug!("executing {count}-call batch through a {}-byte stub", stub.len());

    let code = RemoteRegion::alloc(process, stub.len(), Protection::ExecuteReadWrite)?;
    process.write(code.base(), &stub).map_err(|os| CallError::RemoteWrite {
        address: code.base(),
        size: stub.len(),
        code: os,
    })?;
    process
        .flush_instruction_cache(code.base(), stub.len())
        .map_err(|os| CallError::CacheFlush {
            address: code.base(),
            code: os,
        })?;

    let thread = RemoteThread::spawn(process, code.base())?;
    thread.wait()?;
    drop(thread);

    let mut buffer = vec![0u8; table_size];
    process
        .read(table.base(), &mut buffer)
        .map_err(|os| CallError::RemoteRead {
            address: table.base(),
            size: table_size,
            code: os,
        })?;

    code.release()?;
    table.release()?;

    let records = buffer
        .chunks_exact(size_of::<ReturnRecord>())
        .map(|chunk| unsafe { core::ptr::read_unaligned(chunk.as_ptr().cast::<ReturnRecord>()) })
        .collect();
    Ok(records)
}

fn resolve<P: RemoteProcess>(process: &P, symbol: &str) -> Result<usize, CallError> {
    process
        .resolve(KERNEL32, symbol)
        .map_err(|code| CallError::Resolve {
            module: KERNEL32.to_owned(),
            symbol: symbol.to_owned(),
            code,
        })
}
