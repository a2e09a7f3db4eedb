//! Public call surface: single calls, typed calls and batched calls.

mod args;
mod result;
mod signature;

pub use args::CallArg;
pub use result::{CallResult, RetValue, ReturnRecord};
pub use signature::{Args, Signature};

use crate::error::CallError;
use crate::executor;
use crate::process::RemoteProcess;

/// The ABI contract under which a callee expects to be invoked.
///
/// `Default` is the ABI an unannotated function gets from the compiler,
/// `WinApi` the one the OS uses for its own entry points. On 64-bit builds
/// every tag except `ThisCall` means the single Microsoft x64 convention; on
/// 32-bit builds `X64` is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallConv {
    Default,
    WinApi,
    Cdecl,
    StdCall,
    ThisCall,
    FastCall,
    X64,
}

/// Calls one function in the target and returns the raw result record.
///
/// Equivalent to a one-element batch: the argument list is marshalled by the
/// generated stub, the callee runs on a fresh remote thread, and the record
/// captures every return channel plus the thread's last-error value.
pub fn call_raw<P: RemoteProcess>(
    process: &P,
    address: usize,
    convention: CallConv,
    args: &[CallArg],
) -> Result<ReturnRecord, CallError> {
    let records = executor::execute(process, &[address], &[convention], &[args.to_vec()])?;
    debug_assert_eq!(records.len(), 1);
    Ok(records[0])
}

/// Calls a batch of functions in the target, sequentially on one remote
/// thread, and returns their records in input order.
///
/// The three slices must have equal length. An empty batch returns an empty
/// vec without touching the target at all.
pub fn call_multi<P: RemoteProcess>(
    process: &P,
    addresses: &[usize],
    conventions: &[CallConv],
    arg_lists: &[Vec<CallArg>],
) -> Result<Vec<ReturnRecord>, CallError> {
    executor::execute(process, addresses, conventions, arg_lists)
}

/// Calls one function in the target through the typed facade.
///
/// `S` is a `fn`-pointer type declaring the callee's signature; the argument
/// tuple must convert element-wise into the declared parameter types. The
/// record is decoded into the declared return type:
///
/// ```no_run
/// # use farcall::{call, CallConv, RemoteProcess};
/// # fn demo<P: RemoteProcess>(process: &P, address: usize) -> Result<(), farcall::CallError> {
/// let result = call::<fn(u32, u32) -> u32, _, _>(process, address, CallConv::WinApi, (2u32, 3u32))?;
/// println!("returned {} (last error {})", result.value, result.last_error);
/// # Ok(())
/// # }
/// ```
pub fn call<S, A, P>(
    process: &P,
    address: usize,
    convention: CallConv,
    args: A,
) -> Result<CallResult<S::Ret>, CallError>
where
    S: Signature,
    A: Args<S>,
    P: RemoteProcess,
{
    let record = call_raw(process, address, convention, &args.classify())?;
    Ok(CallResult::from_record(&record))
}

/// Builder that records calls and executes them in one remote thread.
///
/// Calls run sequentially in the order they were added, so later callees
/// observe the target-side effects of earlier ones. Not meant to be shared
/// across host threads while being filled.
pub struct MultiCall<'p, P> {
    process: &'p P,
    addresses: Vec<usize>,
    conventions: Vec<CallConv>,
    arg_lists: Vec<Vec<CallArg>>,
}

impl<'p, P: RemoteProcess> MultiCall<'p, P> {
    pub fn new(process: &'p P) -> Self {
        Self {
            process,
            addresses: Vec::new(),
            conventions: Vec::new(),
            arg_lists: Vec::new(),
        }
    }

    /// Records a typed call without executing it.
    pub fn add<S, A>(&mut self, address: usize, convention: CallConv, args: A) -> &mut Self
    where
        S: Signature,
        A: Args<S>,
    {
        self.add_raw(address, convention, &args.classify())
    }

    /// Records a call from a pre-classified argument list.
    pub fn add_raw(
        &mut self,
        address: usize,
        convention: CallConv,
        args: &[CallArg],
    ) -> &mut Self {
        self.addresses.push(address);
        self.conventions.push(convention);
        self.arg_lists.push(args.to_vec());
        self
    }

    /// Number of recorded calls.
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Executes the recorded batch and returns the raw records in input
    /// order. The builder keeps its entries, so the batch can be re-run.
    pub fn call(&self) -> Result<Vec<ReturnRecord>, CallError> {
        executor::execute(
            self.process,
            &self.addresses,
            &self.conventions,
            &self.arg_lists,
        )
    }
}
