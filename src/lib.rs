//! Remote function calls into another Windows process.
//!
//! The engine writes a small position-independent machine-code stub into the
//! target process, runs it on a freshly created remote thread, and reads back
//! one [`ReturnRecord`] per call. Arguments are classified into tagged
//! [`CallArg`] values and marshalled according to the requested calling
//! convention; the thread-local last-error value is captured right after each
//! callee returns.
//!
//! The target process is reached exclusively through the [`RemoteProcess`]
//! trait, so the engine can be driven by a real Win32 handle
//! ([`WindowsProcess`]) or by a test double.

pub mod call;
pub mod error;
pub mod process;

mod executor;
mod stub;

pub use call::{call, call_multi, call_raw, Args, CallArg, CallConv, CallResult, MultiCall, RetValue, ReturnRecord, Signature};
pub use error::CallError;
pub use process::{Protection, RemoteProcess};

#[cfg(windows)]
pub use process::windows::WindowsProcess;
