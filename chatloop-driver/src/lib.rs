//! # chatloop Driver
//!
//! Runs the function-calling loop:
//! 1. Send the conversation and the declared functions to the model
//! 2. If the model answers directly, stop
//! 3. Otherwise run the requested function locally and append its result
//! 4. Repeat until the model stops calling functions or the call budget runs out
//!
//! Unknown functions and failing functions never abort a run; they are reported
//! back to the model as fixed placeholder results.

mod driver;
mod function;

pub use driver::{
    default_framing, ConversationDriver, DriverOptions, DriverState, MalformedArguments,
    RunOutcome, StopReason, FUNCTION_FAILED, FUNCTION_NOT_FOUND,
};
pub use function::{Callable, CallableFunction, FnCallable, FunctionRegistry, TypedFunction};
