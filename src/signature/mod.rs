//! The signature layer: parameter descriptors, binding, and the adapter that
//! gives every function a uniform keyword-only calling surface.
pub mod adapter;
pub mod func;
pub mod param;
pub mod sig;

pub use adapter::{
    add_signature, check_signature, convert_signature, has_signature, modify_signature, restructure_signature,
    split_arguments,
};
pub use func::{FuncType, Function, KwFunc, NativeFn, PlainFn};
pub use param::{param_sorter, ParamKind, Parameter};
pub use sig::{BoundArguments, Signature};
