//! Static type checker for CEL expressions.
//!
//! Given an expression tree and a [`CheckerEnv`] of declarations, the checker
//! infers a type for every node, resolves identifiers and function overloads
//! to fully qualified declarations, and reports type errors.
//!
//! - **Environment**: [`CheckerEnv`] with the container, variables,
//!   functions, message registry and options. [`CheckerEnv::with_standard_library`]
//!   preloads the CEL standard library.
//! - **Checking**: [`check`] returns a [`CheckResult`] holding the type map,
//!   the reference map, the collected diagnostics and the rewritten tree.
//! - **Type algebra**: assignability, substitution and generality over
//!   [`CelType`](cel_checker_common::CelType) in [`types`].
//!
//! # Example
//! ```
//! use cel_checker::{check, CheckerEnv};
//! use cel_checker_common::{CelType, ExprFactory};
//!
//! let env = CheckerEnv::with_standard_library()
//!     .with_variable("names", CelType::list(CelType::String));
//!
//! // names.map(n, size(n))
//! let mut f = ExprFactory::new();
//! let range = f.ident("names");
//! let n = f.ident("n");
//! let size = f.call("size", vec![n]);
//! let expr = f.map_macro(range, "n", size);
//!
//! let result = check(&expr, &env).unwrap();
//! assert!(result.is_ok());
//! assert_eq!(result.result_type(), Some(&CelType::list(CelType::Int)));
//! ```

mod checker;
mod container;
mod env;
mod errors;
mod mapping;
mod reference;
mod scope;
mod standard_library;
pub mod types;

pub use checker::{check, CheckResult, Checker};
pub use container::{to_qualified_name, Container};
pub use env::{AggregateLiteralElementType, CheckerEnv, ScopedEnv, DEFAULT_MAX_RECURSION_DEPTH};
pub use errors::EnvError;
pub use mapping::Mapping;
pub use reference::ReferenceInfo;
pub use scope::{Scope, ScopeStack};
pub use standard_library::{get_standard_function, CROSS_TYPE_NUMERIC_COMPARISON_OVERLOADS, STANDARD_LIBRARY};
