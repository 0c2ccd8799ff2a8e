// ropshadow - ropshadow-error
// Module: Error Handling
//
// Copyright (c) 2025 The ropshadow Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! ropshadow error handling library
//!
//! Every fallible operation in the monitor returns [`Result`], whose error is
//! a small `Copy` value carrying a category, a numeric code and a static
//! message.
//!
//! # Error Categories
//!
//! ## Runtime Errors (1000-1999)
//! - Pop on an empty shadow stack
//! - Events for unregistered threads
//!
//! ## Unwind Errors (2000-2999)
//! - Exception resume without a pending context
//! - Unresolvable unwind contexts
//!
//! ## Security Errors (3000-3999)
//! - Return address rewriting
//! - Suspected gadget chains
//!
//! ## Validation, Parse and I/O Errors (4000-7999)
//! - Configuration values out of range
//! - Malformed configuration or trace records
//!
//! # Usage
//!
//! ```
//! use ropshadow_error::{codes, Error, ErrorCategory};
//!
//! let error = Error::new(
//!     ErrorCategory::Validation,
//!     codes::INVALID_CONFIGURATION,
//!     "gadget chain threshold must be at least 2",
//! );
//! assert!(error.is_validation_error());
//! assert!(!Error::SHADOW_STACK_EMPTY.is_fatal());
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(missing_docs)]
#![allow(clippy::module_name_repetitions)]

/// Error codes for ropshadow
pub mod codes;
/// Error and error handling types
pub mod errors;

pub use errors::{Error, ErrorCategory};

/// A specialized `Result` type for ropshadow operations.
pub type Result<T> = core::result::Result<T, Error>;

