// ropshadow - ropshadow-error
// Module: Error Types
//
// Copyright (c) 2025 The ropshadow Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

use core::fmt;

use crate::codes;

/// `Error` categories for ropshadow operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCategory {
    /// Shadow stack bookkeeping
    Runtime        = 1,
    /// Exception unwinding and signal delivery
    Unwind         = 2,
    /// Control-flow integrity verdicts
    Security       = 3,
    /// Configuration and argument validation
    Validation     = 4,
    /// Parse errors
    Parse          = 5,
    /// Concurrency errors
    Concurrency    = 6,
    /// I/O errors
    Io             = 7,
    /// Initialization errors
    Initialization = 8,
    /// Unknown errors
    Unknown        = 9,
}

impl ErrorCategory {
    /// Lowest code belonging to this category
    #[must_use]
    pub const fn code_base(self) -> u16 {
        match self {
            Self::Runtime => 1000,
            Self::Unwind => 2000,
            Self::Security => 3000,
            Self::Validation | Self::Initialization => 4000,
            Self::Parse => 5000,
            Self::Concurrency => 6000,
            Self::Io => 7000,
            Self::Unknown => 9000,
        }
    }
}

/// ropshadow `Error` type
///
/// Categorized error with a numeric code and a static message. The type is
/// `Copy` so it can be raised from instrumentation callbacks without
/// allocating.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Error {
    /// `Error` category
    pub category: ErrorCategory,
    /// `Error` code
    pub code:     u16,
    /// `Error` message
    pub message:  &'static str,
}

impl Error {
    /// Pop on an empty shadow stack
    pub const SHADOW_STACK_EMPTY: Self = Self::new(
        ErrorCategory::Runtime,
        codes::STACK_UNDERFLOW,
        "pop(): stack empty",
    );
    /// Event for an unknown thread
    pub const THREAD_NOT_REGISTERED: Self = Self::new(
        ErrorCategory::Runtime,
        codes::THREAD_NOT_REGISTERED,
        "No shadow stack registered for thread",
    );
    /// Exception resume with nothing pending
    pub const UNWIND_CONTEXT_MISSING: Self = Self::new(
        ErrorCategory::Unwind,
        codes::UNWIND_CONTEXT_MISSING,
        "Exception resume without a pending unwind context",
    );
    /// Unresolvable unwind context
    pub const UNWIND_RESOLUTION_FAILED: Self = Self::new(
        ErrorCategory::Unwind,
        codes::UNWIND_RESOLUTION_FAILED,
        "Unwind context could not be resolved to a handler address",
    );
    /// Pending unwind stack full
    pub const UNWIND_CONTEXT_LIMIT: Self = Self::new(
        ErrorCategory::Unwind,
        codes::UNWIND_CONTEXT_LIMIT,
        "Too many unresolved unwind contexts, oldest dropped",
    );
    /// Return address violation (summary form)
    pub const RETURN_ADDRESS_VIOLATION: Self = Self::new(
        ErrorCategory::Security,
        codes::RETURN_ADDRESS_VIOLATION,
        "RETURN ADDRESS REWRITING DETECTED",
    );
    /// Gadget chain (summary form)
    pub const GADGET_CHAIN_SUSPECTED: Self = Self::new(
        ErrorCategory::Security,
        codes::GADGET_CHAIN_SUSPECTED,
        "ROP ATTACK SUSPECTED",
    );

    /// Create a new error.
    #[must_use]
    pub const fn new(category: ErrorCategory, code: u16, message: &'static str) -> Self {
        Self {
            category,
            code,
            message,
        }
    }

    /// Create a validation error for a bad configuration value
    #[must_use]
    pub const fn invalid_configuration(message: &'static str) -> Self {
        Self::new(
            ErrorCategory::Validation,
            codes::INVALID_CONFIGURATION,
            message,
        )
    }

    /// Create an invalid argument error
    #[must_use]
    pub const fn invalid_argument(message: &'static str) -> Self {
        Self::new(ErrorCategory::Validation, codes::INVALID_ARGUMENT, message)
    }

    /// Create a configuration parse error
    #[must_use]
    pub const fn config_parse_error(message: &'static str) -> Self {
        Self::new(ErrorCategory::Parse, codes::CONFIG_PARSE_ERROR, message)
    }

    /// Create an address parse error
    #[must_use]
    pub const fn address_parse_error(message: &'static str) -> Self {
        Self::new(ErrorCategory::Parse, codes::ADDRESS_PARSE_ERROR, message)
    }

    /// Create a lock contention error
    #[must_use]
    pub const fn lock_contended(message: &'static str) -> Self {
        Self::new(ErrorCategory::Concurrency, codes::LOCK_CONTENDED, message)
    }

    /// Create an I/O error
    #[must_use]
    pub const fn io_error(message: &'static str) -> Self {
        Self::new(ErrorCategory::Io, codes::IO_ERROR, message)
    }

    /// Create a file not found error
    #[must_use]
    pub const fn file_not_found(message: &'static str) -> Self {
        Self::new(ErrorCategory::Io, codes::FILE_NOT_FOUND, message)
    }

    /// Check if this is a security verdict
    #[must_use]
    pub fn is_security_error(&self) -> bool {
        self.category == ErrorCategory::Security
    }

    /// Check if this is a runtime (shadow stack bookkeeping) error
    #[must_use]
    pub fn is_runtime_error(&self) -> bool {
        self.category == ErrorCategory::Runtime
    }

    /// Check if this is an unwind error
    #[must_use]
    pub fn is_unwind_error(&self) -> bool {
        self.category == ErrorCategory::Unwind
    }

    /// Check if this is a validation error
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        self.category == ErrorCategory::Validation
    }

    /// Check if this is a parse error
    #[must_use]
    pub fn is_parse_error(&self) -> bool {
        self.category == ErrorCategory::Parse
    }

    /// Check if this is an I/O error
    #[must_use]
    pub fn is_io_error(&self) -> bool {
        self.category == ErrorCategory::Io
    }

    /// Whether the error means further execution of the monitored program
    /// cannot be trusted.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self.category, ErrorCategory::Security)
    }

    /// Check that the code lies in the range reserved for the category
    #[must_use]
    pub const fn validate_integrity(&self) -> bool {
        let base = self.category.code_base();
        let in_range = if matches!(self.category, ErrorCategory::Unknown) {
            self.code >= base && self.code <= 9999
        } else {
            self.code >= base && self.code < base + 1000
        };
        in_range && !self.message.is_empty()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:?}][E{:04X}] {}",
            self.category, self.code, self.message
        )
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl From<core::fmt::Error> for Error {
    fn from(_: core::fmt::Error) -> Self {
        Self::new(ErrorCategory::Unknown, codes::UNKNOWN, "Formatting error")
    }
}

#[cfg(feature = "std")]
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::file_not_found("File not found"),
            _ => Self::io_error("I/O operation failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_format() {
        let rendered = format!("{}", Error::SHADOW_STACK_EMPTY);
        assert_eq!(rendered, "[Runtime][E03E8] pop(): stack empty");
    }

    #[test]
    fn test_constants_are_in_range() {
        for error in [
            Error::SHADOW_STACK_EMPTY,
            Error::THREAD_NOT_REGISTERED,
            Error::UNWIND_CONTEXT_MISSING,
            Error::UNWIND_RESOLUTION_FAILED,
            Error::UNWIND_CONTEXT_LIMIT,
            Error::RETURN_ADDRESS_VIOLATION,
            Error::GADGET_CHAIN_SUSPECTED,
            Error::invalid_configuration("bad threshold"),
            Error::address_parse_error("bad address"),
            Error::io_error("disk"),
        ] {
            assert!(error.validate_integrity(), "{error} out of range");
        }
    }

    #[test]
    fn test_only_security_errors_are_fatal() {
        assert!(Error::RETURN_ADDRESS_VIOLATION.is_fatal());
        assert!(Error::GADGET_CHAIN_SUSPECTED.is_fatal());
        assert!(!Error::SHADOW_STACK_EMPTY.is_fatal());
        assert!(!Error::UNWIND_CONTEXT_MISSING.is_fatal());
    }

    #[test]
    fn test_category_predicates() {
        assert!(Error::SHADOW_STACK_EMPTY.is_runtime_error());
        assert!(Error::UNWIND_CONTEXT_LIMIT.is_unwind_error());
        assert!(Error::config_parse_error("x").is_parse_error());
        assert!(Error::invalid_argument("x").is_validation_error());
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_io_error_conversion() {
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(Error::from(missing).code, codes::FILE_NOT_FOUND);

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no");
        assert!(Error::from(denied).is_io_error());
    }
}
