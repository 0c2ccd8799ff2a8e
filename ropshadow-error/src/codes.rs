// ropshadow - ropshadow-error
// Module: Error Codes
//
// Copyright (c) 2025 The ropshadow Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Error codes for ropshadow
//!
//! Codes are grouped by category in blocks of one thousand so a code alone
//! identifies where it came from.

// Shadow stack and reconciliation (1000-1999)
/// Pop on an empty shadow stack
pub const STACK_UNDERFLOW: u16 = 1000;
/// Shadow stack exceeded its configured bound
pub const STACK_OVERFLOW: u16 = 1001;
/// Event arrived for a thread with no monitor state
pub const THREAD_NOT_REGISTERED: u16 = 1002;
/// Thread state registered twice
pub const THREAD_ALREADY_REGISTERED: u16 = 1003;

// Unwinding and signals (2000-2999)
/// Exception resume without a pending unwind context
pub const UNWIND_CONTEXT_MISSING: u16 = 2000;
/// The unwinder could not resolve a context handle to an address
pub const UNWIND_RESOLUTION_FAILED: u16 = 2001;
/// Too many unresolved unwind contexts on one thread
pub const UNWIND_CONTEXT_LIMIT: u16 = 2002;
/// Interrupted context carried no usable stack or instruction pointer
pub const SIGNAL_CONTEXT_INVALID: u16 = 2003;

// Security verdicts (3000-3999)
/// Return target matches no recorded frame
pub const RETURN_ADDRESS_VIOLATION: u16 = 3000;
/// Chain of short return-terminated sequences exceeded the threshold
pub const GADGET_CHAIN_SUSPECTED: u16 = 3001;

// Configuration and validation (4000-4999)
/// Configuration value out of range
pub const INVALID_CONFIGURATION: u16 = 4000;
/// Invalid argument
pub const INVALID_ARGUMENT: u16 = 4001;

// Parsing (5000-5999)
/// Malformed configuration document
pub const CONFIG_PARSE_ERROR: u16 = 5000;
/// Malformed event trace record
pub const TRACE_PARSE_ERROR: u16 = 5001;
/// Malformed address literal
pub const ADDRESS_PARSE_ERROR: u16 = 5002;

// Concurrency (6000-6999)
/// Lock could not be taken without blocking
pub const LOCK_CONTENDED: u16 = 6000;

// I/O (7000-7999)
/// General I/O failure
pub const IO_ERROR: u16 = 7000;
/// File not found
pub const FILE_NOT_FOUND: u16 = 7001;

// Fallback
/// Unknown error
pub const UNKNOWN: u16 = 9999;
