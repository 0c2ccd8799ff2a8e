// ropshadow - ropshadow-sync
// Module: Synchronization Primitives
//
// Copyright (c) 2025 The ropshadow Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

#![cfg_attr(not(feature = "std"), no_std)]
#![doc = "Synchronization primitives (spin mutex, client critical sections) for the ropshadow monitor."]
#![warn(clippy::missing_panics_doc)]

pub mod critical;
pub mod mutex;

pub use critical::*;
pub use mutex::*;
