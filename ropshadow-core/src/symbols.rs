// ropshadow - ropshadow-core
// Module: Symbol Lookup
//
// Copyright (c) 2025 The ropshadow Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Names for addresses in call diagnostics.

use std::{
    borrow::Cow,
    collections::BTreeMap,
};

use ropshadow_sync::SpinMutex;

use crate::frame::Address;

/// Resolves an address to the routine containing it.
pub trait SymbolResolver: Send + Sync {
    /// Name of the routine containing `address`, if known.
    fn symbol_for(&self, address: Address) -> Option<Cow<'_, str>>;
}

/// Resolver that knows nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSymbols;

impl SymbolResolver for NoSymbols {
    fn symbol_for(&self, _address: Address) -> Option<Cow<'_, str>> {
        None
    }
}

/// Routine start addresses and names.
///
/// An address resolves to the routine with the greatest start not above it.
#[derive(Debug, Default)]
pub struct SymbolTable {
    routines: SpinMutex<BTreeMap<Address, String>>,
}

impl SymbolTable {
    /// Empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a routine starting at `start`.
    pub fn insert(&self, start: Address, name: impl Into<String>) {
        self.routines.lock().insert(start, name.into());
    }

    /// Number of routines
    #[must_use]
    pub fn len(&self) -> usize {
        self.routines.lock().len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routines.lock().is_empty()
    }
}

impl SymbolResolver for SymbolTable {
    fn symbol_for(&self, address: Address) -> Option<Cow<'_, str>> {
        let routines = self.routines.lock();
        let (start, name) = routines.range(..=address).next_back()?;
        let offset = address.get() - start.get();
        Some(if offset == 0 {
            Cow::Owned(name.clone())
        } else {
            Cow::Owned(format!("{name}+{offset:#x}"))
        })
    }
}

impl<S: SymbolResolver + ?Sized> SymbolResolver for std::sync::Arc<S> {
    fn symbol_for(&self, address: Address) -> Option<Cow<'_, str>> {
        (**self).symbol_for(address)
    }
}
