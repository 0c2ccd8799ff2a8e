// ropshadow - ropshadow-core
// Module: Violations and Reporting
//
// Copyright (c) 2025 The ropshadow Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Detection verdicts and the single place that acts on them.
//!
//! Detection code never exits. It returns `Err(Violation)` up to whoever
//! drives the monitor, and that caller hands it to a [`Reporter`], whose
//! only way out is termination.

use core::fmt;
use std::io::Write;

use colored::Colorize;
use ropshadow_error::Error;

use crate::frame::{
    Address,
    ThreadId,
};

/// A confirmed control-flow integrity violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// A return target that matches no recorded frame
    ReturnAddress {
        /// Offending thread
        thread:      ThreadId,
        /// Address of the return instruction
        return_site: Address,
        /// Where the return went
        observed:    Address,
        /// Where the top frame expected it to go
        expected:    Address,
        /// Frames searched before giving up
        examined:    usize,
    },
    /// A chain of short return-terminated sequences
    GadgetChain {
        /// Offending thread
        thread:       ThreadId,
        /// Address of the return that completed the chain
        return_site:  Address,
        /// Consecutive short sequences
        chain:        u32,
        /// Instructions in the last sequence
        instructions: u32,
    },
}

impl Violation {
    /// Thread the violation was observed on
    #[must_use]
    pub const fn thread(&self) -> ThreadId {
        match self {
            Self::ReturnAddress { thread, .. } | Self::GadgetChain { thread, .. } => *thread,
        }
    }

    /// Banner line printed before termination
    #[must_use]
    pub const fn headline(&self) -> &'static str {
        match self {
            Self::ReturnAddress { .. } => "RETURN ADDRESS REWRITING DETECTED!!!!!",
            Self::GadgetChain { .. } => "ROP ATTACK !!!!!",
        }
    }

    /// Summary error of category `Security`
    #[must_use]
    pub const fn to_error(&self) -> Error {
        match self {
            Self::ReturnAddress { .. } => Error::RETURN_ADDRESS_VIOLATION,
            Self::GadgetChain { .. } => Error::GADGET_CHAIN_SUSPECTED,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReturnAddress {
                thread,
                return_site,
                observed,
                expected,
                examined,
            } => write!(
                f,
                "{} t{thread}: {return_site}: ret to {observed}, expected {expected} ({examined} \
                 frames examined)",
                self.headline()
            ),
            Self::GadgetChain {
                thread,
                return_site,
                chain,
                instructions,
            } => write!(
                f,
                "{} t{thread}: {return_site}: {chain} consecutive short sequences, last \
                 {instructions} instructions long",
                self.headline()
            ),
        }
    }
}

impl std::error::Error for Violation {}

impl From<Violation> for Error {
    fn from(violation: Violation) -> Self {
        violation.to_error()
    }
}

/// Top-level handler for violations.
pub trait Reporter {
    /// Print the diagnostic for `violation`.
    fn report(&self, violation: &Violation);

    /// End the monitored process.
    fn terminate(&self, violation: &Violation) -> !;

    /// Print and end the monitored process.
    fn report_and_terminate(&self, violation: &Violation) -> ! {
        self.report(violation);
        self.terminate(violation)
    }
}

/// Reports on standard error and exits the process.
#[derive(Debug, Clone, Copy)]
pub struct ProcessReporter {
    colour:    bool,
    exit_code: i32,
}

impl ProcessReporter {
    /// Exit status used on violation
    pub const EXIT_CODE: i32 = 1;

    /// Reporter exiting with [`Self::EXIT_CODE`]
    #[must_use]
    pub const fn new(colour: bool) -> Self {
        Self {
            colour,
            exit_code: Self::EXIT_CODE,
        }
    }

    /// Use a different exit status
    #[must_use]
    pub const fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self
    }

    /// The line `report` prints
    #[must_use]
    pub fn render(&self, violation: &Violation) -> String {
        let line = violation.to_string();
        if self.colour {
            line.on_red().to_string()
        } else {
            line
        }
    }
}

impl Default for ProcessReporter {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Reporter for ProcessReporter {
    fn report(&self, violation: &Violation) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{}", self.render(violation));
        let _ = stderr.flush();
    }

    fn terminate(&self, _violation: &Violation) -> ! {
        let _ = std::io::stdout().flush();
        std::process::exit(self.exit_code)
    }
}
