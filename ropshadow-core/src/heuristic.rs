// ropshadow - ropshadow-core
// Module: Gadget-Chain Heuristic
//
// Copyright (c) 2025 The ropshadow Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Two-counter detector for chains of short return-terminated sequences.

use serde::{
    Deserialize,
    Serialize,
};

/// Detection thresholds.
///
/// A sequence is short when fewer than `short_sequence - 1` instructions
/// precede its return. Detection fires once `gadget_chain - 1` short
/// sequences follow one another, so the defaults (5, 3) fire on the second
/// consecutive return preceded by at most three instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicThresholds {
    /// Short sequence bound
    pub short_sequence: u32,
    /// Chain length bound
    pub gadget_chain:   u32,
}

impl HeuristicThresholds {
    /// Default short sequence bound
    pub const DEFAULT_SHORT_SEQUENCE: u32 = 5;
    /// Default chain length bound
    pub const DEFAULT_GADGET_CHAIN: u32 = 3;

    /// Instruction count below which a sequence is short
    #[must_use]
    pub const fn short_limit(&self) -> u32 {
        self.short_sequence.saturating_sub(1)
    }

    /// Consecutive short sequences that trigger detection
    #[must_use]
    pub const fn chain_limit(&self) -> u32 {
        self.gadget_chain.saturating_sub(1)
    }
}

impl Default for HeuristicThresholds {
    fn default() -> Self {
        Self {
            short_sequence: Self::DEFAULT_SHORT_SEQUENCE,
            gadget_chain:   Self::DEFAULT_GADGET_CHAIN,
        }
    }
}

/// Classification of one return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnClass {
    /// Short sequence, `chain` short sequences in a row so far
    Short {
        /// Consecutive short sequences including this one
        chain: u32,
    },
    /// Long sequence, chain reset
    Long,
}

/// A chain long enough to be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainSuspicion {
    /// Consecutive short sequences
    pub chain:        u32,
    /// Instructions in the sequence that completed the chain
    pub instructions: u32,
}

/// Per-thread heuristic state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GadgetChainDetector {
    thresholds:                  HeuristicThresholds,
    instructions_since_return:   u32,
    consecutive_short_sequences: u32,
}

impl GadgetChainDetector {
    /// Detector with `thresholds`
    #[must_use]
    pub const fn new(thresholds: HeuristicThresholds) -> Self {
        Self {
            thresholds,
            instructions_since_return: 0,
            consecutive_short_sequences: 0,
        }
    }

    /// Count a non-return instruction.
    pub fn observe_instruction(&mut self) {
        self.instructions_since_return = self.instructions_since_return.saturating_add(1);
    }

    /// Classify the sequence a return just ended.
    ///
    /// # Errors
    ///
    /// [`ChainSuspicion`] when the chain reaches the threshold. Both counters
    /// start over afterwards.
    pub fn observe_return(&mut self) -> Result<ReturnClass, ChainSuspicion> {
        let instructions = core::mem::take(&mut self.instructions_since_return);

        if instructions >= self.thresholds.short_limit() {
            self.consecutive_short_sequences = 0;
            return Ok(ReturnClass::Long);
        }

        self.consecutive_short_sequences += 1;
        let chain = self.consecutive_short_sequences;
        if chain >= self.thresholds.chain_limit() {
            self.consecutive_short_sequences = 0;
            return Err(ChainSuspicion {
                chain,
                instructions,
            });
        }
        Ok(ReturnClass::Short { chain })
    }

    /// Instructions since the last return
    #[must_use]
    pub const fn instructions_since_return(&self) -> u32 {
        self.instructions_since_return
    }

    /// Short sequences in a row so far
    #[must_use]
    pub const fn consecutive_short_sequences(&self) -> u32 {
        self.consecutive_short_sequences
    }

    /// Thresholds in use
    #[must_use]
    pub const fn thresholds(&self) -> HeuristicThresholds {
        self.thresholds
    }
}
