//! Transaction builder and the builder-backed re-signable payload.

use std::{str::FromStr, sync::Arc};

use solana_compute_budget_interface::ComputeBudgetInstruction;
use solana_message::{Hash, Instruction, Message, VersionedMessage};
use solana_pubkey::Pubkey;
use solana_signer::Signer;
use solana_system_interface::instruction as system_instruction;
use solana_transaction::versioned::VersionedTransaction;

use crate::{
    lease::ValidityWindow,
    payload::{PayloadAdjustments, ResignablePayload, SignError, SignedPayload},
};

/// High-level builder for legacy-versioned transaction messages.
#[derive(Debug, Clone)]
pub struct TxBuilder {
    /// Fee payer and signer.
    payer: Pubkey,
    /// User-provided instructions.
    instructions: Vec<Instruction>,
    /// Optional compute unit limit.
    compute_unit_limit: Option<u32>,
    /// Optional priority fee (micro-lamports per compute unit).
    priority_fee_micro_lamports: Option<u64>,
    /// Optional incentive transfer `(recipient, lamports)` appended after user instructions.
    incentive: Option<(Pubkey, u64)>,
}

impl TxBuilder {
    /// Creates a transaction builder for a fee payer.
    #[must_use]
    pub const fn new(payer: Pubkey) -> Self {
        Self {
            payer,
            instructions: Vec::new(),
            compute_unit_limit: None,
            priority_fee_micro_lamports: None,
            incentive: None,
        }
    }

    /// Appends one instruction.
    #[must_use]
    pub fn add_instruction(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    /// Appends many instructions.
    #[must_use]
    pub fn add_instructions<I>(mut self, instructions: I) -> Self
    where
        I: IntoIterator<Item = Instruction>,
    {
        self.instructions.extend(instructions);
        self
    }

    /// Sets compute unit limit.
    #[must_use]
    pub const fn with_compute_unit_limit(mut self, units: u32) -> Self {
        self.compute_unit_limit = Some(units);
        self
    }

    /// Sets priority fee in micro-lamports.
    #[must_use]
    pub const fn with_priority_fee_micro_lamports(mut self, micro_lamports: u64) -> Self {
        self.priority_fee_micro_lamports = Some(micro_lamports);
        self
    }

    /// Appends an incentive transfer to `recipient`.
    #[must_use]
    pub const fn with_incentive(mut self, recipient: Pubkey, lamports: u64) -> Self {
        self.incentive = Some((recipient, lamports));
        self
    }

    /// Returns a copy with `adjustments` layered over the builder's own settings.
    #[must_use]
    pub fn adjusted(&self, adjustments: &PayloadAdjustments) -> Self {
        let mut builder = self.clone();
        if let Some(units) = adjustments.compute_unit_limit {
            builder.compute_unit_limit = Some(units);
        }
        if let Some(micro_lamports) = adjustments.priority_fee_micro_lamports {
            builder.priority_fee_micro_lamports = Some(micro_lamports);
        }
        if let Some(incentive) = adjustments.incentive {
            builder.incentive = Some((incentive.recipient, incentive.lamports));
        }
        builder
    }

    /// Builds a legacy message wrapped as a versioned message.
    #[must_use]
    pub fn build_message(self, recent_blockhash: [u8; 32]) -> VersionedMessage {
        let mut instructions = Vec::new();
        if let Some(units) = self.compute_unit_limit {
            instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(units));
        }
        if let Some(micro_lamports) = self.priority_fee_micro_lamports {
            instructions.push(ComputeBudgetInstruction::set_compute_unit_price(
                micro_lamports,
            ));
        }
        instructions.extend(self.instructions);
        if let Some((recipient, lamports)) = self.incentive {
            instructions.push(system_instruction::transfer(
                &self.payer,
                &recipient,
                lamports,
            ));
        }
        let blockhash = Hash::new_from_array(recent_blockhash);
        let message = Message::new_with_blockhash(&instructions, Some(&self.payer), &blockhash);
        VersionedMessage::Legacy(message)
    }
}

/// Re-signable payload that rebuilds a [`TxBuilder`] message for every window.
#[derive(Clone)]
pub struct BuilderPayload {
    /// Base transaction.
    builder: TxBuilder,
    /// Signers; the fee payer first.
    signers: Vec<Arc<dyn Signer + Send + Sync>>,
}

impl BuilderPayload {
    /// Creates a payload from a builder and its signers.
    #[must_use]
    pub fn new(builder: TxBuilder, signers: Vec<Arc<dyn Signer + Send + Sync>>) -> Self {
        Self { builder, signers }
    }
}

impl ResignablePayload for BuilderPayload {
    fn resign(
        &self,
        window: &ValidityWindow,
        adjustments: &PayloadAdjustments,
    ) -> Result<SignedPayload, SignError> {
        let blockhash =
            Hash::from_str(&window.blockhash).map_err(|_error| SignError::InvalidBlockhash {
                value: window.blockhash.clone(),
            })?;
        let message = self
            .builder
            .adjusted(adjustments)
            .build_message(blockhash.to_bytes());
        let signers: Vec<&(dyn Signer + Send + Sync)> =
            self.signers.iter().map(|signer| signer.as_ref()).collect();
        let tx = VersionedTransaction::try_new(message, signers.as_slice()).map_err(|error| {
            SignError::Sign {
                message: error.to_string(),
            }
        })?;
        let signature = tx
            .signatures
            .first()
            .map(ToString::to_string)
            .ok_or_else(|| SignError::Sign {
                message: "signed transaction carries no signature".to_owned(),
            })?;
        let bytes = bincode::serialize(&tx).map_err(|error| SignError::Encode {
            message: error.to_string(),
        })?;
        Ok(SignedPayload { bytes, signature })
    }
}
