//! Intent identification and the on-chain intent reader boundary.
//!
//! An intent is the on-chain record authorizing a payment release. The
//! extension protocol wants its hash as a *decimal* string while the rest
//! of the world (contracts, explorers) uses 0x-hex; the conversion must be
//! exact, since both representations name the same 256-bit value.

use anyhow::{anyhow, Context, Result};
use ethers_core::types::U256;
use std::collections::HashMap;

/// Convert a 0x-prefixed hex intent hash to the decimal string the
/// extension expects in `generate_proof`.
pub fn intent_hash_to_decimal(hex_hash: &str) -> Result<String> {
    let stripped = hex_hash
        .strip_prefix("0x")
        .or_else(|| hex_hash.strip_prefix("0X"))
        .unwrap_or(hex_hash);
    if stripped.is_empty() {
        return Err(anyhow!("empty intent hash"));
    }
    if stripped.len() > 64 {
        return Err(anyhow!("intent hash wider than 256 bits: {hex_hash}"));
    }
    let value = U256::from_str_radix(stripped, 16)
        .with_context(|| format!("intent hash is not hex: {hex_hash}"))?;
    Ok(value.to_string())
}

/// Convert a decimal intent hash back to canonical 0x-hex (for display and
/// cross-checking against on-chain data).
pub fn intent_hash_to_hex(decimal: &str) -> Result<String> {
    let value = U256::from_dec_str(decimal)
        .with_context(|| format!("intent hash is not decimal: {decimal}"))?;
    Ok(format!("{value:#x}"))
}

// ── Intent reader boundary ───────────────────────────────────────────────────

/// On-chain intent fields surfaced for display and cross-checking. Not part
/// of the proof protocol itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub amount: String,
    pub timestamp_s: u64,
    pub payment_method: String,
    pub currency: String,
    pub conversion_rate: String,
    pub payee_id: String,
}

/// Read access to intents, keyed by 0x-hex intent hash.
pub trait IntentReader: Send + Sync {
    fn get_intent(&self, intent_hash_hex: &str) -> Result<Intent>;
}

/// Fixed in-memory intent table, used by the demo driver and tests in
/// place of a contract call.
#[derive(Debug, Default)]
pub struct StaticIntentReader {
    intents: HashMap<String, Intent>,
}

impl StaticIntentReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, intent_hash_hex: &str, intent: Intent) {
        self.intents.insert(intent_hash_hex.to_lowercase(), intent);
    }
}

impl IntentReader for StaticIntentReader {
    fn get_intent(&self, intent_hash_hex: &str) -> Result<Intent> {
        self.intents
            .get(&intent_hash_hex.to_lowercase())
            .cloned()
            .ok_or_else(|| anyhow!("no intent recorded for {intent_hash_hex}"))
    }
}
