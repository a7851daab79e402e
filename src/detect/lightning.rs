// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::DetectError;
use crate::{
    model::{Block, LightningKind, LightningTransaction},
    rpc::responses::{FullBlock, Transaction, TxIn},
    store::Store,
};

pub const DEFAULT_MAX_BLOCKS: u32 = 10;

/// Upper locktime byte of a commitment transaction.
const COMMITMENT_LOCKTIME_PREFIX: u32 = 0x20;
/// Upper sequence byte of a commitment transaction's funding input.
const COMMITMENT_SEQUENCE_PREFIX: u32 = 0x80;

const OP_IF: u8 = 0x63;
const OP_ELSE: u8 = 0x67;
const OP_ENDIF: u8 = 0x68;
const OP_DROP: u8 = 0x75;
const OP_CHECKSIG: u8 = 0xac;
const OP_CHECKSEQUENCEVERIFY: u8 = 0xb2;
const OP_1: u8 = 0x51;
const OP_16: u8 = 0x60;
const PUSH_PUBKEY: u8 = 0x21;
const PUBKEY_LENGTH: usize = 33;

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LightningConfig {
    pub enabled: bool,
    /// How many unscanned blocks to walk back from the tip per pass.
    pub max_blocks: u32,
}

impl Default for LightningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_blocks: DEFAULT_MAX_BLOCKS,
        }
    }
}

/// The unscanned blocks up to a tip, oldest first.
///
/// Scanning in this order means an interrupted pass leaves only blocks above the last scanned one,
/// which the next walk from a newer tip reaches again.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanPlan {
    pub blocks: Vec<Block>,
    /// More unscanned blocks remain below the lookback.
    pub bound_exceeded: bool,
}

/// Finds payment channel settlements in block bodies.
#[derive(Debug)]
pub struct LightningScanner {
    config: LightningConfig,
}

impl LightningScanner {
    pub fn new(config: LightningConfig) -> Self {
        Self { config }
    }

    /// Collects the blocks down from `tip` that were not yet scanned.
    pub async fn pending(&self, store: &dyn Store, tip: &Block) -> Result<ScanPlan, DetectError> {
        let mut plan = ScanPlan::default();
        let mut current = Some(tip.clone());
        while let Some(block) = current.take() {
            if block.checked_lightning {
                break;
            }
            if plan.blocks.len() >= self.config.max_blocks as usize {
                warn!("unscanned blocks remain below height {}, skipping them", block.height);
                plan.bound_exceeded = true;
                break;
            }
            if let Some(parent) = &block.parent {
                current = store.block(parent).await?;
                if current.is_none() {
                    warn!("block {parent} below height {} is missing, leaving a gap", block.height);
                }
            }
            plan.blocks.push(block);
        }
        plan.blocks.reverse();
        Ok(plan)
    }

    /// Records the settlements in `body` and marks the block scanned.
    ///
    /// A missing body, usually pruned, is a logged gap.
    #[instrument(skip_all, fields(height = block.height), err)]
    pub async fn scan(
        &self,
        store: &dyn Store,
        block: &Block,
        body: Option<&FullBlock>,
    ) -> Result<Vec<LightningTransaction>, DetectError> {
        let mut found = Vec::new();
        match body {
            Some(body) => {
                for tx in &body.tx {
                    let Some(kind) = classify(tx) else { continue };
                    let transaction = LightningTransaction {
                        txid: tx.txid.clone(),
                        block: block.hash.clone(),
                        network: block.network,
                        kind,
                        amount: tx.output_value_sat(),
                    };
                    info!("found {kind:?} transaction {}", transaction.txid);
                    store.insert_lightning_transaction(&transaction).await?;
                    found.push(transaction);
                }
            }
            None => warn!("body of block {} is unavailable, skipping it", block.hash),
        }
        store.mark_lightning_checked(&block.hash).await?;
        debug!("scanned block {}", block.hash);
        Ok(found)
    }
}

/// Matches a transaction against the channel settlement patterns.
pub fn classify(tx: &Transaction) -> Option<LightningKind> {
    for input in &tx.vin {
        if let Some(kind) = classify_spend(input) {
            return Some(kind);
        }
    }
    let is_commitment = tx.locktime >> 24 == COMMITMENT_LOCKTIME_PREFIX
        && tx.vin.len() == 1
        && tx.vin[0].sequence >> 24 == COMMITMENT_SEQUENCE_PREFIX;
    is_commitment.then_some(LightningKind::ForceClose)
}

/// A `to_local` spend carries `<sig> <selector> <script>`, where the selector picks the branch.
fn classify_spend(input: &TxIn) -> Option<LightningKind> {
    let [_, selector, script] = input.txinwitness.as_slice() else {
        return None;
    };
    let kind = match selector.as_str() {
        "01" => LightningKind::Penalty,
        "" => LightningKind::Sweep,
        _ => return None,
    };
    let script = hex::decode(script).ok()?;
    is_to_local_script(&script).then_some(kind)
}

/// `OP_IF <revocation key> OP_ELSE <delay> OP_CSV OP_DROP <delayed key> OP_ENDIF OP_CHECKSIG`
fn is_to_local_script(script: &[u8]) -> bool {
    let mut cursor = Cursor(script);
    parse_to_local(&mut cursor).is_some() && cursor.0.is_empty()
}

fn parse_to_local(cursor: &mut Cursor<'_>) -> Option<()> {
    cursor.op(OP_IF)?;
    cursor.pubkey()?;
    cursor.op(OP_ELSE)?;
    match cursor.take(1)?[0] {
        OP_1..=OP_16 => (),
        n @ 1..=4 => {
            cursor.take(n as usize)?;
        }
        _ => return None,
    }
    cursor.op(OP_CHECKSEQUENCEVERIFY)?;
    cursor.op(OP_DROP)?;
    cursor.pubkey()?;
    cursor.op(OP_ENDIF)?;
    cursor.op(OP_CHECKSIG)
}

struct Cursor<'a>(&'a [u8]);

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.0.len() < n {
            return None;
        }
        let (head, tail) = self.0.split_at(n);
        self.0 = tail;
        Some(head)
    }

    fn op(&mut self, op: u8) -> Option<()> {
        (self.take(1)? == [op]).then_some(())
    }

    fn pubkey(&mut self) -> Option<()> {
        self.op(PUSH_PUBKEY)?;
        self.take(PUBKEY_LENGTH).map(|_| ())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn to_local_script(delay: &str) -> String {
        format!(
            "6321{}67{delay}b27521{}68ac",
            "02".repeat(PUBKEY_LENGTH),
            "03".repeat(PUBKEY_LENGTH)
        )
    }

    fn spend(witness: &[&str]) -> Transaction {
        Transaction {
            txid: "aa".repeat(32),
            locktime: 0,
            vin: vec![TxIn {
                coinbase: None,
                txid: Some("bb".repeat(32)),
                vout: Some(0),
                txinwitness: witness.iter().map(|w| w.to_string()).collect(),
                sequence: 0xffff_ffff,
            }],
            vout: Vec::new(),
        }
    }

    #[test]
    fn recognizes_to_local_scripts() {
        for delay in ["51", "60", "0190", "02d002", "03ffff00", "0400000001"] {
            let script = hex::decode(to_local_script(delay)).unwrap();
            assert!(is_to_local_script(&script), "delay {delay}");
        }
        let script = hex::decode(to_local_script("05aaaaaaaaaa")).unwrap();
        assert!(!is_to_local_script(&script));
        let mut script = hex::decode(to_local_script("51")).unwrap();
        script.push(OP_DROP);
        assert!(!is_to_local_script(&script));
        assert!(!is_to_local_script(&[]));
    }

    #[test]
    fn classifies_spends() {
        let script = to_local_script("0190");
        assert_eq!(classify(&spend(&["30", "01", &script])), Some(LightningKind::Penalty));
        assert_eq!(classify(&spend(&["30", "", &script])), Some(LightningKind::Sweep));
        assert_eq!(classify(&spend(&["30", "02", &script])), None);
        assert_eq!(classify(&spend(&["30", "01", "51"])), None);
        assert_eq!(classify(&spend(&["30", "02"])), None);
    }

    #[test]
    fn classifies_commitments() {
        let mut tx = spend(&["", "30", "30", "52"]);
        tx.locktime = 0x2012_3456;
        tx.vin[0].sequence = 0x8012_3456;
        assert_eq!(classify(&tx), Some(LightningKind::ForceClose));

        tx.vin[0].sequence = 0xffff_fffe;
        assert_eq!(classify(&tx), None);

        tx.vin[0].sequence = 0x8012_3456;
        tx.vin.push(tx.vin[0].clone());
        assert_eq!(classify(&tx), None);
    }
}
