// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use crate::rpc::responses::Transaction;

/// Tags that pools put into the coinbase script, with the name the pool is known by.
///
/// The first tag found wins, so more specific tags go first.
const POOL_TAGS: &[(&str, &str)] = &[
    ("Mined by AntPool", "Antpool"),
    ("\u{1f41f}", "F2Pool"),
    ("Foundry USA Pool", "Foundry USA"),
    ("/ViaBTC/", "ViaBTC"),
    ("/slush/", "SlushPool"),
    ("/BTC.COM/", "BTC.com"),
    ("/poolin.com", "Poolin"),
    ("/Binance/", "Binance Pool"),
    ("/Huobi/", "Huobi"),
    ("/BTC.TOP/", "BTC.TOP"),
    ("SBICrypto", "SBI Crypto"),
    ("/1THash&58COIN/", "1THash & 58COIN"),
    ("Lubian.com", "Lubian.com"),
    ("MARA Pool", "MARA Pool"),
    ("/Bitfury/", "BitFury"),
    ("KanoPool", "KanoPool"),
];

/// Identifies the mining pool from the coinbase input of `tx`.
///
/// Returns `None` for a transaction without coinbase input and for unknown tags.
pub fn pool_from_coinbase_tx(tx: &Transaction) -> Option<&'static str> {
    let coinbase = tx.vin.iter().find_map(|input| input.coinbase.as_deref())?;
    pool_from_coinbase(&hex::decode(coinbase).ok()?)
}

/// Identifies the mining pool from the raw bytes of a coinbase script.
pub fn pool_from_coinbase(script: &[u8]) -> Option<&'static str> {
    POOL_TAGS
        .iter()
        .find(|(tag, _)| contains(script, tag.as_bytes()))
        .map(|(_, name)| *name)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rpc::responses::TxIn;

    fn coinbase_tx(coinbase: &str) -> Transaction {
        Transaction {
            txid: "99".repeat(32),
            locktime: 0,
            vin: vec![TxIn {
                coinbase: Some(coinbase.to_string()),
                txid: None,
                vout: None,
                txinwitness: Vec::new(),
                sequence: 0xffff_ffff,
            }],
            vout: Vec::new(),
        }
    }

    #[test]
    fn finds_antpool() {
        let tx = coinbase_tx(
            "0375e8081b4d696e656420627920416e74506f6f6c34381d00330020c85d207ffabe6d6d2bcb43e33b12c011f5e99afe1b4478d1001b7ce90db6b7c937793e89fafae6dd040000000000000052000000eb0b0200",
        );
        assert_eq!(pool_from_coinbase_tx(&tx), Some("Antpool"));
    }

    #[test]
    fn finds_f2pool() {
        let tx = coinbase_tx(
            "039de8082cfabe6d6db6e2235d03234641c5859b7b1864addea7c0c2ef07a68bb8ebc178ac804f4b6910000000f09f909f000f4d696e656420627920776c3337373100000000000000000000000000000000000000000000000000000000050024c5aa2a",
        );
        assert_eq!(pool_from_coinbase_tx(&tx), Some("F2Pool"));
    }

    #[test]
    fn unknown_or_missing_coinbase() {
        assert_eq!(pool_from_coinbase_tx(&coinbase_tx("03a0860100")), None);
        assert_eq!(pool_from_coinbase_tx(&coinbase_tx("not hex")), None);
        let mut tx = coinbase_tx("");
        tx.vin[0].coinbase = None;
        assert_eq!(pool_from_coinbase_tx(&tx), None);
    }
}
