//! Uniform accessors over `VersionedMessage`
//!
//! Built batches are always v0, but the creation transaction and the test
//! fixtures may be legacy. The batcher and its tests inspect headers, signer
//! slots and lookup references through these helpers so neither has to
//! match on the message version.

use solana_sdk::{
    message::{v0::MessageAddressTableLookup, MessageHeader, VersionedMessage},
    pubkey::Pubkey,
};
use std::collections::HashSet;

#[inline]
#[must_use]
pub fn get_message_header(message: &VersionedMessage) -> &MessageHeader {
    match message {
        VersionedMessage::Legacy(legacy_msg) => &legacy_msg.header,
        VersionedMessage::V0(v0_msg) => &v0_msg.header,
    }
}

/// Keys embedded in the message itself, excluding lookup-table loads
#[inline]
#[must_use]
pub fn get_static_account_keys(message: &VersionedMessage) -> &[Pubkey] {
    match message {
        VersionedMessage::Legacy(legacy_msg) => &legacy_msg.account_keys,
        VersionedMessage::V0(v0_msg) => &v0_msg.account_keys,
    }
}

/// The leading `num_required_signatures` static keys; index 0 is the fee payer
#[inline]
#[must_use]
pub fn get_required_signers(message: &VersionedMessage) -> &[Pubkey] {
    let header = get_message_header(message);
    let keys = get_static_account_keys(message);
    let n = (header.num_required_signatures as usize).min(keys.len());
    &keys[..n]
}

#[inline]
#[must_use]
pub fn get_num_required_signatures(message: &VersionedMessage) -> usize {
    get_message_header(message).num_required_signatures as usize
}

/// Lookup-table references; always empty for legacy messages
#[inline]
#[must_use]
pub fn get_address_table_lookups(message: &VersionedMessage) -> &[MessageAddressTableLookup] {
    match message {
        VersionedMessage::Legacy(_) => &[],
        VersionedMessage::V0(v0_msg) => &v0_msg.address_table_lookups,
    }
}

/// True when the message's signer slots are exactly `expected`, ignoring order
#[must_use]
pub fn signer_set_matches(message: &VersionedMessage, expected: &[Pubkey]) -> bool {
    let required: HashSet<&Pubkey> = get_required_signers(message).iter().collect();
    let wanted: HashSet<&Pubkey> = expected.iter().collect();
    required.len() == get_num_required_signatures(message) && required == wanted
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{
        hash::Hash,
        message::{v0, Message},
        signature::{Keypair, Signer},
        system_instruction,
    };

    #[test]
    fn test_legacy_and_v0_agree_on_signers() {
        let payer = Keypair::new();
        let other = Keypair::new();
        let ixs = vec![
            system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1),
            system_instruction::transfer(&other.pubkey(), &Pubkey::new_unique(), 1),
        ];

        let legacy = VersionedMessage::Legacy(Message::new(&ixs, Some(&payer.pubkey())));
        let v0 = VersionedMessage::V0(
            v0::Message::try_compile(&payer.pubkey(), &ixs, &[], Hash::default()).unwrap(),
        );

        for message in [&legacy, &v0] {
            assert_eq!(get_num_required_signatures(message), 2);
            assert_eq!(get_required_signers(message)[0], payer.pubkey());
            assert!(signer_set_matches(message, &[other.pubkey(), payer.pubkey()]));
            assert!(!signer_set_matches(message, &[payer.pubkey()]));
        }
        assert!(get_address_table_lookups(&legacy).is_empty());
    }
}
