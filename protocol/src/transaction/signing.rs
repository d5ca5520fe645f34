//! Transaction signing and signature checks.
//!
//! Signing goes through an [`IdentityProvider`] because the key may live in
//! a wallet or remote signer. Verification needs no key lookup: the `from`
//! address decodes to the verifying key.

use super::builder::Transaction;
use crate::crypto::canonical::CanonicalError;
use crate::crypto::signatures::verify_hex;
use crate::identity::{public_key_from_address, IdentityProvider};

/// Signs `tx` in place as `signer`, setting `from` to the signer's address.
pub fn sign_transaction(
    tx: &mut Transaction,
    signer: &dyn IdentityProvider,
) -> Result<(), CanonicalError> {
    tx.from = signer.current_address();
    let signable = tx.signable_bytes()?;
    tx.signature = signer.sign(&signable).to_hex();
    Ok(())
}

/// True when `tx.signature` is a valid signature by `tx.from`.
pub fn verify_transaction(tx: &Transaction) -> bool {
    let Ok(public_key) = public_key_from_address(&tx.from) else {
        return false;
    };
    let Ok(signable) = tx.signable_bytes() else {
        return false;
    };
    verify_hex(&public_key, &signable, &tx.signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::LocalIdentity;
    use crate::transaction::builder::TransactionBuilder;
    use crate::transaction::types::TransactionType;
    use serde_json::json;

    fn unsigned() -> Transaction {
        TransactionBuilder::new(TransactionType::Create)
            .data(json!({ "title": "A", "body": "B" }))
            .fee(1_000)
            .build()
    }

    #[test]
    fn sign_then_verify() {
        let id = LocalIdentity::generate();
        let mut tx = unsigned();
        sign_transaction(&mut tx, &id).unwrap();

        assert!(tx.is_signed());
        assert_eq!(tx.from, id.current_address());
        assert!(verify_transaction(&tx));
    }

    #[test]
    fn unsigned_fails() {
        let mut tx = unsigned();
        tx.from = LocalIdentity::generate().current_address();
        assert!(!verify_transaction(&tx));
    }

    #[test]
    fn tampered_data_fails() {
        let id = LocalIdentity::generate();
        let mut tx = unsigned();
        sign_transaction(&mut tx, &id).unwrap();
        tx.data = json!({ "title": "A", "body": "changed" });
        assert!(!verify_transaction(&tx));
    }

    #[test]
    fn reassigned_sender_fails() {
        let id = LocalIdentity::generate();
        let mut tx = unsigned();
        sign_transaction(&mut tx, &id).unwrap();
        tx.from = LocalIdentity::generate().current_address();
        assert!(!verify_transaction(&tx));
    }

    #[test]
    fn malformed_sender_fails() {
        let id = LocalIdentity::generate();
        let mut tx = unsigned();
        sign_transaction(&mut tx, &id).unwrap();
        tx.from = "System".into();
        assert!(!verify_transaction(&tx));
    }
}
