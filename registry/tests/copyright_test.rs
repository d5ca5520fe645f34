//! Integration tests for copyright registration and transfer.

use std::sync::Arc;

use attest_protocol::identity::{IdentityProvider, LocalIdentity};
use attest_protocol::ledger::{BlockContent, Ledger, LedgerStore};
use attest_protocol::LedgerConfig;
use attest_registry::{CopyrightRegistration, CopyrightRegistry, LicenseType, RegistryError};

async fn ledger_with_content() -> (Arc<Ledger>, String) {
    let ledger = Arc::new(Ledger::new(LedgerConfig::with_difficulty(1)).unwrap());
    let block = ledger
        .create_block(BlockContent::new("Song", "lyrics"), &LocalIdentity::generate())
        .await
        .unwrap();
    (ledger, block.id)
}

fn public_domain(content_id: &str, owner: impl Into<String>) -> CopyrightRegistration {
    CopyrightRegistration::new(content_id, owner, LicenseType::PublicDomain)
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn register_sets_both_owners() {
    let (ledger, content_id) = ledger_with_content().await;
    let registry = CopyrightRegistry::new(ledger);
    let alice = LocalIdentity::generate();

    let record = registry
        .register_copyright(
            CopyrightRegistration::new(
                &content_id,
                alice.current_address(),
                LicenseType::CreativeCommons,
            )
            .with_royalty_bps(250),
        )
        .unwrap();

    assert!(record.id.starts_with("copyright-"));
    assert_eq!(record.owner, alice.current_address());
    assert_eq!(record.original_owner, alice.current_address());
    assert_eq!(record.jurisdiction, "KR");
    assert_eq!(record.royalty_rate_bps, Some(250));
    assert!(record.transfer_history.is_empty());
    assert!(registry.verify_copyright(&record.id));
    assert_eq!(registry.copyright_for_content(&content_id), Some(record));
}

#[tokio::test]
async fn second_registration_is_duplicate() {
    let (ledger, content_id) = ledger_with_content().await;
    let registry = CopyrightRegistry::new(ledger);
    let owner = LocalIdentity::generate().current_address();

    registry
        .register_copyright(public_domain(&content_id, &owner))
        .unwrap();
    let err = registry
        .register_copyright(public_domain(&content_id, &owner))
        .unwrap_err();

    assert!(matches!(err, RegistryError::Duplicate { .. }));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn unknown_content_is_not_found() {
    let (ledger, _) = ledger_with_content().await;
    let registry = CopyrightRegistry::new(ledger);
    let err = registry
        .register_copyright(CopyrightRegistration::new(
            "block-missing",
            LocalIdentity::generate().current_address(),
            LicenseType::AllRightsReserved,
        ))
        .unwrap_err();
    assert!(matches!(err, RegistryError::NotFound { kind: "content", .. }));
}

#[tokio::test]
async fn custom_license_without_terms_rejected() {
    let (ledger, content_id) = ledger_with_content().await;
    let registry = CopyrightRegistry::new(ledger);
    let err = registry
        .register_copyright(CopyrightRegistration::new(
            &content_id,
            LocalIdentity::generate().current_address(),
            LicenseType::Custom,
        ))
        .unwrap_err();
    assert!(matches!(err, RegistryError::Validation(_)));
    assert!(registry.is_empty());
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transfers_accumulate_an_ordered_history() {
    let (ledger, content_id) = ledger_with_content().await;
    let registry = CopyrightRegistry::new(ledger);
    let alice = LocalIdentity::generate();
    let bob = LocalIdentity::generate();
    let carol = LocalIdentity::generate();

    let record = registry
        .register_copyright(CopyrightRegistration::new(
            &content_id,
            alice.current_address(),
            LicenseType::AllRightsReserved,
        ))
        .unwrap();

    let t1 = registry
        .transfer_copyright(&record.id, &alice, &bob.current_address(), Some(5_000_000), None)
        .unwrap();
    let t2 = registry
        .transfer_copyright(&record.id, &bob, &carol.current_address(), None, Some("Resale"))
        .unwrap();

    assert_eq!(t1.from, alice.current_address());
    assert_eq!(t1.to, bob.current_address());
    assert_eq!(t1.terms, "Standard transfer terms");
    assert_eq!(t2.from, bob.current_address());
    assert_eq!(t2.terms, "Resale");
    assert!(t2.timestamp > t1.timestamp);

    let record = registry.get_copyright(&record.id).unwrap();
    assert_eq!(record.transfer_history, vec![t1, t2]);
    assert_eq!(record.owner, carol.current_address());
    assert_eq!(record.original_owner, alice.current_address());
    assert_eq!(record.derived_owner(), record.owner);
    assert!(registry.verify_copyright(&record.id));
}

#[tokio::test]
async fn rapid_transfers_keep_strictly_increasing_timestamps() {
    let (ledger, content_id) = ledger_with_content().await;
    let registry = CopyrightRegistry::new(ledger);
    let a = LocalIdentity::generate();
    let b = LocalIdentity::generate();

    let record = registry
        .register_copyright(public_domain(&content_id, a.current_address()))
        .unwrap();

    for i in 0..10 {
        let (from, to) = if i % 2 == 0 { (&a, &b) } else { (&b, &a) };
        registry
            .transfer_copyright(&record.id, from, &to.current_address(), None, None)
            .unwrap();
    }

    let record = registry.get_copyright(&record.id).unwrap();
    assert_eq!(record.transfer_history.len(), 10);
    assert!(record
        .transfer_history
        .windows(2)
        .all(|w| w[0].timestamp < w[1].timestamp));
    assert!(registry.verify_copyright(&record.id));
}

#[tokio::test]
async fn only_the_current_owner_may_transfer() {
    let (ledger, content_id) = ledger_with_content().await;
    let registry = CopyrightRegistry::new(ledger);
    let alice = LocalIdentity::generate();
    let mallory = LocalIdentity::generate();

    let record = registry
        .register_copyright(public_domain(&content_id, alice.current_address()))
        .unwrap();

    let err = registry
        .transfer_copyright(&record.id, &mallory, &mallory.current_address(), None, None)
        .unwrap_err();
    match err {
        RegistryError::Unauthorized { expected, actual } => {
            assert_eq!(expected, alice.current_address());
            assert_eq!(actual, mallory.current_address());
        }
        other => panic!("expected Unauthorized, got {other:?}"),
    }
    assert!(registry.get_copyright(&record.id).unwrap().transfer_history.is_empty());
}

#[tokio::test]
async fn transfer_rejections() {
    let (ledger, content_id) = ledger_with_content().await;
    let registry = CopyrightRegistry::new(ledger);
    let alice = LocalIdentity::generate();

    let stranger = LocalIdentity::generate().current_address();
    assert!(matches!(
        registry.transfer_copyright("copyright-missing", &alice, &stranger, None, None),
        Err(RegistryError::NotFound { kind: "copyright", .. })
    ));

    let record = registry
        .register_copyright(public_domain(&content_id, alice.current_address()))
        .unwrap();

    assert!(matches!(
        registry.transfer_copyright(&record.id, &alice, "not-an-address", None, None),
        Err(RegistryError::Validation(_))
    ));
    assert!(matches!(
        registry.transfer_copyright(&record.id, &alice, &alice.current_address(), None, None),
        Err(RegistryError::Validation(_))
    ));
}

#[tokio::test]
async fn tampered_history_fails_verification() {
    let (ledger, content_id) = ledger_with_content().await;
    let registry = CopyrightRegistry::new(ledger);
    let alice = LocalIdentity::generate();
    let bob = LocalIdentity::generate();

    let record = registry
        .register_copyright(public_domain(&content_id, alice.current_address()))
        .unwrap();
    registry
        .transfer_copyright(&record.id, &alice, &bob.current_address(), Some(100), None)
        .unwrap();

    let mut record = registry.get_copyright(&record.id).unwrap();
    assert!(record.history_is_valid());

    record.transfer_history[0].price = Some(1);
    assert!(!record.history_is_valid());

    let mut record = registry.get_copyright(&record.id).unwrap();
    record.owner = alice.current_address();
    assert!(!record.history_is_valid());
}

#[tokio::test]
async fn copyrights_survive_reopen() {
    let store = LedgerStore::open_temporary().unwrap();
    let ledger = Arc::new(Ledger::open(store.clone(), LedgerConfig::with_difficulty(1)).unwrap());
    let content_id = ledger
        .create_block(BlockContent::new("A", "B"), &LocalIdentity::generate())
        .await
        .unwrap()
        .id;
    let alice = LocalIdentity::generate();
    let bob = LocalIdentity::generate();

    let id = {
        let registry = CopyrightRegistry::open(Arc::clone(&ledger), &store).unwrap();
        let record = registry
            .register_copyright(public_domain(&content_id, alice.current_address()))
            .unwrap();
        registry
            .transfer_copyright(&record.id, &alice, &bob.current_address(), None, None)
            .unwrap();
        record.id
    };

    let reopened = CopyrightRegistry::open(ledger, &store).unwrap();
    let record = reopened.get_copyright(&id).unwrap();
    assert_eq!(record.owner, bob.current_address());
    assert!(reopened.verify_copyright(&id));
    assert!(matches!(
        reopened.register_copyright(public_domain(&content_id, bob.current_address())),
        Err(RegistryError::Duplicate { .. })
    ));
}
