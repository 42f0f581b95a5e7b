//! Lookup behaviour of the broker on the CLI backend

mod common;

use brokkr_secrets::{DocumentReference, Error, SecretReference};
use common::{cli_broker, cli_config, FakeOp, ACCOUNT};

fn reference(vault: &str, item: &str, field: &str) -> SecretReference {
    SecretReference::new(ACCOUNT, vault, item, field)
}

// ═══════════════════════════════════════════════════════════════════════════
// Caching
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn repeated_lookups_of_one_item_fetch_it_once() {
    let op = FakeOp::signed_in();
    op.add_item("Prod", "db", &[("username", "admin"), ("password", "hunter2")]);
    let broker = cli_broker(cli_config(), &op);

    assert_eq!(broker.get(&reference("Prod", "db", "username")).await.unwrap(), "admin");
    assert_eq!(broker.get(&reference("Prod", "db", "password")).await.unwrap(), "hunter2");
    assert_eq!(broker.get(&reference("Prod", "db", "password")).await.unwrap(), "hunter2");

    assert_eq!(op.log.count(&["item", "get", "db"]), 1);
    let (items, _) = broker.cache_stats();
    assert_eq!(items.misses, 1);
    assert_eq!(items.hits, 2);
}

#[tokio::test]
async fn concurrent_lookups_share_one_fetch() {
    let op = FakeOp::signed_in();
    op.add_item("Prod", "api", &[("key", "k"), ("secret", "s")]);
    let broker = cli_broker(cli_config(), &op);

    let key = reference("Prod", "api", "key");
    let secret = reference("Prod", "api", "secret");
    let (a, b) = tokio::join!(broker.get(&key), broker.get(&secret));

    assert_eq!(a.unwrap(), "k");
    assert_eq!(b.unwrap(), "s");
    assert_eq!(op.log.count(&["item", "get", "api"]), 1);
}

#[tokio::test]
async fn invalidated_item_is_fetched_again() {
    let op = FakeOp::signed_in();
    op.add_item("Prod", "db", &[("password", "old")]);
    let broker = cli_broker(cli_config(), &op);

    assert_eq!(broker.get(&reference("Prod", "db", "password")).await.unwrap(), "old");
    op.add_item("Prod", "db", &[("password", "new")]);
    assert_eq!(broker.get(&reference("Prod", "db", "password")).await.unwrap(), "old");

    broker.invalidate_item("", "Prod", "db");
    assert_eq!(broker.get(&reference("Prod", "db", "password")).await.unwrap(), "new");
    assert_eq!(op.log.count(&["item", "get", "db"]), 2);
}

#[tokio::test]
async fn titles_with_slashes_do_not_share_a_cache_entry() {
    let op = FakeOp::signed_in();
    op.add_item("a/b", "c", &[("password", "from-a-b-vault")]);
    op.add_item("a", "b/c", &[("password", "from-a-vault")]);
    let broker = cli_broker(cli_config(), &op);

    assert_eq!(
        broker.get(&reference("a/b", "c", "password")).await.unwrap(),
        "from-a-b-vault"
    );
    assert_eq!(
        broker.get(&reference("a", "b/c", "password")).await.unwrap(),
        "from-a-vault"
    );
    assert_eq!(op.log.count(&["item", "get"]), 2);
}

#[tokio::test]
async fn invalidating_one_document_keeps_its_neighbours() {
    let op = FakeOp::signed_in();
    op.add_document("Prod", "tls", "cert-v1");
    op.add_document("Prod", "tls-ca", "ca-v1");
    let broker = cli_broker(cli_config(), &op);

    let tls = DocumentReference::new("Prod", "tls");
    let ca = DocumentReference::new("Prod", "tls-ca");
    broker.get_document(&tls).await.unwrap();
    broker.get_document(&ca).await.unwrap();

    broker.invalidate_item("", "Prod", "tls");
    broker.get_document(&tls).await.unwrap();
    broker.get_document(&ca).await.unwrap();
    assert_eq!(op.log.count(&["document", "get", "tls"]), 2);
    assert_eq!(op.log.count(&["document", "get", "tls-ca"]), 1);
}

#[tokio::test]
async fn missing_item_is_remembered() {
    let op = FakeOp::signed_in();
    let broker = cli_broker(cli_config(), &op);

    for _ in 0..2 {
        let err = broker.get(&reference("Prod", "ghost", "x")).await.unwrap_err();
        assert!(matches!(err, Error::ItemNotFound { .. }), "got {err:?}");
    }
    assert_eq!(op.log.count(&["item", "get", "ghost"]), 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// Values and errors
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn values_are_trimmed_and_escaped_newlines_expanded() {
    let op = FakeOp::signed_in();
    op.add_item(
        "Prod",
        "tls",
        &[("key", "  -----BEGIN KEY-----\\nabc\\n-----END KEY-----\n")],
    );
    let broker = cli_broker(cli_config(), &op);

    assert_eq!(
        broker.get(&reference("Prod", "tls", "key")).await.unwrap(),
        "-----BEGIN KEY-----\nabc\n-----END KEY-----"
    );
}

#[tokio::test]
async fn notes_field_is_reachable_by_its_alias() {
    let op = FakeOp::signed_in();
    op.add_item("Prod", "memo", &[("notesPlain", "remember me")]);
    let broker = cli_broker(cli_config(), &op);

    assert_eq!(broker.get(&reference("Prod", "memo", "notes")).await.unwrap(), "remember me");
    assert_eq!(
        broker.get(&reference("Prod", "memo", "notesPlain")).await.unwrap(),
        "remember me"
    );
}

#[tokio::test]
async fn missing_field_names_the_field() {
    let op = FakeOp::signed_in();
    op.add_item("Prod", "db", &[("username", "admin")]);
    let broker = cli_broker(cli_config(), &op);

    let err = broker.get(&reference("Prod", "db", "password")).await.unwrap_err();
    match err {
        Error::FieldNotFound { vault, item, field } => {
            assert_eq!((vault.as_str(), item.as_str(), field.as_str()), ("Prod", "db", "password"));
        }
        other => panic!("expected FieldNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn lookup_without_session_fails_before_touching_the_vault() {
    let op = FakeOp::new();
    op.add_item("Prod", "db", &[("password", "x")]);
    let broker = cli_broker(cli_config(), &op);

    let err = broker.get(&reference("Prod", "db", "password")).await.unwrap_err();
    assert!(matches!(err, Error::NotSignedIn { ref account } if account == ACCOUNT));
    op.log.assert_not_called(&["item", "get"]);
}

#[tokio::test]
async fn empty_account_uses_the_configured_default() {
    let op = FakeOp::signed_in();
    op.add_item("Prod", "db", &[("password", "x")]);
    let broker = cli_broker(cli_config(), &op);

    let value = broker
        .get(&SecretReference::new("", "Prod", "db", "password"))
        .await
        .unwrap();
    assert_eq!(value, "x");
    assert!(op
        .log
        .calls()
        .iter()
        .any(|args| args[..2] == ["item", "get"] && args.contains(&ACCOUNT.to_string())));
}

#[tokio::test]
async fn incomplete_reference_is_rejected() {
    let op = FakeOp::signed_in();
    let broker = cli_broker(cli_config(), &op);

    let err = broker.get(&reference("", "db", "password")).await.unwrap_err();
    assert!(matches!(err, Error::InvalidReference { .. }));
    assert!(op.log.calls().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
// Documents
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn documents_are_returned_verbatim_and_cached() {
    let op = FakeOp::signed_in();
    let pem = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";
    op.add_document("Prod", "cert", pem);
    let broker = cli_broker(cli_config(), &op);

    let doc = DocumentReference::new("Prod", "cert");
    assert_eq!(broker.get_document(&doc).await.unwrap(), pem);
    assert_eq!(broker.get_document(&doc).await.unwrap(), pem);
    assert_eq!(op.log.count(&["document", "get", "cert"]), 1);
}

#[tokio::test]
async fn missing_document_is_item_not_found() {
    let op = FakeOp::signed_in();
    let broker = cli_broker(cli_config(), &op);

    let err = broker
        .get_document(&DocumentReference::new("Prod", "nope"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}
