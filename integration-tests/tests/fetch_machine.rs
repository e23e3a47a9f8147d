#![allow(non_snake_case)]

use admin_key::{
    AdminKeyRecord,
    AdminKeyStore,
};
use gacha::{
    Gacha,
    ReqwestTransport,
    Session,
    SubmodelKind,
    SyncAdapter,
    SyncError,
    SyncOptions,
    pipeline::PipelineState,
};
use integration_tests::FakeMachine;
use serde_json::{
    Value,
    json,
};
use tempdir::TempDir;

const KEY: &str = "secret";

fn serve_machine(machine: &FakeMachine, prefix: &str) {
    machine.serve(
        "GET",
        &format!("{prefix}get/info"),
        json!({
            "ownerKey": "owner",
            "ownerUserName": "owner.resident",
            "ownerDisplayName": "Owner",
            "price": 25,
            "scriptName": "gacha-script",
            "payoutCount": 1,
            "itemCount": 1,
            "inventoryCount": 2,
            "extra": { "btn_price": 25 },
        }),
    );
    machine.serve("GET", &format!("{prefix}get/config"), json!({ "folder_for_single_play": true }));
    machine.serve(
        "GET",
        &format!("{prefix}get/payouts/0"),
        json!({ "agentKey": "owner", "amount": 25 }),
    );
    machine.serve(
        "GET",
        &format!("{prefix}get/items/0"),
        json!({ "inventory": "golden ticket", "rarity": 0.5, "limit": 3, "bought": 1 }),
    );
    machine.serve(
        "GET",
        &format!("{prefix}get/invs/0"),
        json!({ "name": "golden ticket", "type": 0, "creator": "creator" }),
    );
    machine.serve(
        "GET",
        &format!("{prefix}get/invs/1"),
        json!({ "name": "gacha-script", "type": 10, "creator": "creator" }),
    );
}

fn gacha(document_url: &str, admin_key: Option<String>) -> Gacha {
    let session = Session::new(document_url)
        .unwrap()
        .with_admin_key(admin_key);
    Gacha::new(SyncAdapter::new(ReqwestTransport::new().unwrap(), session))
}

#[tokio::test]
async fn fetch__admin_key_loads_every_section_through_the_keyed_path() {
    // given
    let machine = FakeMachine::start().await.unwrap();
    serve_machine(&machine, "secret/");
    let mut gacha = gacha(&machine.document_url(), Some(KEY.to_string()));

    // when
    gacha
        .fetch(SyncOptions::new().load_admin(true))
        .await
        .unwrap();

    // then
    assert_eq!(
        machine.requested_paths(),
        vec![
            "secret/get/info",
            "secret/get/config",
            "secret/get/payouts/0",
            "secret/get/items/0",
            "secret/get/invs/0",
            "secret/get/invs/1",
        ]
    );
    assert!(machine.requests().iter().all(|request| request.method == "GET"));
    assert_eq!(gacha.pipeline_state(), PipelineState::Complete);
    assert_eq!(gacha.progress_percentage(), 100.0);
    assert!(gacha.is_valid());
    assert!(!gacha.has_changed_since_fetch());
    let notecard = gacha.to_notecard_json();
    assert_eq!(
        notecard["payouts"],
        json!([{ "agentKey": "owner", "amount": 25 }])
    );
    assert_eq!(notecard["items"][0]["inventory"], json!("golden ticket"));
    assert_eq!(gacha.to_live_json()["invs"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn fetch__without_key_stays_off_admin_routes() {
    // given
    let machine = FakeMachine::start().await.unwrap();
    serve_machine(&machine, "");
    let document_url = format!("{}?tab=payouts", machine.document_url().trim_end_matches('/'));
    let mut gacha = gacha(&document_url, None);

    // when
    gacha
        .fetch(SyncOptions::new().load_admin(true))
        .await
        .unwrap();

    // then
    assert_eq!(machine.requested_paths(), vec!["get/info", "get/items/0"]);
    for kind in SubmodelKind::ALL {
        assert_eq!(gacha.entry_progress(kind), Some(100.0));
    }
    let owner = gacha.payouts().get("owner").unwrap();
    assert_eq!(owner.amount, 25);
    assert_eq!(owner.display_name, "Owner");
}

#[tokio::test]
async fn fetch__null_body_stalls_the_pipeline() {
    // given
    let machine = FakeMachine::start().await.unwrap();
    machine.serve("GET", "get/info", json!({ "itemCount": 2 }));
    machine.serve("GET", "get/items/0", json!({ "inventory": "golden ticket" }));
    let mut gacha = gacha(&machine.document_url(), None);

    // when
    let result = gacha.fetch(SyncOptions::new()).await;

    // then
    assert!(matches!(result, Err(SyncError::NullResponse { .. })));
    assert_eq!(
        gacha.pipeline_state(),
        PipelineState::Stalled {
            at: SubmodelKind::Items
        }
    );
    assert_eq!(machine.requested_paths(), vec!["get/info", "get/items/0", "get/items/1"]);
    assert!(gacha.has_changed_since_fetch());
}

#[tokio::test]
async fn fetch__server_error_is_a_redacted_transport_error() {
    // given
    let machine = FakeMachine::start().await.unwrap();
    machine.serve_status("GET", "secret/get/info", 500);
    let mut gacha = gacha(&machine.document_url(), Some(KEY.to_string()));

    // when
    let error = gacha.fetch(SyncOptions::new()).await.unwrap_err();

    // then
    assert!(matches!(error, SyncError::Transport { .. }));
    assert!(!error.to_string().contains(KEY));
    assert_eq!(
        gacha.pipeline_state(),
        PipelineState::Stalled {
            at: SubmodelKind::Info
        }
    );
}

#[tokio::test]
async fn fetch__stored_admin_key_scopes_to_its_machine() {
    // given
    let machine = FakeMachine::start().await.unwrap();
    serve_machine(&machine, "secret/");
    let temp_dir = TempDir::new("gacha_admin_key").unwrap();
    let store = AdminKeyStore::open(temp_dir.path().join("admin-key.json"));
    store
        .save(&AdminKeyRecord::new(KEY, Some(machine.document_url())))
        .unwrap();
    let admin_key = store.resolve(&machine.document_url()).unwrap();
    let mut gacha = gacha(&machine.document_url(), admin_key);

    // when
    gacha
        .fetch(SyncOptions::new().load_admin(true))
        .await
        .unwrap();

    // then
    assert_eq!(
        gacha.config().get("folder_for_single_play"),
        Some(&Value::Bool(true))
    );
    assert_eq!(store.resolve("http://elsewhere.test/machine/").unwrap(), None);
}
