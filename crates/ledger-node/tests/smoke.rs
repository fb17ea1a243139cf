//! End-to-end smoke test for ledger-node.
//!
//! Starts a real node process against a fresh data directory, creates two
//! balances and commits a transfer between them over JSON-RPC, and asserts
//! the resulting balances and transaction record.
//!
//! Run with:
//!   cargo test -p ledger-node --test smoke

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use serde_json::json;
use uuid::Uuid;

struct NodeGuard {
    child: Child,
    data_dir: PathBuf,
}

impl Drop for NodeGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.data_dir);
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

async fn rpc_call(client: &reqwest::Client, url: &str, method: &str, params: serde_json::Value) -> serde_json::Value {
    let body = json!({ "jsonrpc": "2.0", "method": method, "params": params, "id": 1 });
    let resp = client
        .post(url)
        .json(&body)
        .send()
        .await
        .unwrap_or_else(|e| panic!("RPC call {method} failed: {e}"));
    let value: serde_json::Value = resp.json().await.expect("parse RPC JSON");
    if let Some(err) = value.get("error") {
        panic!("RPC error from {method}: {err}");
    }
    value["result"].clone()
}

async fn wait_for_rpc(client: &reqwest::Client, url: &str, timeout: Duration) -> bool {
    let body = json!({ "jsonrpc": "2.0", "method": "ledger_listTransactions", "params": [Uuid::new_v4().to_string(), null_or_none(), null_or_none()], "id": 1 });
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Ok(resp) = client.post(url).json(&body).send().await {
            if resp.status().is_success() {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    false
}

fn null_or_none() -> serde_json::Value {
    serde_json::Value::Null
}

#[tokio::test]
async fn smoke_create_balances_and_transfer() {
    let data_dir = std::env::temp_dir().join(format!("ledger_e2e_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&data_dir);
    std::fs::create_dir_all(&data_dir).unwrap();

    let rpc_port = free_port();
    let rpc_url = format!("http://127.0.0.1:{}", rpc_port);

    let node_bin = env!("CARGO_BIN_EXE_ledger-node");
    let child = Command::new(node_bin)
        .args([
            "--data-dir",
            data_dir.join("state").to_str().unwrap(),
            "--rpc-addr",
            &format!("127.0.0.1:{}", rpc_port),
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn ledger-node");

    let _guard = NodeGuard { child, data_dir };

    let http = reqwest::Client::new();
    assert!(
        wait_for_rpc(&http, &rpc_url, Duration::from_secs(20)).await,
        "ledger-node did not become ready within 20 seconds"
    );

    let org_id = Uuid::new_v4().to_string();
    let ledger_id = Uuid::new_v4().to_string();
    let alice_account = Uuid::new_v4().to_string();
    let bob_account = Uuid::new_v4().to_string();

    let alice = rpc_call(
        &http,
        &rpc_url,
        "ledger_createBalance",
        json!([org_id, ledger_id, alice_account, "@alice", null_or_none(), "USD", "DEPOSIT", true, true]),
    )
    .await;
    let bob = rpc_call(
        &http,
        &rpc_url,
        "ledger_createBalance",
        json!([org_id, ledger_id, bob_account, "@bob", null_or_none(), "USD", "DEPOSIT", true, true]),
    )
    .await;
    assert_eq!(alice["available"], "0");
    assert_eq!(bob["available"], "0");

    // Fund alice directly isn't part of the wire surface (external funding is
    // out of scope), so the transfer uses an external-style balance minted at
    // creation is not available either — instead seed via a balanced transfer
    // from a throwaway `@mint` external account created with no cap checks.
    let mint_account = Uuid::new_v4().to_string();
    rpc_call(
        &http,
        &rpc_url,
        "ledger_createBalance",
        json!([org_id, ledger_id, mint_account, "@mint", null_or_none(), "USD", "EXTERNAL", true, true]),
    )
    .await;

    let plan = json!({
        "sources": [{"alias": "@mint", "key": "default", "amount": "100", "asset_code": "USD"}],
        "destinations": [{"alias": "@alice", "key": "default", "amount": "100", "asset_code": "USD"}],
        "rate": null,
        "description": "seed alice",
        "metadata": null,
    });
    let tx1 = rpc_call(
        &http,
        &rpc_url,
        "ledger_postTransactionJson",
        json!([org_id, ledger_id, null_or_none(), plan, null_or_none()]),
    )
    .await;
    assert_eq!(tx1["status"], "APPROVED");

    let plan2 = json!({
        "sources": [{"alias": "@alice", "key": "default", "amount": "40", "asset_code": "USD"}],
        "destinations": [{"alias": "@bob", "key": "default", "amount": "40", "asset_code": "USD"}],
        "rate": null,
        "description": "alice pays bob",
        "metadata": null,
    });
    let tx2 = rpc_call(
        &http,
        &rpc_url,
        "ledger_postTransactionJson",
        json!([org_id, ledger_id, "idem-key-1", plan2, null_or_none()]),
    )
    .await;
    assert_eq!(tx2["status"], "APPROVED");

    let alice_balance = rpc_call(
        &http,
        &rpc_url,
        "ledger_getBalance",
        json!([org_id, ledger_id, alice_account, null_or_none()]),
    )
    .await;
    let bob_balance = rpc_call(
        &http,
        &rpc_url,
        "ledger_getBalance",
        json!([org_id, ledger_id, bob_account, null_or_none()]),
    )
    .await;
    assert_eq!(alice_balance["available"], "60");
    assert_eq!(bob_balance["available"], "40");

    // Replaying the same idempotency key must return the same transaction,
    // not move funds a second time.
    let tx2_replay = rpc_call(
        &http,
        &rpc_url,
        "ledger_postTransactionJson",
        json!([org_id, ledger_id, "idem-key-1", plan2, null_or_none()]),
    )
    .await;
    assert_eq!(tx2_replay["id"], tx2["id"]);
    let alice_balance_after_replay = rpc_call(
        &http,
        &rpc_url,
        "ledger_getBalance",
        json!([org_id, ledger_id, alice_account, null_or_none()]),
    )
    .await;
    assert_eq!(alice_balance_after_replay["available"], "60");

    let fetched_tx = rpc_call(&http, &rpc_url, "ledger_getTransaction", json!([tx2["id"]])).await;
    assert_eq!(fetched_tx["id"], tx2["id"]);

    let page = rpc_call(
        &http,
        &rpc_url,
        "ledger_listTransactions",
        json!([ledger_id, null_or_none(), null_or_none()]),
    )
    .await;
    assert_eq!(page["items"].as_array().unwrap().len(), 2);
}
