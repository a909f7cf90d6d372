use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use mixer_core::{Address, Nullifier};
use mixer_state::{decode_instruction, Effect, Instruction, Outcome, Verdict};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::node::{Envelope, Node, Submission};
use crate::unix_now;

const DEFAULT_PAGE_LIMIT: u64 = 10;
/// Longest request line accepted, newline included.
const MAX_REQUEST_BYTES: u64 = 64 * 1024;
const ADMIN_NEEDS_AUTH: &str = "admin instructions require an auth token";

/// Accept connections on `addr` until the listener fails. One thread per client;
/// every request serializes on the node lock.
pub fn serve_rpc(
    addr: &str,
    auth_token: Option<String>,
    node: Arc<Mutex<Node>>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr)?;
    info!(addr, "rpc listening");
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let node = Arc::clone(&node);
                let auth_token = auth_token.clone();
                thread::spawn(move || {
                    if let Err(e) = handle_client(stream, auth_token, node) {
                        debug!(error = %e, "rpc client closed");
                    }
                });
            }
            Err(e) => warn!(error = %e, "rpc accept failed"),
        }
    }
    Ok(())
}

fn handle_client(
    stream: TcpStream,
    auth_token: Option<String>,
    node: Arc<Mutex<Node>>,
) -> std::io::Result<()> {
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        let resp = match read_request(&mut reader, &mut line)? {
            ReadRequest::Eof => return Ok(()),
            ReadRequest::TooLarge => {
                writer.write_all(b"{\"ok\":false,\"error\":\"request too large\"}\n")?;
                return Ok(());
            }
            ReadRequest::Line => match serde_json::from_str::<Value>(&line) {
                Ok(v) => handle_request(v, &auth_token, &node, unix_now()),
                Err(_) => json!({"ok": false, "error": "invalid json"}),
            },
        };
        writer.write_all(resp.to_string().as_bytes())?;
        writer.write_all(b"\n")?;
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ReadRequest {
    Line,
    Eof,
    TooLarge,
}

/// Read one request line into `line`, never buffering more than `MAX_REQUEST_BYTES`.
fn read_request<R: BufRead>(reader: &mut R, line: &mut String) -> std::io::Result<ReadRequest> {
    line.clear();
    let n = Read::take(&mut *reader, MAX_REQUEST_BYTES).read_line(line)?;
    if n == 0 {
        Ok(ReadRequest::Eof)
    } else if !line.ends_with('\n') && n as u64 >= MAX_REQUEST_BYTES {
        Ok(ReadRequest::TooLarge)
    } else {
        Ok(ReadRequest::Line)
    }
}

fn handle_request(v: Value, auth_token: &Option<String>, node: &Mutex<Node>, now: u64) -> Value {
    if let Some(expected) = auth_token {
        match v.get("auth").and_then(|a| a.as_str()) {
            Some(tok) if tok == expected => {}
            _ => return json!({"ok": false, "error": "Unauthorized"}),
        }
    }
    let method = match v.get("method").and_then(|m| m.as_str()) {
        Some(m) => m,
        None => return json!({"ok": false, "error": "missing method"}),
    };

    match method {
        "ping" => json!({"ok": true}),
        "submit" => {
            let env: Envelope = match serde_json::from_value(v.clone()) {
                Ok(env) => env,
                Err(e) => return json!({"ok": false, "error": format!("bad envelope: {e}")}),
            };
            // Without a token the sender is whatever the client claims.
            if auth_token.is_none()
                && serde_json::from_value::<Instruction>(env.instruction.clone())
                    .is_ok_and(|ix| ix.requires_admin())
            {
                return json!({"ok": false, "error": ADMIN_NEEDS_AUTH});
            }
            let mut node = match lock(node) {
                Ok(n) => n,
                Err(resp) => return resp,
            };
            submission_response(node.submit_envelope(env, now))
        }
        "submit_raw" => {
            let sender = match parse_field::<Address>(&v, "sender") {
                Ok(a) => a,
                Err(resp) => return resp,
            };
            let input_hex = match v.get("input_hex").and_then(|p| p.as_str()) {
                Some(p) => p,
                None => return json!({"ok": false, "error": "missing input_hex"}),
            };
            let bytes = match hex::decode(input_hex.strip_prefix("0x").unwrap_or(input_hex)) {
                Ok(b) => b,
                Err(_) => return json!({"ok": false, "error": "bad hex"}),
            };
            if auth_token.is_none() && decode_instruction(&bytes).is_ok_and(|ix| ix.requires_admin())
            {
                return json!({"ok": false, "error": ADMIN_NEEDS_AUTH});
            }
            let mut node = match lock(node) {
                Ok(n) => n,
                Err(resp) => return resp,
            };
            submission_response(node.submit_raw(sender, now, &bytes))
        }
        "get_summary" => {
            let node = match lock(node) {
                Ok(n) => n,
                Err(resp) => return resp,
            };
            let summary = node.query().summary();
            json!({
                "ok": true,
                "denomination": summary.denomination.units(),
                "deposit_count": summary.deposit_count,
                "nullifier_count": summary.nullifier_count,
                "total_value": summary.total_value.units(),
                "root": summary.root.to_string(),
                "tree_height": summary.tree_height,
                "halted": summary.halted,
            })
        }
        "get_deposits" => {
            let page = v.get("page").and_then(|p| p.as_u64()).unwrap_or(1);
            let limit = v
                .get("limit")
                .and_then(|p| p.as_u64())
                .unwrap_or(DEFAULT_PAGE_LIMIT);
            let node = match lock(node) {
                Ok(n) => n,
                Err(resp) => return resp,
            };
            match node.query().deposits(page, limit) {
                Ok(page) => {
                    let deposits: Vec<Value> = page
                        .deposits
                        .iter()
                        .map(|r| {
                            json!({
                                "commitment": r.commitment.to_string(),
                                "leaf_index": r.leaf_index,
                                "accepted_at": r.accepted_at,
                            })
                        })
                        .collect();
                    json!({
                        "ok": true,
                        "deposits": deposits,
                        "page": page.page,
                        "limit": page.limit,
                        "total": page.total,
                        "total_pages": page.total_pages,
                    })
                }
                Err(e) => json!({"ok": false, "error": e.to_string()}),
            }
        }
        "is_nullifier_used" => {
            let nf = match parse_field::<Nullifier>(&v, "nullifier") {
                Ok(nf) => nf,
                Err(resp) => return resp,
            };
            let node = match lock(node) {
                Ok(n) => n,
                Err(resp) => return resp,
            };
            json!({"ok": true, "used": node.query().is_nullifier_used(&nf)})
        }
        "get_path" => {
            let leaf_index = match v.get("leaf_index").and_then(|p| p.as_u64()) {
                Some(i) => i,
                None => return json!({"ok": false, "error": "missing leaf_index"}),
            };
            let node = match lock(node) {
                Ok(n) => n,
                Err(resp) => return resp,
            };
            let query = node.query();
            match query.inclusion_path(leaf_index) {
                Ok(path) => json!({
                    "ok": true,
                    "root": query.summary().root.to_string(),
                    "path": path,
                }),
                Err(e) => json!({"ok": false, "error": e.to_string()}),
            }
        }
        "health" => {
            let node = match lock(node) {
                Ok(n) => n,
                Err(resp) => return resp,
            };
            let health = node.query().health(now, node.max_idle_secs());
            json!({
                "ok": true,
                "status": health.status,
                "last_processed_at": health.last_processed_at,
                "idle_secs": health.idle_secs,
                "processed": health.processed,
                "fatal": node.is_fatal(),
            })
        }
        "state_digest" => {
            let node = match lock(node) {
                Ok(n) => n,
                Err(resp) => return resp,
            };
            match node.ledger().state_digest() {
                Ok(d) => json!({"ok": true, "digest": d.to_string()}),
                Err(e) => json!({"ok": false, "error": e.to_string()}),
            }
        }
        _ => json!({"ok": false, "error": "unknown method"}),
    }
}

fn lock(node: &Mutex<Node>) -> Result<MutexGuard<'_, Node>, Value> {
    node.lock()
        .map_err(|_| json!({"ok": false, "error": "node lock poisoned"}))
}

fn parse_field<T: std::str::FromStr>(v: &Value, key: &str) -> Result<T, Value> {
    let raw = match v.get(key).and_then(|p| p.as_str()) {
        Some(p) => p,
        None => return Err(json!({"ok": false, "error": format!("missing {key}")})),
    };
    raw.parse()
        .map_err(|_| json!({"ok": false, "error": format!("bad {key}")}))
}

fn submission_response(result: anyhow::Result<Submission>) -> Value {
    match result {
        Ok(sub) => {
            let mut resp = outcome_json(&sub.outcome);
            resp["ok"] = json!(true);
            resp["input_index"] = json!(sub.input_index);
            resp["timestamp"] = json!(sub.timestamp);
            resp
        }
        Err(e) => json!({"ok": false, "error": format!("{e:#}")}),
    }
}

fn outcome_json(outcome: &Outcome) -> Value {
    let (verdict, reason) = match outcome.verdict {
        Verdict::Accept => ("accept", Value::Null),
        Verdict::Reject(r) => ("reject", json!(r.code())),
    };
    let effects: Vec<Value> = outcome
        .effects
        .iter()
        .map(|e| match e {
            Effect::Notice(bytes) => {
                json!({"notice": String::from_utf8_lossy(bytes)})
            }
            Effect::Transfer(t) => json!({
                "transfer": {
                    "from": t.from.to_string(),
                    "to": t.to.to_string(),
                    "amount": t.amount.units(),
                }
            }),
        })
        .collect();
    json!({
        "verdict": verdict,
        "reason": reason,
        "effects": effects,
    })
}
