//! Black-box scenario tests exercising the end-to-end scenarios of the
//! runtime's public crate API only — no internal types, no `pub(crate)`
//! access. Each test name maps to one numbered scenario.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use verge_bus::{Bus, BusConfig};
use verge_core::Body;
use verge_logstore::{Durability, LogStore, LogStoreConfig};
use verge_vm::{MethodBuilder, ModuleBuilder, Opcode, Value, Vm, VmConfig};

fn body(v: serde_json::Value) -> Body {
    Body::encode(&v).unwrap()
}

/// Scenario 1: assemble `LOADINT 5; LOADINT 3; ADD; LOADINT 2; MUL; HALT`
/// and confirm the top-of-stack result is 16.
#[tokio::test]
async fn arithmetic_vm_computes_five_plus_three_times_two() {
    let mut mb = ModuleBuilder::new("arith");
    let mut main = MethodBuilder::new("main", 8, 0);
    main.op_imm(Opcode::LoadInt, 5)
        .op_imm(Opcode::LoadInt, 3)
        .op(Opcode::Add)
        .op_imm(Opcode::LoadInt, 2)
        .op(Opcode::Mul)
        .op(Opcode::Halt);
    mb.add_method(main.build().unwrap());

    let vm = Vm::new(VmConfig::default());
    vm.load_module(mb.build()).unwrap();
    let cancel = CancellationToken::new();
    let result = vm.run("arith", "main", vec![], &cancel).await.unwrap();
    assert_eq!(result, Value::Int(16));
}

/// Scenario 2: a backward-jump loop computing `fib(10)` returns 55.
#[tokio::test]
async fn fibonacci_vm_backward_jump_loop_computes_fib_10() {
    let mut mb = ModuleBuilder::new("fib");
    // locals: 0=n, 1=a, 2=b, 3=tmp
    let mut main = MethodBuilder::new("main", 8, 4);
    main.op_imm(Opcode::LoadInt, 10)
        .op_imm(Opcode::Store, 0)
        .op_imm(Opcode::LoadInt, 0)
        .op_imm(Opcode::Store, 1)
        .op_imm(Opcode::LoadInt, 1)
        .op_imm(Opcode::Store, 2)
        .label("top")
        .op_imm(Opcode::Load, 0)
        .jump(Opcode::Jz, "done")
        .op_imm(Opcode::Load, 1)
        .op_imm(Opcode::Load, 2)
        .op(Opcode::Add)
        .op_imm(Opcode::Store, 3)
        .op_imm(Opcode::Load, 2)
        .op_imm(Opcode::Store, 1)
        .op_imm(Opcode::Load, 3)
        .op_imm(Opcode::Store, 2)
        .op_imm(Opcode::Load, 0)
        .op_imm(Opcode::LoadInt, 1)
        .op(Opcode::Sub)
        .op_imm(Opcode::Store, 0)
        .jump(Opcode::Jmp, "top")
        .label("done")
        .op_imm(Opcode::Load, 1)
        .op(Opcode::Halt);
    mb.add_method(main.build().unwrap());

    let vm = Vm::new(VmConfig::default());
    vm.load_module(mb.build()).unwrap();
    let cancel = CancellationToken::new();
    let result = vm.run("fib", "main", vec![], &cancel).await.unwrap();
    assert_eq!(result, Value::Int(55));
}

/// Scenario 3: a consumer on `echo` replies with its body plus `ok: true`;
/// `request` returns that decoded shape.
#[tokio::test]
async fn request_reply_echo_round_trips() {
    let bus = Bus::new(BusConfig::default());
    let bus_for_handler = Arc::clone(&bus);
    let echo = bus.consumer("echo");
    echo.handler(move |msg: verge_core::Message, _ctx| {
        let bus = Arc::clone(&bus_for_handler);
        async move {
            let mut value: serde_json::Value = msg.body.decode()?;
            value["ok"] = json!(true);
            let reply_body = Body::encode(&value)?;
            if let Some(reply_to) = &msg.reply_address {
                bus.send(reply_to, reply_body)?;
            }
            Ok(())
        }
    });

    let reply = bus
        .request("echo", body(json!({"msg": "hi"})), Duration::from_secs(2))
        .await
        .unwrap();
    let decoded: serde_json::Value = reply.body.decode().unwrap();
    assert_eq!(decoded, json!({"msg": "hi", "ok": true}));
    bus.close().await;
}

/// Scenario 4: two consumers on `work`; 10 publishes and 50 sends yield
/// exactly 20 fanout deliveries (10 each) and 50 unicast deliveries (all
/// landing on the first-registered consumer).
#[tokio::test]
async fn fanout_and_unicast_delivery_counts_match_scenario() {
    let bus = Bus::new(BusConfig::default());

    let fanout_a = Arc::new(AtomicUsize::new(0));
    let fanout_b = Arc::new(AtomicUsize::new(0));
    let unicast_hits = Arc::new(AtomicUsize::new(0));

    let first = bus.consumer("work");
    let fa = Arc::clone(&fanout_a);
    let ua = Arc::clone(&unicast_hits);
    first.handler(move |msg: verge_core::Message, _ctx| {
        let fa = Arc::clone(&fa);
        let ua = Arc::clone(&ua);
        async move {
            let decoded: serde_json::Value = msg.body.decode()?;
            if decoded["kind"] == json!("fanout") {
                fa.fetch_add(1, Ordering::SeqCst);
            } else {
                ua.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    });

    let second = bus.consumer("work");
    let fb = Arc::clone(&fanout_b);
    second.handler(move |msg: verge_core::Message, _ctx| {
        let fb = Arc::clone(&fb);
        async move {
            let decoded: serde_json::Value = msg.body.decode()?;
            if decoded["kind"] == json!("fanout") {
                fb.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    });

    for _ in 0..10 {
        bus.publish("work", body(json!({"kind": "fanout"}))).unwrap();
    }
    for _ in 0..50 {
        bus.send("work", body(json!({"kind": "unicast"}))).unwrap();
    }

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(fanout_a.load(Ordering::SeqCst), 10);
    assert_eq!(fanout_b.load(Ordering::SeqCst), 10);
    assert_eq!(unicast_hits.load(Ordering::SeqCst), 50);
    bus.close().await;
}

/// Scenario 5: append "one"/"two" in fsync mode, close, reopen, and
/// confirm `read(0, 10)` returns exactly `[{0,"one"},{1,"two"}]`.
#[tokio::test]
async fn log_round_trips_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = LogStoreConfig::new(dir.path());
    config.durability = Durability::Fsync;

    {
        let store = LogStore::open(config.clone(), None).await.unwrap();
        let o0 = store.append(b"one".to_vec()).await.unwrap();
        let o1 = store.append(b"two".to_vec()).await.unwrap();
        assert_eq!((o0, o1), (0, 1));
        store.close().await.unwrap();
    }

    let store = LogStore::open(config, None).await.unwrap();
    let records = store.read(0, 10).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!((records[0].offset, records[0].data.as_slice()), (0, b"one".as_slice()));
    assert_eq!((records[1].offset, records[1].data.as_slice()), (1, b"two".as_slice()));
    store.close().await.unwrap();
}

/// Scenario 6: with `max_buffered_bytes=64`, appending a 128-byte payload
/// in memory mode returns `Backpressure`.
#[tokio::test]
async fn log_append_exceeding_buffer_budget_is_backpressure() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = LogStoreConfig::new(dir.path());
    config.durability = Durability::Memory;
    config.max_buffered_bytes = 64;

    let store = LogStore::open(config, None).await.unwrap();
    let payload = vec![0u8; 128];
    let result = store.append(payload).await;
    assert!(matches!(result, Err(verge_logstore::LogError::Backpressure(_))));
    store.close().await.unwrap();
}
