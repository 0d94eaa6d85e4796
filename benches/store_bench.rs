//! Benchmarks for the ingestion hot path

use std::sync::Arc;

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use xrpl_watch::monitor::{
    decode_message, parse_transaction, AggregateStore, Classifier, InboundMessage,
    TransactionRecord, WhaleThreshold,
};

const PAYMENT: &str = r#"{"type":"transaction","validated":true,"ledger_index":91000000,
"transaction":{"TransactionType":"Payment","Account":"rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh",
"Destination":"rPT1Sjq2YGrBMTttX4GZHjKu9dyfzbpAYe","Amount":"12000000000"},
"meta":{"TransactionResult":"tesSUCCESS"}}"#;

fn record(i: u64) -> Arc<TransactionRecord> {
    Arc::new(TransactionRecord {
        observed_at: Utc::now(),
        tx_type: "Payment".to_string(),
        source_account: format!("rSource{}", i % 1_000),
        destination_account: "rSink".to_string(),
        amount_drops: 1_000_000 + i,
        result: "tesSUCCESS".to_string(),
        is_whale: i % 20 == 0,
        ledger_index: i,
    })
}

fn bench_decode_and_classify(c: &mut Criterion) {
    let classifier = Classifier::new(Arc::new(WhaleThreshold::default()));

    c.bench_function("decode_parse_classify", |b| {
        b.iter(|| {
            if let Ok(InboundMessage::Transaction(value)) = decode_message(black_box(PAYMENT)) {
                if let Some(parsed) = parse_transaction(&value) {
                    black_box(classifier.classify(parsed));
                }
            }
        });
    });
}

fn bench_apply(c: &mut Criterion) {
    let store = AggregateStore::default();
    let mut i = 0u64;

    c.bench_function("store_apply", |b| {
        b.iter(|| {
            i += 1;
            store.apply(black_box(record(i)));
        });
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let store = AggregateStore::default();
    for i in 0..10_000 {
        store.apply(record(i));
    }

    c.bench_function("store_snapshot", |b| {
        b.iter(|| black_box(store.snapshot()));
    });
}

criterion_group!(benches, bench_decode_and_classify, bench_apply, bench_snapshot);
criterion_main!(benches);
