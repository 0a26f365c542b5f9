// Validation benchmarks for the Tessera ledger.
//
// Covers transaction signing, id computation, and the full validation
// pipeline for CREATE and TRANSFER against a warm in-memory backend.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

use tessera_ledger::crypto::TesseraKeypair;
use tessera_ledger::storage::{MemoryStore, StorageGateway};
use tessera_ledger::transaction::{sign_transaction, Transaction, TransactionBuilder};
use tessera_ledger::validation::Validator;

fn signed_create(kp: &TesseraKeypair, outputs: usize) -> Transaction {
    let mut builder = TransactionBuilder::create()
        .signer(kp.public_key())
        .asset_data(json!({"bench": true}));
    for _ in 0..outputs {
        builder = builder.output(&[kp.public_key()], 1);
    }
    sign_transaction(builder.build().unwrap(), &[kp.clone()]).unwrap()
}

fn bench_sign_create(c: &mut Criterion) {
    let kp = TesseraKeypair::generate();
    c.bench_function("transaction/sign_create", |b| {
        b.iter(|| signed_create(&kp, 1));
    });
}

fn bench_compute_id(c: &mut Criterion) {
    let kp = TesseraKeypair::generate();
    let tx = signed_create(&kp, 4);
    c.bench_function("transaction/compute_id", |b| {
        b.iter(|| tx.compute_id().unwrap());
    });
}

fn bench_validate_create(c: &mut Criterion) {
    let store: Arc<dyn StorageGateway> = Arc::new(MemoryStore::new());
    let validator = Validator::new(store);
    let kp = TesseraKeypair::generate();
    let tx = signed_create(&kp, 1);

    c.bench_function("validation/create", |b| {
        b.iter(|| validator.validate_transaction(&tx, &[]).unwrap());
    });
}

fn bench_validate_transfer(c: &mut Criterion) {
    let mut group = c.benchmark_group("validation/transfer");

    for inputs in [1usize, 8, 32] {
        let store: Arc<dyn StorageGateway> = Arc::new(MemoryStore::new());
        let validator = Validator::new(Arc::clone(&store));
        let kp = TesseraKeypair::generate();

        let create = signed_create(&kp, inputs);
        store.store_transactions(&[create.clone()]).unwrap();
        let transfer = sign_transaction(
            TransactionBuilder::transfer(create.to_inputs(), create.id.clone().unwrap())
                .output(&[kp.public_key()], inputs as u64)
                .build()
                .unwrap(),
            &[kp.clone()],
        )
        .unwrap();

        group.throughput(Throughput::Elements(inputs as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(inputs),
            &transfer,
            |b, transfer| {
                b.iter(|| validator.validate_transaction(transfer, &[]).unwrap());
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_sign_create,
    bench_compute_id,
    bench_validate_create,
    bench_validate_transfer,
);
criterion_main!(benches);
