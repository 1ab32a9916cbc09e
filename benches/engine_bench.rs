//! Criterion benchmarks for the hot paths: verification, delegation, and
//! ledger appends.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use eatp_engine::authority::AuthorityType;
use eatp_engine::capability::{CapabilityType, ConstraintContext};
use eatp_engine::delegation::DelegateRequest;
use eatp_engine::verify::VerificationLevel;
use eatp_engine::{AgentId, AuditResult, EatpEngine};

fn engine_with_chain(depth: usize) -> EatpEngine {
    let engine = EatpEngine::new();
    let org = engine
        .create_authority("Bench Org", AuthorityType::Organization, None)
        .expect("creating authority");

    engine
        .establish(
            AgentId::from("agent-0"),
            &org.id,
            vec![("read_db".to_string(), CapabilityType::Access)],
            Vec::new(),
            None,
        )
        .expect("establishing genesis");

    for i in 0..depth {
        engine
            .delegate(DelegateRequest {
                delegator_id: AgentId::from(format!("agent-{i}").as_str()),
                delegatee_id: AgentId::from(format!("agent-{}", i + 1).as_str()),
                task_id: format!("hop-{i}"),
                capabilities: vec!["read_db".into()],
                constraints: Vec::new(),
                expires_at: None,
            })
            .expect("delegating hop");
    }

    engine
}

fn bench_verify(c: &mut Criterion) {
    let engine = engine_with_chain(8);
    let terminal = AgentId::from("agent-8");
    let context = ConstraintContext::now();

    c.bench_function("verify_standard_depth_8", |b| {
        b.iter(|| {
            engine
                .verify(&terminal, "read_db", &context, VerificationLevel::Standard)
                .expect("verification")
        })
    });

    c.bench_function("verify_shallow_depth_8", |b| {
        b.iter(|| {
            engine
                .verify(&terminal, "read_db", &context, VerificationLevel::Shallow)
                .expect("verification")
        })
    });
}

fn bench_delegate(c: &mut Criterion) {
    c.bench_function("delegate_from_genesis", |b| {
        b.iter_batched(
            || (engine_with_chain(0), 0u64),
            |(engine, _)| {
                engine
                    .delegate(DelegateRequest {
                        delegator_id: AgentId::from("agent-0"),
                        delegatee_id: AgentId::from("bench-delegatee"),
                        task_id: "bench".into(),
                        capabilities: vec!["read_db".into()],
                        constraints: Vec::new(),
                        expires_at: None,
                    })
                    .expect("delegating")
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_audit_append(c: &mut Criterion) {
    let engine = engine_with_chain(2);
    let agent = AgentId::from("agent-2");

    c.bench_function("audit_append", |b| {
        b.iter(|| {
            engine
                .audit(&agent, "bench action", None, AuditResult::Success)
                .expect("recording anchor")
        })
    });
}

criterion_group!(benches, bench_verify, bench_delegate, bench_audit_append);
criterion_main!(benches);
