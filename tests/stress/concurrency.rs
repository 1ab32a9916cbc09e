//! Concurrency tests: parallel verification, parallel per-agent ledger
//! appends, and optimistic-concurrency retries on delegation.

use std::sync::Arc;
use std::thread;

use eatp_engine::authority::AuthorityType;
use eatp_engine::capability::{CapabilityType, ConstraintContext};
use eatp_engine::delegation::DelegateRequest;
use eatp_engine::verify::VerificationLevel;
use eatp_engine::{AgentId, AuditResult, EatpEngine};

fn engine_with_agent(caps: &[&str]) -> Arc<EatpEngine> {
    let engine = EatpEngine::new();
    let org = engine
        .create_authority("Acme Corp", AuthorityType::Organization, None)
        .expect("creating authority");
    engine
        .establish(
            AgentId::from("a1"),
            &org.id,
            caps.iter()
                .map(|uri| (uri.to_string(), CapabilityType::Action))
                .collect(),
            Vec::new(),
            None,
        )
        .expect("establishing genesis");
    Arc::new(engine)
}

#[test]
fn stress_concurrent_verification() {
    let engine = engine_with_agent(&["read_db"]);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for _ in 0..200 {
                let result = engine
                    .verify(
                        &AgentId::from("a1"),
                        "read_db",
                        &ConstraintContext::now(),
                        VerificationLevel::Standard,
                    )
                    .expect("verification should not error");
                assert!(result.valid);
            }
        }));
    }

    for handle in handles {
        handle.join().expect("verifier thread panicked");
    }
}

#[test]
fn stress_concurrent_delegation_with_retry() {
    // Many threads delegate from the same lineage. Writers race on the
    // delegator's lineage version; losers see ConcurrentModification,
    // which is retryable, and must eventually all succeed.
    let engine = engine_with_agent(&["read_db"]);

    let mut handles = Vec::new();
    for thread_id in 0..8 {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for i in 0..10 {
                let request = DelegateRequest {
                    delegator_id: AgentId::from("a1"),
                    delegatee_id: AgentId::from(format!("worker-{thread_id}-{i}").as_str()),
                    task_id: format!("task-{thread_id}-{i}"),
                    capabilities: vec!["read_db".into()],
                    constraints: Vec::new(),
                    expires_at: None,
                };
                loop {
                    match engine.delegate(request.clone()) {
                        Ok(_) => break,
                        Err(err) if err.is_retryable() => continue,
                        Err(err) => panic!("unexpected delegation error: {err}"),
                    }
                }
            }
        }));
    }

    for handle in handles {
        handle.join().expect("delegator thread panicked");
    }

    // All 80 edges landed, and every delegatee has a valid grant.
    let edges = engine.store().list_delegations(Some(&AgentId::from("a1")));
    assert_eq!(edges.len(), 80);

    let result = engine
        .verify(
            &AgentId::from("worker-0-0"),
            "read_db",
            &ConstraintContext::now(),
            VerificationLevel::Standard,
        )
        .expect("verification should not error");
    assert!(result.valid);
}

#[test]
fn stress_parallel_ledger_appends_across_agents() {
    let engine = engine_with_agent(&["read_db"]);

    // Give each thread its own agent lineage so appends are unrelated.
    for i in 0..8 {
        engine
            .delegate(DelegateRequest {
                delegator_id: AgentId::from("a1"),
                delegatee_id: AgentId::from(format!("auditor-{i}").as_str()),
                task_id: format!("audit-task-{i}"),
                capabilities: vec!["read_db".into()],
                constraints: Vec::new(),
                expires_at: None,
            })
            .expect("delegating to auditor");
    }

    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            let agent = AgentId::from(format!("auditor-{i}").as_str());
            for n in 0..50 {
                engine
                    .audit(&agent, &format!("action {n}"), None, AuditResult::Success)
                    .expect("recording anchor");
            }
        }));
    }

    for handle in handles {
        handle.join().expect("auditor thread panicked");
    }

    // Every per-agent chain is complete and intact.
    for i in 0..8 {
        let agent = AgentId::from(format!("auditor-{i}").as_str());
        let anchors = engine.ledger().anchors_for_agent(&agent);
        assert_eq!(anchors.len(), 50);
        assert!(engine.verify_audit_chain(&agent).valid);
    }
}
