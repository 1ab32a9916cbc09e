//! Integration test: the full trust lifecycle.
//!
//! 1. Create an authority hierarchy
//! 2. Establish genesis trust
//! 3. Delegate with narrowing
//! 4. Verify capabilities and constraints
//! 5. Record and verify audit anchors
//! 6. Revoke and observe the cascade
//! 7. Detect ledger tampering

use eatp_engine::audit::verify_chain;
use eatp_engine::authority::AuthorityType;
use eatp_engine::capability::{CapabilityType, Constraint, ConstraintContext};
use eatp_engine::chain::RevocationTarget;
use eatp_engine::delegation::DelegateRequest;
use eatp_engine::error::EatpError;
use eatp_engine::verify::VerificationLevel;
use eatp_engine::{AgentId, AuditResult, EatpEngine};

// 2021-06-01T00:00:00Z — a fixed base so hour-of-day math is predictable.
const BASE: u64 = 1_622_505_600_000_000;

fn at_hour(hour: u64) -> u64 {
    BASE + hour * 3600 * 1_000_000
}

fn caps(uris: &[&str]) -> Vec<(String, CapabilityType)> {
    uris.iter()
        .map(|uri| (uri.to_string(), CapabilityType::Action))
        .collect()
}

#[test]
fn full_protocol_establish_to_tamper_detection() {
    let engine = EatpEngine::new();

    // ── Step 1: authority hierarchy ──────────────────────────────────────
    let org = engine
        .create_authority("Org1", AuthorityType::Organization, None)
        .expect("creating org authority");
    let human = engine
        .create_authority("Dana Ops", AuthorityType::Human, Some(&org.id))
        .expect("creating human authority");
    assert!(org.id.as_str().starts_with("aauth_"));
    assert!(engine.registry().is_descendant_of(&human.id, &org.id));

    // ── Step 2: establish genesis (Scenario A) ───────────────────────────
    let thirty_days = 30 * 86_400 * 1_000_000;
    let chain = engine
        .establish(
            AgentId::from("A1"),
            &org.id,
            caps(&["read_db", "write_db"]),
            Vec::new(),
            Some(eatp_engine::time::now_micros() + thirty_days),
        )
        .expect("establishing genesis");
    assert_eq!(chain.status.as_str(), "valid");

    // ── Step 3: delegation (Scenarios B and C) ───────────────────────────
    // Escalation attempt: A1 does not hold execute_code.
    let escalation = engine.delegate(DelegateRequest {
        delegator_id: AgentId::from("A1"),
        delegatee_id: AgentId::from("A2"),
        task_id: "t1".into(),
        capabilities: vec!["read_db".into(), "execute_code".into()],
        constraints: Vec::new(),
        expires_at: None,
    });
    assert!(matches!(
        escalation,
        Err(EatpError::CapabilityEscalation { capability }) if capability == "execute_code"
    ));

    // Valid narrowed delegation with a business-hours constraint.
    let record = engine
        .delegate(DelegateRequest {
            delegator_id: AgentId::from("A1"),
            delegatee_id: AgentId::from("A2"),
            task_id: "t1".into(),
            capabilities: vec!["read_db".into()],
            constraints: vec![Constraint::business_hours()],
            expires_at: None,
        })
        .expect("delegating read_db");
    assert_eq!(record.capabilities_delegated, vec!["read_db".to_string()]);

    // ── Step 4: verification ─────────────────────────────────────────────
    let inside_hours = ConstraintContext::now().at(at_hour(10));
    let outside_hours = ConstraintContext::now().at(at_hour(20));

    let ok = engine
        .verify(&AgentId::from("A2"), "read_db", &inside_hours, VerificationLevel::Standard)
        .expect("verification should not error");
    assert!(ok.valid);

    let denied = engine
        .verify(&AgentId::from("A2"), "read_db", &outside_hours, VerificationLevel::Standard)
        .expect("verification should not error");
    assert!(!denied.valid);
    assert_eq!(denied.reason.as_deref(), Some("business_hours_only"));

    // Narrowing bars A2 from capabilities it was never delegated.
    let never_had = engine
        .verify(&AgentId::from("A2"), "write_db", &inside_hours, VerificationLevel::Standard)
        .expect("verification should not error");
    assert_eq!(never_had.reason.as_deref(), Some("capability_not_granted"));

    // ── Step 5: audit anchors ────────────────────────────────────────────
    let first = engine
        .audit(&AgentId::from("A2"), "query_database", Some("orders".into()), AuditResult::Success)
        .expect("recording first anchor");
    let second = engine
        .audit(&AgentId::from("A2"), "query_database", Some("users".into()), AuditResult::Success)
        .expect("recording second anchor");

    assert!(first.parent_anchor_id.is_none());
    assert_eq!(second.parent_anchor_id, Some(first.id.clone()));
    assert!(engine.verify_audit_chain(&AgentId::from("A2")).valid);
    assert!(engine.ensure_audit_integrity(&AgentId::from("A2")).is_ok());

    // ── Step 6: revocation cascade (Scenario D) ──────────────────────────
    let preview = engine
        .preview_impact(&RevocationTarget::Agent(AgentId::from("A1")))
        .expect("previewing impact");
    let outcome = engine
        .revoke(&RevocationTarget::Agent(AgentId::from("A1")), "policy violation")
        .expect("revoking A1");

    assert_eq!(preview.affected_agent_ids, outcome.revoked_agent_ids);
    assert!(outcome.revoked_agent_ids.contains(&AgentId::from("A2")));
    assert_eq!(outcome.records.len(), 1);
    assert!(outcome.records[0].verify_signature().is_ok());

    let lost_it = engine
        .verify(&AgentId::from("A2"), "read_db", &inside_hours, VerificationLevel::Standard)
        .expect("verification should not error");
    assert!(!lost_it.valid);
    assert_eq!(lost_it.reason.as_deref(), Some("RevokedUpstreamError"));

    // Idempotent: revoking again changes nothing.
    let again = engine
        .revoke(&RevocationTarget::Agent(AgentId::from("A1")), "again")
        .expect("repeat revoke");
    assert_eq!(again.revoked_agent_ids, outcome.revoked_agent_ids);
    assert!(again.records.is_empty());

    // ── Step 7: tamper detection (Scenario E) ────────────────────────────
    let mut anchors = engine.ledger().anchors_for_agent(&AgentId::from("A2"));
    assert_eq!(anchors.len(), 2);
    anchors[0].result = AuditResult::Denied;

    let verification = verify_chain(&anchors);
    assert!(!verification.valid);
    assert_eq!(verification.broken_at, Some(first.id));
}

#[test]
fn revoke_by_human_sweeps_descendant_authorities() {
    let engine = EatpEngine::new();

    let human = engine
        .create_authority("Dana Ops", AuthorityType::Human, None)
        .expect("creating human");
    let lab = engine
        .create_authority("Dana's Lab", AuthorityType::System, Some(&human.id))
        .expect("creating lab");
    let unrelated = engine
        .create_authority("Other Org", AuthorityType::Organization, None)
        .expect("creating unrelated org");

    engine
        .establish(AgentId::from("h1"), &human.id, caps(&["read_db"]), Vec::new(), None)
        .expect("establishing h1");
    engine
        .establish(AgentId::from("lab1"), &lab.id, caps(&["read_db"]), Vec::new(), None)
        .expect("establishing lab1");
    engine
        .establish(AgentId::from("u1"), &unrelated.id, caps(&["read_db"]), Vec::new(), None)
        .expect("establishing u1");

    engine
        .delegate(DelegateRequest {
            delegator_id: AgentId::from("h1"),
            delegatee_id: AgentId::from("h2"),
            task_id: "t1".into(),
            capabilities: vec!["read_db".into()],
            constraints: Vec::new(),
            expires_at: None,
        })
        .expect("delegating h1 → h2");

    let outcome = engine
        .revoke_by_human(&human.id, "operator offboarded")
        .expect("revoke by human");

    for agent in ["h1", "h2", "lab1"] {
        assert!(
            outcome.revoked_agent_ids.contains(&AgentId::from(agent)),
            "{agent} should be revoked"
        );
    }
    assert!(!outcome.revoked_agent_ids.contains(&AgentId::from("u1")));

    // The unrelated lineage still verifies.
    let still_valid = engine
        .verify(
            &AgentId::from("u1"),
            "read_db",
            &ConstraintContext::now(),
            VerificationLevel::Standard,
        )
        .expect("verification should not error");
    assert!(still_valid.valid);
}

#[test]
fn expiry_clamps_propagate_down_the_chain() {
    let engine = EatpEngine::new();
    let org = engine
        .create_authority("Org1", AuthorityType::Organization, None)
        .expect("creating org");

    let now = eatp_engine::time::now_micros();
    let genesis_expiry = now + 10_000_000;

    engine
        .establish(
            AgentId::from("A1"),
            &org.id,
            caps(&["read_db"]),
            Vec::new(),
            Some(genesis_expiry),
        )
        .expect("establishing");

    // Request an expiry far beyond the genesis bound; it must be clamped.
    let record = engine
        .delegate(DelegateRequest {
            delegator_id: AgentId::from("A1"),
            delegatee_id: AgentId::from("A2"),
            task_id: "t1".into(),
            capabilities: vec!["read_db".into()],
            constraints: Vec::new(),
            expires_at: Some(genesis_expiry + 3_600_000_000),
        })
        .expect("delegating");

    assert_eq!(record.expires_at, Some(genesis_expiry));
}
