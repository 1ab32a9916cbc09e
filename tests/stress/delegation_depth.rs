//! Stress test: deep delegation chains.
//!
//! Path resolution and verification are O(depth); this exercises a chain
//! far deeper than any sane deployment to catch accidental quadratic
//! behavior or stack-hungry recursion.

use eatp_engine::authority::AuthorityType;
use eatp_engine::capability::{CapabilityType, ConstraintContext};
use eatp_engine::chain::RevocationTarget;
use eatp_engine::delegation::DelegateRequest;
use eatp_engine::verify::VerificationLevel;
use eatp_engine::{AgentId, EatpEngine};

const DEPTH: usize = 200;

fn build_deep_chain(engine: &EatpEngine) -> Vec<AgentId> {
    let org = engine
        .create_authority("Deep Org", AuthorityType::Organization, None)
        .expect("creating authority");

    let agents: Vec<AgentId> = (0..=DEPTH)
        .map(|i| AgentId::from(format!("agent-{i}").as_str()))
        .collect();

    engine
        .establish(
            agents[0].clone(),
            &org.id,
            vec![("read_db".to_string(), CapabilityType::Access)],
            Vec::new(),
            None,
        )
        .expect("establishing genesis");

    for i in 0..DEPTH {
        engine
            .delegate(DelegateRequest {
                delegator_id: agents[i].clone(),
                delegatee_id: agents[i + 1].clone(),
                task_id: format!("hop-{i}"),
                capabilities: vec!["read_db".into()],
                constraints: Vec::new(),
                expires_at: None,
            })
            .expect("delegating one hop");
    }

    agents
}

#[test]
fn stress_deep_chain_resolution_and_verification() {
    let engine = EatpEngine::new();
    let agents = build_deep_chain(&engine);
    let terminal = agents.last().expect("chain has agents");

    let path = engine.resolve_path(terminal).expect("resolving path");
    assert_eq!(path.len(), DEPTH);
    // Edges are ordered genesis-first and linked hop to hop.
    for window in path.windows(2) {
        assert_eq!(window[1].parent_delegation_id, Some(window[0].id.clone()));
    }

    let result = engine
        .verify(
            terminal,
            "read_db",
            &ConstraintContext::now(),
            VerificationLevel::Standard,
        )
        .expect("verification should not error");
    assert!(result.valid);
    assert_eq!(result.path.len(), DEPTH);
}

#[test]
fn stress_deep_chain_cascade_revocation() {
    let engine = EatpEngine::new();
    let agents = build_deep_chain(&engine);

    let outcome = engine
        .revoke(
            &RevocationTarget::Agent(agents[0].clone()),
            "policy violation",
        )
        .expect("revoking the root");

    // The cascade reaches every agent in the chain.
    assert_eq!(outcome.revoked_agent_ids.len(), DEPTH + 1);

    let terminal = agents.last().expect("chain has agents");
    let result = engine
        .verify(
            terminal,
            "read_db",
            &ConstraintContext::now(),
            VerificationLevel::Shallow,
        )
        .expect("verification should not error");
    assert!(!result.valid);
}
