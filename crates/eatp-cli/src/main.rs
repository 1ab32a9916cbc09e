//! EATP CLI — `eatp` command.
//!
//! Thin driver over the engine: establishes and delegates trust, verifies
//! capabilities, revokes lineages, and records/exports audit anchors.
//! State lives in an encrypted file; every mutating command loads, applies,
//! and saves it.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};

use eatp_engine::audit::{AuditQuery, AuditSortOrder};
use eatp_engine::authority::{AuthorityFilter, AuthorityType};
use eatp_engine::capability::{CapabilityType, Constraint, ConstraintContext};
use eatp_engine::chain::{ChainQuery, RevocationTarget};
use eatp_engine::delegation::DelegateRequest;
use eatp_engine::storage::{load_state, save_state};
use eatp_engine::verify::VerificationLevel;
use eatp_engine::{AgentId, AuditResult, AuthorityId, DelegationId, EatpEngine};

// ── State helpers ─────────────────────────────────────────────────────────────

fn default_state_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".eatp").join("state.eatp")
}

fn read_passphrase() -> String {
    if let Ok(passphrase) = std::env::var("EATP_PASSPHRASE") {
        return passphrase;
    }
    eprint!("Passphrase: ");
    let mut passphrase = String::new();
    std::io::stdin()
        .read_line(&mut passphrase)
        .expect("failed to read passphrase");
    passphrase.trim().to_string()
}

fn load_engine(path: &PathBuf, passphrase: &str) -> Result<EatpEngine> {
    if path.exists() {
        load_state(path, passphrase).with_context(|| format!("loading {}", path.display()))
    } else {
        Ok(EatpEngine::new())
    }
}

// ── Parsing helpers ───────────────────────────────────────────────────────────

fn micros_to_datetime(micros: u64) -> String {
    let secs = (micros / 1_000_000) as i64;
    chrono::DateTime::from_timestamp(secs, 0)
        .unwrap_or(chrono::DateTime::UNIX_EPOCH)
        .format("%Y-%m-%d %H:%M:%S UTC")
        .to_string()
}

/// Parse a duration like "24h", "7d", "1h30m", or plain hours, to micros.
fn parse_duration_to_micros(s: &str) -> Result<u64> {
    let s = s.trim();

    if let Ok(hours) = s.parse::<u64>() {
        return Ok(hours * 3600 * 1_000_000);
    }

    let mut total: u64 = 0;
    let mut current = String::new();
    for ch in s.chars() {
        if ch.is_ascii_digit() {
            current.push(ch);
        } else {
            let value: u64 = current
                .parse()
                .map_err(|_| anyhow!("invalid duration: {s}"))?;
            current.clear();
            match ch {
                'd' => total += value * 86_400 * 1_000_000,
                'h' => total += value * 3_600 * 1_000_000,
                'm' => total += value * 60 * 1_000_000,
                's' => total += value * 1_000_000,
                _ => return Err(anyhow!("unknown duration unit '{ch}' in '{s}'")),
            }
        }
    }
    if !current.is_empty() {
        return Err(anyhow!("duration '{s}' is missing a unit (d/h/m/s)"));
    }
    if total == 0 {
        return Err(anyhow!("duration must be > 0"));
    }
    Ok(total)
}

/// Parse `uri[@type]` into a capability spec; the type defaults to action.
fn parse_capability(s: &str) -> Result<(String, CapabilityType)> {
    match s.rsplit_once('@') {
        Some((uri, ty)) => {
            let capability_type = match ty {
                "access" => CapabilityType::Access,
                "action" => CapabilityType::Action,
                "delegation" => CapabilityType::Delegation,
                other => return Err(anyhow!("unknown capability type: {other}")),
            };
            Ok((uri.to_string(), capability_type))
        }
        None => Ok((s.to_string(), CapabilityType::Action)),
    }
}

fn expiry_from(expires_in: Option<&str>) -> Result<Option<u64>> {
    match expires_in {
        Some(spec) => Ok(Some(
            eatp_engine::time::now_micros() + parse_duration_to_micros(spec)?,
        )),
        None => Ok(None),
    }
}

// ── CLI structure ─────────────────────────────────────────────────────────────

/// EATP CLI — manage agent trust chains, delegation, revocation, and audit.
#[derive(Parser)]
#[command(name = "eatp", version, about)]
struct Cli {
    /// Path to the encrypted state file.
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage trust-issuing authorities.
    Authority {
        #[command(subcommand)]
        command: AuthorityCommand,
    },
    /// Establish genesis trust for an agent.
    Establish {
        #[arg(long)]
        agent: String,
        #[arg(long)]
        authority: String,
        /// Capability as `uri` or `uri@access|action|delegation`. Repeatable.
        #[arg(long = "cap", required = true)]
        capabilities: Vec<String>,
        /// Constraint tag (e.g. `business_hours_only`). Repeatable.
        #[arg(long = "constraint")]
        constraints: Vec<String>,
        /// Expiry as a duration from now (e.g. `30d`, `12h`).
        #[arg(long)]
        expires_in: Option<String>,
    },
    /// Delegate trust from one agent to another.
    Delegate {
        #[arg(long)]
        delegator: String,
        #[arg(long)]
        delegatee: String,
        #[arg(long)]
        task: String,
        #[arg(long = "cap", required = true)]
        capabilities: Vec<String>,
        #[arg(long = "constraint")]
        constraints: Vec<String>,
        #[arg(long)]
        expires_in: Option<String>,
    },
    /// Verify that an agent may exercise a capability.
    Verify {
        #[arg(long)]
        agent: String,
        #[arg(long)]
        capability: String,
        /// Status-only check, skipping constraint evaluation.
        #[arg(long)]
        shallow: bool,
        /// Source IP for IP-range constraints.
        #[arg(long)]
        ip: Option<String>,
        /// Context attribute as `key=value`. Repeatable.
        #[arg(long = "attr")]
        attributes: Vec<String>,
    },
    /// Revoke an agent's genesis chain or a single delegation, cascading.
    Revoke {
        #[arg(long, conflicts_with = "delegation")]
        agent: Option<String>,
        #[arg(long)]
        delegation: Option<String>,
        #[arg(long)]
        reason: String,
        /// Show the blast radius without revoking.
        #[arg(long)]
        preview: bool,
    },
    /// Revoke every chain rooted at a human authority.
    RevokeByHuman {
        #[arg(long)]
        authority: String,
        #[arg(long)]
        reason: String,
    },
    /// Record and inspect audit anchors.
    Audit {
        #[command(subcommand)]
        command: AuditCommand,
    },
    /// List trust chains.
    Chains {
        #[arg(long)]
        authority: Option<String>,
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        archived: bool,
    },
}

#[derive(Subcommand)]
enum AuthorityCommand {
    /// Create an authority.
    Create {
        #[arg(long)]
        name: String,
        /// organization, system, or human.
        #[arg(long = "type")]
        authority_type: String,
        #[arg(long)]
        parent: Option<String>,
    },
    /// Deactivate an authority (reason required, ≥ 10 chars).
    Deactivate {
        #[arg(long)]
        id: String,
        #[arg(long)]
        reason: String,
    },
    /// Reactivate an authority (administrative only).
    Reactivate {
        #[arg(long)]
        id: String,
    },
    /// List authorities.
    List {
        #[arg(long = "type")]
        authority_type: Option<String>,
        #[arg(long)]
        active: Option<bool>,
        #[arg(long)]
        search: Option<String>,
    },
}

#[derive(Subcommand)]
enum AuditCommand {
    /// Record an audited action.
    Record {
        #[arg(long)]
        agent: String,
        #[arg(long)]
        action: String,
        #[arg(long)]
        resource: Option<String>,
        /// success, failure, denied, or partial.
        #[arg(long, default_value = "success")]
        result: String,
    },
    /// Verify the integrity of an agent's audit chain.
    Verify {
        #[arg(long)]
        agent: String,
    },
    /// Query anchors.
    Query {
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        action: Option<String>,
        #[arg(long)]
        result: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Export anchors as CSV or JSON.
    Export {
        /// csv or json.
        #[arg(long, default_value = "csv")]
        format: String,
        #[arg(long)]
        agent: Option<String>,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let state_path = cli.state.unwrap_or_else(default_state_path);
    let passphrase = read_passphrase();
    let engine = load_engine(&state_path, &passphrase)?;

    let mutated = run(&engine, cli.command)?;

    if mutated {
        save_state(&engine, &state_path, &passphrase)
            .with_context(|| format!("saving {}", state_path.display()))?;
        log::debug!("state saved to {}", state_path.display());
    }

    Ok(())
}

/// Execute a command; returns whether engine state changed.
fn run(engine: &EatpEngine, command: Command) -> Result<bool> {
    match command {
        Command::Authority { command } => run_authority(engine, command),
        Command::Establish {
            agent,
            authority,
            capabilities,
            constraints,
            expires_in,
        } => {
            let capabilities = capabilities
                .iter()
                .map(|spec| parse_capability(spec))
                .collect::<Result<Vec<_>>>()?;
            let constraints: Vec<Constraint> =
                constraints.iter().map(|tag| Constraint::from_tag(tag)).collect();

            let chain = engine.establish(
                AgentId::from(agent.as_str()),
                &AuthorityId::from(authority.as_str()),
                capabilities,
                constraints,
                expiry_from(expires_in.as_deref())?,
            )?;

            println!(
                "Established genesis for {} under {} ({} capabilities, status {})",
                chain.agent_id,
                chain.issuing_authority_id,
                chain.capabilities.len(),
                chain.status.as_str()
            );
            Ok(true)
        }
        Command::Delegate {
            delegator,
            delegatee,
            task,
            capabilities,
            constraints,
            expires_in,
        } => {
            let record = engine.delegate(DelegateRequest {
                delegator_id: AgentId::from(delegator.as_str()),
                delegatee_id: AgentId::from(delegatee.as_str()),
                task_id: task,
                capabilities: capabilities
                    .iter()
                    .map(|spec| parse_capability(spec).map(|(uri, _)| uri))
                    .collect::<Result<Vec<_>>>()?,
                constraints: constraints.iter().map(|tag| Constraint::from_tag(tag)).collect(),
                expires_at: expiry_from(expires_in.as_deref())?,
            })?;

            println!(
                "Delegated {} → {} ({}), expires {}",
                record.delegator_id,
                record.delegatee_id,
                record.id,
                record
                    .expires_at
                    .map(micros_to_datetime)
                    .unwrap_or_else(|| "never".to_string())
            );
            Ok(true)
        }
        Command::Verify {
            agent,
            capability,
            shallow,
            ip,
            attributes,
        } => {
            let mut context = ConstraintContext::now();
            if let Some(ip) = ip {
                context = context.with_source_ip(ip.parse().context("invalid --ip")?);
            }
            for pair in &attributes {
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| anyhow!("--attr must be key=value, got '{pair}'"))?;
                context = context.with_attribute(key, value);
            }
            let level = if shallow {
                VerificationLevel::Shallow
            } else {
                VerificationLevel::Standard
            };

            let result = engine.verify(&AgentId::from(agent.as_str()), &capability, &context, level)?;
            match (result.valid, result.reason) {
                (true, _) => println!("VALID: {agent} may exercise {capability}"),
                (false, Some(reason)) => println!("DENIED: {reason}"),
                (false, None) => println!("DENIED"),
            }
            Ok(false)
        }
        Command::Revoke {
            agent,
            delegation,
            reason,
            preview,
        } => {
            let target = match (agent, delegation) {
                (Some(agent), None) => RevocationTarget::Agent(AgentId::from(agent.as_str())),
                (None, Some(id)) => {
                    RevocationTarget::Delegation(DelegationId::from(id.as_str()))
                }
                _ => return Err(anyhow!("specify exactly one of --agent or --delegation")),
            };

            if preview {
                let impact = engine.preview_impact(&target)?;
                println!("Revoking would affect {} agent(s):", impact.affected_agent_ids.len());
                for agent_id in impact.affected_agent_ids {
                    println!("  {agent_id}");
                }
                return Ok(false);
            }

            let outcome = engine.revoke(&target, &reason)?;
            println!("Revoked {} agent(s):", outcome.revoked_agent_ids.len());
            for agent_id in outcome.revoked_agent_ids {
                println!("  {agent_id}");
            }
            Ok(true)
        }
        Command::RevokeByHuman { authority, reason } => {
            let outcome =
                engine.revoke_by_human(&AuthorityId::from(authority.as_str()), &reason)?;
            println!(
                "Revoked {} chain(s), {} agent(s) affected",
                outcome.records.len(),
                outcome.revoked_agent_ids.len()
            );
            Ok(true)
        }
        Command::Audit { command } => run_audit(engine, command),
        Command::Chains {
            authority,
            agent,
            archived,
        } => {
            let chains = engine.list_chains(&ChainQuery {
                authority_id: authority.map(|id| AuthorityId::from(id.as_str())),
                status: None,
                agent_search: agent,
                include_archived: archived,
            });
            for chain in chains {
                println!(
                    "{}  issuer={}  status={}  established={}",
                    chain.agent_id,
                    chain.issuing_authority_id,
                    chain.status.as_str(),
                    micros_to_datetime(chain.established_at)
                );
            }
            Ok(false)
        }
    }
}

fn run_authority(engine: &EatpEngine, command: AuthorityCommand) -> Result<bool> {
    match command {
        AuthorityCommand::Create {
            name,
            authority_type,
            parent,
        } => {
            let authority_type: AuthorityType = authority_type
                .parse()
                .map_err(|e: String| anyhow!(e))?;
            let parent = parent.map(|id| AuthorityId::from(id.as_str()));
            let authority = engine.create_authority(&name, authority_type, parent.as_ref())?;
            println!("Created {} authority {} ({})", authority_type.as_str(), name, authority.id);
            Ok(true)
        }
        AuthorityCommand::Deactivate { id, reason } => {
            let authority = engine.deactivate_authority(&AuthorityId::from(id.as_str()), &reason)?;
            println!("Deactivated {}", authority.id);
            Ok(true)
        }
        AuthorityCommand::Reactivate { id } => {
            let authority = engine.reactivate_authority(&AuthorityId::from(id.as_str()))?;
            println!("Reactivated {}", authority.id);
            Ok(true)
        }
        AuthorityCommand::List {
            authority_type,
            active,
            search,
        } => {
            let authority_type = match authority_type {
                Some(ty) => Some(ty.parse::<AuthorityType>().map_err(|e: String| anyhow!(e))?),
                None => None,
            };
            let authorities = engine.list_authorities(&AuthorityFilter {
                authority_type,
                is_active: active,
                search,
                ..Default::default()
            });
            for authority in authorities {
                println!(
                    "{}  {}  type={}  active={}",
                    authority.id,
                    authority.name,
                    authority.authority_type.as_str(),
                    authority.is_active
                );
            }
            Ok(false)
        }
    }
}

fn run_audit(engine: &EatpEngine, command: AuditCommand) -> Result<bool> {
    match command {
        AuditCommand::Record {
            agent,
            action,
            resource,
            result,
        } => {
            let result: AuditResult = result.parse().map_err(|e: String| anyhow!(e))?;
            let anchor = engine.audit(&AgentId::from(agent.as_str()), &action, resource, result)?;
            println!("Recorded anchor {} for {agent}", anchor.id);
            Ok(true)
        }
        AuditCommand::Verify { agent } => {
            let verification = engine.verify_audit_chain(&AgentId::from(agent.as_str()));
            match verification.broken_at {
                None => println!("Audit chain for {agent} is intact"),
                Some(anchor_id) => {
                    println!("INTEGRITY FAILURE: chain for {agent} broken at {anchor_id}")
                }
            }
            Ok(false)
        }
        AuditCommand::Query {
            agent,
            action,
            result,
            limit,
        } => {
            let result = match result {
                Some(r) => Some(r.parse::<AuditResult>().map_err(|e: String| anyhow!(e))?),
                None => None,
            };
            let anchors = engine.query_audit(&AuditQuery {
                agent_id: agent.map(|a| AgentId::from(a.as_str())),
                action,
                result,
                time_range: None,
                limit,
                sort: AuditSortOrder::NewestFirst,
            });
            for anchor in anchors {
                println!(
                    "{}  {}  {}  {}  {}",
                    anchor.id,
                    anchor.agent_id,
                    anchor.action,
                    anchor.result.as_str(),
                    micros_to_datetime(anchor.timestamp)
                );
            }
            Ok(false)
        }
        AuditCommand::Export { format, agent } => {
            let query = AuditQuery {
                agent_id: agent.map(|a| AgentId::from(a.as_str())),
                sort: AuditSortOrder::OldestFirst,
                ..Default::default()
            };
            match format.as_str() {
                "csv" => print!("{}", engine.export_audit_csv(&query)),
                "json" => println!("{}", engine.export_audit_json(&query)?),
                other => return Err(anyhow!("unknown export format: {other}")),
            }
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration_to_micros("2h").unwrap(), 2 * 3600 * 1_000_000);
        assert_eq!(
            parse_duration_to_micros("1d12h").unwrap(),
            36 * 3600 * 1_000_000
        );
        // Bare numbers are hours.
        assert_eq!(parse_duration_to_micros("3").unwrap(), 3 * 3600 * 1_000_000);
        assert!(parse_duration_to_micros("7x").is_err());
        assert!(parse_duration_to_micros("12").is_ok());
    }

    #[test]
    fn test_parse_capability() {
        let (uri, ty) = parse_capability("read_db").unwrap();
        assert_eq!(uri, "read_db");
        assert_eq!(ty, CapabilityType::Action);

        let (uri, ty) = parse_capability("read:calendar@access").unwrap();
        assert_eq!(uri, "read:calendar");
        assert_eq!(ty, CapabilityType::Access);

        assert!(parse_capability("x@committee").is_err());
    }
}
