//! Structured constraints and the narrowing-only lattice.
//!
//! Constraints are a closed tagged-variant set rather than free-form rules,
//! so that comparability is well defined per dimension: a child edge may add
//! restrictions but can never widen one a parent already imposed.
//!
//! Evaluation is pluggable through [`ConstraintContext`]: each kind is a
//! predicate over the context, evaluated in declaration order.

use std::collections::HashMap;
use std::net::IpAddr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::error::{EatpError, Result};
use crate::time;

/// The closed set of enforceable constraint kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintKind {
    /// Only valid within a UTC hour window. `end_hour` is exclusive and the
    /// window may wrap midnight (`start_hour > end_hour`).
    TimeWindow { start_hour: u8, end_hour: u8 },
    /// Caller's source address must fall inside this network.
    IpRange { network: IpNetwork },
    /// At most this many exercises of the grant per hour.
    RateLimit { max_per_hour: u64 },
    /// A context attribute must equal a pinned value.
    AttributeEquals { key: String, value: String },
    /// Free-text constraint with no server-side comparability. Always a
    /// valid narrowing; never evaluated.
    Opaque { tag: String },
}

/// A named constraint. The name is the identifier reported as the `reason`
/// when verification fails on this constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    #[serde(flatten)]
    pub kind: ConstraintKind,
}

/// Context supplied by the caller for standard-level verification.
#[derive(Debug, Clone, Default)]
pub struct ConstraintContext {
    /// Evaluation time (microseconds since epoch); `None` means now.
    pub at: Option<u64>,
    /// Source address of the request, if known.
    pub source_ip: Option<IpAddr>,
    /// Exercises of the grant in the trailing hour, if tracked.
    pub uses_last_hour: Option<u64>,
    /// Arbitrary request attributes (region, environment, …).
    pub attributes: HashMap<String, String>,
}

impl ConstraintContext {
    /// Empty context evaluated at the current time.
    pub fn now() -> Self {
        Self::default()
    }

    /// Pin the evaluation time.
    pub fn at(mut self, micros: u64) -> Self {
        self.at = Some(micros);
        self
    }

    /// Set the source address.
    pub fn with_source_ip(mut self, ip: IpAddr) -> Self {
        self.source_ip = Some(ip);
        self
    }

    /// Set the trailing-hour use count.
    pub fn with_uses_last_hour(mut self, uses: u64) -> Self {
        self.uses_last_hour = Some(uses);
        self
    }

    /// Add a request attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

impl Constraint {
    /// Create a named constraint.
    pub fn new(name: impl Into<String>, kind: ConstraintKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// The conventional 09:00–17:00 UTC window.
    pub fn business_hours() -> Self {
        Self::new(
            "business_hours_only",
            ConstraintKind::TimeWindow {
                start_hour: 9,
                end_hour: 17,
            },
        )
    }

    /// An opaque free-text constraint. Recognizes the well-known
    /// `business_hours_only` tag; anything else stays opaque.
    pub fn from_tag(tag: &str) -> Self {
        if tag == "business_hours_only" {
            return Self::business_hours();
        }
        Self::new(
            tag,
            ConstraintKind::Opaque {
                tag: tag.to_string(),
            },
        )
    }

    /// The comparability dimension, or `None` for opaque constraints.
    ///
    /// Two constraints are comparable iff their dimensions are equal.
    pub fn dimension(&self) -> Option<String> {
        match &self.kind {
            ConstraintKind::TimeWindow { .. } => Some("time_window".to_string()),
            ConstraintKind::IpRange { .. } => Some("ip_range".to_string()),
            ConstraintKind::RateLimit { .. } => Some("rate_limit".to_string()),
            ConstraintKind::AttributeEquals { key, .. } => Some(format!("attribute:{key}")),
            ConstraintKind::Opaque { .. } => None,
        }
    }

    /// Whether `self` is at least as restrictive as `other` on the same
    /// dimension. Callers must only invoke this for comparable constraints.
    pub fn narrows_or_equals(&self, other: &Constraint) -> bool {
        match (&self.kind, &other.kind) {
            (
                ConstraintKind::TimeWindow { .. },
                ConstraintKind::TimeWindow { .. },
            ) => {
                let child = hour_mask(&self.kind);
                let parent = hour_mask(&other.kind);
                (child & !parent) == 0
            }
            (
                ConstraintKind::IpRange { network: child },
                ConstraintKind::IpRange { network: parent },
            ) => parent.contains(child.network()) && child.prefix() >= parent.prefix(),
            (
                ConstraintKind::RateLimit { max_per_hour: child },
                ConstraintKind::RateLimit { max_per_hour: parent },
            ) => child <= parent,
            (
                ConstraintKind::AttributeEquals { key: ck, value: cv },
                ConstraintKind::AttributeEquals { key: pk, value: pv },
            ) => ck == pk && cv == pv,
            // Opaque constraints have no dimension and never reach here.
            _ => false,
        }
    }

    /// Evaluate this constraint against the supplied context.
    ///
    /// Constraints requiring evidence the context does not carry (source IP,
    /// use counts) fail closed. Opaque constraints are always satisfied.
    pub fn is_satisfied(&self, ctx: &ConstraintContext) -> bool {
        match &self.kind {
            ConstraintKind::TimeWindow { .. } => {
                let at = ctx.at.unwrap_or_else(time::now_micros);
                let hour = time::utc_hour(at);
                (hour_mask(&self.kind) & (1u32 << hour)) != 0
            }
            ConstraintKind::IpRange { network } => match ctx.source_ip {
                Some(ip) => network.contains(ip),
                None => false,
            },
            ConstraintKind::RateLimit { max_per_hour } => match ctx.uses_last_hour {
                Some(uses) => uses < *max_per_hour,
                None => false,
            },
            ConstraintKind::AttributeEquals { key, value } => {
                ctx.attributes.get(key).map(String::as_str) == Some(value.as_str())
            }
            ConstraintKind::Opaque { .. } => true,
        }
    }
}

/// Bitmask of UTC hours (bit N set = hour N allowed) for a time window.
fn hour_mask(kind: &ConstraintKind) -> u32 {
    let ConstraintKind::TimeWindow {
        start_hour,
        end_hour,
    } = kind
    else {
        return 0;
    };
    let (start, end) = (*start_hour % 24, *end_hour % 24);
    let mut mask = 0u32;
    let mut h = start;
    loop {
        if h == end {
            break;
        }
        mask |= 1 << h;
        h = (h + 1) % 24;
        if h == start {
            break; // full-circle window
        }
    }
    if start == end {
        // Degenerate spec: treat as the full day.
        mask = (1 << 24) - 1;
    }
    mask
}

/// Union parent and added constraints, enforcing monotonic narrowing.
///
/// An added constraint that is strictly less restrictive than an existing
/// one of the same dimension is rejected with
/// [`EatpError::ConstraintConflict`]. Duplicates are dropped; parents are
/// always preserved.
pub fn merge_constraints(parent: &[Constraint], added: &[Constraint]) -> Result<Vec<Constraint>> {
    let mut merged: Vec<Constraint> = parent.to_vec();

    for addition in added {
        if merged.contains(addition) {
            continue;
        }

        if let Some(dimension) = addition.dimension() {
            for existing in merged.iter() {
                if existing.dimension().as_deref() != Some(dimension.as_str()) {
                    continue;
                }
                if !addition.narrows_or_equals(existing) {
                    return Err(EatpError::ConstraintConflict {
                        dimension,
                        detail: format!(
                            "'{}' widens existing constraint '{}'",
                            addition.name, existing.name
                        ),
                    });
                }
            }
        }

        merged.push(addition.clone());
    }

    Ok(merged)
}
