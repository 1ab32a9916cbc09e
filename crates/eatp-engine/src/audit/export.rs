//! Audit anchor export in CSV and JSON.
//!
//! Field order is fixed: id, agentId, action, resource, result, timestamp,
//! trustChainHash, parentAnchorId, signature.

use serde::Serialize;

use crate::error::{EatpError, Result};

use super::anchor::AuditAnchor;

/// Export view of an anchor with the external field names and order.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnchorExport<'a> {
    id: &'a str,
    agent_id: &'a str,
    action: &'a str,
    resource: Option<&'a str>,
    result: &'a str,
    timestamp: u64,
    trust_chain_hash: &'a str,
    parent_anchor_id: Option<&'a str>,
    signature: &'a str,
}

impl<'a> From<&'a AuditAnchor> for AnchorExport<'a> {
    fn from(anchor: &'a AuditAnchor) -> Self {
        Self {
            id: anchor.id.as_str(),
            agent_id: anchor.agent_id.as_str(),
            action: &anchor.action,
            resource: anchor.resource.as_deref(),
            result: anchor.result.as_str(),
            timestamp: anchor.timestamp,
            trust_chain_hash: &anchor.trust_chain_hash,
            parent_anchor_id: anchor.parent_anchor_id.as_ref().map(|id| id.as_str()),
            signature: &anchor.signature,
        }
    }
}

/// Serialize anchors to a pretty-printed JSON array.
pub fn export_json(anchors: &[AuditAnchor]) -> Result<String> {
    let views: Vec<AnchorExport<'_>> = anchors.iter().map(AnchorExport::from).collect();
    serde_json::to_string_pretty(&views).map_err(|e| EatpError::Serialization(e.to_string()))
}

const CSV_HEADER: &str =
    "id,agentId,action,resource,result,timestamp,trustChainHash,parentAnchorId,signature";

/// Serialize anchors to CSV with a header row.
pub fn export_csv(anchors: &[AuditAnchor]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');

    for anchor in anchors {
        let fields = [
            anchor.id.as_str().to_string(),
            anchor.agent_id.as_str().to_string(),
            anchor.action.clone(),
            anchor.resource.clone().unwrap_or_default(),
            anchor.result.as_str().to_string(),
            anchor.timestamp.to_string(),
            anchor.trust_chain_hash.clone(),
            anchor
                .parent_anchor_id
                .as_ref()
                .map(|id| id.as_str().to_string())
                .unwrap_or_default(),
            anchor.signature.clone(),
        ];
        let row: Vec<String> = fields.iter().map(|f| escape_csv_field(f)).collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }

    out
}

/// Quote a field when it contains a delimiter, quote, or newline.
fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
