//! Metadata tagger.
//!
//! Derives the tag set attached to every stored document. Derivation is a
//! pure function of the document and the [`TagContext`]; the only time
//! value is the context's timestamp.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use weavegate_common::{find_tag, ResourceId, Tag};

use crate::ledger::DataType;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const APP_NAME: &str = "App-Name";
pub const PROTOCOL: &str = "Protocol";
pub const DATA_TYPE: &str = "Data-Type";
pub const CHAIN_ID: &str = "Chain-Id";
pub const TIMESTAMP: &str = "Timestamp";
pub const HAS_MCP: &str = "Has-MCP";
pub const HAS_A2A: &str = "Has-A2A";
pub const HAS_WALLET: &str = "Has-Wallet";
pub const ACTIVE: &str = "Active";
pub const AGENT_ID: &str = "Agent-Id";
pub const AGENT_NAME: &str = "Agent-Name";
pub const SCORE: &str = "Score";
pub const TAG1: &str = "Tag1";
pub const TAG2: &str = "Tag2";
pub const CAPABILITY: &str = "Capability";
pub const SKILL: &str = "Skill";

/// Tags present on every stored document.
pub const REQUIRED_TAGS: [&str; 10] = [
    CONTENT_TYPE,
    APP_NAME,
    PROTOCOL,
    DATA_TYPE,
    CHAIN_ID,
    TIMESTAMP,
    HAS_MCP,
    HAS_A2A,
    HAS_WALLET,
    ACTIVE,
];

pub const DEFAULT_APP_NAME: &str = "WeaveGate";
pub const DEFAULT_PROTOCOL: &str = "ERC-8004";

/// Inputs to tag derivation besides the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagContext {
    pub app_name: String,
    pub protocol: String,
    pub chain_id: u64,
    pub data_type: DataType,
    pub resource: Option<ResourceId>,
    pub timestamp: DateTime<Utc>,
    /// Caller-supplied searchable fields, appended after derived tags.
    pub extra: Vec<Tag>,
}

impl TagContext {
    pub fn new(chain_id: u64, data_type: DataType, timestamp: DateTime<Utc>) -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            protocol: DEFAULT_PROTOCOL.to_string(),
            chain_id,
            data_type,
            resource: None,
            timestamp,
            extra: Vec::new(),
        }
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn with_resource(mut self, resource: ResourceId) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn with_extra(mut self, tag: Tag) -> Self {
        self.extra.push(tag);
        self
    }
}

/// Derive the tag set for `document`.
///
/// Order: required tags, then searchable fields derived from the payload,
/// then `context.extra`. Tags with empty values are skipped since stores
/// reject them.
pub fn derive_tags(document: &Value, context: &TagContext) -> Vec<Tag> {
    let mut tags = vec![
        Tag::new(CONTENT_TYPE, "application/json"),
        Tag::new(APP_NAME, context.app_name.clone()),
        Tag::new(PROTOCOL, context.protocol.clone()),
        Tag::new(DATA_TYPE, context.data_type.as_str()),
        Tag::new(CHAIN_ID, context.chain_id.to_string()),
        Tag::new(
            TIMESTAMP,
            context.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        ),
        Tag::new(HAS_MCP, flag(has_endpoint(document, "mcp"))),
        Tag::new(HAS_A2A, flag(has_endpoint(document, "a2a"))),
        Tag::new(HAS_WALLET, flag(has_wallet(document))),
        Tag::new(ACTIVE, flag(is_active(document))),
    ];

    let mut push = |name: &str, value: Option<String>| {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            tags.push(Tag::new(name, value));
        }
    };

    push(AGENT_ID, context.resource.map(|r| r.to_string()));
    push(AGENT_NAME, field(document, "name"));

    if context.data_type == DataType::Feedback {
        push(SCORE, field(document, "score"));
        push(TAG1, field(document, "tag1"));
        push(TAG2, field(document, "tag2"));
        push(CAPABILITY, field(document, "capability"));
        push(SKILL, field(document, "skill"));
    }

    tags.extend(
        context
            .extra
            .iter()
            .filter(|t| !t.name.is_empty() && !t.value.is_empty())
            .cloned(),
    );
    tags
}

/// Required tags absent from `tags`.
pub fn missing_required(tags: &[Tag]) -> Vec<&'static str> {
    REQUIRED_TAGS
        .iter()
        .copied()
        .filter(|name| find_tag(tags, name).is_none())
        .collect()
}

fn flag(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn has_endpoint(document: &Value, kind: &str) -> bool {
    document
        .get("endpoints")
        .and_then(Value::as_array)
        .map(|endpoints| {
            endpoints.iter().any(|endpoint| {
                endpoint
                    .get("type")
                    .and_then(Value::as_str)
                    .is_some_and(|t| t.eq_ignore_ascii_case(kind))
            })
        })
        .unwrap_or(false)
}

fn has_wallet(document: &Value) -> bool {
    ["wallet", "walletAddress"].iter().any(|key| match document.get(key) {
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Null) | None => false,
        Some(_) => true,
    })
}

fn is_active(document: &Value) -> bool {
    document
        .get("active")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Scalar payload field rendered as a tag value.
fn field(document: &Value, key: &str) -> Option<String> {
    match document.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
