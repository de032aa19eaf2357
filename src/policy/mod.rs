//! Data-flow policy
//!
//! Checked before a legacy call is dispatched. A policy may veto the call or
//! hand back a rewritten payload. Rules are deterministic and run in order.

use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRequest {
    pub source: String,
    pub target: String,
    pub fund_id: String,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowDecision {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Replacement payload, when the policy rewrote it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sanitized_data: Option<Value>,
}

impl FlowDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            sanitized_data: None,
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            sanitized_data: None,
        }
    }
}

/// Policy collaborator consulted before data leaves a fund's boundary
#[async_trait::async_trait]
pub trait DataFlowPolicy: Send + Sync {
    async fn validate_flow(&self, request: &FlowRequest) -> Result<FlowDecision>;
}

// ===== Rules =====

pub enum RuleOutcome {
    Pass,
    Rewrite(Value),
    Block(String),
}

/// Trait for flow rules
pub trait FlowRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// `data` is the payload as rewritten by earlier rules.
    fn check(&self, request: &FlowRequest, data: &Value) -> RuleOutcome;
}

/// Policy engine that applies rules in order
pub struct RuleBasedFlowPolicy {
    rules: Vec<Box<dyn FlowRule>>,
}

impl RuleBasedFlowPolicy {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn add_rule(&mut self, rule: Box<dyn FlowRule>) {
        self.rules.push(rule);
    }

    /// Evaluate synchronously; the first blocking rule wins.
    pub fn evaluate(&self, request: &FlowRequest) -> FlowDecision {
        let mut data: Option<Value> = None;

        for rule in &self.rules {
            let current = data.as_ref().unwrap_or(&request.data);

            match rule.check(request, current) {
                RuleOutcome::Pass => {}
                RuleOutcome::Rewrite(rewritten) => {
                    debug!(rule = rule.name(), "Flow payload rewritten");
                    data = Some(rewritten);
                }
                RuleOutcome::Block(reason) => {
                    info!(
                        rule = rule.name(),
                        source = %request.source,
                        target = %request.target,
                        "Data flow blocked"
                    );
                    return FlowDecision::block(reason);
                }
            }
        }

        FlowDecision {
            allowed: true,
            reason: None,
            sanitized_data: data,
        }
    }
}

impl Default for RuleBasedFlowPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DataFlowPolicy for RuleBasedFlowPolicy {
    async fn validate_flow(&self, request: &FlowRequest) -> Result<FlowDecision> {
        Ok(self.evaluate(request))
    }
}

/// Rule: listed funds may not send data anywhere
pub struct BlockedFundsRule {
    blocked: HashSet<String>,
}

impl BlockedFundsRule {
    pub fn new<I, S>(funds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            blocked: funds.into_iter().map(Into::into).collect(),
        }
    }
}

impl FlowRule for BlockedFundsRule {
    fn name(&self) -> &'static str {
        "blocked_funds"
    }

    fn check(&self, request: &FlowRequest, _data: &Value) -> RuleOutcome {
        if self.blocked.contains(&request.fund_id) {
            RuleOutcome::Block(format!(
                "fund policy forbids {} -> {} transfers",
                request.source, request.target
            ))
        } else {
            RuleOutcome::Pass
        }
    }
}

/// Rule: drop sensitive keys anywhere in the payload (case-insensitive)
pub struct StripSensitiveKeysRule {
    keys: HashSet<String>,
}

impl StripSensitiveKeysRule {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keys: keys
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Returns true if anything was removed.
    fn strip(&self, value: &mut Value) -> bool {
        match value {
            Value::Object(map) => {
                let before = map.len();
                map.retain(|key, _| !self.keys.contains(&key.to_lowercase()));
                let mut changed = map.len() != before;
                for nested in map.values_mut() {
                    changed |= self.strip(nested);
                }
                changed
            }
            Value::Array(items) => items
                .iter_mut()
                .fold(false, |changed, item| self.strip(item) | changed),
            _ => false,
        }
    }
}

impl FlowRule for StripSensitiveKeysRule {
    fn name(&self) -> &'static str {
        "strip_sensitive_keys"
    }

    fn check(&self, _request: &FlowRequest, data: &Value) -> RuleOutcome {
        let mut cleaned = data.clone();
        if self.strip(&mut cleaned) {
            RuleOutcome::Rewrite(cleaned)
        } else {
            RuleOutcome::Pass
        }
    }
}

pub const DEFAULT_SENSITIVE_KEYS: &[&str] = &[
    "ssn",
    "tax_id",
    "bank_account",
    "account_number",
    "password",
    "api_key",
    "lp_commitments",
];

/// Policy with the standard rule set
pub fn create_default_policy<I, S>(blocked_funds: I) -> RuleBasedFlowPolicy
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut policy = RuleBasedFlowPolicy::new();
    policy.add_rule(Box::new(BlockedFundsRule::new(blocked_funds)));
    policy.add_rule(Box::new(StripSensitiveKeysRule::new(DEFAULT_SENSITIVE_KEYS)));
    policy
}
