//! Permission policy for tool execution.
//!
//! A [`Permissions`] value maps `(tool name, input)` to a
//! [`PermissionDecision`] through three layers, in order:
//!
//! 1. **Declarative rules** — filesystem-style glob patterns over the tool
//!    name (`*`, `?`, `[...]`). All matching rules are collected and
//!    priority is `Deny > Ask > Allow` regardless of registration order.
//!    Invalid patterns are silently skipped.
//! 2. **User callback** — consulted when no rule matched.
//! 3. **Mode defaults** — against the built-in read-only and write tool
//!    tables.
//!
//! An `Ask` decision is resolved by the run loop via the
//! `PermissionRequest` hook; if no hook answers, or the hook blocks, the
//! tool is denied.

use crate::Result;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Tools that only read state. Always allowed under `Default` and
/// `AcceptEdits`, and the only tools allowed under `Plan`.
const READ_ONLY_TOOLS: &[&str] = &["Read", "Glob", "Grep", "WebFetch", "WebSearch"];

/// Tools that write files. Additionally allowed under `AcceptEdits`.
const WRITE_TOOLS: &[&str] = &["Write", "Edit"];

/// Whether a tool is in the built-in read-only table.
pub fn is_read_only_tool(name: &str) -> bool {
    READ_ONLY_TOOLS.contains(&name)
}

/// Whether a tool is in the built-in write table.
pub fn is_write_tool(name: &str) -> bool {
    WRITE_TOOLS.contains(&name)
}

/// Permission mode applied when neither rules nor callback decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionMode {
    /// Read-only tools allowed, everything else asks.
    #[default]
    Default,
    /// Read-only and write tools allowed, everything else asks.
    AcceptEdits,
    /// Everything allowed.
    BypassPermissions,
    /// Read-only tools allowed, everything else denied.
    Plan,
}

/// Outcome of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionDecision {
    /// Execute the tool.
    Allow,
    /// Refuse with a synthetic error result.
    Deny,
    /// Defer to the `PermissionRequest` hook.
    Ask,
}

/// A glob pattern paired with a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRule {
    /// Glob over the tool name.
    pub pattern: String,
    /// Decision applied when the pattern matches.
    pub decision: PermissionDecision,
}

impl PermissionRule {
    /// Creates a rule.
    pub fn new(pattern: impl Into<String>, decision: PermissionDecision) -> Self {
        Self {
            pattern: pattern.into(),
            decision,
        }
    }
}

/// Type alias for the user permission callback.
pub type PermissionCallback = Arc<
    dyn Fn(String, Value) -> Pin<Box<dyn Future<Output = Result<PermissionDecision>> + Send>>
        + Send
        + Sync,
>;

/// The permission policy: mode, rules, and an optional callback.
#[derive(Clone, Default)]
pub struct Permissions {
    mode: PermissionMode,
    rules: Vec<PermissionRule>,
    callback: Option<PermissionCallback>,
}

impl std::fmt::Debug for Permissions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Permissions")
            .field("mode", &self.mode)
            .field("rules", &self.rules)
            .field("callback", &self.callback.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl Permissions {
    /// Creates a policy with `Default` mode and no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the mode.
    pub fn mode(mut self, mode: PermissionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Appends a rule.
    pub fn rule(mut self, rule: PermissionRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Appends an Allow rule for a pattern.
    pub fn allow(self, pattern: impl Into<String>) -> Self {
        self.rule(PermissionRule::new(pattern, PermissionDecision::Allow))
    }

    /// Appends a Deny rule for a pattern.
    pub fn deny(self, pattern: impl Into<String>) -> Self {
        self.rule(PermissionRule::new(pattern, PermissionDecision::Deny))
    }

    /// Appends an Ask rule for a pattern.
    pub fn ask(self, pattern: impl Into<String>) -> Self {
        self.rule(PermissionRule::new(pattern, PermissionDecision::Ask))
    }

    /// Sets the user callback, consulted when no rule matches.
    pub fn callback<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(String, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<PermissionDecision>> + Send + 'static,
    {
        self.callback = Some(Arc::new(move |name, input| {
            Box::pin(callback(name, input))
        }));
        self
    }

    /// Decides whether a tool may run.
    ///
    /// # Errors
    ///
    /// Propagates a user-callback error; the loop converts it into a
    /// synthetic error result for the block.
    pub async fn check(&self, tool_name: &str, input: &Value) -> Result<PermissionDecision> {
        // Rules first. Collect every match; Deny > Ask > Allow regardless
        // of registration order. Invalid globs are skipped.
        let mut matched_ask = false;
        let mut matched_allow = false;
        for rule in &self.rules {
            let Ok(pattern) = glob::Pattern::new(&rule.pattern) else {
                continue;
            };
            if !pattern.matches(tool_name) {
                continue;
            }
            match rule.decision {
                PermissionDecision::Deny => return Ok(PermissionDecision::Deny),
                PermissionDecision::Ask => matched_ask = true,
                PermissionDecision::Allow => matched_allow = true,
            }
        }
        if matched_ask {
            return Ok(PermissionDecision::Ask);
        }
        if matched_allow {
            return Ok(PermissionDecision::Allow);
        }

        // No rule matched: consult the user callback.
        if let Some(callback) = &self.callback {
            return callback(tool_name.to_string(), input.clone()).await;
        }

        // Mode defaults.
        Ok(match self.mode {
            PermissionMode::BypassPermissions => PermissionDecision::Allow,
            PermissionMode::Plan => {
                if is_read_only_tool(tool_name) {
                    PermissionDecision::Allow
                } else {
                    PermissionDecision::Deny
                }
            }
            PermissionMode::AcceptEdits => {
                if is_read_only_tool(tool_name) || is_write_tool(tool_name) {
                    PermissionDecision::Allow
                } else {
                    PermissionDecision::Ask
                }
            }
            PermissionMode::Default => {
                if is_read_only_tool(tool_name) {
                    PermissionDecision::Allow
                } else {
                    PermissionDecision::Ask
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn check(perms: &Permissions, tool: &str) -> PermissionDecision {
        perms.check(tool, &json!({})).await.unwrap()
    }

    #[tokio::test]
    async fn test_rule_priority_deny_over_ask_over_allow() {
        // All three patterns match; Deny must win no matter the order.
        let perms = Permissions::new()
            .allow("Bash*")
            .ask("Bash?")
            .deny("Bash5");
        assert_eq!(check(&perms, "Bash5").await, PermissionDecision::Deny);

        let perms = Permissions::new().allow("Bash*").ask("Bash?");
        assert_eq!(check(&perms, "Bash5").await, PermissionDecision::Ask);

        let perms = Permissions::new().allow("Bash*");
        assert_eq!(check(&perms, "Bash5").await, PermissionDecision::Allow);
    }

    #[tokio::test]
    async fn test_invalid_glob_is_skipped() {
        let perms = Permissions::new()
            .deny("[unclosed")
            .allow("Read");
        // The broken deny rule must not shadow the valid allow rule, and
        // must not poison checks for other names.
        assert_eq!(check(&perms, "Read").await, PermissionDecision::Allow);
        assert_eq!(check(&perms, "Write").await, PermissionDecision::Ask);
    }

    #[tokio::test]
    async fn test_callback_used_when_no_rule_matches() {
        let perms = Permissions::new()
            .deny("Bash")
            .callback(|name, _input| async move {
                if name == "Write" {
                    Ok(PermissionDecision::Allow)
                } else {
                    Ok(PermissionDecision::Deny)
                }
            });

        // Rule match short-circuits the callback.
        assert_eq!(check(&perms, "Bash").await, PermissionDecision::Deny);
        // Unmatched names go to the callback.
        assert_eq!(check(&perms, "Write").await, PermissionDecision::Allow);
        assert_eq!(check(&perms, "Grep").await, PermissionDecision::Deny);
    }

    #[tokio::test]
    async fn test_mode_default() {
        let perms = Permissions::new();
        assert_eq!(check(&perms, "Read").await, PermissionDecision::Allow);
        assert_eq!(check(&perms, "Glob").await, PermissionDecision::Allow);
        assert_eq!(check(&perms, "Write").await, PermissionDecision::Ask);
        assert_eq!(check(&perms, "Bash").await, PermissionDecision::Ask);
    }

    #[tokio::test]
    async fn test_mode_accept_edits() {
        let perms = Permissions::new().mode(PermissionMode::AcceptEdits);
        assert_eq!(check(&perms, "Read").await, PermissionDecision::Allow);
        assert_eq!(check(&perms, "Write").await, PermissionDecision::Allow);
        assert_eq!(check(&perms, "Edit").await, PermissionDecision::Allow);
        assert_eq!(check(&perms, "Bash").await, PermissionDecision::Ask);
    }

    #[tokio::test]
    async fn test_mode_plan() {
        let perms = Permissions::new().mode(PermissionMode::Plan);
        assert_eq!(check(&perms, "Read").await, PermissionDecision::Allow);
        assert_eq!(check(&perms, "WebSearch").await, PermissionDecision::Allow);
        assert_eq!(check(&perms, "Write").await, PermissionDecision::Deny);
        assert_eq!(check(&perms, "Bash").await, PermissionDecision::Deny);
    }

    #[tokio::test]
    async fn test_mode_bypass() {
        let perms = Permissions::new().mode(PermissionMode::BypassPermissions);
        assert_eq!(check(&perms, "Bash").await, PermissionDecision::Allow);
        assert_eq!(check(&perms, "anything").await, PermissionDecision::Allow);
    }

    #[test]
    fn test_tool_tables() {
        assert!(is_read_only_tool("Read"));
        assert!(is_read_only_tool("WebFetch"));
        assert!(!is_read_only_tool("Write"));
        assert!(is_write_tool("Edit"));
        assert!(!is_write_tool("Bash"));
    }
}
