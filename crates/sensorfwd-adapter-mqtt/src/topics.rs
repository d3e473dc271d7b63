//! Node subscription topics.
//!
//! A node is the first topic level under which a group of sensors publish,
//! e.g. `sensors` in `sensors/outside/humidity`.

/// Multi-level wildcard subscription for all topics of a node.
#[must_use]
pub fn node_wildcard(node: &str) -> String {
    format!("{node}/#")
}

/// Check that a node name can be used as a topic level.
///
/// # Errors
///
/// Returns error if the name is empty or contains `/`, `+` or `#`.
pub fn validate_node(node: &str) -> Result<(), InvalidNode> {
    if node.is_empty() || node.contains(['/', '+', '#']) {
        return Err(InvalidNode(node.to_string()));
    }
    Ok(())
}

/// A node name that is not a single literal topic level.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid node name '{0}': must be a single topic level without wildcards")]
pub struct InvalidNode(pub String);
