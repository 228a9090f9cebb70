use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical identifier of a cluster member (e.g. `order-node-1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_serializes_as_plain_string() {
        let id = NodeId::from("order-node-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"order-node-1\"");
        assert_eq!(id.to_string(), "order-node-1");
    }
}
