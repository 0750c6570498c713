//! GraphQL documents for the agent operations.

use bridge_core::transport::{INFO_OPERATION, STEP_OPERATION};

/// Per-frame exchange.
pub const STEP: &str = r"
query step($observation: ObservationInput!) {
  step(observation: $observation) {
    action {
      abilityId
      unitTags
      targetWorldSpacePos { x y }
      targetUnitTag
      queueCommand
    }
    context
  }
}
";

/// Agent identity.
pub const INFO: &str = r"
query info {
  info {
    id
    name
    description
  }
}
";

/// Document for `operation`, if the agent protocol defines one.
#[must_use]
pub fn for_operation(operation: &str) -> Option<&'static str> {
    match operation {
        STEP_OPERATION => Some(STEP),
        INFO_OPERATION => Some(INFO),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_operations() {
        assert!(for_operation(STEP_OPERATION).unwrap().contains("step(observation"));
        assert!(for_operation(INFO_OPERATION).unwrap().contains("description"));
        assert!(for_operation("subscribe").is_none());
    }
}
