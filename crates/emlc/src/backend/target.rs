use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::backend::ir::Primitive;

/// Capabilities of the machine a map is compiled for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub primitives: BTreeSet<Primitive>,
    /// Whether the runtime can call back into host code.
    pub supports_callbacks: bool,
    pub max_loop_depth: usize,
}

impl Target {
    /// Host execution: every primitive, no callbacks.
    pub fn host() -> Self {
        Self {
            name: "host".to_string(),
            primitives: Primitive::ALL.into_iter().collect(),
            supports_callbacks: false,
            max_loop_depth: 16,
        }
    }

    /// Microcontroller-class target with a reduced math library and host callbacks.
    pub fn embedded() -> Self {
        let mut primitives: BTreeSet<Primitive> = Primitive::CORE.into_iter().collect();
        primitives.extend([Primitive::Mul, Primitive::Sqrt, Primitive::Abs, Primitive::Neg]);
        Self {
            name: "embedded".to_string(),
            primitives,
            supports_callbacks: true,
            max_loop_depth: 8,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "host" => Some(Self::host()),
            "embedded" => Some(Self::embedded()),
            _ => None,
        }
    }

    pub fn has_primitive(&self, primitive: Primitive) -> bool {
        Primitive::CORE.contains(&primitive) || self.primitives.contains(&primitive)
    }

    pub fn with_callbacks(mut self, enabled: bool) -> Self {
        self.supports_callbacks = enabled;
        self
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::host()
    }
}
