//! Bridge configuration

/// Options for a `PeerBridge`
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Name included in log output, useful when several bridges coexist
    pub name: String,

    /// Construct objects in a single `new_object` step even when the
    /// runtime supports allocate-then-construct
    pub force_new_object: bool,

    /// Initial capacity of the handle table
    pub handle_table_capacity: usize,
}

impl BridgeOptions {
    /// Resolve the creation mode against the runtime's capability flag
    pub fn new_object_required(&self, runtime_requires: bool) -> bool {
        runtime_requires || self.force_new_object
    }
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            force_new_object: false,
            handle_table_capacity: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = BridgeOptions::default();
        assert_eq!(options.name, "default");
        assert!(!options.new_object_required(false));
        assert!(options.new_object_required(true));
    }

    #[test]
    fn test_force_new_object() {
        let options = BridgeOptions {
            force_new_object: true,
            ..Default::default()
        };
        assert!(options.new_object_required(false));
        assert!(options.new_object_required(true));
    }
}
