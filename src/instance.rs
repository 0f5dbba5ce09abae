//! The currently registered instance.
//!
//! Set by a successful RegisterInstance, cleared whenever the connection is
//! torn down. Readers always see either a complete identity or none.

use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::protocol::InstanceId;

/// Identity assigned to this terminal for the current connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub instance_id: InstanceId,
    pub site_id: i32,
    pub device_id: i32,
}

/// Process-wide active instance, shared through `Arc`.
#[derive(Debug, Default)]
pub struct ActiveInstance {
    current: Mutex<Option<InstanceInfo>>,
}

impl ActiveInstance {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<InstanceInfo>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self) -> Option<InstanceInfo> {
        *self.lock()
    }

    pub fn instance_id(&self) -> Option<InstanceId> {
        self.get().map(|info| info.instance_id)
    }

    pub fn set(&self, info: InstanceInfo) {
        info!(instance_id = info.instance_id, "Instance registered");
        *self.lock() = Some(info);
    }

    /// Returns the identity that was active, if any.
    pub fn clear(&self) -> Option<InstanceInfo> {
        self.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_clear() {
        let active = ActiveInstance::new();
        assert_eq!(active.get(), None);

        let info = InstanceInfo {
            instance_id: 12,
            site_id: 1,
            device_id: 2,
        };
        active.set(info);
        assert_eq!(active.instance_id(), Some(12));

        assert_eq!(active.clear(), Some(info));
        assert_eq!(active.get(), None);
        assert_eq!(active.clear(), None);
    }
}
