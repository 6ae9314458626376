use super::StorageError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Tier {
    Remote,
    Local,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Remote => "remote",
            Tier::Local => "local",
        }
    }
}

/// Decides which tier serves an operation first, and which primary failures
/// are worth retrying on the other tier.
#[derive(Debug, Copy, Clone)]
pub struct FallbackPolicy {
    pub order: [Tier; 2],
    pub fall_back_on: fn(&StorageError) -> bool,
}

impl FallbackPolicy {
    /// Remote first, local cache on any remote failure.
    pub fn remote_first() -> Self {
        Self {
            order: [Tier::Remote, Tier::Local],
            fall_back_on: |_| true,
        }
    }

    /// Remote first, but only connectivity failures reach the cache. Errors
    /// such as an unknown id are returned as-is.
    pub fn remote_first_when_unavailable() -> Self {
        Self {
            order: [Tier::Remote, Tier::Local],
            fall_back_on: StorageError::is_unavailable,
        }
    }

    /// Local cache first; for offline-first deployments.
    pub fn local_first() -> Self {
        Self {
            order: [Tier::Local, Tier::Remote],
            fall_back_on: |_| true,
        }
    }

    pub fn primary(&self) -> Tier {
        self.order[0]
    }

    pub fn secondary(&self) -> Tier {
        self.order[1]
    }

    pub fn should_fall_back(&self, error: &StorageError) -> bool {
        (self.fall_back_on)(error)
    }
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self::remote_first()
    }
}
