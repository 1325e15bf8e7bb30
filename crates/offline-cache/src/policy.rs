//! Expiration policy: per-class TTLs and freshness checks

use chrono::{DateTime, Duration, Utc};

use crate::classify::ResourceClass;
use crate::config::TtlTable;
use crate::types::Response;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExpirationPolicy {
    ttl: TtlTable,
}

impl ExpirationPolicy {
    pub fn new(ttl: TtlTable) -> Self {
        Self { ttl }
    }

    pub fn ttl_for(&self, class: ResourceClass) -> Duration {
        match class {
            ResourceClass::StaticAsset => self.ttl.static_asset,
            ResourceClass::Image => self.ttl.image,
            ResourceClass::ExternalResource => self.ttl.external,
            ResourceClass::HtmlPage | ResourceClass::Other => self.ttl.html,
        }
    }

    /// Whether a stored entry is still fresh. Entries without a parsable
    /// cached-at stamp are never fresh.
    pub fn is_fresh(&self, entry: &Response, class: ResourceClass, now: DateTime<Utc>) -> bool {
        match entry.cached_at() {
            Some(stored_at) => now - stored_at < self.ttl_for(class),
            None => false,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_clock {
    use super::*;
    use std::sync::Mutex;

    /// Clock that only moves when told to
    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub fn new(now: DateTime<Utc>) -> Self {
            Self {
                now: Mutex::new(now),
            }
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }
}
