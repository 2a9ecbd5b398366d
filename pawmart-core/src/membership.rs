use crate::CheckoutResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TierName {
    Silver,
    Golden,
    Diamond,
}

impl TierName {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierName::Silver => "SILVER",
            TierName::Golden => "GOLDEN",
            TierName::Diamond => "DIAMOND",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SILVER" => Some(TierName::Silver),
            "GOLDEN" => Some(TierName::Golden),
            "DIAMOND" => Some(TierName::Diamond),
            _ => None,
        }
    }
}

/// A subscription level granting a percentage discount and free shipping
/// while active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipTier {
    pub tier: TierName,
    /// Discount fraction, e.g. 0.10 for Golden.
    pub rate: f64,
    pub expires_at: DateTime<Utc>,
}

impl MembershipTier {
    /// An expired tier is inert, identical to having no membership.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Contract with the membership/profile service.
#[async_trait]
pub trait MembershipLookup: Send + Sync {
    async fn tier_for(&self, customer_id: &str) -> CheckoutResult<Option<MembershipTier>>;
}

/// In-process membership directory for tests and local development.
pub struct MockMembershipLookup {
    tiers: Mutex<HashMap<String, MembershipTier>>,
}

impl MockMembershipLookup {
    pub fn new() -> Self {
        Self {
            tiers: Mutex::new(HashMap::new()),
        }
    }

    pub async fn set_tier(&self, customer_id: &str, tier: MembershipTier) {
        self.tiers
            .lock()
            .await
            .insert(customer_id.to_string(), tier);
    }
}

impl Default for MockMembershipLookup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MembershipLookup for MockMembershipLookup {
    async fn tier_for(&self, customer_id: &str) -> CheckoutResult<Option<MembershipTier>> {
        Ok(self.tiers.lock().await.get(customer_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn expired_tier_is_inert() {
        let now = Utc::now();
        let tier = MembershipTier {
            tier: TierName::Golden,
            rate: 0.10,
            expires_at: now - Duration::days(1),
        };
        assert!(!tier.is_active(now));

        let active = MembershipTier {
            expires_at: now + Duration::days(30),
            ..tier
        };
        assert!(active.is_active(now));
    }
}
