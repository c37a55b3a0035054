//! Tier-based feature gating
//!
//! The only place where tier-conditional behavior is decided. Everything
//! downstream consumes [`GatedParameters`] and never inspects a tier.

use pitwall_common::Tier;

use crate::entitlement::TierStatus;
use crate::error::{ClientError, Result};

/// Prediction depth for the free tier
pub const FREE_RESULT_DEPTH: u32 = 3;
/// Prediction depth for the pro tier
pub const PRO_RESULT_DEPTH: u32 = 5;

/// Which part of the race calendar is visible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarScope {
    Recent,
    Full,
}

impl CalendarScope {
    /// Value of the `tier` query parameter on `GET /races`
    pub fn race_query(&self) -> &'static str {
        match self {
            CalendarScope::Recent => "free",
            CalendarScope::Full => "pro",
        }
    }
}

/// Feature parameters derived from a tier; recomputed, never persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatedParameters {
    pub result_depth: u32,
    pub calendar_scope: CalendarScope,
}

/// Map a confirmed tier to its feature parameters
pub fn derive_parameters(tier: Tier) -> GatedParameters {
    match tier {
        Tier::Free => GatedParameters {
            result_depth: FREE_RESULT_DEPTH,
            calendar_scope: CalendarScope::Recent,
        },
        Tier::Pro => GatedParameters {
            result_depth: PRO_RESULT_DEPTH,
            calendar_scope: CalendarScope::Full,
        },
    }
}

impl GatedParameters {
    /// Parameters for a sync outcome; an unconfirmed tier blocks gated actions
    pub fn for_status(status: TierStatus) -> Result<Self> {
        match status {
            TierStatus::Confirmed(tier) => Ok(derive_parameters(tier)),
            TierStatus::Unknown => Err(ClientError::TierUnknown),
        }
    }
}
