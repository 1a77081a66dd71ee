use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Paid subscriptions lapse back to Basic after this many days.
const SUBSCRIPTION_DAYS: i64 = 30;

/// Subscription tiers and their monthly try-on allowance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[strum(ascii_case_insensitive)]
pub enum Plan {
    Basic,
    Elegant,
    Glamour,
}

impl Plan {
    pub fn try_on_limit(self) -> u32 {
        match self {
            Plan::Basic => 5,
            Plan::Elegant => 20,
            Plan::Glamour => 40,
        }
    }
}

/// Plan lookup response: `{ plan, subsDate, tryOnCount }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPlan {
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub subs_date: Option<String>,
    #[serde(default)]
    pub try_on_count: u32,
}

impl UserPlan {
    /// The plan currently in force. Unknown, undated or lapsed plans are Basic.
    pub fn active_plan(&self, now: DateTime<Utc>) -> Plan {
        let Some(plan) = self.plan.as_deref().and_then(|p| Plan::from_str(p.trim()).ok()) else {
            return Plan::Basic;
        };
        let Some(subscribed_at) = self.subs_date.as_deref().and_then(parse_subs_date) else {
            return Plan::Basic;
        };

        if now - subscribed_at > Duration::days(SUBSCRIPTION_DAYS) {
            Plan::Basic
        } else {
            plan
        }
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> u32 {
        self.active_plan(now)
            .try_on_limit()
            .saturating_sub(self.try_on_count)
    }

    pub fn quota_exceeded(&self, now: DateTime<Utc>) -> bool {
        self.remaining(now) == 0
    }
}

fn parse_subs_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
