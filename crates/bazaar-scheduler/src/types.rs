use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// Collection name stored on every offer job row.
pub const PROMO_OFFER_COLLECTION: &str = "PromoOffer";

/// Logical job kind persisted in `scheduled_jobs.name`.
///
/// Recovery uses the kind to decide which handler to re-attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// Activate promotional pricing on the offer's products.
    OfferStart,
    /// Restore base pricing and delete the offer.
    OfferEnd,
}

impl JobKind {
    pub const ALL: [JobKind; 2] = [JobKind::OfferStart, JobKind::OfferEnd];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::OfferStart => "offer-start",
            JobKind::OfferEnd => "offer-end",
        }
    }

    /// Which instant of the offer this job fires at.
    pub fn target_of(&self, offer: &bazaar_core::OfferRecord) -> DateTime<Utc> {
        match self {
            JobKind::OfferStart => offer.start_date_time,
            JobKind::OfferEnd => offer.end_date_time,
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobKind {
    type Err = SchedulerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "offer-start" => Ok(JobKind::OfferStart),
            "offer-end" => Ok(JobKind::OfferEnd),
            other => Err(SchedulerError::UnknownJobKind(other.to_string())),
        }
    }
}

/// Durable handle to one pending timed action (a row of `scheduled_jobs`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// UUID v7 string; primary key, never changes.
    pub id: String,
    /// Logical job kind as stored, e.g. `"offer-start"`. Kept as text so rows
    /// written by a newer build still load.
    pub name: String,
    /// Entity type the job concerns, currently always [`PROMO_OFFER_COLLECTION`].
    pub collection_name: String,
    /// Id of the offer (or other entity) the job acts upon.
    pub referenced_entity_id: String,
    /// Target instant at arming time. Informational; recovery re-reads the offer.
    pub target_at: Option<DateTime<Utc>>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

impl JobRecord {
    /// Parsed job kind, or `None` for a name this build does not know.
    pub fn kind(&self) -> Option<JobKind> {
        self.name.parse().ok()
    }

    /// Scheduler trigger name for this row.
    pub fn trigger_name(&self) -> String {
        format!("{}:{}", self.name, self.referenced_entity_id)
    }
}

/// Trigger name used for one offer's start or end timer.
pub fn trigger_name(kind: JobKind, offer_id: &str) -> String {
    format!("{}:{}", kind.as_str(), offer_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_str() {
        for kind in JobKind::ALL {
            assert_eq!(kind.as_str().parse::<JobKind>().unwrap(), kind);
        }
        let err = "offer-pause".parse::<JobKind>().unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownJobKind(ref name) if name == "offer-pause"));
    }

    #[test]
    fn trigger_name_is_scoped_to_offer() {
        assert_eq!(trigger_name(JobKind::OfferEnd, "o-1"), "offer-end:o-1");
        let record = JobRecord {
            id: "j-1".into(),
            name: "offer-start".into(),
            collection_name: PROMO_OFFER_COLLECTION.into(),
            referenced_entity_id: "o-1".into(),
            target_at: None,
            created_at: String::new(),
        };
        assert_eq!(record.trigger_name(), trigger_name(JobKind::OfferStart, "o-1"));
    }
}
