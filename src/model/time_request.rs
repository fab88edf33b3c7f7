use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn status(self) -> RequestStatus {
        match self {
            Decision::Approve => RequestStatus::Approved,
            Decision::Reject => RequestStatus::Rejected,
        }
    }
}

/// Overtime and undertime requests share one approval workflow over two tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Overtime,
    Undertime,
}

impl RequestKind {
    pub fn table(self) -> &'static str {
        match self {
            RequestKind::Overtime => "overtime_requests",
            RequestKind::Undertime => "undertime_requests",
        }
    }

    pub fn id_column(self) -> &'static str {
        match self {
            RequestKind::Overtime => "ot_id",
            RequestKind::Undertime => "ut_id",
        }
    }

    fn label(self) -> &'static str {
        match self {
            RequestKind::Overtime => "overtime",
            RequestKind::Undertime => "undertime",
        }
    }

    pub fn notification(self, decision: Decision) -> String {
        format!("Your {} request was {}", self.label(), decision.status())
    }
}

/// Filters shared by the "all requests" listings.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams, ToSchema)]
pub struct RequestFilter {
    #[schema(example = "2024-05-01")]
    pub start_date: Option<String>,
    #[schema(example = "2024-05-31")]
    pub end_date: Option<String>,
    pub employee_id: Option<u64>,
    #[schema(example = "pending")]
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_names_kind_and_outcome() {
        assert_eq!(
            RequestKind::Overtime.notification(Decision::Approve),
            "Your overtime request was approved"
        );
        assert_eq!(
            RequestKind::Undertime.notification(Decision::Reject),
            "Your undertime request was rejected"
        );
    }

    #[test]
    fn kinds_map_to_their_tables() {
        assert_eq!(RequestKind::Overtime.table(), "overtime_requests");
        assert_eq!(RequestKind::Undertime.id_column(), "ut_id");
    }
}
