//! Status enums for every stateful entity
//!
//! Stored in PostgreSQL as lowercase text; `as_str`/`parse` round-trip the
//! wire form. Entities are never hard-deleted, only status-transitioned.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! status_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!("unknown {}: {}", stringify!($name), other)),
                }
            }
        }
    };
}

status_enum! {
    /// Agent account lifecycle.
    AgentStatus {
        Active => "active",
        Suspended => "suspended",
        Deactivated => "deactivated",
    }
}

status_enum! {
    ListingStatus {
        Active => "active",
        Paused => "paused",
        Archived => "archived",
    }
}

status_enum! {
    PriceModel {
        PerCall => "per_call",
        PerUnit => "per_unit",
        PerHour => "per_hour",
        Flat => "flat",
    }
}

status_enum! {
    /// Job lifecycle. Completed, Failed, Disputed, Resolved and Cancelled are
    /// terminal: no outgoing transitions exist.
    JobStatus {
        Proposed => "proposed",
        Negotiating => "negotiating",
        Agreed => "agreed",
        Funded => "funded",
        InProgress => "in_progress",
        Delivered => "delivered",
        Verifying => "verifying",
        Completed => "completed",
        Failed => "failed",
        Disputed => "disputed",
        Resolved => "resolved",
        Cancelled => "cancelled",
    }
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed
                | JobStatus::Failed
                | JobStatus::Disputed
                | JobStatus::Resolved
                | JobStatus::Cancelled
        )
    }
}

status_enum! {
    EscrowStatus {
        Pending => "pending",
        Funded => "funded",
        Released => "released",
        Refunded => "refunded",
        Disputed => "disputed",
    }
}

status_enum! {
    /// Actions recorded in the append-only escrow audit log.
    EscrowAction {
        Created => "created",
        Funded => "funded",
        Released => "released",
        Refunded => "refunded",
        Disputed => "disputed",
        Resolved => "resolved",
    }
}

status_enum! {
    /// Why an escrow was refunded; recorded in audit metadata.
    RefundCause {
        Failed => "failed",
        Cancelled => "cancelled",
        Deadline => "deadline",
        Deactivation => "deactivation",
    }
}

status_enum! {
    ReviewRole {
        ClientOfSeller => "client_of_seller",
        SellerOfClient => "seller_of_client",
    }
}

status_enum! {
    DepositStatus {
        Pending => "pending",
        Confirming => "confirming",
        Credited => "credited",
        Failed => "failed",
    }
}

status_enum! {
    WithdrawalStatus {
        Pending => "pending",
        Processing => "processing",
        Completed => "completed",
        Failed => "failed",
    }
}

status_enum! {
    WebhookStatus {
        Pending => "pending",
        Delivered => "delivered",
        Failed => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_round_trips() {
        for s in [
            JobStatus::Proposed,
            JobStatus::Negotiating,
            JobStatus::Agreed,
            JobStatus::Funded,
            JobStatus::InProgress,
            JobStatus::Delivered,
            JobStatus::Verifying,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Disputed,
            JobStatus::Resolved,
            JobStatus::Cancelled,
        ] {
            assert_eq!(s.as_str().parse::<JobStatus>().unwrap(), s);
        }
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(JobStatus::Disputed.is_terminal());
        assert!(!JobStatus::Delivered.is_terminal());
        assert!(!JobStatus::Funded.is_terminal());
    }

    #[test]
    fn unknown_status_rejected() {
        assert!("archived".parse::<JobStatus>().is_err());
        assert!("active".parse::<EscrowStatus>().is_err());
    }
}
