//! Lifecycle states.
//!
//! `OfferPhase` is the engine's own view of a trade's progress. It only ever
//! moves forward. `OfferState` is the trading protocol's view of an offer, as
//! reported by the offer watcher.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

/// Engine-side phase of a trade.
///
/// ```text
/// Queued -> Pending -> Sent -> Confirmed -> Accepted
///                        \         \
///                         +---------+--> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferPhase {
    /// Marketplace sale not yet accepted by us.
    #[default]
    Queued,
    /// Sale accepted on the marketplace, offer not yet sent.
    Pending,
    /// Offer submitted to the trading protocol.
    Sent,
    /// Offer confirmed (second factor) and visible to the buyer.
    Confirmed,
    /// Buyer accepted the offer.
    Accepted,
    /// Offer withdrawn because its grace period started.
    Cancelled,
}

impl OfferPhase {
    fn rank(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Pending => 1,
            Self::Sent => 2,
            Self::Confirmed => 3,
            Self::Accepted | Self::Cancelled => 4,
        }
    }

    /// Returns true once no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Cancelled)
    }

    /// Returns true if an outbound offer exists for this phase.
    #[must_use]
    pub fn has_offer(self) -> bool {
        matches!(
            self,
            Self::Sent | Self::Confirmed | Self::Accepted | Self::Cancelled
        )
    }

    /// Check whether `next` is a legal forward transition from `self`.
    ///
    /// Forward jumps are allowed (a trade can be registered directly as
    /// `Confirmed`). Terminal phases are only reachable once an offer exists.
    #[must_use]
    pub fn can_advance_to(self, next: OfferPhase) -> bool {
        if self.is_terminal() || next.rank() <= self.rank() {
            return false;
        }
        if next.is_terminal() {
            return matches!(self, Self::Sent | Self::Confirmed);
        }
        true
    }

    /// Validate a transition, returning the new phase.
    pub fn advance(self, next: OfferPhase) -> Result<OfferPhase> {
        if self.can_advance_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for OfferPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Confirmed => "confirmed",
            Self::Accepted => "accepted",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Trading-protocol offer state (numeric codes as reported by the Web API).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OfferState {
    Invalid,
    Active,
    Accepted,
    Countered,
    Expired,
    Canceled,
    Declined,
    InvalidItems,
    CreatedNeedsConfirmation,
    CanceledBySecondFactor,
    InEscrow,
}

impl OfferState {
    /// Map a protocol state code to an `OfferState`.
    pub fn from_code(code: i64) -> Result<Self> {
        let state = match code {
            1 => Self::Invalid,
            2 => Self::Active,
            3 => Self::Accepted,
            4 => Self::Countered,
            5 => Self::Expired,
            6 => Self::Canceled,
            7 => Self::Declined,
            8 => Self::InvalidItems,
            9 => Self::CreatedNeedsConfirmation,
            10 => Self::CanceledBySecondFactor,
            11 => Self::InEscrow,
            other => return Err(CoreError::UnknownOfferState(other)),
        };
        Ok(state)
    }

    /// Returns true if the offer can no longer change state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            Self::Active | Self::CreatedNeedsConfirmation | Self::InEscrow
        )
    }
}

impl fmt::Display for OfferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_moves_forward_only() {
        assert!(OfferPhase::Queued.can_advance_to(OfferPhase::Pending));
        assert!(OfferPhase::Pending.can_advance_to(OfferPhase::Sent));
        assert!(OfferPhase::Pending.can_advance_to(OfferPhase::Confirmed));
        assert!(OfferPhase::Sent.can_advance_to(OfferPhase::Confirmed));
        assert!(!OfferPhase::Confirmed.can_advance_to(OfferPhase::Sent));
        assert!(!OfferPhase::Sent.can_advance_to(OfferPhase::Sent));
        assert!(!OfferPhase::Pending.can_advance_to(OfferPhase::Queued));
    }

    #[test]
    fn test_terminal_phases_require_offer() {
        assert!(!OfferPhase::Pending.can_advance_to(OfferPhase::Accepted));
        assert!(!OfferPhase::Queued.can_advance_to(OfferPhase::Cancelled));
        assert!(OfferPhase::Sent.can_advance_to(OfferPhase::Cancelled));
        assert!(OfferPhase::Confirmed.can_advance_to(OfferPhase::Accepted));
    }

    #[test]
    fn test_terminal_phases_are_final() {
        assert!(!OfferPhase::Accepted.can_advance_to(OfferPhase::Cancelled));
        assert!(!OfferPhase::Cancelled.can_advance_to(OfferPhase::Accepted));
        let err = OfferPhase::Accepted.advance(OfferPhase::Confirmed).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }

    #[test]
    fn test_offer_state_codes() {
        assert_eq!(OfferState::from_code(3).unwrap(), OfferState::Accepted);
        assert_eq!(
            OfferState::from_code(9).unwrap(),
            OfferState::CreatedNeedsConfirmation
        );
        assert!(OfferState::from_code(42).is_err());
        assert!(!OfferState::Active.is_terminal());
        assert!(OfferState::Declined.is_terminal());
    }
}
