use std::fmt;

/// Offer/answer progress with one remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// No description exchanged yet.
    Idle,
    /// Our initial offer is out, waiting for the answer.
    OfferSent,
    /// Remote offer applied, our answer is being produced.
    AnswerPending,
    Stable,
    /// A follow-up offer (structural media change) is out.
    Renegotiating,
}

impl NegotiationState {
    /// An offer of ours awaits an answer.
    pub fn has_offer_in_flight(self) -> bool {
        matches!(self, NegotiationState::OfferSent | NegotiationState::Renegotiating)
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NegotiationState::Idle => "idle",
            NegotiationState::OfferSent => "offer-sent",
            NegotiationState::AnswerPending => "answer-pending",
            NegotiationState::Stable => "stable",
            NegotiationState::Renegotiating => "renegotiating",
        };
        f.write_str(name)
    }
}
