use crate::error::{CallError, CallResult};
use crate::media::TrackController;
use crate::negotiation::candidate_buffer::CandidateBuffer;
use crate::negotiation::state::NegotiationState;
use crate::signaling::SignalingOutput;
use crate::transport::{LinkFactory, LinkState, PeerLink, TransportEvent};
use duet_core::{IceCandidate, PeerId, SdpType, SessionDescription, SignalPayload};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

struct PeerSlot {
    state: NegotiationState,
    link: Arc<dyn PeerLink>,
    candidates: CandidateBuffer,
    remote_applied: bool,
}

/// Offer/answer state machine for the (single) remote peer of a call.
///
/// Every handler runs to completion before the next event is looked at, so
/// description and candidate application on a link never overlap. After each
/// await the peer slot is looked up again; if the peer left or the engine was
/// closed meanwhile, the result is dropped.
pub struct NegotiationEngine {
    local_id: Option<PeerId>,
    peers: HashMap<PeerId, PeerSlot>,
    departed: HashSet<PeerId>,
    links: Arc<dyn LinkFactory>,
    signaling: Arc<dyn SignalingOutput>,
    transport_tx: mpsc::Sender<TransportEvent>,
    active: bool,
}

impl NegotiationEngine {
    pub fn new(
        links: Arc<dyn LinkFactory>,
        signaling: Arc<dyn SignalingOutput>,
        transport_tx: mpsc::Sender<TransportEvent>,
    ) -> Self {
        Self {
            local_id: None,
            peers: HashMap::new(),
            departed: HashSet::new(),
            links,
            signaling,
            transport_tx,
            active: true,
        }
    }

    pub fn set_local_id(&mut self, id: PeerId) {
        info!("Local identity is {}", id);
        self.local_id = Some(id);
    }

    pub fn local_id(&self) -> Option<&PeerId> {
        self.local_id.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn bound_peer(&self) -> Option<&PeerId> {
        self.peers.keys().next()
    }

    /// State for `peer`; peers we hold nothing for are `Idle`.
    pub fn state(&self, peer: &PeerId) -> NegotiationState {
        self.peers
            .get(peer)
            .map_or(NegotiationState::Idle, |slot| slot.state)
    }

    /// State for whichever peer is bound, `Idle` when none is.
    pub fn current_state(&self) -> NegotiationState {
        self.peers
            .values()
            .next()
            .map_or(NegotiationState::Idle, |slot| slot.state)
    }

    pub fn buffered_candidates(&self, peer: &PeerId) -> usize {
        self.peers.get(peer).map_or(0, |slot| slot.candidates.len())
    }

    /// The relay announced a newcomer: we are the existing participant, so we offer.
    pub async fn on_peer_joined(
        &mut self,
        peer: PeerId,
        tracks: &mut TrackController,
    ) -> CallResult<()> {
        if !self.active {
            return Ok(());
        }
        if self.departed.contains(&peer) {
            warn!("Ignoring join for departed {}", peer);
            return Ok(());
        }
        if let Some(bound) = self.bound_peer() {
            if *bound == peer {
                debug!("Duplicate join for {}", peer);
            } else {
                warn!("Ignoring {}: already in a call with {}", peer, bound);
            }
            return Ok(());
        }

        self.bind(peer.clone(), tracks).await?;
        self.start_offer(&peer).await
    }

    /// Send an offer to `peer`. Refused while another offer or answer is in flight.
    pub async fn start_offer(&mut self, peer: &PeerId) -> CallResult<()> {
        let (link, next) = {
            let slot = self.slot(peer)?;
            let next = match slot.state {
                NegotiationState::Idle => NegotiationState::OfferSent,
                NegotiationState::Stable => NegotiationState::Renegotiating,
                _ => {
                    return Err(CallError::NegotiationProtocol(format!(
                        "offer already in flight with {} ({})",
                        peer, slot.state
                    )));
                }
            };
            (slot.link.clone(), next)
        };

        let sdp = link
            .create_offer()
            .await
            .map_err(|e| CallError::Connectivity(format!("failed to create offer: {}", e)))?;
        if !self.still_bound(peer) {
            debug!("Offer for {} discarded: peer gone", peer);
            return Ok(());
        }

        self.signaling
            .send_signal(peer.clone(), SignalPayload::Sdp(SessionDescription::offer(sdp)))
            .await?;
        self.set_state(peer, next);
        Ok(())
    }

    /// Re-run offer/answer after a structural media change.
    ///
    /// Before the first negotiation there is nothing to do: the initial offer
    /// picks up the current tracks.
    pub async fn renegotiate(&mut self) -> CallResult<()> {
        let Some(peer) = self.bound_peer().cloned() else {
            return Ok(());
        };
        match self.state(&peer) {
            NegotiationState::Idle => Ok(()),
            _ => self.start_offer(&peer).await,
        }
    }

    /// Handle a payload relayed from `from`. Protocol anomalies are logged and
    /// swallowed; only call-fatal errors come back.
    pub async fn on_signal(
        &mut self,
        from: PeerId,
        payload: SignalPayload,
        tracks: &mut TrackController,
    ) -> CallResult<()> {
        match self.handle_signal(from, payload, tracks).await {
            Err(e) if !e.is_fatal() => {
                warn!("{}", e);
                Ok(())
            }
            other => other,
        }
    }

    async fn handle_signal(
        &mut self,
        from: PeerId,
        payload: SignalPayload,
        tracks: &mut TrackController,
    ) -> CallResult<()> {
        if !self.active {
            return Ok(());
        }
        // Relay identities are never reused.
        if self.departed.contains(&from) {
            return Err(CallError::NegotiationProtocol(format!(
                "signal from departed {}",
                from
            )));
        }
        match self.bound_peer().cloned() {
            Some(bound) if bound != from => {
                return Err(CallError::NegotiationProtocol(format!(
                    "signal from {} while bound to {}",
                    from, bound
                )));
            }
            Some(_) => {}
            None if is_answer(&payload) => {
                return Err(CallError::NegotiationProtocol(format!(
                    "answer from {} with no peer bound",
                    from
                )));
            }
            // The newer participant learns about the other side from its first message.
            None => self.bind(from.clone(), tracks).await?,
        }

        match payload {
            SignalPayload::Sdp(desc) => match desc.sdp_type {
                SdpType::Offer => self.on_remote_offer(&from, desc).await,
                SdpType::Answer => self.on_remote_answer(&from, desc).await,
            },
            SignalPayload::Candidate(candidate) => self.on_remote_candidate(&from, candidate).await,
        }
    }

    async fn on_remote_offer(&mut self, from: &PeerId, desc: SessionDescription) -> CallResult<()> {
        let (state, link) = {
            let slot = self.slot(from)?;
            (slot.state, slot.link.clone())
        };

        match state {
            NegotiationState::Idle | NegotiationState::Stable => self.accept_offer(from, desc).await,
            NegotiationState::OfferSent | NegotiationState::Renegotiating => {
                // Glare: the lower identity yields.
                let yields = self.local_id.as_ref().is_none_or(|me| me < from);
                if !yields {
                    debug!("Glare with {}: keeping our offer", from);
                    return Ok(());
                }

                info!("Glare with {}: rolling back our offer", from);
                link.rollback_local_offer().await.map_err(|e| {
                    CallError::NegotiationProtocol(format!("rollback failed: {}", e))
                })?;
                let rolled_back = if state == NegotiationState::OfferSent {
                    NegotiationState::Idle
                } else {
                    NegotiationState::Stable
                };
                self.set_state(from, rolled_back);
                self.accept_offer(from, desc).await
            }
            NegotiationState::AnswerPending => Err(CallError::NegotiationProtocol(format!(
                "offer from {} while an answer is pending",
                from
            ))),
        }
    }

    async fn accept_offer(&mut self, from: &PeerId, desc: SessionDescription) -> CallResult<()> {
        let link = self.slot(from)?.link.clone();

        link.set_remote_description(desc).await.map_err(|e| {
            CallError::NegotiationProtocol(format!("cannot apply offer from {}: {}", from, e))
        })?;
        if !self.still_bound(from) {
            return Ok(());
        }
        self.set_state(from, NegotiationState::AnswerPending);
        self.remote_applied(from).await;

        let sdp = link
            .create_answer()
            .await
            .map_err(|e| CallError::Connectivity(format!("failed to create answer: {}", e)))?;
        if !self.still_bound(from) {
            return Ok(());
        }

        self.signaling
            .send_signal(from.clone(), SignalPayload::Sdp(SessionDescription::answer(sdp)))
            .await?;
        self.set_state(from, NegotiationState::Stable);
        info!("Answered {}; negotiation stable", from);
        Ok(())
    }

    async fn on_remote_answer(
        &mut self,
        from: &PeerId,
        desc: SessionDescription,
    ) -> CallResult<()> {
        let (state, link) = {
            let slot = self.slot(from)?;
            (slot.state, slot.link.clone())
        };
        if !state.has_offer_in_flight() {
            return Err(CallError::NegotiationProtocol(format!(
                "answer from {} without a pending offer ({})",
                from, state
            )));
        }

        link.set_remote_description(desc).await.map_err(|e| {
            CallError::NegotiationProtocol(format!("cannot apply answer from {}: {}", from, e))
        })?;
        if !self.still_bound(from) {
            return Ok(());
        }
        self.remote_applied(from).await;
        self.set_state(from, NegotiationState::Stable);
        info!("Answer from {} applied; negotiation stable", from);
        Ok(())
    }

    async fn on_remote_candidate(&mut self, from: &PeerId, candidate: IceCandidate) -> CallResult<()> {
        let slot = self
            .peers
            .get_mut(from)
            .ok_or_else(|| CallError::NegotiationProtocol(format!("no state for {}", from)))?;

        let candidate = if slot.remote_applied {
            candidate
        } else {
            match slot.candidates.push(candidate) {
                Ok(()) => {
                    debug!("Buffered candidate from {} ({} queued)", from, slot.candidates.len());
                    return Ok(());
                }
                Err(candidate) => candidate,
            }
        };

        let link = slot.link.clone();
        link.add_ice_candidate(candidate).await.map_err(|e| {
            CallError::NegotiationProtocol(format!("cannot apply candidate from {}: {}", from, e))
        })
    }

    /// Mark the remote description as applied and flush buffered candidates.
    async fn remote_applied(&mut self, peer: &PeerId) {
        let Some(slot) = self.peers.get_mut(peer) else {
            return;
        };
        slot.remote_applied = true;
        let link = slot.link.clone();
        let queued = slot.candidates.drain();
        if queued.is_empty() {
            return;
        }

        debug!("Applying {} buffered candidate(s) from {}", queued.len(), peer);
        for candidate in queued {
            if let Err(e) = link.add_ice_candidate(candidate).await {
                warn!("Buffered candidate from {} rejected: {:?}", peer, e);
            }
        }
    }

    /// The relay says `peer` is gone: forget everything about it.
    pub async fn on_peer_left(&mut self, peer: &PeerId, tracks: &mut TrackController) {
        self.departed.insert(peer.clone());
        let Some(slot) = self.peers.remove(peer) else {
            debug!("PeerLeft for unknown {}", peer);
            return;
        };
        tracks.detach();
        if let Err(e) = slot.link.close().await {
            warn!("Failed to close link to {}: {:?}", peer, e);
        }
        info!("{} left; negotiation reset", peer);
    }

    /// A local candidate was gathered; forward it if it belongs to the bound peer.
    pub async fn on_local_candidate(&self, peer: &PeerId, candidate: IceCandidate) -> CallResult<()> {
        if !self.active || !self.peers.contains_key(peer) {
            debug!("Dropping local candidate for unbound {}", peer);
            return Ok(());
        }
        self.signaling
            .send_signal(peer.clone(), SignalPayload::Candidate(candidate))
            .await
    }

    /// Connection state report from a link. A failed link ends the call.
    pub fn on_link_state(&self, peer: &PeerId, state: LinkState) -> CallResult<()> {
        if !self.active || !self.peers.contains_key(peer) {
            return Ok(());
        }
        match state {
            LinkState::Failed => Err(CallError::Connectivity(format!(
                "connection to {} failed",
                peer
            ))),
            _ => Ok(()),
        }
    }

    /// Close every link and stop reacting to events. Returns `false` when the
    /// engine was already closed.
    pub async fn close(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        for (peer, slot) in self.peers.drain() {
            if let Err(e) = slot.link.close().await {
                warn!("Failed to close link to {}: {:?}", peer, e);
            }
        }
        true
    }

    async fn bind(&mut self, peer: PeerId, tracks: &mut TrackController) -> CallResult<()> {
        let link = self
            .links
            .open(peer.clone(), self.transport_tx.clone())
            .await
            .map_err(|e| CallError::Connectivity(format!("cannot open connection: {}", e)))?;

        if let Err(e) = tracks.attach(link.clone()).await {
            let _ = link.close().await;
            return Err(CallError::Connectivity(format!(
                "cannot attach local tracks: {}",
                e
            )));
        }

        info!("Bound remote peer {}", peer);
        self.peers.insert(
            peer,
            PeerSlot {
                state: NegotiationState::Idle,
                link,
                candidates: CandidateBuffer::new(),
                remote_applied: false,
            },
        );
        Ok(())
    }

    fn slot(&self, peer: &PeerId) -> CallResult<&PeerSlot> {
        self.peers
            .get(peer)
            .ok_or_else(|| CallError::NegotiationProtocol(format!("no state for {}", peer)))
    }

    fn still_bound(&self, peer: &PeerId) -> bool {
        self.active && self.peers.contains_key(peer)
    }

    fn set_state(&mut self, peer: &PeerId, state: NegotiationState) {
        if let Some(slot) = self.peers.get_mut(peer) {
            debug!("{}: {} -> {}", peer, slot.state, state);
            slot.state = state;
        }
    }
}

fn is_answer(payload: &SignalPayload) -> bool {
    matches!(payload, SignalPayload::Sdp(desc) if desc.sdp_type == SdpType::Answer)
}
