//! # Proof Session
//!
//! One identification exchange over a [`Channel`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     SESSION STATE MACHINE                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   AwaitingSelector ──(bad selector)──► ERROR frame ──► Closed           │
//! │          │                                                              │
//! │          │ "1" / "2" / "3"                                              │
//! │          ▼                                                              │
//! │   Authenticating                                                        │
//! │     public key ─► { commitment ─► challenge ─► response } × rounds      │
//! │          │                                                              │
//! │          ├── every round verified and key admitted                     │
//! │          │        AUTH_SUCCESS ──► Authenticated                        │
//! │          │                                                              │
//! │          └── otherwise  AUTH_FAILED ──► Closed                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All rounds always run before the single terminal signal, so a prover
//! never learns which round failed.

use rand::RngCore;
use tokio::io::{AsyncRead, AsyncWrite};

use super::codec::{unexpected, Channel};
use super::frame::Frame;
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::scheme::{
    AttemptState, AuthOutcome, Committed, Commitment, IdentificationScheme, KeyPair, PublicKey,
    Response, Scheme, SchemeKind,
};

/// Where a verifier session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the `1`/`2`/`3` selector
    AwaitingSelector,
    /// Running identification rounds
    Authenticating,
    /// `AUTH_SUCCESS` sent; file transfer may follow
    Authenticated,
    /// Terminal: rejected, protocol error or transport failure
    Closed,
}

/// Verifier end of an identification exchange.
#[derive(Debug)]
pub struct ProofSession<S> {
    channel: Channel<S>,
    config: SessionConfig,
    state: SessionState,
    scheme: Option<Scheme>,
    peer_key: Option<PublicKey>,
}

impl<S> ProofSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Start a session in [`SessionState::AwaitingSelector`].
    pub fn new(channel: Channel<S>, config: SessionConfig) -> Self {
        Self {
            channel,
            config,
            state: SessionState::AwaitingSelector,
            scheme: None,
            peer_key: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Scheme chosen by the prover, once the selector has been read.
    pub fn scheme_kind(&self) -> Option<SchemeKind> {
        self.scheme.as_ref().map(|s| s.kind())
    }

    /// Public key the prover announced.
    pub fn peer_key(&self) -> Option<&PublicKey> {
        self.peer_key.as_ref()
    }

    /// Hand the channel on, e.g. to the file receiver.
    pub fn into_channel(self) -> Channel<S> {
        self.channel
    }

    /// Run the whole exchange.
    ///
    /// A failed proof is `Ok(AuthOutcome::Rejected)`. Protocol and transport
    /// failures are errors; the peer gets an `ERROR:` frame first whenever
    /// the transport still accepts writes.
    pub async fn authenticate<R: RngCore>(&mut self, rng: &mut R) -> Result<AuthOutcome> {
        match self.run(rng).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.state = SessionState::Closed;
                if err.transport_writable() && !matches!(err, Error::PeerError(_)) {
                    // Best effort; the original error is what matters
                    let _ = self.channel.send_frame(&Frame::error(&err)).await;
                }
                Err(err)
            }
        }
    }

    async fn run<R: RngCore>(&mut self, rng: &mut R) -> Result<AuthOutcome> {
        // With no rounds the key alone would be accepted
        if self.config.rounds == 0 {
            return Err(Error::Config("rounds must be at least 1".into()));
        }
        let selector = self.channel.recv_text().await?;
        let kind = SchemeKind::from_selector(&selector)?;
        let scheme = Scheme::for_kind(kind, &self.config.params)?;
        self.scheme = Some(scheme.clone());
        self.state = SessionState::Authenticating;
        tracing::info!(scheme = %kind, rounds = self.config.rounds, "scheme selected");

        let public = PublicKey(self.channel.recv_integer("public key").await?);
        let key_admitted = scheme.is_valid_public_key(&public)
            && self.config.params.pinned.admits(kind, &public);
        if !key_admitted {
            tracing::warn!(scheme = %kind, "announced public key not admitted");
        }
        self.peer_key = Some(public.clone());

        let mut all_accepted = true;
        for round in 1..=self.config.rounds {
            let commitment = Commitment(self.channel.recv_integer("commitment").await?);
            let challenged = Committed::new(commitment).challenge(&scheme, rng);
            self.channel
                .send_integer(challenged.challenge().value())
                .await?;
            tracing::trace!(round, state = ?challenged.state(), "challenge sent");
            let response = Response(self.channel.recv_integer("response").await?);
            let outcome = challenged.respond(response).verify(&scheme, &public);
            tracing::debug!(round, state = ?AttemptState::from(outcome), "round verified");
            all_accepted &= outcome.is_accepted();
        }

        let outcome = if key_admitted && all_accepted {
            AuthOutcome::Accepted
        } else {
            AuthOutcome::Rejected
        };
        match outcome {
            AuthOutcome::Accepted => {
                self.channel.send_frame(&Frame::AuthSuccess).await?;
                self.state = SessionState::Authenticated;
            }
            AuthOutcome::Rejected => {
                self.channel.send_frame(&Frame::AuthFailed).await?;
                self.state = SessionState::Closed;
            }
        }
        tracing::info!(scheme = %kind, ?outcome, "identification finished");
        Ok(outcome)
    }
}

/// Prover end of an identification exchange.
#[derive(Debug)]
pub struct ProverSession<S> {
    channel: Channel<S>,
    scheme: Scheme,
    keys: KeyPair,
    rounds: u32,
}

impl<S> ProverSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Prove knowledge of `keys.secret` under `scheme` for `rounds` rounds.
    ///
    /// `rounds` must match the verifier's configuration.
    pub fn new(channel: Channel<S>, scheme: Scheme, keys: KeyPair, rounds: u32) -> Self {
        Self {
            channel,
            scheme,
            keys,
            rounds,
        }
    }

    /// Hand the channel on, e.g. to the file sender.
    pub fn into_channel(self) -> Channel<S> {
        self.channel
    }

    /// Send the selector and public key, answer every round, and read the
    /// verifier's verdict.
    pub async fn authenticate<R: RngCore>(&mut self, rng: &mut R) -> Result<AuthOutcome> {
        if self.rounds == 0 {
            return Err(Error::Config("rounds must be at least 1".into()));
        }
        let kind = self.scheme.kind();
        self.channel
            .send_text(&kind.selector().to_string())
            .await?;
        self.channel.send_integer(&self.keys.public.0).await?;

        for round in 1..=self.rounds {
            let (witness, commitment) = self.scheme.commit(rng);
            self.channel.send_integer(&commitment.0).await?;
            let challenge = self
                .scheme
                .accept_challenge(self.channel.recv_integer("challenge").await?)?;
            tracing::debug!(round, challenge = %challenge.value(), "challenge received");
            let response = self.scheme.respond(witness, &self.keys.secret, challenge);
            self.channel.send_integer(&response.0).await?;
        }

        match self.channel.recv_frame().await? {
            Frame::AuthSuccess => Ok(AuthOutcome::Accepted),
            Frame::AuthFailed => Ok(AuthOutcome::Rejected),
            other => Err(unexpected("AUTH_SUCCESS or AUTH_FAILED", other)),
        }
    }
}
