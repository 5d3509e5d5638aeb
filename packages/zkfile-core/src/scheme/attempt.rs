//! Verifier-side view of a single identification round.
//!
//! Each step consumes the previous one, so a challenge cannot be issued
//! twice for one commitment and a response cannot be checked before a
//! challenge exists.

use rand::RngCore;

use super::{AuthOutcome, Challenge, Commitment, IdentificationScheme, PublicKey, Response};

/// Coarse label for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    /// Commitment received
    Committed,
    /// Challenge sent
    Challenged,
    /// Response received
    Responded,
    /// Transcript verified
    Accepted,
    /// Transcript failed verification
    Rejected,
}

/// Commitment received, no challenge issued yet.
#[derive(Debug)]
pub struct Committed {
    commitment: Commitment,
}

impl Committed {
    /// Start an attempt from the prover's commitment.
    pub fn new(commitment: Commitment) -> Self {
        Self { commitment }
    }

    /// Draw the challenge for this commitment.
    pub fn challenge<S: IdentificationScheme + ?Sized>(
        self,
        scheme: &S,
        rng: &mut dyn RngCore,
    ) -> Challenged {
        Challenged {
            commitment: self.commitment,
            challenge: scheme.draw_challenge(rng),
        }
    }

    /// Current label.
    pub fn state(&self) -> AttemptState {
        AttemptState::Committed
    }
}

/// Challenge issued, waiting for the response.
#[derive(Debug)]
pub struct Challenged {
    commitment: Commitment,
    challenge: Challenge,
}

impl Challenged {
    /// The challenge to send to the prover.
    pub fn challenge(&self) -> &Challenge {
        &self.challenge
    }

    /// Record the prover's answer. Consumes the challenge.
    pub fn respond(self, response: Response) -> Responded {
        Responded {
            commitment: self.commitment,
            challenge: self.challenge,
            response,
        }
    }

    /// Current label.
    pub fn state(&self) -> AttemptState {
        AttemptState::Challenged
    }
}

/// Full transcript, ready to be checked.
#[derive(Debug)]
pub struct Responded {
    commitment: Commitment,
    challenge: Challenge,
    response: Response,
}

impl Responded {
    /// Check the transcript against `public`.
    pub fn verify<S: IdentificationScheme + ?Sized>(
        self,
        scheme: &S,
        public: &PublicKey,
    ) -> AuthOutcome {
        if scheme.verify(&self.commitment, &self.challenge, &self.response, public) {
            AuthOutcome::Accepted
        } else {
            AuthOutcome::Rejected
        }
    }

    /// Current label.
    pub fn state(&self) -> AttemptState {
        AttemptState::Responded
    }
}

impl From<AuthOutcome> for AttemptState {
    fn from(outcome: AuthOutcome) -> Self {
        match outcome {
            AuthOutcome::Accepted => AttemptState::Accepted,
            AuthOutcome::Rejected => AttemptState::Rejected,
        }
    }
}
