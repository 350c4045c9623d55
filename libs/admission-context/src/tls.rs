//! Connection-level TLS facts published by the transport.

use rustls_pki_types::CertificateDer;

/// TLS state of the connection a request arrived on.
///
/// The transport inserts one value per connection into every request's
/// extensions. `verified_chains` only contains chains that passed client
/// certificate verification; each chain is leaf first.
#[derive(Debug, Clone, Default)]
pub struct TlsConnectionInfo {
    peer_certificates: Vec<CertificateDer<'static>>,
    verified_chains: Vec<Vec<CertificateDer<'static>>>,
}

impl TlsConnectionInfo {
    /// Peer presented certificates that the TLS layer verified.
    #[must_use]
    pub fn verified(chain: Vec<CertificateDer<'static>>) -> Self {
        if chain.is_empty() {
            return Self::default();
        }
        Self {
            peer_certificates: chain.clone(),
            verified_chains: vec![chain],
        }
    }

    /// Several verified chains, as when the client's leaf chains to more than
    /// one trusted root. Empty chains are dropped; the first remaining chain
    /// is what the peer presented.
    #[must_use]
    pub fn from_chains(chains: Vec<Vec<CertificateDer<'static>>>) -> Self {
        let verified_chains: Vec<_> = chains.into_iter().filter(|c| !c.is_empty()).collect();
        Self {
            peer_certificates: verified_chains.first().cloned().unwrap_or_default(),
            verified_chains,
        }
    }

    /// Peer presented certificates without verification (request-only mode).
    #[must_use]
    pub fn unverified(peer_certificates: Vec<CertificateDer<'static>>) -> Self {
        Self {
            peer_certificates,
            verified_chains: Vec::new(),
        }
    }

    #[must_use]
    pub fn peer_certificates(&self) -> &[CertificateDer<'static>] {
        &self.peer_certificates
    }

    #[must_use]
    pub fn verified_chains(&self) -> &[Vec<CertificateDer<'static>>] {
        &self.verified_chains
    }

    /// Leaf of every verified chain, in chain order.
    pub fn verified_leaves(&self) -> impl Iterator<Item = &CertificateDer<'static>> {
        self.verified_chains.iter().filter_map(|chain| chain.first())
    }
}
