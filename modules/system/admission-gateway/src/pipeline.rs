//! Composition of the admission layers onto a router.

use axum::Router;

use crate::authorizer::AuthorizerLayer;
use crate::identifier::{TlsIdentifierLayer, TokenIdentifierLayer};

/// Builds the admission stack:
/// `TokenIdentifier -> TlsIdentifier -> Authorizer -> inner`.
///
/// The authorizer is always innermost so it sees every identity the
/// identifiers attached.
#[derive(Clone)]
pub struct AdmissionPipeline {
    authorizer: AuthorizerLayer,
    token_identifier: bool,
    tls_identifier: bool,
}

impl AdmissionPipeline {
    /// Pipeline with both identifiers enabled.
    #[must_use]
    pub fn new(authorizer: AuthorizerLayer) -> Self {
        Self {
            authorizer,
            token_identifier: true,
            tls_identifier: true,
        }
    }

    #[must_use]
    pub fn with_token_identifier(mut self, enabled: bool) -> Self {
        self.token_identifier = enabled;
        self
    }

    #[must_use]
    pub fn with_tls_identifier(mut self, enabled: bool) -> Self {
        self.tls_identifier = enabled;
        self
    }

    /// Wrap every route of `router`, fallback included.
    #[must_use]
    pub fn apply<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        // Layers added last run first.
        let mut router = router.layer(self.authorizer.clone());
        if self.tls_identifier {
            router = router.layer(TlsIdentifierLayer::new());
        }
        if self.token_identifier {
            router = router.layer(TokenIdentifierLayer::new());
        }
        tracing::debug!(
            token_identifier = self.token_identifier,
            tls_identifier = self.tls_identifier,
            "Admission pipeline applied"
        );
        router
    }
}
