//! HTTPS listener that publishes each connection's client certificates to
//! the admission pipeline.

use std::path::Path;
use std::sync::Arc;

use admission_context::TlsConnectionInfo;
use anyhow::Context;
use axum::{Extension, Router};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use rustls::RootCertStore;
use rustls::server::danger::ClientCertVerifier;
use rustls::server::{ServerConfig, WebPkiClientVerifier};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::{ClientAuth, TlsConfig};

fn load_certs(path: &Path) -> anyhow::Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_file_iter(path)
        .and_then(|iter| iter.collect::<Result<Vec<_>, _>>())
        .with_context(|| format!("failed to read certificates from {}", path.display()))?;
    anyhow::ensure!(!certs.is_empty(), "no certificates in {}", path.display());
    Ok(certs)
}

fn client_verifier(tls: &TlsConfig) -> anyhow::Result<Arc<dyn ClientCertVerifier>> {
    let ca_path = tls
        .client_ca_path
        .as_deref()
        .context("client_ca_path is required when client_auth is enabled")?;
    let mut roots = RootCertStore::empty();
    for cert in load_certs(ca_path)? {
        roots.add(cert).context("invalid client CA certificate")?;
    }

    let builder = WebPkiClientVerifier::builder(Arc::new(roots));
    let builder = if tls.client_auth == ClientAuth::Optional {
        builder.allow_unauthenticated()
    } else {
        builder
    };
    builder
        .build()
        .context("failed to build client certificate verifier")
}

/// Builds the rustls server configuration for the configured client
/// authentication mode.
///
/// # Errors
/// Returns an error if a PEM file cannot be read or the certificate, key or
/// client CA set is rejected by rustls.
pub fn server_config(tls: &TlsConfig) -> anyhow::Result<Arc<ServerConfig>> {
    let chain = load_certs(&tls.cert_path)?;
    let key = PrivateKeyDer::from_pem_file(&tls.key_path)
        .with_context(|| format!("failed to read private key {}", tls.key_path.display()))?;

    let builder = ServerConfig::builder();
    let builder = match tls.client_auth {
        ClientAuth::None => builder.with_no_client_auth(),
        ClientAuth::Optional | ClientAuth::Require => {
            builder.with_client_cert_verifier(client_verifier(tls)?)
        }
    };
    let mut config = builder
        .with_single_cert(chain, key)
        .context("invalid server certificate or key")?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

/// Certificates the peer presented on a completed handshake. Chains are
/// only reported as verified when a client verifier was installed.
#[must_use]
pub fn connection_info(
    peer: Option<&[CertificateDer<'static>]>,
    client_auth: ClientAuth,
) -> TlsConnectionInfo {
    let chain = peer.unwrap_or_default().to_vec();
    match client_auth {
        ClientAuth::None => TlsConnectionInfo::unverified(chain),
        ClientAuth::Optional | ClientAuth::Require => TlsConnectionInfo::verified(chain),
    }
}

/// Accepts TLS connections until `shutdown` fires, then shuts open
/// connections down gracefully and returns once all of them have closed.
/// Accept and handshake failures are logged per connection.
pub async fn serve(
    listener: TcpListener,
    tls: Arc<ServerConfig>,
    client_auth: ClientAuth,
    router: Router,
    shutdown: CancellationToken,
) {
    let acceptor = TlsAcceptor::from(tls);
    let connections = TaskTracker::new();

    loop {
        let (stream, peer) = tokio::select! {
            () = shutdown.cancelled() => {
                tracing::info!(
                    open_connections = connections.len(),
                    "HTTPS server shutting down gracefully (cancellation)"
                );
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to accept connection");
                    continue;
                }
            },
        };

        let acceptor = acceptor.clone();
        let router = router.clone();
        let shutdown = shutdown.clone();
        connections.spawn(async move {
            let handshake = tokio::select! {
                res = acceptor.accept(stream) => res,
                () = shutdown.cancelled() => return,
            };
            let stream = match handshake {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::debug!(%peer, error = %e, "TLS handshake failed");
                    return;
                }
            };
            let info = connection_info(stream.get_ref().1.peer_certificates(), client_auth);
            tracing::debug!(
                %peer,
                verified_chains = info.verified_chains().len(),
                "TLS connection established"
            );

            let service = TowerToHyperService::new(router.layer(Extension(info)));
            let builder = Builder::new(TokioExecutor::new());
            let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
            tokio::pin!(conn);

            let result = tokio::select! {
                res = conn.as_mut() => res,
                () = shutdown.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    conn.as_mut().await
                }
            };
            if let Err(e) = result {
                tracing::debug!(%peer, error = %e, "connection closed with error");
            }
        });
    }

    connections.close();
    connections.wait().await;
    tracing::info!("HTTPS server stopped");
}
