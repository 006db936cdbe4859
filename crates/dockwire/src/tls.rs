use std::sync::Arc;
use std::sync::OnceLock;

use dockwire_http::TlsContext;

static DEFAULT_CONTEXT: OnceLock<TlsContext> = OnceLock::new();

/// Client TLS configuration trusting the bundled web PKI roots.
///
/// Built once per process and shared by every connection.
pub fn default_tls_context() -> TlsContext {
    Arc::clone(DEFAULT_CONTEXT.get_or_init(|| {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Arc::new(config)
    }))
}
