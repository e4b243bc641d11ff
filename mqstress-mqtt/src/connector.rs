use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::tokio_rustls::rustls;
use rumqttc::{AsyncClient, MqttOptions, TlsConfiguration, Transport};

use mqstress_core::{BrokerError, Connector, Session, SessionOptions, TlsMaterial};

use crate::endpoint::Endpoint;
use crate::session::MqttSession;

// MQTT caps packets at 256 MiB; file payloads may be large.
const MAX_PACKET_SIZE: usize = 256 * 1024 * 1024;
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);
const REQUEST_CAPACITY: usize = 64;

/// Opens one rumqttc client and event loop per session.
#[derive(Debug, Clone, Default)]
pub struct MqttConnector;

impl MqttConnector {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn options(endpoint: &Endpoint, opts: &SessionOptions) -> Result<MqttOptions, BrokerError> {
        let mut mqtt = MqttOptions::new(opts.client_id.clone(), endpoint.host.clone(), endpoint.port);
        mqtt.set_keep_alive(opts.timeout.max(MIN_KEEP_ALIVE));
        mqtt.set_clean_session(true);
        mqtt.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);

        match (&opts.credentials, &endpoint.username) {
            (Some(creds), _) => {
                mqtt.set_credentials(creds.username.clone(), creds.password.clone());
            }
            (None, Some(user)) => {
                mqtt.set_credentials(user.clone(), endpoint.password.clone().unwrap_or_default());
            }
            (None, None) => {}
        }

        if endpoint.scheme.is_tls() {
            let material = opts.tls.as_deref().cloned().unwrap_or_default();
            let config = if opts.skip_tls_verification {
                insecure_tls_config(material)?
            } else {
                tls_config(material)?
            };
            mqtt.set_transport(Transport::tls_with_config(config));
        } else if opts.skip_tls_verification
            || opts.tls.as_deref().is_some_and(|t| !t.is_empty())
        {
            tracing::warn!(
                scheme = %endpoint.scheme,
                "TLS settings ignored for a plain-text broker URL"
            );
        }

        Ok(mqtt)
    }
}

fn tls_config(material: TlsMaterial) -> Result<TlsConfiguration, BrokerError> {
    let Some(ca) = material.ca else {
        return Err(BrokerError::InvalidUrl(
            "TLS broker URLs require a CA certificate".to_string(),
        ));
    };

    let client_auth = match (material.cert, material.key) {
        (Some(cert), Some(key)) => Some((cert.to_vec(), key.to_vec())),
        (None, None) => None,
        _ => {
            return Err(BrokerError::Connect(
                "client certificate and key must be given together".to_string(),
            ));
        }
    };

    Ok(TlsConfiguration::Simple {
        ca: ca.to_vec(),
        alpn: None,
        client_auth,
    })
}

/// Rustls client config that trusts any server certificate. A CA, if given,
/// is ignored; a client certificate is still presented.
fn insecure_tls_config(material: TlsMaterial) -> Result<TlsConfiguration, BrokerError> {
    let builder = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert));

    let config = match (material.cert, material.key) {
        (Some(cert), Some(key)) => {
            let certs = rustls_pemfile::certs(&mut &cert[..])
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| BrokerError::Connect(format!("invalid client certificate: {err}")))?;
            let key = rustls_pemfile::private_key(&mut &key[..])
                .map_err(|err| BrokerError::Connect(format!("invalid client key: {err}")))?
                .ok_or_else(|| BrokerError::Connect("no private key found".to_string()))?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|err| BrokerError::Connect(err.to_string()))?
        }
        (None, None) => builder.with_no_client_auth(),
        _ => {
            return Err(BrokerError::Connect(
                "client certificate and key must be given together".to_string(),
            ));
        }
    };

    Ok(TlsConfiguration::Rustls(Arc::new(config)))
}

#[derive(Debug)]
struct AcceptAnyServerCert;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[async_trait]
impl Connector for MqttConnector {
    async fn connect(&self, opts: &SessionOptions) -> Result<Box<dyn Session>, BrokerError> {
        let endpoint = Endpoint::parse(&opts.broker_url)?;
        let mqtt = Self::options(&endpoint, opts)?;

        tracing::debug!(
            client_id = %opts.client_id,
            host = %endpoint.host,
            port = endpoint.port,
            tls = endpoint.scheme.is_tls(),
            "connecting"
        );

        let (client, eventloop) = AsyncClient::new(mqtt, REQUEST_CAPACITY);
        let session =
            MqttSession::open(opts.client_id.clone(), client, eventloop, opts.timeout).await?;
        Ok(Box::new(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn session_options(url: &str, tls: Option<TlsMaterial>) -> SessionOptions {
        SessionOptions {
            client_id: "mqstress-test".to_string(),
            broker_url: Arc::from(url),
            credentials: None,
            tls: tls.map(Arc::new),
            skip_tls_verification: false,
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn tls_urls_require_a_ca() -> anyhow::Result<()> {
        let opts = session_options("mqtts://broker", None);
        let endpoint = Endpoint::parse(&opts.broker_url)?;
        assert!(matches!(
            MqttConnector::options(&endpoint, &opts),
            Err(BrokerError::InvalidUrl(_))
        ));
        Ok(())
    }

    #[test]
    fn skipping_verification_needs_no_ca() -> anyhow::Result<()> {
        let mut opts = session_options("mqtts://broker", None);
        opts.skip_tls_verification = true;
        let endpoint = Endpoint::parse(&opts.broker_url)?;
        MqttConnector::options(&endpoint, &opts)?;

        let Ok(TlsConfiguration::Rustls(_)) = insecure_tls_config(TlsMaterial::default()) else {
            panic!("expected a rustls config");
        };
        Ok(())
    }

    #[test]
    fn insecure_config_checks_the_client_pair() {
        let cert_only = TlsMaterial {
            ca: None,
            cert: Some(Bytes::from_static(b"cert")),
            key: None,
        };
        assert!(insecure_tls_config(cert_only).is_err());

        let garbage = TlsMaterial {
            ca: None,
            cert: Some(Bytes::from_static(b"not pem")),
            key: Some(Bytes::from_static(b"not pem")),
        };
        assert!(matches!(
            insecure_tls_config(garbage),
            Err(BrokerError::Connect(_))
        ));
    }

    #[test]
    fn cert_without_key_is_rejected() {
        let material = TlsMaterial {
            ca: Some(Bytes::from_static(b"ca")),
            cert: Some(Bytes::from_static(b"cert")),
            key: None,
        };
        assert!(tls_config(material).is_err());
    }

    #[test]
    fn keep_alive_has_a_floor() -> anyhow::Result<()> {
        let opts = session_options("tcp://broker", None);
        let endpoint = Endpoint::parse(&opts.broker_url)?;
        let mqtt = MqttConnector::options(&endpoint, &opts)?;
        assert_eq!(mqtt.keep_alive(), MIN_KEEP_ALIVE);
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_broker_fails_within_the_timeout() {
        // TEST-NET-1 is never routed.
        let mut opts = session_options("tcp://192.0.2.1:1883", None);
        opts.timeout = Duration::from_millis(300);

        let started = std::time::Instant::now();
        let res = MqttConnector::new().connect(&opts).await;
        assert!(res.is_err());
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
