use anyhow::Context as _;
use bytes::Bytes;
use std::path::Path;

use mqstress_core::TlsMaterial;

/// Validates and reads the TLS files given on the command line.
///
/// Returns `None` when no file was given.
pub(crate) async fn load(
    ca: Option<&Path>,
    cert: Option<&Path>,
    key: Option<&Path>,
) -> anyhow::Result<Option<TlsMaterial>> {
    if cert.is_some() != key.is_some() {
        anyhow::bail!("--cert and --key must be given together");
    }

    let material = TlsMaterial {
        ca: read_pem("--cafile", ca).await?,
        cert: read_pem("--cert", cert).await?,
        key: read_pem("--key", key).await?,
    };

    Ok((!material.is_empty()).then_some(material))
}

async fn read_pem(flag: &str, path: Option<&Path>) -> anyhow::Result<Option<Bytes>> {
    let Some(path) = path else {
        return Ok(None);
    };

    let meta = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("{flag}: cannot access {}", path.display()))?;
    if !meta.is_file() {
        anyhow::bail!("{flag}: {} is not a file", path.display());
    }

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("{flag}: failed to read {}", path.display()))?;
    Ok(Some(Bytes::from(bytes)))
}
