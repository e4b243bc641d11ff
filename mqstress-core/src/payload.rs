use bytes::Bytes;
use std::path::Path;

/// Produces the body of message `index` for a worker.
///
/// Every variant is deterministic: the same index always yields the same bytes.
#[derive(Debug, Clone, Default)]
pub enum PayloadGenerator {
    /// `this is msg #<index>!`
    #[default]
    Indexed,
    Constant(Bytes),
    /// Contents of a file, read once up front.
    File(Bytes),
}

impl PayloadGenerator {
    pub fn constant(payload: impl Into<String>) -> Self {
        Self::Constant(Bytes::from(payload.into()))
    }

    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read(path)?;
        Ok(Self::File(Bytes::from(content)))
    }

    /// Maps the `--constant-payload` convention: empty uses the indexed text,
    /// `@path` loads a file, anything else is sent verbatim.
    pub fn from_arg(arg: &str) -> std::io::Result<Self> {
        if arg.is_empty() {
            return Ok(Self::Indexed);
        }

        match arg.strip_prefix('@') {
            Some(path) => Self::from_file(Path::new(path)),
            None => Ok(Self::constant(arg)),
        }
    }

    #[must_use]
    pub fn generate(&self, index: u64) -> Bytes {
        match self {
            Self::Indexed => Bytes::from(format!("this is msg #{index}!")),
            // `Bytes` clones share the allocation.
            Self::Constant(b) | Self::File(b) => b.clone(),
        }
    }
}
