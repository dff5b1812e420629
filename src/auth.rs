use std::{
    fmt,
    fs::File,
    io::{ErrorKind, Read},
    path::PathBuf,
};

use async_trait::async_trait;
use fs2::FileExt;
use tracing::warn;

/// Short-lived credential attached to a single outbound request.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

/// Supplies credentials issued by the identity provider.
///
/// Implementations must hand out a fresh token on every call; callers never
/// hold on to one across requests.
#[async_trait]
pub trait AuthTokenSource: Send + Sync {
    /// `None` means no credential is available (signed out).
    async fn fresh_token(&self) -> Option<BearerToken>;
}

/// Reads the token file the identity provider helper keeps up to date.
pub struct FileTokenSource {
    path: PathBuf,
}

impl FileTokenSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_token(&self) -> std::io::Result<Option<String>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        // The helper rewrites the file in place, hold a shared lock while reading
        FileExt::lock_shared(&file)?;
        let mut content = String::new();
        let read = file.read_to_string(&mut content);
        FileExt::unlock(&file)?;
        read?;

        let token = content.trim();
        if token.is_empty() {
            Ok(None)
        } else {
            Ok(Some(token.to_string()))
        }
    }
}

#[async_trait]
impl AuthTokenSource for FileTokenSource {
    async fn fresh_token(&self) -> Option<BearerToken> {
        match self.read_token() {
            Ok(token) => token.map(BearerToken::new),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read token file");
                None
            }
        }
    }
}

/// Reads the token from an environment variable at every call.
pub struct EnvTokenSource {
    var: String,
}

impl EnvTokenSource {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl AuthTokenSource for EnvTokenSource {
    async fn fresh_token(&self) -> Option<BearerToken> {
        std::env::var(&self.var)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(BearerToken::new)
    }
}
