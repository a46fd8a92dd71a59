//! 🔒 Auth: who are we, and can we prove it?
//!
//! Three modes, mutually exclusive:
//! - `None`: anonymous. Works on your laptop. Works nowhere else.
//! - `Basic`: `user:pass` in an `Authorization` header. Classic. Like a padlock on a gym locker.
//! - `Signed`: an external [`RequestSigner`] (AWS SigV4 and friends) looks at the fully built
//!   request and stamps it. We never see the algorithm. We just hand over the request.
//!
//! ⚠️ Signed + basic both configured? Signer wins, basic is dropped, a warning is logged.
//! Not an error. A signed request with a stray basic header would be rejected anyway,
//! so we pick the one that can actually work and tell you about it.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::warn;

use crate::error::BulkError;

/// ✍️ A request-signing capability. Gets the final request (URL, headers, body) and
/// may add or rewrite headers. Called once per attempt, after the dispatcher admits it,
/// so time spent queued or between retries never ages a signature.
#[async_trait]
pub trait RequestSigner: fmt::Debug + Send + Sync {
    async fn sign(&self, request: &mut reqwest::Request) -> Result<()>;
}

/// 🔒 Resolved auth mode for a client.
#[derive(Clone, Default)]
pub enum Auth {
    #[default]
    None,
    Basic {
        username: String,
        password: String,
    },
    Signed(Arc<dyn RequestSigner>),
}

// -- 🙈 hand-rolled Debug so passwords never end up in a log line
impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::None => f.write_str("None"),
            Auth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Auth::Signed(signer) => f.debug_tuple("Signed").field(signer).finish(),
        }
    }
}

impl Auth {
    /// 🔧 Pick the auth mode from the optional signer and optional `basic_auth` string.
    ///
    /// When a signer is present, `basic_auth` is ignored without being validated.
    pub fn resolve(signer: Option<Arc<dyn RequestSigner>>, basic_auth: Option<&str>) -> Result<Self> {
        match (signer, basic_auth) {
            (Some(signer), Some(_)) => {
                warn!("⚠️ A client cannot have both signed and basic auth. Signer wins, basic auth is disabled.");
                Ok(Auth::Signed(signer))
            }
            (Some(signer), None) => Ok(Auth::Signed(signer)),
            (None, Some(raw)) => {
                let (username, password) = parse_basic_auth(raw)?;
                Ok(Auth::Basic { username, password })
            }
            (None, None) => Ok(Auth::None),
        }
    }

    /// 📎 Attach whatever belongs on the request builder (basic credentials only).
    pub(crate) fn decorate(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Auth::Basic { username, password } => builder.basic_auth(username, Some(password)),
            Auth::None | Auth::Signed(_) => builder,
        }
    }

    /// ✍️ Run the signer over the finished request, if this is the signed mode.
    pub(crate) async fn sign(&self, request: &mut reqwest::Request) -> Result<()> {
        if let Auth::Signed(signer) = self {
            signer
                .sign(request)
                .await
                .context("💀 The request signer declined to sign. No signature, no entry.")?;
        }
        Ok(())
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Auth::Signed(_))
    }
}

/// 🔑 Split `user:password` at the first colon. Passwords may contain colons; usernames may not.
pub fn parse_basic_auth(raw: &str) -> Result<(String, String)> {
    let invalid = |reason: &str| BulkError::InvalidConfig {
        key: "basic_auth",
        reason: format!("expected 'user:password', {}", reason),
    };
    let (username, password) = raw
        .split_once(':')
        .ok_or_else(|| invalid("but there is no ':' in it"))?;
    if username.is_empty() {
        return Err(invalid("but the user part is empty").into());
    }
    Ok((username.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct StampSigner;

    #[async_trait]
    impl RequestSigner for StampSigner {
        async fn sign(&self, request: &mut reqwest::Request) -> Result<()> {
            request
                .headers_mut()
                .insert("x-stamp", reqwest::header::HeaderValue::from_static("signed"));
            Ok(())
        }
    }

    #[test]
    fn the_one_where_basic_auth_splits_on_the_first_colon() -> Result<()> {
        assert_eq!(
            parse_basic_auth("elastic:s3cr:et")?,
            ("elastic".to_string(), "s3cr:et".to_string())
        );
        assert_eq!(parse_basic_auth("elastic:")?, ("elastic".to_string(), String::new()));
        Ok(())
    }

    #[test]
    fn the_one_where_malformed_basic_auth_is_a_config_error() {
        for broken in ["elastic", ":password", ""] {
            let err = parse_basic_auth(broken).expect_err("should not parse");
            assert!(matches!(
                BulkError::find(&err),
                Some(BulkError::InvalidConfig { key: "basic_auth", .. })
            ));
        }
    }

    #[test]
    fn the_one_where_the_signer_wins_the_custody_battle() -> Result<()> {
        // -- 🔒 basic is malformed on purpose: it is dropped, not validated
        let signer: Arc<dyn RequestSigner> = Arc::new(StampSigner);
        let auth = Auth::resolve(Some(signer), Some("no-colon-here"))?;
        assert!(auth.is_signed());
        Ok(())
    }

    #[test]
    fn the_one_where_debug_never_leaks_the_password() -> Result<()> {
        let auth = Auth::resolve(None, Some("elastic:hunter2"))?;
        let printed = format!("{:?}", auth);
        assert!(printed.contains("elastic"));
        assert!(!printed.contains("hunter2"));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_signing_touches_the_request() -> Result<()> {
        let auth = Auth::Signed(Arc::new(StampSigner));
        let client = reqwest::Client::new();
        let mut request = client.post("http://localhost:9200/_bulk").build()?;
        auth.sign(&mut request).await?;
        assert_eq!(
            request.headers().get("x-stamp").and_then(|v| v.to_str().ok()),
            Some("signed")
        );
        Ok(())
    }
}
