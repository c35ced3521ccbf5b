use anyhow::{Context as AnyhowContext, Result};
use std::net::SocketAddr;

pub(crate) const AUTH_TOKEN_ENV: &str = "REELQA_AUTH_TOKEN";

#[derive(Clone, Debug)]
pub(crate) struct AuthToken {
    token: String,
}

impl AuthToken {
    pub(crate) fn parse(raw: Option<&str>) -> Result<Option<Self>> {
        match raw.map(str::trim) {
            None => Ok(None),
            Some("") => anyhow::bail!("auth token must be non-empty"),
            Some(token) => Ok(Some(Self {
                token: token.to_string(),
            })),
        }
    }

    /// `Authorization: Bearer <token>`; the scheme is case-insensitive.
    pub(crate) fn matches_http_authorization_header(&self, header_value: &str) -> bool {
        header_value
            .trim()
            .split_once(' ')
            .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
            .is_some_and(|(_, presented)| constant_time_eq(presented.trim(), &self.token))
    }
}

/// Where `serve-http` listens and which token guards it.
#[derive(Debug)]
pub(crate) struct ServePlan {
    pub(crate) addrs: Vec<SocketAddr>,
    pub(crate) auth_token: Option<AuthToken>,
}

/// Resolve `bind`, pick the token (`--auth-token`, else `$REELQA_AUTH_TOKEN`) and
/// check the exposure rules.
pub(crate) async fn plan_serve(
    bind: &str,
    public: bool,
    auth_flag: Option<&str>,
) -> Result<ServePlan> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host(bind)
        .await
        .with_context(|| format!("Failed to resolve bind address: {bind}"))?
        .collect();
    let from_env = std::env::var(AUTH_TOKEN_ENV).ok();
    let auth_token = AuthToken::parse(auth_flag.or(from_env.as_deref()))?;
    check_exposure(bind, &addrs, public, auth_token.as_ref())?;
    Ok(ServePlan { addrs, auth_token })
}

/// Loopback only unless `--public`, and `--public` only behind a token.
fn check_exposure(
    bind: &str,
    addrs: &[SocketAddr],
    public: bool,
    auth_token: Option<&AuthToken>,
) -> Result<()> {
    if addrs.is_empty() {
        anyhow::bail!("Bind address resolved to zero socket addrs: {bind}")
    }
    if !public && addrs.iter().any(|addr| !addr.ip().is_loopback()) {
        anyhow::bail!(
            "Refusing to bind to non-loopback address without --public: {bind}. To expose the QA API, pass --public and set {AUTH_TOKEN_ENV} (or --auth-token)."
        )
    }
    if public && auth_token.is_none() {
        anyhow::bail!(
            "--public requires an auth token: set --auth-token or export {AUTH_TOKEN_ENV}"
        )
    }
    Ok(())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .bytes()
            .zip(b.bytes())
            .fold(0_u8, |diff, (x, y)| diff | (x ^ y))
            == 0
}
