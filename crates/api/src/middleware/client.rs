//! Client metadata extractor.

use std::convert::Infallible;
use std::net::SocketAddr;

use alem_core::identity::ClientInfo;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;

/// Longest user agent string kept on a session row.
const MAX_USER_AGENT_LEN: usize = 512;

/// User agent and client IP of the request, recorded on sessions for audit.
///
/// The IP is the first hop of `X-Forwarded-For` when present, otherwise the
/// peer address (only available when the server was started with connect
/// info). Never used for authorization.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta(pub ClientInfo);

impl<S: Send + Sync> FromRequestParts<S> for ClientMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|ua| ua.chars().take(MAX_USER_AGENT_LEN).collect::<String>())
            .filter(|ua| !ua.is_empty());

        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string);

        let ip = forwarded.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

        Ok(ClientMeta(ClientInfo { user_agent, ip }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> ClientInfo {
        let (mut parts, _) = request.into_parts();
        let ClientMeta(info) = ClientMeta::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        info
    }

    #[tokio::test]
    async fn forwarded_first_hop_wins_over_peer() {
        let mut request = Request::builder()
            .header(USER_AGENT, "alem-mobile/1.0")
            .header("x-forwarded-for", "198.51.100.4, 10.0.0.1")
            .body(())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 9], 4000))));

        let info = extract(request).await;
        assert_eq!(info.user_agent.as_deref(), Some("alem-mobile/1.0"));
        assert_eq!(info.ip.as_deref(), Some("198.51.100.4"));
    }

    #[tokio::test]
    async fn peer_address_is_the_fallback() {
        let mut request = Request::builder().body(()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4000))));

        let info = extract(request).await;
        assert_eq!(info.user_agent, None);
        assert_eq!(info.ip.as_deref(), Some("192.0.2.1"));
    }

    #[tokio::test]
    async fn missing_metadata_is_tolerated() {
        let info = extract(Request::builder().body(()).unwrap()).await;
        assert!(info.user_agent.is_none());
        assert!(info.ip.is_none());
    }
}
