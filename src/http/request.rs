//! Inbound request classification.

use axum::http::{header, Request};

/// `Connection` lists the `upgrade` token and an `Upgrade` protocol is named.
pub fn is_upgrade_request<B>(request: &Request<B>) -> bool {
    let headers = request.headers();
    if !headers.contains_key(header::UPGRADE) {
        return false;
    }
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(connection: Option<&str>, upgrade: Option<&str>) -> Request<()> {
        let mut builder = Request::builder().uri("/bare/");
        if let Some(connection) = connection {
            builder = builder.header(header::CONNECTION, connection);
        }
        if let Some(upgrade) = upgrade {
            builder = builder.header(header::UPGRADE, upgrade);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn detects_upgrade_tokens() {
        assert!(is_upgrade_request(&request(Some("Upgrade"), Some("websocket"))));
        assert!(is_upgrade_request(&request(Some("keep-alive, upgrade"), Some("websocket"))));
    }

    #[test]
    fn plain_requests_are_not_upgrades() {
        assert!(!is_upgrade_request(&request(None, None)));
        assert!(!is_upgrade_request(&request(Some("keep-alive"), Some("websocket"))));
        assert!(!is_upgrade_request(&request(Some("upgrade"), None)));
    }
}
