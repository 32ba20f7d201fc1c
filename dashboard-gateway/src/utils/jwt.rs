use anyhow::Result;
use base64::{Engine as _, engine::general_purpose};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct IdTokenClaims {
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Decode identity-assertion claims without validation
///
/// The gateway never trusts these claims for authorization; the property
/// backend verifies the assertion on every call. The only thing read here is
/// the expiry claim, to know when a silent refresh is due.
pub fn decode_id_token_claims(token: &str) -> Result<IdTokenClaims> {
    let parts: Vec<&str> = token.split('.').collect();

    if parts.len() != 3 {
        return Err(anyhow::anyhow!("Invalid JWT format"));
    }

    // Decode the payload (second part)
    let payload = general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|e| anyhow::anyhow!("Failed to decode JWT payload: {}", e))?;

    let claims: IdTokenClaims = serde_json::from_slice(&payload)
        .map_err(|e| anyhow::anyhow!("Failed to parse JWT claims: {}", e))?;

    Ok(claims)
}

/// Expiry claim in epoch milliseconds. The `exp` claim is in seconds.
pub fn expiry_ms(token: &str) -> Result<i64> {
    Ok(decode_id_token_claims(token)?.exp * 1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine as _, engine::general_purpose};

    fn make_token(payload: &str) -> String {
        let header = general_purpose::URL_SAFE_NO_PAD.encode(b"{\"alg\":\"RS256\",\"typ\":\"JWT\"}");
        let body = general_purpose::URL_SAFE_NO_PAD.encode(payload.as_bytes());
        format!("{}.{}.signature", header, body)
    }

    #[test]
    fn test_decode_id_token_claims() {
        let token = make_token(
            "{\"exp\":9999999999,\"iat\":1736500000,\"email\":\"test@example.com\",\"user_id\":\"user_123\"}",
        );

        let claims = decode_id_token_claims(&token).unwrap();
        assert_eq!(claims.exp, 9999999999);
        assert_eq!(claims.email.as_deref(), Some("test@example.com"));
        assert_eq!(claims.user_id.as_deref(), Some("user_123"));
    }

    #[test]
    fn test_expiry_converts_seconds_to_millis() {
        let token = make_token("{\"exp\":1700000000}");
        assert_eq!(expiry_ms(&token).unwrap(), 1_700_000_000_000);
    }

    #[test]
    fn test_malformed_token_rejected() {
        assert!(decode_id_token_claims("not-a-jwt").is_err());
        assert!(decode_id_token_claims("a.b").is_err());
        assert!(decode_id_token_claims("a.!!!.c").is_err());
    }
}
