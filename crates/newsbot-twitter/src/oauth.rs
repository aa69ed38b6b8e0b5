//! OAuth 1.0a request signing (HMAC-SHA1) for user-context API calls.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use rand::{distr::Alphanumeric, Rng};
use sha1::Sha1;

use newsbot_core::{config::TwitterCredentials, errors::Error, Result};

type HmacSha1 = Hmac<Sha1>;

const NONCE_LEN: usize = 32;

/// RFC 3986 percent-encoding (unreserved characters pass through).
pub fn encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

pub fn nonce() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}

/// Per-request values that vary between calls.
#[derive(Clone, Debug)]
pub struct Stamp {
    pub nonce: String,
    pub timestamp: i64,
}

impl Stamp {
    pub fn fresh(timestamp: i64) -> Self {
        Self {
            nonce: nonce(),
            timestamp,
        }
    }
}

fn oauth_params(creds: &TwitterCredentials, stamp: &Stamp) -> Vec<(String, String)> {
    vec![
        ("oauth_consumer_key".into(), creds.api_key.clone()),
        ("oauth_nonce".into(), stamp.nonce.clone()),
        ("oauth_signature_method".into(), "HMAC-SHA1".into()),
        ("oauth_timestamp".into(), stamp.timestamp.to_string()),
        ("oauth_token".into(), creds.access_token.clone()),
        ("oauth_version".into(), "1.0".into()),
    ]
}

/// Signature over method, base url and every query/body parameter.
pub fn signature(
    creds: &TwitterCredentials,
    method: &str,
    base_url: &str,
    params: &[(String, String)],
    stamp: &Stamp,
) -> Result<String> {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .cloned()
        .chain(oauth_params(creds, stamp))
        .map(|(k, v)| (encode(&k), encode(&v)))
        .collect();
    encoded.sort();

    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let base = format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        encode(base_url),
        encode(&param_string)
    );
    let key = format!(
        "{}&{}",
        encode(&creds.api_secret_key),
        encode(&creds.access_token_secret)
    );

    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| Error::Config(format!("invalid oauth signing key: {e}")))?;
    mac.update(base.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Value for the `Authorization` header.
pub fn authorization(
    creds: &TwitterCredentials,
    method: &str,
    base_url: &str,
    params: &[(String, String)],
    stamp: &Stamp,
) -> Result<String> {
    let sig = signature(creds, method, base_url, params, stamp)?;
    let mut fields = oauth_params(creds, stamp);
    fields.push(("oauth_signature".into(), sig));
    fields.sort();

    let joined = fields
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!("OAuth {joined}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> TwitterCredentials {
        TwitterCredentials {
            api_key: "xvz1evFS4wEEPTGEFPHBog".into(),
            api_secret_key: "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw".into(),
            access_token: "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb".into(),
            access_token_secret: "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE".into(),
        }
    }

    fn stamp() -> Stamp {
        Stamp {
            nonce: "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg".into(),
            timestamp: 1_318_622_958,
        }
    }

    fn params() -> Vec<(String, String)> {
        vec![
            (
                "status".into(),
                "Hello Ladies + Gentlemen, a signed OAuth request!".into(),
            ),
            ("include_entities".into(), "true".into()),
        ]
    }

    #[test]
    fn matches_published_signature() {
        let sig = signature(
            &creds(),
            "post",
            "https://api.twitter.com/1.1/statuses/update.json",
            &params(),
            &stamp(),
        )
        .unwrap();
        assert_eq!(sig, "hCtSmYh+iHYCEqBWrE7C7hYmtUk=");
    }

    #[test]
    fn header_carries_encoded_signature() {
        let header = authorization(
            &creds(),
            "POST",
            "https://api.twitter.com/1.1/statuses/update.json",
            &params(),
            &stamp(),
        )
        .unwrap();
        assert!(header.starts_with("OAuth oauth_consumer_key=\"xvz1evFS4wEEPTGEFPHBog\""));
        assert!(header.contains("oauth_signature=\"hCtSmYh%2BiHYCEqBWrE7C7hYmtUk%3D\""));
        assert!(header.ends_with("oauth_version=\"1.0\""));
        assert!(!header.contains("status="));
    }

    #[test]
    fn encodes_reserved_characters() {
        assert_eq!(encode("a b+c/~_-."), "a%20b%2Bc%2F~_-.");
        assert_eq!(encode("!"), "%21");
    }

    #[test]
    fn nonce_is_alphanumeric() {
        let n = nonce();
        assert_eq!(n.len(), NONCE_LEN);
        assert!(n.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(n, nonce());
    }
}
