use chrono::{DateTime, Utc};
use common_crypto::{constant_time_eq_hex, hmac_sha256_hex};

use crate::domain::{DomainError, DomainResult};

/// The "integration seam" spec.md's Design Notes name explicitly: production
/// deployments substitute S3/R2/GCS presigned URLs behind this trait.
pub trait UrlSigner: Send + Sync {
    fn sign(&self, op: Op, object_key: &str, expires_at: DateTime<Utc>) -> DomainResult<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Put,
    Get,
}

impl Op {
    fn as_str(&self) -> &'static str {
        match self {
            Op::Put => "put",
            Op::Get => "get",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "put" => Some(Op::Put),
            "get" => Some(Op::Get),
            _ => None,
        }
    }
}

/// A parsed signed URL, as returned by [`HmacUrlSigner::parse_and_verify`]
/// for the round-trip property asserted in §8.
#[derive(Debug, Clone)]
pub struct ParsedSignedUrl {
    pub op: Op,
    pub bucket: String,
    pub object_key: String,
    pub expires_unix: i64,
}

/// HMAC-SHA256 signer over the canonical string `op \n bucket \n objectKey \n
/// expiresUnix`, per §4.7's bit-exact grammar.
pub struct HmacUrlSigner {
    secret: Vec<u8>,
    base_url: String,
    bucket: String,
}

impl HmacUrlSigner {
    pub fn new(secret: Vec<u8>, base_url: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self { secret, base_url: base_url.into(), bucket: bucket.into() }
    }

    fn canonical_string(op: Op, bucket: &str, object_key: &str, expires_unix: i64) -> String {
        format!("{}\n{}\n{}\n{}", op.as_str(), bucket, object_key, expires_unix)
    }

    /// Rejects `..` path-traversal segments before escaping, per §4.7.
    fn validate_object_key(object_key: &str) -> DomainResult<()> {
        if object_key.split('/').any(|segment| segment == "..") {
            return Err(DomainError::invalid_input("object_key_traversal"));
        }
        if object_key.is_empty() {
            return Err(DomainError::invalid_input("object_key_empty"));
        }
        Ok(())
    }

    pub fn sign_url(&self, op: Op, object_key: &str, expires_at: DateTime<Utc>) -> DomainResult<String> {
        Self::validate_object_key(object_key)?;

        let expires_unix = expires_at.timestamp();
        let canonical = Self::canonical_string(op, &self.bucket, object_key, expires_unix);
        let sig = hmac_sha256_hex(&self.secret, canonical.as_bytes())
            .map_err(|err| DomainError::Internal(anyhow::anyhow!(err)))?;

        let escaped_key = object_key
            .split('/')
            .map(urlencoding::encode)
            .collect::<Vec<_>>()
            .join("/");

        Ok(format!(
            "{}/{}/{}?op={}&exp={}&sig={}",
            self.base_url.trim_end_matches('/'),
            self.bucket,
            escaped_key,
            op.as_str(),
            expires_unix,
            sig,
        ))
    }

    /// Recomputes the signature over the parsed components of `url` and
    /// compares in constant time. Used by tests to assert the round-trip
    /// property of §8 and available for any gateway that wants server-side
    /// verification rather than trusting the query string at face value.
    pub fn parse_and_verify(&self, url: &str) -> DomainResult<ParsedSignedUrl> {
        let (path_and_query, query) =
            url.split_once('?').ok_or_else(|| DomainError::invalid_input("malformed_signed_url"))?;

        let prefix = format!("{}/{}/", self.base_url.trim_end_matches('/'), self.bucket);
        let escaped_key = path_and_query
            .strip_prefix(&prefix)
            .ok_or_else(|| DomainError::invalid_input("malformed_signed_url"))?;
        let object_key = escaped_key
            .split('/')
            .map(|seg| urlencoding::decode(seg).map(|c| c.into_owned()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| DomainError::invalid_input("malformed_signed_url"))?
            .join("/");

        let mut op = None;
        let mut exp = None;
        let mut sig = None;
        for pair in query.split('&') {
            let (k, v) = pair.split_once('=').ok_or_else(|| DomainError::invalid_input("malformed_signed_url"))?;
            match k {
                "op" => op = Op::parse(v),
                "exp" => exp = v.parse::<i64>().ok(),
                "sig" => sig = Some(v.to_string()),
                _ => {}
            }
        }

        let (op, expires_unix, sig) = match (op, exp, sig) {
            (Some(op), Some(exp), Some(sig)) => (op, exp, sig),
            _ => return Err(DomainError::invalid_input("malformed_signed_url")),
        };

        let canonical = Self::canonical_string(op, &self.bucket, &object_key, expires_unix);
        let expected = hmac_sha256_hex(&self.secret, canonical.as_bytes())
            .map_err(|err| DomainError::Internal(anyhow::anyhow!(err)))?;

        if !constant_time_eq_hex(&expected, &sig) {
            return Err(DomainError::invalid_input("signature_mismatch"));
        }

        Ok(ParsedSignedUrl { op, bucket: self.bucket.clone(), object_key, expires_unix })
    }
}

impl UrlSigner for HmacUrlSigner {
    fn sign(&self, op: Op, object_key: &str, expires_at: DateTime<Utc>) -> DomainResult<String> {
        self.sign_url(op, object_key, expires_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn signer() -> HmacUrlSigner {
        HmacUrlSigner::new(b"0123456789abcdef0123456789abcdef".to_vec(), "https://store.example", "elnote-attachments")
    }

    #[test]
    fn round_trip_recovers_exact_fields() {
        let s = signer();
        let exp = Utc::now() + Duration::minutes(15);
        let url = s.sign_url(Op::Get, "experiments/e1/file.bin", exp).unwrap();
        let parsed = s.parse_and_verify(&url).unwrap();
        assert_eq!(parsed.op, Op::Get);
        assert_eq!(parsed.bucket, "elnote-attachments");
        assert_eq!(parsed.object_key, "experiments/e1/file.bin");
        assert_eq!(parsed.expires_unix, exp.timestamp());
    }

    #[test]
    fn mutated_signature_is_rejected() {
        let s = signer();
        let exp = Utc::now() + Duration::minutes(15);
        let url = s.sign_url(Op::Put, "k.bin", exp).unwrap();
        let tampered = url.replace("op=put", "op=get");
        assert!(s.parse_and_verify(&tampered).is_err());
    }

    #[test]
    fn mutated_expiry_is_rejected() {
        let s = signer();
        let exp = Utc::now() + Duration::minutes(15);
        let url = s.sign_url(Op::Get, "k.bin", exp).unwrap();
        let bumped_exp = exp.timestamp() + 3600;
        let tampered = url.replace(&format!("exp={}", exp.timestamp()), &format!("exp={bumped_exp}"));
        assert!(s.parse_and_verify(&tampered).is_err());
    }

    #[test]
    fn dot_dot_object_key_is_rejected() {
        let s = signer();
        let exp = Utc::now() + Duration::minutes(15);
        assert!(s.sign_url(Op::Get, "../etc/passwd", exp).is_err());
    }
}
