use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureType {
    Author,
    Witness,
}

impl SignatureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureType::Author => "author",
            SignatureType::Witness => "witness",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "author" => Some(Self::Author),
            "witness" => Some(Self::Witness),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    pub id: Uuid,
    pub experiment_id: Uuid,
    pub signer_user_id: Uuid,
    pub signature_type: String,
    #[serde(with = "hex_bytes")]
    pub content_hash: Vec<u8>,
    pub signed_at: DateTime<Utc>,
}

mod hex_bytes {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureVerification {
    pub signatures: Vec<Signature>,
    #[serde(serialize_with = "serialize_hex")]
    pub current_content_hash: Vec<u8>,
    pub integrity_valid: bool,
}

fn serialize_hex<S: serde::Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(bytes))
}
