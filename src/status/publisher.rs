use std::io::{Read, Write};
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::bits::{is_valid_bit_size, BitsError, StatusBits};
use super::pool_service::{PoolError, PoolService};
use super::StatusListKind;
use crate::signing::{SignError, Signer};
use crate::storage::models::StatusIndexPool;

pub const STATUS_LIST_JWT_TYP: &str = "statuslist+jwt";
pub const CONTENT_TYPE_JSON: &str = "application/statuslist+json";
pub const CONTENT_TYPE_JWT: &str = "application/statuslist+jwt";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Status bits error: {0}")]
    Bits(#[from] BitsError),
    #[error("Failed to encode status list: {0}")]
    Encode(String),
    #[error("Status pool {pool_id} has block size {actual}, expected {expected}")]
    LayoutMismatch {
        pool_id: u64,
        expected: u32,
        actual: u32,
    },
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("Signing error: {0}")]
    Sign(#[from] SignError),
}

/// Wire form of a status list: `{"bits": N, "lst": "<base64url>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusListJson {
    pub bits: u8,
    pub lst: String,
}

/// Every pool of one kind joined into a single contiguous array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusList {
    bits: StatusBits,
}

impl StatusList {
    /// Place each pool's entries at `pool.id * block_size`.
    ///
    /// The result covers `[0, (max_id + 1) * block_size)`; indexes in blocks
    /// with no persisted pool stay `Valid`.
    pub fn join(
        pools: &[StatusIndexPool],
        bit_size: u8,
        block_size: u32,
    ) -> Result<Self, PublishError> {
        let len = pools
            .iter()
            .map(|p| p.id + 1)
            .max()
            .unwrap_or(0)
            * u64::from(block_size);
        let mut bits = StatusBits::new(bit_size, len);

        for pool in pools {
            if pool.block_size != block_size {
                return Err(PublishError::LayoutMismatch {
                    pool_id: pool.id,
                    expected: block_size,
                    actual: pool.block_size,
                });
            }
            bits.copy_from(pool.id * u64::from(block_size), &pool.bits)?;
        }

        Ok(Self { bits })
    }

    pub fn bits(&self) -> &StatusBits {
        &self.bits
    }

    /// Packed bytes, zlib compressed, base64url encoded without padding.
    pub fn encode_lst(&self) -> Result<String, PublishError> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
        encoder
            .write_all(self.bits.as_bytes())
            .map_err(|e| PublishError::Encode(e.to_string()))?;
        let compressed = encoder
            .finish()
            .map_err(|e| PublishError::Encode(e.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(compressed))
    }

    pub fn encode_as_json(&self) -> Result<StatusListJson, PublishError> {
        Ok(StatusListJson {
            bits: self.bits.bit_size(),
            lst: self.encode_lst()?,
        })
    }

    /// Decode a published list the way a relying party does.
    ///
    /// The entry count is rounded up to whole bytes, so trailing entries past
    /// the original length read as `Valid`.
    pub fn decode(json: &StatusListJson) -> Result<Self, PublishError> {
        if !is_valid_bit_size(json.bits) {
            return Err(PublishError::Encode(format!("invalid bit size {}", json.bits)));
        }
        let compressed = URL_SAFE_NO_PAD
            .decode(&json.lst)
            .map_err(|e| PublishError::Encode(e.to_string()))?;
        let mut packed = Vec::new();
        ZlibDecoder::new(compressed.as_slice())
            .read_to_end(&mut packed)
            .map_err(|e| PublishError::Encode(e.to_string()))?;

        let per_byte = u64::from(8 / json.bits);
        let mut bits = StatusBits::new(json.bits, packed.len() as u64 * per_byte);
        let mask = ((1u16 << json.bits) - 1) as u8;
        for (byte_index, byte) in packed.iter().enumerate() {
            for slot in 0..per_byte {
                let value = (byte >> (slot as u8 * json.bits)) & mask;
                if value != 0 {
                    bits.set(byte_index as u64 * per_byte + slot, value)?;
                }
            }
        }
        Ok(Self { bits })
    }
}

/// Representation requested by the relying party.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusListFormat {
    Json,
    Jwt,
}

impl StatusListFormat {
    /// `application/statuslist+jwt` selects the signed form unless it is
    /// weighted `q=0` or below the JSON form. Anything else, including a
    /// missing header, gets JSON.
    pub fn from_accept(accept: Option<&str>) -> Self {
        let Some(accept) = accept else {
            return StatusListFormat::Json;
        };

        let mut jwt: Option<f32> = None;
        let mut json: Option<f32> = None;
        for range in accept.split(',') {
            let (media_type, weight) = media_range(range);
            let slot = if media_type.eq_ignore_ascii_case(CONTENT_TYPE_JWT) {
                &mut jwt
            } else if media_type.eq_ignore_ascii_case(CONTENT_TYPE_JSON) {
                &mut json
            } else {
                continue;
            };
            *slot = Some(slot.map_or(weight, |w| w.max(weight)));
        }

        match jwt {
            Some(weight) if weight > 0.0 && weight >= json.unwrap_or(0.0) => StatusListFormat::Jwt,
            _ => StatusListFormat::Json,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            StatusListFormat::Json => CONTENT_TYPE_JSON,
            StatusListFormat::Jwt => CONTENT_TYPE_JWT,
        }
    }
}

/// Media type and `q` weight of one Accept entry. A missing or malformed
/// weight counts as 1.
fn media_range(range: &str) -> (&str, f32) {
    let mut parts = range.split(';');
    let media_type = parts.next().unwrap_or_default().trim();
    let weight = parts
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("q"))
        .and_then(|(_, value)| value.trim().parse::<f32>().ok())
        .unwrap_or(1.0);
    (media_type, weight)
}

#[derive(Serialize)]
struct StatusListClaims<'a> {
    sub: &'a str,
    iat: i64,
    nbf: i64,
    exp: i64,
    ttl: u64,
    status_list: StatusListJson,
}

/// Builds and encodes the published status list of one kind.
pub struct StatusListPublisher {
    lifetime_seconds: u64,
    pools: PoolService,
    signer: Arc<dyn Signer>,
    uri: String,
}

impl StatusListPublisher {
    pub fn new(
        pools: PoolService,
        uri: String,
        lifetime_seconds: u64,
        signer: Arc<dyn Signer>,
    ) -> Self {
        Self {
            lifetime_seconds,
            pools,
            signer,
            uri,
        }
    }

    pub fn kind(&self) -> StatusListKind {
        self.pools.kind()
    }

    /// Absolute endpoint URL; the `uri` of issued status claims.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Join every committed pool of this kind.
    pub fn build(&self) -> Result<StatusList, PublishError> {
        let pools = self.pools.all_pools()?;
        StatusList::join(&pools, self.pools.bit_size(), self.pools.block_size())
    }

    /// Signed form with `sub` set to the endpoint URL.
    pub fn sign(&self, list: &StatusList) -> Result<String, PublishError> {
        let now = chrono::Utc::now().timestamp();
        let lifetime = i64::try_from(self.lifetime_seconds).unwrap_or(i64::MAX);
        let claims = StatusListClaims {
            sub: &self.uri,
            iat: now,
            nbf: now,
            exp: now.saturating_add(lifetime),
            ttl: self.lifetime_seconds,
            status_list: list.encode_as_json()?,
        };
        let claims =
            serde_json::to_value(&claims).map_err(|e| PublishError::Encode(e.to_string()))?;
        Ok(self.signer.sign(STATUS_LIST_JWT_TYP, &claims)?)
    }

    /// Build and encode the list. Returns the response body for `format`.
    pub fn publish(&self, format: StatusListFormat) -> Result<String, PublishError> {
        let list = self.build()?;
        let body = match format {
            StatusListFormat::Json => serde_json::to_string(&list.encode_as_json()?)
                .map_err(|e| PublishError::Encode(e.to_string()))?,
            StatusListFormat::Jwt => self.sign(&list)?,
        };

        tracing::debug!(
            kind = %self.kind(),
            ?format,
            entries = list.bits().len(),
            "Published status list"
        );
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::JwtSigner;
    use crate::status::{IndexIssuanceService, TokenStatus};
    use crate::storage::Database;
    use crate::testutil::{setup_db, status_config};
    use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};

    const URI: &str = "https://as.example.com/status_list";

    fn publisher(db: &Database, block_size: u32, bit_size: u8) -> StatusListPublisher {
        let mut config = status_config(block_size);
        config.bit_size = bit_size;
        let pools = PoolService::new(db.clone(), StatusListKind::Token, &config);
        let signer = Arc::new(JwtSigner::hmac(Algorithm::HS256, b"secret"));
        StatusListPublisher::new(pools, URI.to_string(), 600, signer)
    }

    #[test]
    fn test_reference_vector_round_trips() {
        let (db, _temp) = setup_db();
        let publisher = publisher(&db, 16, 1);
        publisher.pools.allocate(1).unwrap();

        let invalid: Vec<u64> = [0, 3, 4, 5, 7, 8, 9, 13, 15].to_vec();
        publisher
            .pools
            .update_with_lock(0, &invalid, TokenStatus::Invalid)
            .unwrap();

        let list = publisher.build().unwrap();
        assert_eq!(list.bits().as_bytes(), &[0xB9, 0xA3]);

        let json = list.encode_as_json().unwrap();
        assert_eq!(json.bits, 1);
        assert!(!json.lst.contains('='));
        let decoded = StatusList::decode(&json).unwrap();
        assert_eq!(decoded.bits().as_bytes(), &[0xB9, 0xA3]);
    }

    #[test]
    fn test_only_updated_indexes_turn_invalid() {
        let (db, _temp) = setup_db();
        let publisher = publisher(&db, 10, 2);
        let issuance = IndexIssuanceService::new(publisher.pools.clone(), 1);

        let issued: Vec<i64> = (0..35).map(|_| issuance.next()).collect();
        assert_eq!(issued, (0..35).collect::<Vec<i64>>());

        let revoked = [0i64, 7, 9, 10, 13, 21, 29, 34];
        let report = issuance.update_status_at_indexes(&revoked, TokenStatus::Invalid);
        assert!(report.is_complete());
        assert_eq!(report.updated(), revoked.len());

        let list = publisher.build().unwrap();
        assert_eq!(list.bits().len(), 40);
        for i in 0..40u64 {
            let expected = if revoked.contains(&(i as i64)) {
                TokenStatus::Invalid
            } else {
                TokenStatus::Valid
            };
            assert_eq!(list.bits().status(i), Some(expected), "index {i}");
        }

        let decoded = StatusList::decode(&list.encode_as_json().unwrap()).unwrap();
        for i in 0..40u64 {
            assert_eq!(
                decoded.bits().status(i) == Some(TokenStatus::Invalid),
                revoked.contains(&(i as i64)),
                "decoded index {i}"
            );
        }
    }

    #[test]
    fn test_join_leaves_gaps_valid() {
        let mut first = StatusIndexPool::new(0, 1, 4, 2);
        first.bits.set_status(1, TokenStatus::Invalid).unwrap();
        let mut third = StatusIndexPool::new(2, 1, 4, 2);
        third.bits.set_status(3, TokenStatus::Suspended).unwrap();

        let list = StatusList::join(&[first, third], 2, 4).unwrap();
        assert_eq!(list.bits().len(), 12);
        assert_eq!(list.bits().status(1), Some(TokenStatus::Invalid));
        assert!((4..8).all(|i| list.bits().status(i) == Some(TokenStatus::Valid)));
        assert_eq!(list.bits().status(11), Some(TokenStatus::Suspended));
    }

    #[test]
    fn test_join_rejects_mixed_block_sizes() {
        let pools = [StatusIndexPool::new(0, 1, 4, 2), StatusIndexPool::new(1, 1, 8, 2)];
        assert!(matches!(
            StatusList::join(&pools, 2, 4),
            Err(PublishError::LayoutMismatch { pool_id: 1, .. })
        ));
    }

    #[test]
    fn test_empty_list_publishes() {
        let (db, _temp) = setup_db();
        let publisher = publisher(&db, 10, 2);
        let body = publisher.publish(StatusListFormat::Json).unwrap();
        let json: StatusListJson = serde_json::from_str(&body).unwrap();
        assert_eq!(json.bits, 2);
        assert!(StatusList::decode(&json).unwrap().bits().is_empty());
    }

    #[test]
    fn test_json_body_has_exactly_bits_and_lst() {
        let (db, _temp) = setup_db();
        let publisher = publisher(&db, 10, 2);
        publisher.pools.allocate(1).unwrap();

        let body = publisher.publish(StatusListFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 2);
        assert_eq!(value["bits"], 2);
        assert!(value["lst"].is_string());
    }

    #[test]
    fn test_jwt_payload_matches_json_form() {
        let (db, _temp) = setup_db();
        let publisher = publisher(&db, 10, 2);
        publisher.pools.allocate(1).unwrap();
        publisher
            .pools
            .update_with_lock(0, &[6], TokenStatus::Invalid)
            .unwrap();

        let token = publisher.publish(StatusListFormat::Jwt).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let header = decode_header(&token).unwrap();
        assert_eq!(header.typ.as_deref(), Some(STATUS_LIST_JWT_TYP));

        let claims = decode::<serde_json::Value>(
            &token,
            &DecodingKey::from_secret(b"secret"),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap()
        .claims;
        assert_eq!(claims["sub"], URI);
        assert_eq!(claims["ttl"], 600);
        assert_eq!(
            claims["exp"].as_i64().unwrap() - claims["iat"].as_i64().unwrap(),
            600
        );

        let json: StatusListJson = serde_json::from_value(claims["status_list"].clone()).unwrap();
        assert_eq!(json, publisher.build().unwrap().encode_as_json().unwrap());
        let decoded = StatusList::decode(&json).unwrap();
        assert_eq!(decoded.bits().status(6), Some(TokenStatus::Invalid));
    }

    #[test]
    fn test_format_from_accept() {
        assert_eq!(StatusListFormat::from_accept(None), StatusListFormat::Json);
        assert_eq!(
            StatusListFormat::from_accept(Some("application/statuslist+json")),
            StatusListFormat::Json
        );
        assert_eq!(
            StatusListFormat::from_accept(Some("text/html, application/statuslist+jwt")),
            StatusListFormat::Jwt
        );
        assert_eq!(StatusListFormat::from_accept(Some("*/*")), StatusListFormat::Json);
    }

    #[test]
    fn test_format_from_accept_honors_weights() {
        let format = |accept: &str| StatusListFormat::from_accept(Some(accept));

        assert_eq!(format("application/statuslist+jwt;q=0"), StatusListFormat::Json);
        assert_eq!(format("application/statuslist+jwt; q=0.0"), StatusListFormat::Json);
        assert_eq!(format("application/statuslist+jwt; q=0.5"), StatusListFormat::Jwt);
        assert_eq!(format("Application/StatusList+JWT"), StatusListFormat::Jwt);
        assert_eq!(
            format("application/statuslist+json, application/statuslist+jwt;q=0.8"),
            StatusListFormat::Json
        );
        assert_eq!(
            format("application/statuslist+json;q=0.5, application/statuslist+jwt"),
            StatusListFormat::Jwt
        );
        assert_eq!(format("application/statuslist+jwtx"), StatusListFormat::Json);
    }
}
