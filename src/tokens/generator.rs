use rand::Rng;

/// Opaque session secret: 32 random bytes, hex encoded (64 characters).
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Record identifier for sessions and access tokens (`jti`).
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
