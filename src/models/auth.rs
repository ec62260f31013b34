use serde::{Deserialize, Serialize};

/// Claims carried by both the access and the refresh token; they differ only
/// by signing secret and lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub cin: String, // member national id
    pub exp: usize,
    pub iat: usize,
}

/// Identity established by the session guard, stored in request extensions.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub cin: String,
}
