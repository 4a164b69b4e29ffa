use serde::{Serialize, Deserialize};

use crate::models::Identity;

/// Who is calling. The identity is derived from the client address only;
/// request headers chosen by the client never influence it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Caller {
    pub identity: Identity,
    pub ip: String,
}

pub fn fingerprint(ip: &str) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use sha2::{Sha256, Digest};

    let mut hasher = Sha256::new();
    hasher.update(ip.trim().as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

impl Caller {
    pub fn from_ip(ip: impl Into<String>) -> Self {
        let ip = ip.into();
        Self { identity: Identity::new(fingerprint(&ip)), ip }
    }
}

#[cfg(feature = "backend")]
mod backend_impl {
    use super::*;
    use rocket::request::{FromRequest, Outcome};
    use rocket::Request;

    #[rocket::async_trait]
    impl<'r> FromRequest<'r> for Caller {
        type Error = ();

        // client_ip honors Rocket's `ip_header` (X-Real-IP by default), which
        // the fronting proxy overwrites, and falls back to the socket peer.
        async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
            let ip = req.client_ip()
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            Outcome::Success(Caller::from_ip(ip))
        }
    }
}
