//! Mobile confirmation signing.
//!
//! Confirmation requests are authenticated with a time-based key:
//! `base64(HMAC-SHA1(identity_secret, be_u64(time) || tag))`, and identify
//! the "device" with an id derived from the account's steam id.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use zeroize::Zeroizing;

use crate::error::{SteamError, SteamResult};

type HmacSha1 = Hmac<Sha1>;

/// Tag used when listing pending confirmations.
pub const TAG_LIST: &str = "list";
/// Tag used when accepting a confirmation.
pub const TAG_ACCEPT: &str = "accept";

/// Signs confirmation requests for one account.
pub struct ConfirmationSigner {
    identity_secret: Zeroizing<Vec<u8>>,
    steam_id: u64,
}

impl ConfirmationSigner {
    /// Create a signer from a base64 identity secret.
    pub fn new(identity_secret_b64: &str, steam_id: u64) -> SteamResult<Self> {
        let identity_secret = Zeroizing::new(
            BASE64
                .decode(identity_secret_b64.trim())
                .map_err(|e| SteamError::Secret(format!("identity secret is not base64: {e}")))?,
        );

        Ok(Self {
            identity_secret,
            steam_id,
        })
    }

    /// Account the signer belongs to.
    pub fn steam_id(&self) -> u64 {
        self.steam_id
    }

    /// Confirmation key for `time` (unix seconds) and `tag`.
    pub fn key(&self, time: i64, tag: &str) -> SteamResult<String> {
        let mut mac = HmacSha1::new_from_slice(&self.identity_secret)
            .map_err(|e| SteamError::Secret(e.to_string()))?;
        mac.update(&time.to_be_bytes());
        mac.update(tag.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }

    /// Device id in `android:xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` form.
    pub fn device_id(&self) -> String {
        let hash = hex::encode(Sha1::digest(self.steam_id.to_string().as_bytes()));
        format!(
            "android:{}-{}-{}-{}-{}",
            &hash[0..8],
            &hash[8..12],
            &hash[12..16],
            &hash[16..20],
            &hash[20..32]
        )
    }
}

impl std::fmt::Debug for ConfirmationSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationSigner")
            .field("steam_id", &self.steam_id)
            .finish_non_exhaustive()
    }
}

/// One pending confirmation.
#[derive(Debug, Clone, Deserialize)]
pub struct Confirmation {
    pub id: String,
    pub nonce: String,
    /// For trade offers: the offer id.
    pub creator_id: String,
    #[serde(rename = "type", default)]
    pub kind: i32,
}

/// `mobileconf/getlist` response.
#[derive(Debug, Deserialize)]
pub struct ConfirmationList {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub conf: Vec<Confirmation>,
}

impl ConfirmationList {
    /// Find the confirmation created by `offer_id`.
    pub fn for_offer(&self, offer_id: &str) -> Option<&Confirmation> {
        self.conf.iter().find(|c| c.creator_id == offer_id)
    }
}

/// `mobileconf/ajaxop` response.
#[derive(Debug, Deserialize)]
pub struct ConfirmationOpResult {
    #[serde(default)]
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // base64("0123456789abcdefghij")
    const SECRET: &str = "MDEyMzQ1Njc4OWFiY2RlZmdoaWo=";

    #[test]
    fn test_confirmation_keys() {
        let signer = ConfirmationSigner::new(SECRET, 76561198000000000).unwrap();
        assert_eq!(
            signer.key(1_700_000_000, TAG_LIST).unwrap(),
            "1JCOvFXe3YKBh/HIis5GNNLR4CI="
        );
        assert_eq!(
            signer.key(1_700_000_000, TAG_ACCEPT).unwrap(),
            "NjlV5VCBhCQoDNohLksK0QZ59pA="
        );
    }

    #[test]
    fn test_device_id() {
        let signer = ConfirmationSigner::new(SECRET, 76561198000000000).unwrap();
        assert_eq!(
            signer.device_id(),
            "android:5c9df5a2-d7de-1e2c-8fc8-766523ca130f"
        );
    }

    #[test]
    fn test_invalid_secret() {
        assert!(matches!(
            ConfirmationSigner::new("not base64!!", 1),
            Err(SteamError::Secret(_))
        ));
    }

    #[test]
    fn test_find_confirmation_for_offer() {
        let list: ConfirmationList = serde_json::from_value(json!({
            "success": true,
            "conf": [
                { "id": "1", "nonce": "n1", "creator_id": "555", "type": 2 },
                { "id": "2", "nonce": "n2", "creator_id": "777", "type": 2 }
            ]
        }))
        .unwrap();

        let conf = list.for_offer("777").unwrap();
        assert_eq!(conf.id, "2");
        assert_eq!(conf.nonce, "n2");
        assert!(list.for_offer("999").is_none());
    }

    #[test]
    fn test_debug_hides_secret() {
        let signer = ConfirmationSigner::new(SECRET, 1).unwrap();
        assert!(!format!("{signer:?}").contains("identity_secret"));
    }
}
