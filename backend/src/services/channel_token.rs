//! Agora RTC channel tokens, AccessToken version 006.
//!
//! Layout (all integers little-endian, byte strings prefixed with a u16
//! length):
//!
//! ```text
//! message = salt:u32 ts:u32 privileges:map<u16, u32>
//! content = hmac_sha256(cert, app_id | channel | uid | message)
//!           crc32(channel):u32 crc32(uid):u32 message
//! token   = "006" app_id base64(content)
//! ```

use anyhow::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use std::collections::BTreeMap;

use super::traits::{ChannelRole, TokenIssuer};

type HmacSha256 = Hmac<Sha256>;

const TOKEN_VERSION: &str = "006";
const MESSAGE_TTL_SECS: u32 = 24 * 3600;

// RTC privilege keys
const JOIN_CHANNEL: u16 = 1;
const PUBLISH_AUDIO_STREAM: u16 = 2;
const PUBLISH_VIDEO_STREAM: u16 = 3;
const PUBLISH_DATA_STREAM: u16 = 4;

/// Issues Agora RTC tokens signed with the project's app certificate.
#[derive(Clone)]
pub struct ChannelTokenIssuer {
    app_id: Option<String>,
    app_certificate: Option<String>,
}

impl ChannelTokenIssuer {
    pub fn new(app_id: Option<String>, app_certificate: Option<String>) -> Self {
        Self {
            app_id,
            app_certificate,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.app_id.is_some() && self.app_certificate.is_some()
    }
}

impl TokenIssuer for ChannelTokenIssuer {
    /// `principal` is the Agora uid the token is bound to; `"0"` lets any
    /// uid join the channel.
    fn generate_token(
        &self,
        channel: &str,
        principal: &str,
        role: ChannelRole,
        ttl_seconds: u32,
    ) -> Result<String> {
        let (Some(app_id), Some(certificate)) = (&self.app_id, &self.app_certificate) else {
            anyhow::bail!("AGORA_APP_ID and AGORA_APP_CERTIFICATE must be set to issue channel tokens");
        };
        if channel.is_empty() {
            anyhow::bail!("channel name must not be empty");
        }

        let now = u32::try_from(chrono::Utc::now().timestamp())?;
        let uid = if principal == "0" { "" } else { principal };

        build_token(
            app_id,
            certificate,
            channel,
            uid,
            &privileges(role, now.saturating_add(ttl_seconds)),
            rand::rng().random_range(1..99_999_999),
            now.saturating_add(MESSAGE_TTL_SECS),
        )
    }
}

fn privileges(role: ChannelRole, expire_at: u32) -> BTreeMap<u16, u32> {
    let keys: &[u16] = match role {
        ChannelRole::Publisher => &[
            JOIN_CHANNEL,
            PUBLISH_AUDIO_STREAM,
            PUBLISH_VIDEO_STREAM,
            PUBLISH_DATA_STREAM,
        ],
        ChannelRole::Audience => &[JOIN_CHANNEL],
    };
    keys.iter().map(|&key| (key, expire_at)).collect()
}

fn build_token(
    app_id: &str,
    certificate: &str,
    channel: &str,
    uid: &str,
    privileges: &BTreeMap<u16, u32>,
    salt: u32,
    ts: u32,
) -> Result<String> {
    let mut message = Vec::new();
    put_u32(&mut message, salt);
    put_u32(&mut message, ts);
    put_u16(&mut message, u16::try_from(privileges.len())?);
    for (&key, &value) in privileges {
        put_u16(&mut message, key);
        put_u32(&mut message, value);
    }

    let mut mac = HmacSha256::new_from_slice(certificate.as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid app certificate: {}", e))?;
    mac.update(app_id.as_bytes());
    mac.update(channel.as_bytes());
    mac.update(uid.as_bytes());
    mac.update(&message);
    let signature = mac.finalize().into_bytes();

    let mut content = Vec::new();
    put_bytes(&mut content, &signature)?;
    put_u32(&mut content, crc32(channel.as_bytes()));
    put_u32(&mut content, crc32(uid.as_bytes()));
    put_bytes(&mut content, &message)?;

    Ok(format!("{}{}{}", TOKEN_VERSION, app_id, STANDARD.encode(content)))
}

fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    put_u16(buf, u16::try_from(bytes.len())?);
    buf.extend_from_slice(bytes);
    Ok(())
}

/// CRC-32 (IEEE 802.3), as the token format expects.
fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in bytes {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP_ID: &str = "970CA35de60c44645bbae8a215061b33";
    const CERT: &str = "5CFd2fd1755d40ecb72977518be15d3b";

    struct Reader<'a>(&'a [u8]);

    impl Reader<'_> {
        fn u16(&mut self) -> u16 {
            let (head, rest) = self.0.split_at(2);
            self.0 = rest;
            u16::from_le_bytes([head[0], head[1]])
        }

        fn u32(&mut self) -> u32 {
            let (head, rest) = self.0.split_at(4);
            self.0 = rest;
            u32::from_le_bytes([head[0], head[1], head[2], head[3]])
        }

        fn bytes(&mut self) -> Vec<u8> {
            let len = self.u16() as usize;
            let (head, rest) = self.0.split_at(len);
            self.0 = rest;
            head.to_vec()
        }
    }

    fn decode(token: &str) -> (Vec<u8>, u32, u32, Vec<u8>) {
        let encoded = token
            .strip_prefix(&format!("{}{}", TOKEN_VERSION, APP_ID))
            .unwrap();
        let content = STANDARD.decode(encoded).unwrap();
        let mut reader = Reader(&content);
        let signature = reader.bytes();
        let crc_channel = reader.u32();
        let crc_uid = reader.u32();
        let message = reader.bytes();
        assert!(reader.0.is_empty());
        (signature, crc_channel, crc_uid, message)
    }

    #[test]
    fn test_crc32_check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn test_token_layout_and_signature() {
        let privileges = privileges(ChannelRole::Publisher, 1_700_000_000);
        let token = build_token(APP_ID, CERT, "42", "", &privileges, 12345, 1_600_000_000).unwrap();

        let (signature, crc_channel, crc_uid, message) = decode(&token);
        assert_eq!(crc_channel, crc32(b"42"));
        assert_eq!(crc_uid, crc32(b""));

        let mut mac = HmacSha256::new_from_slice(CERT.as_bytes()).unwrap();
        mac.update(APP_ID.as_bytes());
        mac.update(b"42");
        mac.update(&message);
        mac.verify_slice(&signature).unwrap();

        let mut reader = Reader(&message);
        assert_eq!(reader.u32(), 12345);
        assert_eq!(reader.u32(), 1_600_000_000);
        assert_eq!(reader.u16(), 4);
        for key in [JOIN_CHANNEL, PUBLISH_AUDIO_STREAM, PUBLISH_VIDEO_STREAM, PUBLISH_DATA_STREAM] {
            assert_eq!(reader.u16(), key);
            assert_eq!(reader.u32(), 1_700_000_000);
        }
    }

    #[test]
    fn test_audience_only_joins() {
        let privileges = privileges(ChannelRole::Audience, 10);
        assert_eq!(privileges.into_iter().collect::<Vec<_>>(), vec![(JOIN_CHANNEL, 10)]);
    }

    #[test]
    fn test_generated_token_binds_channel_and_uid() {
        let issuer = ChannelTokenIssuer::new(Some(APP_ID.into()), Some(CERT.into()));

        let any_uid = issuer.generate_token("42", "0", ChannelRole::Publisher, 3600).unwrap();
        let (_, crc_channel, crc_uid, _) = decode(&any_uid);
        assert_eq!(crc_channel, crc32(b"42"));
        assert_eq!(crc_uid, crc32(b""));

        let bound = issuer.generate_token("42", "7", ChannelRole::Publisher, 3600).unwrap();
        let (_, _, crc_uid, _) = decode(&bound);
        assert_eq!(crc_uid, crc32(b"7"));
    }

    #[test]
    fn test_unconfigured_issuer_fails() {
        let issuer = ChannelTokenIssuer::new(Some("app-1".into()), None);
        assert!(!issuer.is_configured());
        assert!(issuer.generate_token("1", "0", ChannelRole::Audience, 60).is_err());
    }

    #[test]
    fn test_empty_channel_is_rejected() {
        let issuer = ChannelTokenIssuer::new(Some(APP_ID.into()), Some(CERT.into()));
        assert!(issuer.generate_token("", "0", ChannelRole::Publisher, 60).is_err());
    }
}
