//! Helm v3 release payload: JSON, gzip, base64.

use std::io::{Read, Write};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use mapkubeapis_core::ReleaseVersion;
use mapkubeapis_release::StoreError;

const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

fn codec_err(e: impl std::error::Error + Send + Sync + 'static) -> StoreError {
    StoreError::Codec(Box::new(e))
}

pub fn encode_release(release: &ReleaseVersion) -> Result<String, StoreError> {
    let json = serde_json::to_vec(release).map_err(codec_err)?;
    let mut gz = GzEncoder::new(Vec::with_capacity(json.len() / 4), Compression::best());
    gz.write_all(&json).map_err(codec_err)?;
    let compressed = gz.finish().map_err(codec_err)?;
    Ok(STANDARD.encode(compressed))
}

/// Accepts gzip-compressed and plain JSON payloads.
pub fn decode_release(payload: &str) -> Result<ReleaseVersion, StoreError> {
    let raw = STANDARD.decode(payload.trim()).map_err(codec_err)?;
    let json = if raw.starts_with(&GZIP_MAGIC) {
        let mut out = Vec::with_capacity(raw.len() * 4);
        GzDecoder::new(raw.as_slice()).read_to_end(&mut out).map_err(codec_err)?;
        out
    } else {
        raw
    };
    serde_json::from_slice(&json).map_err(codec_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapkubeapis_core::ReleaseStatus;

    fn sample() -> ReleaseVersion {
        serde_json::from_value(serde_json::json!({
            "name": "web",
            "namespace": "apps",
            "version": 2,
            "manifest": "---\napiVersion: extensions/v1beta1\nkind: Deployment\n",
            "info": { "status": "deployed", "description": "Upgrade complete", "first_deployed": "2020-01-01T00:00:00Z" },
            "chart": { "metadata": { "name": "web" } }
        }))
        .unwrap()
    }

    #[test]
    fn encoded_payload_is_base64_gzip() {
        let payload = encode_release(&sample()).unwrap();
        let raw = STANDARD.decode(&payload).unwrap();
        assert!(raw.starts_with(&GZIP_MAGIC));
        assert_eq!(decode_release(&payload).unwrap(), sample());
    }

    #[test]
    fn plain_json_payload_is_accepted() {
        let json = serde_json::to_vec(&sample()).unwrap();
        let decoded = decode_release(&STANDARD.encode(json)).unwrap();
        assert_eq!(decoded.version, 2);
        assert_eq!(decoded.status(), ReleaseStatus::Deployed);
        assert!(decoded.rest.contains_key("chart"));
    }

    #[test]
    fn garbage_is_a_codec_error() {
        assert!(matches!(decode_release("not base64!"), Err(StoreError::Codec(_))));
        assert!(matches!(decode_release(&STANDARD.encode("{\"name\":")), Err(StoreError::Codec(_))));
    }
}
