//! zstd compression for persisted blobs.

use crate::error::{StateError, StateResult};

/// Compression level used for every blob.
const LEVEL: i32 = 3;

/// Compress `data` with zstd.
pub fn compress(data: &[u8]) -> StateResult<Vec<u8>> {
    zstd::stream::encode_all(data, LEVEL).map_err(|e| StateError::Compress(e.to_string()))
}

/// Decompress a zstd frame produced by [`compress`].
pub fn decompress(data: &[u8]) -> StateResult<Vec<u8>> {
    zstd::stream::decode_all(data).map_err(|e| StateError::Decompress(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressed_json_decodes_back() {
        let json = br#"{"searcher.0":[{"agent_role":"a","timestamp":1}]}"#.repeat(20);
        let packed = compress(&json).unwrap();
        assert!(packed.len() < json.len());
        assert_eq!(decompress(&packed).unwrap(), json);
    }

    #[test]
    fn garbage_fails_to_decompress() {
        let err = decompress(b"definitely not zstd").unwrap_err();
        assert!(matches!(err, StateError::Decompress(_)));
    }
}
