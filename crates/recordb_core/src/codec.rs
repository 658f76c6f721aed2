//! CBOR encoding of metadata rows.

use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a row to CBOR bytes.
pub(crate) fn to_cbor<T: Serialize>(value: &T) -> CoreResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf).map_err(|e| CoreError::codec(e.to_string()))?;
    Ok(buf)
}

/// Decodes a row from CBOR bytes.
pub(crate) fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CoreResult<T> {
    ciborium::de::from_reader(bytes).map_err(|e| CoreError::codec(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        name: String,
        next: u64,
    }

    #[test]
    fn row_survives_cbor() {
        let row = Row {
            name: "orders".into(),
            next: 100_000,
        };
        let bytes = to_cbor(&row).unwrap();
        assert_eq!(from_cbor::<Row>(&bytes).unwrap(), row);
    }

    #[test]
    fn garbage_is_a_codec_error() {
        assert!(matches!(
            from_cbor::<Row>(&[0xff, 0x00]),
            Err(CoreError::Codec { .. })
        ));
    }
}
