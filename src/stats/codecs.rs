// src/stats/codecs.rs
use bincode::config;
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{StatsError, StatsResult};

/// Serialize a collection (or a `Summary`) with bincode's standard configuration.
pub fn encode_collection<T: Serialize>(value: &T) -> StatsResult<Vec<u8>> {
    encode_to_vec(value, config::standard())
        .map_err(|e| StatsError::Codec(format!("serialize error: {e}")))
}

/// Inverse of [`encode_collection`]. Trailing bytes are rejected.
pub fn decode_collection<T: DeserializeOwned>(bytes: &[u8]) -> StatsResult<T> {
    let (value, read): (T, usize) = decode_from_slice(bytes, config::standard())
        .map_err(|e| StatsError::Codec(format!("deserialize error: {e}")))?;
    if read != bytes.len() {
        return Err(StatsError::Codec(format!(
            "deserialize error: {} trailing bytes",
            bytes.len() - read
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::collect::{BinnedCollection, Collected, SnapshotCollection};
    use crate::stats::summary::Summary;

    fn sample() -> Collected {
        Collected::Binned(BinnedCollection {
            models: vec!["fiducial".into()],
            snapshots: vec![vec![30, 40]],
            means: vec![vec![vec![1.0, 2.0], vec![0.0, 4.5]]],
            stds: vec![vec![vec![0.1, 0.0], vec![0.0, 0.25]]],
            counts: vec![vec![vec![3.0, 2.0], vec![0.0, 7.0]]],
            bin_centers: vec![vec![vec![7.1, 7.3]; 2]],
        })
    }

    #[test]
    fn saved_collection_reads_back_identically() {
        let c = sample();
        let bytes = encode_collection(&c).unwrap();
        assert_eq!(decode_collection::<Collected>(&bytes).unwrap(), c);

        let s = Collected::PerSnapshot(SnapshotCollection::default());
        let bytes = encode_collection(&s).unwrap();
        assert_eq!(decode_collection::<Collected>(&bytes).unwrap(), s);
    }

    #[test]
    fn summary_keeps_its_hidden_spread() {
        let s = Summary::from_parts(vec![1.0, 0.0], vec![0.5, 0.0], vec![4.0, 0.0]).unwrap();
        let back: Summary = decode_collection(&encode_collection(&s).unwrap()).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn truncated_or_padded_input_is_a_codec_error() {
        let bytes = encode_collection(&sample()).unwrap();
        let err = decode_collection::<Collected>(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, StatsError::Codec(_)));

        let mut padded = bytes.clone();
        padded.push(0);
        let err = decode_collection::<Collected>(&padded).unwrap_err();
        assert!(err.to_string().contains("trailing"), "{err}");
    }
}
