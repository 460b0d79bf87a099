use crate::record::FeatureRecord;
use image::ImageReader;
use image_hasher::{HashAlg, Hasher, HasherConfig};
use rayon::prelude::*;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Default Hamming distance at or below which two images count as the same shot.
pub const DEFAULT_THRESHOLD: u32 = 8;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

/// Fixed-length perceptual fingerprint of an image.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    pub fn from_u64(bits: u64) -> Self {
        Self(bits.to_be_bytes().to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of differing bits. Bytes past the shorter fingerprint count as
    /// fully different.
    pub fn distance(&self, other: &Fingerprint) -> u32 {
        let shared: u32 = self
            .0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| (a ^ b).count_ones())
            .sum();
        let extra = self.0.len().abs_diff(other.0.len()) as u32 * 8;
        shared + extra
    }
}

/// Anything that can fingerprint an image on disk.
pub trait Fingerprinter: Sync {
    fn fingerprint(&self, path: &Path) -> Result<Fingerprint, HashError>;
}

/// DCT perceptual hash (pHash) over an 8x8 grid, 64 bits.
pub struct PerceptualHasher {
    hasher: Hasher,
}

impl PerceptualHasher {
    pub fn new() -> Self {
        let hasher = HasherConfig::new()
            .hash_size(8, 8)
            .hash_alg(HashAlg::Mean)
            .preproc_dct()
            .to_hasher();
        Self { hasher }
    }
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fingerprinter for PerceptualHasher {
    fn fingerprint(&self, path: &Path) -> Result<Fingerprint, HashError> {
        let display = path.to_string_lossy().into_owned();
        let img = ImageReader::open(path)
            .map_err(|source| HashError::Open {
                path: display.clone(),
                source,
            })?
            .with_guessed_format()
            .map_err(|source| HashError::Open {
                path: display.clone(),
                source,
            })?
            .decode()
            .map_err(|source| HashError::Decode {
                path: display,
                source,
            })?;
        Ok(Fingerprint::from_bytes(self.hasher.hash_image(&img).as_bytes()))
    }
}

/// Greedy first-occurrence-wins near-duplicate filter.
#[derive(Debug, Clone, Copy)]
pub struct Deduplicator {
    threshold: u32,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl Deduplicator {
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Keep each record unless its fingerprint lies within `threshold` of a
    /// record already kept.
    ///
    /// Fingerprints are computed in parallel but decisions are taken in input
    /// order, so the first image of a cluster is always the one kept. Records
    /// that cannot be fingerprinted are dropped and never become keepers.
    pub fn dedup<F: Fingerprinter>(
        &self,
        records: Vec<FeatureRecord>,
        hasher: &F,
    ) -> Vec<FeatureRecord> {
        let total = records.len();
        let fingerprints: Vec<Result<Fingerprint, HashError>> = records
            .par_iter()
            .map(|r| hasher.fingerprint(Path::new(&r.path)))
            .collect();

        let mut kept_hashes: Vec<Fingerprint> = Vec::new();
        let mut keep = Vec::new();
        let mut failed = 0usize;

        for (record, fingerprint) in records.into_iter().zip(fingerprints) {
            let fingerprint = match fingerprint {
                Ok(fp) => fp,
                Err(e) => {
                    warn!("Skipping {} during dedup: {}", record.path, e);
                    failed += 1;
                    continue;
                }
            };

            let duplicate = kept_hashes
                .iter()
                .any(|existing| fingerprint.distance(existing) <= self.threshold);
            if !duplicate {
                kept_hashes.push(fingerprint);
                keep.push(record);
            }
        }

        info!(
            total,
            kept = keep.len(),
            unhashable = failed,
            threshold = self.threshold,
            "Deduplication finished"
        );
        keep
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct FixedHashes(HashMap<String, u64>);

    impl Fingerprinter for FixedHashes {
        fn fingerprint(&self, path: &Path) -> Result<Fingerprint, HashError> {
            let key = path.to_string_lossy().into_owned();
            self.0
                .get(&key)
                .map(|bits| Fingerprint::from_u64(*bits))
                .ok_or_else(|| HashError::Open {
                    path: key,
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
                })
        }
    }

    fn records(paths: &[&str]) -> Vec<FeatureRecord> {
        paths.iter().map(|p| FeatureRecord::new(*p)).collect()
    }

    fn kept_paths(kept: Vec<FeatureRecord>) -> Vec<String> {
        kept.into_iter().map(|r| r.path).collect()
    }

    #[test]
    fn test_distance() {
        let a = Fingerprint::from_u64(0);
        assert_eq!(a.distance(&Fingerprint::from_u64(0b11111)), 5);
        assert_eq!(a.distance(&Fingerprint::from_bytes(&[0, 0])), 48);
    }

    #[test]
    fn test_close_pair_drops_second() {
        let hasher = FixedHashes(HashMap::from([
            ("/a.jpg".to_string(), 0u64),
            ("/b.jpg".to_string(), 0b11111u64),
        ]));
        let kept = Deduplicator::new(8).dedup(records(&["/a.jpg", "/b.jpg"]), &hasher);
        assert_eq!(kept_paths(kept), vec!["/a.jpg"]);
    }

    #[test]
    fn test_distant_pair_keeps_both() {
        let hasher = FixedHashes(HashMap::from([
            ("/a.jpg".to_string(), 0u64),
            ("/b.jpg".to_string(), 0b11_1111_1111u64),
        ]));
        let kept = Deduplicator::new(8).dedup(records(&["/a.jpg", "/b.jpg"]), &hasher);
        assert_eq!(kept_paths(kept), vec!["/a.jpg", "/b.jpg"]);
    }

    #[test]
    fn test_compares_against_kept_only() {
        // b is near a (dropped); c is near b but far from a, so c survives.
        let hasher = FixedHashes(HashMap::from([
            ("/a".to_string(), 0u64),
            ("/b".to_string(), 0xFFu64),
            ("/c".to_string(), 0xFFFFu64),
        ]));
        let kept = Deduplicator::new(8).dedup(records(&["/a", "/b", "/c"]), &hasher);
        assert_eq!(kept_paths(kept), vec!["/a", "/c"]);
    }

    #[test]
    fn test_first_occurrence_wins() {
        let hasher = FixedHashes(HashMap::from([
            ("/x".to_string(), 0b1u64),
            ("/y".to_string(), 0b0u64),
        ]));
        let kept = Deduplicator::default().dedup(records(&["/y", "/x"]), &hasher);
        assert_eq!(kept_paths(kept), vec!["/y"]);
        let kept = Deduplicator::default().dedup(records(&["/x", "/y"]), &hasher);
        assert_eq!(kept_paths(kept), vec!["/x"]);
    }

    #[test]
    fn test_unhashable_record_is_dropped() {
        let hasher = FixedHashes(HashMap::from([("/b".to_string(), 0u64)]));
        let kept = Deduplicator::default().dedup(records(&["/broken", "/b"]), &hasher);
        assert_eq!(kept_paths(kept), vec!["/b"]);
    }

    #[test]
    fn test_perceptual_hasher_on_files() {
        let temp_dir = TempDir::new().unwrap();
        let gradient = ImageBuffer::from_fn(64, 64, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, 128u8]));
        let a = temp_dir.path().join("a.png");
        let b = temp_dir.path().join("b.png");
        gradient.save(&a).unwrap();
        gradient.save(&b).unwrap();
        let broken = temp_dir.path().join("broken.png");
        std::fs::write(&broken, b"not an image").unwrap();

        let hasher = PerceptualHasher::new();
        let fa = hasher.fingerprint(&a).unwrap();
        let fb = hasher.fingerprint(&b).unwrap();
        assert_eq!(fa.as_bytes().len(), 8);
        assert_eq!(fa.distance(&fb), 0);
        assert!(hasher.fingerprint(&broken).is_err());

        let batch = records(&[
            a.to_str().unwrap(),
            broken.to_str().unwrap(),
            b.to_str().unwrap(),
        ]);
        let kept = Deduplicator::default().dedup(batch, &hasher);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].file, "a.png");
    }
}
