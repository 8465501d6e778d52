//! Average-hash screen that drops repeated frames before any embedding call.
//!
//! The hash is a coarse fingerprint: an 8x8 grayscale thumbnail thresholded
//! against its mean. Equal hashes are treated as duplicates without further
//! checks, so two visually different frames that share the same
//! brightness layout (for example the same pattern at different exposure)
//! collide and the later one is dropped. That trade-off is accepted in
//! exchange for skipping an embedding request per repeated frame.

use std::{collections::HashSet, path::Path};

use image::imageops::FilterType;
use rayon::prelude::*;

const HASH_SIZE: u32 = 8;

/// 64-bit average hash of the image at `path`, first pixel in the high bit.
pub fn average_hash(path: &Path) -> Result<u64, image::ImageError> {
    let gray = image::open(path)?.to_luma8();
    let small = image::imageops::resize(&gray, HASH_SIZE, HASH_SIZE, FilterType::Triangle);

    let pixels = small.as_raw();
    let mean = pixels.iter().map(|&p| p as f64).sum::<f64>() / pixels.len() as f64;

    Ok(pixels
        .iter()
        .fold(0u64, |hash, &p| (hash << 1) | u64::from(p as f64 > mean)))
}

/// Drop every frame whose hash was already seen; first occurrence wins.
///
/// Frames that cannot be decoded are kept. Hashing runs in parallel, the
/// scan itself is sequential so the result keeps input order.
pub fn prefilter<T>(frames: &[T]) -> Vec<T>
where
    T: AsRef<Path> + Clone + Sync,
{
    let hashes: Vec<_> = frames
        .par_iter()
        .map(|frame| average_hash(frame.as_ref()))
        .collect();

    let mut seen = HashSet::with_capacity(frames.len());
    let mut out = Vec::with_capacity(frames.len());
    for (frame, hash) in frames.iter().zip(hashes) {
        match hash {
            Ok(hash) => {
                if seen.insert(hash) {
                    out.push(frame.clone());
                }
            }
            Err(e) => {
                log::warn!("hash failed for {}: {e}", frame.as_ref().display());
                out.push(frame.clone());
            }
        }
    }

    if out.len() < frames.len() {
        log::debug!(
            "prefilter dropped {} of {} frames",
            frames.len() - out.len(),
            frames.len()
        );
    }

    out
}
