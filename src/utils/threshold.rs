//! Voxelwise value operations on label masks
//!
//! These mirror the fslmaths arithmetic used between morphology steps:
//! `-thr/-uthr` range thresholding, `-bin`, `-mul` and `-add`.

/// Keep values inside `[low, high]`, zero everything else
///
/// Kept voxels retain their value; follow with [`binarize`] for a 0/1 mask.
pub fn threshold_range(data: &[u8], low: u8, high: u8) -> Vec<u8> {
    data.iter()
        .map(|&v| if v >= low && v <= high { v } else { 0 })
        .collect()
}

/// Non-zero -> 1
pub fn binarize(data: &[u8]) -> Vec<u8> {
    data.iter().map(|&v| (v != 0) as u8).collect()
}

/// Multiply every voxel by `factor`
pub fn scale(data: &[u8], factor: u8) -> Vec<u8> {
    data.iter().map(|&v| v.saturating_mul(factor)).collect()
}

/// Voxelwise sum of two equally sized buffers
pub fn add(a: &[u8], b: &[u8]) -> Vec<u8> {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(&x, &y)| x.saturating_add(y)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_range_exact_value() {
        let data = vec![0, 1, 2, 3, 2, 1];
        assert_eq!(threshold_range(&data, 2, 2), vec![0, 0, 2, 0, 2, 0]);
        assert_eq!(threshold_range(&data, 1, 2), vec![0, 1, 2, 0, 2, 1]);
    }

    #[test]
    fn test_binarize() {
        assert_eq!(binarize(&[0, 3, 2, 0, 1]), vec![0, 1, 1, 0, 1]);
    }

    #[test]
    fn test_scale_and_add() {
        let left = vec![1, 1, 0, 0];
        let right = scale(&[0, 1, 1, 0], 2);
        assert_eq!(right, vec![0, 2, 2, 0]);
        assert_eq!(add(&left, &right), vec![1, 3, 2, 0]);
    }

    #[test]
    fn test_add_saturates() {
        assert_eq!(add(&[250], &[10]), vec![255]);
    }
}
