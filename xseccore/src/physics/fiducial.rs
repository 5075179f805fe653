/// Fiducial volume boundaries, queried per vertex.
///
/// Implementations must be pure: the same point always gives the same
/// answer, from any thread.
pub trait FiducialVolume: Send + Sync {
    fn is_in_truth_volume(&self, x: f64, y: f64, z: f64) -> bool;
    fn is_in_reco_volume(&self, x: f64, y: f64, z: f64) -> bool;
}

/// Axis-aligned box, bounds in cm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxVolume {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoxVolume {
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        BoxVolume { min, max }
    }

    /// Shrink every face inwards; `lower` and `upper` are per-axis margins.
    pub fn inset(&self, lower: [f64; 3], upper: [f64; 3]) -> Self {
        BoxVolume {
            min: [self.min[0] + lower[0], self.min[1] + lower[1], self.min[2] + lower[2]],
            max: [self.max[0] - upper[0], self.max[1] - upper[1], self.max[2] - upper[2]],
        }
    }

    /// NaN coordinates are never contained.
    pub fn contains(&self, x: f64, y: f64, z: f64) -> bool {
        [x, y, z]
            .iter()
            .zip(self.min.iter().zip(self.max.iter()))
            .all(|(v, (lo, hi))| *v > *lo && *v < *hi)
    }
}

/// Active TPC volume of the detector.
pub const ACTIVE_VOLUME: BoxVolume = BoxVolume {
    min: [-1.55, -115.53, 0.1],
    max: [254.8, 117.47, 1036.9],
};

/// Truth and reconstructed fiducial boxes cut from the active volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorFiducial {
    pub truth: BoxVolume,
    pub reco: BoxVolume,
}

impl Default for DetectorFiducial {
    fn default() -> Self {
        DetectorFiducial {
            truth: ACTIVE_VOLUME.inset([5.0, 15.0, 10.0], [5.0, 15.0, 50.0]),
            reco: ACTIVE_VOLUME.inset([10.0, 20.0, 15.0], [10.0, 20.0, 60.0]),
        }
    }
}

impl FiducialVolume for DetectorFiducial {
    fn is_in_truth_volume(&self, x: f64, y: f64, z: f64) -> bool {
        self.truth.contains(x, y, z)
    }

    fn is_in_reco_volume(&self, x: f64, y: f64, z: f64) -> bool {
        self.reco.contains(x, y, z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centre_is_inside() {
        let fv = DetectorFiducial::default();
        assert!(fv.is_in_truth_volume(128.0, 0.0, 500.0));
        assert!(fv.is_in_reco_volume(128.0, 0.0, 500.0));
    }

    #[test]
    fn test_reco_is_tighter_than_truth() {
        let fv = DetectorFiducial::default();
        // 7 cm from the low-x face: inside truth, outside reco
        assert!(fv.is_in_truth_volume(5.5, 0.0, 500.0));
        assert!(!fv.is_in_reco_volume(5.5, 0.0, 500.0));
        assert!(!fv.is_in_truth_volume(128.0, 0.0, 1000.0));
    }

    #[test]
    fn test_nan_is_outside() {
        let fv = DetectorFiducial::default();
        assert!(!fv.is_in_truth_volume(f64::NAN, 0.0, 500.0));
        assert!(!fv.is_in_reco_volume(128.0, 0.0, f64::NAN));
    }
}
