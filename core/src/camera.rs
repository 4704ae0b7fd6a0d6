use nalgebra::Matrix3;

/// Per-image camera parameters estimated for one cluster, then discarded.
///
/// The rotation maps camera-frame rays into the cluster's common frame;
/// translation is assumed zero (pure rotation model for panoramas).
#[derive(Debug, Clone)]
pub struct CameraParams {
    pub focal: f64,
    pub aspect: f64,
    pub ppx: f64,
    pub ppy: f64,
    pub rotation: Matrix3<f64>,
}

impl CameraParams {
    pub fn new(focal: f64, ppx: f64, ppy: f64) -> Self {
        Self {
            focal,
            aspect: 1.0,
            ppx,
            ppy,
            rotation: Matrix3::identity(),
        }
    }

    /// Intrinsic matrix K.
    pub fn k(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.focal,
            0.0,
            self.ppx,
            0.0,
            self.focal * self.aspect,
            self.ppy,
            0.0,
            0.0,
            1.0,
        )
    }

    pub fn k_inv(&self) -> Matrix3<f64> {
        self.k().try_inverse().unwrap_or_else(Matrix3::identity)
    }
}

impl Default for CameraParams {
    fn default() -> Self {
        Self::new(1.0, 0.0, 0.0)
    }
}
