pub mod camera;
pub mod error;
pub mod geometry;
pub mod keypoint;
pub mod runtime;

pub use camera::*;
pub use error::*;
pub use geometry::*;
pub use keypoint::*;
pub use runtime::init_global_thread_pool;
