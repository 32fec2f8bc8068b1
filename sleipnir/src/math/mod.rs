pub mod convex_hull;
pub mod preview_control;

pub use convex_hull::{ConvexHull, HalfPlane};
pub use preview_control::PreviewController;
