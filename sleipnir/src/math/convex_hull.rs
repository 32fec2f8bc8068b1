use itertools::Itertools;
use nalgebra::{Point2, Rotation2};

/// One edge of a convex polygon as the half plane `a·x + b·y ≤ d`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HalfPlane {
    pub a: f64,
    pub b: f64,
    pub d: f64,
}

impl HalfPlane {
    /// Whether a point satisfies the inequality, within `tolerance`.
    #[must_use]
    pub fn contains(&self, x: f64, y: f64, tolerance: f64) -> bool {
        self.a * x + self.b * y <= self.d + tolerance
    }
}

/// An ordered polygon of 2-D vertices.
///
/// Vertices are expected in clockwise order, so that the interior of the
/// polygon satisfies `a·x + b·y ≤ d` for every edge returned by
/// [`Self::half_planes`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConvexHull {
    vertices: Vec<Point2<f64>>,
}

impl ConvexHull {
    #[must_use]
    pub fn new(vertices: Vec<Point2<f64>>) -> Self {
        Self { vertices }
    }

    /// Build a hull from separate x and y coordinate slices.
    #[must_use]
    pub fn from_coordinates(x: &[f64], y: &[f64]) -> Self {
        debug_assert_eq!(x.len(), y.len());
        Self {
            vertices: x
                .iter()
                .zip(y)
                .map(|(&x, &y)| Point2::new(x, y))
                .collect(),
        }
    }

    #[must_use]
    pub fn vertices(&self) -> &[Point2<f64>] {
        &self.vertices
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Rotate all vertices in place by `yaw`.
    pub fn rotate(&mut self, yaw: f64) {
        let rotation = Rotation2::new(yaw);
        for vertex in &mut self.vertices {
            *vertex = rotation * *vertex;
        }
    }

    /// Extract one half plane per edge, including the wrap-around edge.
    ///
    /// For edge `(i, i+1)` the coefficients are `a = yᵢ − yᵢ₊₁`,
    /// `b = xᵢ₊₁ − xᵢ`, `d = a·xᵢ + b·yᵢ`. When `mirror` is set all three
    /// coefficients are negated, which maps the constraints of a left
    /// support polygon onto the right support by symmetry about the
    /// sagittal axis.
    #[must_use]
    pub fn half_planes(&self, mirror: bool) -> Vec<HalfPlane> {
        let sign = if mirror { -1.0 } else { 1.0 };

        self.vertices
            .iter()
            .circular_tuple_windows()
            .map(|(first, second)| {
                let a = first.y - second.y;
                let b = second.x - first.x;
                let d = a * first.x + b * first.y;

                HalfPlane {
                    a: sign * a,
                    b: sign * b,
                    d: sign * d,
                }
            })
            .collect()
    }
}
