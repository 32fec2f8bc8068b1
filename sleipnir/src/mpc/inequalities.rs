//! Linear feasibility regions attached to a support state.
//!
//! Two polygons are produced per support state: the region the center of
//! pressure may occupy under the stance (the sole shrunk by the security
//! margins), and the region the swing foot may land in relative to the
//! stance foot. Both are turned into half planes by the convex hull
//! primitive; for a right stance the constraints are mirrored about the
//! sagittal axis.

use tracing::info;

use crate::{
    config::FeetConfig,
    math::{ConvexHull, HalfPlane},
    types::{Side, SupportPhase, SupportState},
};

/// Which feasibility region is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InequalityKind {
    /// Pressure point region under the stance.
    Cop,
    /// Landing region of the swing foot relative to the stance foot.
    Feet,
}

/// Builder of the per-support-state constraint polygons.
#[derive(Debug, Clone)]
pub struct FeetInequalities {
    sole_half_width: f64,
    sole_half_length: f64,
    double_support_distance: f64,
    security_margin_x: f64,
    security_margin_y: f64,

    cop_single: ConvexHull,
    cop_double: ConvexHull,
    foothold: ConvexHull,
}

impl FeetInequalities {
    #[must_use]
    pub fn new(feet: &FeetConfig) -> Self {
        let mut inequalities = Self {
            sole_half_width: feet.sole_half_width,
            sole_half_length: feet.sole_half_length,
            double_support_distance: feet.double_support_distance,
            security_margin_x: feet.security_margin_x,
            security_margin_y: feet.security_margin_y,
            cop_single: ConvexHull::default(),
            cop_double: ConvexHull::default(),
            foothold: ConvexHull::default(),
        };
        inequalities.rebuild_hulls();
        inequalities
    }

    /// Rebuild the vertex tables from the current dimensions and margins.
    ///
    /// The tables are expressed for a *left* stance; a right stance reuses
    /// them through the mirroring of the half planes.
    fn rebuild_hulls(&mut self) {
        let half_length = self.sole_half_length - self.security_margin_x;
        let half_width = self.sole_half_width - self.security_margin_y;

        // clockwise around the left sole
        let x = [half_length, half_length, -half_length, -half_length];
        let y = [half_width, -half_width, -half_width, half_width];
        self.cop_single = ConvexHull::from_coordinates(&x, &y);

        // in double support the region stretches towards the other foot
        let shift = self.double_support_distance / 2.0;
        let y_double = [
            half_width - shift,
            -half_width - shift,
            -half_width - shift,
            half_width - shift,
        ];
        self.cop_double = ConvexHull::from_coordinates(&x, &y_double);

        // reachable landing region of the right foot relative to the left
        // stance; the inner boundary keeps the feet from colliding
        let foothold_x = [0.28, 0.2, 0.0, -0.2, -0.28];
        let foothold_y = [-0.2, -0.3, -0.4, -0.3, -0.2];
        self.foothold = ConvexHull::from_coordinates(&foothold_x, &foothold_y);
    }

    /// The polygon of the requested kind for a support state, rotated by
    /// the stance yaw.
    #[must_use]
    pub fn hull(&self, kind: InequalityKind, support: &SupportState) -> ConvexHull {
        let mut hull = match (kind, support.phase) {
            (InequalityKind::Cop, SupportPhase::Single) => self.cop_single.clone(),
            (InequalityKind::Cop, SupportPhase::Double) => self.cop_double.clone(),
            (InequalityKind::Feet, _) => self.foothold.clone(),
        };
        hull.rotate(support.yaw);
        hull
    }

    /// Half planes of the requested polygon, mirrored for a right stance.
    #[must_use]
    pub fn half_planes(&self, kind: InequalityKind, support: &SupportState) -> Vec<HalfPlane> {
        self.hull(kind, support)
            .half_planes(support.foot == Side::Right)
    }

    /// Thin textual command dispatch.
    ///
    /// `:setfeetconstraint XY <mx> <my>` updates the security margins and
    /// rebuilds the pressure polygons.
    pub fn dispatch_command(&mut self, method: &str, arguments: &str) {
        if method != ":setfeetconstraint" {
            return;
        }

        let mut parts = arguments.split_whitespace();
        if parts.next() != Some("XY") {
            return;
        }
        let (Some(margin_x), Some(margin_y)) = (
            parts.next().and_then(|raw| raw.parse().ok()),
            parts.next().and_then(|raw| raw.parse().ok()),
        ) else {
            return;
        };

        self.security_margin_x = margin_x;
        self.security_margin_y = margin_y;
        self.rebuild_hulls();
        info!("security margins set to x: {margin_x}, y: {margin_y}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeetConfig;

    fn support(foot: Side, phase: SupportPhase) -> SupportState {
        SupportState {
            foot,
            phase,
            ..SupportState::default()
        }
    }

    #[test]
    fn single_support_vertices_use_both_coordinate_tables() {
        let inequalities = FeetInequalities::new(&FeetConfig::default());
        let hull = inequalities.hull(
            InequalityKind::Cop,
            &support(Side::Left, SupportPhase::Single),
        );

        // x and y extents differ, so a vertex table mixup would show
        let max_x = hull.vertices().iter().map(|v| v.x.abs()).fold(0.0, f64::max);
        let max_y = hull.vertices().iter().map(|v| v.y.abs()).fold(0.0, f64::max);
        assert!((max_x - 0.08).abs() < 1e-12);
        assert!((max_y - 0.03).abs() < 1e-12);
    }

    #[test]
    fn right_support_planes_are_the_mirror_of_the_left_ones() {
        let inequalities = FeetInequalities::new(&FeetConfig::default());
        let left = inequalities.half_planes(
            InequalityKind::Cop,
            &support(Side::Left, SupportPhase::Single),
        );
        let right = inequalities.half_planes(
            InequalityKind::Cop,
            &support(Side::Right, SupportPhase::Single),
        );

        for (left, right) in left.iter().zip(&right) {
            assert!((left.a + right.a).abs() < 1e-12);
            assert!((left.b + right.b).abs() < 1e-12);
            assert!((left.d + right.d).abs() < 1e-12);
        }
    }

    #[test]
    fn center_of_sole_is_always_feasible() {
        let inequalities = FeetInequalities::new(&FeetConfig::default());
        for plane in inequalities.half_planes(
            InequalityKind::Cop,
            &support(Side::Left, SupportPhase::Single),
        ) {
            assert!(plane.contains(0.0, 0.0, 1e-9));
        }
    }

    #[test]
    fn foothold_region_excludes_the_stance_foot() {
        let inequalities = FeetInequalities::new(&FeetConfig::default());
        let planes = inequalities.half_planes(
            InequalityKind::Feet,
            &support(Side::Left, SupportPhase::Single),
        );

        // landing on the stance foot itself must be infeasible
        assert!(planes.iter().any(|plane| !plane.contains(0.0, 0.0, 1e-9)));
        // a nominal step to the right of the left stance is feasible
        assert!(planes.iter().all(|plane| plane.contains(0.0, -0.3, 1e-9)));
    }

    #[test]
    fn set_feet_constraint_command_rebuilds_the_hulls() {
        let mut inequalities = FeetInequalities::new(&FeetConfig::default());
        inequalities.dispatch_command(":setfeetconstraint", "XY 0.06 0.05");

        let hull = inequalities.hull(
            InequalityKind::Cop,
            &support(Side::Left, SupportPhase::Single),
        );
        let max_x = hull.vertices().iter().map(|v| v.x.abs()).fold(0.0, f64::max);
        let max_y = hull.vertices().iter().map(|v| v.y.abs()).fold(0.0, f64::max);
        assert!((max_x - 0.06).abs() < 1e-12);
        assert!((max_y - 0.02).abs() < 1e-12);
    }
}
