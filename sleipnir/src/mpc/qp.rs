//! Dense storage of the per-tick quadratic program.
//!
//! The problem is `min ½·xᵀQx + dᵀx` subject to `DU·x ≤ DS` and
//! `XL ≤ x ≤ XU`. Matrices are stored column-major to match the dense
//! solver convention. Capacity only ever grows: when the requested
//! dimensions exceed the allocation, the arrays are reallocated with a
//! margin so a walking run stops allocating after the first few ticks.

use nalgebra::{DMatrix, DVector};
use tracing::warn;

use crate::error::{Error, Result};

/// Reallocation margin applied when the problem grows.
const GROWTH_MARGIN: f64 = 1.25;

/// Bounds beyond this magnitude are treated as absent.
const BOUND_INFINITY: f64 = 1e10;

/// Destination array of an accumulated term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    MatrixQ,
    MatrixDu,
    VectorD,
    VectorDs,
    VectorXl,
    VectorXu,
}

/// A dense quadratic program with monotone capacity.
#[derive(Debug, Default, Clone)]
pub struct QpProblem {
    variables: usize,
    constraints: usize,
    eq_constraints: usize,
    capacity_variables: usize,
    capacity_constraints: usize,

    q: Vec<f64>,
    d: Vec<f64>,
    du: Vec<f64>,
    ds: Vec<f64>,
    xl: Vec<f64>,
    xu: Vec<f64>,
    x: Vec<f64>,
}

impl QpProblem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the dimensions for the current tick.
    ///
    /// Reallocates only when a dimension exceeds the stored capacity, and
    /// then with a margin; the arrays never shrink within a run. The active
    /// region is zeroed so terms can be accumulated.
    pub fn set_dimensions(&mut self, variables: usize, constraints: usize, eq_constraints: usize) {
        if variables > self.capacity_variables {
            self.capacity_variables = (variables as f64 * GROWTH_MARGIN).ceil() as usize;
        }
        if constraints > self.capacity_constraints {
            self.capacity_constraints = (constraints as f64 * GROWTH_MARGIN).ceil() as usize;
        }

        self.variables = variables;
        self.constraints = constraints;
        self.eq_constraints = eq_constraints;

        let nv = self.capacity_variables;
        let nc = self.capacity_constraints;
        self.q.resize(nv * nv, 0.0);
        self.d.resize(nv, 0.0);
        self.du.resize(nc * nv, 0.0);
        self.ds.resize(nc, 0.0);
        self.xl.resize(nv, 0.0);
        self.xu.resize(nv, 0.0);
        self.x.resize(nv, 0.0);

        self.q.fill(0.0);
        self.d.fill(0.0);
        self.du.fill(0.0);
        self.ds.fill(0.0);
        self.xl.fill(-BOUND_INFINITY);
        self.xu.fill(BOUND_INFINITY);
    }

    #[must_use]
    pub fn variables(&self) -> usize {
        self.variables
    }

    #[must_use]
    pub fn constraints(&self) -> usize {
        self.constraints
    }

    #[must_use]
    pub fn eq_constraints(&self) -> usize {
        self.eq_constraints
    }

    /// Allocated capacity, exposed so a run can assert it stays put.
    #[must_use]
    pub fn capacity(&self) -> (usize, usize) {
        (self.capacity_variables, self.capacity_constraints)
    }

    /// Accumulate a matrix block at `(row, column)` of a matrix target.
    pub fn add_matrix_term(
        &mut self,
        block: &DMatrix<f64>,
        target: Target,
        row: usize,
        column: usize,
    ) {
        let (array, leading) = match target {
            Target::MatrixQ => (&mut self.q, self.capacity_variables),
            Target::MatrixDu => (&mut self.du, self.capacity_constraints),
            _ => panic!("vector target passed to add_matrix_term"),
        };

        for j in 0..block.ncols() {
            for i in 0..block.nrows() {
                array[(column + j) * leading + row + i] += block[(i, j)];
            }
        }
    }

    /// Accumulate a vector at `offset` of a vector target.
    pub fn add_vector_term(&mut self, vector: &DVector<f64>, target: Target, offset: usize) {
        let array = match target {
            Target::VectorD => &mut self.d,
            Target::VectorDs => &mut self.ds,
            Target::VectorXl => &mut self.xl,
            Target::VectorXu => &mut self.xu,
            _ => panic!("matrix target passed to add_vector_term"),
        };

        for (i, value) in vector.iter().enumerate() {
            array[offset + i] += value;
        }
    }

    /// Accumulate a single coefficient of a constraint row.
    pub fn add_constraint_coefficient(&mut self, row: usize, column: usize, value: f64) {
        self.du[column * self.capacity_constraints + row] += value;
    }

    /// Set the bound of one constraint row.
    pub fn set_constraint_bound(&mut self, row: usize, value: f64) {
        self.ds[row] = value;
    }

    /// The Hessian as a dense matrix view of the active region.
    #[must_use]
    pub fn q_matrix(&self) -> DMatrix<f64> {
        let n = self.variables;
        DMatrix::from_fn(n, n, |i, j| self.q[j * self.capacity_variables + i])
    }

    /// The linear term of the active region.
    #[must_use]
    pub fn d_vector(&self) -> DVector<f64> {
        DVector::from_fn(self.variables, |i, _| self.d[i])
    }

    /// The constraint matrix of the active region.
    #[must_use]
    pub fn du_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.constraints, self.variables, |i, j| {
            self.du[j * self.capacity_constraints + i]
        })
    }

    /// The constraint bounds of the active region.
    #[must_use]
    pub fn ds_vector(&self) -> DVector<f64> {
        DVector::from_fn(self.constraints, |i, _| self.ds[i])
    }

    /// The last computed solution.
    #[must_use]
    pub fn solution(&self) -> &[f64] {
        &self.x[..self.variables]
    }

    /// Solve the problem with the given kernel and keep the solution.
    pub fn solve(&mut self, solver: &mut dyn QpSolver) -> Result<()> {
        match solver.solve(self) {
            Ok(solution) => {
                self.x[..self.variables].copy_from_slice(solution.as_slice());
                Ok(())
            }
            Err(ifail) => {
                warn!("QP solve failed with ifail = {ifail}");
                Err(Error::QpFailure { ifail })
            }
        }
    }
}

/// The dense solver kernel, kept behind a seam so the crate does not depend
/// on one particular implementation.
pub trait QpSolver {
    /// Solve the problem, returning the primal solution or a nonzero
    /// failure code.
    fn solve(&mut self, problem: &QpProblem) -> std::result::Result<DVector<f64>, i32>;
}

/// A small dense active-set solver.
///
/// Starts from the unconstrained minimizer and activates the most violated
/// inequality until the iterate is feasible and all multipliers are
/// non-negative. Finite variable bounds are folded in as inequality rows.
#[derive(Debug, Clone)]
pub struct ActiveSetSolver {
    max_iterations: usize,
    tolerance: f64,
}

impl Default for ActiveSetSolver {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-9,
        }
    }
}

impl ActiveSetSolver {
    /// Solve `min ½xᵀQx + dᵀx` subject to `A·x ≤ b` with an active set of
    /// equality-solved KKT systems.
    fn solve_inequalities(
        &self,
        q: &DMatrix<f64>,
        d: &DVector<f64>,
        a: &DMatrix<f64>,
        b: &DVector<f64>,
    ) -> std::result::Result<DVector<f64>, i32> {
        let n = q.nrows();
        let negated_d = -d.clone();
        let mut active: Vec<usize> = Vec::new();

        let mut x = q.clone().lu().solve(&negated_d).ok_or(1)?;

        for _ in 0..self.max_iterations {
            // most violated inactive constraint
            let mut worst: Option<(usize, f64)> = None;
            for row in 0..a.nrows() {
                if active.contains(&row) {
                    continue;
                }
                let violation = (a.row(row) * &x)[(0, 0)] - b[row];
                if violation > self.tolerance
                    && worst.is_none_or(|(_, current)| violation > current)
                {
                    worst = Some((row, violation));
                }
            }

            let Some((entering, _)) = worst else {
                return Ok(x);
            };
            active.push(entering);

            loop {
                // KKT system over the current active set
                let m = active.len();
                let mut kkt = DMatrix::zeros(n + m, n + m);
                kkt.view_mut((0, 0), (n, n)).copy_from(q);
                for (k, &row) in active.iter().enumerate() {
                    for column in 0..n {
                        kkt[(n + k, column)] = a[(row, column)];
                        kkt[(column, n + k)] = a[(row, column)];
                    }
                }

                let mut rhs = DVector::zeros(n + m);
                rhs.rows_mut(0, n).copy_from(&negated_d);
                for (k, &row) in active.iter().enumerate() {
                    rhs[n + k] = b[row];
                }

                let solution = kkt.lu().solve(&rhs).ok_or(2)?;
                x = solution.rows(0, n).into_owned();

                // drop the most negative multiplier, if any
                let negative = (0..m)
                    .filter(|&k| solution[n + k] < -self.tolerance)
                    .min_by(|&first, &second| {
                        solution[n + first].total_cmp(&solution[n + second])
                    });
                match negative {
                    Some(k) => {
                        active.remove(k);
                        if active.is_empty() {
                            x = q.clone().lu().solve(&negated_d).ok_or(1)?;
                            break;
                        }
                    }
                    None => break,
                }
            }
        }

        Err(3)
    }
}

impl QpSolver for ActiveSetSolver {
    fn solve(&mut self, problem: &QpProblem) -> std::result::Result<DVector<f64>, i32> {
        let n = problem.variables();
        let q = problem.q_matrix();
        let d = problem.d_vector();

        // fold finite bounds into the inequality rows
        let mut rows = Vec::new();
        let mut bounds = Vec::new();
        let du = problem.du_matrix();
        let ds = problem.ds_vector();
        for row in 0..problem.constraints() {
            rows.push(du.row(row).into_owned());
            bounds.push(ds[row]);
        }
        for (i, (&lower, &upper)) in problem.xl[..n].iter().zip(&problem.xu[..n]).enumerate() {
            if upper < BOUND_INFINITY {
                let mut row = nalgebra::RowDVector::zeros(n);
                row[i] = 1.0;
                rows.push(row);
                bounds.push(upper);
            }
            if lower > -BOUND_INFINITY {
                let mut row = nalgebra::RowDVector::zeros(n);
                row[i] = -1.0;
                rows.push(row);
                bounds.push(-lower);
            }
        }

        if rows.is_empty() {
            let negated_d = -d.clone();
            return q.lu().solve(&negated_d).ok_or(1);
        }

        let a = DMatrix::from_rows(&rows);
        let b = DVector::from_vec(bounds);

        self.solve_inequalities(&q, &d, &a, &b)
    }
}
