//! Persistent QP workspace.
//!
//! Dense assembly buffers plus compressed-column mirrors whose sparsity
//! pattern is fixed when the allocator is built; each solve only
//! refreshes numeric values, so nothing on the hot path allocates.
//!
//! Constraint rows follow the Clarabel convention `A·x + s = b` with
//! `s ∈ K`: equality rows first (zero cone), then the negated cone rows
//! (`C·x ≥ l` stored as `−C·x ≤ −l`), then optional box rows
//! (`x ≤ ub`, `−x ≤ −lb`), all in one nonnegative cone.

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus,
    SupportedConeT::{self, NonnegativeConeT, ZeroConeT},
};
use nalgebra::{DMatrix, DVector};
use tracing::debug;

/// A region of a workspace matrix that may ever hold nonzeros.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Block {
    Rect {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },
    Diag {
        row: usize,
        col: usize,
        len: usize,
    },
}

/// CSC mirror of a dense workspace matrix with a fixed sparsity pattern.
#[derive(Debug)]
struct FixedCsc {
    csc: CscMatrix<f64>,
}

impl FixedCsc {
    fn new(nrows: usize, ncols: usize, blocks: &[Block], upper_triangle: bool) -> Self {
        let mut col_rows: Vec<Vec<usize>> = vec![Vec::new(); ncols];
        for block in blocks {
            match *block {
                Block::Rect {
                    row,
                    col,
                    rows,
                    cols,
                } => {
                    for c in col..col + cols {
                        for r in row..row + rows {
                            if !upper_triangle || r <= c {
                                col_rows[c].push(r);
                            }
                        }
                    }
                }
                Block::Diag { row, col, len } => {
                    for k in 0..len {
                        if !upper_triangle || row + k <= col + k {
                            col_rows[col + k].push(row + k);
                        }
                    }
                }
            }
        }

        let mut colptr = Vec::with_capacity(ncols + 1);
        colptr.push(0);
        let mut rowval = Vec::new();
        for rows in &mut col_rows {
            rows.sort_unstable();
            rows.dedup();
            rowval.extend_from_slice(rows);
            colptr.push(rowval.len());
        }
        let nzval = vec![0.0; rowval.len()];
        Self {
            csc: CscMatrix::new(nrows, ncols, colptr, rowval, nzval),
        }
    }

    /// Copy the current dense values into the fixed pattern.
    fn refresh(&mut self, dense: &DMatrix<f64>) {
        for col in 0..self.csc.n {
            for k in self.csc.colptr[col]..self.csc.colptr[col + 1] {
                self.csc.nzval[k] = dense[(self.csc.rowval[k], col)];
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct QpWorkspace {
    /// Number of equality rows at the top of `a`.
    pub n_eq: usize,
    /// Cost Hessian, n × n (upper triangle is what the solver reads).
    pub h: DMatrix<f64>,
    /// Cost gradient.
    pub g: DVector<f64>,
    /// Stacked constraint rows.
    pub a: DMatrix<f64>,
    pub b: DVector<f64>,
    /// Primal iterate from the last solve.
    pub x: DVector<f64>,
    p_csc: FixedCsc,
    a_csc: FixedCsc,
    cones: Vec<SupportedConeT<f64>>,
}

impl QpWorkspace {
    pub fn new(
        n: usize,
        n_eq: usize,
        n_in: usize,
        boxed: bool,
        h_blocks: &[Block],
        a_blocks: &[Block],
    ) -> Self {
        let n_rows = n_eq + n_in + if boxed { 2 * n } else { 0 };
        let mut all_a_blocks = a_blocks.to_vec();
        if boxed {
            all_a_blocks.push(Block::Diag {
                row: n_eq + n_in,
                col: 0,
                len: n,
            });
            all_a_blocks.push(Block::Diag {
                row: n_eq + n_in + n,
                col: 0,
                len: n,
            });
        }
        let mut cones = Vec::with_capacity(2);
        if n_eq > 0 {
            cones.push(ZeroConeT(n_eq));
        }
        if n_rows > n_eq {
            cones.push(NonnegativeConeT(n_rows - n_eq));
        }
        Self {
            n_eq,
            h: DMatrix::zeros(n, n),
            g: DVector::zeros(n),
            a: DMatrix::zeros(n_rows, n),
            b: DVector::zeros(n_rows),
            x: DVector::zeros(n),
            p_csc: FixedCsc::new(n, n, h_blocks, true),
            a_csc: FixedCsc::new(n_rows, n, &all_a_blocks, false),
            cones,
        }
    }

    /// Refresh the mirrors and run one bounded solve.
    ///
    /// The best available primal iterate is written to `x` regardless of
    /// status; the returned flag reports clean convergence.
    pub fn solve(&mut self, max_iter: u32) -> bool {
        self.p_csc.refresh(&self.h);
        self.a_csc.refresh(&self.a);

        let settings = DefaultSettingsBuilder::default()
            .max_iter(max_iter)
            .verbose(false)
            .tol_gap_abs(1e-5)
            .tol_gap_rel(1e-5)
            .tol_feas(1e-5)
            .build()
            .expect("valid solver settings");

        match DefaultSolver::new(
            &self.p_csc.csc,
            self.g.as_slice(),
            &self.a_csc.csc,
            self.b.as_slice(),
            &self.cones,
            settings,
        ) {
            Ok(mut solver) => {
                solver.solve();
                let solution = &solver.solution;
                for (dst, src) in self.x.iter_mut().zip(solution.x.iter()) {
                    *dst = *src;
                }
                let converged = matches!(
                    solution.status,
                    SolverStatus::Solved | SolverStatus::AlmostSolved
                );
                if !converged {
                    debug!(status = ?solution.status, "QP returned a best-effort iterate");
                }
                converged
            }
            Err(err) => {
                // Malformed problem data; zero the correction so callers
                // fall back to their references.
                debug!(error = ?err, "QP setup failed");
                self.x.fill(0.0);
                false
            }
        }
    }
}
