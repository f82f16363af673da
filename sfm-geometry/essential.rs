//! Five-point essential matrix solver.
//!
//! The 5x9 epipolar system leaves a four-dimensional null space, so
//! `E = x X + y Y + z Z + W`. Imposing `det(E) = 0` and the trace constraint
//! `2 E E^T E - tr(E E^T) E = 0` gives ten cubics in (x, y, z). Eliminating
//! the ten cubic monomials leaves a 10x10 action matrix for multiplication by
//! `z`, whose real eigenvectors are the solutions.
//!
//! Inputs are calibrated (normalized) image coordinates.

use nalgebra::{DMatrix, Matrix3, Point2, SMatrix, SVector, Vector3};
use nalgebra::linalg::Schur;

use crate::error::{GeometryError, GeometryResult};

/// Exponents of (x, y, z): ten cubic terms first, then the quotient basis
/// `[x^2, xy, xz, y^2, yz, z^2, x, y, z, 1]`
const MONOMIALS: [(u8, u8, u8); 20] = [
    (3, 0, 0),
    (2, 1, 0),
    (2, 0, 1),
    (1, 2, 0),
    (1, 1, 1),
    (1, 0, 2),
    (0, 3, 0),
    (0, 2, 1),
    (0, 1, 2),
    (0, 0, 3),
    (2, 0, 0),
    (1, 1, 0),
    (1, 0, 1),
    (0, 2, 0),
    (0, 1, 1),
    (0, 0, 2),
    (1, 0, 0),
    (0, 1, 0),
    (0, 0, 1),
    (0, 0, 0),
];

fn monomial_index(e: (u8, u8, u8)) -> Option<usize> {
    MONOMIALS.iter().position(|&m| m == e)
}

/// Polynomial of degree at most 3 in (x, y, z)
#[derive(Debug, Clone, Copy)]
struct Poly3 {
    c: [f64; 20],
}

impl Poly3 {
    fn zero() -> Self {
        Self { c: [0.0; 20] }
    }

    /// `cx x + cy y + cz z + c0`
    fn linear(cx: f64, cy: f64, cz: f64, c0: f64) -> Self {
        let mut p = Self::zero();
        p.c[16] = cx;
        p.c[17] = cy;
        p.c[18] = cz;
        p.c[19] = c0;
        p
    }

    fn add(&self, other: &Self) -> Self {
        let mut p = *self;
        p.c.iter_mut().zip(other.c.iter()).for_each(|(a, b)| *a += b);
        p
    }

    fn scale(&self, s: f64) -> Self {
        let mut p = *self;
        p.c.iter_mut().for_each(|a| *a *= s);
        p
    }

    /// Product, dropping terms above degree 3 (callers never produce them)
    fn mul(&self, other: &Self) -> Self {
        let mut p = Self::zero();
        for (i, &a) in self.c.iter().enumerate() {
            if a == 0.0 {
                continue;
            }
            let ma = MONOMIALS[i];
            for (j, &b) in other.c.iter().enumerate() {
                if b == 0.0 {
                    continue;
                }
                let mb = MONOMIALS[j];
                if let Some(k) = monomial_index((ma.0 + mb.0, ma.1 + mb.1, ma.2 + mb.2)) {
                    p.c[k] += a * b;
                }
            }
        }
        p
    }
}

type PolyMat = [[Poly3; 3]; 3];

fn poly_matmul(a: &PolyMat, b: &PolyMat) -> PolyMat {
    let mut out = [[Poly3::zero(); 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            let mut acc = Poly3::zero();
            for k in 0..3 {
                acc = acc.add(&a[i][k].mul(&b[k][j]));
            }
            out[i][j] = acc;
        }
    }
    out
}

fn poly_transpose(a: &PolyMat) -> PolyMat {
    let mut out = *a;
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = a[j][i];
        }
    }
    out
}

/// Ten constraint rows over `MONOMIALS`
fn constraint_matrix(basis: &[Matrix3<f64>; 4]) -> SMatrix<f64, 10, 20> {
    let [bx, by, bz, bw] = basis;
    let mut e = [[Poly3::zero(); 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            e[i][j] = Poly3::linear(bx[(i, j)], by[(i, j)], bz[(i, j)], bw[(i, j)]);
        }
    }

    let det = e[0][0].mul(&e[1][1].mul(&e[2][2]).add(&e[1][2].mul(&e[2][1]).scale(-1.0)))
        .add(&e[0][1].mul(&e[1][0].mul(&e[2][2]).add(&e[1][2].mul(&e[2][0]).scale(-1.0))).scale(-1.0))
        .add(&e[0][2].mul(&e[1][0].mul(&e[2][1]).add(&e[1][1].mul(&e[2][0]).scale(-1.0))));

    let eet = poly_matmul(&e, &poly_transpose(&e));
    let trace = eet[0][0].add(&eet[1][1]).add(&eet[2][2]);
    let eete = poly_matmul(&eet, &e);

    let mut m = SMatrix::<f64, 10, 20>::zeros();
    for (k, v) in det.c.iter().enumerate() {
        m[(0, k)] = *v;
    }
    for i in 0..3 {
        for j in 0..3 {
            let row = eete[i][j].scale(2.0).add(&trace.mul(&e[i][j]).scale(-1.0));
            for (k, v) in row.c.iter().enumerate() {
                m[(1 + 3 * i + j, k)] = *v;
            }
        }
    }
    m
}

/// Right singular vector for the smallest singular value
fn null_vector(m: &SMatrix<f64, 10, 10>) -> Option<SVector<f64, 10>> {
    let svd = m.svd(false, true);
    let v_t = svd.v_t?;
    let (idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    Some(v_t.row(idx).transpose())
}

/// Four-dimensional null space of the 5x9 epipolar system
fn epipolar_null_space(x1: &[Point2<f64>], x2: &[Point2<f64>]) -> GeometryResult<[Matrix3<f64>; 4]> {
    // Padded to square so the SVD yields a full right basis
    let mut a = DMatrix::<f64>::zeros(9, 9);
    for (r, (p, q)) in x1.iter().zip(x2.iter()).enumerate() {
        let row = [
            q.x * p.x, q.x * p.y, q.x,
            q.y * p.x, q.y * p.y, q.y,
            p.x, p.y, 1.0,
        ];
        for (c, v) in row.iter().enumerate() {
            a[(r, c)] = *v;
        }
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t.ok_or(GeometryError::Decomposition("svd of epipolar system"))?;
    let mut order: Vec<usize> = (0..9).collect();
    order.sort_by(|&i, &j| svd.singular_values[i].total_cmp(&svd.singular_values[j]));

    let basis = |k: usize| Matrix3::from_fn(|i, j| v_t[(order[k], 3 * i + j)]);
    Ok([basis(0), basis(1), basis(2), basis(3)])
}

/// All real essential matrices consistent with five correspondences
pub fn five_point(x1: &[Point2<f64>], x2: &[Point2<f64>]) -> GeometryResult<Vec<Matrix3<f64>>> {
    if x1.len() != x2.len() {
        return Err(GeometryError::LengthMismatch { left: x1.len(), right: x2.len() });
    }
    if x1.len() != 5 {
        return Err(GeometryError::NotEnoughPoints { required: 5, found: x1.len() });
    }

    let basis = epipolar_null_space(x1, x2)?;
    let m = constraint_matrix(&basis);

    let m1: SMatrix<f64, 10, 10> = m.fixed_view::<10, 10>(0, 0).into_owned();
    let m2: SMatrix<f64, 10, 10> = m.fixed_view::<10, 10>(0, 10).into_owned();
    // Each cubic monomial as a combination of the quotient basis
    let c = m1
        .lu()
        .solve(&(-m2))
        .ok_or(GeometryError::Decomposition("singular elimination template"))?;

    // z * b = A b for b = [x^2, xy, xz, y^2, yz, z^2, x, y, z, 1]
    let mut action = SMatrix::<f64, 10, 10>::zeros();
    for (row, cubic) in [2usize, 4, 5, 7, 8, 9].iter().enumerate() {
        action.set_row(row, &c.row(*cubic));
    }
    action[(6, 2)] = 1.0;
    action[(7, 4)] = 1.0;
    action[(8, 5)] = 1.0;
    action[(9, 8)] = 1.0;

    let schur = Schur::try_new(action, 1e-12, 1000).ok_or(GeometryError::Decomposition("eigen decomposition"))?;
    let eigenvalues = schur.complex_eigenvalues();

    let mut solutions = Vec::new();
    for lambda in eigenvalues.iter() {
        if lambda.im.abs() > 1e-6 * (1.0 + lambda.re.abs()) {
            continue;
        }
        let shifted = action - SMatrix::<f64, 10, 10>::identity() * lambda.re;
        let Some(v) = null_vector(&shifted) else {
            continue;
        };
        if v[9].abs() < 1e-12 {
            continue;
        }
        let (x, y, z) = (v[6] / v[9], v[7] / v[9], v[8] / v[9]);
        let e = basis[0] * x + basis[1] * y + basis[2] * z + basis[3];
        let norm = e.norm();
        if norm.is_finite() && norm > 1e-12 {
            solutions.push(e / norm);
        }
    }
    Ok(solutions)
}

/// Skew-symmetric cross-product matrix `[t]_x`
pub fn skew(t: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -t.z, t.y,
        t.z, 0.0, -t.x,
        -t.y, t.x, 0.0,
    )
}

/// Essential matrix of the relative motion `x2 = R x1 + t`
pub fn essential_from_pose(rotation: &Matrix3<f64>, translation: &Vector3<f64>) -> Matrix3<f64> {
    skew(translation) * rotation
}

/// First-order geometric error of a correspondence under `E`, in normalized units
pub fn sampson_distance(e: &Matrix3<f64>, x1: &Point2<f64>, x2: &Point2<f64>) -> f64 {
    let p = x1.to_homogeneous();
    let q = x2.to_homogeneous();
    let ep = e * p;
    let etq = e.transpose() * q;
    let num = q.dot(&ep);
    let den = ep.x * ep.x + ep.y * ep.y + etq.x * etq.x + etq.y * etq.y;
    if den <= f64::EPSILON {
        return if num.abs() <= f64::EPSILON { 0.0 } else { f64::INFINITY };
    }
    (num * num / den).sqrt()
}

/// Four `(R, t)` candidates for an essential matrix; `t` has unit norm
pub fn decompose_essential(e: &Matrix3<f64>) -> GeometryResult<[(Matrix3<f64>, Vector3<f64>); 4]> {
    let svd = e.svd(true, true);
    let mut u = svd.u.ok_or(GeometryError::Decomposition("svd of essential matrix"))?;
    let mut v_t = svd.v_t.ok_or(GeometryError::Decomposition("svd of essential matrix"))?;

    // Null direction of E^T is the singular vector of the smallest singular value
    let (null_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .ok_or(GeometryError::Decomposition("empty singular values"))?;
    if null_idx != 2 {
        u.swap_columns(null_idx, 2);
        v_t.swap_rows(null_idx, 2);
    }

    if u.determinant() < 0.0 {
        u.column_mut(2).neg_mut();
    }
    if v_t.determinant() < 0.0 {
        v_t.row_mut(2).neg_mut();
    }

    let w = Matrix3::new(
        0.0, -1.0, 0.0,
        1.0, 0.0, 0.0,
        0.0, 0.0, 1.0,
    );
    let r1 = u * w * v_t;
    let r2 = u * w.transpose() * v_t;
    let t: Vector3<f64> = u.column(2).normalize();

    Ok([(r1, t), (r1, -t), (r2, t), (r2, -t)])
}
