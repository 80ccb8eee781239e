//! Runge-Kutta-Fehlberg 7(8) coefficients
//!
//! 13-stage embedded pair from Fehlberg, E. (1968). "Classical Fifth-,
//! Sixth-, Seventh-, and Eighth-Order Runge-Kutta Formulas with Stepsize
//! Control", NASA TR R-287, Table X.
//!
//! The solution is advanced with the 8th-order weights (local extrapolation);
//! the 7th-order weights only feed the error estimate.

/// Number of stages
pub const STAGES: usize = 13;

/// Order of the propagated solution
pub const ORDER: u8 = 8;

/// Order of the embedded solution used for error control
pub const EMBEDDED_ORDER: u8 = 7;

/// Nodes c_i: stage i is evaluated at t_n + c_i * h
pub const C: [f64; STAGES] = [
    0.0,
    2.0 / 27.0,
    1.0 / 9.0,
    1.0 / 6.0,
    5.0 / 12.0,
    0.5,
    5.0 / 6.0,
    1.0 / 6.0,
    2.0 / 3.0,
    1.0 / 3.0,
    1.0,
    0.0,
    1.0,
];

/// Runge-Kutta matrix, row i holds a_{i,j} for j < i
#[rustfmt::skip]
pub const A: [[f64; 12]; STAGES] = [
    [0.0; 12],
    [2.0/27.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0/36.0, 1.0/12.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0/24.0, 0.0, 1.0/8.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [5.0/12.0, 0.0, -25.0/16.0, 25.0/16.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0/20.0, 0.0, 0.0, 1.0/4.0, 1.0/5.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [-25.0/108.0, 0.0, 0.0, 125.0/108.0, -65.0/27.0, 125.0/54.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [31.0/300.0, 0.0, 0.0, 0.0, 61.0/225.0, -2.0/9.0, 13.0/900.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [2.0, 0.0, 0.0, -53.0/6.0, 704.0/45.0, -107.0/9.0, 67.0/90.0, 3.0, 0.0, 0.0, 0.0, 0.0],
    [-91.0/108.0, 0.0, 0.0, 23.0/108.0, -976.0/135.0, 311.0/54.0, -19.0/60.0, 17.0/6.0, -1.0/12.0, 0.0, 0.0, 0.0],
    [2383.0/4100.0, 0.0, 0.0, -341.0/164.0, 4496.0/1025.0, -301.0/82.0, 2133.0/4100.0, 45.0/82.0, 45.0/164.0, 18.0/41.0, 0.0, 0.0],
    [3.0/205.0, 0.0, 0.0, 0.0, 0.0, -6.0/41.0, -3.0/205.0, -3.0/41.0, 3.0/41.0, 6.0/41.0, 0.0, 0.0],
    [-1777.0/4100.0, 0.0, 0.0, -341.0/164.0, 4496.0/1025.0, -289.0/82.0, 2193.0/4100.0, 51.0/82.0, 33.0/164.0, 12.0/41.0, 0.0, 1.0],
];

/// 8th-order weights (propagated)
#[rustfmt::skip]
pub const B: [f64; STAGES] = [
    0.0, 0.0, 0.0, 0.0, 0.0,
    34.0/105.0, 9.0/35.0, 9.0/35.0, 9.0/280.0, 9.0/280.0,
    0.0, 41.0/840.0, 41.0/840.0,
];

/// 7th-order embedded weights
#[rustfmt::skip]
pub const B_HAT: [f64; STAGES] = [
    41.0/840.0, 0.0, 0.0, 0.0, 0.0,
    34.0/105.0, 9.0/35.0, 9.0/35.0, 9.0/280.0, 9.0/280.0,
    41.0/840.0, 0.0, 0.0,
];

/// Error weights B - B_HAT, i.e. TE = (41/840) * (k11 + k12 - k0 - k10) * h
#[rustfmt::skip]
pub const B_ERR: [f64; STAGES] = [
    -41.0/840.0, 0.0, 0.0, 0.0, 0.0,
    0.0, 0.0, 0.0, 0.0, 0.0,
    -41.0/840.0, 41.0/840.0, 41.0/840.0,
];
