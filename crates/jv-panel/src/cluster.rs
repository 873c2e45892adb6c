//! Cluster-robust covariance estimators.
//!
//! Liang–Zeger (HC0) sandwich with a small-sample correction for one
//! clustering dimension; Cameron–Gelbach–Miller add/subtract for two-way
//! clustering (entity and time), where the intersection component is
//! clustered on (entity, time) pairs.

use std::collections::HashMap;

use nalgebra::{DMatrix, DVector};

use jv_core::{Error, Result};

/// One-way cluster-robust covariance `V = (X'X)⁻¹ B (X'X)⁻¹ · c` with
/// `B = Σ_g X_g' e_g e_g' X_g` and the usual finite-sample correction
/// `c = G/(G−1) · (N−1)/(N−K)`.
///
/// `k_model` is the total parameter count consumed by the model, including
/// absorbed fixed effects.
pub fn cluster_covariance(
    x: &DMatrix<f64>,
    residuals: &DVector<f64>,
    xtx_inv: &DMatrix<f64>,
    clusters: &[u64],
    k_model: usize,
) -> Result<DMatrix<f64>> {
    let n = x.nrows();
    let p = x.ncols();
    if clusters.len() != n {
        return Err(Error::Validation(format!(
            "cluster ids length ({}) != n ({})",
            clusters.len(),
            n
        )));
    }

    let mut by_cluster: HashMap<u64, Vec<usize>> = HashMap::new();
    for (i, &cid) in clusters.iter().enumerate() {
        by_cluster.entry(cid).or_default().push(i);
    }
    let g = by_cluster.len() as f64;

    let mut meat = DMatrix::zeros(p, p);
    for members in by_cluster.values() {
        // Cluster score s_g = X_g' e_g.
        let mut s_g = vec![0.0_f64; p];
        for &i in members {
            let e_i = residuals[i];
            for j in 0..p {
                s_g[j] += x[(i, j)] * e_i;
            }
        }
        for a in 0..p {
            for b in 0..p {
                meat[(a, b)] += s_g[a] * s_g[b];
            }
        }
    }

    let n_f = n as f64;
    let k_f = k_model as f64;
    let correction = if g > 1.0 && n_f > k_f {
        (g / (g - 1.0)) * ((n_f - 1.0) / (n_f - k_f))
    } else {
        1.0
    };

    Ok((xtx_inv * meat) * xtx_inv * correction)
}

/// Two-way cluster-robust covariance (Cameron–Gelbach–Miller):
/// `V = V_a + V_b − V_{a∩b}`.
pub fn two_way_cluster_covariance(
    x: &DMatrix<f64>,
    residuals: &DVector<f64>,
    xtx_inv: &DMatrix<f64>,
    clusters_a: &[u64],
    clusters_b: &[u64],
    k_model: usize,
) -> Result<DMatrix<f64>> {
    if clusters_a.len() != clusters_b.len() {
        return Err(Error::Validation("cluster dimensions differ in length".into()));
    }

    // Dense ids for the (a, b) intersection clustering.
    let mut pair_ids: HashMap<(u64, u64), u64> = HashMap::new();
    let mut intersection = Vec::with_capacity(clusters_a.len());
    for (&a, &b) in clusters_a.iter().zip(clusters_b) {
        let next = pair_ids.len() as u64;
        intersection.push(*pair_ids.entry((a, b)).or_insert(next));
    }

    let v_a = cluster_covariance(x, residuals, xtx_inv, clusters_a, k_model)?;
    let v_b = cluster_covariance(x, residuals, xtx_inv, clusters_b, k_model)?;
    let v_ab = cluster_covariance(x, residuals, xtx_inv, &intersection, k_model)?;
    Ok(v_a + v_b - v_ab)
}
