//! Return statistics over price windows, shared by window scoring and the
//! feature builder.

use divlab_core::domain::PriceWindow;

/// Daily log returns between consecutive obtained bars, split by whether the
/// later bar falls before the anchor (`pre`) or on/after it (`post`).
///
/// A gap between two bars yields one multi-day return rather than none.
pub fn split_log_returns(window: &PriceWindow) -> (Vec<f64>, Vec<f64>) {
    let mut pre = Vec::new();
    let mut post = Vec::new();
    for pair in window.bars.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        if prev.close <= 0.0 || cur.close <= 0.0 {
            continue;
        }
        let r = (cur.close / prev.close).ln();
        if cur.date < window.anchor {
            pre.push(r);
        } else {
            post.push(r);
        }
    }
    (pre, post)
}

pub fn mean(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    Some(xs.iter().sum::<f64>() / xs.len() as f64)
}

/// Sample variance (n - 1); needs at least two values.
pub fn variance(xs: &[f64]) -> Option<f64> {
    if xs.len() < 2 {
        return None;
    }
    let m = mean(xs)?;
    Some(xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64)
}

pub fn std_dev(xs: &[f64]) -> Option<f64> {
    variance(xs).map(f64::sqrt)
}

/// `|mean(post) - mean(pre)| / sqrt((var(pre) + var(post)) / 2)`.
///
/// Zero when either side has fewer than two values or the pooled dispersion
/// is zero.
pub fn standardized_mean_difference(pre: &[f64], post: &[f64]) -> f64 {
    let (Some(var_pre), Some(var_post)) = (variance(pre), variance(post)) else {
        return 0.0;
    };
    let pooled = ((var_pre + var_post) / 2.0).sqrt();
    if !pooled.is_finite() || pooled <= f64::EPSILON {
        return 0.0;
    }
    match (mean(pre), mean(post)) {
        (Some(a), Some(b)) => ((b - a) / pooled).abs(),
        _ => 0.0,
    }
}
