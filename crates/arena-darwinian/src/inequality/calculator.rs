//! Inequality calculation: Gini coefficient and top-K share

pub struct InequalityCalculator;

impl InequalityCalculator {
    /// Gini coefficient over balances.
    ///
    /// 0 when there is at most one balance or the total is not positive.
    pub fn gini(balances: &[i64]) -> f64 {
        let n = balances.len();
        if n <= 1 {
            return 0.0;
        }

        let mut sorted = balances.to_vec();
        sorted.sort_unstable();

        let total: i128 = sorted.iter().map(|&b| b as i128).sum();
        if total <= 0 {
            return 0.0;
        }

        let weighted: i128 = sorted
            .iter()
            .enumerate()
            .map(|(i, &b)| (i as i128 + 1) * b as i128)
            .sum();

        let numerator = 2 * weighted - (n as i128 + 1) * total;
        numerator as f64 / (n as i128 * total) as f64
    }

    /// Share of the total held by the `k` largest balances.
    ///
    /// 0 when the total is not positive.
    pub fn top_k_share(balances: &[i64], k: usize) -> f64 {
        let total: i128 = balances.iter().map(|&b| b as i128).sum();
        if total <= 0 || k == 0 {
            return 0.0;
        }

        let mut sorted = balances.to_vec();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        let top: i128 = sorted.iter().take(k).map(|&b| b as i128).sum();
        top as f64 / total as f64
    }
}
