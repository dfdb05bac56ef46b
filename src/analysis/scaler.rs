use serde::{Deserialize, Serialize};

/// Per-feature standardisation: `(x - mean) / std`, with population std.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit<R: AsRef<[f64]>>(rows: &[R]) -> Self {
        let width = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        let count = rows.len().max(1) as f64;

        let mut mean = vec![0.0; width];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row.as_ref()) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= count);

        let mut variance = vec![0.0; width];
        for row in rows {
            for ((var, v), m) in variance.iter_mut().zip(row.as_ref()).zip(&mean) {
                *var += (v - m).powi(2);
            }
        }

        // constant columns would divide by zero, leave them unscaled
        let scale = variance
            .into_iter()
            .map(|var| (var / count).sqrt())
            .map(|std| if std > f64::EPSILON { std } else { 1.0 })
            .collect();

        StandardScaler { mean, scale }
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }

    pub fn transform_all<R: AsRef<[f64]>>(&self, rows: &[R]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.transform(r.as_ref())).collect()
    }
}
