use ndarray::{s, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::error::{Result, TrainError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Option<Array1<f64>>,
    scale: Option<Array1<f64>>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit(&mut self, x: &Array2<f64>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(TrainError::Fit("cannot fit scaler on zero rows".to_string()));
        }
        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| TrainError::Fit("cannot fit scaler on zero rows".to_string()))?;
        // population deviation; constant columns keep their offset only
        let scale = x.std_axis(Axis(0), 0.0).mapv(|std| {
            if std.is_finite() && std > f64::EPSILON {
                std
            } else {
                1.0
            }
        });
        self.mean = Some(mean);
        self.scale = Some(scale);
        Ok(())
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (mean, scale) = match (self.mean.as_ref(), self.scale.as_ref()) {
            (Some(mean), Some(scale)) => (mean, scale),
            _ => return Err(TrainError::Fit("scaler used before fit".to_string())),
        };
        if x.ncols() != mean.len() {
            return Err(TrainError::Input(format!(
                "scaler fitted on {} columns, got {}",
                mean.len(),
                x.ncols()
            )));
        }
        Ok((x - mean) / scale)
    }

    pub fn mean(&self) -> Option<&Array1<f64>> {
        self.mean.as_ref()
    }

    pub fn scale(&self) -> Option<&Array1<f64>> {
        self.scale.as_ref()
    }
}

/// Standardizes a contiguous column range and drops every other column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnScaler {
    start: usize,
    end: usize,
    scaler: StandardScaler,
}

impl ColumnScaler {
    pub fn new(columns: Range<usize>) -> Self {
        Self {
            start: columns.start,
            end: columns.end,
            scaler: StandardScaler::new(),
        }
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let selected = self.select(x)?;
        self.scaler.fit(&selected)?;
        self.scaler.transform(&selected)
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let selected = self.select(x)?;
        self.scaler.transform(&selected)
    }

    fn select(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.end > x.ncols() {
            return Err(TrainError::Input(format!(
                "expected at least {} columns, got {}",
                self.end,
                x.ncols()
            )));
        }
        Ok(x.slice(s![.., self.start..self.end]).to_owned())
    }
}
